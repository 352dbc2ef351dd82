use std::path::Path;

use lopdf::{Document, Object, ObjectId, Stream};

use crate::error::PdfMonoError;

pub struct PdfReader {
    doc: Document,
}

impl PdfReader {
    /// PDFファイルを開いてPdfReaderを作成する。
    ///
    /// ファイルが存在しない・通常ファイルでない場合は変換前にInputErrorを返す。
    pub fn open(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(PdfMonoError::input(format!(
                "input file does not exist or is not a regular file: {}",
                path.display()
            )));
        }
        let doc = Document::load(path)?;
        Ok(Self { doc })
    }

    /// 読み込み済みのDocumentからPdfReaderを作成する。
    pub fn from_document(doc: Document) -> Self {
        Self { doc }
    }

    /// 内部のlopdf Documentへの参照を返す。
    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn into_document(self) -> Document {
        self.doc
    }

    /// ページ数を返す。
    pub fn page_count(&self) -> u32 {
        self.doc.get_pages().len() as u32
    }

    /// (ページ番号(1-indexed), ページObjectId) の一覧をページ順で返す。
    pub fn page_ids(&self) -> Vec<(u32, ObjectId)> {
        self.doc.get_pages().into_iter().collect()
    }

    /// ページ辞書から継承可能なエントリを取得する（Parent経由の継承も考慮）。
    fn get_inherited(
        &self,
        dict: &lopdf::Dictionary,
        key: &[u8],
        depth: usize,
    ) -> Option<lopdf::Object> {
        // まず現在の辞書から探す
        if let Ok(obj) = dict.get(key) {
            return Some(obj.clone());
        }

        // 見つからなければParentをたどって継承を確認する（循環対策で深さ制限）
        const MAX_PAGE_TREE_DEPTH: usize = 64;
        if depth < MAX_PAGE_TREE_DEPTH
            && let Ok(lopdf::Object::Reference(parent_id)) = dict.get(b"Parent")
            && let Ok(parent_dict) = self.doc.get_dictionary(*parent_id)
        {
            return self.get_inherited(parent_dict, key, depth + 1);
        }

        None
    }

    /// 矩形 `[x0 y0 x1 y1]` を正規化して返す（x0 < x1, y0 < y1）。
    fn read_rect(&self, obj: &lopdf::Object) -> crate::error::Result<[f64; 4]> {
        let array = match obj {
            lopdf::Object::Reference(id) => self.doc.get_object(*id)?.as_array()?,
            other => other.as_array()?,
        };
        if array.len() < 4 {
            return Err(PdfMonoError::pdf_read("Invalid page box"));
        }

        // 値は整数または実数の可能性がある
        let to_f64 = |obj: &lopdf::Object| -> crate::error::Result<f64> {
            match obj {
                lopdf::Object::Integer(i) => Ok(*i as f64),
                lopdf::Object::Real(f) => Ok(*f as f64),
                _ => Err(PdfMonoError::pdf_read("Invalid page box value")),
            }
        };

        let (x0, y0) = (to_f64(&array[0])?, to_f64(&array[1])?);
        let (x1, y1) = (to_f64(&array[2])?, to_f64(&array[3])?);
        Ok([x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)])
    }

    fn page_rect(&self, page_num: u32, key: &[u8]) -> crate::error::Result<Option<[f64; 4]>> {
        let page_id = self.get_page_id(page_num)?;
        let page_dict = self.doc.get_dictionary(page_id)?;
        self.get_inherited(page_dict, key, 0)
            .map(|obj| self.read_rect(&obj))
            .transpose()
    }

    /// 指定ページ(1-indexed)のMediaBoxからページ寸法(width_pts, height_pts)を返す。
    pub fn page_dimensions(&self, page_num: u32) -> crate::error::Result<(f64, f64)> {
        let [x0, y0, x1, y1] = self
            .page_rect(page_num, b"MediaBox")?
            .ok_or_else(|| PdfMonoError::pdf_read("MediaBox not found"))?;
        check_dimensions(x1 - x0, y1 - y0)
    }

    /// 表示される領域（CropBox、なければMediaBox）を `[x0, y0, x1, y1]` で返す。
    pub fn page_visible_box(&self, page_num: u32) -> crate::error::Result<[f64; 4]> {
        let rect = match self.page_rect(page_num, b"CropBox")? {
            Some(crop) => crop,
            None => self
                .page_rect(page_num, b"MediaBox")?
                .ok_or_else(|| PdfMonoError::pdf_read("MediaBox not found"))?,
        };
        check_dimensions(rect[2] - rect[0], rect[3] - rect[1])?;
        Ok(rect)
    }

    /// 指定ページ(1-indexed)のコンテンツストリームをバイト列として返す。
    /// 複数のContentストリームがある場合は結合して返す。
    pub fn page_content_stream(&self, page_num: u32) -> crate::error::Result<Vec<u8>> {
        let page_id = self.get_page_id(page_num)?;
        page_content(&self.doc, page_id)
    }

    /// ページ番号(1-indexed)からObjectIdを取得する。
    pub fn get_page_id(&self, page_num: u32) -> crate::error::Result<ObjectId> {
        let pages = self.doc.get_pages();
        pages
            .get(&page_num)
            .copied()
            .ok_or_else(|| PdfMonoError::pdf_read(format!("page {} not found", page_num)))
    }
}

/// ページの /Contents を1つのバイト列にまとめる。
///
/// /Contents が配列の場合、ストリームの境界はトークンの区切りになるので
/// 改行を挟んで連結する（`f` と `Q` が `fQ` にならないように）。
pub fn page_content(doc: &Document, page_id: ObjectId) -> crate::error::Result<Vec<u8>> {
    let mut content = Vec::new();
    for stream_id in doc.get_page_contents(page_id) {
        let Ok(stream) = doc.get_object(stream_id).and_then(Object::as_stream) else {
            continue;
        };
        if !content.is_empty() {
            content.push(b'\n');
        }
        content.extend(stream_content(stream)?);
    }
    Ok(content)
}

/// ストリームの中身をフィルタ適用前のバイト列で返す。
pub fn stream_content(stream: &Stream) -> crate::error::Result<Vec<u8>> {
    if stream.dict.has(b"Filter") {
        stream
            .decompressed_content()
            .map_err(|e| PdfMonoError::content_stream(format!("cannot decode content stream: {e}")))
    } else {
        Ok(stream.content.clone())
    }
}

fn check_dimensions(width: f64, height: f64) -> crate::error::Result<(f64, f64)> {
    if width <= 0.0 || height <= 0.0 {
        return Err(PdfMonoError::pdf_read(
            "Invalid MediaBox: non-positive page dimensions",
        ));
    }

    // 14,400 pt ≈ 200 in
    const PDF_MAX_DIMENSION_PT: f64 = 14_400.0;
    if width > PDF_MAX_DIMENSION_PT || height > PDF_MAX_DIMENSION_PT {
        return Err(PdfMonoError::pdf_read(
            "Invalid MediaBox: page dimensions exceed PDF limits",
        ));
    }

    Ok((width, height))
}
