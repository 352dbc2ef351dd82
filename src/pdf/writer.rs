// Phase 8: ラスタ化したページ画像でページの内容を置き換える

use lopdf::{Document, Object, ObjectId, Stream, dictionary};

/// ページ全面に貼るグレーJPEG画像
#[derive(Debug, Clone)]
pub struct GrayPageImage {
    pub jpeg_data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// ページ全面に画像を描くコンテンツストリームを生成する。
///
/// `rect` は `[x0, y0, x1, y1]`（ページ座標）。
/// `q <w> 0 0 <h> <x0> <y0> cm /<name> Do Q`
pub fn build_page_content_stream(name: &str, rect: [f64; 4]) -> Vec<u8> {
    let [x0, y0, x1, y1] = rect;
    let (w, h) = (x1 - x0, y1 - y0);
    format!("q {w} 0 0 {h} {x0} {y0} cm /{name} Do Q").into_bytes()
}

/// ページの内容を1枚のグレー画像で置き換える。
///
/// 画像XObjectとコンテンツストリームを追加し、ページの Resources と Contents を
/// 差し替える。MediaBoxなどのページ属性と注釈はそのまま残す。
/// 古いコンテンツとリソースは孤立オブジェクトになるので、保存前の
/// 最適化で除去される。
pub fn replace_page_with_image(
    doc: &mut Document,
    page_id: ObjectId,
    image: GrayPageImage,
    rect: [f64; 4],
) -> crate::error::Result<ObjectId> {
    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => image.width as i64,
        "Height" => image.height as i64,
        "ColorSpace" => "DeviceGray",
        "BitsPerComponent" => 8,
        "Filter" => "DCTDecode",
    };
    let image_id = doc.add_object(Object::Stream(Stream::new(dict, image.jpeg_data)));

    let content = build_page_content_stream("Im0", rect);
    let content_id = doc.add_object(Object::Stream(Stream::new(dictionary! {}, content)));

    let page = doc.get_dictionary_mut(page_id)?;
    page.set(
        "Resources",
        dictionary! {
            "XObject" => dictionary! { "Im0" => Object::Reference(image_id) },
        },
    );
    page.set("Contents", Object::Reference(content_id));
    // 透明グループは元の描画内容に対する指定なので外す
    page.remove(b"Group");

    Ok(image_id)
}

/// ページのコンテンツを1本の新しいストリームで置き換える。
///
/// /Contents が配列でも共有ストリームでも、元のストリームには触れない。
/// 参照されなくなったストリームは保存前の最適化で除去される。
pub fn set_page_content(
    doc: &mut Document,
    page_id: ObjectId,
    content: Vec<u8>,
) -> crate::error::Result<ObjectId> {
    let content_id = doc.add_object(Object::Stream(Stream::new(dictionary! {}, content)));
    doc.get_dictionary_mut(page_id)?
        .set("Contents", Object::Reference(content_id));
    Ok(content_id)
}
