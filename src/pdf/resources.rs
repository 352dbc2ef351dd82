// Phase 4: リソース辞書の走査（Form XObjectの入れ子を含む）
//
// A resource set is addressed by a `DictPath`: an indirect object plus the
// chain of inline dictionary keys leading to the dictionary. Paths are
// hashable so a traversal can remember which sets it has already visited.

use std::collections::HashSet;

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::error::PdfMonoError;

/// ドキュメント内の辞書の位置。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DictPath {
    root: ObjectId,
    keys: Vec<Vec<u8>>,
}

impl DictPath {
    /// 間接オブジェクト（辞書またはストリーム辞書）そのものを指すパス。
    pub fn object(id: ObjectId) -> Self {
        Self {
            root: id,
            keys: Vec::new(),
        }
    }

    fn child(&self, key: &[u8]) -> Self {
        let mut keys = self.keys.clone();
        keys.push(key.to_vec());
        Self {
            root: self.root,
            keys,
        }
    }

    pub fn root(&self) -> ObjectId {
        self.root
    }

    pub fn resolve<'a>(&self, doc: &'a Document) -> crate::error::Result<&'a Dictionary> {
        let mut dict = object_dict(doc.get_object(self.root)?)?;
        for key in &self.keys {
            dict = dict.get(key)?.as_dict()?;
        }
        Ok(dict)
    }

    pub fn resolve_mut<'a>(&self, doc: &'a mut Document) -> crate::error::Result<&'a mut Dictionary> {
        let mut dict = match doc.get_object_mut(self.root)? {
            Object::Dictionary(d) => d,
            Object::Stream(s) => &mut s.dict,
            other => {
                return Err(PdfMonoError::pdf_read(format!(
                    "expected dictionary at {:?}, got {}",
                    self.root,
                    other.enum_variant()
                )));
            }
        };
        for key in &self.keys {
            let current = dict;
            dict = current.get_mut(key)?.as_dict_mut()?;
        }
        Ok(dict)
    }
}

fn object_dict(obj: &Object) -> crate::error::Result<&Dictionary> {
    match obj {
        Object::Dictionary(d) => Ok(d),
        Object::Stream(s) => Ok(&s.dict),
        other => Err(PdfMonoError::pdf_read(format!(
            "expected dictionary, got {}",
            other.enum_variant()
        ))),
    }
}

/// `parent[key]` が辞書なら、その位置を返す。
///
/// 参照なら参照先を新しいルートとし、インライン辞書なら子パスとする。
pub fn follow(doc: &Document, parent: &DictPath, key: &[u8]) -> Option<DictPath> {
    let dict = parent.resolve(doc).ok()?;
    match dict.get(key).ok()? {
        Object::Reference(id) => match doc.get_object(*id).ok()? {
            Object::Dictionary(_) | Object::Stream(_) => Some(DictPath::object(*id)),
            _ => None,
        },
        Object::Dictionary(_) => Some(parent.child(key)),
        _ => None,
    }
}

/// ページのResources辞書の位置を返す（Parent経由の継承も考慮）。
pub fn page_resources(doc: &Document, page_id: ObjectId) -> Option<DictPath> {
    let mut node = page_id;
    let mut seen = HashSet::new();
    while seen.insert(node) {
        let path = DictPath::object(node);
        let dict = path.resolve(doc).ok()?;
        if dict.has(b"Resources") {
            return follow(doc, &path, b"Resources");
        }
        node = dict.get(b"Parent").and_then(Object::as_reference).ok()?;
    }
    None
}

/// ページから到達可能なリソース辞書と、その入れ子の深さ（ページ直下 = 0）。
#[derive(Debug, Clone)]
pub struct ResourceSet {
    pub path: DictPath,
    pub depth: usize,
}

/// ページから到達可能な全リソース辞書を列挙する。
///
/// Form XObjectのResourcesを深さ無制限にたどる。同じリソース辞書は一度しか
/// 返さないので、循環参照があっても停止する。再帰ではなく明示的なスタックを使う。
pub fn reachable_resource_sets(doc: &Document, page_id: ObjectId) -> Vec<ResourceSet> {
    let Some(root) = page_resources(doc, page_id) else {
        return Vec::new();
    };

    let mut sets = Vec::new();
    let mut visited: HashSet<DictPath> = HashSet::new();
    let mut stack = vec![ResourceSet {
        path: root,
        depth: 0,
    }];

    while let Some(set) = stack.pop() {
        if !visited.insert(set.path.clone()) {
            continue;
        }

        let mut nested = Vec::new();
        for_each_xobject(doc, &set.path, |_, id, stream| {
            if subtype_is(&stream.dict, b"Form")
                && let Some(path) = follow(doc, &DictPath::object(id), b"Resources")
            {
                nested.push(ResourceSet {
                    path,
                    depth: set.depth + 1,
                });
            }
        });

        // 出現順に処理されるよう逆順で積む
        stack.extend(nested.into_iter().rev());
        sets.push(set);
    }

    sets
}

/// リソース辞書のXObjectエントリのうち、間接参照されたストリームを列挙する。
///
/// コールバックには (名前, ObjectId, ストリーム) を渡す。
pub fn for_each_xobject<'a, F>(doc: &'a Document, resources: &DictPath, mut f: F)
where
    F: FnMut(&'a [u8], ObjectId, &'a lopdf::Stream),
{
    let Some(xobjects) = follow(doc, resources, b"XObject") else {
        return;
    };
    let Ok(dict) = xobjects.resolve(doc) else {
        return;
    };

    for (name, value) in dict.iter() {
        if let Object::Reference(id) = value
            && let Ok(Object::Stream(stream)) = doc.get_object(*id)
        {
            f(name.as_slice(), *id, stream);
        }
    }
}

pub(crate) fn subtype_is(dict: &Dictionary, subtype: &[u8]) -> bool {
    dict.get(b"Subtype")
        .and_then(Object::as_name)
        .is_ok_and(|name| name == subtype)
}

/// ページから到達可能なImage XObjectの参照。
#[derive(Debug, Clone)]
pub struct ImageRef {
    /// 参照元のXObject辞書
    pub xobjects: DictPath,
    pub name: Vec<u8>,
    pub image_id: ObjectId,
    pub depth: usize,
}

/// ページから到達可能な全Image XObjectの参照を列挙する。
///
/// 同じ画像が複数の場所から参照されている場合は参照ごとに1件ずつ返す。
pub fn collect_page_images(doc: &Document, page_id: ObjectId) -> Vec<ImageRef> {
    let mut images = Vec::new();
    for set in reachable_resource_sets(doc, page_id) {
        let Some(xobjects) = follow(doc, &set.path, b"XObject") else {
            continue;
        };
        for_each_xobject(doc, &set.path, |name, id, stream| {
            if subtype_is(&stream.dict, b"Image") {
                images.push(ImageRef {
                    xobjects: xobjects.clone(),
                    name: name.to_vec(),
                    image_id: id,
                    depth: set.depth,
                });
            }
        });
    }
    images
}

/// 辞書のエントリを置き換える。
pub fn set_entry(
    doc: &mut Document,
    path: &DictPath,
    key: &[u8],
    value: Object,
) -> crate::error::Result<()> {
    path.resolve_mut(doc)?.set(key.to_vec(), value);
    Ok(())
}
