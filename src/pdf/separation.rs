// Phase 6: Separation色空間の書き換え（代替色空間 → DeviceGray）
//
// 実験的な機能。ティント変換はType 4関数の線形近似で置き換えるため、
// 元の代替色空間での見た目とは一致しない。

use lopdf::{Document, Object, ObjectId, Stream, dictionary};
use tracing::{debug, warn};

use crate::color::luminance::SEPARATION_TINT_PROGRAM;
use crate::pdf::resources::{DictPath, follow, reachable_resource_sets, set_entry};

/// 書き換え対象のColorSpaceエントリの位置
enum Target {
    /// 間接オブジェクトとして置かれた配列
    Object(ObjectId),
    /// ColorSpace辞書に直接書かれた配列
    Entry { color_spaces: DictPath, name: Vec<u8> },
}

/// ページ（と入れ子のForm XObject）のSeparation色空間を書き換える。
///
/// `[/Separation name alternate tint]` の alternate を `/DeviceGray` に、
/// tint を共有のType 4関数 `{ 0.755 mul 1 exch sub }` に置き換える。
/// 代替色空間が既にDeviceGrayのものとDeviceNは対象外。
///
/// 書き換えた色空間の数を返す。
pub fn rewrite_separation_colorspaces(
    doc: &mut Document,
    page_id: ObjectId,
) -> crate::error::Result<usize> {
    let mut targets: Vec<(Target, Object)> = Vec::new();

    for set in reachable_resource_sets(doc, page_id) {
        let Some(color_spaces) = follow(doc, &set.path, b"ColorSpace") else {
            continue;
        };
        let dict = color_spaces.resolve(doc)?;

        for (name, value) in dict.iter() {
            let (target, array) = match value {
                Object::Reference(id) => match doc.get_object(*id) {
                    Ok(Object::Array(arr)) => (Target::Object(*id), arr),
                    _ => continue,
                },
                Object::Array(arr) => (
                    Target::Entry {
                        color_spaces: color_spaces.clone(),
                        name: name.clone(),
                    },
                    arr,
                ),
                _ => continue,
            };

            match array.first().and_then(|o| o.as_name().ok()) {
                Some(b"Separation") if array.len() >= 4 => {
                    if is_device_gray(doc, &array[2]) {
                        continue;
                    }
                    targets.push((target, array[1].clone()));
                }
                Some(b"DeviceN") => {
                    warn!(
                        colorspace = %String::from_utf8_lossy(name),
                        "DeviceN color space is not rewritten"
                    );
                }
                _ => {}
            }
        }
    }

    if targets.is_empty() {
        return Ok(0);
    }

    let function_id = doc.add_object(tint_function());
    let mut rewritten = 0;
    for (target, colorant) in targets {
        let array = Object::Array(vec![
            "Separation".into(),
            colorant,
            "DeviceGray".into(),
            Object::Reference(function_id),
        ]);
        match target {
            Target::Object(id) => {
                // 複数のリソースから共有されている配列は一度だけ書き換わる
                if let Some(obj) = doc.objects.get_mut(&id)
                    && !matches!(obj, Object::Array(arr) if is_gray_separation(arr))
                {
                    *obj = array;
                    rewritten += 1;
                }
            }
            Target::Entry { color_spaces, name } => {
                set_entry(doc, &color_spaces, &name, array)?;
                rewritten += 1;
            }
        }
    }

    debug!(page = ?page_id, rewritten, "separation color spaces rewritten");
    Ok(rewritten)
}

/// `1 - 0.755·t` を計算するType 4 (PostScript calculator) 関数
fn tint_function() -> Stream {
    let mut stream = Stream::new(
        dictionary! {
            "FunctionType" => 4,
            "Domain" => vec![0.into(), 1.into()],
            "Range" => vec![0.into(), 1.into()],
        },
        SEPARATION_TINT_PROGRAM.as_bytes().to_vec(),
    );
    stream.allows_compression = false;
    stream
}

fn is_device_gray(doc: &Document, obj: &Object) -> bool {
    let resolved = match obj {
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(o) => o,
            Err(_) => return false,
        },
        other => other,
    };
    resolved.as_name().is_ok_and(|n| n == b"DeviceGray")
}

fn is_gray_separation(array: &[Object]) -> bool {
    array.len() >= 4 && array[2].as_name().is_ok_and(|n| n == b"DeviceGray")
}
