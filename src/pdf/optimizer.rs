// Phase 9: FlateDecode圧縮、孤立オブジェクト除去

use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use lopdf::{Document, Object, ObjectId};
use tracing::debug;

/// ドキュメント内の未圧縮ストリームにFlateDecode圧縮を適用する。
///
/// 既にフィルターが設定されているストリームと、圧縮を禁止されたストリーム
/// （Type 4関数のプログラムなど）はスキップする。圧縮したストリーム数を返す。
pub fn compress_streams(doc: &mut Document) -> usize {
    let ids: Vec<ObjectId> = doc.objects.keys().copied().collect();
    let mut compressed_count = 0;

    for id in ids {
        let Some(Object::Stream(stream)) = doc.objects.get_mut(&id) else {
            continue;
        };
        if stream.dict.has(b"Filter") || !stream.allows_compression || stream.content.is_empty() {
            continue;
        }

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        if encoder.write_all(&stream.content).is_err() {
            continue;
        }
        let Ok(compressed) = encoder.finish() else {
            continue;
        };

        // 縮まない場合は元のまま
        if compressed.len() < stream.content.len() {
            stream.dict.set("Filter", "FlateDecode");
            stream.set_content(compressed);
            compressed_count += 1;
        }
    }

    compressed_count
}

/// 孤立オブジェクト（差し替え前の画像など）を除去する。
pub fn delete_unused_objects(doc: &mut Document) -> usize {
    doc.prune_objects().len()
}

/// PDF最適化の全パスを順序通りに実行する。
///
/// 1. 孤立オブジェクトを除去
/// 2. 未圧縮ストリームを圧縮（`compress` が true の場合）
pub fn optimize(doc: &mut Document, compress: bool) {
    let pruned = delete_unused_objects(doc);
    let compressed = if compress { compress_streams(doc) } else { 0 };
    debug!(pruned, compressed, "document optimized");
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{Stream, dictionary};

    #[test]
    fn test_compress_skips_filtered_and_locked_streams() {
        let mut doc = Document::with_version("1.5");
        let plain = doc.add_object(Stream::new(dictionary! {}, b"0 g ".repeat(100)));
        let jpeg = doc.add_object(Stream::new(
            dictionary! { "Filter" => "DCTDecode" },
            b"\xFF\xD8".repeat(100),
        ));
        let mut program = Stream::new(dictionary! {}, b"{ 0.755 mul 1 exch sub }".repeat(10));
        program.allows_compression = false;
        let locked = doc.add_object(program);

        assert_eq!(compress_streams(&mut doc), 1);

        let filter = |id| {
            doc.get_object(id)
                .and_then(Object::as_stream)
                .map(|s| s.dict.has(b"Filter"))
                .unwrap()
        };
        assert!(filter(plain));
        assert!(filter(jpeg));
        assert!(!filter(locked));
    }
}
