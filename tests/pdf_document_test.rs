// Phase 8-9: PDF読み込み・ページ置き換え・最適化のテスト

use lopdf::{Document, Object, ObjectId, Stream, dictionary};

use pdf_mono::error::PdfMonoError;
use pdf_mono::pdf::optimizer::{compress_streams, delete_unused_objects, optimize};
use pdf_mono::pdf::reader::PdfReader;
use pdf_mono::pdf::writer::{GrayPageImage, replace_page_with_image};
use pdf_mono::raster::jpeg::encode_gray_buffer_to_jpeg;

// ============================================================
// Helpers
// ============================================================

/// MediaBoxをPagesに置き、2ページ目だけCropBoxを持つ2ページのPDF。
fn two_page_doc() -> (Document, ObjectId, ObjectId) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let content1 = doc.add_object(Stream::new(dictionary! {}, b"0.2 g 0 0 10 10 re f".to_vec()));
    let page1 = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content1,
        "Group" => dictionary! { "S" => "Transparency" },
    });
    let content2 = doc.add_object(Stream::new(dictionary! {}, b"0.8 g 0 0 10 10 re f".to_vec()));
    let page2 = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content2,
        "CropBox" => vec![10.into(), 20.into(), 110.into(), 220.into()],
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page1.into(), page2.into()],
            "Count" => 2,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);
    (doc, page1, page2)
}

// ============================================================
// 1. PdfReader
// ============================================================

#[test]
fn test_open_missing_file_is_input_error() {
    let err = PdfReader::open("/nonexistent/input.pdf").err().expect("should fail");
    assert!(matches!(err, PdfMonoError::InputError(_)), "got {err:?}");
}

#[test]
fn test_open_garbage_is_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.pdf");
    std::fs::write(&path, b"this is not a pdf").unwrap();
    let err = PdfReader::open(&path).err().expect("should fail");
    assert!(matches!(err, PdfMonoError::PdfReadError(_)), "got {err:?}");
}

#[test]
fn test_inherited_media_box_and_crop_box() {
    let (doc, _, _) = two_page_doc();
    let reader = PdfReader::from_document(doc);

    assert_eq!(reader.page_count(), 2);
    assert_eq!(reader.page_dimensions(1).unwrap(), (612.0, 792.0));
    assert_eq!(reader.page_visible_box(1).unwrap(), [0.0, 0.0, 612.0, 792.0]);
    assert_eq!(reader.page_visible_box(2).unwrap(), [10.0, 20.0, 110.0, 220.0]);
    assert!(reader.page_dimensions(3).is_err());
}

#[test]
fn test_page_content_stream_reads_bytes() {
    let (doc, _, _) = two_page_doc();
    let reader = PdfReader::from_document(doc);
    let content = reader.page_content_stream(2).unwrap();
    assert!(String::from_utf8_lossy(&content).contains("0.8 g"));
}

#[test]
fn test_page_content_stream_separates_split_contents() {
    let (mut doc, page1, _) = two_page_doc();
    let first = doc.add_object(Stream::new(dictionary! {}, b"0 0 10 10 re f".to_vec()));
    let second = doc.add_object(Stream::new(dictionary! {}, b"Q".to_vec()));
    doc.get_dictionary_mut(page1)
        .unwrap()
        .set("Contents", vec![Object::Reference(first), Object::Reference(second)]);

    let reader = PdfReader::from_document(doc);
    let content = reader.page_content_stream(1).unwrap();
    assert_eq!(content, b"0 0 10 10 re f\nQ".to_vec());
}

// ============================================================
// 2. ページの画像置き換え
// ============================================================

#[test]
fn test_replace_page_keeps_other_pages() {
    let (mut doc, page1, page2) = two_page_doc();
    let jpeg_data = encode_gray_buffer_to_jpeg(vec![128; 16], 4, 4, 80).unwrap();

    let image_id = replace_page_with_image(
        &mut doc,
        page1,
        GrayPageImage {
            jpeg_data,
            width: 4,
            height: 4,
        },
        [0.0, 0.0, 612.0, 792.0],
    )
    .unwrap();

    let page = doc.get_dictionary(page1).unwrap();
    assert!(!page.has(b"Group"), "transparency group is dropped");
    let content = doc.get_page_content(page1).unwrap();
    assert_eq!(content, b"q 612 0 0 792 0 0 cm /Im0 Do Q".to_vec());

    let image = doc.get_object(image_id).and_then(Object::as_stream).unwrap();
    assert_eq!(image.dict.get(b"Filter").unwrap().as_name().unwrap(), b"DCTDecode");
    assert_eq!(image.dict.get(b"ColorSpace").unwrap().as_name().unwrap(), b"DeviceGray");

    let other = doc.get_page_content(page2).unwrap();
    assert!(String::from_utf8_lossy(&other).contains("0.8 g"));
}

// ============================================================
// 3. 最適化
// ============================================================

#[test]
fn test_prune_removes_replaced_content() {
    let (mut doc, page1, _) = two_page_doc();
    let old_content = doc
        .get_dictionary(page1)
        .unwrap()
        .get(b"Contents")
        .and_then(Object::as_reference)
        .unwrap();
    let jpeg_data = encode_gray_buffer_to_jpeg(vec![0; 4], 2, 2, 80).unwrap();
    replace_page_with_image(
        &mut doc,
        page1,
        GrayPageImage {
            jpeg_data,
            width: 2,
            height: 2,
        },
        [0.0, 0.0, 612.0, 792.0],
    )
    .unwrap();

    assert!(delete_unused_objects(&mut doc) >= 1);
    assert!(doc.get_object(old_content).is_err());
}

#[test]
fn test_compress_skips_filtered_and_protected_streams() {
    let mut doc = Document::with_version("1.5");
    let plain = doc.add_object(Stream::new(dictionary! {}, b"0 0 m 10 10 l S ".repeat(50)));
    let mut function = Stream::new(
        dictionary! { "FunctionType" => 4 },
        b"{ 0.755 mul 1 exch sub }".to_vec(),
    );
    function.allows_compression = false;
    let function = doc.add_object(function);

    assert_eq!(compress_streams(&mut doc), 1);

    let plain = doc.get_object(plain).and_then(Object::as_stream).unwrap();
    assert_eq!(plain.dict.get(b"Filter").unwrap().as_name().unwrap(), b"FlateDecode");
    let function = doc.get_object(function).and_then(Object::as_stream).unwrap();
    assert!(!function.dict.has(b"Filter"));
    assert_eq!(function.content, b"{ 0.755 mul 1 exch sub }");
}

#[test]
fn test_optimize_without_compression_keeps_streams_plain() {
    let (mut doc, page1, _) = two_page_doc();
    optimize(&mut doc, false);
    let content_id = doc
        .get_dictionary(page1)
        .unwrap()
        .get(b"Contents")
        .and_then(Object::as_reference)
        .unwrap();
    let stream = doc.get_object(content_id).and_then(Object::as_stream).unwrap();
    assert!(!stream.dict.has(b"Filter"));
}
