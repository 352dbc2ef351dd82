// Phase 5: 画像XObjectのグレー変換テスト
//
// テスト用PDFはlopdfで動的に生成する。

use std::collections::HashMap;
use std::io::Read;

use flate2::read::ZlibDecoder;
use lopdf::{Document, Object, ObjectId, Stream, dictionary};

use pdf_mono::color::luminance::{DEFAULT_GAMMA, pixel_to_gray};
use pdf_mono::pdf::image_xobject::ImageOptions;
use pdf_mono::pdf::resources::collect_page_images;
use pdf_mono::pipeline::page_processor::{
    convert_page_images_to_gray, convert_page_images_with_cache,
};

// ============================================================
// Helpers
// ============================================================

fn rgb_image(width: i64, height: i64, samples: Vec<u8>) -> Stream {
    Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width,
            "Height" => height,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        samples,
    )
}

fn form_with_xobjects(doc: &mut Document, xobjects: lopdf::Dictionary) -> ObjectId {
    doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![0.into(), 0.into(), 100.into(), 100.into()],
            "Resources" => dictionary! { "XObject" => xobjects },
        },
        b"/X0 Do".to_vec(),
    ))
}

fn page_with_xobjects(doc: &mut Document, xobjects: lopdf::Dictionary) -> ObjectId {
    let content_id = doc.add_object(Stream::new(dictionary! {}, b"/X0 Do".to_vec()));
    doc.add_object(dictionary! {
        "Type" => "Page",
        "MediaBox" => vec![0.into(), 0.into(), 100.into(), 100.into()],
        "Contents" => content_id,
        "Resources" => dictionary! { "XObject" => xobjects },
    })
}

fn image_entry(doc: &Document, xobjects_owner: ObjectId, name: &[u8]) -> ObjectId {
    let owner = doc.get_object(xobjects_owner).unwrap();
    let dict = match owner {
        Object::Stream(s) => &s.dict,
        Object::Dictionary(d) => d,
        other => panic!("unexpected owner {other:?}"),
    };
    dict.get(b"Resources")
        .and_then(Object::as_dict)
        .and_then(|r| r.get(b"XObject"))
        .and_then(Object::as_dict)
        .and_then(|x| x.get(name))
        .and_then(Object::as_reference)
        .unwrap()
}

fn gray_samples(doc: &Document, image_id: ObjectId) -> Vec<u8> {
    let stream = doc.get_object(image_id).and_then(Object::as_stream).unwrap();
    assert_eq!(
        stream.dict.get(b"ColorSpace").unwrap().as_name().unwrap(),
        b"DeviceGray"
    );
    assert_eq!(
        stream.dict.get(b"Filter").unwrap().as_name().unwrap(),
        b"FlateDecode"
    );
    let mut out = Vec::new();
    ZlibDecoder::new(stream.content.as_slice())
        .read_to_end(&mut out)
        .unwrap();
    out
}

// ============================================================
// 1. 単純なRGB画像
// ============================================================

#[test]
fn test_two_pixel_rgb_image_becomes_gray() {
    let mut doc = Document::with_version("1.5");
    let image_id = doc.add_object(rgb_image(2, 1, vec![255, 0, 0, 0, 255, 0]));
    let page_id = page_with_xobjects(&mut doc, dictionary! { "X0" => image_id });

    let stats = convert_page_images_to_gray(&mut doc, page_id, &ImageOptions::default()).unwrap();
    assert_eq!(stats.converted, 1);

    let new_id = image_entry(&doc, page_id, b"X0");
    assert_ne!(new_id, image_id, "a new image object is created");

    let samples = gray_samples(&doc, new_id);
    assert_eq!(
        samples,
        vec![
            pixel_to_gray(255, 0, 0, DEFAULT_GAMMA),
            pixel_to_gray(0, 255, 0, DEFAULT_GAMMA),
        ]
    );
}

#[test]
fn test_gamma_option_is_applied() {
    let mut doc = Document::with_version("1.5");
    let image_id = doc.add_object(rgb_image(1, 1, vec![128, 128, 128]));
    let page_id = page_with_xobjects(&mut doc, dictionary! { "X0" => image_id });

    let options = ImageOptions {
        gamma: 1.0,
        jpeg_quality: 85,
    };
    convert_page_images_to_gray(&mut doc, page_id, &options).unwrap();

    let samples = gray_samples(&doc, image_entry(&doc, page_id, b"X0"));
    assert_eq!(samples, vec![128]);
}

// ============================================================
// 2. 入れ子のForm XObject
// ============================================================

#[test]
fn test_image_nested_three_forms_deep_is_converted() {
    let mut doc = Document::with_version("1.5");
    let image_id = doc.add_object(rgb_image(1, 1, vec![0, 0, 255]));
    let form3 = form_with_xobjects(&mut doc, dictionary! { "X0" => image_id });
    let form2 = form_with_xobjects(&mut doc, dictionary! { "X0" => form3 });
    let form1 = form_with_xobjects(&mut doc, dictionary! { "X0" => form2 });
    let page_id = page_with_xobjects(&mut doc, dictionary! { "X0" => form1 });

    let refs = collect_page_images(&doc, page_id);
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].depth, 3);

    let stats = convert_page_images_to_gray(&mut doc, page_id, &ImageOptions::default()).unwrap();
    assert_eq!(stats.converted, 1);

    let new_id = image_entry(&doc, form3, b"X0");
    assert_eq!(
        gray_samples(&doc, new_id),
        vec![pixel_to_gray(0, 0, 255, DEFAULT_GAMMA)]
    );
    // 外側のFormは差し替えられない
    assert_eq!(image_entry(&doc, form1, b"X0"), form2);
}

// ============================================================
// 3. 共有画像と変換不要の画像
// ============================================================

#[test]
fn test_image_shared_by_two_pages_is_converted_once() {
    let mut doc = Document::with_version("1.5");
    let image_id = doc.add_object(rgb_image(1, 1, vec![10, 20, 30]));
    let page1 = page_with_xobjects(&mut doc, dictionary! { "X0" => image_id });
    let page2 = page_with_xobjects(&mut doc, dictionary! { "X0" => image_id });

    let mut cache = HashMap::new();
    let options = ImageOptions::default();
    let first = convert_page_images_with_cache(&mut doc, page1, &options, &mut cache).unwrap();
    let second = convert_page_images_with_cache(&mut doc, page2, &options, &mut cache).unwrap();

    assert_eq!(first.converted, 1);
    assert_eq!(second.converted, 0);
    assert_eq!(image_entry(&doc, page1, b"X0"), image_entry(&doc, page2, b"X0"));
}

#[test]
fn test_gray_and_stencil_images_are_unchanged() {
    let mut doc = Document::with_version("1.5");
    let gray_id = doc.add_object(Stream::new(
        dictionary! {
            "Subtype" => "Image",
            "Width" => 1,
            "Height" => 1,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
        },
        vec![42],
    ));
    let stencil_id = doc.add_object(Stream::new(
        dictionary! {
            "Subtype" => "Image",
            "Width" => 8,
            "Height" => 1,
            "ImageMask" => true,
        },
        vec![0b1010_1010],
    ));
    let page_id = page_with_xobjects(
        &mut doc,
        dictionary! { "X0" => gray_id, "X1" => stencil_id },
    );

    let stats = convert_page_images_to_gray(&mut doc, page_id, &ImageOptions::default()).unwrap();
    assert_eq!(stats.converted, 0);
    assert_eq!(stats.unchanged, 2);
    assert_eq!(image_entry(&doc, page_id, b"X0"), gray_id);
    assert_eq!(image_entry(&doc, page_id, b"X1"), stencil_id);
}

#[test]
fn test_undecodable_image_is_skipped_not_fatal() {
    let mut doc = Document::with_version("1.5");
    let broken_id = doc.add_object(rgb_image(4, 4, vec![1, 2, 3]));
    let good_id = doc.add_object(rgb_image(1, 1, vec![255, 255, 255]));
    let page_id = page_with_xobjects(
        &mut doc,
        dictionary! { "X0" => broken_id, "X1" => good_id },
    );

    let stats = convert_page_images_to_gray(&mut doc, page_id, &ImageOptions::default()).unwrap();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.converted, 1);
    assert_eq!(image_entry(&doc, page_id, b"X0"), broken_id);
    assert_eq!(gray_samples(&doc, image_entry(&doc, page_id, b"X1")), vec![255]);
}

// ============================================================
// 4. JPEG画像
// ============================================================

#[test]
fn test_rgb_jpeg_is_reencoded_as_gray_jpeg() {
    use pdf_mono::raster::jpeg::encode_rgb_to_jpeg;

    let rgb = image::RgbImage::from_fn(8, 8, |x, _| {
        if x < 4 {
            image::Rgb([200, 30, 30])
        } else {
            image::Rgb([30, 30, 200])
        }
    });
    let jpeg = encode_rgb_to_jpeg(&rgb, 90).unwrap();

    let mut doc = Document::with_version("1.5");
    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 8,
            "Height" => 8,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        jpeg,
    ));
    let page_id = page_with_xobjects(&mut doc, dictionary! { "X0" => image_id });

    let stats = convert_page_images_to_gray(&mut doc, page_id, &ImageOptions::default()).unwrap();
    assert_eq!(stats.converted, 1);

    let new_id = image_entry(&doc, page_id, b"X0");
    let stream = doc.get_object(new_id).and_then(Object::as_stream).unwrap();
    assert_eq!(stream.dict.get(b"Filter").unwrap().as_name().unwrap(), b"DCTDecode");

    let decoded =
        image::load_from_memory_with_format(&stream.content, image::ImageFormat::Jpeg).unwrap();
    assert!(!decoded.color().has_color(), "output JPEG has one channel");
    assert_eq!((decoded.width(), decoded.height()), (8, 8));
}
