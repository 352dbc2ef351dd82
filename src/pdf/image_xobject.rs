// Phase 5: 画像XObjectのデコード → グレー変換 → 再エンコード

use std::io::Read;

use flate2::read::ZlibDecoder;
use lopdf::{Dictionary, Document, Object, Stream, dictionary};
use rayon::prelude::*;

use crate::color::luminance::{DEFAULT_GAMMA, cmyk_to_rgb, rgb_buffer_to_gray};
use crate::error::PdfMonoError;
use crate::raster::jpeg;

/// 画像変換のオプション
#[derive(Debug, Clone, Copy)]
pub struct ImageOptions {
    pub gamma: f64,
    /// JPEG入力をJPEGで再エンコードするときの品質
    pub jpeg_quality: u8,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            gamma: DEFAULT_GAMMA,
            jpeg_quality: 85,
        }
    }
}

/// 解決済みの画像色空間
#[derive(Debug, Clone, PartialEq)]
pub enum ImageColorSpace {
    Gray,
    Rgb,
    Cmyk,
    Indexed {
        base: Box<ImageColorSpace>,
        lookup: Vec<u8>,
    },
    Unsupported(String),
}

impl ImageColorSpace {
    fn components(&self) -> Option<usize> {
        match self {
            ImageColorSpace::Gray => Some(1),
            ImageColorSpace::Rgb => Some(3),
            ImageColorSpace::Cmyk => Some(4),
            ImageColorSpace::Indexed { .. } | ImageColorSpace::Unsupported(_) => None,
        }
    }

    /// 既にグレーで、変換の必要がないか
    pub fn is_gray(&self) -> bool {
        match self {
            ImageColorSpace::Gray => true,
            ImageColorSpace::Indexed { base, .. } => base.is_gray(),
            _ => false,
        }
    }
}

/// 画像XObjectのメタデータ
#[derive(Debug, Clone)]
pub struct ImageMeta {
    pub width: u32,
    pub height: u32,
    pub bits_per_component: u8,
    pub color_space: ImageColorSpace,
    /// レポート用の色空間名（ICCBased等の元の名前）
    pub color_space_name: String,
    pub filters: Vec<String>,
    pub is_stencil: bool,
}

impl ImageMeta {
    fn is_jpeg(&self) -> bool {
        matches!(self.filters.as_slice(), [f] if f == "DCTDecode")
    }
}

/// 画像XObjectのストリームから画像メタデータを読み取る。
///
/// 色空間が参照やICCBased/Indexedの配列で指定されている場合に備え、
/// ドキュメントを引いて解決する。
pub fn read_image_meta(doc: &Document, stream: &Stream) -> crate::error::Result<ImageMeta> {
    let dict = &stream.dict;

    let width = dict_get_u32(dict, b"Width")?;
    let height = dict_get_u32(dict, b"Height")?;
    let is_stencil = matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true)));
    // BitsPerComponent: missing keyの場合のみデフォルト8、型エラーは伝播
    let bits_per_component = match dict.get(b"BitsPerComponent") {
        Ok(_) => {
            let bpc = dict_get_u32(dict, b"BitsPerComponent")?;
            u8::try_from(bpc).map_err(|_| {
                PdfMonoError::decode(format!("Invalid BitsPerComponent: {bpc}"))
            })?
        }
        Err(_) if is_stencil => 1,
        Err(_) => 8,
    };

    let (color_space, color_space_name) = match dict.get(b"ColorSpace") {
        Ok(obj) => (
            resolve_color_space(doc, obj, 0),
            color_space_label(doc, obj),
        ),
        Err(_) if is_stencil => (ImageColorSpace::Gray, "ImageMask".to_string()),
        Err(_) => (
            ImageColorSpace::Unsupported("(none)".to_string()),
            "(none)".to_string(),
        ),
    };

    let filters = match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![String::from_utf8_lossy(name).into_owned()],
        Ok(Object::Array(arr)) => arr
            .iter()
            .filter_map(|obj| obj.as_name().ok())
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .collect(),
        _ => Vec::new(),
    };

    Ok(ImageMeta {
        width,
        height,
        bits_per_component,
        color_space,
        color_space_name,
        filters,
        is_stencil,
    })
}

/// 色空間の名前（配列の場合は先頭の名前）を返す。
pub(crate) fn color_space_label(doc: &Document, obj: &Object) -> String {
    match obj {
        Object::Reference(id) => doc
            .get_object(*id)
            .map(|o| color_space_label(doc, o))
            .unwrap_or_else(|_| "(unresolved)".to_string()),
        Object::Name(name) => String::from_utf8_lossy(name).into_owned(),
        Object::Array(arr) => arr
            .first()
            .and_then(|o| o.as_name().ok())
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .unwrap_or_else(|| "(unknown)".to_string()),
        _ => "(unknown)".to_string(),
    }
}

const MAX_COLOR_SPACE_DEPTH: usize = 8;

fn resolve_color_space(doc: &Document, obj: &Object, depth: usize) -> ImageColorSpace {
    if depth > MAX_COLOR_SPACE_DEPTH {
        return ImageColorSpace::Unsupported("(too deep)".to_string());
    }

    match obj {
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(resolved) => resolve_color_space(doc, resolved, depth + 1),
            Err(_) => ImageColorSpace::Unsupported("(unresolved)".to_string()),
        },
        Object::Name(name) => match name.as_slice() {
            b"DeviceGray" | b"G" | b"CalGray" => ImageColorSpace::Gray,
            b"DeviceRGB" | b"RGB" | b"CalRGB" => ImageColorSpace::Rgb,
            b"DeviceCMYK" | b"CMYK" => ImageColorSpace::Cmyk,
            other => ImageColorSpace::Unsupported(String::from_utf8_lossy(other).into_owned()),
        },
        Object::Array(arr) => {
            let Some(family) = arr.first().and_then(|o| o.as_name().ok()) else {
                return ImageColorSpace::Unsupported("(unknown)".to_string());
            };
            match family {
                b"ICCBased" => icc_components(doc, arr.get(1)),
                b"CalGray" => ImageColorSpace::Gray,
                b"CalRGB" => ImageColorSpace::Rgb,
                b"Indexed" | b"I" => {
                    let base = arr
                        .get(1)
                        .map(|b| resolve_color_space(doc, b, depth + 1))
                        .unwrap_or_else(|| ImageColorSpace::Unsupported("(none)".to_string()));
                    match arr.get(3).and_then(|l| lookup_bytes(doc, l)) {
                        Some(lookup) => ImageColorSpace::Indexed {
                            base: Box::new(base),
                            lookup,
                        },
                        None => ImageColorSpace::Unsupported("Indexed".to_string()),
                    }
                }
                other => ImageColorSpace::Unsupported(String::from_utf8_lossy(other).into_owned()),
            }
        }
        _ => ImageColorSpace::Unsupported("(unknown)".to_string()),
    }
}

/// ICCBasedはプロファイルの /N（成分数）でデバイス色空間とみなす。
fn icc_components(doc: &Document, profile: Option<&Object>) -> ImageColorSpace {
    let n = profile
        .and_then(|p| p.as_reference().ok())
        .and_then(|id| doc.get_object(id).ok())
        .and_then(|o| o.as_stream().ok())
        .and_then(|s| s.dict.get(b"N").and_then(Object::as_i64).ok());
    match n {
        Some(1) => ImageColorSpace::Gray,
        Some(3) => ImageColorSpace::Rgb,
        Some(4) => ImageColorSpace::Cmyk,
        _ => ImageColorSpace::Unsupported("ICCBased".to_string()),
    }
}

fn lookup_bytes(doc: &Document, obj: &Object) -> Option<Vec<u8>> {
    match obj {
        Object::String(bytes, _) => Some(bytes.clone()),
        Object::Reference(id) => {
            let stream = doc.get_object(*id).ok()?.as_stream().ok()?;
            if stream.dict.has(b"Filter") {
                stream.decompressed_content().ok()
            } else {
                Some(stream.content.clone())
            }
        }
        _ => None,
    }
}

/// 辞書からu32値を取得するヘルパー（負の値はエラー）
fn dict_get_u32(dict: &Dictionary, key: &[u8]) -> crate::error::Result<u32> {
    let key_name = String::from_utf8_lossy(key);
    match dict.get(key) {
        Ok(Object::Integer(i)) => u32::try_from(*i).map_err(|_| {
            PdfMonoError::decode(format!("Value out of u32 range for {key_name}: {i}"))
        }),
        Ok(Object::Real(f)) if *f >= 0.0 && *f <= u32::MAX as f32 => Ok(*f as u32),
        Ok(other) => Err(PdfMonoError::decode(format!(
            "Expected integer for {key_name}, got {:?}",
            other
        ))),
        Err(_) => Err(PdfMonoError::decode(format!(
            "Missing required key: {key_name}"
        ))),
    }
}

/// 画像XObjectをグレーの新しいストリームに変換する。
///
/// 元のストリームは変更しない。既にグレーの画像とステンシルマスクは
/// 変換不要なので `None` を返す。
///
/// 出力は DeviceGray / 8bit。元がJPEGならJPEG、それ以外はFlateで圧縮する。
pub fn convert_image_stream(
    stream: &Stream,
    meta: &ImageMeta,
    options: &ImageOptions,
) -> crate::error::Result<Option<Stream>> {
    if meta.is_stencil || meta.color_space.is_gray() {
        return Ok(None);
    }

    let rgb = if meta.is_jpeg() {
        let img = image::load_from_memory_with_format(&stream.content, image::ImageFormat::Jpeg)
            .map_err(|e| PdfMonoError::decode(format!("JPEG decode error: {}", e)))?;
        if !img.color().has_color() {
            return Ok(None);
        }
        if (img.width(), img.height()) != (meta.width, meta.height) {
            return Err(PdfMonoError::decode(format!(
                "JPEG size {}x{} does not match image dictionary {}x{}",
                img.width(),
                img.height(),
                meta.width,
                meta.height
            )));
        }
        img.to_rgb8().into_raw()
    } else {
        let raw = decode_stream_bytes(stream, meta)?;
        raw_to_rgb(&raw, meta)?
    };

    let gray = rgb_buffer_to_gray(&rgb, meta.width, meta.height, options.gamma)
        .map_err(|e| PdfMonoError::decode(e.to_string()))?;

    let (data, filter) = if meta.is_jpeg() {
        (
            jpeg::encode_gray_buffer_to_jpeg(gray, meta.width, meta.height, options.jpeg_quality)?,
            "DCTDecode",
        )
    } else {
        (flate_encode(&gray)?, "FlateDecode")
    };

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => meta.width as i64,
        "Height" => meta.height as i64,
        "ColorSpace" => "DeviceGray",
        "BitsPerComponent" => 8,
        "Filter" => filter,
    };
    for key in [b"SMask".as_slice(), b"Interpolate", b"Intent"] {
        if let Ok(value) = stream.dict.get(key) {
            dict.set(key.to_vec(), value.clone());
        }
    }
    // 色キーマスク（配列）は元の色成分値を前提にしているので引き継がない
    if let Ok(mask @ Object::Reference(_)) = stream.dict.get(b"Mask") {
        dict.set("Mask", mask.clone());
    }

    Ok(Some(Stream::new(dict, data)))
}

/// フィルタを外した生のサンプル列を返す。
///
/// 予測子なしの単独FlateDecodeはflate2で直接展開し、それ以外
/// （DecodeParms付き、LZW、ASCII系など）はlopdfの展開に任せる。
fn decode_stream_bytes(stream: &Stream, meta: &ImageMeta) -> crate::error::Result<Vec<u8>> {
    match meta.filters.as_slice() {
        [] => Ok(stream.content.clone()),
        [f] if f == "FlateDecode" && !stream.dict.has(b"DecodeParms") => {
            let mut decoder = ZlibDecoder::new(stream.content.as_slice());
            let mut decompressed = Vec::new();
            decoder
                .read_to_end(&mut decompressed)
                .map_err(|e| PdfMonoError::decode(format!("FlateDecode error: {}", e)))?;
            Ok(decompressed)
        }
        filters => stream.decompressed_content().map_err(|e| {
            PdfMonoError::decode(format!("Unsupported image filter {:?}: {}", filters, e))
        }),
    }
}

/// 8bitのサンプル列をRGBバッファに展開する。
fn raw_to_rgb(raw: &[u8], meta: &ImageMeta) -> crate::error::Result<Vec<u8>> {
    if meta.bits_per_component != 8 {
        return Err(PdfMonoError::decode(format!(
            "Unsupported bits per component: {}",
            meta.bits_per_component
        )));
    }

    let pixels = (meta.width as usize)
        .checked_mul(meta.height as usize)
        .ok_or_else(|| {
            PdfMonoError::decode(format!("image too large: {}x{}", meta.width, meta.height))
        })?;

    let need = |components: usize| take_samples(raw, pixels * components, meta);

    match &meta.color_space {
        ImageColorSpace::Rgb => Ok(need(3)?.to_vec()),
        ImageColorSpace::Cmyk => Ok(need(4)?
            .par_chunks_exact(4)
            .flat_map_iter(sample_to_rgb_cmyk)
            .collect()),
        ImageColorSpace::Indexed { base, lookup } => {
            let components = base.components().ok_or_else(|| {
                PdfMonoError::decode(format!(
                    "Unsupported Indexed base color space: {:?}",
                    base
                ))
            })?;
            let entries = lookup.len() / components;
            if entries == 0 {
                return Err(PdfMonoError::decode("Indexed lookup table is empty"));
            }
            let mut rgb = Vec::with_capacity(pixels * 3);
            for &index in need(1)? {
                // 範囲外のインデックスは最後のエントリに丸める
                let entry = (index as usize).min(entries - 1) * components;
                rgb.extend(sample_to_rgb(base, &lookup[entry..entry + components]));
            }
            Ok(rgb)
        }
        ImageColorSpace::Gray => Ok(need(1)?.iter().flat_map(|&v| [v, v, v]).collect()),
        ImageColorSpace::Unsupported(name) => Err(PdfMonoError::decode(format!(
            "Unsupported image color space: {}",
            name
        ))),
    }
}

fn take_samples<'a>(
    raw: &'a [u8],
    expected: usize,
    meta: &ImageMeta,
) -> crate::error::Result<&'a [u8]> {
    raw.get(..expected).ok_or_else(|| {
        PdfMonoError::decode(format!(
            "{} data too short: expected {}, got {}",
            meta.color_space_name,
            expected,
            raw.len()
        ))
    })
}

fn sample_to_rgb(space: &ImageColorSpace, sample: &[u8]) -> [u8; 3] {
    match (space, sample) {
        (ImageColorSpace::Rgb, [r, g, b, ..]) => [*r, *g, *b],
        (ImageColorSpace::Cmyk, cmyk) => sample_to_rgb_cmyk(cmyk),
        (_, [v, ..]) => [*v, *v, *v],
        _ => [0, 0, 0],
    }
}

fn sample_to_rgb_cmyk(sample: &[u8]) -> [u8; 3] {
    let unit = |v: u8| v as f64 / 255.0;
    let [c, m, y, k] = [sample[0], sample[1], sample[2], sample[3]].map(unit);
    cmyk_to_rgb(c, m, y, k).map(|v| (v * 255.0).round().clamp(0.0, 255.0) as u8)
}

/// zlibで圧縮
pub(crate) fn flate_encode(data: &[u8]) -> crate::error::Result<Vec<u8>> {
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use std::io::Write;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| PdfMonoError::decode(format!("Flate encode error: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| PdfMonoError::decode(format!("Flate encode error: {}", e)))
}
