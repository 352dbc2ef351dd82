// Phase 1: 輝度変換（RGB/CMYK → グレー、画素単位のガンマ補正付き変換）

use rayon::prelude::*;

use crate::error::PdfMonoError;

/// ITU-R BT.601 の輝度係数。
const LUMA_R: f64 = 0.299;
const LUMA_G: f64 = 0.587;
const LUMA_B: f64 = 0.114;

/// 画素変換で使うデフォルトのガンマ値。
pub const DEFAULT_GAMMA: f64 = 2.2;

/// この値以下のCMYK成分はインクなし（白）とみなす。
pub const NO_INK_EPSILON: f64 = 0.001;

/// Separationのティント → グレーの線形近似係数。
pub const SEPARATION_TINT_WEIGHT: f64 = 0.755;

/// `separation_tint_to_gray` と等価な Type 4 (PostScript calculator) 関数のプログラム。
pub const SEPARATION_TINT_PROGRAM: &str = "{ 0.755 mul 1 exch sub }";

/// RGB成分 ([0,1]) から輝度を計算する。
///
/// 成分が3つ未満の場合は `InvalidInput` を返す。範囲チェックは呼び出し側の責務。
pub fn rgb_to_gray(components: &[f64]) -> crate::error::Result<f64> {
    match components {
        [r, g, b, ..] => Ok(LUMA_R * r + LUMA_G * g + LUMA_B * b),
        _ => Err(PdfMonoError::invalid_input(format!(
            "RGB color needs 3 components, got {}",
            components.len()
        ))),
    }
}

/// 減法混色の標準式でCMYKをRGBに変換する。
pub fn cmyk_to_rgb(c: f64, m: f64, y: f64, k: f64) -> [f64; 3] {
    [(1.0 - c) * (1.0 - k), (1.0 - m) * (1.0 - k), (1.0 - y) * (1.0 - k)]
}

/// 全成分が [`NO_INK_EPSILON`] 以下（インクなし）かどうか。
pub fn is_no_ink(components: &[f64]) -> bool {
    components.iter().all(|&v| v <= NO_INK_EPSILON)
}

/// CMYK成分 ([0,1]) から輝度を計算する。
///
/// インクなし（白）の色は書き換え対象外なので `None` を返す。
/// 背景やマスクで使われる暗黙の白塗りをそのまま残すための特例。
pub fn cmyk_to_gray(components: &[f64]) -> crate::error::Result<Option<f64>> {
    let [c, m, y, k] = match components {
        [c, m, y, k, ..] => [*c, *m, *y, *k],
        _ => {
            return Err(PdfMonoError::invalid_input(format!(
                "CMYK color needs 4 components, got {}",
                components.len()
            )));
        }
    };

    if is_no_ink(&[c, m, y, k]) {
        return Ok(None);
    }

    rgb_to_gray(&cmyk_to_rgb(c, m, y, k)).map(Some)
}

/// 8bit RGB画素をガンマ補正付きで8bitグレーに変換する。
///
/// `gray = clamp(round(pow(luma, 1/gamma) * 255))`。
/// `gamma == 1.0` で補正なし。
pub fn pixel_to_gray(r: u8, g: u8, b: u8, gamma: f64) -> u8 {
    let luma = (LUMA_R * r as f64 + LUMA_G * g as f64 + LUMA_B * b as f64) / 255.0;
    let corrected = luma.powf(1.0 / gamma);
    (corrected * 255.0).round().clamp(0.0, 255.0) as u8
}

/// 8bit RGBバッファ全体をグレーに変換する（行単位で並列）。
///
/// 入力は読み取り専用、出力は行ごとに独立した領域へ書き込むためロック不要。
pub fn rgb_buffer_to_gray(
    rgb: &[u8],
    width: u32,
    height: u32,
    gamma: f64,
) -> crate::error::Result<Vec<u8>> {
    if !gamma.is_finite() || gamma <= 0.0 {
        return Err(PdfMonoError::invalid_input(format!(
            "gamma must be a positive finite number, got {gamma}"
        )));
    }

    let row_len = width as usize;
    let expected = row_len
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(3))
        .ok_or_else(|| {
            PdfMonoError::invalid_input(format!("image too large: {width}x{height}"))
        })?;
    if rgb.len() < expected {
        return Err(PdfMonoError::invalid_input(format!(
            "RGB buffer too short: expected {expected} bytes, got {}",
            rgb.len()
        )));
    }

    let mut gray = vec![0u8; row_len * height as usize];
    if row_len == 0 {
        return Ok(gray);
    }

    gray.par_chunks_mut(row_len)
        .zip(rgb[..expected].par_chunks(row_len * 3))
        .for_each(|(dst, src)| {
            for (out, px) in dst.iter_mut().zip(src.chunks_exact(3)) {
                *out = pixel_to_gray(px[0], px[1], px[2], gamma);
            }
        });

    Ok(gray)
}

/// Separationのティント値を `1 - 0.755·tint` でグレーに写像する。
pub fn separation_tint_to_gray(tint: f64) -> f64 {
    (1.0 - SEPARATION_TINT_WEIGHT * tint.clamp(0.0, 1.0)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_rgb_to_gray_primaries() {
        assert!((rgb_to_gray(&[1.0, 0.0, 0.0]).unwrap() - 0.299).abs() < EPS);
        assert!((rgb_to_gray(&[0.0, 1.0, 0.0]).unwrap() - 0.587).abs() < EPS);
        assert!((rgb_to_gray(&[0.0, 0.0, 1.0]).unwrap() - 0.114).abs() < EPS);
        assert!((rgb_to_gray(&[1.0, 1.0, 1.0]).unwrap() - 1.0).abs() < EPS);
    }

    #[test]
    fn test_rgb_to_gray_stays_in_unit_range() {
        let steps = [0.0, 0.1, 0.25, 0.5, 0.75, 0.9, 1.0];
        for &r in &steps {
            for &g in &steps {
                for &b in &steps {
                    let gray = rgb_to_gray(&[r, g, b]).unwrap();
                    assert!((0.0..=1.0 + EPS).contains(&gray), "{r} {g} {b} -> {gray}");
                    let expected = 0.299 * r + 0.587 * g + 0.114 * b;
                    assert!((gray - expected).abs() < EPS);
                }
            }
        }
    }

    #[test]
    fn test_rgb_to_gray_too_few_components() {
        let err = rgb_to_gray(&[0.5, 0.5]).unwrap_err();
        assert!(matches!(err, PdfMonoError::InvalidInput(_)));
    }

    #[test]
    fn test_cmyk_to_gray_black_and_cyan() {
        let black = cmyk_to_gray(&[0.0, 0.0, 0.0, 1.0]).unwrap().unwrap();
        assert!(black.abs() < EPS);

        // シアン100% → RGB(0,1,1)
        let cyan = cmyk_to_gray(&[1.0, 0.0, 0.0, 0.0]).unwrap().unwrap();
        assert!((cyan - (0.587 + 0.114)).abs() < EPS);
    }

    #[test]
    fn test_cmyk_no_ink_is_not_converted() {
        assert_eq!(cmyk_to_gray(&[0.0, 0.0, 0.0, 0.0]).unwrap(), None);
        assert_eq!(cmyk_to_gray(&[0.001, 0.0005, 0.0, 0.001]).unwrap(), None);
        assert!(cmyk_to_gray(&[0.0, 0.0, 0.0, 0.002]).unwrap().is_some());
    }

    #[test]
    fn test_cmyk_to_gray_too_few_components() {
        let err = cmyk_to_gray(&[0.1, 0.2, 0.3]).unwrap_err();
        assert!(matches!(err, PdfMonoError::InvalidInput(_)));
    }

    #[test]
    fn test_pixel_to_gray_extremes() {
        assert_eq!(pixel_to_gray(0, 0, 0, DEFAULT_GAMMA), 0);
        assert_eq!(pixel_to_gray(255, 255, 255, DEFAULT_GAMMA), 255);
    }

    #[test]
    fn test_pixel_to_gray_gamma_one_is_plain_luma() {
        // 0.299 * 255 = 76.245 → 76
        assert_eq!(pixel_to_gray(255, 0, 0, 1.0), 76);
    }

    #[test]
    fn test_pixel_to_gray_gamma_brightens_midtones() {
        let plain = pixel_to_gray(128, 128, 128, 1.0);
        let corrected = pixel_to_gray(128, 128, 128, DEFAULT_GAMMA);
        assert!(corrected > plain);
    }

    #[test]
    fn test_rgb_buffer_to_gray_matches_per_pixel() {
        let rgb = [255u8, 0, 0, 0, 255, 0, 0, 0, 255, 10, 20, 30];
        let gray = rgb_buffer_to_gray(&rgb, 2, 2, DEFAULT_GAMMA).unwrap();
        let expected: Vec<u8> = rgb
            .chunks_exact(3)
            .map(|p| pixel_to_gray(p[0], p[1], p[2], DEFAULT_GAMMA))
            .collect();
        assert_eq!(gray, expected);
    }

    #[test]
    fn test_rgb_buffer_to_gray_short_buffer() {
        assert!(rgb_buffer_to_gray(&[0u8; 5], 2, 1, DEFAULT_GAMMA).is_err());
    }

    #[test]
    fn test_rgb_buffer_to_gray_rejects_bad_gamma() {
        assert!(rgb_buffer_to_gray(&[0u8; 3], 1, 1, 0.0).is_err());
        assert!(rgb_buffer_to_gray(&[0u8; 3], 1, 1, f64::NAN).is_err());
    }

    #[test]
    fn test_separation_tint_to_gray() {
        assert!((separation_tint_to_gray(0.0) - 1.0).abs() < EPS);
        assert!((separation_tint_to_gray(1.0) - 0.245).abs() < EPS);
        assert!((separation_tint_to_gray(2.0) - 0.245).abs() < EPS);
    }
}
