use std::path::Path;

use serde::Deserialize;

use crate::color::luminance::DEFAULT_GAMMA;

/// 変換方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionMode {
    /// コンテンツストリーム・画像・色空間を書き換える（既定）
    #[default]
    Vector,
    /// ページ全体をラスタ化してグレー画像に置き換える
    Raster,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub mode: ConversionMode,
    pub gamma: f64,
    pub convert_images: bool,
    pub rewrite_separations: bool,
    pub jpeg_quality: u8,
    pub dpi: u32,
    pub parallel_workers: usize,
    pub compress_streams: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            mode: ConversionMode::Vector,
            gamma: DEFAULT_GAMMA,
            convert_images: true,
            rewrite_separations: true,
            jpeg_quality: 85,
            dpi: 150,
            parallel_workers: 0,
            compress_streams: true,
        }
    }
}

impl Settings {
    pub fn from_yaml(yaml: &str) -> crate::error::Result<Self> {
        // 空ファイルはデフォルト設定として扱う
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yml::from_str(yaml).map_err(|e| {
            crate::error::PdfMonoError::config(format!("Failed to parse settings YAML: {e}"))
        })
    }

    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}
