use super::job::Job;
use super::settings::{ConversionMode, Settings};
use crate::error::PdfMonoError;

#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub mode: ConversionMode,
    pub gamma: f64,
    pub convert_images: bool,
    pub rewrite_separations: bool,
    pub jpeg_quality: u8,
    pub dpi: u32,
    pub parallel_workers: usize,
    pub compress_streams: bool,
}

impl MergedConfig {
    /// JobのOption値がSomeならJobの値を、NoneならSettingsの値を使用する。
    pub fn new(settings: &Settings, job: &Job) -> Self {
        MergedConfig {
            mode: job.mode.unwrap_or(settings.mode),
            gamma: job.gamma.unwrap_or(settings.gamma),
            convert_images: job.convert_images.unwrap_or(settings.convert_images),
            rewrite_separations: job
                .rewrite_separations
                .unwrap_or(settings.rewrite_separations),
            jpeg_quality: job.jpeg_quality.unwrap_or(settings.jpeg_quality),
            dpi: job.dpi.unwrap_or(settings.dpi),
            parallel_workers: settings.parallel_workers,
            compress_streams: settings.compress_streams,
        }
    }

    /// 値の範囲を検証する。
    pub fn validate(&self) -> crate::error::Result<()> {
        if !self.gamma.is_finite() || self.gamma <= 0.0 {
            return Err(PdfMonoError::config(format!(
                "gamma must be a positive finite number, got {}",
                self.gamma
            )));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(PdfMonoError::config(format!(
                "jpeg_quality must be 1-100, got {}",
                self.jpeg_quality
            )));
        }
        if !(1..=1200).contains(&self.dpi) {
            return Err(PdfMonoError::config(format!(
                "dpi must be 1-1200, got {}",
                self.dpi
            )));
        }
        Ok(())
    }
}

impl Default for MergedConfig {
    fn default() -> Self {
        let settings = Settings::default();
        MergedConfig {
            mode: settings.mode,
            gamma: settings.gamma,
            convert_images: settings.convert_images,
            rewrite_separations: settings.rewrite_separations,
            jpeg_quality: settings.jpeg_quality,
            dpi: settings.dpi,
            parallel_workers: settings.parallel_workers,
            compress_streams: settings.compress_streams,
        }
    }
}
