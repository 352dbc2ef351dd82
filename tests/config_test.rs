// Phase 1: 設定ファイル解析テスト

use std::io::Write;
use std::path::Path;

use pdf_mono::config::job::{JobFile, parse_page_range};
use pdf_mono::config::merged::MergedConfig;
use pdf_mono::config::settings::{ConversionMode, Settings};
use pdf_mono::config::{load_settings_for_job, resolve_path};
use pdf_mono::error::PdfMonoError;

// ============================================================
// 1. ページ範囲パーサ
// ============================================================

#[test]
fn test_parse_page_range_mixed() {
    let result = parse_page_range("1, 3, 5-7, 15").expect("should parse mixed");
    assert_eq!(result, vec![1, 3, 5, 6, 7, 15]);
}

#[test]
fn test_parse_page_range_sorts_and_dedups() {
    let result = parse_page_range("5, 1-3, 2").expect("should parse");
    assert_eq!(result, vec![1, 2, 3, 5]);
}

#[test]
fn test_parse_page_range_rejects_zero() {
    assert!(parse_page_range("0").is_err());
    assert!(parse_page_range("0-3").is_err());
}

#[test]
fn test_parse_page_range_rejects_reversed_and_garbage() {
    assert!(parse_page_range("10-5").is_err());
    assert!(parse_page_range("abc").is_err());
    assert!(parse_page_range("").is_err());
    assert!(parse_page_range(" , ").is_err());
}

// ============================================================
// 2. settings.yaml
// ============================================================

#[test]
fn test_settings_defaults() {
    let settings = Settings::default();
    assert_eq!(settings.mode, ConversionMode::Vector);
    assert!((settings.gamma - 2.2).abs() < f64::EPSILON);
    assert!(settings.convert_images);
    assert!(settings.rewrite_separations);
    assert_eq!(settings.jpeg_quality, 85);
    assert_eq!(settings.dpi, 150);
    assert_eq!(settings.parallel_workers, 0);
    assert!(settings.compress_streams);
}

#[test]
fn test_settings_partial_yaml_keeps_defaults() {
    let settings = Settings::from_yaml("gamma: 1.8\nmode: raster\n").unwrap();
    assert_eq!(settings.mode, ConversionMode::Raster);
    assert!((settings.gamma - 1.8).abs() < f64::EPSILON);
    assert_eq!(settings.dpi, 150);
}

#[test]
fn test_settings_empty_yaml_is_default() {
    let settings = Settings::from_yaml("   \n").unwrap();
    assert_eq!(settings.jpeg_quality, 85);
}

#[test]
fn test_settings_unknown_key_is_rejected() {
    let err = Settings::from_yaml("gama: 2.0\n").unwrap_err();
    assert!(matches!(err, PdfMonoError::ConfigError(_)), "got {err:?}");
}

#[test]
fn test_settings_unknown_mode_is_rejected() {
    assert!(Settings::from_yaml("mode: sepia\n").is_err());
}

// ============================================================
// 3. ジョブファイル
// ============================================================

#[test]
fn test_job_file_with_overrides_and_pages() {
    let yaml = r#"
jobs:
  - input: a.pdf
    output: a_gray.pdf
  - input: b.pdf
    output: b_gray.pdf
    pages: "1-3, 7"
    gamma: 1.0
    convert_images: false
  - input: c.pdf
    output: c_gray.pdf
    pages: 4
    mode: raster
"#;
    let job_file = JobFile::from_yaml(yaml).unwrap();
    assert_eq!(job_file.jobs.len(), 3);
    assert_eq!(job_file.jobs[0].pages, None);
    assert_eq!(job_file.jobs[1].pages, Some(vec![1, 2, 3, 7]));
    assert_eq!(job_file.jobs[2].pages, Some(vec![4]));

    let settings = Settings::default();
    let merged = MergedConfig::new(&settings, &job_file.jobs[1]);
    assert!((merged.gamma - 1.0).abs() < f64::EPSILON);
    assert!(!merged.convert_images);
    assert!(merged.rewrite_separations);

    let merged = MergedConfig::new(&settings, &job_file.jobs[2]);
    assert_eq!(merged.mode, ConversionMode::Raster);
}

#[test]
fn test_job_file_bad_page_range_is_error() {
    let yaml = "jobs:\n  - input: a.pdf\n    output: b.pdf\n    pages: \"3-1\"\n";
    assert!(JobFile::from_yaml(yaml).is_err());
}

#[test]
fn test_job_file_missing_is_input_error() {
    let err = JobFile::from_file(Path::new("/nonexistent/jobs.yaml")).unwrap_err();
    assert!(matches!(err, PdfMonoError::InputError(_)), "got {err:?}");
}

#[test]
fn test_settings_loaded_next_to_job_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = std::fs::File::create(dir.path().join("settings.yaml")).unwrap();
    writeln!(settings, "jpeg_quality: 60").unwrap();

    let loaded = load_settings_for_job(&dir.path().join("jobs.yaml")).unwrap();
    assert_eq!(loaded.jpeg_quality, 60);

    let empty_dir = tempfile::tempdir().unwrap();
    let loaded = load_settings_for_job(&empty_dir.path().join("jobs.yaml")).unwrap();
    assert_eq!(loaded.jpeg_quality, 85);
}

#[test]
fn test_resolve_path_relative_and_absolute() {
    let base = Path::new("/work/jobs");
    assert_eq!(resolve_path(base, "in.pdf"), Path::new("/work/jobs/in.pdf"));
    assert_eq!(resolve_path(base, "/abs/in.pdf"), Path::new("/abs/in.pdf"));
}

// ============================================================
// 4. 検証
// ============================================================

#[test]
fn test_validate_ranges() {
    let mut config = MergedConfig::default();
    assert!(config.validate().is_ok());

    config.gamma = 0.0;
    assert!(config.validate().is_err());
    config.gamma = f64::INFINITY;
    assert!(config.validate().is_err());
    config.gamma = 2.2;

    config.jpeg_quality = 0;
    assert!(config.validate().is_err());
    config.jpeg_quality = 100;
    assert!(config.validate().is_ok());

    config.dpi = 0;
    assert!(config.validate().is_err());
    config.dpi = 1201;
    assert!(config.validate().is_err());
}
