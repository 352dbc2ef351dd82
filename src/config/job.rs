use std::path::Path;

use serde::Deserialize;

use super::settings::ConversionMode;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobFile {
    pub jobs: Vec<Job>,
}

impl JobFile {
    pub fn from_yaml(yaml: &str) -> crate::error::Result<Self> {
        serde_yml::from_str(yaml).map_err(|e| {
            crate::error::PdfMonoError::config(format!("Failed to parse job YAML: {e}"))
        })
    }

    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::PdfMonoError::input(format!(
                "Failed to read job file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_yaml(&content)
    }
}

/// ジョブ定義。`pages` 以外の任意項目はsettings.yamlの値を上書きする。
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Job {
    pub input: String,
    pub output: String,
    /// 変換するページ（1始まり）。省略時は全ページ。
    #[serde(default, deserialize_with = "deserialize_pages")]
    pub pages: Option<Vec<u32>>,
    pub mode: Option<ConversionMode>,
    pub gamma: Option<f64>,
    pub convert_images: Option<bool>,
    pub rewrite_separations: Option<bool>,
    pub jpeg_quality: Option<u8>,
    pub dpi: Option<u32>,
}

/// ページ範囲文字列をパースしてページ番号のベクタに変換する。
///
/// 形式:
/// - 単一ページ: `"5"`
/// - 範囲: `"5-10"` (5, 6, 7, 8, 9, 10)
/// - 混合（カンマ区切り）: `"1, 3, 5-10, 15"`
///
/// 結果はソート済み・重複なし。ページ番号は1始まりで、0はエラー。
pub fn parse_page_range(s: &str) -> crate::error::Result<Vec<u32>> {
    use crate::error::PdfMonoError;

    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(PdfMonoError::config("Page range cannot be empty"));
    }

    let parse_page = |text: &str| -> crate::error::Result<u32> {
        match text.trim().parse::<u32>() {
            Ok(0) => Err(PdfMonoError::config("Page numbers start at 1, got 0")),
            Ok(page) => Ok(page),
            Err(_) => Err(PdfMonoError::config(format!(
                "Invalid page number: '{}'",
                text.trim()
            ))),
        }
    };

    let mut pages = Vec::new();

    for part in trimmed.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some((start_str, end_str)) = part.split_once('-') {
            let start = parse_page(start_str)?;
            let end = parse_page(end_str)?;

            if start > end {
                return Err(PdfMonoError::config(format!(
                    "Invalid page range: start ({start}) > end ({end})"
                )));
            }

            pages.extend(start..=end);
        } else {
            pages.push(parse_page(part)?);
        }
    }

    if pages.is_empty() {
        return Err(PdfMonoError::config("Page range resolved to empty set"));
    }

    pages.sort_unstable();
    pages.dedup();
    Ok(pages)
}

/// `pages: 3` のような数値指定も受け付ける
#[derive(Deserialize)]
#[serde(untagged)]
enum PagesSpec {
    Single(u32),
    Range(String),
}

/// serdeのdeserialize_withで使用するページ範囲デシリアライザ
fn deserialize_pages<'de, D>(deserializer: D) -> Result<Option<Vec<u32>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let spec = Option::<PagesSpec>::deserialize(deserializer)?;
    let text = match spec {
        None => return Ok(None),
        Some(PagesSpec::Single(page)) => page.to_string(),
        Some(PagesSpec::Range(text)) => text,
    };
    parse_page_range(&text)
        .map(Some)
        .map_err(serde::de::Error::custom)
}
