// PDF構造の調査レポート（画像XObject、色オペレータ、ペイントオペレータ）

use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::path::Path;

use lopdf::{Document, ObjectId};
use serde::Serialize;
use tracing::debug;

use crate::color::luminance::cmyk_to_rgb;
use crate::error::PdfMonoError;
use crate::pdf::content_stream::{Token, tokenize};
use crate::pdf::image_xobject::read_image_meta;
use crate::pdf::reader::{PdfReader, page_content};
use crate::pdf::resources::{DictPath, follow, for_each_xobject, page_resources, subtype_is};

/// 近似色名の候補（RGB）
const NAMED_COLORS: [(&str, [u8; 3]); 10] = [
    ("Black", [0, 0, 0]),
    ("White", [255, 255, 255]),
    ("Red", [255, 0, 0]),
    ("Green", [0, 255, 0]),
    ("Blue", [0, 0, 255]),
    ("Cyan", [0, 255, 255]),
    ("Magenta", [255, 0, 255]),
    ("Yellow", [255, 255, 0]),
    ("Gray", [128, 128, 128]),
    ("Orange", [255, 165, 0]),
];

#[derive(Debug, Clone, Serialize)]
pub struct InspectionReport {
    pub source: String,
    pub pages: Vec<PageReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageReport {
    pub page: u32,
    /// リソースツリーの深さ優先順
    pub xobjects: Vec<XObjectReport>,
    pub color_operators: BTreeMap<String, usize>,
    pub cmyk_colors: Vec<CmykColor>,
    pub paint_operators: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum XObjectReport {
    Image {
        name: String,
        width: u32,
        height: u32,
        color_space: String,
        bits_per_component: u8,
        stencil: bool,
        filter: Option<String>,
        depth: usize,
    },
    Form {
        name: String,
        depth: usize,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct CmykColor {
    pub cmyk: [f64; 4],
    pub rgb: [u8; 3],
    pub approximate: String,
}

/// PDFファイルを開いて調査レポートを作る。
pub fn inspect(path: impl AsRef<Path>) -> crate::error::Result<InspectionReport> {
    let path = path.as_ref();
    let reader = PdfReader::open(path)?;
    inspect_document(reader.document(), &path.display().to_string())
}

pub fn inspect_document(doc: &Document, source: &str) -> crate::error::Result<InspectionReport> {
    let mut pages = Vec::new();
    for (page_num, page_id) in doc.get_pages() {
        debug!(page = page_num, "inspecting page");
        pages.push(inspect_page(doc, page_num, page_id)?);
    }
    Ok(InspectionReport {
        source: source.to_string(),
        pages,
    })
}

fn inspect_page(doc: &Document, page: u32, page_id: ObjectId) -> crate::error::Result<PageReport> {
    let mut xobjects = Vec::new();
    if let Some(resources) = page_resources(doc, page_id) {
        let mut visited = HashSet::new();
        collect_xobjects(doc, &resources, 0, &mut visited, &mut xobjects);
    }

    let content = page_content(doc, page_id).map_err(|e| e.at_page(page, "inspect"))?;
    let tokens = tokenize(&content).map_err(|e| e.at_page(page, "inspect"))?;

    let mut report = PageReport {
        page,
        xobjects,
        color_operators: BTreeMap::new(),
        cmyk_colors: Vec::new(),
        paint_operators: BTreeMap::new(),
    };
    analyze_tokens(&tokens, &mut report);
    Ok(report)
}

/// XObjectをリソースツリーの深さ優先順に記録する。
fn collect_xobjects(
    doc: &Document,
    resources: &DictPath,
    depth: usize,
    visited: &mut HashSet<DictPath>,
    out: &mut Vec<XObjectReport>,
) {
    if !visited.insert(resources.clone()) {
        return;
    }

    let mut entries = Vec::new();
    for_each_xobject(doc, resources, |name, id, stream| {
        entries.push((String::from_utf8_lossy(name).into_owned(), id, stream));
    });

    for (name, id, stream) in entries {
        if subtype_is(&stream.dict, b"Image") {
            match read_image_meta(doc, stream) {
                Ok(meta) => out.push(XObjectReport::Image {
                    name,
                    width: meta.width,
                    height: meta.height,
                    color_space: meta.color_space_name,
                    bits_per_component: meta.bits_per_component,
                    stencil: meta.is_stencil,
                    filter: (!meta.filters.is_empty()).then(|| meta.filters.join(" ")),
                    depth,
                }),
                Err(e) => debug!(image = %name, error = %e, "unreadable image dictionary"),
            }
        } else if subtype_is(&stream.dict, b"Form") {
            out.push(XObjectReport::Form {
                name,
                depth,
            });
            if let Some(nested) = follow(doc, &DictPath::object(id), b"Resources") {
                collect_xobjects(doc, &nested, depth + 1, visited, out);
            }
        }
    }
}

fn color_space_label(operator: &str) -> Option<&'static str> {
    Some(match operator {
        "rg" => "DeviceRGB (nonstroking)",
        "RG" => "DeviceRGB (stroking)",
        "g" => "DeviceGray (nonstroking)",
        "G" => "DeviceGray (stroking)",
        "k" => "DeviceCMYK (nonstroking)",
        "K" => "DeviceCMYK (stroking)",
        "sc" | "scn" => "Color space operand (nonstroking)",
        "SC" | "SCN" => "Color space operand (stroking)",
        _ => return None,
    })
}

fn paint_label(operator: &str) -> Option<&'static str> {
    Some(match operator {
        "f" | "F" => "Filled vector path (nonzero rule)",
        "f*" => "Filled vector path (even-odd rule)",
        "S" | "s" => "Stroked vector path",
        "B" => "Filled and stroked vector path (nonzero rule)",
        "B*" => "Filled and stroked vector path (even-odd rule)",
        "b" => "Closed, filled and stroked vector path (nonzero rule)",
        "b*" => "Closed, filled and stroked vector path (even-odd rule)",
        _ => return None,
    })
}

fn analyze_tokens(tokens: &[Token], report: &mut PageReport) {
    let mut seen_cmyk: HashSet<[i64; 4]> = HashSet::new();

    for (i, token) in tokens.iter().enumerate() {
        let Token::Operator(name) = token else {
            continue;
        };

        if let Some(label) = paint_label(name) {
            *report.paint_operators.entry(label.to_string()).or_default() += 1;
            continue;
        }
        let Some(label) = color_space_label(name) else {
            continue;
        };
        *report.color_operators.entry(label.to_string()).or_default() += 1;

        if (name == "k" || name == "K") && i >= 4 {
            let operands: Option<Vec<f64>> =
                tokens[i - 4..i].iter().map(Token::as_number).collect();
            if let Some(v) = operands {
                let cmyk = [v[0], v[1], v[2], v[3]];
                let key = cmyk.map(|c| (c * 10_000.0).round() as i64);
                if seen_cmyk.insert(key) {
                    report.cmyk_colors.push(describe_cmyk(cmyk));
                }
            }
        }
    }
}

/// CMYKを近似色名付きで記述する。RGBへの変換は切り捨て。
pub fn describe_cmyk(cmyk: [f64; 4]) -> CmykColor {
    let [c, m, y, k] = cmyk.map(|v| v.clamp(0.0, 1.0));
    let rgb = cmyk_to_rgb(c, m, y, k).map(|v| (v * 255.0) as u8);
    CmykColor {
        cmyk,
        rgb,
        approximate: closest_color_name(rgb).to_string(),
    }
}

/// パレット中でRGB空間のユークリッド距離が最小の色名（同距離なら先勝ち）。
pub fn closest_color_name(rgb: [u8; 3]) -> &'static str {
    let distance = |named: &[u8; 3]| -> i32 {
        named
            .iter()
            .zip(rgb.iter())
            .map(|(&a, &b)| (a as i32 - b as i32).pow(2))
            .sum()
    };

    let mut best = NAMED_COLORS[0];
    for candidate in NAMED_COLORS.iter().skip(1) {
        if distance(&candidate.1) < distance(&best.1) {
            best = *candidate;
        }
    }
    best.0
}

fn indent(level: usize) -> String {
    "  ".repeat(level)
}

impl InspectionReport {
    pub fn to_markdown(&self) -> String {
        let mut out = String::from("# PDF Inspection Report\n\n");
        let _ = writeln!(out, "Source: {}\n", self.source);

        for page in &self.pages {
            let _ = writeln!(out, "## Page {}", page.page);

            for xobject in &page.xobjects {
                match xobject {
                    XObjectReport::Image {
                        name,
                        width,
                        height,
                        color_space,
                        bits_per_component,
                        stencil,
                        filter,
                        depth,
                    } => {
                        let level = depth + 1;
                        let _ = writeln!(out, "{}- Image XObject: {}", indent(level), name);
                        let _ = writeln!(out, "{}* Width: {}", indent(level + 1), width);
                        let _ = writeln!(out, "{}* Height: {}", indent(level + 1), height);
                        let _ = writeln!(out, "{}* ColorSpace: {}", indent(level + 1), color_space);
                        let _ = writeln!(
                            out,
                            "{}* BitsPerComponent: {}",
                            indent(level + 1),
                            bits_per_component
                        );
                        let _ = writeln!(out, "{}* IsStencil: {}", indent(level + 1), stencil);
                        let _ = writeln!(
                            out,
                            "{}* Filter: {}",
                            indent(level + 1),
                            filter.as_deref().unwrap_or("(none)")
                        );
                    }
                    XObjectReport::Form { name, depth } => {
                        let _ = writeln!(out, "{}- Form XObject: {}", indent(depth + 1), name);
                    }
                }
            }

            if !page.color_operators.is_empty() {
                let _ = writeln!(out, "{}- Color operators", indent(1));
                for (label, count) in &page.color_operators {
                    let _ = writeln!(out, "{}* {}: {}", indent(2), label, count);
                }
            }
            if !page.cmyk_colors.is_empty() {
                let _ = writeln!(out, "{}- CMYK colors", indent(1));
                for color in &page.cmyk_colors {
                    let [c, m, y, k] = color.cmyk;
                    let [r, g, b] = color.rgb;
                    let _ = writeln!(out, "{}- ({c:.2}, {m:.2}, {y:.2}, {k:.2})", indent(2));
                    let _ = writeln!(
                        out,
                        "{}- Approximate Color: {} (RGB: {r}, {g}, {b})",
                        indent(3),
                        color.approximate
                    );
                }
            }
            if !page.paint_operators.is_empty() {
                let _ = writeln!(out, "{}- Paint operators", indent(1));
                for (label, count) in &page.paint_operators {
                    let _ = writeln!(out, "{}* {}: {}", indent(2), label, count);
                }
            }
            out.push('\n');
        }
        out
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// 拡張子が `.json` ならJSON、それ以外はMarkdownで書き出す。
    pub fn save(&self, path: impl AsRef<Path>) -> crate::error::Result<()> {
        let path = path.as_ref();
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let body = if is_json {
            self.to_json()?
        } else {
            self.to_markdown()
        };
        std::fs::write(path, body).map_err(|e| {
            PdfMonoError::pdf_write(format!("failed to write {}: {}", path.display(), e))
        })
    }
}
