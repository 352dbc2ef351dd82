// Phase 11: ジョブ単位: PDF読込 -> 並列ページ処理 -> 最適化 -> アトミック保存

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use lopdf::Document;
use rayon::prelude::*;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::config::merged::MergedConfig;
use crate::config::settings::ConversionMode;
use crate::error::PdfMonoError;
use crate::pdf::color_rewriter::RewriteStats;
use crate::pdf::image_xobject::ImageOptions;
use crate::pdf::optimizer;
use crate::pdf::reader::PdfReader;
use crate::pipeline::page_processor::{
    ColorRewrite, ContentJob, ImageStats, ResourceOptions, apply_color_rewrites,
    collect_color_targets, process_page_resources, rewrite_content_job,
};

/// Configuration for a single job.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// 1-based pages to convert. `None` converts every page; other pages
    /// are written out unchanged.
    pub pages: Option<Vec<u32>>,
    pub settings: MergedConfig,
}

impl JobConfig {
    /// Convert every page of `input_path` with default settings.
    pub fn new(input_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            pages: None,
            settings: MergedConfig::default(),
        }
    }
}

/// Result of processing a single job.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub pages_processed: usize,
    pub colors: RewriteStats,
    pub images: ImageStats,
    pub separations: usize,
}

/// Run a single conversion job.
///
/// The output file only appears once the whole document has been converted
/// and saved; on any failure nothing is written at `output_path`.
pub fn run_job(config: &JobConfig) -> crate::error::Result<JobResult> {
    config.settings.validate()?;
    check_output_dir(&config.output_path)?;

    let reader = PdfReader::open(&config.input_path)?;
    let selected = select_pages(&reader, config.pages.as_deref())?;
    info!(
        input = %config.input_path.display(),
        pages = selected.len(),
        mode = ?config.settings.mode,
        "starting job"
    );

    let mut doc = reader.into_document();
    let mut result = JobResult {
        input_path: config.input_path.clone(),
        output_path: config.output_path.clone(),
        pages_processed: selected.len(),
        colors: RewriteStats::default(),
        images: ImageStats::default(),
        separations: 0,
    };

    match config.settings.mode {
        ConversionMode::Vector => convert_vector(&mut doc, &selected, config, &mut result)?,
        ConversionMode::Raster => convert_raster(&mut doc, &selected, config)?,
    }

    optimizer::optimize(&mut doc, config.settings.compress_streams);
    save_atomically(&mut doc, &config.output_path)?;

    info!(
        output = %config.output_path.display(),
        colors = result.colors.rewritten(),
        images = result.images.converted,
        separations = result.separations,
        "job finished"
    );
    Ok(result)
}

/// Vector mode pipeline.
///
/// Phase A: collect page and form contents (sequential, read-only)
/// Phase B: rewrite color operators (rayon parallel)
/// Phase C: write contents back (sequential)
/// Phase D: images and separation color spaces, page by page
fn convert_vector(
    doc: &mut Document,
    selected: &[(u32, lopdf::ObjectId)],
    config: &JobConfig,
    result: &mut JobResult,
) -> crate::error::Result<()> {
    // --- Phase A ---
    let mut jobs: Vec<ContentJob> = Vec::new();
    for &(page, page_id) in selected {
        jobs.extend(collect_color_targets(doc, page, page_id).map_err(|e| e.at_page(page, "colors"))?);
    }

    debug!(contents = jobs.len(), "rewriting content streams");

    // --- Phase B ---
    let rewrites: Vec<crate::error::Result<ColorRewrite>> = jobs
        .into_par_iter()
        .map(|job| {
            let page = job.page;
            rewrite_content_job(job).map_err(|e| e.at_page(page, "colors"))
        })
        .collect();
    let rewrites = rewrites.into_iter().collect::<crate::error::Result<Vec<_>>>()?;

    // --- Phase C ---
    let mut applied = HashSet::new();
    result.colors = apply_color_rewrites(doc, rewrites, &mut applied)?;

    // --- Phase D ---
    let options = ResourceOptions {
        convert_images: config.settings.convert_images,
        rewrite_separations: config.settings.rewrite_separations,
        image: ImageOptions {
            gamma: config.settings.gamma,
            jpeg_quality: config.settings.jpeg_quality,
        },
    };
    let mut image_cache = HashMap::new();
    for &(page, page_id) in selected {
        let outcome = process_page_resources(doc, page, page_id, &options, &mut image_cache)?;
        result.images.merge(&outcome.images);
        result.separations += outcome.separations;
    }

    Ok(())
}

/// Raster mode pipeline: each selected page is rendered, converted to gray
/// and replaced by a single full-page JPEG image.
#[cfg(feature = "raster")]
fn convert_raster(
    doc: &mut Document,
    selected: &[(u32, lopdf::ObjectId)],
    config: &JobConfig,
) -> crate::error::Result<()> {
    use crate::color::luminance::rgb_buffer_to_gray;
    use crate::pdf::writer::{GrayPageImage, replace_page_with_image};
    use crate::raster::jpeg::encode_gray_buffer_to_jpeg;
    use crate::render::pdfium::for_each_rendered_page;

    let ids: HashMap<u32, lopdf::ObjectId> = selected.iter().copied().collect();

    // 配置先の矩形は置き換え前のページから読んでおく
    let reader = PdfReader::from_document(std::mem::replace(doc, Document::new()));
    let rects: crate::error::Result<HashMap<u32, [f64; 4]>> = selected
        .iter()
        .map(|&(page, _)| {
            reader
                .page_visible_box(page)
                .map(|rect| (page, rect))
                .map_err(|e| e.at_page(page, "render"))
        })
        .collect();
    *doc = reader.into_document();
    let rects = rects?;
    let settings = &config.settings;

    for_each_rendered_page(
        &config.input_path,
        settings.dpi,
        |page| ids.contains_key(&page),
        |page, bitmap| {
            let rgb = bitmap.to_rgb8();
            let (width, height) = rgb.dimensions();
            let gray = rgb_buffer_to_gray(rgb.as_raw(), width, height, settings.gamma)
                .map_err(|e| e.at_page(page, "render"))?;
            let jpeg_data = encode_gray_buffer_to_jpeg(gray, width, height, settings.jpeg_quality)
                .map_err(|e| e.at_page(page, "render"))?;
            let page_id = ids[&page];
            let rect = rects[&page];
            replace_page_with_image(
                doc,
                page_id,
                GrayPageImage {
                    jpeg_data,
                    width,
                    height,
                },
                rect,
            )?;
            debug!(page, width, height, "page rasterized");
            Ok(())
        },
    )
}

#[cfg(not(feature = "raster"))]
fn convert_raster(
    _doc: &mut Document,
    _selected: &[(u32, lopdf::ObjectId)],
    _config: &JobConfig,
) -> crate::error::Result<()> {
    Err(PdfMonoError::render(
        "raster mode requires pdf_mono to be built with the `raster` feature",
    ))
}

/// Resolve the job's page selection to (page number, page id) pairs.
fn select_pages(
    reader: &PdfReader,
    pages: Option<&[u32]>,
) -> crate::error::Result<Vec<(u32, lopdf::ObjectId)>> {
    let all = reader.page_ids();
    let Some(pages) = pages else {
        return Ok(all);
    };

    let page_count = reader.page_count();
    if let Some(&out_of_range) = pages.iter().find(|&&p| p < 1 || p > page_count) {
        return Err(PdfMonoError::config(format!(
            "page {} out of range (document has {} pages)",
            out_of_range, page_count
        )));
    }

    Ok(all
        .into_iter()
        .filter(|(page, _)| pages.contains(page))
        .collect())
}

fn check_output_dir(output: &Path) -> crate::error::Result<()> {
    let dir = output_dir(output);
    if !dir.is_dir() {
        return Err(PdfMonoError::input(format!(
            "output directory does not exist: {}",
            dir.display()
        )));
    }
    Ok(())
}

fn output_dir(output: &Path) -> &Path {
    output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Save to a temporary file next to `output` and rename it into place.
fn save_atomically(doc: &mut Document, output: &Path) -> crate::error::Result<()> {
    let mut tmp = NamedTempFile::new_in(output_dir(output))?;
    doc.save_to(&mut tmp)
        .map_err(|e| PdfMonoError::pdf_write(e.to_string()))?;
    tmp.persist(output).map_err(|e| {
        PdfMonoError::pdf_write(format!("failed to write {}: {}", output.display(), e.error))
    })?;
    Ok(())
}
