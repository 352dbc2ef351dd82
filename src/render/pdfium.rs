// Phase 8: pdfium-render wrapper: page -> DynamicImage (in-memory only)

use std::path::{Path, PathBuf};

use image::DynamicImage;
use pdfium_render::prelude::*;

use crate::error::PdfMonoError;

/// Resolves the path to the pdfium shared library.
///
/// Search order:
/// 1. `PDFIUM_DYNAMIC_LIB_PATH` environment variable
/// 2. `vendor/pdfium/lib/` relative to the project root (for development)
fn resolve_pdfium_lib_path() -> crate::error::Result<PathBuf> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        let p = PathBuf::from(&path);
        if p.exists() {
            return Ok(p);
        }
        return Err(PdfMonoError::render(format!(
            "PDFIUM_DYNAMIC_LIB_PATH is set to '{}' but the path does not exist",
            path
        )));
    }

    if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
        let vendor_path = PathBuf::from(&manifest_dir).join("vendor/pdfium/lib");
        if vendor_path.exists() {
            return Ok(vendor_path);
        }
    }

    Err(PdfMonoError::render(
        "pdfium library not found: set PDFIUM_DYNAMIC_LIB_PATH or place libpdfium.so in vendor/pdfium/lib/",
    ))
}

/// Creates a new Pdfium instance by dynamically loading the shared library.
fn create_pdfium() -> crate::error::Result<Pdfium> {
    let lib_path = resolve_pdfium_lib_path()?;
    let lib_path_str = lib_path
        .to_str()
        .ok_or_else(|| PdfMonoError::render("pdfium library path contains non-UTF-8 characters"))?;
    let bindings =
        Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(lib_path_str))?;
    Ok(Pdfium::new(bindings))
}

/// Pixel size of a page of `width_pts` x `height_pts` rendered at `dpi`.
///
/// 1 point = 1/72 inch, so each point maps to `dpi / 72` pixels.
pub fn target_size(width_pts: f32, height_pts: f32, dpi: u32) -> (i32, i32) {
    let scale = dpi as f32 / 72.0;
    (
        ((width_pts * scale).round() as i32).max(1),
        ((height_pts * scale).round() as i32).max(1),
    )
}

/// Renders the selected pages of a PDF at `dpi` and hands each bitmap to `visit`.
///
/// Pages are rendered one at a time so only one bitmap is alive at once.
/// `selected` and `visit` receive the 1-based page number. Rendering stops
/// at the first error returned by `visit`.
pub fn for_each_rendered_page<S, F>(
    pdf_path: &Path,
    dpi: u32,
    selected: S,
    mut visit: F,
) -> crate::error::Result<()>
where
    S: Fn(u32) -> bool,
    F: FnMut(u32, DynamicImage) -> crate::error::Result<()>,
{
    let pdfium = create_pdfium()?;
    let path_str = pdf_path
        .to_str()
        .ok_or_else(|| PdfMonoError::render("PDF path contains non-UTF-8 characters"))?;
    let document = pdfium.load_pdf_from_file(path_str, None)?;

    for (index, page) in document.pages().iter().enumerate() {
        let page_num = index as u32 + 1;
        if !selected(page_num) {
            continue;
        }
        let (width_px, height_px) = target_size(page.width().value, page.height().value, dpi);

        let config = PdfRenderConfig::new()
            .set_target_width(width_px)
            .set_target_height(height_px);

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| PdfMonoError::render(e.to_string()).at_page(page_num, "render"))?;

        visit(page_num, bitmap.as_image())?;
    }

    Ok(())
}
