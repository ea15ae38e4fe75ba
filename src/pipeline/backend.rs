//! PDF backend seam: the only code that talks to pdfium.
//!
//! [`PdfBackend`] is a blocking, `Send + Sync` interface over the two things
//! the pipeline needs from a PDF: page rasters and page text. The render and
//! text stages call it from `spawn_blocking`. Tests implement the trait with
//! synthetic pages so the pipeline can be exercised without the native
//! library.
//!
//! [`PdfiumBackend`] binds pdfium on every call. The upstream `Pdfium` handle
//! is `!Send`, and the OS caches the `dlopen`, so re-binding is cheap.

use crate::error::OrderError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, info, warn};

/// PDF points per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// Rasterisation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSettings {
    pub dpi: u32,
    pub max_rendered_pixels: u32,
}

/// Blocking access to a PDF's pages.
pub trait PdfBackend: Send + Sync {
    /// Rasterise every page, in page order.
    ///
    /// Must fail as a whole if any page fails; never returns a partial list.
    fn render_pages(
        &self,
        name: &str,
        pdf: &[u8],
        settings: &RenderSettings,
    ) -> Result<Vec<DynamicImage>, OrderError>;

    /// Raw text of every page, in page order. Pages without text yield `""`.
    fn page_texts(&self, name: &str, pdf: &[u8]) -> Result<Vec<String>, OrderError>;
}

/// pdfium-backed implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfiumBackend;

impl PdfiumBackend {
    pub fn new() -> Self {
        Self
    }
}

impl PdfBackend for PdfiumBackend {
    fn render_pages(
        &self,
        name: &str,
        pdf: &[u8],
        settings: &RenderSettings,
    ) -> Result<Vec<DynamicImage>, OrderError> {
        let pdfium = bind_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(|e| map_load_error(name, e))?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        info!("PDF '{}' loaded: {} pages", name, total_pages);
        if total_pages == 0 {
            return Err(OrderError::EmptyDocument {
                name: name.to_string(),
            });
        }

        let mut images = Vec::with_capacity(total_pages);
        for idx in 0..total_pages {
            let page = pages
                .get(idx as u16)
                .map_err(|e| OrderError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                })?;

            let (w, h) = compute_render_dimensions(
                page.width().value,
                page.height().value,
                settings.dpi,
                settings.max_rendered_pixels,
            );
            let render_config = PdfRenderConfig::new()
                .set_target_width(w as i32)
                .set_maximum_height(h as i32);

            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                OrderError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                }
            })?;

            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            images.push(image);
        }

        Ok(images)
    }

    fn page_texts(&self, name: &str, pdf: &[u8]) -> Result<Vec<String>, OrderError> {
        let pdfium = bind_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(|e| map_load_error(name, e))?;

        let texts = document
            .pages()
            .iter()
            .enumerate()
            .map(|(idx, page)| match page.text() {
                Ok(text) => text.all(),
                Err(e) => {
                    warn!("Page {}: no text layer ({:?})", idx + 1, e);
                    String::new()
                }
            })
            .collect();

        Ok(texts)
    }
}

/// Bind the pdfium shared library.
///
/// Search order:
/// 1. `PDFIUM_LIB_PATH` (path to the library file)
/// 2. the directory of the running executable
/// 3. the current directory
/// 4. system library search paths
pub fn bind_pdfium() -> Result<Pdfium, OrderError> {
    if let Ok(path) = std::env::var("PDFIUM_LIB_PATH") {
        if !path.is_empty() {
            debug!("Binding pdfium from PDFIUM_LIB_PATH={}", path);
            let bindings = Pdfium::bind_to_library(&path)
                .map_err(|e| OrderError::PdfiumBindingFailed(format!("{path}: {e:?}")))?;
            return Ok(Pdfium::new(bindings));
        }
    }

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
    {
        let lib_path =
            Pdfium::pdfium_platform_library_name_at_path(exe_dir.to_string_lossy().as_ref());
        if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
            debug!("Bound pdfium next to executable in {}", exe_dir.display());
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_library(&Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| OrderError::PdfiumBindingFailed(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

fn map_load_error(name: &str, e: PdfiumError) -> OrderError {
    let detail = format!("{:?}", e);
    if detail.to_lowercase().contains("password") {
        OrderError::PasswordRequired {
            name: name.to_string(),
        }
    } else {
        OrderError::CorruptPdf {
            name: name.to_string(),
            detail,
        }
    }
}

/// Pixel size for a page of `width_points × height_points` at `dpi`,
/// with the longest edge capped at `max_px` (aspect ratio preserved).
pub fn compute_render_dimensions(
    width_points: f32,
    height_points: f32,
    dpi: u32,
    max_px: u32,
) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let raw_w = (width_points * scale).max(1.0);
    let raw_h = (height_points * scale).max(1.0);

    let longest = raw_w.max(raw_h);
    if longest > max_px as f32 {
        let ratio = max_px as f32 / longest;
        let w = ((raw_w * ratio) as u32).clamp(1, max_px);
        let h = ((raw_h * ratio) as u32).clamp(1, max_px);
        (w, h)
    } else {
        (raw_w as u32, raw_h as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_at_200dpi() {
        let (w, h) = compute_render_dimensions(595.0, 842.0, 200, 4000);
        assert!(w > 1600 && w < 1700, "A4 width at 200dpi: got {w}");
        assert!(h > 2300 && h < 2400, "A4 height at 200dpi: got {h}");
    }

    #[test]
    fn oversized_page_is_capped() {
        let (w, h) = compute_render_dimensions(5000.0, 7000.0, 200, 4000);
        assert_eq!(h, 4000);
        assert!(w < h, "aspect ratio lost: {w}x{h}");
    }

    #[test]
    fn degenerate_page_is_at_least_one_pixel() {
        let (w, h) = compute_render_dimensions(0.0, 0.0, 200, 4000);
        assert_eq!((w, h), (1, 1));
    }
}
