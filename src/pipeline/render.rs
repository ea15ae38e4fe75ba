//! Page rasterisation stage: PDF bytes → ordered [`PageImage`]s.
//!
//! pdfium is CPU-bound and not async-safe, so the backend call runs inside
//! `tokio::task::spawn_blocking`. Encoding happens on the same blocking
//! thread. One failing page fails the whole stage.

use crate::error::OrderError;
use crate::pipeline::backend::{PdfBackend, RenderSettings};
use crate::pipeline::encode::{encode_png, PageImage};
use std::sync::Arc;
use tracing::info;

/// Rasterise and encode every page of `pdf`, in page order.
pub async fn render_pages(
    backend: Arc<dyn PdfBackend>,
    name: &str,
    pdf: Arc<[u8]>,
    settings: RenderSettings,
) -> Result<Vec<PageImage>, OrderError> {
    let name = name.to_string();
    tokio::task::spawn_blocking(move || render_pages_blocking(backend.as_ref(), &name, &pdf, &settings))
        .await
        .map_err(|e| OrderError::Internal(format!("Render task panicked: {}", e)))?
}

/// Blocking implementation of [`render_pages`].
pub fn render_pages_blocking(
    backend: &dyn PdfBackend,
    name: &str,
    pdf: &[u8],
    settings: &RenderSettings,
) -> Result<Vec<PageImage>, OrderError> {
    let images = backend.render_pages(name, pdf, settings)?;
    if images.is_empty() {
        return Err(OrderError::EmptyDocument {
            name: name.to_string(),
        });
    }

    let pages = images
        .iter()
        .enumerate()
        .map(|(idx, img)| {
            encode_png(idx + 1, img).map_err(|e| OrderError::RasterisationFailed {
                page: idx + 1,
                detail: format!("PNG encoding failed: {}", e),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    info!("Rendered {} page(s) of '{}' at {} DPI", pages.len(), name, settings.dpi);
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};

    struct Blank(usize);

    impl PdfBackend for Blank {
        fn render_pages(
            &self,
            _name: &str,
            _pdf: &[u8],
            _settings: &RenderSettings,
        ) -> Result<Vec<DynamicImage>, OrderError> {
            Ok((0..self.0)
                .map(|_| DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([255; 4]))))
                .collect())
        }

        fn page_texts(&self, _name: &str, _pdf: &[u8]) -> Result<Vec<String>, OrderError> {
            Ok(vec![String::new(); self.0])
        }
    }

    const SETTINGS: RenderSettings = RenderSettings {
        dpi: 200,
        max_rendered_pixels: 4000,
    };

    #[test]
    fn pages_are_numbered_from_one() {
        let pages = render_pages_blocking(&Blank(3), "x.pdf", b"%PDF", &SETTINGS).unwrap();
        let nums: Vec<usize> = pages.iter().map(|p| p.page_num).collect();
        assert_eq!(nums, vec![1, 2, 3]);
    }

    #[test]
    fn zero_pages_is_an_error() {
        let err = render_pages_blocking(&Blank(0), "x.pdf", b"%PDF", &SETTINGS).unwrap_err();
        assert!(matches!(err, OrderError::EmptyDocument { .. }));
    }

    #[tokio::test]
    async fn async_wrapper_runs_on_blocking_pool() {
        let pdf: Arc<[u8]> = Arc::from(&b"%PDF"[..]);
        let pages = render_pages(Arc::new(Blank(2)), "x.pdf", pdf, SETTINGS)
            .await
            .unwrap();
        assert_eq!(pages.len(), 2);
    }
}
