//! Pipeline entry points.
//!
//! One call processes one order:
//!
//! ```text
//! (render ‖ text) ─▶ compose ─▶ service ─▶ validate
//! ```
//!
//! Rendering and text extraction are independent and run concurrently on the
//! blocking pool. Everything produced along the way (page bitmaps, base64
//! payloads, decoded auxiliary text) lives in memory and is dropped when the
//! call returns, on success and on failure alike.

use crate::config::ExtractionConfig;
use crate::document::{AuxiliaryContent, SourceDocument};
use crate::error::OrderError;
use crate::output::{ProcessedOrder, ProcessingStats};
use crate::pipeline::backend::{PdfBackend, PdfiumBackend, RenderSettings};
use crate::pipeline::compose::compose_request;
use crate::pipeline::service::resolve_service;
use crate::pipeline::{render, text, validate};
use crate::progress::Stage;
use crate::prompts::build_instructions;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Process an order PDF into an XML document.
///
/// # Returns
/// `Ok(ProcessedOrder)` whenever the model answered, even when the answer is
/// not well-formed XML (check [`ProcessedOrder::is_well_formed`]).
///
/// # Errors
/// - the PDF cannot be opened or rasterised (`ErrorKind::Conversion`)
/// - no extraction service can be resolved, or the call fails
///   (`ErrorKind::Service`)
pub async fn process_order(
    document: &SourceDocument,
    auxiliary: &AuxiliaryContent,
    config: &ExtractionConfig,
) -> Result<ProcessedOrder, OrderError> {
    let total_start = Instant::now();
    let name = document.filename();
    info!("Processing order '{}' ({:?} auxiliary content)", name, auxiliary.kind());

    document.check_magic()?;

    // ── Step 1: Resolve the service before doing any expensive work ──────
    let service = resolve_service(config)?;

    // ── Step 2: Rasterise pages and read the text layer ──────────────────
    let backend: Arc<dyn PdfBackend> = match config.backend {
        Some(ref b) => Arc::clone(b),
        None => Arc::new(PdfiumBackend::new()),
    };
    let pdf: Arc<[u8]> = Arc::from(document.bytes());
    let settings = RenderSettings {
        dpi: config.dpi,
        max_rendered_pixels: config.max_rendered_pixels,
    };

    let render_start = Instant::now();
    let (pages, page_text) = if config.include_page_text {
        let render = render::render_pages(Arc::clone(&backend), name, Arc::clone(&pdf), settings);
        let extract = text::extract_text(Arc::clone(&backend), name, Arc::clone(&pdf));
        let (pages, blob) = futures::try_join!(
            timed_stage(config, Stage::Render, render),
            timed_stage(config, Stage::ExtractText, extract),
        )?;
        (pages, Some(blob))
    } else {
        let pages = timed_stage(
            config,
            Stage::Render,
            render::render_pages(Arc::clone(&backend), name, Arc::clone(&pdf), settings),
        )
        .await?;
        (pages, None)
    };
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    drop(pdf);

    // ── Step 3: Compose ───────────────────────────────────────────────────
    emit_start(config, Stage::Compose);
    let compose_start = Instant::now();
    let instructions = match config.instructions {
        Some(ref custom) => custom.clone(),
        None => build_instructions(auxiliary.kind()),
    };
    let request = compose_request(&pages, page_text.as_deref(), auxiliary, &instructions);
    debug!(
        "Composed request: {} segment(s), {} image(s), instructions {} chars",
        request.segments.len(),
        request.image_count(),
        request.instructions.len()
    );
    emit_complete(config, Stage::Compose, compose_start);

    // ── Step 4: Call the model ───────────────────────────────────────────
    emit_start(config, Stage::Extract);
    let service_start = Instant::now();
    let result = service.extract(&request).await?;
    let service_duration_ms = service_start.elapsed().as_millis() as u64;
    emit_complete(config, Stage::Extract, service_start);
    drop(request);

    // ── Step 5: Validate ─────────────────────────────────────────────────
    emit_start(config, Stage::Validate);
    let validate_start = Instant::now();
    let validation = validate::validate(&result.text);
    if let Some(ref diagnostic) = validation.diagnostic {
        warn!("Response for '{}' is not well-formed XML: {}", name, diagnostic);
    }
    emit_complete(config, Stage::Validate, validate_start);

    let stats = ProcessingStats {
        page_count: pages.len(),
        text_pages: page_text.as_deref().map(text::pages_with_text).unwrap_or(0),
        input_tokens: result.input_tokens,
        output_tokens: result.output_tokens,
        attempts: result.attempts,
        render_duration_ms,
        service_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Order '{}' done: {} page(s), well-formed={}, {}ms total",
        name, stats.page_count, validation.well_formed, stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_pipeline_complete(validation.well_formed);
    }

    Ok(ProcessedOrder {
        xml: result.text,
        validation,
        download_name: document.download_name(),
        stats,
    })
}

/// Process PDF bytes held in memory, e.g. from an upload.
///
/// # Example
/// ```rust,no_run
/// use edgequake_order2xml::{process_order_bytes, AuxiliaryContent, ExtractionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("order123.pdf")?;
/// let config = ExtractionConfig::default();
/// let order = process_order_bytes("order123.pdf", bytes, &AuxiliaryContent::None, &config).await?;
/// assert_eq!(order.download_name, "order123_processed.xml");
/// # Ok(())
/// # }
/// ```
pub async fn process_order_bytes(
    filename: &str,
    bytes: Vec<u8>,
    auxiliary: &AuxiliaryContent,
    config: &ExtractionConfig,
) -> Result<ProcessedOrder, OrderError> {
    let document = SourceDocument::new(filename, bytes);
    process_order(&document, auxiliary, config).await
}

/// Synchronous wrapper around [`process_order`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_order_sync(
    document: &SourceDocument,
    auxiliary: &AuxiliaryContent,
    config: &ExtractionConfig,
) -> Result<ProcessedOrder, OrderError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| OrderError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(process_order(document, auxiliary, config))
}

/// Process an order and write the XML to `output_path`.
///
/// The file is written even when the XML is not well-formed. Uses atomic
/// write (temp file + rename) to prevent partial files.
pub async fn process_order_to_file(
    document: &SourceDocument,
    auxiliary: &AuxiliaryContent,
    output_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ProcessedOrder, OrderError> {
    let order = process_order(document, auxiliary, config).await?;
    write_atomic(output_path.as_ref(), &order.xml).await?;
    Ok(order)
}

async fn write_atomic(path: &Path, contents: &str) -> Result<(), OrderError> {
    let fail = |source| OrderError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(fail)?;
    }

    let tmp_path = path.with_extension("xml.tmp");
    tokio::fs::write(&tmp_path, contents).await.map_err(fail)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(fail)?;
    debug!("Wrote {} ({} bytes)", path.display(), contents.len());
    Ok(())
}

// ── Progress helpers ─────────────────────────────────────────────────────

fn emit_start(config: &ExtractionConfig, stage: Stage) {
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_start(stage);
    }
}

fn emit_complete(config: &ExtractionConfig, stage: Stage, started: Instant) {
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_complete(stage, started.elapsed().as_millis() as u64);
    }
}

async fn timed_stage<T>(
    config: &ExtractionConfig,
    stage: Stage,
    fut: impl std::future::Future<Output = Result<T, OrderError>>,
) -> Result<T, OrderError> {
    emit_start(config, stage);
    let started = Instant::now();
    let value = fut.await?;
    emit_complete(config, stage, started);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn atomic_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("order123_processed.xml");
        write_atomic(&path, "<XML_order/>").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<XML_order/>");
        assert!(!path.with_extension("xml.tmp").exists());
    }

    #[test]
    fn non_pdf_is_rejected_before_any_service_lookup() {
        let doc = SourceDocument::new("order.pdf", b"PK\x03\x04".to_vec());
        let err = process_order_sync(&doc, &AuxiliaryContent::None, &ExtractionConfig::default())
            .unwrap_err();
        assert!(matches!(err, OrderError::NotAPdf { .. }));
    }
}
