//! # edgequake-order2xml
//!
//! Turn a supplier's purchase-order PDF into one fixed-schema `<XML_order>`
//! document using a multimodal LLM.
//!
//! ## Why this crate?
//!
//! Order PDFs arrive in every layout imaginable: scanned, generated by a
//! dozen ERP systems, with the delivery address in the header or in a side
//! box. Template-based extraction breaks on every new customer. This crate
//! rasterises each page, lets a vision model read it together with a
//! versioned rule document, and checks that what comes back is well-formed
//! XML before handing it on.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF (+ e-mail text | secondary file)
//!  │
//!  ├─ 1. Render    rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 2. Text      optional embedded text layer, concurrently with 1
//!  ├─ 3. Compose   instructions + page images + text + auxiliary content
//!  ├─ 4. Extract   one model call (claude / gpt / gemini / …) with retry
//!  └─ 5. Validate  well-formedness verdict; the reply is never modified
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_order2xml::{process_order, AuxiliaryContent, ExtractionConfig, SourceDocument};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider from ANTHROPIC_API_KEY or EDGEQUAKE_LLM_PROVIDER / EDGEQUAKE_MODEL
//!     let config = ExtractionConfig::default();
//!     let pdf = SourceDocument::from_path("order123.pdf")?;
//!     let email = AuxiliaryContent::free_text("Klantnummer: 111507");
//!     let order = process_order(&pdf, &email, &config).await?;
//!     if !order.is_well_formed() {
//!         eprintln!("warning: {:?}", order.validation.diagnostic);
//!     }
//!     std::fs::write(&order.download_name, &order.xml)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `order2xml` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-order2xml = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;
pub mod schema;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, DEFAULT_MODEL};
pub use document::{AuxiliaryContent, AuxiliaryKind, SourceDocument};
pub use error::{ErrorKind, OrderError};
pub use output::{
    output_filename, ProcessedOrder, ProcessingStats, ValidationOutcome, XML_MIME_TYPE,
};
pub use pipeline::backend::{PdfBackend, PdfiumBackend, RenderSettings};
pub use pipeline::compose::{compose_request, ExtractionRequest, Segment};
pub use pipeline::encode::PageImage;
pub use pipeline::service::{ExtractionResult, ExtractionService, LlmExtractionService};
pub use pipeline::validate::{is_well_formed, validate};
pub use process::{process_order, process_order_bytes, process_order_sync, process_order_to_file};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback, Stage};
pub use prompts::{build_instructions, INSTRUCTIONS_VERSION};
