//! Result types of a pipeline run.

use serde::{Deserialize, Serialize};

/// MIME type of the downloadable document.
pub const XML_MIME_TYPE: &str = "application/xml";

/// Suffix appended to the PDF stem to name the downloadable document.
pub const OUTPUT_SUFFIX: &str = "_processed.xml";

/// Derive the download filename from the uploaded PDF's name.
///
/// A trailing `.pdf` (any case) is removed and [`OUTPUT_SUFFIX`] appended.
/// Directory components are ignored.
///
/// ```rust
/// use edgequake_order2xml::output_filename;
/// assert_eq!(output_filename("order123.pdf"), "order123_processed.xml");
/// assert_eq!(output_filename("scans/PO-77.PDF"), "PO-77_processed.xml");
/// ```
pub fn output_filename(pdf_name: &str) -> String {
    let base = pdf_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(pdf_name);
    let stem = match base.len().checked_sub(4) {
        Some(cut) if base.is_char_boundary(cut) && base[cut..].eq_ignore_ascii_case(".pdf") => {
            &base[..cut]
        }
        _ => base,
    };
    format!("{stem}{OUTPUT_SUFFIX}")
}

/// Well-formedness verdict on the returned document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// `true` when the text parses as exactly one XML document.
    pub well_formed: bool,
    /// Parser diagnostic when `well_formed` is false.
    pub diagnostic: Option<String>,
}

impl ValidationOutcome {
    pub fn valid() -> Self {
        Self {
            well_formed: true,
            diagnostic: None,
        }
    }

    pub fn invalid(diagnostic: impl Into<String>) -> Self {
        Self {
            well_formed: false,
            diagnostic: Some(diagnostic.into()),
        }
    }
}

/// Timing and token usage of one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingStats {
    /// Pages rendered and sent.
    pub page_count: usize,
    /// Pages that contributed embedded text (0 when text is not sent).
    pub text_pages: usize,
    pub input_tokens: usize,
    pub output_tokens: usize,
    /// Service attempts made, including the successful one.
    pub attempts: u32,
    pub render_duration_ms: u64,
    pub service_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything a front end needs to show and offer the result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedOrder {
    /// The model's response, unmodified.
    pub xml: String,
    pub validation: ValidationOutcome,
    /// Suggested filename, see [`output_filename`].
    pub download_name: String,
    pub stats: ProcessingStats,
}

impl ProcessedOrder {
    /// MIME type to serve [`ProcessedOrder::xml`] with.
    pub fn mime_type(&self) -> &'static str {
        XML_MIME_TYPE
    }

    pub fn is_well_formed(&self) -> bool {
        self.validation.well_formed
    }
}
