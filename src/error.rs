//! Error types for the edgequake-order2xml library.
//!
//! A single fatal error type, [`OrderError`], covers every way a run can be
//! aborted. Each variant belongs to one [`ErrorKind`] so callers (the CLI, a
//! web handler) can decide how to word the failure without matching on every
//! variant:
//!
//! * **Conversion**: the PDF could not be opened, parsed or rasterised.
//! * **Access**: the auxiliary file could not be read.
//! * **Service**: the remote model call failed (network, auth, quota, empty
//!   response).
//!
//! A response that is not well-formed XML is *not* an error. It is reported
//! through [`crate::output::ValidationOutcome`] on an otherwise successful
//! [`crate::output::ProcessedOrder`], because a human may still want to
//! repair the document by hand.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-order2xml library.
#[derive(Debug, Error)]
pub enum OrderError {
    // ── Conversion errors ─────────────────────────────────────────────────
    /// Input PDF was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the PDF.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The upload was read, but it is not a PDF.
    #[error("'{name}' is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { name: String, magic: Vec<u8> },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{name}' is corrupt: {detail}\nTry repairing with: qpdf input.pdf output.pdf")]
    CorruptPdf { name: String, detail: String },

    /// PDF requires a password; order documents are expected unencrypted.
    #[error("PDF '{name}' is encrypted.\nRemove the password before uploading it.")]
    PasswordRequired { name: String },

    /// The PDF parsed but contains no pages.
    #[error("PDF '{name}' has no pages")]
    EmptyDocument { name: String },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install a pdfium build (https://github.com/bblanchon/pdfium-binaries) and either\n\
  • place libpdfium next to the executable or on the system library path, or\n\
  • set PDFIUM_LIB_PATH=/path/to/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Access errors ─────────────────────────────────────────────────────
    /// The auxiliary (e-mail / secondary) file could not be read.
    #[error("Cannot read auxiliary file '{path}': {source}")]
    AuxiliaryUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Service errors ────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Provider rejected the credentials (401/403). Retrying will not help.
    #[error("Authentication error from provider '{provider}': {detail}")]
    AuthError { provider: String, detail: String },

    /// The model call did not answer within the configured timeout.
    #[error("Extraction call timed out after {secs}s")]
    ApiTimeout { secs: u64 },

    /// The LLM API kept failing after every retry.
    #[error("LLM API error after {attempts} attempt(s): {message}")]
    LlmApiError { attempts: u32, message: String },

    /// The model answered with no text at all.
    #[error("Provider '{provider}' returned an empty response")]
    EmptyResponse { provider: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not write the processed XML file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of an [`OrderError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ErrorKind {
    /// PDF unreadable, unparseable, or a page failed to rasterise.
    Conversion,
    /// Auxiliary content unreadable.
    Access,
    /// Remote model call failed.
    Service,
    /// Invalid configuration.
    Config,
    /// Writing the result failed.
    Output,
    /// Bug or runtime failure.
    Internal,
}

impl OrderError {
    /// The taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        use OrderError::*;
        match self {
            FileNotFound { .. }
            | PermissionDenied { .. }
            | NotAPdf { .. }
            | CorruptPdf { .. }
            | PasswordRequired { .. }
            | EmptyDocument { .. }
            | RasterisationFailed { .. }
            | PdfiumBindingFailed(_) => ErrorKind::Conversion,
            AuxiliaryUnreadable { .. } => ErrorKind::Access,
            ProviderNotConfigured { .. }
            | AuthError { .. }
            | ApiTimeout { .. }
            | LlmApiError { .. }
            | EmptyResponse { .. } => ErrorKind::Service,
            InvalidConfig(_) => ErrorKind::Config,
            OutputWriteFailed { .. } => ErrorKind::Output,
            Internal(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rasterisation_display() {
        let e = OrderError::RasterisationFailed {
            page: 3,
            detail: "bad object".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("page 3"), "got: {msg}");
        assert_eq!(e.kind(), ErrorKind::Conversion);
    }

    #[test]
    fn auxiliary_unreadable_is_access() {
        let e = OrderError::AuxiliaryUnreadable {
            path: PathBuf::from("/tmp/missing.xml"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(e.to_string().contains("missing.xml"));
        assert_eq!(e.kind(), ErrorKind::Access);
    }

    #[test]
    fn service_errors_classified() {
        let timeout = OrderError::ApiTimeout { secs: 120 };
        assert!(timeout.to_string().contains("120s"));
        assert_eq!(timeout.kind(), ErrorKind::Service);

        let auth = OrderError::AuthError {
            provider: "anthropic".into(),
            detail: "invalid x-api-key".into(),
        };
        assert!(auth.to_string().contains("anthropic"));
        assert!(auth.to_string().contains("invalid x-api-key"));
        assert_eq!(auth.kind(), ErrorKind::Service);
    }

    #[test]
    fn not_a_pdf_shows_magic() {
        let e = OrderError::NotAPdf {
            name: "order.pdf".into(),
            magic: b"PK\x03\x04".to_vec(),
        };
        assert!(e.to_string().contains("order.pdf"));
        assert_eq!(e.kind(), ErrorKind::Conversion);
    }
}
