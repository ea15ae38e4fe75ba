//! Inputs of one pipeline run: the order PDF and its optional companion.

use crate::error::OrderError;
use crate::output::output_filename;
use crate::pipeline::auxiliary;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The uploaded order PDF.
///
/// Lives for the duration of a single run and is dropped when the run ends,
/// on success or failure alike.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    filename: String,
    bytes: Vec<u8>,
}

impl SourceDocument {
    /// Wrap an in-memory upload.
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    /// Read a PDF from disk, validating existence, permissions and magic bytes.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, OrderError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(OrderError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let mut bytes = Vec::new();
        match std::fs::File::open(path) {
            Ok(mut f) => {
                f.read_to_end(&mut bytes)
                    .map_err(|e| OrderError::Internal(format!("reading {}: {e}", path.display())))?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(OrderError::PermissionDenied {
                    path: path.to_path_buf(),
                });
            }
            Err(_) => {
                return Err(OrderError::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
        }

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "order.pdf".to_string());

        debug!("Loaded PDF '{}' ({} bytes)", filename, bytes.len());
        let doc = Self { filename, bytes };
        doc.check_magic()?;
        Ok(doc)
    }

    /// Upload filename, e.g. `order123.pdf`.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Raw PDF bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Name of the XML file offered for download.
    pub fn download_name(&self) -> String {
        output_filename(&self.filename)
    }

    /// Reject uploads that do not start with `%PDF`.
    pub fn check_magic(&self) -> Result<(), OrderError> {
        if self.bytes.starts_with(b"%PDF") {
            Ok(())
        } else {
            Err(OrderError::NotAPdf {
                name: self.filename.clone(),
                magic: self.bytes.iter().take(4).copied().collect(),
            })
        }
    }
}

/// Which kind of auxiliary content accompanies the PDF.
///
/// Selects the variant-specific rules of the instruction document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum AuxiliaryKind {
    None,
    FreeText,
    StructuredDocument,
}

/// Optional second input supplied with the order PDF.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuxiliaryContent {
    /// PDF only.
    #[default]
    None,
    /// The body of the e-mail the order arrived with.
    FreeText(String),
    /// A secondary file (typically the customer's own XML export).
    StructuredDocument { name: String, text: String },
}

impl AuxiliaryContent {
    /// Pasted e-mail text. Blank text is treated as absent.
    pub fn free_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            AuxiliaryContent::None
        } else {
            AuxiliaryContent::FreeText(trimmed.to_string())
        }
    }

    /// Load a secondary document from disk, decoding whatever encoding it uses.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, OrderError> {
        let path = path.as_ref();
        let text = auxiliary::read_auxiliary_file(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| PathBuf::from(path).display().to_string());
        Ok(AuxiliaryContent::StructuredDocument { name, text })
    }

    /// Load an e-mail body saved to disk (`.txt`, `.eml`).
    pub fn free_text_from_file(path: impl AsRef<Path>) -> Result<Self, OrderError> {
        let text = auxiliary::read_auxiliary_file(path.as_ref())?;
        Ok(Self::free_text(text))
    }

    pub fn kind(&self) -> AuxiliaryKind {
        match self {
            AuxiliaryContent::None => AuxiliaryKind::None,
            AuxiliaryContent::FreeText(_) => AuxiliaryKind::FreeText,
            AuxiliaryContent::StructuredDocument { .. } => AuxiliaryKind::StructuredDocument,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, AuxiliaryContent::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn blank_free_text_is_none() {
        assert_eq!(AuxiliaryContent::free_text("  \n\t "), AuxiliaryContent::None);
        assert_eq!(
            AuxiliaryContent::free_text("  Klantnummer: 111507\n"),
            AuxiliaryContent::FreeText("Klantnummer: 111507".into())
        );
    }

    #[test]
    fn kind_follows_variant() {
        assert_eq!(AuxiliaryContent::None.kind(), AuxiliaryKind::None);
        assert_eq!(
            AuxiliaryContent::free_text("hi").kind(),
            AuxiliaryKind::FreeText
        );
        let doc = AuxiliaryContent::StructuredDocument {
            name: "po.xml".into(),
            text: "<PurchaseOrder/>".into(),
        };
        assert_eq!(doc.kind(), AuxiliaryKind::StructuredDocument);
    }

    #[test]
    fn from_path_rejects_non_pdf() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"PK\x03\x04zip").unwrap();
        let err = SourceDocument::from_path(tmp.path()).unwrap_err();
        assert!(matches!(err, OrderError::NotAPdf { .. }), "got {err:?}");
    }

    #[test]
    fn from_path_missing_file() {
        let err = SourceDocument::from_path("/definitely/not/here.pdf").unwrap_err();
        assert!(matches!(err, OrderError::FileNotFound { .. }));
    }

    #[test]
    fn from_path_keeps_filename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("order123.pdf");
        std::fs::write(&path, b"%PDF-1.7\n").unwrap();
        let doc = SourceDocument::from_path(&path).unwrap();
        assert_eq!(doc.filename(), "order123.pdf");
        assert_eq!(doc.download_name(), "order123_processed.xml");
    }

    #[test]
    fn structured_document_keeps_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("po.xml");
        std::fs::write(&path, "<PurchaseOrder><OrderNumber>1</OrderNumber></PurchaseOrder>").unwrap();
        match AuxiliaryContent::from_file(&path).unwrap() {
            AuxiliaryContent::StructuredDocument { name, text } => {
                assert_eq!(name, "po.xml");
                assert!(text.starts_with("<PurchaseOrder>"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
