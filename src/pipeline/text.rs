//! Text layer extraction: PDF bytes → one marker-delimited text blob.
//!
//! Sent next to the page images when
//! [`crate::config::ExtractionConfig::include_page_text`] is set. Digital
//! order PDFs carry an exact text layer, which removes OCR guesswork on
//! article codes and amounts.

use crate::error::OrderError;
use crate::pipeline::backend::PdfBackend;
use std::sync::Arc;
use tracing::debug;

/// Extract the text of every page and join it with page markers.
pub async fn extract_text(
    backend: Arc<dyn PdfBackend>,
    name: &str,
    pdf: Arc<[u8]>,
) -> Result<String, OrderError> {
    let name = name.to_string();
    let texts = tokio::task::spawn_blocking(move || backend.page_texts(&name, &pdf))
        .await
        .map_err(|e| OrderError::Internal(format!("Text task panicked: {}", e)))??;

    let blob = format_page_text(&texts);
    debug!(
        "Extracted {} chars of text from {} page(s)",
        blob.len(),
        texts.len()
    );
    Ok(blob)
}

/// Join per-page texts as `=== Page N ===` sections separated by a blank line.
///
/// Pages whose text is blank are left out entirely; if every page is blank
/// the result is the empty string.
pub fn format_page_text(pages: &[String]) -> String {
    pages
        .iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(idx, text)| format!("=== Page {} ===\n{}", idx + 1, text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Number of pages that contribute a section to [`format_page_text`].
pub fn pages_with_text(blob: &str) -> usize {
    blob.lines()
        .filter(|l| l.starts_with("=== Page ") && l.ends_with(" ==="))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_keep_page_order_and_numbers() {
        let pages = vec![
            "Bestelnummer: 12345-A".to_string(),
            "".to_string(),
            "Totaal 765,14".to_string(),
        ];
        let blob = format_page_text(&pages);
        assert_eq!(
            blob,
            "=== Page 1 ===\nBestelnummer: 12345-A\n\n=== Page 3 ===\nTotaal 765,14"
        );
        assert_eq!(pages_with_text(&blob), 2);
    }

    #[test]
    fn all_blank_is_empty_string() {
        let pages = vec![String::new(), "  \n ".to_string()];
        assert_eq!(format_page_text(&pages), "");
        assert_eq!(format_page_text(&[]), "");
    }
}
