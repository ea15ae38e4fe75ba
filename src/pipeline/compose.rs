//! Request composition: instructions + pages + optional text + optional
//! auxiliary content → one ordered [`ExtractionRequest`].
//!
//! Segment order is fixed:
//!
//! ```text
//! Instruction ─▶ Image(p1) … Image(pN) ─▶ [PageText] ─▶ [Auxiliary]
//! ```
//!
//! Auxiliary content always comes last, after everything taken from the PDF.
//! Composition is a pure function of its inputs.

use crate::document::AuxiliaryContent;
use crate::pipeline::encode::PageImage;
use crate::prompts::{auxiliary_description, LEAD_INSTRUCTION};
use serde::Serialize;

/// One typed element of the request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Segment {
    Instruction(String),
    Image(PageImage),
    /// Marker-delimited text layer, see [`crate::pipeline::text`].
    PageText(String),
    Auxiliary { description: String, text: String },
}

/// The complete payload handed to an [`crate::pipeline::service::ExtractionService`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionRequest {
    /// Instruction document, sent as the system prompt.
    pub instructions: String,
    pub segments: Vec<Segment>,
}

impl ExtractionRequest {
    pub fn images(&self) -> impl Iterator<Item = &PageImage> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Image(p) => Some(p),
            _ => None,
        })
    }

    pub fn image_count(&self) -> usize {
        self.images().count()
    }

    pub fn has_auxiliary(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Auxiliary { .. }))
    }
}

/// Build the request. `pages` must already be in page order.
///
/// A blank `page_text` adds no segment.
pub fn compose_request(
    pages: &[PageImage],
    page_text: Option<&str>,
    auxiliary: &AuxiliaryContent,
    instructions: &str,
) -> ExtractionRequest {
    let mut segments = Vec::with_capacity(pages.len() + 3);
    segments.push(Segment::Instruction(LEAD_INSTRUCTION.to_string()));
    segments.extend(pages.iter().cloned().map(Segment::Image));

    if let Some(text) = page_text.filter(|t| !t.trim().is_empty()) {
        segments.push(Segment::PageText(text.to_string()));
    }

    match auxiliary {
        AuxiliaryContent::None => {}
        AuxiliaryContent::FreeText(text) => segments.push(Segment::Auxiliary {
            description: auxiliary_description(auxiliary.kind(), None),
            text: text.clone(),
        }),
        AuxiliaryContent::StructuredDocument { name, text } => segments.push(Segment::Auxiliary {
            description: auxiliary_description(auxiliary.kind(), Some(name)),
            text: text.clone(),
        }),
    }

    ExtractionRequest {
        instructions: instructions.to_string(),
        segments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: usize) -> PageImage {
        PageImage {
            page_num: n,
            data: format!("cGFnZS{n}"),
            width: 10,
            height: 14,
        }
    }

    fn kinds(req: &ExtractionRequest) -> Vec<String> {
        req.segments
            .iter()
            .map(|s| match s {
                Segment::Instruction(_) => "instruction".to_string(),
                Segment::Image(p) => format!("image{}", p.page_num),
                Segment::PageText(_) => "text".to_string(),
                Segment::Auxiliary { .. } => "aux".to_string(),
            })
            .collect()
    }

    #[test]
    fn single_page_without_auxiliary() {
        let req = compose_request(&[page(1)], None, &AuxiliaryContent::None, "rules");
        assert_eq!(kinds(&req), vec!["instruction", "image1"]);
        assert!(!req.has_auxiliary());
        assert_eq!(req.instructions, "rules");
    }

    #[test]
    fn auxiliary_comes_after_pages_and_text() {
        let aux = AuxiliaryContent::StructuredDocument {
            name: "po.xml".into(),
            text: "<PurchaseOrder/>".into(),
        };
        let req = compose_request(
            &[page(1), page(2), page(3)],
            Some("=== Page 1 ===\nBestelnummer: 12345-A"),
            &aux,
            "rules",
        );
        assert_eq!(
            kinds(&req),
            vec!["instruction", "image1", "image2", "image3", "text", "aux"]
        );
        match req.segments.last().unwrap() {
            Segment::Auxiliary { description, text } => {
                assert!(description.contains("po.xml"));
                assert_eq!(text, "<PurchaseOrder/>");
            }
            other => panic!("unexpected trailing segment {other:?}"),
        }
    }

    #[test]
    fn blank_page_text_adds_no_segment() {
        let req = compose_request(
            &[page(1)],
            Some("  "),
            &AuxiliaryContent::free_text("Klantnummer: 111507"),
            "rules",
        );
        assert_eq!(kinds(&req), vec!["instruction", "image1", "aux"]);
    }

    #[test]
    fn composition_is_idempotent() {
        let aux = AuxiliaryContent::free_text("Referentie: 01443196");
        let pages = [page(1), page(2)];
        let a = compose_request(&pages, Some("x"), &aux, "rules");
        let b = compose_request(&pages, Some("x"), &aux, "rules");
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn request_serialises_with_tagged_segments() {
        let aux = AuxiliaryContent::free_text("Klantnummer: 111507");
        let req = compose_request(&[page(1)], Some("=== Page 1 ===\nA"), &aux, "rules");
        let json: serde_json::Value = serde_json::to_value(&req).unwrap();

        let segments = json["segments"].as_array().unwrap();
        assert_eq!(segments[0]["type"], "instruction");
        assert_eq!(segments[0]["value"], LEAD_INSTRUCTION);
        assert_eq!(segments[1]["type"], "image");
        assert_eq!(segments[1]["value"]["page_num"], 1);
        assert_eq!(segments[2]["type"], "page_text");
        assert_eq!(segments[3]["type"], "auxiliary");
        assert_eq!(segments[3]["value"]["text"], "Klantnummer: 111507");
    }
}
