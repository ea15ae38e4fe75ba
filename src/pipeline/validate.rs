//! XML well-formedness check.
//!
//! Only syntax is checked here: exactly one root element, balanced and
//! matching tags, quoted and unique attributes, known entities, no stray text
//! outside the root. Conformance with the order schema lives in
//! [`crate::schema`].
//!
//! Validation is a predicate, never an `Err`: a malformed reply is still
//! handed back to the caller together with the diagnostic.

use crate::output::ValidationOutcome;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Check whether `text` is a well-formed XML document.
pub fn validate(text: &str) -> ValidationOutcome {
    match check(text) {
        Ok(()) => ValidationOutcome::valid(),
        Err(diagnostic) => ValidationOutcome::invalid(diagnostic),
    }
}

/// Shorthand for `validate(text).well_formed`.
pub fn is_well_formed(text: &str) -> bool {
    check(text).is_ok()
}

fn check(text: &str) -> Result<(), String> {
    if text.trim().is_empty() {
        return Err("document is empty".to_string());
    }

    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut open: Vec<String> = Vec::new();
    let mut roots = 0usize;

    loop {
        let pos = reader.buffer_position();
        let event = reader
            .read_event()
            .map_err(|e| format!("syntax error at byte {}: {}", pos, e))?;

        match event {
            Event::Start(ref e) => {
                let name = element_name(e, pos)?;
                if open.is_empty() {
                    roots += 1;
                    if roots > 1 {
                        return Err(format!("second root element <{}> at byte {}", name, pos));
                    }
                }
                check_attributes(e, &name, pos)?;
                open.push(name);
            }
            Event::Empty(ref e) => {
                let name = element_name(e, pos)?;
                if open.is_empty() {
                    roots += 1;
                    if roots > 1 {
                        return Err(format!("second root element <{}/> at byte {}", name, pos));
                    }
                }
                check_attributes(e, &name, pos)?;
            }
            Event::End(ref e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                match open.pop() {
                    Some(expected) if expected == name => {}
                    Some(expected) => {
                        return Err(format!(
                            "mismatched end tag at byte {}: expected </{}>, found </{}>",
                            pos, expected, name
                        ))
                    }
                    None => return Err(format!("unexpected end tag </{}> at byte {}", name, pos)),
                }
            }
            Event::Text(ref t) => {
                if open.is_empty() {
                    return Err(format!("text outside the root element at byte {}", pos));
                }
                t.unescape()
                    .map_err(|e| format!("invalid entity in text at byte {}: {}", pos, e))?;
            }
            Event::CData(_) => {
                if open.is_empty() {
                    return Err(format!("CDATA outside the root element at byte {}", pos));
                }
            }
            Event::Decl(_) | Event::PI(_) | Event::Comment(_) | Event::DocType(_) => {}
            Event::Eof => break,
        }
    }

    if let Some(unclosed) = open.last() {
        return Err(format!(
            "unexpected end of document: {} unclosed element(s), innermost <{}>",
            open.len(),
            unclosed
        ));
    }
    if roots == 0 {
        return Err("no root element".to_string());
    }
    Ok(())
}

fn element_name(e: &BytesStart<'_>, pos: usize) -> Result<String, String> {
    let name = std::str::from_utf8(e.name().as_ref())
        .map_err(|_| format!("element name is not valid UTF-8 at byte {}", pos))?
        .to_string();
    let valid_start = name
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == ':');
    if !valid_start {
        return Err(format!("invalid element name '{}' at byte {}", name, pos));
    }
    Ok(name)
}

fn check_attributes(e: &BytesStart<'_>, element: &str, pos: usize) -> Result<(), String> {
    for attr in e.attributes() {
        let attr =
            attr.map_err(|err| format!("bad attribute on <{}> at byte {}: {}", element, pos, err))?;
        attr.unescape_value().map_err(|err| {
            format!(
                "invalid entity in attribute '{}' of <{}> at byte {}: {}",
                String::from_utf8_lossy(attr.key.as_ref()),
                element,
                pos,
                err
            )
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_document_is_well_formed() {
        let outcome = validate("<a><b/></a>");
        assert!(outcome.well_formed);
        assert!(outcome.diagnostic.is_none());
    }

    #[test]
    fn declaration_and_comments_are_allowed() {
        assert!(is_well_formed(
            "<?xml version=\"1.0\"?>\n<!-- order -->\n<a x=\"1\">t &amp; &quot;q&quot;</a>\n"
        ));
    }

    #[test]
    fn mismatched_tag_is_rejected() {
        let outcome = validate("<a><b></a>");
        assert!(!outcome.well_formed);
        assert!(outcome.diagnostic.is_some());
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(!is_well_formed(""));
        assert!(!is_well_formed("  \n"));
    }

    #[test]
    fn two_roots_are_rejected() {
        assert!(!is_well_formed("<a/><b/>"));
        assert!(!is_well_formed("<a></a><a></a>"));
    }

    #[test]
    fn prose_around_document_is_rejected() {
        assert!(!is_well_formed("Here is your XML:\n<a/>"));
        assert!(!is_well_formed("<a/>\nHope this helps"));
        assert!(!is_well_formed("```xml\n<a/>\n```"));
    }

    #[test]
    fn unknown_entity_is_rejected() {
        assert!(!is_well_formed("<a>caf&eacute;</a>"));
        assert!(!is_well_formed("<a>R&D</a>"));
        assert!(!is_well_formed("<a x=\"&bogus;\"/>"));
    }

    #[test]
    fn unclosed_element_is_rejected() {
        let outcome = validate("<XML_order><orderheader>");
        assert!(!outcome.well_formed);
        assert!(outcome.diagnostic.unwrap().contains("unclosed"));
    }

    #[test]
    fn stray_end_tag_is_rejected() {
        assert!(!is_well_formed("</a>"));
    }

    #[test]
    fn duplicate_attribute_is_rejected() {
        assert!(!is_well_formed("<a x=\"1\" x=\"2\"/>"));
    }

    #[test]
    fn escaped_quote_in_attribute_is_accepted() {
        assert!(is_well_formed(
            "<item_description v=\"27&quot; monitor\">27&quot; monitor</item_description>"
        ));
    }
}
