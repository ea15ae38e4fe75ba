//! Structural inspection of a returned `<XML_order>` document.
//!
//! The pipeline only guarantees well-formedness. This module goes one step
//! further and reports how a reply deviates from the order schema and the
//! derivation rules in [`crate::prompts`]: missing attributes, badly
//! formatted dates or prices, levy lines that should have been skipped,
//! gaps in line numbering and so on.
//!
//! It never changes a result. The CLI prints the findings with
//! `--check-schema`; tests use it against recorded model outputs.

use crate::prompts::{field_rule, OnMissing, LEVY_KEYWORDS, SHIPPING_KEYWORDS};
use once_cell::sync::Lazy;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

static RE_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{2}-\d{2}-\d{4}$").unwrap());
static RE_PRICE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+(\.\d+)?$").unwrap());
static RE_COUNTRY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{2}$").unwrap());
static RE_CURRENCY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{3}$").unwrap());

/// A delivery address, either `ShipTo/adress` or an end-customer block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Address {
    pub name1: String,
    pub name2: String,
    pub street: String,
    pub postalcode: String,
    pub city: String,
    pub country: String,
}

impl Address {
    /// Same place, ignoring the contact line, case and surrounding spaces.
    pub fn same_location(&self, other: &Address) -> bool {
        fn norm(s: &str) -> String {
            s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
        }
        norm(&self.name1) == norm(&other.name1)
            && norm(&self.street) == norm(&other.street)
            && norm(&self.postalcode) == norm(&other.postalcode)
            && norm(&self.city) == norm(&other.city)
            && norm(&self.country) == norm(&other.country)
    }
}

/// `orderheader` contents.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrderHeader {
    pub attributes: BTreeMap<String, String>,
    pub customer_id: Option<String>,
    pub ship_to: Option<Address>,
    /// `(textqualifier, text)` pairs in document order.
    pub texts: Vec<(String, String)>,
}

/// One `orderline`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrderLine {
    pub linenumber: String,
    pub item_id: String,
    pub item_tag: Option<String>,
    pub quantity: String,
    pub unit: Option<String>,
    pub deliverydate: String,
    pub price: String,
    pub currency: Option<String>,
    pub description: String,
    pub texts: Vec<(String, String)>,
    pub end_user: Option<Address>,
}

/// Light model of an order document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrderDocument {
    pub root: String,
    pub attributes: BTreeMap<String, String>,
    pub header: Option<OrderHeader>,
    pub lines: Vec<OrderLine>,
}

impl OrderDocument {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn header_attr(&self, name: &str) -> Option<&str> {
        self.header
            .as_ref()
            .and_then(|h| h.attributes.get(name))
            .map(String::as_str)
    }
}

/// One deviation from the schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub path: String,
    pub message: String,
}

impl Finding {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

// ── Generic element tree ─────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Element {
    name: String,
    attrs: BTreeMap<String, String>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn child_text(&self, name: &str) -> String {
        self.child(name).map(|c| c.text.trim().to_string()).unwrap_or_default()
    }
}

fn open_element(e: &BytesStart<'_>) -> Result<Element, String> {
    let mut el = Element {
        name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
        ..Default::default()
    };
    for attr in e.attributes() {
        let attr = attr.map_err(|err| err.to_string())?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|err| err.to_string())?;
        el.attrs.insert(key, value.into_owned());
    }
    Ok(el)
}

fn parse_tree(xml: &str) -> Result<Element, String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    let mut close = |el: Element, stack: &mut Vec<Element>| -> Result<(), String> {
        match stack.last_mut() {
            Some(parent) => {
                parent.children.push(el);
                Ok(())
            }
            None if root.is_none() => {
                root = Some(el);
                Ok(())
            }
            None => Err("more than one root element".to_string()),
        }
    };

    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(ref e) => stack.push(open_element(e)?),
            Event::Empty(ref e) => {
                let el = open_element(e)?;
                close(el, &mut stack)?;
            }
            Event::End(_) => {
                let el = stack.pop().ok_or("unexpected end tag")?;
                close(el, &mut stack)?;
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(|e| e.to_string())?;
                match stack.last_mut() {
                    Some(top) => top.text.push_str(&text),
                    None => return Err("text outside the root element".to_string()),
                }
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err("unclosed element at end of document".to_string());
    }
    root.ok_or_else(|| "no root element".to_string())
}

fn address(el: &Element, prefix: &str) -> Address {
    let field = |name: &str| el.child_text(&format!("{prefix}{name}"));
    Address {
        name1: field("name1"),
        name2: field("name2"),
        street: field("street"),
        postalcode: field("postalcode"),
        city: field("city"),
        country: field("country"),
    }
}

fn qualified_texts<'a>(parent: &'a Element, block: &'a str) -> Vec<(String, String)> {
    parent
        .children(block)
        .map(|t| (t.child_text("textqualifier"), t.child_text("text")))
        .collect()
}

/// Parse a reply into an [`OrderDocument`]. Fails only on malformed XML.
pub fn parse_order(xml: &str) -> Result<OrderDocument, String> {
    let root = parse_tree(xml)?;

    let header = root.child("orderheader").map(|h| OrderHeader {
        attributes: h.attrs.clone(),
        customer_id: h.child("Customer").map(|c| c.child_text("customerid")),
        ship_to: h
            .child("ShipTo")
            .and_then(|s| s.child("adress"))
            .map(|a| address(a, "")),
        texts: qualified_texts(h, "ordertext"),
    });

    let lines = root
        .children("orderline")
        .map(|l| OrderLine {
            linenumber: l.child_text("linenumber"),
            item_id: l.child_text("item_id"),
            item_tag: l.child("item_id").and_then(|i| i.attrs.get("tag").cloned()),
            quantity: l.child_text("quantity"),
            unit: l.child("quantity").and_then(|q| q.attrs.get("unit").cloned()),
            deliverydate: l.child_text("deliverydate"),
            price: l.child_text("price"),
            currency: l.child("price").and_then(|p| p.attrs.get("currency").cloned()),
            description: l.child_text("item_description"),
            texts: qualified_texts(l, "orderlinetext"),
            end_user: l
                .child("orderline_info")
                .and_then(|i| i.child("end-user_orderline_info"))
                .map(|e| address(e, "end-user_orderline_")),
        })
        .collect();

    Ok(OrderDocument {
        root: root.name.clone(),
        attributes: root.attrs.clone(),
        header,
        lines,
    })
}

const ROOT_ATTRIBUTES: &[&str] = &["documentsource", "external_document_id", "supplier"];
const HEADER_ATTRIBUTES: &[&str] = &[
    "sender_id",
    "customer_ordernumber",
    "orderdate",
    "completedelivery",
    "requested_deliverydate",
    "recipientsreference",
];

fn check_date(path: &str, value: &str, findings: &mut Vec<Finding>) {
    let sentinel = match field_rule(path).map(|r| r.on_missing) {
        Some(OnMissing::Sentinel(token)) => Some(token),
        _ => None,
    };
    if value.is_empty() || Some(value) == sentinel || RE_DATE.is_match(value) {
        return;
    }
    findings.push(Finding::new(path, format!("'{}' is not DD-MM-YYYY", value)));
}

fn mentions_any(text: &str, keywords: &[&str]) -> Option<String> {
    let lower = text.to_lowercase();
    keywords
        .iter()
        .find(|k| lower.contains(*k))
        .map(|k| k.to_string())
}

/// List every structural deviation of `doc`. Empty means conformant.
pub fn check(doc: &OrderDocument) -> Vec<Finding> {
    let mut findings = Vec::new();

    if doc.root != "XML_order" {
        findings.push(Finding::new(
            &doc.root,
            "root element must be <XML_order>",
        ));
    }
    for attr in ROOT_ATTRIBUTES {
        if doc.attr(attr).is_none() {
            findings.push(Finding::new(format!("XML_order/@{attr}"), "missing attribute"));
        }
    }

    match doc.header {
        None => findings.push(Finding::new("orderheader", "missing element")),
        Some(ref header) => check_header(doc, header, &mut findings),
    }

    for (idx, line) in doc.lines.iter().enumerate() {
        check_line(idx, line, doc.header.as_ref(), &mut findings);
    }

    findings
}

fn check_header(doc: &OrderDocument, header: &OrderHeader, findings: &mut Vec<Finding>) {
    for attr in HEADER_ATTRIBUTES {
        if !header.attributes.contains_key(*attr) {
            findings.push(Finding::new(format!("orderheader/@{attr}"), "missing attribute"));
        }
    }

    if let (Some(ext), Some(own)) = (
        doc.attr("external_document_id"),
        doc.header_attr("customer_ordernumber"),
    ) {
        if ext != own {
            findings.push(Finding::new(
                "orderheader/@customer_ordernumber",
                format!("'{}' differs from external_document_id '{}'", own, ext),
            ));
        }
    }

    if let Some(flag) = doc.header_attr("completedelivery") {
        if !matches!(flag, "Y" | "N" | "") {
            findings.push(Finding::new(
                "orderheader/@completedelivery",
                format!("'{}' is not Y, N or empty", flag),
            ));
        }
    }

    for attr in ["orderdate", "requested_deliverydate"] {
        if let Some(value) = doc.header_attr(attr) {
            check_date(&format!("orderheader/@{attr}"), value, findings);
        }
    }

    if header.customer_id.is_none() {
        findings.push(Finding::new("Customer/customerid", "missing element"));
    }

    match header.ship_to {
        None => findings.push(Finding::new("ShipTo/adress", "missing element")),
        Some(ref addr) => {
            if !addr.country.is_empty() && !RE_COUNTRY.is_match(&addr.country) {
                findings.push(Finding::new(
                    "ShipTo/adress/country",
                    format!("'{}' is not an ISO 3166-1 alpha-2 code", addr.country),
                ));
            }
        }
    }

    let qualifiers: Vec<&str> = header.texts.iter().map(|(q, _)| q.as_str()).collect();
    if qualifiers != ["ATT", "CFD"] {
        findings.push(Finding::new(
            "orderheader/ordertext",
            format!("expected ATT then CFD, found {:?}", qualifiers),
        ));
    }
}

fn check_line(idx: usize, line: &OrderLine, header: Option<&OrderHeader>, findings: &mut Vec<Finding>) {
    let path = format!("orderline[{}]", idx + 1);

    if line.linenumber != (idx + 1).to_string() {
        findings.push(Finding::new(
            format!("{path}/linenumber"),
            format!("expected {}, found '{}'", idx + 1, line.linenumber),
        ));
    }

    if line.item_id.chars().any(char::is_whitespace) {
        findings.push(Finding::new(
            format!("{path}/item_id"),
            format!("'{}' contains whitespace", line.item_id),
        ));
    }
    if line.item_tag.as_deref() != Some("MF") {
        findings.push(Finding::new(format!("{path}/item_id/@tag"), "must be MF"));
    }
    if line.unit.as_deref() != Some("ST") {
        findings.push(Finding::new(format!("{path}/quantity/@unit"), "must be ST"));
    }

    match line.currency.as_deref() {
        Some(c) if RE_CURRENCY.is_match(c) => {}
        other => findings.push(Finding::new(
            format!("{path}/price/@currency"),
            format!("{:?} is not a three-letter currency code", other),
        )),
    }
    if !line.price.is_empty() && !RE_PRICE.is_match(&line.price) {
        findings.push(Finding::new(
            format!("{path}/price"),
            format!("'{}' is not a dot-decimal number", line.price),
        ));
    }

    check_date("orderline/deliverydate", &line.deliverydate, findings);

    let label = format!("{} {}", line.description, line.item_id);
    if let Some(k) = mentions_any(&label, LEVY_KEYWORDS) {
        findings.push(Finding::new(
            path.clone(),
            format!("levy line ('{}') must be skipped", k),
        ));
    }
    if let Some(k) = mentions_any(&label, SHIPPING_KEYWORDS) {
        findings.push(Finding::new(
            path.clone(),
            format!("shipping charge ('{}') must be skipped", k),
        ));
    }

    for (qualifier, _) in &line.texts {
        if qualifier != "BID" {
            findings.push(Finding::new(
                format!("{path}/orderlinetext"),
                format!("unexpected text qualifier '{}'", qualifier),
            ));
        }
    }

    if let (Some(end_user), Some(ship_to)) = (
        line.end_user.as_ref(),
        header.and_then(|h| h.ship_to.as_ref()),
    ) {
        if end_user.same_location(ship_to) {
            findings.push(Finding::new(
                format!("{path}/orderline_info"),
                "end-customer address repeats ShipTo and must be omitted",
            ));
        }
    }
}

/// Parse and check in one go.
pub fn inspect(xml: &str) -> Result<Vec<Finding>, String> {
    parse_order(xml).map(|doc| check(&doc))
}
