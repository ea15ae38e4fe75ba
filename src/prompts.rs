//! The instruction document sent with every extraction request.
//!
//! The model's output is only as correct as these instructions, so they are
//! kept as data rather than one opaque string:
//!
//! * [`SCHEMA_TEMPLATE`]: the target XML skeleton (itself well-formed, see
//!   the tests),
//! * [`FIELD_RULES`]: one row per output field: where to find the value and
//!   what to write when it is missing ([`OnMissing`]),
//! * general derivation and order-line rules,
//! * rules specific to the kind of auxiliary content,
//! * output requirements.
//!
//! [`build_instructions`] renders them into the system prompt. The text is
//! versioned by [`INSTRUCTIONS_VERSION`]; bump it whenever a rule changes so
//! recorded outputs can be traced back to the rules that produced them.
//! Callers can replace the whole document through
//! [`crate::config::ExtractionConfig::instructions`].

use crate::document::AuxiliaryKind;
use std::fmt::Write as _;

/// Version of the rule set rendered by [`build_instructions`].
pub const INSTRUCTIONS_VERSION: &str = "2025.06.2";

/// Written into sentinel fields that have no source data ("niet van toepassing").
pub const NOT_APPLICABLE: &str = "NVT";

/// Canonical supplier token.
pub const SUPPLIER_TOKEN: &str = "COPACO";

/// Fixed value of `XML_order/@documentsource`.
pub const DOCUMENT_SOURCE: &str = "AIPDF";

/// Words that mark a line as a levy/fee rather than a product.
pub const LEVY_KEYWORDS: &[&str] = &["thuiskopieheffing", "heffing", "recupel", "auvibel"];

/// Words that mark a line as a shipping/transport charge.
pub const SHIPPING_KEYWORDS: &[&str] = &[
    "verzendkosten",
    "transportkosten",
    "vrachtkosten",
    "bezorgkosten",
    "shipping",
];

/// Target document skeleton.
pub const SCHEMA_TEMPLATE: &str = r#"<XML_order documentsource="AIPDF" external_document_id="…" supplier="…">
  <orderheader sender_id="…" customer_ordernumber="…" orderdate="…" completedelivery="…" requested_deliverydate="…" recipientsreference="…">
    <Customer>
      <customerid>…</customerid>
    </Customer>
    <ShipTo>
      <adress>
        <name1>…</name1>
        <name2>…</name2>
        <street>…</street>
        <postalcode>…</postalcode>
        <city>…</city>
        <country>…</country>
      </adress>
    </ShipTo>
    <ordertext>
      <textqualifier>ATT</textqualifier>
      <text>…</text>
    </ordertext>
    <ordertext>
      <textqualifier>CFD</textqualifier>
      <text>…</text>
    </ordertext>
  </orderheader>
  <!-- one orderline per product line -->
  <orderline>
    <linenumber>…</linenumber>
    <item_id tag="MF">…</item_id>
    <quantity unit="ST">…</quantity>
    <deliverydate>…</deliverydate>
    <price currency="EUR">…</price>
    <item_description>…</item_description>
    <!-- optional -->
    <orderlinetext>
      <textqualifier>BID</textqualifier>
      <text>…</text>
    </orderlinetext>
    <!-- optional -->
    <orderline_info>
      <end-user_orderline_info>
        <end-user_orderline_name1>…</end-user_orderline_name1>
        <end-user_orderline_street>…</end-user_orderline_street>
        <end-user_orderline_postalcode>…</end-user_orderline_postalcode>
        <end-user_orderline_city>…</end-user_orderline_city>
        <end-user_orderline_country>…</end-user_orderline_country>
      </end-user_orderline_info>
    </orderline_info>
  </orderline>
</XML_order>"#;

/// What to write when a field has no source data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnMissing {
    /// Keep the element/attribute, leave it empty (`""`, `<x></x>`).
    Empty,
    /// Write this fixed token.
    Sentinel(&'static str),
}

/// One row of the field table.
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    /// Location in the output, e.g. `orderheader/@orderdate`.
    pub path: &'static str,
    /// Where the value comes from and how to normalise it.
    pub source: &'static str,
    pub on_missing: OnMissing,
}

impl FieldRule {
    /// Element or attribute name at the end of [`FieldRule::path`].
    pub fn leaf(&self) -> &'static str {
        let last = self.path.rsplit('/').next().unwrap_or(self.path);
        last.trim_start_matches('@')
            .split('[')
            .next()
            .unwrap_or(last)
    }
}

/// Per-field rules, in document order.
///
/// The choice between [`OnMissing::Empty`] and [`OnMissing::Sentinel`] is made
/// field by field and must not be generalised.
pub const FIELD_RULES: &[FieldRule] = &[
    FieldRule {
        path: "XML_order/@documentsource",
        source: "Always AIPDF.",
        on_missing: OnMissing::Empty,
    },
    FieldRule {
        path: "XML_order/@external_document_id",
        source: "The complete string after \"Bestelnummer:\" (e.g. 12345 6789-A). Do not split on spaces or hyphens; keep suffixes such as -R.",
        on_missing: OnMissing::Empty,
    },
    FieldRule {
        path: "XML_order/@supplier",
        source: "The party under \"Inkooporder voor:\". Whenever it is Copaco in any country (Copaco Nederland B.V., Copaco Belgium NV, Copaco Netherlands, …) write exactly COPACO. Otherwise write the name as printed, in capitals.",
        on_missing: OnMissing::Empty,
    },
    FieldRule {
        path: "orderheader/@sender_id",
        source: "Look up labels such as \"Sender ID\", \"ERP Code\" or \"Vendor code\". Never invent a value.",
        on_missing: OnMissing::Empty,
    },
    FieldRule {
        path: "orderheader/@customer_ordernumber",
        source: "Identical to external_document_id.",
        on_missing: OnMissing::Empty,
    },
    FieldRule {
        path: "orderheader/@orderdate",
        source: "\"Besteldatum:\" or \"Order date:\", as DD-MM-YYYY.",
        on_missing: OnMissing::Empty,
    },
    FieldRule {
        path: "orderheader/@completedelivery",
        source: "Y or N from a \"Deliver complete\" / \"Compleet leveren\" marker; nothing else is allowed.",
        on_missing: OnMissing::Empty,
    },
    FieldRule {
        path: "orderheader/@requested_deliverydate",
        source: "\"Leverdatum:\" or \"Requested delivery date:\", as DD-MM-YYYY (19-05-25 → 19-05-2025).",
        on_missing: OnMissing::Empty,
    },
    FieldRule {
        path: "orderheader/@recipientsreference",
        source: "In the \"Afleveradres:\" block, the part after the slash of \"T.a.v.: <Name> / <Reference>\" (e.g. 01443196).",
        on_missing: OnMissing::Sentinel(NOT_APPLICABLE),
    },
    FieldRule {
        path: "Customer/customerid",
        source: "\"Customer ID\", \"Account #\", \"Sold-To ID\" or \"Klantnummer\".",
        on_missing: OnMissing::Empty,
    },
    FieldRule {
        path: "ShipTo/adress/name1",
        source: "The line after \"Afleveradres:\" (company name).",
        on_missing: OnMissing::Empty,
    },
    FieldRule {
        path: "ShipTo/adress/name2",
        source: "The contact name before the slash of \"T.a.v.: <Name> / <Reference>\".",
        on_missing: OnMissing::Empty,
    },
    FieldRule {
        path: "ShipTo/adress/street",
        source: "Street and house number of the delivery address.",
        on_missing: OnMissing::Empty,
    },
    FieldRule {
        path: "ShipTo/adress/postalcode",
        source: "Postal code exactly as printed (e.g. 2908 LJ).",
        on_missing: OnMissing::Empty,
    },
    FieldRule {
        path: "ShipTo/adress/city",
        source: "City of the delivery address.",
        on_missing: OnMissing::Empty,
    },
    FieldRule {
        path: "ShipTo/adress/country",
        source: "ISO 3166-1 alpha-2 code; infer it from the address when not printed.",
        on_missing: OnMissing::Empty,
    },
    FieldRule {
        path: "ordertext[ATT]/text",
        source: "The \"Betreft\" line or an explicit attachment reference.",
        on_missing: OnMissing::Sentinel(NOT_APPLICABLE),
    },
    FieldRule {
        path: "ordertext[CFD]/text",
        source: "Any \"CFD\" reference.",
        on_missing: OnMissing::Sentinel(NOT_APPLICABLE),
    },
    FieldRule {
        path: "orderline/linenumber",
        source: "1, 2, 3, … counting only the lines that are output.",
        on_missing: OnMissing::Empty,
    },
    FieldRule {
        path: "orderline/item_id",
        source: "\"Your art. code\", \"Part #\" or \"Artikelnummer\", exactly, without any whitespace (e.g. A37XGET#ABH).",
        on_missing: OnMissing::Empty,
    },
    FieldRule {
        path: "orderline/quantity",
        source: "\"Aantal\" / \"Qty\".",
        on_missing: OnMissing::Empty,
    },
    FieldRule {
        path: "orderline/deliverydate",
        source: "The line's \"Leverdatum\" as DD-MM-YYYY; otherwise the header requested_deliverydate.",
        on_missing: OnMissing::Empty,
    },
    FieldRule {
        path: "orderline/price",
        source: "Unit price, never the line total, with a dot as decimal separator (765,14 → 765.14).",
        on_missing: OnMissing::Empty,
    },
    FieldRule {
        path: "orderline/item_description",
        source: "The description as printed; every double quote written as &quot;.",
        on_missing: OnMissing::Empty,
    },
];

/// Look up the rule for a path.
pub fn field_rule(path: &str) -> Option<&'static FieldRule> {
    FIELD_RULES.iter().find(|r| r.path == path)
}

const PREAMBLE: &str = "You are a multimodal assistant that reads purchase orders. \
Parse the attached PDF pages as an order document and transform everything into a single, \
well-formed XML document that follows this exact schema:";

const DERIVATION_RULES: &str = "\
- Write every date as DD-MM-YYYY (16-05-25 → 16-05-2025).
- Write every price with a dot as decimal separator and no thousands separator (1.234,50 → 1234.50).
- quantity always carries unit=\"ST\"; price always carries currency=\"EUR\"; item_id always carries tag=\"MF\".
- Never omit an element or attribute of the schema. When a value is missing, follow the field table: leave it empty, or write NVT where the table says so.";

const LINE_RULES: &str = "\
- Produce one <orderline> per product line, in the order they appear.
- Skip lines that are purely a fee or levy (Thuiskopieheffing, Recupel, Auvibel or any other \"heffing\") and lines that are purely shipping or transport charges (verzendkosten, transportkosten, vrachtkosten, shipping). A skipped line does not consume a line number: if the second line is skipped, the next product becomes line 2.
- If a \"Betreft OPG <value>\" line exists, add to every product line:
  <orderlinetext><textqualifier>BID</textqualifier><text><value></text></orderlinetext>
  Without such a line, omit <orderlinetext> entirely.
- Add <orderline_info> only when the end customer's delivery address differs from the ShipTo address in at least one field, and fill it with the end customer's address. When the addresses are identical, omit <orderline_info> entirely; never repeat the ShipTo address there.";

const FREE_TEXT_RULES: &str = "\
- The e-mail that accompanied the order is attached after the pages.
- Use \"Klantnummer\" from the e-mail for customerid when the PDF has none.
- Use \"Referentie\" from the e-mail for recipientsreference only when the PDF has no T.a.v. reference.
- A purchase order number in the subject (e.g. \"Inkooporder P0031006\") is the same order; it never replaces the PDF's Bestelnummer.
- When a field is present in both, the PDF value wins unless it is empty.";

const STRUCTURED_RULES: &str = "\
- A secondary file in a different format (e.g. <PurchaseOrder>) is attached after the pages. Parse it and merge overlapping or complementary information.
- When a field is present in both, the PDF value wins unless it is empty.
- A field found only in the secondary file (e.g. sender_id, customerid) is written to its place in the schema.
- Align order lines by linenumber or item_id.
- Its orderline_info end-customer address follows the same rule as above: include it only when it differs from ShipTo.";

const OUTPUT_REQUIREMENTS: &str = "\
- Output exactly one <XML_order>…</XML_order> document and nothing else: no prose, no Markdown fences, no XML declaration, no namespaces, no comments.
- Keep the element order of the schema: orderheader (Customer, ShipTo, ATT ordertext, CFD ordertext), then the orderlines.
- Always output both ordertext blocks, ATT first, then CFD.
- Close every tag and put every attribute value in double quotes.";

/// First segment of every request.
pub const LEAD_INSTRUCTION: &str = "Please analyze the attached PDF pages according to the schema rules. \
Output only the final <XML_order> document.";

/// Heading placed before the embedded text layer.
pub const PAGE_TEXT_HEADING: &str = "Embedded text layer of the same PDF pages. \
Use it to confirm numbers, codes and amounts read from the images:";

/// Render the instruction document for the given kind of auxiliary content.
pub fn build_instructions(kind: AuxiliaryKind) -> String {
    let mut out = String::with_capacity(8 * 1024);
    let _ = writeln!(out, "{PREAMBLE}\n\n{SCHEMA_TEMPLATE}\n");

    let _ = writeln!(out, "FIELD RULES (instruction set {INSTRUCTIONS_VERSION})");
    for rule in FIELD_RULES {
        let missing = match rule.on_missing {
            OnMissing::Empty => "leave empty".to_string(),
            OnMissing::Sentinel(token) => format!("write {token}"),
        };
        let _ = writeln!(out, "- {}: {} If missing: {}.", rule.path, rule.source, missing);
    }

    let _ = writeln!(out, "\nGENERAL RULES\n{DERIVATION_RULES}");
    let _ = writeln!(out, "\nORDER LINES\n{LINE_RULES}");

    match kind {
        AuxiliaryKind::None => {}
        AuxiliaryKind::FreeText => {
            let _ = writeln!(out, "\nE-MAIL TEXT\n{FREE_TEXT_RULES}");
        }
        AuxiliaryKind::StructuredDocument => {
            let _ = writeln!(out, "\nSECONDARY FILE\n{STRUCTURED_RULES}");
        }
    }

    let _ = write!(out, "\nOUTPUT\n{OUTPUT_REQUIREMENTS}");
    out
}

/// Introduction placed before the auxiliary text.
pub fn auxiliary_description(kind: AuxiliaryKind, name: Option<&str>) -> String {
    match (kind, name) {
        (AuxiliaryKind::StructuredDocument, Some(name)) => format!(
            "Additionally, here is the secondary file '{name}' to merge. Merge any relevant \
             information from it into the final output according to the schema rules. \
             Output only the final <XML_order> document."
        ),
        (AuxiliaryKind::StructuredDocument, None) => "Additionally, here is the secondary file to merge. \
             Merge any relevant information from it into the final output according to the schema rules. \
             Output only the final <XML_order> document."
            .to_string(),
        _ => "Additionally, here is the e-mail text that accompanied the order. Use it to complete \
             the fields according to the schema rules. Output only the final <XML_order> document."
            .to_string(),
    }
}
