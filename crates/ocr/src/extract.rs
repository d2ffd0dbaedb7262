use billscan_core::{ExtractionResult, FieldId, FieldSchema, FieldValue, Source};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("Unknown field in pattern config: '{0}'")]
    UnknownField(String),
    #[error("Invalid pattern for {field}: {source}")]
    Invalid {
        field: FieldId,
        #[source]
        source: regex::Error,
    },
}

/// Per-field pattern overrides keyed by field id. A field listed here
/// replaces the built-in patterns for that field; unlisted fields keep the
/// built-ins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegexConfig {
    pub field_patterns: BTreeMap<String, Vec<String>>,
}

impl RegexConfig {
    pub fn with_patterns(mut self, id: FieldId, patterns: &[&str]) -> Self {
        self.field_patterns.insert(
            id.as_str().to_string(),
            patterns.iter().map(|p| p.to_string()).collect(),
        );
        self
    }
}

// ── Built-in patterns ─────────────────────────────────────────────────────────
// Ordered most specific first: the first pattern that matches wins.

const DATE: &str = r"\d{1,2}[/.\-]\d{1,2}[/.\-]\d{2,4}";

fn default_patterns(id: FieldId) -> Vec<String> {
    let date = |label: &str| format!(r"{label}[ \t]*[:\-]?[ \t]*({DATE})");
    match id {
        FieldId::ConsumerName => vec![
            r"Consumer[ \t]*Name[ \t]*[:\-]?[ \t]*([A-Z][A-Za-z .]{2,50})".into(),
            r"\bName[ \t]*[:\-][ \t]*([A-Z][A-Za-z .]{2,50})".into(),
            r"Bill[ \t]*To[ \t]*[:\-]?[ \t]*([A-Z][A-Za-z .]{2,50})".into(),
        ],
        FieldId::ConsumerNumber => vec![
            r"Consumer[ \t]*(?:No|Number|ID)\.?[ \t]*[:\-]?[ \t]*([A-Z0-9]{10,15})\b".into(),
            r"Account[ \t]*(?:No|Number)\.?[ \t]*[:\-]?[ \t]*([A-Z0-9]{10,15})\b".into(),
            r"\bCA[ \t]*(?:No|Number)\.?[ \t]*[:\-]?[ \t]*([A-Z0-9]{10,15})\b".into(),
        ],
        FieldId::MeterNumber => vec![
            r"Meter[ \t]*(?:No|Number)\.?[ \t]*[:\-]?[ \t]*([A-Z0-9]{6,12})\b".into(),
            r"Meter[ \t]*(?:ID|Sr\.?[ \t]*No)\.?[ \t]*[:\-]?[ \t]*([A-Z0-9]{6,12})\b".into(),
        ],
        FieldId::BillingPeriod => vec![
            format!(r"Billing[ \t]*Period[ \t]*[:\-]?[ \t]*({DATE}[ \t]*(?:to|-)[ \t]*{DATE})"),
            format!(r"Bill[ \t]*Period[ \t]*[:\-]?[ \t]*({DATE}[ \t]*(?:to|-)[ \t]*{DATE})"),
            r"Bill(?:ing)?[ \t]*Month[ \t]*[:\-]?[ \t]*([A-Z]{3,9}[ \t\-']*\d{2,4})".into(),
        ],
        FieldId::PreviousReadingDate => vec![
            date(r"Previous[ \t]*(?:Reading[ \t]*|Read[ \t]*)?Date"),
            date(r"Last[ \t]*Reading[ \t]*Date"),
            date(r"Prev\.?[ \t]*Rdg\.?[ \t]*Date"),
        ],
        FieldId::CurrentReadingDate => vec![
            date(r"Current[ \t]*(?:Reading[ \t]*|Read[ \t]*)?Date"),
            date(r"Present[ \t]*(?:Reading[ \t]*)?Date"),
            date(r"Curr\.?[ \t]*Rdg\.?[ \t]*Date"),
        ],
        FieldId::UnitsConsumed => vec![
            r"Units[ \t]*Consumed[ \t]*[:\-]?[ \t]*(\d+(?:\.\d+)?)".into(),
            r"Total[ \t]*Units[ \t]*[:\-]?[ \t]*(\d+(?:\.\d+)?)".into(),
            r"Consumption[ \t]*(?:\(kWh\))?[ \t]*[:\-]?[ \t]*(\d+(?:\.\d+)?)".into(),
        ],
        FieldId::BillAmount => vec![
            r"(?:Total[ \t]*)?(?:Bill[ \t]*)?Amount[ \t]*(?:Payable|Due)[ \t]*[:\-]?[ \t]*(?:Rs\.?|₹|INR)[ \t]*(\d[\d,]*(?:\.\d{1,2})?)".into(),
            r"(?:Total[ \t]*)?(?:Bill[ \t]*)?Amount[ \t]*[:\-]?[ \t]*(?:Rs\.?|₹|INR)[ \t]*(\d[\d,]*(?:\.\d{1,2})?)".into(),
            r"Net[ \t]*Payable[ \t]*[:\-]?[ \t]*(?:Rs\.?|₹|INR)?[ \t]*(\d[\d,]*(?:\.\d{1,2})?)".into(),
            r"(?:Total[ \t]*)?(?:Bill[ \t]*)?Amount[ \t]*(?:Payable|Due)?[ \t]*[:\-]?[ \t]*(\d[\d,]*(?:\.\d{1,2})?)".into(),
        ],
        FieldId::DueDate => vec![
            date(r"(?:Payment[ \t]*)?Due[ \t]*Date"),
            date(r"Pay[ \t]*(?:by|Before)"),
            date(r"Last[ \t]*Date[ \t]*(?:of|for)[ \t]*Payment"),
        ],
        FieldId::Address => vec![
            r"(?:Consumer|Service|Supply)[ \t]*Address[ \t]*[:\-]?[ \t]*([A-Z0-9][A-Za-z0-9 ,.\-/#]{9,149})".into(),
            r"\bAddress[ \t]*[:\-]?[ \t]*([A-Z0-9][A-Za-z0-9 ,.\-/#]{9,149})".into(),
        ],
        FieldId::Discom => DISCOMS
            .iter()
            .map(|name| {
                let words: Vec<String> = name.split(' ').map(regex::escape).collect();
                format!(r"\b({})\b", words.join(r"[ \t]+"))
            })
            .collect(),
    }
}

/// Known distribution companies in their canonical spelling, checked in
/// this order.
const DISCOMS: &[&str] = &[
    "MSEDCL",
    "TATA Power",
    "Adani Electricity",
    "BSES Rajdhani",
    "BSES Yamuna",
    "BSES",
    "BESCOM",
    "KSEB",
    "TANGEDCO",
    "PSPCL",
    "UPPCL",
    "Reliance Energy",
    "Torrent Power",
    "JdVVNL",
    "AVVNL",
    "JVVNL",
    "WBSEDCL",
    "CESC",
    "TSSPDCL",
    "APSPDCL",
    "DHBVN",
    "UHBVN",
];

/// The listed spelling of a matched DISCOM name; other values pass through.
fn canonical_discom(value: &str) -> String {
    let spaced = value.split_whitespace().collect::<Vec<_>>().join(" ");
    DISCOMS
        .iter()
        .find(|name| name.eq_ignore_ascii_case(&spaced))
        .map_or_else(|| value.to_string(), |name| name.to_string())
}

// ── Extractor ─────────────────────────────────────────────────────────────────

/// Deterministic per-field pattern matcher over OCR text.
#[derive(Debug, Clone)]
pub struct RegexExtractor {
    patterns: BTreeMap<FieldId, Vec<Regex>>,
}

impl RegexExtractor {
    /// Compile the built-ins plus any overrides; a bad pattern fails here,
    /// never at match time.
    pub fn new(config: &RegexConfig) -> Result<Self, PatternError> {
        let mut overrides = BTreeMap::new();
        for (name, list) in &config.field_patterns {
            let id = FieldId::from_str(name).map_err(|_| PatternError::UnknownField(name.clone()))?;
            overrides.insert(id, list.clone());
        }

        let mut patterns = BTreeMap::new();
        for id in FieldId::ALL {
            let sources = overrides.remove(&id).unwrap_or_else(|| default_patterns(id));
            let compiled = sources
                .iter()
                .map(|p| {
                    RegexBuilder::new(p)
                        .case_insensitive(true)
                        .build()
                        .map_err(|source| PatternError::Invalid { field: id, source })
                })
                .collect::<Result<Vec<_>, _>>()?;
            patterns.insert(id, compiled);
        }
        Ok(Self { patterns })
    }

    /// Extract every schema field. Unmatched fields are absent, never errors.
    pub fn extract(&self, ocr_text: &str, schema: &FieldSchema) -> ExtractionResult {
        ExtractionResult::from_fn(schema, |id| {
            FieldValue::from_option(self.first_match(id, ocr_text).as_deref(), Source::Regex)
        })
    }

    pub fn pattern_count(&self, id: FieldId) -> usize {
        self.patterns.get(&id).map_or(0, Vec::len)
    }

    fn first_match(&self, id: FieldId, text: &str) -> Option<String> {
        self.patterns.get(&id)?.iter().find_map(|re| {
            let caps = re.captures(text)?;
            let m = caps.get(1).or_else(|| caps.get(0))?;
            let value = post_process(id, m.as_str().trim());
            (!value.is_empty()).then_some(value)
        })
    }
}

impl Default for RegexExtractor {
    fn default() -> Self {
        Self::new(&RegexConfig::default()).expect("built-in patterns compile")
    }
}

fn post_process(id: FieldId, value: &str) -> String {
    match id {
        FieldId::BillAmount => value.replace(',', ""),
        FieldId::Discom => canonical_discom(value),
        _ => value.to_string(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
