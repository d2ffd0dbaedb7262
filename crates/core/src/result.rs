use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::schema::{FieldId, FieldSchema};

/// Which extraction stage produced a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Source {
    Regex,
    Llm,
    None,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Regex => write!(f, "REGEX"),
            Source::Llm => write!(f, "LLM"),
            Source::None => write!(f, "NONE"),
        }
    }
}

/// A single field's value and provenance.
///
/// An absent value always carries `Source::None`, and a present value is
/// trimmed and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValue {
    value: Option<String>,
    source: Source,
}

static ABSENT: FieldValue = FieldValue { value: None, source: Source::None };

impl FieldValue {
    /// Build a value attributed to `source`; blank input collapses to absent.
    pub fn found(value: impl AsRef<str>, source: Source) -> Self {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() || source == Source::None {
            return Self::absent();
        }
        Self { value: Some(trimmed.to_string()), source }
    }

    pub fn from_option(value: Option<&str>, source: Source) -> Self {
        value.map_or_else(Self::absent, |v| Self::found(v, source))
    }

    pub fn absent() -> Self {
        Self { value: None, source: Source::None }
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }
}

/// Read access to field values, independent of where they came from.
pub trait FieldLookup {
    fn field_value(&self, id: FieldId) -> Option<&str>;
}

/// A full field → value mapping covering every schema field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractionResult {
    fields: BTreeMap<FieldId, FieldValue>,
}

impl ExtractionResult {
    /// Build a result by asking `f` for each field of the schema.
    pub fn from_fn(schema: &FieldSchema, mut f: impl FnMut(FieldId) -> FieldValue) -> Self {
        Self {
            fields: schema.ids().map(|id| (id, f(id))).collect(),
        }
    }

    /// A result where every schema field is absent.
    pub fn empty(schema: &FieldSchema) -> Self {
        Self::from_fn(schema, |_| FieldValue::absent())
    }

    pub fn get(&self, id: FieldId) -> &FieldValue {
        self.fields.get(&id).unwrap_or(&ABSENT)
    }

    pub fn value(&self, id: FieldId) -> Option<&str> {
        self.get(id).value()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldId, &FieldValue)> {
        self.fields.iter().map(|(id, v)| (*id, v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of fields with a present value.
    pub fn found_count(&self) -> usize {
        self.fields.values().filter(|v| v.is_present()).count()
    }

    /// The persisted form: `field_id -> value | null`.
    pub fn values(&self) -> BTreeMap<FieldId, Option<String>> {
        self.fields
            .iter()
            .map(|(id, v)| (*id, v.value.clone()))
            .collect()
    }
}

impl FieldLookup for ExtractionResult {
    fn field_value(&self, id: FieldId) -> Option<&str> {
        self.value(id)
    }
}

impl FieldLookup for BTreeMap<FieldId, Option<String>> {
    fn field_value(&self, id: FieldId) -> Option<&str> {
        self.get(&id)
            .and_then(|v| v.as_deref())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn found_trims_and_keeps_source() {
        let v = FieldValue::found("  1234567890 \n", Source::Regex);
        assert_eq!(v.value(), Some("1234567890"));
        assert_eq!(v.source(), Source::Regex);
    }

    #[test]
    fn blank_value_is_absent() {
        let v = FieldValue::found("   ", Source::Llm);
        assert!(!v.is_present());
        assert_eq!(v.source(), Source::None);
    }

    #[test]
    fn none_source_is_always_absent() {
        let v = FieldValue::found("something", Source::None);
        assert_eq!(v, FieldValue::absent());
    }

    #[test]
    fn empty_result_covers_whole_schema() {
        let schema = FieldSchema::electricity_bill();
        let r = ExtractionResult::empty(&schema);
        assert_eq!(r.len(), schema.len());
        assert_eq!(r.found_count(), 0);
        assert!(r.values().values().all(Option::is_none));
    }

    #[test]
    fn persisted_form_is_ordered_and_explicit() {
        let schema = FieldSchema::electricity_bill();
        let r = ExtractionResult::from_fn(&schema, |id| match id {
            FieldId::BillAmount => FieldValue::found("1850.50", Source::Regex),
            _ => FieldValue::absent(),
        });
        let json = serde_json::to_value(r.values()).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 11);
        assert_eq!(obj["bill_amount"], "1850.50");
        assert!(obj["discom"].is_null());
        let keys: Vec<_> = obj.keys().cloned().collect();
        assert_eq!(keys.first().map(String::as_str), Some("consumer_name"));
    }

    #[test]
    fn source_serializes_upper_case() {
        assert_eq!(serde_json::to_string(&Source::Llm).unwrap(), "\"LLM\"");
        assert_eq!(Source::None.to_string(), "NONE");
    }

    #[test]
    fn map_lookup_treats_blank_as_absent() {
        let mut map = BTreeMap::new();
        map.insert(FieldId::Discom, Some("  ".to_string()));
        map.insert(FieldId::MeterNumber, Some(" M1 ".to_string()));
        assert_eq!(map.field_value(FieldId::Discom), None);
        assert_eq!(map.field_value(FieldId::MeterNumber), Some("M1"));
        assert_eq!(map.field_value(FieldId::Address), None);
    }
}
