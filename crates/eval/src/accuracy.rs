use billscan_core::{FieldId, FieldLookup, FieldSchema};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ground_truth::GroundTruth;
use crate::normalize::Normalizer;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldAccuracy {
    /// Empty when ground truth has nothing for the field.
    pub expected: String,
    pub extracted: Option<String>,
    pub correct: bool,
}

/// Per-field comparison plus aggregate score for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyRecord {
    pub fields: BTreeMap<FieldId, FieldAccuracy>,
    pub correct_count: usize,
    /// Always the schema size.
    pub total_count: usize,
    /// Percentage, two decimal places.
    pub accuracy_pct: f64,
}

impl AccuracyRecord {
    pub fn is_correct(&self, id: FieldId) -> Option<bool> {
        self.fields.get(&id).map(|f| f.correct)
    }
}

/// Score `extracted` against `ground_truth` over the whole schema.
///
/// A missing ground-truth entry is an empty expectation. An absent extracted
/// value is correct only when the expectation normalizes to empty.
pub fn evaluate<L: FieldLookup + ?Sized>(
    extracted: &L,
    ground_truth: &GroundTruth,
    schema: &FieldSchema,
    normalizer: &Normalizer,
) -> AccuracyRecord {
    let fields: BTreeMap<FieldId, FieldAccuracy> = schema
        .ids()
        .map(|id| {
            let expected = ground_truth.expected(id);
            let value = extracted.field_value(id);
            let correct = normalizer.matches(expected, value.unwrap_or(""));
            let row = FieldAccuracy {
                expected: expected.to_string(),
                extracted: value.map(str::to_string),
                correct,
            };
            (id, row)
        })
        .collect();

    let correct_count = fields.values().filter(|f| f.correct).count();
    let total_count = schema.len();

    AccuracyRecord {
        fields,
        correct_count,
        total_count,
        accuracy_pct: percentage(correct_count, total_count),
    }
}

/// `part / whole * 100`, rounded half away from zero to two places.
pub(crate) fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    let pct = Decimal::from(part as u64) * Decimal::from(100) / Decimal::from(whole as u64);
    pct.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use billscan_core::{ExtractionResult, FieldValue, Source};

    use crate::normalize::NormalizationPolicy;

    fn schema() -> FieldSchema {
        FieldSchema::electricity_bill()
    }

    fn extracted(pairs: &[(FieldId, &str)]) -> ExtractionResult {
        ExtractionResult::from_fn(&schema(), |id| {
            pairs
                .iter()
                .find(|(f, _)| *f == id)
                .map_or_else(FieldValue::absent, |(_, v)| FieldValue::found(*v, Source::Regex))
        })
    }

    fn truth(pairs: &[(FieldId, &str)]) -> GroundTruth {
        pairs.iter().map(|(id, v)| (*id, v.to_string())).collect()
    }

    #[test]
    fn total_is_always_schema_size() {
        let record = evaluate(
            &extracted(&[]),
            &truth(&[(FieldId::BillAmount, "1850.50")]),
            &schema(),
            &Normalizer::default(),
        );
        assert_eq!(record.total_count, 11);
        assert_eq!(record.fields.len(), 11);
        // Ten empty expectations met by absent values, one miss.
        assert_eq!(record.correct_count, 10);
        assert_eq!(record.accuracy_pct, 90.91);
    }

    #[test]
    fn currency_prefix_fails_without_stripping() {
        let ex = extracted(&[(FieldId::BillAmount, "Rs. 1850.50 ")]);
        let gt = truth(&[(FieldId::BillAmount, "1850.50")]);
        let record = evaluate(&ex, &gt, &schema(), &Normalizer::default());
        assert_eq!(record.is_correct(FieldId::BillAmount), Some(false));
    }

    #[test]
    fn currency_prefix_passes_with_stripping() {
        let ex = extracted(&[(FieldId::BillAmount, "Rs. 1850.50 ")]);
        let gt = truth(&[(FieldId::BillAmount, "1850.50")]);
        let n = Normalizer::new(NormalizationPolicy {
            strip_currency_and_units: true,
            ..NormalizationPolicy::default()
        });
        let record = evaluate(&ex, &gt, &schema(), &n);
        assert_eq!(record.is_correct(FieldId::BillAmount), Some(true));
        assert_eq!(record.correct_count, 11);
        assert_eq!(record.accuracy_pct, 100.0);
    }

    #[test]
    fn omitted_truth_and_absent_value_is_correct() {
        let record = evaluate(
            &extracted(&[(FieldId::ConsumerNumber, "1234567890")]),
            &truth(&[(FieldId::ConsumerNumber, "1234567890")]),
            &schema(),
            &Normalizer::default(),
        );
        let discom = &record.fields[&FieldId::Discom];
        assert!(discom.correct);
        assert_eq!(discom.expected, "");
        assert_eq!(discom.extracted, None);
    }

    #[test]
    fn absent_value_with_expectation_is_wrong() {
        let record = evaluate(
            &extracted(&[]),
            &truth(&[(FieldId::DueDate, "15/03/2024")]),
            &schema(),
            &Normalizer::default(),
        );
        assert_eq!(record.is_correct(FieldId::DueDate), Some(false));
    }

    #[test]
    fn value_without_expectation_is_wrong() {
        let record = evaluate(
            &extracted(&[(FieldId::Address, "12 MG Road")]),
            &GroundTruth::default(),
            &schema(),
            &Normalizer::default(),
        );
        assert_eq!(record.is_correct(FieldId::Address), Some(false));
    }

    #[test]
    fn comparison_is_case_and_space_insensitive() {
        let record = evaluate(
            &extracted(&[(FieldId::ConsumerName, "RAMESH  KUMAR")]),
            &truth(&[(FieldId::ConsumerName, "Ramesh Kumar")]),
            &schema(),
            &Normalizer::default(),
        );
        assert_eq!(record.is_correct(FieldId::ConsumerName), Some(true));
    }

    #[test]
    fn scores_persisted_maps_too() {
        let mut stored: BTreeMap<FieldId, Option<String>> = BTreeMap::new();
        stored.insert(FieldId::UnitsConsumed, Some("245".to_string()));
        stored.insert(FieldId::Discom, None);
        let record = evaluate(
            &stored,
            &truth(&[(FieldId::UnitsConsumed, "245")]),
            &schema(),
            &Normalizer::default(),
        );
        assert_eq!(record.correct_count, 11);
    }

    #[test]
    fn percentage_rounds_to_two_places() {
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(2, 3), 66.67);
        assert_eq!(percentage(0, 11), 0.0);
        assert_eq!(percentage(0, 0), 0.0);
    }

    #[test]
    fn record_serializes_with_field_ids() {
        let record = evaluate(&extracted(&[]), &GroundTruth::default(), &schema(), &Normalizer::default());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["total_count"], 11);
        assert_eq!(json["fields"]["bill_amount"]["correct"], true);
        assert!(json["fields"]["bill_amount"]["extracted"].is_null());
    }
}
