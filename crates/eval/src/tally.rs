use billscan_core::FieldId;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::accuracy::{percentage, AccuracyRecord};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldHitRate {
    pub correct: usize,
    pub evaluated: usize,
    pub accuracy_pct: f64,
}

/// Running aggregate over many `AccuracyRecord`s.
#[derive(Debug, Clone, Default)]
pub struct AccuracyTally {
    files: usize,
    correct: usize,
    total: usize,
    pct_sum: f64,
    per_field: BTreeMap<FieldId, (usize, usize)>,
}

impl AccuracyTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, record: &AccuracyRecord) {
        self.files += 1;
        self.correct += record.correct_count;
        self.total += record.total_count;
        self.pct_sum += record.accuracy_pct;
        for (id, field) in &record.fields {
            let entry = self.per_field.entry(*id).or_default();
            entry.1 += 1;
            if field.correct {
                entry.0 += 1;
            }
        }
    }

    pub fn files(&self) -> usize {
        self.files
    }

    /// Mean of the per-file percentages; `None` when nothing was scored.
    pub fn mean_accuracy_pct(&self) -> Option<f64> {
        (self.files > 0).then(|| (self.pct_sum / self.files as f64 * 100.0).round() / 100.0)
    }

    /// Correct fields over all fields scored, across files.
    pub fn field_level_accuracy_pct(&self) -> Option<f64> {
        (self.total > 0).then(|| percentage(self.correct, self.total))
    }

    pub fn field_hit_rates(&self) -> BTreeMap<FieldId, FieldHitRate> {
        self.per_field
            .iter()
            .map(|(id, &(correct, evaluated))| {
                let rate = FieldHitRate {
                    correct,
                    evaluated,
                    accuracy_pct: percentage(correct, evaluated),
                };
                (*id, rate)
            })
            .collect()
    }
}

impl<'a> Extend<&'a AccuracyRecord> for AccuracyTally {
    fn extend<I: IntoIterator<Item = &'a AccuracyRecord>>(&mut self, iter: I) {
        for record in iter {
            self.add(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billscan_core::{ExtractionResult, FieldSchema, FieldValue, Source};

    use crate::accuracy::evaluate;
    use crate::ground_truth::GroundTruth;
    use crate::normalize::Normalizer;

    fn record(amount: Option<&str>) -> AccuracyRecord {
        let schema = FieldSchema::electricity_bill();
        let extracted = ExtractionResult::from_fn(&schema, |id| match (id, amount) {
            (FieldId::BillAmount, Some(v)) => FieldValue::found(v, Source::Llm),
            _ => FieldValue::absent(),
        });
        let truth: GroundTruth = [(FieldId::BillAmount, "980".to_string())].into_iter().collect();
        evaluate(&extracted, &truth, &schema, &Normalizer::default())
    }

    #[test]
    fn empty_tally_has_no_means() {
        let tally = AccuracyTally::new();
        assert_eq!(tally.files(), 0);
        assert_eq!(tally.mean_accuracy_pct(), None);
        assert_eq!(tally.field_level_accuracy_pct(), None);
        assert!(tally.field_hit_rates().is_empty());
    }

    #[test]
    fn aggregates_across_files() {
        let hit = record(Some("980"));
        let miss = record(None);
        let mut tally = AccuracyTally::new();
        tally.extend([&hit, &miss]);

        assert_eq!(tally.files(), 2);
        // Mean of 100.0 and 90.91.
        let mean = tally.mean_accuracy_pct().unwrap();
        assert!((mean - 95.455).abs() < 0.01, "mean {mean}");
        assert_eq!(tally.field_level_accuracy_pct(), Some(95.45));

        let rates = tally.field_hit_rates();
        assert_eq!(rates.len(), 11);
        let amount = &rates[&FieldId::BillAmount];
        assert_eq!((amount.correct, amount.evaluated), (1, 2));
        assert_eq!(amount.accuracy_pct, 50.0);
        assert_eq!(rates[&FieldId::Discom].accuracy_pct, 100.0);
    }
}
