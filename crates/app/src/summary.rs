use billscan_core::{Failure, FieldId};
use billscan_eval::{AccuracyTally, FieldHitRate};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::pipeline::{FileResult, PipelineState};

#[derive(Debug, Clone, Serialize)]
pub struct SummaryLine {
    pub file: String,
    pub output_stem: String,
    pub status: PipelineState,
    pub evaluated: bool,
    pub fields_found: Option<usize>,
    pub accuracy_pct: Option<f64>,
    pub correct_count: Option<usize>,
    pub total_count: Option<usize>,
    pub error: Option<Failure>,
    pub output_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub generated_at: String,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub evaluated: usize,
    pub mean_accuracy_pct: Option<f64>,
    pub field_level_accuracy_pct: Option<f64>,
    pub field_hit_rates: BTreeMap<FieldId, FieldHitRate>,
    pub files: Vec<SummaryLine>,
}

impl BatchSummary {
    pub fn from_results(results: &[FileResult]) -> Self {
        let mut tally = AccuracyTally::new();
        tally.extend(results.iter().filter_map(|r| r.accuracy.as_ref()));

        let files: Vec<SummaryLine> = results
            .iter()
            .map(|r| SummaryLine {
                file: r.file_name.clone(),
                output_stem: r.output_stem.clone(),
                status: if r.is_failed() { PipelineState::Failed } else { PipelineState::Done },
                evaluated: r.was_evaluated(),
                fields_found: r.final_result.as_ref().map(|f| f.found_count()),
                accuracy_pct: r.accuracy.as_ref().map(|a| a.accuracy_pct),
                correct_count: r.accuracy.as_ref().map(|a| a.correct_count),
                total_count: r.accuracy.as_ref().map(|a| a.total_count),
                error: r.failure.clone(),
                output_error: r.output_error.clone(),
            })
            .collect();

        let failed = results.iter().filter(|r| r.is_failed()).count();
        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            processed: results.len(),
            succeeded: results.len() - failed,
            failed,
            evaluated: tally.files(),
            mean_accuracy_pct: tally.mean_accuracy_pct(),
            field_level_accuracy_pct: tally.field_level_accuracy_pct(),
            field_hit_rates: tally.field_hit_rates(),
            files,
        }
    }

    pub fn log(&self) {
        for line in &self.files {
            match (&line.error, &line.output_error, line.accuracy_pct) {
                (Some(err), _, _) => warn!(file = %line.file, error = %err, "FAILED"),
                (None, Some(err), _) => warn!(file = %line.file, error = %err, "FAILED (records not written)"),
                (None, None, Some(pct)) => info!(file = %line.file, accuracy = pct, "DONE"),
                (None, None, None) => info!(file = %line.file, "DONE (not evaluated)"),
            }
        }
        info!(
            processed = self.processed,
            succeeded = self.succeeded,
            failed = self.failed,
            evaluated = self.evaluated,
            mean_accuracy = ?self.mean_accuracy_pct,
            field_level_accuracy = ?self.field_level_accuracy_pct,
            "Batch complete"
        );
    }
}
