use billscan_core::{FieldId, FieldSchema};
use billscan_eval::{evaluate, AccuracyRecord, AccuracyTally, FieldHitRate, GroundTruthSource, Normalizer};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::batch::BatchError;
use crate::output::{write_json, EXTRACTED_SUFFIX, SUMMARY_FILE};

pub const EVALUATION_REPORT_FILE: &str = "evaluation_report.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RescoreStatus {
    Evaluated,
    NoGroundTruth,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct RescoreEntry {
    pub output_stem: String,
    /// Input file name, when the batch summary records it.
    pub file: Option<String>,
    pub status: RescoreStatus,
    pub accuracy: Option<AccuracyRecord>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub files_evaluated: usize,
    pub fields_evaluated: usize,
    pub fields_correct: usize,
    pub mean_accuracy_pct: Option<f64>,
    pub field_level_accuracy_pct: Option<f64>,
    pub field_hit_rates: BTreeMap<FieldId, FieldHitRate>,
    pub files: Vec<RescoreEntry>,
}

/// `<stem>_extracted.json` files directly inside `dir`, sorted.
fn extracted_files(dir: &Path) -> Result<Vec<(String, PathBuf)>, BatchError> {
    if !dir.is_dir() {
        return Err(BatchError::MissingDirectory(dir.to_path_buf()));
    }
    let mut found = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|source| BatchError::ReadDir { path: dir.to_path_buf(), source })?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(stem) = name.strip_suffix(EXTRACTED_SUFFIX) {
            if entry.file_type().is_file() && !stem.is_empty() {
                found.push((stem.to_string(), entry.into_path()));
            }
        }
    }
    Ok(found)
}

#[derive(Deserialize)]
struct SummaryFiles {
    #[serde(default)]
    files: Vec<SummaryFile>,
}

#[derive(Deserialize)]
struct SummaryFile {
    file: String,
    output_stem: String,
}

/// Output stem to input file name, from a previous run's summary. Stems
/// may carry a collision suffix, so ground truth is matched on the name.
fn input_names(output_dir: &Path) -> HashMap<String, String> {
    let path = output_dir.join(SUMMARY_FILE);
    let Ok(text) = std::fs::read_to_string(&path) else {
        return HashMap::new();
    };
    match serde_json::from_str::<SummaryFiles>(&text) {
        Ok(summary) => summary.files.into_iter().map(|f| (f.output_stem, f.file)).collect(),
        Err(e) => {
            warn!(file = %path.display(), error = %e, "Ignoring unreadable batch summary");
            HashMap::new()
        }
    }
}

fn load_extracted(path: &Path) -> Result<BTreeMap<FieldId, Option<String>>, String> {
    let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&text).map_err(|e| e.to_string())
}

/// Re-score saved extraction records in `output_dir` and write
/// `evaluation_report.json` next to them. Ground truth is looked up by the
/// input file name recorded in `batch_summary.json`, else by output stem.
pub fn rescore_outputs(
    output_dir: &Path,
    ground_truth: &dyn GroundTruthSource,
    schema: &FieldSchema,
    normalizer: &Normalizer,
) -> Result<EvaluationReport, BatchError> {
    let mut tally = AccuracyTally::new();
    let mut files = Vec::new();
    let names = input_names(output_dir);

    for (stem, path) in extracted_files(output_dir)? {
        let file = names.get(&stem).cloned();
        let lookup = file.as_deref().unwrap_or(&stem);
        let entry = match load_extracted(&path) {
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Unreadable extraction record");
                RescoreEntry { output_stem: stem, file, status: RescoreStatus::Error, accuracy: None, error: Some(e) }
            }
            Ok(extracted) => match ground_truth.resolve(lookup) {
                Ok(Some(truth)) => {
                    let record = evaluate(&extracted, &truth, schema, normalizer);
                    info!(file = %stem, accuracy = record.accuracy_pct, "Evaluated");
                    tally.add(&record);
                    RescoreEntry {
                        output_stem: stem,
                        file,
                        status: RescoreStatus::Evaluated,
                        accuracy: Some(record),
                        error: None,
                    }
                }
                Ok(None) => {
                    info!(file = %stem, "No ground truth");
                    RescoreEntry {
                        output_stem: stem,
                        file,
                        status: RescoreStatus::NoGroundTruth,
                        accuracy: None,
                        error: None,
                    }
                }
                Err(e) => {
                    warn!(file = %stem, error = %e, "Ground truth lookup failed");
                    RescoreEntry {
                        output_stem: stem,
                        file,
                        status: RescoreStatus::Error,
                        accuracy: None,
                        error: Some(e.to_string()),
                    }
                }
            },
        };
        files.push(entry);
    }

    let (fields_correct, fields_evaluated) = files
        .iter()
        .filter_map(|f| f.accuracy.as_ref())
        .fold((0, 0), |(c, t), r| (c + r.correct_count, t + r.total_count));

    let report = EvaluationReport {
        files_evaluated: tally.files(),
        fields_evaluated,
        fields_correct,
        mean_accuracy_pct: tally.mean_accuracy_pct(),
        field_level_accuracy_pct: tally.field_level_accuracy_pct(),
        field_hit_rates: tally.field_hit_rates(),
        files,
    };

    for (id, rate) in &report.field_hit_rates {
        info!(field = %id, correct = rate.correct, evaluated = rate.evaluated, pct = rate.accuracy_pct, "Field hit rate");
    }
    info!(
        files = report.files_evaluated,
        mean_accuracy = ?report.mean_accuracy_pct,
        field_level_accuracy = ?report.field_level_accuracy_pct,
        "Evaluation complete"
    );

    write_json(&output_dir.join(EVALUATION_REPORT_FILE), &report)?;
    Ok(report)
}
