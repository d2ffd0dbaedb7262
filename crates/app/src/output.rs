use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::batch::BatchError;
use crate::pipeline::FileResult;
use crate::summary::BatchSummary;

pub const EXTRACTED_SUFFIX: &str = "_extracted.json";
pub const ACCURACY_SUFFIX: &str = "_accuracy_report.json";
pub const SUMMARY_FILE: &str = "batch_summary.json";
pub const DEBUG_DIR: &str = "debug_logs";

/// Writes per-file records and the batch summary into one directory.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    dir: PathBuf,
    debug_artifacts: bool,
}

impl OutputWriter {
    pub fn new(dir: impl Into<PathBuf>, debug_artifacts: bool) -> Result<Self, BatchError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| BatchError::Write { path: dir.clone(), source })?;
        Ok(Self { dir, debug_artifacts })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write whatever `result` reached. Returns the paths written.
    pub fn write_file_result(&self, result: &FileResult) -> Result<Vec<PathBuf>, BatchError> {
        let stem = &result.output_stem;
        let mut written = Vec::new();

        if let Some(final_result) = &result.final_result {
            let path = self.dir.join(format!("{stem}{EXTRACTED_SUFFIX}"));
            write_json(&path, &final_result.values())?;
            written.push(path);
        }
        if let Some(accuracy) = &result.accuracy {
            let path = self.dir.join(format!("{stem}{ACCURACY_SUFFIX}"));
            write_json(&path, accuracy)?;
            written.push(path);
        }

        if self.debug_artifacts {
            let debug_dir = self.dir.join(DEBUG_DIR).join(stem);
            std::fs::create_dir_all(&debug_dir)
                .map_err(|source| BatchError::Write { path: debug_dir.clone(), source })?;

            if let Some(text) = &result.ocr_text {
                let path = debug_dir.join("01_ocr.txt");
                std::fs::write(&path, text).map_err(|source| BatchError::Write { path: path.clone(), source })?;
                written.push(path);
            }
            for (name, stage) in [
                ("02_regex.json", &result.regex),
                ("03_llm.json", &result.llm),
                ("04_merged.json", &result.final_result),
            ] {
                if let Some(r) = stage {
                    let path = debug_dir.join(name);
                    write_json(&path, r)?;
                    written.push(path);
                }
            }
        }

        debug!(file = %result.file_name, count = written.len(), "Wrote outputs");
        Ok(written)
    }

    pub fn write_summary(&self, summary: &BatchSummary) -> Result<PathBuf, BatchError> {
        let path = self.dir.join(SUMMARY_FILE);
        write_json(&path, summary)?;
        Ok(path)
    }
}

pub(crate) fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), BatchError> {
    let body = serde_json::to_string_pretty(value).map_err(|source| BatchError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, body).map_err(|source| BatchError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use billscan_core::FieldId;
    use billscan_eval::{GroundTruth, SharedGroundTruth};
    use billscan_ocr::{MockRecognizer, RegexExtractor};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use crate::pipeline::BillPipeline;

    async fn processed(dir: &Path, with_truth: bool) -> FileResult {
        let input = dir.join("bill.png");
        image::GrayImage::from_fn(16, 16, |_, y| image::Luma([if y % 4 == 0 { 0 } else { 255 }]))
            .save(&input)
            .unwrap();
        let mut pipeline = BillPipeline::new(
            Arc::new(MockRecognizer::new("Consumer No: 1234567890")),
            RegexExtractor::default(),
        );
        if with_truth {
            let truth: GroundTruth = [(FieldId::ConsumerNumber, "1234567890".to_string())].into_iter().collect();
            pipeline = pipeline.with_ground_truth(Arc::new(SharedGroundTruth(truth)));
        }
        pipeline.process_file(&input, "bill").await
    }

    #[tokio::test]
    async fn writes_extracted_and_accuracy_reports() {
        let dir = tempfile::tempdir().unwrap();
        let result = processed(dir.path(), true).await;
        let out = OutputWriter::new(dir.path().join("out"), false).unwrap();
        let written = out.write_file_result(&result).unwrap();
        assert_eq!(written.len(), 2);

        let extracted: BTreeMap<String, Option<String>> =
            serde_json::from_str(&std::fs::read_to_string(out.dir().join("bill_extracted.json")).unwrap()).unwrap();
        assert_eq!(extracted.len(), 11);
        assert_eq!(extracted["consumer_number"].as_deref(), Some("1234567890"));
        assert_eq!(extracted["discom"], None);

        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.dir().join("bill_accuracy_report.json")).unwrap()).unwrap();
        assert_eq!(report["total_count"], 11);
        assert!(!out.dir().join(DEBUG_DIR).exists());
    }

    #[tokio::test]
    async fn no_accuracy_report_without_ground_truth() {
        let dir = tempfile::tempdir().unwrap();
        let result = processed(dir.path(), false).await;
        let out = OutputWriter::new(dir.path().join("out"), false).unwrap();
        out.write_file_result(&result).unwrap();
        assert!(out.dir().join("bill_extracted.json").exists());
        assert!(!out.dir().join("bill_accuracy_report.json").exists());
    }

    #[tokio::test]
    async fn debug_artifacts_cover_every_stage() {
        let dir = tempfile::tempdir().unwrap();
        let result = processed(dir.path(), false).await;
        let out = OutputWriter::new(dir.path().join("out"), true).unwrap();
        out.write_file_result(&result).unwrap();

        let debug_dir = out.dir().join(DEBUG_DIR).join("bill");
        for name in ["01_ocr.txt", "02_regex.json", "03_llm.json", "04_merged.json"] {
            assert!(debug_dir.join(name).exists(), "missing {name}");
        }
        let merged: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(debug_dir.join("04_merged.json")).unwrap()).unwrap();
        assert_eq!(merged["consumer_number"]["source"], "REGEX");
    }

    #[tokio::test]
    async fn summary_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let result = processed(dir.path(), true).await;
        let out = OutputWriter::new(dir.path().join("out"), false).unwrap();
        let summary = BatchSummary::from_results(std::slice::from_ref(&result));
        let path = out.write_summary(&summary).unwrap();

        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["processed"], 1);
        assert_eq!(json["succeeded"], 1);
        assert_eq!(json["evaluated"], 1);
        assert_eq!(json["files"][0]["status"], "DONE");
        assert_eq!(json["field_hit_rates"]["consumer_number"]["correct"], 1);
    }
}
