//! Batch extraction of electricity-bill fields: configuration, the
//! per-file pipeline, the batch driver and the output records.

pub mod batch;
pub mod config;
pub mod output;
pub mod pipeline;
pub mod rescore;
pub mod summary;

use billscan_eval::{GroundTruthFile, GroundTruthSource, NoGroundTruth, Normalizer};
use billscan_llm::{LlmExtractor, OpenAiClient};
use billscan_ocr::{DocumentLoader, GoogleVisionRecognizer, OcrBackend, Preprocessor, RegexExtractor};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::batch::{discover_inputs, run_batch_with, BatchError};
use crate::config::{Config, ConfigError, OcrEngine};
use crate::output::OutputWriter;
use crate::pipeline::{BillPipeline, RetryPolicy};
use crate::rescore::{rescore_outputs, EvaluationReport};
use crate::summary::BatchSummary;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Batch(#[from] BatchError),
}

fn credential(var: &str) -> Result<String, ConfigError> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingCredential(format!("{var} is not set")))
}

fn build_ocr(config: &Config) -> Result<Arc<dyn OcrBackend>, ConfigError> {
    match config.ocr.engine {
        OcrEngine::GoogleVision => {
            let key = credential(&config.ocr.vision.api_key_env)?;
            let recognizer = GoogleVisionRecognizer::new(&config.ocr.vision, key)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
            Ok(Arc::new(recognizer))
        }
        #[cfg(feature = "tesseract")]
        OcrEngine::Tesseract => Ok(Arc::new(billscan_ocr::TesseractRecognizer::new(
            config.ocr.tesseract.data_path.clone(),
            &config.ocr.tesseract.lang,
        ))),
        #[cfg(not(feature = "tesseract"))]
        OcrEngine::Tesseract => Err(ConfigError::Invalid(
            "ocr.engine = \"tesseract\" needs a build with the `tesseract` feature".into(),
        )),
    }
}

fn build_llm(config: &Config) -> Result<Option<LlmExtractor>, ConfigError> {
    if !config.llm.enabled {
        info!("LLM extraction disabled");
        return Ok(None);
    }
    let key = credential(&config.llm.api_key_env)?;
    let client = OpenAiClient::new(&config.llm, key).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    Ok(Some(LlmExtractor::new(Arc::new(client), &config.llm)))
}

/// The ground-truth file when it exists, otherwise no evaluation.
pub fn ground_truth_source(config: &Config) -> Arc<dyn GroundTruthSource> {
    let path = &config.paths.ground_truth;
    if path.is_file() {
        info!(path = %path.display(), "Using ground truth");
        Arc::new(GroundTruthFile::new(path))
    } else {
        info!(path = %path.display(), "No ground truth file, evaluation skipped");
        Arc::new(NoGroundTruth)
    }
}

/// Wire a pipeline from configuration. Missing credentials and bad
/// patterns are reported here, before any file is touched.
pub fn build_pipeline(config: &Config) -> Result<BillPipeline, ConfigError> {
    config.validate()?;
    let regex = RegexExtractor::new(&config.regex)?;
    let ocr = build_ocr(config)?;
    let llm = build_llm(config)?;

    Ok(BillPipeline::new(ocr, regex)
        .with_loader(DocumentLoader::new(config.ocr.loader.clone()))
        .with_preprocessor(Preprocessor::new(config.ocr.preprocess.clone()))
        .with_llm(llm)
        .with_ground_truth(ground_truth_source(config))
        .with_normalizer(Normalizer::new(config.evaluation))
        .with_retry(RetryPolicy {
            max_attempts: config.batch.max_attempts,
            backoff: config.batch.retry_backoff(),
            call_timeout: config.batch.call_timeout(),
        }))
}

/// Process every bill in `config.paths.input` with `pipeline`, writing each
/// file's records as it completes. Per-file failures, including failed
/// writes, end up in the summary; only directory-level errors abort.
pub async fn run(config: &Config, pipeline: &BillPipeline) -> Result<(BatchSummary, PathBuf), RunError> {
    let inputs = discover_inputs(&config.paths.input)?;
    info!(input = %config.paths.input.display(), files = inputs.len(), "Discovered inputs");
    let writer = OutputWriter::new(&config.paths.output, config.batch.debug_artifacts)?;

    let results = run_batch_with(pipeline, &inputs, config.batch.workers, |result| {
        if let Err(e) = writer.write_file_result(result) {
            warn!(file = %result.file_name, error = %e, "Failed to write records");
            result.output_error = Some(e.to_string());
        }
    })
    .await;

    let summary = BatchSummary::from_results(&results);
    let path = writer.write_summary(&summary)?;
    summary.log();
    Ok((summary, path))
}

/// Re-score the records already in `config.paths.output`.
pub fn rescore(config: &Config) -> Result<EvaluationReport, RunError> {
    let source = ground_truth_source(config);
    let schema = billscan_core::FieldSchema::electricity_bill();
    Ok(rescore_outputs(
        &config.paths.output,
        source.as_ref(),
        &schema,
        &Normalizer::new(config.evaluation),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_llm_key_is_a_config_error() {
        let mut config = Config::default();
        config.llm.api_key_env = "BILLSCAN_TEST_UNSET_LLM_KEY".into();
        assert!(matches!(build_llm(&config), Err(ConfigError::MissingCredential(_))));
    }

    #[test]
    fn disabled_llm_needs_no_key() {
        let mut config = Config::default();
        config.llm.enabled = false;
        config.llm.api_key_env = "BILLSCAN_TEST_UNSET_LLM_KEY".into();
        assert!(build_llm(&config).unwrap().is_none());
    }

    #[test]
    fn missing_vision_key_is_a_config_error() {
        let mut config = Config::default();
        config.ocr.vision.api_key_env = "BILLSCAN_TEST_UNSET_VISION_KEY".into();
        assert!(matches!(build_pipeline(&config), Err(ConfigError::MissingCredential(_))));
    }

    #[test]
    fn bad_pattern_is_reported_before_credentials() {
        let mut config = Config::default();
        config.regex = config.regex.with_patterns(billscan_core::FieldId::DueDate, &["(unclosed"]);
        config.ocr.vision.api_key_env = "BILLSCAN_TEST_UNSET_VISION_KEY".into();
        assert!(matches!(build_pipeline(&config), Err(ConfigError::Pattern(_))));
    }

    #[test]
    fn absent_ground_truth_file_means_no_evaluation() {
        let mut config = Config::default();
        config.paths.ground_truth = PathBuf::from("/nonexistent/ground_truth.json");
        assert!(ground_truth_source(&config).resolve("bill.pdf").unwrap().is_none());
    }
}
