use billscan_core::{merge, ErrorClass, ErrorKind, ExtractionResult, Failure, FieldSchema, Stage};
use billscan_eval::{evaluate, AccuracyRecord, GroundTruthSource, NoGroundTruth, Normalizer};
use billscan_llm::{LlmError, LlmExtractor};
use billscan_ocr::{
    clean_ocr_text, encode_png, DocumentLoader, LoadError, OcrBackend, OcrError, Preprocessor, RegexExtractor,
};
use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where a file is in its run. `Failed` can follow any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Loaded,
    Preprocessed,
    OcrDone,
    Extracted,
    Merged,
    Evaluated,
    SkippedEval,
    Done,
    Failed,
}

/// Everything known about one input after its run, success or not.
#[derive(Debug, Clone, Serialize)]
pub struct FileResult {
    pub path: PathBuf,
    pub file_name: String,
    pub output_stem: String,
    pub ocr_text: Option<String>,
    pub regex: Option<ExtractionResult>,
    pub llm: Option<ExtractionResult>,
    #[serde(rename = "final")]
    pub final_result: Option<ExtractionResult>,
    pub accuracy: Option<AccuracyRecord>,
    pub states: Vec<PipelineState>,
    pub failure: Option<Failure>,
    /// Set when the file's records could not be written.
    pub output_error: Option<String>,
}

impl FileResult {
    fn new(path: &Path, output_stem: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            output_stem: output_stem.to_string(),
            ocr_text: None,
            regex: None,
            llm: None,
            final_result: None,
            accuracy: None,
            states: Vec::new(),
            failure: None,
            output_error: None,
        }
    }

    pub fn state(&self) -> Option<PipelineState> {
        self.states.last().copied()
    }

    /// The pipeline failed or the records were not persisted.
    pub fn is_failed(&self) -> bool {
        self.failure.is_some() || self.output_error.is_some()
    }

    pub fn was_evaluated(&self) -> bool {
        self.accuracy.is_some()
    }

    fn enter(&mut self, state: PipelineState) {
        debug!(file = %self.file_name, ?state, "State");
        self.states.push(state);
    }
}

/// Bounded retries and a per-call deadline for network stages.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_secs(1),
            call_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Run `call` until it succeeds, fails with a non-transient error, or
    /// attempts run out. A call exceeding the deadline fails with
    /// `on_timeout()`, which should be transient.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut call: F, on_timeout: impl Fn() -> E) -> Result<T, E>
    where
        E: ErrorClass,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let err = match tokio::time::timeout(self.call_timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => on_timeout(),
            };
            if !err.is_transient() || attempt >= attempts {
                return Err(err);
            }
            warn!(what, attempt, error = %err, "Backend unavailable, retrying");
            tokio::time::sleep(self.backoff).await;
            attempt += 1;
        }
    }
}

/// Runs one bill through load → preprocess → OCR → extract → merge → evaluate.
pub struct BillPipeline {
    schema: FieldSchema,
    loader: DocumentLoader,
    preprocessor: Preprocessor,
    ocr: Arc<dyn OcrBackend>,
    regex: RegexExtractor,
    llm: Option<LlmExtractor>,
    ground_truth: Arc<dyn GroundTruthSource>,
    normalizer: Normalizer,
    retry: RetryPolicy,
}

impl BillPipeline {
    /// A pipeline with default loader/preprocessing, no LLM stage and no
    /// ground truth.
    pub fn new(ocr: Arc<dyn OcrBackend>, regex: RegexExtractor) -> Self {
        Self {
            schema: FieldSchema::electricity_bill(),
            loader: DocumentLoader::default(),
            preprocessor: Preprocessor::default(),
            ocr,
            regex,
            llm: None,
            ground_truth: Arc::new(NoGroundTruth),
            normalizer: Normalizer::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_loader(mut self, loader: DocumentLoader) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_preprocessor(mut self, preprocessor: Preprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn with_llm(mut self, llm: Option<LlmExtractor>) -> Self {
        self.llm = llm;
        self
    }

    pub fn with_ground_truth(mut self, source: Arc<dyn GroundTruthSource>) -> Self {
        self.ground_truth = source;
        self
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    /// Process one file. Never fails: errors end up in `FileResult::failure`.
    pub async fn process_file(&self, path: &Path, output_stem: &str) -> FileResult {
        let mut result = FileResult::new(path, output_stem);
        info!(file = %result.file_name, "Processing");

        match self.run(&mut result).await {
            Ok(()) => {
                result.enter(PipelineState::Done);
                info!(file = %result.file_name, "Done");
            }
            Err(failure) => {
                warn!(file = %result.file_name, %failure, "Failed");
                result.failure = Some(failure);
                result.enter(PipelineState::Failed);
            }
        }
        result
    }

    async fn run(&self, result: &mut FileResult) -> Result<(), Failure> {
        // Load
        let loader = self.loader.clone();
        let path = result.path.clone();
        let pages = tokio::task::spawn_blocking(move || loader.load(&path))
            .await
            .map_err(|e| Failure::new(Stage::Load, ErrorKind::LoadError, e.to_string()))?
            .map_err(|e| Failure::from_error(Stage::Load, &e))?;
        if pages.len() > 1 {
            warn!(file = %result.file_name, pages = pages.len(), "Only the first page is processed");
        }
        let page = pages
            .into_iter()
            .next()
            .ok_or_else(|| Failure::from_error(Stage::Load, &LoadError::NoPages))?;
        result.enter(PipelineState::Loaded);

        // Preprocess
        let preprocessor = self.preprocessor.clone();
        let png = tokio::task::spawn_blocking(move || {
            preprocessor.clean(&page).and_then(|img| encode_png(&img))
        })
        .await
        .map_err(|e| Failure::new(Stage::Preprocess, ErrorKind::PreprocessError, e.to_string()))?
        .map_err(|e| Failure::from_error(Stage::Preprocess, &e))?;
        result.enter(PipelineState::Preprocessed);

        // OCR
        let timeout = self.retry.call_timeout;
        let raw = self
            .retry
            .run(
                "ocr",
                || self.ocr.recognize(&png),
                || OcrError::Unavailable(format!("timed out after {}s", timeout.as_secs())),
            )
            .await
            .map_err(|e| Failure::from_error(Stage::Ocr, &e))?;
        let text = clean_ocr_text(&raw);
        if text.is_empty() {
            return Err(Failure::from_error(Stage::Ocr, &OcrError::EmptyText));
        }
        debug!(file = %result.file_name, chars = text.len(), ocr_text = %text, "OCR text");
        result.ocr_text = Some(text.clone());
        result.enter(PipelineState::OcrDone);

        // Extract
        let regex = self.regex.extract(&text, &self.schema);
        info!(file = %result.file_name, found = regex.found_count(), "Regex extraction");
        result.regex = Some(regex.clone());

        let llm = match &self.llm {
            Some(extractor) => {
                let r = self
                    .retry
                    .run(
                        "llm",
                        || extractor.extract(&text, &self.schema),
                        || LlmError::BackendUnavailable(format!("timed out after {}s", timeout.as_secs())),
                    )
                    .await
                    .map_err(|e| Failure::from_error(Stage::LlmExtract, &e))?;
                info!(file = %result.file_name, found = r.found_count(), "LLM extraction");
                r
            }
            None => ExtractionResult::empty(&self.schema),
        };
        result.llm = Some(llm.clone());
        result.enter(PipelineState::Extracted);

        // Merge
        let merged = merge(&regex, &llm, &self.schema);
        info!(file = %result.file_name, found = merged.found_count(), "Merged");
        result.final_result = Some(merged.clone());
        result.enter(PipelineState::Merged);

        // Evaluate
        let truth = self
            .ground_truth
            .resolve(&result.file_name)
            .map_err(|e| Failure::from_error(Stage::Evaluate, &e))?;
        match truth {
            Some(truth) => {
                let record = evaluate(&merged, &truth, &self.schema, &self.normalizer);
                info!(
                    file = %result.file_name,
                    accuracy = record.accuracy_pct,
                    correct = record.correct_count,
                    total = record.total_count,
                    "Evaluated"
                );
                result.accuracy = Some(record);
                result.enter(PipelineState::Evaluated);
            }
            None => result.enter(PipelineState::SkippedEval),
        }

        Ok(())
    }
}
