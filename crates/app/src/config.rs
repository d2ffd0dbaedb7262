use billscan_eval::NormalizationPolicy;
use billscan_llm::LlmConfig;
use billscan_ocr::{LoaderConfig, PatternError, PreprocessConfig, RegexConfig, VisionConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "billscan.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Missing credential: {0}")]
    MissingCredential(String),
    #[error(transparent)]
    Pattern(#[from] PatternError),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub ocr: OcrConfig,
    pub llm: LlmConfig,
    pub regex: RegexConfig,
    pub evaluation: NormalizationPolicy,
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Skipped when the file does not exist.
    pub ground_truth: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("input"),
            output: PathBuf::from("output"),
            ground_truth: PathBuf::from("expected/ground_truth.json"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrEngine {
    #[default]
    GoogleVision,
    Tesseract,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub engine: OcrEngine,
    pub loader: LoaderConfig,
    pub preprocess: PreprocessConfig,
    pub vision: VisionConfig,
    pub tesseract: TesseractConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseractConfig {
    pub data_path: Option<String>,
    pub lang: String,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self { data_path: None, lang: "eng".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Files processed concurrently.
    pub workers: usize,
    /// Attempts per network call; only backend outages are retried.
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    /// Upper bound on a single OCR or LLM call.
    pub call_timeout_secs: u64,
    /// Write per-stage intermediates under `debug_logs/`.
    pub debug_artifacts: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            max_attempts: 2,
            retry_backoff_ms: 1000,
            call_timeout_secs: 60,
            debug_artifacts: false,
        }
    }
}

impl BatchConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl Config {
    /// Load `explicit` (which must exist), else `billscan.toml` if present,
    /// else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()),
        };

        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                toml::from_str(&content).map_err(|source| ConfigError::Parse { path, source })?
            }
            None => Config::default(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch.workers == 0 {
            return Err(ConfigError::Invalid("batch.workers must be at least 1".into()));
        }
        if self.batch.max_attempts == 0 {
            return Err(ConfigError::Invalid("batch.max_attempts must be at least 1".into()));
        }
        if self.batch.call_timeout_secs == 0 {
            return Err(ConfigError::Invalid("batch.call_timeout_secs must be positive".into()));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::Invalid(format!(
                "llm.temperature {} is outside 0.0..=2.0",
                self.llm.temperature
            )));
        }
        Ok(())
    }
}
