use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of every per-file failure the pipeline can record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    LoadError,
    PreprocessError,
    OcrError,
    MalformedResponse,
    BackendUnavailable,
    EvalError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::LoadError => write!(f, "LOAD_ERROR"),
            ErrorKind::PreprocessError => write!(f, "PREPROCESS_ERROR"),
            ErrorKind::OcrError => write!(f, "OCR_ERROR"),
            ErrorKind::MalformedResponse => write!(f, "MALFORMED_RESPONSE"),
            ErrorKind::BackendUnavailable => write!(f, "BACKEND_UNAVAILABLE"),
            ErrorKind::EvalError => write!(f, "EVAL_ERROR"),
        }
    }
}

/// Implemented by every stage error so the orchestrator can record and retry uniformly.
pub trait ErrorClass: std::error::Error {
    fn kind(&self) -> ErrorKind;

    /// Only backend outages are worth another attempt.
    fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::BackendUnavailable
    }
}

/// Pipeline stage in which a failure occurred. Regex extraction and merge
/// cannot fail, so they have no entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Load,
    Preprocess,
    Ocr,
    LlmExtract,
    Evaluate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Load => write!(f, "load"),
            Stage::Preprocess => write!(f, "preprocess"),
            Stage::Ocr => write!(f, "ocr"),
            Stage::LlmExtract => write!(f, "llm_extract"),
            Stage::Evaluate => write!(f, "evaluate"),
        }
    }
}

/// The recorded cause of a FAILED file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
}

impl Failure {
    pub fn new(stage: Stage, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { stage, kind, message: message.into() }
    }

    pub fn from_error<E: ErrorClass>(stage: Stage, err: &E) -> Self {
        Self::new(stage, err.kind(), err.to_string())
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed ({}): {}", self.stage, self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Outage;

    impl ErrorClass for Outage {
        fn kind(&self) -> ErrorKind {
            ErrorKind::BackendUnavailable
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("bad json")]
    struct BadJson;

    impl ErrorClass for BadJson {
        fn kind(&self) -> ErrorKind {
            ErrorKind::MalformedResponse
        }
    }

    #[test]
    fn kind_display_matches_serde() {
        for kind in [
            ErrorKind::LoadError,
            ErrorKind::PreprocessError,
            ErrorKind::OcrError,
            ErrorKind::MalformedResponse,
            ErrorKind::BackendUnavailable,
            ErrorKind::EvalError,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
    }

    #[test]
    fn stage_display_matches_serde() {
        for stage in [Stage::Load, Stage::Preprocess, Stage::Ocr, Stage::LlmExtract, Stage::Evaluate] {
            let json = serde_json::to_string(&stage).unwrap();
            assert_eq!(json, format!("\"{stage}\""));
        }
    }

    #[test]
    fn only_backend_outage_is_transient() {
        assert!(Outage.is_transient());
        assert!(!BadJson.is_transient());
    }

    #[test]
    fn failure_from_error_captures_kind_and_message() {
        let f = Failure::from_error(Stage::LlmExtract, &BadJson);
        assert_eq!(f.kind, ErrorKind::MalformedResponse);
        assert_eq!(f.message, "bad json");
        assert_eq!(f.to_string(), "llm_extract failed (MALFORMED_RESPONSE): bad json");
    }
}
