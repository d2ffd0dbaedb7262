use billscan_core::{ErrorClass, ErrorKind, FieldId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Failed to read ground truth {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid ground truth JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Malformed ground truth: {0}")]
    Malformed(String),
}

impl ErrorClass for EvalError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::EvalError
    }
}

/// Expected values for one bill. Fields it does not mention are empty
/// expectations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroundTruth {
    values: BTreeMap<FieldId, String>,
}

/// Placeholder some annotators use for "not applicable".
const NOT_APPLICABLE: &str = "NA";

impl GroundTruth {
    pub fn expected(&self, id: FieldId) -> &str {
        self.values.get(&id).map_or("", String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Read one entry. Accepts flat `field_id` keys plus the annotated
    /// layout (`previousReadingDate`, `presentReadingDate` and the first
    /// element of `meterReadings`). Unknown keys are ignored.
    pub fn from_json(entry: &Value) -> Result<Self, EvalError> {
        let Value::Object(obj) = entry else {
            return Err(EvalError::Malformed(format!("expected an object, got {entry}")));
        };

        let mut truth = GroundTruth::default();
        for (key, value) in obj {
            if let Ok(id) = FieldId::from_str(key) {
                truth.set(id, value)?;
            }
        }

        for (key, id) in [
            ("previousReadingDate", FieldId::PreviousReadingDate),
            ("presentReadingDate", FieldId::CurrentReadingDate),
        ] {
            if let Some(v) = obj.get(key) {
                truth.set(id, v)?;
            }
        }

        if let Some(meter) = obj
            .get("meterReadings")
            .and_then(Value::as_array)
            .and_then(|m| m.first())
            .and_then(Value::as_object)
        {
            if let Some(v) = first_of(meter, &["meterNumber", "expected_meter_number"]) {
                truth.set(FieldId::MeterNumber, v)?;
            }
            if let Some(v) = first_of(meter, &["unitsConsumed", "expected_unit_consumption"]) {
                truth.set(FieldId::UnitsConsumed, v)?;
            }
        }

        Ok(truth)
    }

    fn set(&mut self, id: FieldId, value: &Value) -> Result<(), EvalError> {
        let text = match value {
            Value::Null => return Ok(()),
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            other => {
                return Err(EvalError::Malformed(format!(
                    "unsupported value for {id}: {other}"
                )))
            }
        };
        if text.is_empty() || text == NOT_APPLICABLE {
            self.values.remove(&id);
        } else {
            self.values.insert(id, text);
        }
        Ok(())
    }
}

fn first_of<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k))
}

impl FromIterator<(FieldId, String)> for GroundTruth {
    fn from_iter<I: IntoIterator<Item = (FieldId, String)>>(iter: I) -> Self {
        Self { values: iter.into_iter().collect() }
    }
}

/// Looks up the expected values for an input file by its base name.
pub trait GroundTruthSource: Send + Sync {
    fn resolve(&self, file_name: &str) -> Result<Option<GroundTruth>, EvalError>;
}

/// No ground truth for any file.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGroundTruth;

impl GroundTruthSource for NoGroundTruth {
    fn resolve(&self, _file_name: &str) -> Result<Option<GroundTruth>, EvalError> {
        Ok(None)
    }
}

/// The same expected values for every file.
#[derive(Debug, Clone, Default)]
pub struct SharedGroundTruth(pub GroundTruth);

impl GroundTruthSource for SharedGroundTruth {
    fn resolve(&self, _file_name: &str) -> Result<Option<GroundTruth>, EvalError> {
        Ok(Some(self.0.clone()))
    }
}

/// A JSON file read on every lookup. A top-level object applies to every
/// file; a top-level array holds entries matched case-insensitively by
/// `file_name` or by its stem.
#[derive(Debug, Clone)]
pub struct GroundTruthFile {
    path: PathBuf,
}

impl GroundTruthFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Value, EvalError> {
        let text = std::fs::read_to_string(&self.path).map_err(|source| EvalError::Read {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| EvalError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}

impl GroundTruthSource for GroundTruthFile {
    fn resolve(&self, file_name: &str) -> Result<Option<GroundTruth>, EvalError> {
        match self.read()? {
            shared @ Value::Object(_) => GroundTruth::from_json(&shared).map(Some),
            Value::Array(entries) => {
                let wanted = file_name.to_lowercase();
                let entry = entries.iter().find(|e| {
                    e.get("file_name")
                        .and_then(Value::as_str)
                        .is_some_and(|n| names_match(n, &wanted))
                });
                match entry {
                    Some(e) => GroundTruth::from_json(e).map(Some),
                    None => {
                        debug!(file_name, "No ground truth entry");
                        Ok(None)
                    }
                }
            }
            other => Err(EvalError::Malformed(format!(
                "{} must hold an object or an array, found {}",
                self.path.display(),
                json_type(&other)
            ))),
        }
    }
}

fn names_match(entry_name: &str, wanted: &str) -> bool {
    let entry_name = entry_name.to_lowercase();
    if entry_name == wanted {
        return true;
    }
    Path::new(&entry_name).file_stem().is_some_and(|s| s.to_string_lossy() == wanted)
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
