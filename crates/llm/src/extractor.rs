use billscan_core::{ExtractionResult, FieldSchema, FieldValue, Source};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;

use crate::client::{LlmBackend, LlmConfig, LlmError, LlmRequest};

pub const SYSTEM_PROMPT: &str = "You are a precise data extraction assistant. \
Extract only what is explicitly present in the text. Return valid JSON only.";

/// Build the user prompt: instructions, field list, OCR text, then a JSON
/// template holding every schema key.
pub fn build_prompt(ocr_text: &str, schema: &FieldSchema) -> String {
    let mut prompt = String::from(
        "You are given OCR text from an Indian electricity bill.\n\n\
         Extract the following fields exactly as they appear in the text.\n\
         If a field is missing or unclear, return null.\n\
         Do not guess or infer values.\n\
         Return ONLY valid JSON matching the schema below.\n\n\
         Required fields:\n",
    );
    for spec in schema.fields() {
        let _ = writeln!(prompt, "- {}: {}", spec.id, spec.description);
    }

    let _ = write!(prompt, "\nOCR Text:\n{ocr_text}\n\nReturn JSON in this exact format:\n{{\n");
    let last = schema.len().saturating_sub(1);
    for (i, id) in schema.ids().enumerate() {
        let comma = if i == last { "" } else { "," };
        let _ = writeln!(prompt, "  \"{id}\": null{comma}");
    }
    prompt.push_str("}\n");
    prompt
}

/// Strict decode of a completion into an `ExtractionResult`.
///
/// The body must be one JSON object, optionally wrapped in a single markdown
/// code fence, holding every schema key. Values may be strings, numbers or
/// null; anything else fails the whole response.
pub fn decode_response(raw: &str, schema: &FieldSchema) -> Result<ExtractionResult, LlmError> {
    let body = strip_code_fence(raw);
    let value: Value = serde_json::from_str(body)
        .map_err(|e| LlmError::MalformedResponse(format!("not valid JSON: {e}")))?;
    let Value::Object(map) = value else {
        return Err(LlmError::MalformedResponse("expected a JSON object".to_string()));
    };

    let mut decoded = BTreeMap::new();
    for id in schema.ids() {
        let v = map
            .get(id.as_str())
            .ok_or_else(|| LlmError::MalformedResponse(format!("missing key '{id}'")))?;
        let field = match v {
            Value::Null => FieldValue::absent(),
            Value::String(s) => FieldValue::found(s, Source::Llm),
            Value::Number(n) => FieldValue::found(n.to_string(), Source::Llm),
            other => {
                return Err(LlmError::MalformedResponse(format!(
                    "field '{id}' has unsupported value {other}"
                )))
            }
        };
        decoded.insert(id, field);
    }

    let extra: Vec<&str> = map
        .keys()
        .map(String::as_str)
        .filter(|k| !schema.ids().any(|id| id.as_str() == *k))
        .collect();
    if !extra.is_empty() {
        debug!(?extra, "Ignoring extra keys in LLM response");
    }

    Ok(ExtractionResult::from_fn(schema, |id| {
        decoded.remove(&id).unwrap_or_else(FieldValue::absent)
    }))
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line.
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Asks a hosted model for every schema field. No retries here.
#[derive(Clone)]
pub struct LlmExtractor {
    backend: Arc<dyn LlmBackend>,
    model: String,
    temperature: f32,
}

impl LlmExtractor {
    pub fn new(backend: Arc<dyn LlmBackend>, config: &LlmConfig) -> Self {
        Self {
            backend,
            model: config.model.clone(),
            temperature: config.temperature,
        }
    }

    pub fn request(&self, ocr_text: &str, schema: &FieldSchema) -> LlmRequest {
        LlmRequest {
            model: self.model.clone(),
            system: SYSTEM_PROMPT.to_string(),
            prompt: build_prompt(ocr_text, schema),
            temperature: self.temperature,
            json_only: true,
        }
    }

    pub async fn extract(&self, ocr_text: &str, schema: &FieldSchema) -> Result<ExtractionResult, LlmError> {
        let request = self.request(ocr_text, schema);
        debug!(model = %request.model, prompt = %request.prompt, "LLM request");

        let raw = self.backend.complete(&request).await?;
        debug!(response = %raw, "LLM response");

        decode_response(&raw, schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billscan_core::{ErrorClass, ErrorKind, FieldId};

    use crate::client::{MockLlm, ScriptedLlm};

    fn schema() -> FieldSchema {
        FieldSchema::electricity_bill()
    }

    fn full_response(overrides: &[(&str, Value)]) -> String {
        let mut map = serde_json::Map::new();
        for id in FieldId::ALL {
            map.insert(id.as_str().to_string(), Value::Null);
        }
        for (k, v) in overrides {
            map.insert(k.to_string(), v.clone());
        }
        Value::Object(map).to_string()
    }

    #[test]
    fn prompt_lists_every_field_and_the_text() {
        let prompt = build_prompt("Consumer No: 1234567890", &schema());
        for id in FieldId::ALL {
            assert!(prompt.contains(&format!("- {id}: ")), "missing {id}");
            assert!(prompt.contains(&format!("\"{id}\": null")));
        }
        assert!(prompt.contains("OCR Text:\nConsumer No: 1234567890"));
        assert!(prompt.contains("\"discom\": null\n}"));
    }

    #[test]
    fn decodes_strings_numbers_and_nulls() {
        let raw = full_response(&[
            ("consumer_number", Value::from("9999999999")),
            ("units_consumed", Value::from(245)),
            ("bill_amount", Value::from(1850.5)),
            ("address", Value::from("   ")),
        ]);
        let r = decode_response(&raw, &schema()).unwrap();
        assert_eq!(r.value(FieldId::ConsumerNumber), Some("9999999999"));
        assert_eq!(r.get(FieldId::ConsumerNumber).source(), Source::Llm);
        assert_eq!(r.value(FieldId::UnitsConsumed), Some("245"));
        assert_eq!(r.value(FieldId::BillAmount), Some("1850.5"));
        assert!(!r.get(FieldId::Address).is_present());
        assert_eq!(r.get(FieldId::Discom).source(), Source::None);
        assert_eq!(r.len(), 11);
    }

    #[test]
    fn tolerates_a_json_code_fence() {
        let raw = format!("```json\n{}\n```", full_response(&[("discom", Value::from("KSEB"))]));
        let r = decode_response(&raw, &schema()).unwrap();
        assert_eq!(r.value(FieldId::Discom), Some("KSEB"));
    }

    #[test]
    fn ignores_extra_keys() {
        let raw = full_response(&[("tariff", Value::from("LT-1"))]);
        assert!(decode_response(&raw, &schema()).is_ok());
    }

    #[test]
    fn missing_key_is_malformed() {
        let raw = r#"{"consumer_name": "A"}"#;
        let err = decode_response(raw, &schema()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
        assert!(err.to_string().contains("consumer_number"));
    }

    #[test]
    fn non_json_is_malformed() {
        let err = decode_response("Sure! Here are the fields:", &schema()).unwrap_err();
        assert!(matches!(err, LlmError::MalformedResponse(_)));
    }

    #[test]
    fn non_object_is_malformed() {
        let err = decode_response("[1, 2, 3]", &schema()).unwrap_err();
        assert!(matches!(err, LlmError::MalformedResponse(_)));
    }

    #[test]
    fn nested_value_is_malformed() {
        let raw = full_response(&[("address", serde_json::json!({"line1": "x"}))]);
        assert!(decode_response(&raw, &schema()).is_err());
        let raw = full_response(&[("discom", Value::from(true))]);
        assert!(decode_response(&raw, &schema()).is_err());
    }

    #[tokio::test]
    async fn extract_uses_configured_model_and_json_mode() {
        let mock = Arc::new(MockLlm::new(full_response(&[("meter_number", Value::from("M123456"))])));
        let extractor = LlmExtractor::new(mock.clone(), &LlmConfig::default());

        let req = extractor.request("text", &schema());
        assert_eq!(req.model, "gpt-4o-mini");
        assert_eq!(req.temperature, 0.0);
        assert!(req.json_only);
        assert_eq!(req.system, SYSTEM_PROMPT);

        let r = extractor.extract("text", &schema()).await.unwrap();
        assert_eq!(r.value(FieldId::MeterNumber), Some("M123456"));
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn backend_failure_propagates_without_retry() {
        let llm = Arc::new(ScriptedLlm::new([Err(LlmError::BackendUnavailable("503".into()))]));
        let extractor = LlmExtractor::new(llm.clone(), &LlmConfig::default());
        let err = extractor.extract("text", &schema()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
        assert_eq!(llm.calls(), 1);
    }
}
