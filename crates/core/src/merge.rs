use crate::result::{ExtractionResult, FieldValue, Source};
use crate::schema::FieldSchema;

/// Combine regex and LLM results field by field.
///
/// A present regex value always wins; otherwise a present LLM value is used;
/// otherwise the field stays absent. Inputs are left untouched.
pub fn merge(regex: &ExtractionResult, llm: &ExtractionResult, schema: &FieldSchema) -> ExtractionResult {
    ExtractionResult::from_fn(schema, |id| {
        if let Some(v) = regex.value(id) {
            FieldValue::found(v, Source::Regex)
        } else if let Some(v) = llm.value(id) {
            FieldValue::found(v, Source::Llm)
        } else {
            FieldValue::absent()
        }
    })
}
