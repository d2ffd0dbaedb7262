pub mod client;
pub mod extractor;

pub use client::{LlmBackend, LlmConfig, LlmError, LlmRequest, MockLlm, OpenAiClient, ScriptedLlm};
pub use extractor::{build_prompt, decode_response, LlmExtractor, SYSTEM_PROMPT};
