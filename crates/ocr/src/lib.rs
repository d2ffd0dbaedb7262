pub mod extract;
pub mod hash;
pub mod loader;
pub mod preprocess;
pub mod recognizer;
pub mod text;

pub use extract::{PatternError, RegexConfig, RegexExtractor};
pub use hash::short_digest;
pub use loader::{is_supported, DocumentKind, DocumentLoader, LoadError, LoaderConfig, SUPPORTED_EXTENSIONS};
pub use preprocess::{encode_png, PreprocessConfig, PreprocessError, Preprocessor};
pub use recognizer::{GoogleVisionRecognizer, MockRecognizer, OcrBackend, OcrError, VisionConfig};
pub use text::clean_ocr_text;

#[cfg(feature = "tesseract")]
pub use recognizer::tesseract_backend::TesseractRecognizer;
