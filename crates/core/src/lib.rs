pub mod error;
pub mod merge;
pub mod result;
pub mod schema;

pub use error::{ErrorClass, ErrorKind, Failure, Stage};
pub use merge::merge;
pub use result::{ExtractionResult, FieldLookup, FieldValue, Source};
pub use schema::{FieldId, FieldSchema, FieldSpec};
