pub mod accuracy;
pub mod ground_truth;
pub mod normalize;
pub mod tally;

pub use accuracy::{evaluate, AccuracyRecord, FieldAccuracy};
pub use ground_truth::{
    EvalError, GroundTruth, GroundTruthFile, GroundTruthSource, NoGroundTruth, SharedGroundTruth,
};
pub use normalize::{NormalizationPolicy, Normalizer};
pub use tally::{AccuracyTally, FieldHitRate};
