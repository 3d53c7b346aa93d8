//! Eye-tracking gaze simulation for divergence point analysis.
//!
//! Times are milliseconds. A run owns its random stream, item cache,
//! diagnostics and fixation log; nothing here is global.

pub mod correction;
pub mod curve;
pub mod dataset;
pub mod effects;
pub mod fixation;
pub mod generator;
pub mod sigmoid;
pub mod stats;

pub use correction::{CorrectionError, correct, estimate_divergence_point, t_statistics};
pub use dataset::{Dataset, LookObject, Row};
pub use generator::{CorrectionOutcome, Generator, GeneratorOutput, generate};
