//! Pipeline domain: stage models, result buckets, and the executor port.

pub mod result;
pub mod stage;

pub use result::{ResultBucket, StageResult};
pub use stage::{Stage, StageExecutor, StageOutput, StageSettings, StageStatus, StageType, TokenUsage};
