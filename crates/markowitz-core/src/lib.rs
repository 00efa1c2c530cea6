pub mod data;
pub mod error;
pub mod optimization;
pub mod settings;
pub mod types;

#[cfg(feature = "simulation")]
pub mod simulation;

pub use error::{ErrorKind, MarkowitzError};
pub use optimization::orchestrator::{optimize, optimize_with_settings, OptimizationOutput};
pub use settings::OptimizerSettings;
pub use types::*;

/// Standard result type for all optimizer operations
pub type MarkowitzResult<T> = Result<T, MarkowitzError>;
