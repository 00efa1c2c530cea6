use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarkowitzError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Data format error: {0}")]
    DataFormat(String),

    #[error("Statistics error: {0}")]
    Statistics(String),

    #[error(
        "Ill-conditioned covariance: smallest eigenvalue {min_eigenvalue:e} is not above {floor:e}; \
         assets may be collinear"
    )]
    IllConditionedCovariance { min_eigenvalue: f64, floor: f64 },

    #[error("Infeasible {objective} problem: {reason}")]
    Infeasible { objective: String, reason: String },

    #[error("Solver numerical failure in {context}: {reason}")]
    SolverNumerical { context: String, reason: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Coarse classification used by callers to map failures onto their own
/// status codes or messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    InsufficientData,
    DataFormat,
    Statistics,
    IllConditionedCovariance,
    Infeasible,
    SolverNumerical,
    Serialization,
}

impl MarkowitzError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MarkowitzError::InvalidInput { .. } => ErrorKind::InvalidInput,
            MarkowitzError::InsufficientData(_) => ErrorKind::InsufficientData,
            MarkowitzError::DataFormat(_) => ErrorKind::DataFormat,
            MarkowitzError::Statistics(_) => ErrorKind::Statistics,
            MarkowitzError::IllConditionedCovariance { .. } => {
                ErrorKind::IllConditionedCovariance
            }
            MarkowitzError::Infeasible { .. } => ErrorKind::Infeasible,
            MarkowitzError::SolverNumerical { .. } => ErrorKind::SolverNumerical,
            MarkowitzError::SerializationError(_) => ErrorKind::Serialization,
        }
    }

    pub(crate) fn infeasible(objective: &str, reason: impl Into<String>) -> Self {
        MarkowitzError::Infeasible {
            objective: objective.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn numerical(context: &str, reason: impl Into<String>) -> Self {
        MarkowitzError::SolverNumerical {
            context: context.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for MarkowitzError {
    fn from(e: serde_json::Error) -> Self {
        MarkowitzError::SerializationError(e.to_string())
    }
}
