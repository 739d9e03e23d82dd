// 🚫 Compliance Errors - one error type for every engine decision
//
// NotFound         → no compliance record for the requested (ship, year)
// InvalidOperation → a banking or pooling rule rejected the request
// Storage / Config → collaborator failures (adapters only)

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ComplianceError {
    #[error("Compliance data not found for ship {ship_id} in {year}")]
    NotFound { ship_id: String, year: i32 },

    /// Business rule rejection. `details` lists every accumulated reason
    /// (pool validation), and is empty for single-rule rejections.
    #[error("{reason}")]
    InvalidOperation { reason: String, details: Vec<String> },

    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("No baseline route set")]
    NoBaseline,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type ComplianceResult<T> = Result<T, ComplianceError>;

impl ComplianceError {
    pub fn not_found(ship_id: &str, year: i32) -> Self {
        ComplianceError::NotFound {
            ship_id: ship_id.to_string(),
            year,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        ComplianceError::InvalidOperation {
            reason: reason.into(),
            details: Vec::new(),
        }
    }

    pub fn invalid_with_details(reason: impl Into<String>, details: Vec<String>) -> Self {
        ComplianceError::InvalidOperation {
            reason: reason.into(),
            details,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ComplianceError::NotFound { .. }
                | ComplianceError::RouteNotFound(_)
                | ComplianceError::NoBaseline
        )
    }

    pub fn is_invalid_operation(&self) -> bool {
        matches!(self, ComplianceError::InvalidOperation { .. })
    }

    /// Accumulated reasons for an InvalidOperation (empty otherwise)
    pub fn details(&self) -> &[String] {
        match self {
            ComplianceError::InvalidOperation { details, .. } => details,
            _ => &[],
        }
    }
}

impl From<rusqlite::Error> for ComplianceError {
    fn from(err: rusqlite::Error) -> Self {
        ComplianceError::Storage(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for ComplianceError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        ComplianceError::Storage(format!("lock poisoned: {}", err))
    }
}
