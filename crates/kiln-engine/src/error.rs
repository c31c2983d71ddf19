//! # Engine Error Type
//!
//! Unified error type for engine operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Error Flow in Kiln                                │
//! │                                                                         │
//! │  engine.commit_order(id)                                                │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Operation (one transaction)                                     │  │
//! │  │         │                                                        │  │
//! │  │         ▼                                                        │  │
//! │  │  Store busy / stale version? ── DbError::Conflict ── retried ──┐ │  │
//! │  │         │                                                      │ │  │
//! │  │         ▼                                                      │ │  │
//! │  │  Business rule? ── CoreError::InsufficientStock ── EngineError ┼►│  │
//! │  │         │                                                      │ │  │
//! │  │         ▼                                                      │ │  │
//! │  │  Success ──────────────────────────────────────────────────────┘ │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  Callers match on `code()` or serialize an `ErrorResponse`:            │
//! │    { "code": "INSUFFICIENT_STOCK", "message": "Insufficient ..." }      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use thiserror::Error;

use kiln_core::{CoreError, ValidationError};
use kiln_db::DbError;

/// Errors returned by [`crate::ProductionEngine`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// A business rule rejected the operation.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The store failed or refused the write.
    #[error(transparent)]
    Db(#[from] DbError),

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Core(CoreError::Validation(err))
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Db(DbError::from(err))
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl EngineError {
    /// Machine-readable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Core(err) => match err {
                CoreError::Validation(_) => ErrorCode::ValidationError,
                CoreError::InsufficientStock { .. } | CoreError::InsufficientProductStock { .. } => {
                    ErrorCode::InsufficientStock
                }
                CoreError::InvalidStateTransition { .. } | CoreError::CostAnalysisExists { .. } => {
                    ErrorCode::InvalidStateTransition
                }
                CoreError::ReferencedByActiveOrder { .. } => ErrorCode::ReferencedByActiveOrder,
                CoreError::BomLocked { .. } => ErrorCode::BomLocked,
                CoreError::NotFound { .. } => ErrorCode::NotFound,
            },
            EngineError::Db(err) => match err {
                DbError::NotFound { .. } => ErrorCode::NotFound,
                DbError::UniqueViolation { .. } => ErrorCode::ValidationError,
                DbError::Conflict(_) | DbError::PoolExhausted => ErrorCode::Conflict,
                _ => ErrorCode::DatabaseError,
            },
            EngineError::Config(_) => ErrorCode::ConfigError,
        }
    }

    /// Whether running the same operation again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Db(err) if err.is_conflict())
    }
}

/// Convenience type alias for engine results.
pub type EngineResult<T> = Result<T, EngineError>;

// =============================================================================
// Serializable form
// =============================================================================

/// Error codes for callers.
///
/// ## Usage in a Frontend
/// ```typescript
/// switch (e.code) {
///   case 'INSUFFICIENT_STOCK':
///     showShortages(e.message);
///     break;
///   case 'CONFLICT':
///     retryLater();
///     break;
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Input validation failed
    ValidationError,

    /// Material or product stock cannot cover the request
    InsufficientStock,

    /// The order's status does not allow the action
    InvalidStateTransition,

    /// Pending or in-progress orders still depend on the entity
    ReferencedByActiveOrder,

    /// BOM lines are frozen by existing orders
    BomLocked,

    /// Resource not found
    NotFound,

    /// Concurrent write; safe to retry
    Conflict,

    /// Database operation failed
    DatabaseError,

    /// Configuration error
    ConfigError,
}

/// What a caller receives when an operation fails.
///
/// ```json
/// {
///   "code": "BOM_LOCKED",
///   "message": "BOM 1f0c... lines are locked by orders: 9a2e..."
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&EngineError> for ErrorResponse {
    fn from(err: &EngineError) -> Self {
        let message = match err {
            // Don't leak SQL text to callers
            EngineError::Db(DbError::QueryFailed(e)) | EngineError::Db(DbError::Internal(e)) => {
                tracing::error!("Database operation failed: {}", e);
                "Database operation failed".to_string()
            }
            other => other.to_string(),
        };

        ErrorResponse {
            code: err.code(),
            message,
        }
    }
}

impl From<EngineError> for ErrorResponse {
    fn from(err: EngineError) -> Self {
        ErrorResponse::from(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::{OrderAction, OrderStatus, Quantity, Shortage};

    #[test]
    fn test_codes() {
        let err: EngineError = CoreError::InsufficientStock {
            shortages: vec![Shortage {
                material_id: "m".into(),
                material_name: Some("Oak".into()),
                required: Quantity::from_units(6),
                available: Quantity::from_units(4),
            }],
        }
        .into();
        assert_eq!(err.code(), ErrorCode::InsufficientStock);
        assert!(!err.is_retryable());

        let err: EngineError = CoreError::InvalidStateTransition {
            order_id: "o".into(),
            from: OrderStatus::Completed,
            action: OrderAction::Cancel,
        }
        .into();
        assert_eq!(err.code(), ErrorCode::InvalidStateTransition);

        let err: EngineError = ValidationError::MustBePositive {
            field: "quantity".into(),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[test]
    fn test_conflicts_are_retryable() {
        let err: EngineError = DbError::stale("ProductionOrder", "o").into();
        assert_eq!(err.code(), ErrorCode::Conflict);
        assert!(err.is_retryable());

        let err: EngineError = DbError::not_found("Material", "m").into();
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_response_serialization() {
        let err: EngineError = CoreError::BomLocked {
            bom_id: "b".into(),
            order_ids: vec!["o1".into(), "o2".into()],
        }
        .into();
        let json = serde_json::to_value(ErrorResponse::from(&err)).unwrap();
        assert_eq!(json["code"], "BOM_LOCKED");
        assert_eq!(json["message"], "BOM b lines are locked by orders: o1, o2");
    }

    #[test]
    fn test_query_text_hidden() {
        let err: EngineError = DbError::QueryFailed("near \"SELCT\": syntax error".into()).into();
        let response = ErrorResponse::from(err);
        assert_eq!(response.code, ErrorCode::DatabaseError);
        assert_eq!(response.message, "Database operation failed");
    }
}
