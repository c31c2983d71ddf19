//! # Error Types
//!
//! Domain-specific error types for kiln-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  kiln-core errors (this file)                                          │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  kiln-db errors (separate crate)                                       │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  kiln-engine errors                                                    │
//! │  └── EngineError      - What callers see (with a stable ErrorCode)     │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError ← DbError             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant is rejected before any state change, so a caller that sees
//! an error can assume the store is exactly as it was before the call.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::lifecycle::{OrderAction, OrderStatus};
use crate::quantity::Quantity;

// =============================================================================
// Shortage
// =============================================================================

/// One material that cannot cover its requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Shortage {
    pub material_id: String,
    /// `None` when the material no longer exists in the catalog.
    pub material_name: Option<String>,
    pub required: Quantity,
    pub available: Quantity,
}

impl Shortage {
    /// How much more stock would be needed.
    pub fn missing(&self) -> Quantity {
        self.required - self.available
    }
}

fn describe_shortages(shortages: &[Shortage]) -> String {
    shortages
        .iter()
        .map(|s| {
            format!(
                "{} (required {}, available {})",
                s.material_name.as_deref().unwrap_or(&s.material_id),
                s.required,
                s.available
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

// =============================================================================
// Core Error
// =============================================================================

/// Production engine business errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Input failed validation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Material stock cannot cover the order.
    ///
    /// ## User Workflow
    /// ```text
    /// Commit order (3 units, 2 kg steel each)
    ///      │
    ///      ▼
    /// Check stock: steel available = 4 kg, required = 6 kg
    ///      │
    ///      ▼
    /// InsufficientStock { shortages: [steel 6 > 4] }  (nothing debited)
    /// ```
    #[error("Insufficient stock: {}", describe_shortages(.shortages))]
    InsufficientStock { shortages: Vec<Shortage> },

    /// Finished-goods stock cannot cover a removal.
    #[error("Insufficient product stock for {sku}: available {available}, requested {requested}")]
    InsufficientProductStock {
        sku: String,
        available: i64,
        requested: i64,
    },

    /// The order's current status does not allow the action.
    #[error("Order {order_id} is {from}, cannot {action}")]
    InvalidStateTransition {
        order_id: String,
        from: OrderStatus,
        action: OrderAction,
    },

    /// A deletion was attempted while non-terminal orders still depend on it.
    #[error("{entity} {id} is referenced by active orders: {}", .order_ids.join(", "))]
    ReferencedByActiveOrder {
        entity: String,
        id: String,
        order_ids: Vec<String>,
    },

    /// BOM lines cannot change once an order has used the recipe.
    #[error("BOM {bom_id} lines are locked by orders: {}", .order_ids.join(", "))]
    BomLocked {
        bom_id: String,
        order_ids: Vec<String>,
    },

    /// Cost analysis can only be attached once.
    #[error("Order {order_id} already has a cost analysis")]
    CostAnalysisExists { order_id: String },

    /// Referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Used for early validation before any business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid UUID, malformed quantity).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// A list that needs at least one entry is empty.
    #[error("{field} must contain at least one entry")]
    Empty { field: String },

    /// Duplicate value (e.g., the same material twice in one BOM).
    #[error("{field} '{value}' appears more than once")]
    Duplicate { field: String, value: String },
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
