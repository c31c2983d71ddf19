//! # Production Order Lifecycle
//!
//! The order state machine, with the stock side effects each transition
//! implies. The database layer executes the effects; this module only
//! decides them.
//!
//! ```text
//!                 commit                 complete
//!   ┌─────────┐ ─────────► ┌────────────┐ ─────────► ┌───────────┐
//!   │ Pending │            │ InProgress │            │ Completed │
//!   └────┬────┘ ──────────────────────────────────►  └───────────┘
//!        │        complete (debit + credit in one step)
//!        │ cancel                 │ cancel (restore debits)
//!        ▼                        ▼
//!   ┌───────────────────────────────┐
//!   │           Cancelled           │
//!   └───────────────────────────────┘
//! ```
//!
//! `Completed` and `Cancelled` are terminal.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};

// =============================================================================
// Order Status
// =============================================================================

/// The status of a production order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created, stock untouched.
    #[default]
    Pending,
    /// Materials debited, production running.
    InProgress,
    /// Finished goods credited. Terminal.
    Completed,
    /// Abandoned, any debit reversed. Terminal.
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [
        OrderStatus::Pending,
        OrderStatus::InProgress,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    /// Stable machine name, matches the database column value.
    pub const fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Display label used by the shop-floor UI.
    pub const fn label(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Đang chờ",
            OrderStatus::InProgress => "Đang sản xuất",
            OrderStatus::Completed => "Hoàn thành",
            OrderStatus::Cancelled => "Đã hủy",
        }
    }

    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Pending or in progress: the order still depends on its BOM.
    #[inline]
    pub const fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether material stock is currently debited for this order.
    #[inline]
    pub const fn holds_materials(&self) -> bool {
        matches!(self, OrderStatus::InProgress)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::InProgress => "in progress",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Accepts machine names, a few aliases and the UI labels.
impl FromStr for OrderStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(status) = OrderStatus::ALL.iter().find(|st| st.label() == trimmed) {
            return Ok(*status);
        }

        match trimmed.to_lowercase().replace([' ', '-'], "_").as_str() {
            "pending" | "draft" => Ok(OrderStatus::Pending),
            "in_progress" | "inprogress" | "running" => Ok(OrderStatus::InProgress),
            "completed" | "done" => Ok(OrderStatus::Completed),
            "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
            _ => Err(ValidationError::InvalidFormat {
                field: "status".to_string(),
                reason: format!("unknown order status '{}'", s),
            }),
        }
    }
}

// =============================================================================
// Order Action
// =============================================================================

/// An operation requested on an existing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderAction {
    Commit,
    Complete,
    Cancel,
}

impl fmt::Display for OrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderAction::Commit => "commit",
            OrderAction::Complete => "complete",
            OrderAction::Cancel => "cancel",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Transition
// =============================================================================

/// The outcome of applying an action, with the stock effects to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: OrderStatus,
    pub to: OrderStatus,
    /// Debit every order line from material stock.
    pub debit_materials: bool,
    /// Credit every order line back to material stock.
    pub restore_materials: bool,
    /// Credit finished units to the product catalog.
    pub credit_product: bool,
}

/// Decides whether `action` is legal from `from` and what it must do.
///
/// ## Example
/// ```rust
/// use kiln_core::lifecycle::{transition, OrderAction, OrderStatus};
///
/// let t = transition("o-1", OrderStatus::InProgress, OrderAction::Cancel).unwrap();
/// assert_eq!(t.to, OrderStatus::Cancelled);
/// assert!(t.restore_materials);
///
/// assert!(transition("o-1", OrderStatus::Completed, OrderAction::Cancel).is_err());
/// ```
pub fn transition(order_id: &str, from: OrderStatus, action: OrderAction) -> CoreResult<Transition> {
    use OrderAction::*;
    use OrderStatus::*;

    let (to, debit, restore, credit) = match (from, action) {
        (Pending, Commit) => (InProgress, true, false, false),
        (Pending, Complete) => (Completed, true, false, true),
        (InProgress, Complete) => (Completed, false, false, true),
        (Pending, Cancel) => (Cancelled, false, false, false),
        (InProgress, Cancel) => (Cancelled, false, true, false),
        _ => {
            return Err(CoreError::InvalidStateTransition {
                order_id: order_id.to_string(),
                from,
                action,
            })
        }
    };

    Ok(Transition {
        from,
        to,
        debit_materials: debit,
        restore_materials: restore,
        credit_product: credit,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_pending() {
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
    }

    #[test]
    fn test_commit_then_complete() {
        let commit = transition("o", OrderStatus::Pending, OrderAction::Commit).unwrap();
        assert_eq!(commit.to, OrderStatus::InProgress);
        assert!(commit.debit_materials);
        assert!(!commit.credit_product);

        let complete = transition("o", commit.to, OrderAction::Complete).unwrap();
        assert_eq!(complete.to, OrderStatus::Completed);
        assert!(!complete.debit_materials);
        assert!(complete.credit_product);
    }

    #[test]
    fn test_complete_from_pending_debits_and_credits() {
        let t = transition("o", OrderStatus::Pending, OrderAction::Complete).unwrap();
        assert!(t.debit_materials);
        assert!(t.credit_product);
    }

    #[test]
    fn test_cancel_restores_only_when_committed() {
        let pending = transition("o", OrderStatus::Pending, OrderAction::Cancel).unwrap();
        assert!(!pending.restore_materials);

        let running = transition("o", OrderStatus::InProgress, OrderAction::Cancel).unwrap();
        assert!(running.restore_materials);
        assert!(!running.credit_product);
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        for from in [OrderStatus::Completed, OrderStatus::Cancelled] {
            for action in [OrderAction::Commit, OrderAction::Complete, OrderAction::Cancel] {
                let err = transition("o", from, action).unwrap_err();
                assert!(matches!(err, CoreError::InvalidStateTransition { .. }));
            }
        }
    }

    #[test]
    fn test_commit_twice_is_rejected() {
        assert!(transition("o", OrderStatus::InProgress, OrderAction::Commit).is_err());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("pending".parse::<OrderStatus>().unwrap(), OrderStatus::Pending);
        assert_eq!("in progress".parse::<OrderStatus>().unwrap(), OrderStatus::InProgress);
        assert_eq!("Hoàn thành".parse::<OrderStatus>().unwrap(), OrderStatus::Completed);
        assert_eq!("Đã hủy".parse::<OrderStatus>().unwrap(), OrderStatus::Cancelled);
        assert_eq!("canceled".parse::<OrderStatus>().unwrap(), OrderStatus::Cancelled);
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_status_serde_names() {
        let json = serde_json::to_string(&OrderStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        assert_eq!(OrderStatus::InProgress.as_str(), "in_progress");
    }
}
