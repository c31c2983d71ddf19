//! # kiln-core: Pure Production Logic for Kiln
//!
//! This crate is the **heart** of the production order engine. It contains the
//! planning, costing and lifecycle rules as pure functions with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Kiln Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                UI / reporting layers (out of tree)              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │          kiln-engine (transactions, retry, notifications)       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ kiln-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌──────────────┐   │   │
//! │  │   │ planner  │  │ costing  │  │lifecycle │  │ restitution  │   │   │
//! │  │   │ required │  │ estimate │  │ Pending  │  │ first-match  │   │   │
//! │  │   │ vs stock │  │ variance │  │ → Done   │  │ BOM recipe   │   │   │
//! │  │   └──────────┘  └──────────┘  └──────────┘  └──────────────┘   │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    kiln-db (Database Layer)                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Material, Bom, ProductionOrder, Product)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`quantity`] - Fixed-point material quantities (thousandths of a unit)
//! - [`planner`] - Consumption Planner (required vs. available stock)
//! - [`costing`] - Cost estimates and variance analysis
//! - [`lifecycle`] - Production order state machine
//! - [`restitution`] - Finished-goods removal and material restitution rules
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//!
//! ## Example Usage
//!
//! ```rust
//! use kiln_core::{Money, Quantity};
//!
//! // 2.5 kg of resin at $4.00/kg
//! let required = Quantity::from_milli(2_500);
//! let cost = Money::from_cents(400).cost_of(required);
//! assert_eq!(cost.cents(), 1000);
//! ```

pub mod costing;
pub mod error;
pub mod lifecycle;
pub mod money;
pub mod planner;
pub mod quantity;
pub mod restitution;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use costing::{ActualCost, BudgetVerdict, CostAnalysis, CostEstimate};
pub use error::{CoreError, CoreResult, Shortage, ValidationError};
pub use lifecycle::{OrderAction, OrderStatus};
pub use money::Money;
pub use planner::{plan_consumption, ConsumptionPlan, PlanLine};
pub use quantity::Quantity;
pub use restitution::{RestitutionLine, RestitutionReport};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum units a single production order may request.
///
/// ## Business Reason
/// Guards against typing 10000 instead of 100 on the order form.
pub const MAX_PRODUCTION_QUANTITY: i64 = 100_000;

/// Largest monetary amount accepted anywhere, in cents ($1 trillion).
///
/// Two amounts at this bound still sum without overflowing `i64`.
pub const MAX_MONEY_CENTS: i64 = 100_000_000_000_000;

/// Maximum lines in a single Bill of Materials.
pub const MAX_BOM_LINES: usize = 200;

/// Cost overrun above this many basis points is flagged as over budget (+10%).
pub const OVER_BUDGET_THRESHOLD_BPS: i64 = 1_000;

/// Cost underrun below this many basis points is flagged as under budget (-5%).
pub const UNDER_BUDGET_THRESHOLD_BPS: i64 = -500;
