//! # Cost Analysis
//!
//! Estimated cost at order creation, variance against actual cost at
//! completion.
//!
//! ## Sign Convention
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  variance = actual − estimated                                          │
//! │                                                                         │
//! │   variance > 0  ──► spent MORE than planned  (over budget, red)         │
//! │   variance < 0  ──► spent LESS than planned  (under budget, green)      │
//! │                                                                         │
//! │   variance_bps   > +1000 (+10%) ──► OverBudget                          │
//! │   variance_bps   <  −500  (−5%) ──► UnderBudget                         │
//! │   otherwise                     ──► OnBudget                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`analyze`] is a pure function: the same estimate and actuals always
//! produce the same analysis, apart from the timestamp passed in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::AdditionalCost;
use crate::{OVER_BUDGET_THRESHOLD_BPS, UNDER_BUDGET_THRESHOLD_BPS};

// =============================================================================
// Estimate
// =============================================================================

/// The cost an order was planned with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CostEstimate {
    pub materials_cost: Money,
    /// Σ declared additional costs.
    pub additional_costs: Money,
    pub total_cost: Money,
}

impl CostEstimate {
    pub fn new(materials_cost: Money, additional: &[AdditionalCost]) -> Self {
        let additional_costs: Money = additional.iter().map(|c| c.amount).sum();
        CostEstimate {
            materials_cost,
            additional_costs,
            total_cost: materials_cost + additional_costs,
        }
    }
}

// =============================================================================
// Actual Cost
// =============================================================================

/// Actual spend reported for a finished order.
///
/// Accounting either knows only the total, or can split it into material
/// spend and additional spend. Only the itemized form yields the material
/// and additional-cost variances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActualCost {
    Total { amount: Money },
    Itemized { materials: Money, additional: Money },
}

impl ActualCost {
    pub fn total(amount: Money) -> Self {
        ActualCost::Total { amount }
    }

    pub fn itemized(materials: Money, additional: Money) -> Self {
        ActualCost::Itemized {
            materials,
            additional,
        }
    }

    pub fn amount(&self) -> Money {
        match self {
            ActualCost::Total { amount } => *amount,
            ActualCost::Itemized {
                materials,
                additional,
            } => *materials + *additional,
        }
    }

    pub fn materials(&self) -> Option<Money> {
        match self {
            ActualCost::Itemized { materials, .. } => Some(*materials),
            ActualCost::Total { .. } => None,
        }
    }

    pub fn additional(&self) -> Option<Money> {
        match self {
            ActualCost::Itemized { additional, .. } => Some(*additional),
            ActualCost::Total { .. } => None,
        }
    }
}

// =============================================================================
// Analysis
// =============================================================================

/// Budget classification of a variance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum BudgetVerdict {
    OverBudget,
    UnderBudget,
    OnBudget,
}

/// Variance breakdown attached to a completed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CostAnalysis {
    pub actual_cost: Money,
    /// `actual_cost − total_cost`, positive when over budget.
    pub variance: Money,
    /// Variance relative to `total_cost` in basis points, 0 when the
    /// estimate is zero.
    pub variance_bps: i64,
    pub material_variance: Money,
    pub additional_costs_variance: Money,
    pub actual_materials_cost: Option<Money>,
    pub actual_additional_costs: Option<Money>,
    #[ts(as = "String")]
    pub analyzed_at: DateTime<Utc>,
}

impl CostAnalysis {
    /// Variance as a percentage, for display.
    pub fn variance_percentage(&self) -> f64 {
        self.variance_bps as f64 / 100.0
    }

    pub fn verdict(&self) -> BudgetVerdict {
        if self.variance_bps > OVER_BUDGET_THRESHOLD_BPS {
            BudgetVerdict::OverBudget
        } else if self.variance_bps < UNDER_BUDGET_THRESHOLD_BPS {
            BudgetVerdict::UnderBudget
        } else {
            BudgetVerdict::OnBudget
        }
    }
}

/// Compares actual spend against an estimate.
///
/// ## Example
/// ```rust
/// use chrono::Utc;
/// use kiln_core::costing::{analyze, ActualCost, BudgetVerdict, CostEstimate};
/// use kiln_core::Money;
///
/// let estimate = CostEstimate::new(Money::from_cents(10_000), &[]);
/// let analysis = analyze(&estimate, &ActualCost::total(Money::from_cents(15_000)), Utc::now());
///
/// assert_eq!(analysis.variance.cents(), 5_000);
/// assert_eq!(analysis.variance_percentage(), 50.0);
/// assert_eq!(analysis.verdict(), BudgetVerdict::OverBudget);
/// ```
pub fn analyze(estimate: &CostEstimate, actual: &ActualCost, analyzed_at: DateTime<Utc>) -> CostAnalysis {
    let actual_cost = actual.amount();
    let variance = actual_cost - estimate.total_cost;

    let material_variance = actual
        .materials()
        .map(|m| m - estimate.materials_cost)
        .unwrap_or_default();
    let additional_costs_variance = actual
        .additional()
        .map(|a| a - estimate.additional_costs)
        .unwrap_or_default();

    CostAnalysis {
        actual_cost,
        variance,
        variance_bps: variance.bps_of(estimate.total_cost),
        material_variance,
        additional_costs_variance,
        actual_materials_cost: actual.materials(),
        actual_additional_costs: actual.additional(),
        analyzed_at,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
