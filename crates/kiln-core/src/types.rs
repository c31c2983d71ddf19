//! # Domain Types
//!
//! Core domain types used throughout Kiln.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────────┐   │
//! │  │    Material     │◄──│    BomLine      │   │      Product        │   │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────────  │   │
//! │  │  id (UUID)      │   │  material_id    │   │  id (UUID)          │   │
//! │  │  sku            │   │  qty_per_unit   │   │  sku / name ◄─┐     │   │
//! │  │  purchase_price │   └────────▲────────┘   │  stock        │     │   │
//! │  │  stock          │            │ owns       │  cost_price   │     │   │
//! │  └─────────────────┘   ┌────────┴────────┐   └───────────────┼─────┘   │
//! │                        │      Bom        │ product_sku/name ─┘         │
//! │                        │  product_name   │   (soft reference)          │
//! │                        │  product_sku    │                             │
//! │                        └────────▲────────┘                             │
//! │                                 │ bom_id (soft reference)              │
//! │                        ┌────────┴────────┐                             │
//! │                        │ ProductionOrder │── lines: OrderLine snapshot │
//! │                        │  status         │── additional_costs          │
//! │                        │  total_cost     │── cost_analysis?            │
//! │                        └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! A production order copies each line's required quantity and unit cost at
//! creation. Commit and cancel operate on the snapshot, so a cancellation
//! restores exactly what the commit debited.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::costing::{CostAnalysis, CostEstimate};
use crate::lifecycle::OrderStatus;
use crate::money::Money;
use crate::planner::ConsumptionPlan;
use crate::quantity::Quantity;

// =============================================================================
// Material
// =============================================================================

/// A purchasable raw material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Material {
    pub id: String,
    pub sku: String,
    pub name: String,
    /// Unit of measure ("kg", "m", "pcs").
    pub unit: String,
    /// Cost of one unit of measure.
    pub purchase_price: Money,
    /// On-hand quantity, never negative.
    pub stock: Quantity,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    /// Incremented on every write, for optimistic checks.
    pub version: i64,
}

/// Input for adding a material to the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewMaterial {
    pub sku: String,
    pub name: String,
    pub unit: String,
    pub purchase_price: Money,
    #[serde(default)]
    pub stock: Quantity,
}

// =============================================================================
// Bill of Materials
// =============================================================================

/// One recipe line: how much of a material one finished unit consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BomLine {
    pub material_id: String,
    pub quantity_per_unit: Quantity,
}

impl BomLine {
    pub fn new(material_id: impl Into<String>, quantity_per_unit: Quantity) -> Self {
        BomLine {
            material_id: material_id.into(),
            quantity_per_unit,
        }
    }

    /// Quantity consumed by `units` finished units.
    #[inline]
    pub fn required_for(&self, units: i64) -> Quantity {
        self.quantity_per_unit.times(units)
    }
}

/// A Bill of Materials: the recipe for one finished product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Bom {
    pub id: String,
    pub product_name: String,
    pub product_sku: String,
    pub notes: Option<String>,
    /// Ordered recipe lines (at least one).
    pub lines: Vec<BomLine>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Bom {
    /// The soft key used to find the finished product for this recipe.
    pub fn product_key(&self) -> ProductKey {
        ProductKey::new(&self.product_sku, &self.product_name)
    }
}

/// Input for creating a BOM.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewBom {
    pub product_name: String,
    pub product_sku: String,
    pub notes: Option<String>,
    pub lines: Vec<BomLine>,
}

/// Cosmetic BOM fields that stay editable while orders reference the BOM.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BomDetails {
    pub product_name: Option<String>,
    /// `Some(None)` clears the notes.
    pub notes: Option<Option<String>>,
}

// =============================================================================
// Production Order
// =============================================================================

/// An extra cost declared on an order (labour, energy, packaging).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AdditionalCost {
    pub description: String,
    pub amount: Money,
}

impl AdditionalCost {
    pub fn new(description: impl Into<String>, amount: Money) -> Self {
        AdditionalCost {
            description: description.into(),
            amount,
        }
    }
}

/// Frozen consumption line of a production order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderLine {
    pub material_id: String,
    /// Material name at creation time, `None` if it was already missing.
    pub material_name: Option<String>,
    /// Total quantity for the whole order.
    pub required: Quantity,
    /// Purchase price at creation time.
    pub unit_cost: Money,
}

impl OrderLine {
    #[inline]
    pub fn line_cost(&self) -> Money {
        self.unit_cost.cost_of(self.required)
    }
}

/// A request to produce N units of a BOM's product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductionOrder {
    pub id: String,
    pub bom_id: String,
    /// Product name at creation time.
    pub product_name: String,
    /// Product SKU at creation time.
    pub product_sku: String,
    pub quantity_produced: i64,
    pub status: OrderStatus,
    pub lines: Vec<OrderLine>,
    /// Estimated material cost at creation.
    pub materials_cost: Money,
    pub additional_costs: Vec<AdditionalCost>,
    /// `materials_cost + Σ additional_costs`.
    pub total_cost: Money,
    /// Sufficiency verdict at creation time.
    pub executable: bool,
    pub notes: Option<String>,
    /// Product credited on completion.
    pub product_id: Option<String>,
    pub cost_analysis: Option<CostAnalysis>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub committed_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub cancelled_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl ProductionOrder {
    /// Builds a pending order from a consumption plan.
    ///
    /// Costs come from the plan, so the estimate is whatever the planner
    /// saw at creation time; later price changes do not move it.
    pub fn pending(
        id: String,
        bom: &Bom,
        plan: &ConsumptionPlan,
        additional_costs: Vec<AdditionalCost>,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let estimate = CostEstimate::new(plan.materials_cost, &additional_costs);
        let lines = plan
            .lines
            .iter()
            .map(|l| OrderLine {
                material_id: l.material_id.clone(),
                material_name: l.material_name.clone(),
                required: l.required,
                unit_cost: l.unit_cost,
            })
            .collect();

        ProductionOrder {
            id,
            bom_id: bom.id.clone(),
            product_name: bom.product_name.clone(),
            product_sku: bom.product_sku.clone(),
            quantity_produced: plan.quantity,
            status: OrderStatus::Pending,
            lines,
            materials_cost: estimate.materials_cost,
            additional_costs,
            total_cost: estimate.total_cost,
            executable: plan.all_sufficient,
            notes,
            product_id: None,
            cost_analysis: None,
            created_at: now,
            updated_at: now,
            committed_at: None,
            completed_at: None,
            cancelled_at: None,
            version: 0,
        }
    }

    /// The estimate this order was created with.
    pub fn estimate(&self) -> CostEstimate {
        CostEstimate {
            materials_cost: self.materials_cost,
            additional_costs: self.additional_total(),
            total_cost: self.total_cost,
        }
    }

    pub fn additional_total(&self) -> Money {
        self.additional_costs.iter().map(|c| c.amount).sum()
    }

    /// Realised material cost of one finished unit.
    pub fn unit_material_cost(&self) -> Money {
        self.materials_cost.per_unit(self.quantity_produced)
    }

    pub fn product_key(&self) -> ProductKey {
        ProductKey::new(&self.product_sku, &self.product_name)
    }
}

/// Input for creating a production order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewProductionOrder {
    pub bom_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub additional_costs: Vec<AdditionalCost>,
    pub notes: Option<String>,
}

// =============================================================================
// Product
// =============================================================================

/// A finished good held in stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub sku: String,
    pub name: String,
    /// Finished units on hand, never negative.
    pub stock: i64,
    /// Material cost per unit from the latest production run.
    pub cost_price: Money,
    pub retail_price: Money,
    pub wholesale_price: Money,
    /// Soft delete flag.
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl Product {
    pub fn key(&self) -> ProductKey {
        ProductKey::new(&self.sku, &self.name)
    }
}

/// Input for creating a product directly (outside production).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub cost_price: Money,
    #[serde(default)]
    pub retail_price: Money,
    #[serde(default)]
    pub wholesale_price: Money,
}

// =============================================================================
// Product Key
// =============================================================================

/// Soft reference between a BOM and a finished product.
///
/// ## Matching Rule
/// There is no foreign key between BOMs and products. Two sides match when
/// their SKUs are equal (ignoring case and surrounding whitespace), or, if
/// either SKU is blank, when their names are equal the same way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductKey {
    pub sku: String,
    pub name: String,
}

impl ProductKey {
    pub fn new(sku: &str, name: &str) -> Self {
        ProductKey {
            sku: sku.trim().to_string(),
            name: name.trim().to_string(),
        }
    }

    /// Applies the matching rule described on the type.
    pub fn matches(&self, other: &ProductKey) -> bool {
        if !self.sku.is_empty() && !other.sku.is_empty() {
            return self.sku.eq_ignore_ascii_case(&other.sku);
        }
        !self.name.is_empty() && self.name.to_lowercase() == other.name.to_lowercase()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_key_matches_by_sku_first() {
        let bom_key = ProductKey::new("CHAIR-01", "Oak Chair");
        assert!(bom_key.matches(&ProductKey::new("chair-01", "Renamed Chair")));
        assert!(!bom_key.matches(&ProductKey::new("CHAIR-02", "Oak Chair")));
    }

    #[test]
    fn test_product_key_falls_back_to_name() {
        let bom_key = ProductKey::new("", "Oak Chair");
        assert!(bom_key.matches(&ProductKey::new("CHAIR-01", " oak chair ")));
        assert!(!ProductKey::new("", "").matches(&ProductKey::new("", "")));
    }

    #[test]
    fn test_bom_line_required() {
        let line = BomLine::new("m", Quantity::from_milli(1_500));
        assert_eq!(line.required_for(4), Quantity::from_units(6));
    }
}
