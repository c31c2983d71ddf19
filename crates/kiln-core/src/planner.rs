//! # Consumption Planner
//!
//! Turns a BOM and a production quantity into a per-line consumption plan.
//!
//! ## How a Plan Is Built
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BOM "Oak Stool" × 3 units                                              │
//! │                                                                         │
//! │  line: oak 2 kg/unit ──► required 6 kg ──► stock 10 kg ──► sufficient  │
//! │  line: glue 0.1 l/unit ─► required 0.3 l ─► (missing) ───► NOT FOUND   │
//! │                                                                         │
//! │  all_sufficient = false                                                 │
//! │  materials_cost = 6 × oak.price + 0.3 × 0                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The planner never fails on stock. A missing material becomes a line with
//! zero stock and zero cost, so totals stay consistent and the caller decides
//! whether insufficiency is fatal. Only an invalid quantity is an error.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use ts_rs::TS;

use crate::error::{Shortage, ValidationError};
use crate::money::Money;
use crate::quantity::Quantity;
use crate::types::{Bom, BomLine, Material};
use crate::validation::validate_production_quantity;
use crate::MAX_MONEY_CENTS;

/// One BOM line evaluated against current stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PlanLine {
    pub material_id: String,
    pub material_name: Option<String>,
    /// `quantity_per_unit × quantity`.
    pub required: Quantity,
    /// Current stock, zero when the material is missing.
    pub available: Quantity,
    /// Whether stock covers everything this plan needs of the material.
    pub sufficient: bool,
    /// Purchase price, zero when the material is missing.
    pub unit_cost: Money,
    pub line_cost: Money,
    /// False when the material no longer exists.
    pub found: bool,
}

/// The planner's verdict for a whole BOM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ConsumptionPlan {
    pub bom_id: String,
    pub quantity: i64,
    pub lines: Vec<PlanLine>,
    pub all_sufficient: bool,
    pub materials_cost: Money,
}

impl ConsumptionPlan {
    /// Materials that cannot cover the plan, one entry per material.
    pub fn shortages(&self) -> Vec<Shortage> {
        let mut totals: Vec<Shortage> = Vec::new();
        for line in self.lines.iter().filter(|l| !l.sufficient) {
            match totals.iter_mut().find(|s| s.material_id == line.material_id) {
                Some(existing) => existing.required += line.required,
                None => totals.push(Shortage {
                    material_id: line.material_id.clone(),
                    material_name: line.material_name.clone(),
                    required: line.required,
                    available: line.available,
                }),
            }
        }
        totals
    }

    /// Lines whose material no longer exists in the catalog.
    pub fn missing_materials(&self) -> impl Iterator<Item = &PlanLine> {
        self.lines.iter().filter(|l| !l.found)
    }
}

/// Plans the consumption of `quantity` units of `bom` against `materials`.
///
/// `materials` may hold more than the BOM references; lookups are by id.
///
/// ## Example
/// ```rust
/// use chrono::Utc;
/// use kiln_core::{plan_consumption, Bom, BomLine, Material, Money, Quantity};
///
/// let now = Utc::now();
/// let steel = Material {
///     id: "m".into(), sku: "STEEL".into(), name: "Steel".into(), unit: "kg".into(),
///     purchase_price: Money::from_cents(500), stock: Quantity::from_units(10),
///     created_at: now, updated_at: now, version: 0,
/// };
/// let bom = Bom {
///     id: "b".into(), product_name: "Bracket".into(), product_sku: "BRK".into(),
///     notes: None, lines: vec![BomLine::new("m", Quantity::from_units(2))],
///     created_at: now, updated_at: now,
/// };
///
/// let plan = plan_consumption(&bom, 3, &[steel]).unwrap();
/// assert_eq!(plan.lines[0].required, Quantity::from_units(6));
/// assert!(plan.all_sufficient);
/// assert_eq!(plan.materials_cost.cents(), 3_000);
/// ```
pub fn plan_consumption(
    bom: &Bom,
    quantity: i64,
    materials: &[Material],
) -> Result<ConsumptionPlan, ValidationError> {
    validate_production_quantity(quantity)?;

    let by_id: HashMap<&str, &Material> = materials.iter().map(|m| (m.id.as_str(), m)).collect();

    // Cumulative requirement per material
    let mut totals: HashMap<&str, Quantity> = HashMap::new();
    for line in &bom.lines {
        *totals.entry(line.material_id.as_str()).or_default() += line.required_for(quantity);
    }

    let lines: Vec<PlanLine> = bom
        .lines
        .iter()
        .map(|line| {
            let required = line.required_for(quantity);
            let material = by_id.get(line.material_id.as_str());
            let cumulative = totals
                .get(line.material_id.as_str())
                .copied()
                .unwrap_or(required);

            match material {
                Some(m) => PlanLine {
                    material_id: line.material_id.clone(),
                    material_name: Some(m.name.clone()),
                    required,
                    available: m.stock,
                    sufficient: m.stock >= cumulative,
                    unit_cost: m.purchase_price,
                    line_cost: m.purchase_price.cost_of(required),
                    found: true,
                },
                None => PlanLine {
                    material_id: line.material_id.clone(),
                    material_name: None,
                    required,
                    available: Quantity::zero(),
                    sufficient: false,
                    unit_cost: Money::zero(),
                    line_cost: Money::zero(),
                    found: false,
                },
            }
        })
        .collect();

    let all_sufficient = lines.iter().all(|l| l.sufficient);
    let materials_cost = materials_cost(&bom.lines, quantity, &by_id)?;

    Ok(ConsumptionPlan {
        bom_id: bom.id.clone(),
        quantity,
        lines,
        all_sufficient,
        materials_cost,
    })
}

/// Σ line costs, rejected once it leaves the accepted money range.
///
/// Line costs are recomputed with checked arithmetic so a huge price times a
/// huge requirement cannot wrap.
fn materials_cost(
    lines: &[BomLine],
    quantity: i64,
    by_id: &HashMap<&str, &Material>,
) -> Result<Money, ValidationError> {
    let out_of_range = || ValidationError::OutOfRange {
        field: "materials_cost".to_string(),
        min: 0,
        max: MAX_MONEY_CENTS,
    };

    let mut total = Money::zero();
    for line in lines {
        let Some(m) = by_id.get(line.material_id.as_str()) else {
            continue;
        };
        let cost = m
            .purchase_price
            .checked_cost_of(line.required_for(quantity))
            .ok_or_else(out_of_range)?;
        total = total.checked_add(cost).ok_or_else(out_of_range)?;
    }

    if total.cents() > MAX_MONEY_CENTS {
        return Err(out_of_range());
    }
    Ok(total)
}

// =============================================================================
// Unit Tests
// =============================================================================
