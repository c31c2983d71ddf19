//! # Production Order Operations
//!
//! Create, commit, complete and cancel orders.
//!
//! ## Stock Effects
//! ```text
//! ┌──────────────┬────────────┬────────────┬──────────────────────────────┐
//! │ From         │ Action     │ To         │ Stock effect                 │
//! ├──────────────┼────────────┼────────────┼──────────────────────────────┤
//! │ Pending      │ Commit     │ InProgress │ debit every line             │
//! │ Pending      │ Complete   │ Completed  │ debit every line + credit    │
//! │ InProgress   │ Complete   │ Completed  │ credit finished product      │
//! │ Pending      │ Cancel     │ Cancelled  │ none                         │
//! │ InProgress   │ Cancel     │ Cancelled  │ restore every line           │
//! └──────────────┴────────────┴────────────┴──────────────────────────────┘
//! ```
//!
//! Debits are all-or-nothing: every line is attempted so the error lists
//! every shortage, then the transaction is dropped if any line missed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{info, warn};

use crate::engine::ProductionEngine;
use crate::error::EngineResult;
use crate::notify::EngineEvent;
use kiln_core::costing::analyze;
use kiln_core::lifecycle::{transition, Transition};
use kiln_core::validation::{
    validate_actual_cost, validate_additional_costs, validate_notes, validate_production_quantity,
};
use kiln_core::{
    plan_consumption, ActualCost, ConsumptionPlan, CoreError, NewProductionOrder, OrderAction,
    OrderStatus, Product, ProductionOrder, Shortage,
};
use kiln_db::repository::production_order::generate_order_id;
use kiln_db::repository::product::generate_product_id;
use kiln_db::repository::{bom, material, product, production_order};
use kiln_db::OrderFilter;

/// A freshly created order and the plan it was built from.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedOrder {
    pub order: ProductionOrder,
    pub plan: ConsumptionPlan,
}

impl ProductionEngine {
    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get_order(&self, order_id: &str) -> EngineResult<ProductionOrder> {
        self.db
            .orders()
            .get_by_id(order_id)
            .await?
            .ok_or_else(|| CoreError::not_found("ProductionOrder", order_id).into())
    }

    /// Lists orders, newest first.
    pub async fn list_orders(&self, filter: &OrderFilter) -> EngineResult<Vec<ProductionOrder>> {
        Ok(self.db.orders().list(filter).await?)
    }

    /// Runs the planner against current stock without persisting anything.
    pub async fn preview_plan(&self, bom_id: &str, quantity: i64) -> EngineResult<ConsumptionPlan> {
        validate_production_quantity(quantity)?;

        let mut conn = self.db.pool().acquire().await?;
        let bom = bom::fetch(&mut conn, bom_id)
            .await?
            .ok_or_else(|| CoreError::not_found("BOM", bom_id))?;
        let ids: Vec<String> = bom.lines.iter().map(|l| l.material_id.clone()).collect();
        let materials = material::fetch_many(&mut conn, &ids).await?;

        Ok(plan_consumption(&bom, quantity, &materials)?)
    }

    // =========================================================================
    // Create
    // =========================================================================

    /// Plans and records a Pending order. Stock is not touched.
    ///
    /// Short stock yields an order with `executable = false`, unless
    /// `orders.strict_sufficiency` is set, in which case creation fails with
    /// `InsufficientStock`.
    pub async fn create_order(&self, input: NewProductionOrder) -> EngineResult<CreatedOrder> {
        validate_production_quantity(input.quantity)?;
        validate_additional_costs(&input.additional_costs)?;
        validate_notes(input.notes.as_deref())?;

        let created = self
            .retrying("create_order", || self.try_create_order(&input))
            .await?;

        info!(
            order_id = %created.order.id,
            bom_id = %created.order.bom_id,
            quantity = created.order.quantity_produced,
            total_cost = %created.order.total_cost,
            executable = created.order.executable,
            "Production order created"
        );
        self.emit(EngineEvent::OrderCreated {
            order_id: created.order.id.clone(),
            bom_id: created.order.bom_id.clone(),
            quantity: created.order.quantity_produced,
            executable: created.order.executable,
        });

        Ok(created)
    }

    async fn try_create_order(&self, input: &NewProductionOrder) -> EngineResult<CreatedOrder> {
        let mut tx = self.db.begin().await?;

        let bom = bom::fetch(&mut tx, &input.bom_id)
            .await?
            .ok_or_else(|| CoreError::not_found("BOM", &input.bom_id))?;
        let ids: Vec<String> = bom.lines.iter().map(|l| l.material_id.clone()).collect();
        let materials = material::fetch_many(&mut tx, &ids).await?;

        let plan = plan_consumption(&bom, input.quantity, &materials)?;
        if !plan.all_sufficient && self.config.orders.strict_sufficiency {
            return Err(CoreError::InsufficientStock {
                shortages: plan.shortages(),
            }
            .into());
        }

        let order = ProductionOrder::pending(
            generate_order_id(),
            &bom,
            &plan,
            input.additional_costs.clone(),
            input.notes.clone(),
            Utc::now(),
        );
        production_order::insert(&mut tx, &order).await?;
        tx.commit().await?;

        Ok(CreatedOrder { order, plan })
    }

    // =========================================================================
    // Commit
    // =========================================================================

    /// Pending -> InProgress, debiting every snapshot line.
    pub async fn commit_order(&self, order_id: &str) -> EngineResult<ProductionOrder> {
        let order = self
            .retrying("commit_order", || self.try_commit_order(order_id))
            .await?;

        info!(order_id = %order.id, lines = order.lines.len(), "Production order committed");
        self.emit(EngineEvent::OrderTransitioned {
            order_id: order.id.clone(),
            from: OrderStatus::Pending,
            to: order.status,
        });

        Ok(order)
    }

    async fn try_commit_order(&self, order_id: &str) -> EngineResult<ProductionOrder> {
        let mut tx = self.db.begin().await?;

        let order = load_order(&mut tx, order_id).await?;
        let step = transition(&order.id, order.status, OrderAction::Commit)?;

        debit_lines(&mut tx, &order).await?;

        let updated = advance(order, &step, Utc::now());
        production_order::save_transition(&mut tx, &updated, step.from).await?;
        tx.commit().await?;

        Ok(updated)
    }

    // =========================================================================
    // Complete
    // =========================================================================

    /// Pending|InProgress -> Completed.
    ///
    /// A Pending order is debited first. Finished units are credited to the
    /// matching product (created if none matches) with `cost_price` set to
    /// this run's material cost per unit. With `actual_cost`, a cost analysis
    /// is attached in the same transaction.
    pub async fn complete_order(
        &self,
        order_id: &str,
        actual_cost: Option<ActualCost>,
    ) -> EngineResult<ProductionOrder> {
        if let Some(actual) = &actual_cost {
            validate_actual_cost(actual)?;
        }

        let (order, from, credited) = self
            .retrying("complete_order", || self.try_complete_order(order_id, actual_cost))
            .await?;

        info!(
            order_id = %order.id,
            from = %from,
            product_id = %credited.id,
            units = order.quantity_produced,
            "Production order completed"
        );
        self.emit(EngineEvent::OrderTransitioned {
            order_id: order.id.clone(),
            from,
            to: order.status,
        });
        self.emit(EngineEvent::ProductCredited {
            product_id: credited.id.clone(),
            units: order.quantity_produced,
            stock: credited.stock,
        });
        if let Some(analysis) = &order.cost_analysis {
            self.emit(EngineEvent::CostAnalyzed {
                order_id: order.id.clone(),
                variance: analysis.variance,
                verdict: analysis.verdict(),
            });
        }

        Ok(order)
    }

    async fn try_complete_order(
        &self,
        order_id: &str,
        actual_cost: Option<ActualCost>,
    ) -> EngineResult<(ProductionOrder, OrderStatus, Product)> {
        let mut tx = self.db.begin().await?;

        let order = load_order(&mut tx, order_id).await?;
        let step = transition(&order.id, order.status, OrderAction::Complete)?;

        if step.debit_materials {
            debit_lines(&mut tx, &order).await?;
        }

        let credited = credit_on_completion(&mut tx, &order).await?;

        let now = Utc::now();
        let mut updated = advance(order, &step, now);
        updated.product_id = Some(credited.id.clone());
        production_order::save_transition(&mut tx, &updated, step.from).await?;

        if let Some(actual) = actual_cost {
            let analysis = analyze(&updated.estimate(), &actual, now);
            production_order::insert_analysis(&mut tx, &updated.id, &analysis).await?;
            updated.cost_analysis = Some(analysis);
        }

        tx.commit().await?;

        Ok((updated, step.from, credited))
    }

    // =========================================================================
    // Cancel
    // =========================================================================

    /// Pending|InProgress -> Cancelled. An InProgress order gets every
    /// debited line back; product stock is never touched.
    pub async fn cancel_order(&self, order_id: &str) -> EngineResult<ProductionOrder> {
        let (order, from) = self
            .retrying("cancel_order", || self.try_cancel_order(order_id))
            .await?;

        info!(order_id = %order.id, from = %from, "Production order cancelled");
        self.emit(EngineEvent::OrderTransitioned {
            order_id: order.id.clone(),
            from,
            to: order.status,
        });

        Ok(order)
    }

    async fn try_cancel_order(&self, order_id: &str) -> EngineResult<(ProductionOrder, OrderStatus)> {
        let mut tx = self.db.begin().await?;

        let order = load_order(&mut tx, order_id).await?;
        let step = transition(&order.id, order.status, OrderAction::Cancel)?;

        if step.restore_materials {
            for line in &order.lines {
                if !material::credit_stock(&mut tx, &line.material_id, line.required).await? {
                    warn!(
                        order_id = %order.id,
                        material_id = %line.material_id,
                        quantity = %line.required,
                        "Material gone, cannot restore cancelled consumption"
                    );
                }
            }
        }

        let updated = advance(order, &step, Utc::now());
        production_order::save_transition(&mut tx, &updated, step.from).await?;
        tx.commit().await?;

        Ok((updated, step.from))
    }

    // =========================================================================
    // Cost analysis backfill
    // =========================================================================

    /// Attaches a cost analysis to a Completed order that has none.
    pub async fn attach_cost_analysis(
        &self,
        order_id: &str,
        actual_cost: ActualCost,
    ) -> EngineResult<ProductionOrder> {
        validate_actual_cost(&actual_cost)?;

        let order = self
            .retrying("attach_cost_analysis", || {
                self.try_attach_cost_analysis(order_id, actual_cost)
            })
            .await?;

        if let Some(analysis) = &order.cost_analysis {
            info!(
                order_id = %order.id,
                variance = %analysis.variance,
                variance_bps = analysis.variance_bps,
                "Cost analysis attached"
            );
            self.emit(EngineEvent::CostAnalyzed {
                order_id: order.id.clone(),
                variance: analysis.variance,
                verdict: analysis.verdict(),
            });
        }

        Ok(order)
    }

    async fn try_attach_cost_analysis(
        &self,
        order_id: &str,
        actual_cost: ActualCost,
    ) -> EngineResult<ProductionOrder> {
        let mut tx = self.db.begin().await?;

        let mut order = load_order(&mut tx, order_id).await?;
        if order.status != OrderStatus::Completed {
            // Analysis belongs to the completion step; report it as such
            return Err(CoreError::InvalidStateTransition {
                order_id: order.id,
                from: order.status,
                action: OrderAction::Complete,
            }
            .into());
        }
        if order.cost_analysis.is_some() {
            return Err(CoreError::CostAnalysisExists { order_id: order.id }.into());
        }

        let analysis = analyze(&order.estimate(), &actual_cost, Utc::now());
        production_order::insert_analysis(&mut tx, &order.id, &analysis).await?;
        tx.commit().await?;

        order.cost_analysis = Some(analysis);
        Ok(order)
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn load_order(conn: &mut SqliteConnection, order_id: &str) -> EngineResult<ProductionOrder> {
    production_order::fetch(conn, order_id)
        .await?
        .ok_or_else(|| CoreError::not_found("ProductionOrder", order_id).into())
}

/// Applies a lifecycle step to the in-memory order.
fn advance(mut order: ProductionOrder, step: &Transition, now: DateTime<Utc>) -> ProductionOrder {
    order.status = step.to;
    order.updated_at = now;
    order.version += 1;
    if step.debit_materials {
        order.committed_at = Some(now);
    }
    match step.to {
        OrderStatus::Completed => order.completed_at = Some(now),
        OrderStatus::Cancelled => order.cancelled_at = Some(now),
        _ => {}
    }
    order
}

/// Debits every snapshot line, or fails listing every line that could not be
/// covered. On failure the caller drops the transaction.
async fn debit_lines(conn: &mut SqliteConnection, order: &ProductionOrder) -> EngineResult<()> {
    let mut shortages = Vec::new();

    for line in &order.lines {
        if material::debit_stock(conn, &line.material_id, line.required).await? {
            continue;
        }

        let current = material::fetch(conn, &line.material_id).await?;
        shortages.push(Shortage {
            material_id: line.material_id.clone(),
            material_name: current
                .as_ref()
                .map(|m| m.name.clone())
                .or_else(|| line.material_name.clone()),
            required: line.required,
            available: current.map(|m| m.stock).unwrap_or_default(),
        });
    }

    if !shortages.is_empty() {
        warn!(order_id = %order.id, shortages = shortages.len(), "Commit rejected, stock short");
        return Err(CoreError::InsufficientStock { shortages }.into());
    }

    Ok(())
}

/// Credits finished units to the product the order's key refers to,
/// creating it if no active product matches.
async fn credit_on_completion(
    conn: &mut SqliteConnection,
    order: &ProductionOrder,
) -> EngineResult<Product> {
    let unit_cost = order.unit_material_cost();
    let units = order.quantity_produced;

    if let Some(existing) = product::fetch_by_key(conn, &order.product_key()).await? {
        product::credit_stock(conn, &existing.id, units, unit_cost).await?;
        let credited = product::fetch(conn, &existing.id)
            .await?
            .ok_or_else(|| CoreError::not_found("Product", &existing.id))?;
        return Ok(credited);
    }

    let now = Utc::now();
    let created = Product {
        id: generate_product_id(),
        sku: order.product_sku.trim().to_string(),
        name: order.product_name.trim().to_string(),
        stock: units,
        cost_price: unit_cost,
        retail_price: Default::default(),
        wholesale_price: Default::default(),
        is_active: true,
        created_at: now,
        updated_at: now,
        version: 0,
    };
    product::insert(conn, &created).await?;
    info!(product_id = %created.id, sku = %created.sku, "Product created from production");

    Ok(created)
}
