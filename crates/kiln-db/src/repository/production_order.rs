//! # Production Order Repository
//!
//! Database operations for production orders.
//!
//! ## Storage Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  production_orders            one row per order, status + version       │
//! │    ├── production_order_lines     consumption snapshot (required, cost) │
//! │    ├── production_order_costs     declared additional costs             │
//! │    └── production_order_analyses  at most one cost analysis             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Optimistic Transitions
//! Status changes are written with `WHERE status = ? AND version = ?`. If a
//! concurrent operation moved the order first, no row matches and
//! [`DbError::Conflict`] is returned; the engine then reloads and retries,
//! at which point the lifecycle rules see the new status.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use kiln_core::{AdditionalCost, CostAnalysis, Money, OrderLine, OrderStatus, ProductionOrder, Quantity};

const ORDER_COLUMNS: &str = "id, bom_id, product_name, product_sku, quantity_produced, status, \
     materials_cost, total_cost, executable, notes, product_id, \
     created_at, updated_at, committed_at, completed_at, cancelled_at, version";

#[derive(Debug, FromRow)]
struct OrderRow {
    id: String,
    bom_id: String,
    product_name: String,
    product_sku: String,
    quantity_produced: i64,
    status: OrderStatus,
    materials_cost: Money,
    total_cost: Money,
    executable: bool,
    notes: Option<String>,
    product_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    committed_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    version: i64,
}

#[derive(Debug, FromRow)]
struct LineRow {
    material_id: String,
    material_name: Option<String>,
    required: Quantity,
    unit_cost: Money,
}

#[derive(Debug, FromRow)]
struct CostRow {
    description: String,
    amount: Money,
}

#[derive(Debug, FromRow)]
struct AnalysisRow {
    actual_cost: Money,
    variance: Money,
    variance_bps: i64,
    material_variance: Money,
    additional_costs_variance: Money,
    actual_materials_cost: Option<Money>,
    actual_additional_costs: Option<Money>,
    analyzed_at: DateTime<Utc>,
}

impl From<AnalysisRow> for CostAnalysis {
    fn from(row: AnalysisRow) -> Self {
        CostAnalysis {
            actual_cost: row.actual_cost,
            variance: row.variance,
            variance_bps: row.variance_bps,
            material_variance: row.material_variance,
            additional_costs_variance: row.additional_costs_variance,
            actual_materials_cost: row.actual_materials_cost,
            actual_additional_costs: row.actual_additional_costs,
            analyzed_at: row.analyzed_at,
        }
    }
}

/// Filter for listing orders. Empty filter lists everything.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub bom_id: Option<String>,
    pub limit: Option<u32>,
}

impl OrderFilter {
    pub fn status(status: OrderStatus) -> Self {
        OrderFilter {
            status: Some(status),
            ..Default::default()
        }
    }
}

// =============================================================================
// Connection-level operations
// =============================================================================

async fn hydrate(conn: &mut SqliteConnection, row: OrderRow) -> DbResult<ProductionOrder> {
    let lines = sqlx::query_as::<_, LineRow>(
        r#"
        SELECT material_id, material_name, required, unit_cost
        FROM production_order_lines
        WHERE order_id = ?1
        ORDER BY position
        "#,
    )
    .bind(&row.id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|l| OrderLine {
        material_id: l.material_id,
        material_name: l.material_name,
        required: l.required,
        unit_cost: l.unit_cost,
    })
    .collect();

    let additional_costs = sqlx::query_as::<_, CostRow>(
        r#"
        SELECT description, amount
        FROM production_order_costs
        WHERE order_id = ?1
        ORDER BY position
        "#,
    )
    .bind(&row.id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|c| AdditionalCost::new(c.description, c.amount))
    .collect();

    let cost_analysis = sqlx::query_as::<_, AnalysisRow>(
        r#"
        SELECT actual_cost, variance, variance_bps, material_variance,
               additional_costs_variance, actual_materials_cost,
               actual_additional_costs, analyzed_at
        FROM production_order_analyses
        WHERE order_id = ?1
        "#,
    )
    .bind(&row.id)
    .fetch_optional(&mut *conn)
    .await?
    .map(CostAnalysis::from);

    Ok(ProductionOrder {
        id: row.id,
        bom_id: row.bom_id,
        product_name: row.product_name,
        product_sku: row.product_sku,
        quantity_produced: row.quantity_produced,
        status: row.status,
        lines,
        materials_cost: row.materials_cost,
        additional_costs,
        total_cost: row.total_cost,
        executable: row.executable,
        notes: row.notes,
        product_id: row.product_id,
        cost_analysis,
        created_at: row.created_at,
        updated_at: row.updated_at,
        committed_at: row.committed_at,
        completed_at: row.completed_at,
        cancelled_at: row.cancelled_at,
        version: row.version,
    })
}

/// Gets an order with its lines, costs and analysis.
pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<ProductionOrder>> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {} FROM production_orders WHERE id = ?1",
        ORDER_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Ok(Some(hydrate(conn, row).await?)),
        None => Ok(None),
    }
}

/// Lists orders, newest first.
pub async fn fetch_list(conn: &mut SqliteConnection, filter: &OrderFilter) -> DbResult<Vec<ProductionOrder>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {} FROM production_orders WHERE 1 = 1",
        ORDER_COLUMNS
    ));
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(bom_id) = &filter.bom_id {
        qb.push(" AND bom_id = ").push_bind(bom_id.as_str());
    }
    qb.push(" ORDER BY created_at DESC, id");
    if let Some(limit) = filter.limit {
        qb.push(" LIMIT ").push_bind(limit as i64);
    }

    let rows = qb.build_query_as::<OrderRow>().fetch_all(&mut *conn).await?;

    let mut orders = Vec::with_capacity(rows.len());
    for row in rows {
        orders.push(hydrate(conn, row).await?);
    }
    Ok(orders)
}

/// Inserts an order with its snapshot lines and additional costs.
pub async fn insert(conn: &mut SqliteConnection, order: &ProductionOrder) -> DbResult<()> {
    debug!(
        id = %order.id,
        bom_id = %order.bom_id,
        quantity = order.quantity_produced,
        total_cost = %order.total_cost,
        "Inserting production order"
    );

    sqlx::query(&format!(
        "INSERT INTO production_orders ({}) VALUES \
         (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        ORDER_COLUMNS
    ))
    .bind(&order.id)
    .bind(&order.bom_id)
    .bind(&order.product_name)
    .bind(&order.product_sku)
    .bind(order.quantity_produced)
    .bind(order.status)
    .bind(order.materials_cost)
    .bind(order.total_cost)
    .bind(order.executable)
    .bind(&order.notes)
    .bind(&order.product_id)
    .bind(order.created_at)
    .bind(order.updated_at)
    .bind(order.committed_at)
    .bind(order.completed_at)
    .bind(order.cancelled_at)
    .bind(order.version)
    .execute(&mut *conn)
    .await?;

    for (position, line) in order.lines.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO production_order_lines (
                order_id, position, material_id, material_name, required, unit_cost
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&order.id)
        .bind(position as i64)
        .bind(&line.material_id)
        .bind(&line.material_name)
        .bind(line.required)
        .bind(line.unit_cost)
        .execute(&mut *conn)
        .await?;
    }

    for (position, cost) in order.additional_costs.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO production_order_costs (order_id, position, description, amount)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&order.id)
        .bind(position as i64)
        .bind(&cost.description)
        .bind(cost.amount)
        .execute(&mut *conn)
        .await?;
    }

    if let Some(analysis) = &order.cost_analysis {
        insert_analysis(conn, &order.id, analysis).await?;
    }

    Ok(())
}

/// Writes a status transition with an optimistic check.
///
/// `order` carries the new status and timestamps. The row is only updated
/// if it still has status `from` and version `order.version - 1`.
pub async fn save_transition(
    conn: &mut SqliteConnection,
    order: &ProductionOrder,
    from: OrderStatus,
) -> DbResult<()> {
    debug!(id = %order.id, from = %from, to = %order.status, "Saving order transition");

    let result = sqlx::query(
        r#"
        UPDATE production_orders
        SET
            status = ?2,
            product_id = ?3,
            updated_at = ?4,
            committed_at = ?5,
            completed_at = ?6,
            cancelled_at = ?7,
            version = ?8
        WHERE id = ?1 AND status = ?9 AND version = ?10
        "#,
    )
    .bind(&order.id)
    .bind(order.status)
    .bind(&order.product_id)
    .bind(order.updated_at)
    .bind(order.committed_at)
    .bind(order.completed_at)
    .bind(order.cancelled_at)
    .bind(order.version)
    .bind(from)
    .bind(order.version - 1)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::stale("ProductionOrder", &order.id));
    }

    Ok(())
}

/// Attaches a cost analysis. An order holds at most one.
pub async fn insert_analysis(
    conn: &mut SqliteConnection,
    order_id: &str,
    analysis: &CostAnalysis,
) -> DbResult<()> {
    debug!(order_id = %order_id, variance = %analysis.variance, "Attaching cost analysis");

    sqlx::query(
        r#"
        INSERT INTO production_order_analyses (
            order_id, actual_cost, variance, variance_bps, material_variance,
            additional_costs_variance, actual_materials_cost,
            actual_additional_costs, analyzed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(order_id)
    .bind(analysis.actual_cost)
    .bind(analysis.variance)
    .bind(analysis.variance_bps)
    .bind(analysis.material_variance)
    .bind(analysis.additional_costs_variance)
    .bind(analysis.actual_materials_cost)
    .bind(analysis.actual_additional_costs)
    .bind(analysis.analyzed_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Ids of Pending or InProgress orders referencing any of `bom_ids`.
pub async fn active_order_ids(conn: &mut SqliteConnection, bom_ids: &[String]) -> DbResult<Vec<String>> {
    order_ids_for_boms(conn, bom_ids, "('pending', 'in_progress')").await
}

/// Ids of every order that is not cancelled referencing any of `bom_ids`.
pub async fn non_cancelled_order_ids(
    conn: &mut SqliteConnection,
    bom_ids: &[String],
) -> DbResult<Vec<String>> {
    order_ids_for_boms(conn, bom_ids, "('pending', 'in_progress', 'completed')").await
}

/// Ids of Pending or InProgress orders whose snapshot consumes `material_id`.
pub async fn active_order_ids_for_material(
    conn: &mut SqliteConnection,
    material_id: &str,
) -> DbResult<Vec<String>> {
    let ids = sqlx::query_scalar::<_, String>(
        r#"
        SELECT DISTINCT o.id
        FROM production_orders o
        JOIN production_order_lines l ON l.order_id = o.id
        WHERE l.material_id = ?1 AND o.status IN ('pending', 'in_progress')
        ORDER BY o.id
        "#,
    )
    .bind(material_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(ids)
}

async fn order_ids_for_boms(
    conn: &mut SqliteConnection,
    bom_ids: &[String],
    statuses: &str,
) -> DbResult<Vec<String>> {
    if bom_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT id FROM production_orders WHERE status IN {} AND bom_id IN (",
        statuses
    ));
    let mut separated = qb.separated(", ");
    for id in bom_ids {
        separated.push_bind(id.as_str());
    }
    separated.push_unseparated(") ORDER BY created_at, id");

    let ids = qb.build_query_scalar::<String>().fetch_all(&mut *conn).await?;
    Ok(ids)
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for production order database operations.
#[derive(Debug, Clone)]
pub struct ProductionOrderRepository {
    pool: SqlitePool,
}

impl ProductionOrderRepository {
    /// Creates a new ProductionOrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductionOrderRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<ProductionOrder>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    pub async fn list(&self, filter: &OrderFilter) -> DbResult<Vec<ProductionOrder>> {
        let mut conn = self.pool.acquire().await?;
        fetch_list(&mut conn, filter).await
    }

    /// Inserts an order with all its children in one transaction.
    pub async fn insert(&self, order: &ProductionOrder) -> DbResult<ProductionOrder> {
        let mut tx = self.pool.begin().await?;
        insert(&mut tx, order).await?;
        tx.commit().await?;
        Ok(order.clone())
    }

    /// Counts orders per status (for diagnostics).
    pub async fn count_by_status(&self, status: OrderStatus) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM production_orders WHERE status = ?1")
            .bind(status)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Helper to generate a new order ID.
pub fn generate_order_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use kiln_core::costing::{analyze, ActualCost};

    fn order(bom_id: &str) -> ProductionOrder {
        let now = Utc::now();
        ProductionOrder {
            id: generate_order_id(),
            bom_id: bom_id.to_string(),
            product_name: "Stool".to_string(),
            product_sku: "STOOL".to_string(),
            quantity_produced: 3,
            status: OrderStatus::Pending,
            lines: vec![OrderLine {
                material_id: "m".to_string(),
                material_name: Some("Oak".to_string()),
                required: Quantity::from_units(6),
                unit_cost: Money::from_cents(250),
            }],
            materials_cost: Money::from_cents(1_500),
            additional_costs: vec![AdditionalCost::new("Labour", Money::from_cents(500))],
            total_cost: Money::from_cents(2_000),
            executable: true,
            notes: None,
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

    #[tokio::test]
    async fn test_insert_and_fetch_round_trip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let o = order("bom-1");
        db.orders().insert(&o).await.unwrap();

        let loaded = db.orders().get_by_id(&o.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, OrderStatus::Pending);
        assert_eq!(loaded.lines, o.lines);
        assert_eq!(loaded.additional_costs, o.additional_costs);
        assert_eq!(loaded.total_cost, Money::from_cents(2_000));
        assert!(loaded.cost_analysis.is_none());
    }

    #[tokio::test]
    async fn test_stale_transition_is_a_conflict() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let o = order("bom-1");
        db.orders().insert(&o).await.unwrap();

        let mut committed = o.clone();
        committed.status = OrderStatus::InProgress;
        committed.committed_at = Some(Utc::now());
        committed.version = 1;

        let mut conn = db.pool().acquire().await.unwrap();
        save_transition(&mut conn, &committed, OrderStatus::Pending).await.unwrap();

        // Same write again: the row is no longer Pending at version 0
        let err = save_transition(&mut conn, &committed, OrderStatus::Pending)
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let loaded = fetch(&mut conn, &o.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, OrderStatus::InProgress);
        assert_eq!(loaded.version, 1);
    }

    #[tokio::test]
    async fn test_analysis_attached_once() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let o = order("bom-1");
        db.orders().insert(&o).await.unwrap();

        let analysis = analyze(&o.estimate(), &ActualCost::total(Money::from_cents(3_000)), Utc::now());
        let mut conn = db.pool().acquire().await.unwrap();
        insert_analysis(&mut conn, &o.id, &analysis).await.unwrap();
        assert!(insert_analysis(&mut conn, &o.id, &analysis).await.is_err());

        let loaded = fetch(&mut conn, &o.id).await.unwrap().unwrap();
        assert_eq!(loaded.cost_analysis.map(|a| a.variance), Some(Money::from_cents(1_000)));
    }

    #[tokio::test]
    async fn test_active_order_ids_and_filter() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let pending = order("bom-1");
        let mut done = order("bom-1");
        done.status = OrderStatus::Completed;
        let mut cancelled = order("bom-1");
        cancelled.status = OrderStatus::Cancelled;
        let elsewhere = order("bom-2");
        for o in [&pending, &done, &cancelled, &elsewhere] {
            db.orders().insert(o).await.unwrap();
        }

        let mut conn = db.pool().acquire().await.unwrap();
        let bom = vec!["bom-1".to_string()];
        assert_eq!(active_order_ids(&mut conn, &bom).await.unwrap(), vec![pending.id.clone()]);
        assert_eq!(non_cancelled_order_ids(&mut conn, &bom).await.unwrap().len(), 2);
        assert!(active_order_ids(&mut conn, &[]).await.unwrap().is_empty());

        let consuming = active_order_ids_for_material(&mut conn, "m").await.unwrap();
        assert_eq!(consuming.len(), 2);
        assert!(consuming.contains(&elsewhere.id));
        assert!(active_order_ids_for_material(&mut conn, "other").await.unwrap().is_empty());

        let completed = fetch_list(&mut conn, &OrderFilter::status(OrderStatus::Completed))
            .await
            .unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, done.id);

        let for_bom = fetch_list(
            &mut conn,
            &OrderFilter {
                bom_id: Some("bom-2".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(for_bom.len(), 1);
    }
}
