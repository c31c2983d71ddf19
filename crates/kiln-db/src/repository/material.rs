//! # Material Repository
//!
//! Database operations for raw materials.
//!
//! ## Guarded Stock Updates
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Two orders commit against the same material (stock = 10, need 6 each) │
//! │                                                                         │
//! │  Order A: UPDATE ... SET stock = stock - 6 WHERE id = ? AND stock >= 6  │
//! │           → 1 row  (stock = 4)                                          │
//! │  Order B: UPDATE ... SET stock = stock - 6 WHERE id = ? AND stock >= 6  │
//! │           → 0 rows (guard fails, B rolls back, nothing debited)         │
//! │                                                                         │
//! │  The check and the write are one statement, so no interleaving can     │
//! │  drive stock negative. CHECK (stock >= 0) is the last line of defence. │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Functions taking `&mut SqliteConnection` run inside the caller's
//! transaction. [`MaterialRepository`] wraps them for one-off calls.

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use kiln_core::{Material, Money, Quantity};

const COLUMNS: &str =
    "id, sku, name, unit, purchase_price, stock, created_at, updated_at, version";

// =============================================================================
// Connection-level operations
// =============================================================================

/// Gets a material by ID.
pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Material>> {
    let material = sqlx::query_as::<_, Material>(&format!(
        "SELECT {} FROM materials WHERE id = ?1",
        COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(material)
}

/// Gets a material by SKU (case-insensitive).
pub async fn fetch_by_sku(conn: &mut SqliteConnection, sku: &str) -> DbResult<Option<Material>> {
    let material = sqlx::query_as::<_, Material>(&format!(
        "SELECT {} FROM materials WHERE sku = ?1 COLLATE NOCASE",
        COLUMNS
    ))
    .bind(sku.trim())
    .fetch_optional(&mut *conn)
    .await?;

    Ok(material)
}

/// Gets every material whose id is in `ids`. Unknown ids are skipped.
pub async fn fetch_many(conn: &mut SqliteConnection, ids: &[String]) -> DbResult<Vec<Material>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {} FROM materials WHERE id IN (", COLUMNS));
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(id.as_str());
    }
    separated.push_unseparated(")");

    let materials = qb.build_query_as::<Material>().fetch_all(&mut *conn).await?;
    Ok(materials)
}

/// Lists all materials ordered by name.
pub async fn fetch_all(conn: &mut SqliteConnection) -> DbResult<Vec<Material>> {
    let materials = sqlx::query_as::<_, Material>(&format!(
        "SELECT {} FROM materials ORDER BY name COLLATE NOCASE, sku",
        COLUMNS
    ))
    .fetch_all(&mut *conn)
    .await?;

    Ok(materials)
}

/// Inserts a material.
pub async fn insert(conn: &mut SqliteConnection, material: &Material) -> DbResult<()> {
    debug!(id = %material.id, sku = %material.sku, "Inserting material");

    sqlx::query(
        r#"
        INSERT INTO materials (
            id, sku, name, unit, purchase_price, stock,
            created_at, updated_at, version
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&material.id)
    .bind(&material.sku)
    .bind(&material.name)
    .bind(&material.unit)
    .bind(material.purchase_price)
    .bind(material.stock)
    .bind(material.created_at)
    .bind(material.updated_at)
    .bind(material.version)
    .execute(&mut *conn)
    .await
    .map_err(|e| match DbError::from(e) {
        DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
            field,
            value: material.sku.clone(),
        },
        other => other,
    })?;

    Ok(())
}

/// Removes `qty` from stock only if enough is on hand.
///
/// ## Returns
/// * `Ok(true)` - Stock debited
/// * `Ok(false)` - Not enough stock, or the material doesn't exist
pub async fn debit_stock(conn: &mut SqliteConnection, id: &str, qty: Quantity) -> DbResult<bool> {
    debug!(id = %id, qty = %qty, "Debiting material stock");

    let result = sqlx::query(
        r#"
        UPDATE materials
        SET
            stock = stock - ?2,
            updated_at = ?3,
            version = version + 1
        WHERE id = ?1 AND stock >= ?2
        "#,
    )
    .bind(id)
    .bind(qty)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Adds `qty` to stock.
///
/// ## Returns
/// * `Ok(true)` - Stock credited
/// * `Ok(false)` - The material doesn't exist
pub async fn credit_stock(conn: &mut SqliteConnection, id: &str, qty: Quantity) -> DbResult<bool> {
    debug!(id = %id, qty = %qty, "Crediting material stock");

    let result = sqlx::query(
        r#"
        UPDATE materials
        SET
            stock = stock + ?2,
            updated_at = ?3,
            version = version + 1
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(qty)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Changes the purchase price used by future plans.
pub async fn set_purchase_price(conn: &mut SqliteConnection, id: &str, price: Money) -> DbResult<()> {
    debug!(id = %id, price = %price, "Updating purchase price");

    let result = sqlx::query(
        r#"
        UPDATE materials
        SET
            purchase_price = ?2,
            updated_at = ?3,
            version = version + 1
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(price)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Material", id));
    }

    Ok(())
}

/// Hard-deletes a material.
pub async fn delete(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
    debug!(id = %id, "Deleting material");

    let result = sqlx::query("DELETE FROM materials WHERE id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Material", id));
    }

    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for material database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.materials();
/// let steel = repo.get_by_sku("STEEL-2MM").await?;
/// repo.receive(&steel.id, "12.5".parse()?).await?;
/// ```
#[derive(Debug, Clone)]
pub struct MaterialRepository {
    pool: SqlitePool,
}

impl MaterialRepository {
    /// Creates a new MaterialRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MaterialRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Material>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Material>> {
        let mut conn = self.pool.acquire().await?;
        fetch_by_sku(&mut conn, sku).await
    }

    pub async fn list(&self) -> DbResult<Vec<Material>> {
        let mut conn = self.pool.acquire().await?;
        fetch_all(&mut conn).await
    }

    /// Inserts a material and returns it.
    pub async fn insert(&self, material: &Material) -> DbResult<Material> {
        let mut conn = self.pool.acquire().await?;
        insert(&mut conn, material).await?;
        Ok(material.clone())
    }

    /// Records a goods receipt: `stock += qty`.
    pub async fn receive(&self, id: &str, qty: Quantity) -> DbResult<Material> {
        let mut tx = self.pool.begin().await?;
        if !credit_stock(&mut tx, id, qty).await? {
            return Err(DbError::not_found("Material", id));
        }
        let material = fetch(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("Material", id))?;
        tx.commit().await?;
        Ok(material)
    }

    /// Counts materials (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM materials")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Helper to generate a new material ID.
pub fn generate_material_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn material(sku: &str, stock: Quantity) -> Material {
        let now = Utc::now();
        Material {
            id: generate_material_id(),
            sku: sku.to_string(),
            name: format!("{} sheet", sku),
            unit: "kg".to_string(),
            purchase_price: Money::from_cents(250),
            stock,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    #[tokio::test]
    async fn test_insert_and_fetch() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.materials();

        let m = repo.insert(&material("STEEL", Quantity::from_units(10))).await.unwrap();
        let loaded = repo.get_by_id(&m.id).await.unwrap().unwrap();
        assert_eq!(loaded.sku, "STEEL");
        assert_eq!(loaded.stock, Quantity::from_units(10));
        assert_eq!(loaded.purchase_price, Money::from_cents(250));

        assert!(repo.get_by_sku("steel").await.unwrap().is_some());
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_sku_is_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.materials();

        repo.insert(&material("STEEL", Quantity::zero())).await.unwrap();
        let err = repo.insert(&material("STEEL", Quantity::zero())).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_guarded_debit() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let m = db.materials().insert(&material("STEEL", Quantity::from_units(10))).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        assert!(debit_stock(&mut conn, &m.id, Quantity::from_units(6)).await.unwrap());
        assert!(!debit_stock(&mut conn, &m.id, Quantity::from_units(6)).await.unwrap());
        assert!(!debit_stock(&mut conn, "missing", Quantity::from_units(1)).await.unwrap());

        let loaded = fetch(&mut conn, &m.id).await.unwrap().unwrap();
        assert_eq!(loaded.stock, Quantity::from_units(4));
        assert_eq!(loaded.version, 1);
    }

    #[tokio::test]
    async fn test_receive_goods() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let m = db.materials().insert(&material("RESIN", Quantity::zero())).await.unwrap();

        let updated = db.materials().receive(&m.id, Quantity::from_milli(2_500)).await.unwrap();
        assert_eq!(updated.stock, Quantity::from_milli(2_500));

        let err = db.materials().receive("missing", Quantity::from_units(1)).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_fetch_many_skips_unknown() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let a = db.materials().insert(&material("A", Quantity::zero())).await.unwrap();
        let b = db.materials().insert(&material("B", Quantity::zero())).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let found = fetch_many(&mut conn, &[a.id.clone(), "ghost".to_string(), b.id.clone()])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(fetch_many(&mut conn, &[]).await.unwrap().is_empty());
    }
}
