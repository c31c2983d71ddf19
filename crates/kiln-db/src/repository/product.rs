//! # Product Repository
//!
//! Database operations for finished products.
//!
//! ## Key Operations
//! - Lookup by the soft BOM key (SKU first, then name)
//! - Credit on production completion
//! - Guarded debit on unit removal
//! - Soft delete
//!
//! ## Why Soft Delete?
//! Completed production orders keep a `product_id`; the row stays so the
//! history still resolves. Only one active product may hold a given SKU.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use kiln_core::{Money, Product, ProductKey};

const COLUMNS: &str = "id, sku, name, stock, cost_price, retail_price, wholesale_price, \
     is_active, created_at, updated_at, version";

// =============================================================================
// Connection-level operations
// =============================================================================

/// Gets a product by ID, active or not.
pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
    let product = sqlx::query_as::<_, Product>(&format!(
        "SELECT {} FROM products WHERE id = ?1",
        COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(product)
}

/// Lists active products ordered by name.
pub async fn fetch_active(conn: &mut SqliteConnection) -> DbResult<Vec<Product>> {
    let products = sqlx::query_as::<_, Product>(&format!(
        "SELECT {} FROM products WHERE is_active = 1 ORDER BY name COLLATE NOCASE, sku",
        COLUMNS
    ))
    .fetch_all(&mut *conn)
    .await?;

    Ok(products)
}

/// Finds the active product a BOM key refers to.
///
/// Candidates are scanned oldest first; see [`ProductKey::matches`] for the
/// rule. Case folding is Unicode-aware, so the scan happens here.
pub async fn fetch_by_key(conn: &mut SqliteConnection, key: &ProductKey) -> DbResult<Option<Product>> {
    let candidates = sqlx::query_as::<_, Product>(&format!(
        "SELECT {} FROM products WHERE is_active = 1 ORDER BY created_at, id",
        COLUMNS
    ))
    .fetch_all(&mut *conn)
    .await?;

    Ok(candidates.into_iter().find(|p| key.matches(&p.key())))
}

/// Inserts a product.
pub async fn insert(conn: &mut SqliteConnection, product: &Product) -> DbResult<()> {
    debug!(id = %product.id, sku = %product.sku, "Inserting product");

    sqlx::query(&format!(
        "INSERT INTO products ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        COLUMNS
    ))
    .bind(&product.id)
    .bind(&product.sku)
    .bind(&product.name)
    .bind(product.stock)
    .bind(product.cost_price)
    .bind(product.retail_price)
    .bind(product.wholesale_price)
    .bind(product.is_active)
    .bind(product.created_at)
    .bind(product.updated_at)
    .bind(product.version)
    .execute(&mut *conn)
    .await
    .map_err(|e| match DbError::from(e) {
        DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
            field,
            value: product.sku.clone(),
        },
        other => other,
    })?;

    Ok(())
}

/// Adds finished units and records the latest unit cost.
///
/// `cost_price` is last-write-wins: the newest production run sets it.
pub async fn credit_stock(
    conn: &mut SqliteConnection,
    id: &str,
    units: i64,
    cost_price: Money,
) -> DbResult<()> {
    debug!(id = %id, units = units, cost_price = %cost_price, "Crediting product stock");

    let result = sqlx::query(
        r#"
        UPDATE products
        SET
            stock = stock + ?2,
            cost_price = ?3,
            updated_at = ?4,
            version = version + 1
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(units)
    .bind(cost_price)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Product", id));
    }

    Ok(())
}

/// Removes finished units only if enough are on hand.
///
/// ## Returns
/// * `Ok(true)` - Stock debited
/// * `Ok(false)` - Not enough stock, or the product doesn't exist
pub async fn debit_stock(conn: &mut SqliteConnection, id: &str, units: i64) -> DbResult<bool> {
    debug!(id = %id, units = units, "Debiting product stock");

    let result = sqlx::query(
        r#"
        UPDATE products
        SET
            stock = stock - ?2,
            updated_at = ?3,
            version = version + 1
        WHERE id = ?1 AND stock >= ?2
        "#,
    )
    .bind(id)
    .bind(units)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Sets the selling prices.
pub async fn set_prices(
    conn: &mut SqliteConnection,
    id: &str,
    retail_price: Money,
    wholesale_price: Money,
) -> DbResult<()> {
    debug!(id = %id, retail = %retail_price, wholesale = %wholesale_price, "Updating product prices");

    let result = sqlx::query(
        r#"
        UPDATE products
        SET
            retail_price = ?2,
            wholesale_price = ?3,
            updated_at = ?4,
            version = version + 1
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(retail_price)
    .bind(wholesale_price)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Product", id));
    }

    Ok(())
}

/// Soft-deletes a product by setting is_active = false.
pub async fn soft_delete(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
    debug!(id = %id, "Soft-deleting product");

    let result = sqlx::query(
        r#"
        UPDATE products
        SET
            is_active = 0,
            updated_at = ?2,
            version = version + 1
        WHERE id = ?1 AND is_active = 1
        "#,
    )
    .bind(id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Product", id));
    }

    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for finished product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// Finds the active product a SKU/name pair refers to.
    pub async fn find(&self, key: &ProductKey) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        fetch_by_key(&mut conn, key).await
    }

    pub async fn list_active(&self) -> DbResult<Vec<Product>> {
        let mut conn = self.pool.acquire().await?;
        fetch_active(&mut conn).await
    }

    pub async fn insert(&self, product: &Product) -> DbResult<Product> {
        let mut conn = self.pool.acquire().await?;
        insert(&mut conn, product).await?;
        Ok(product.clone())
    }

    pub async fn set_prices(&self, id: &str, retail_price: Money, wholesale_price: Money) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        set_prices(&mut conn, id, retail_price, wholesale_price).await
    }

    /// Counts active products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Helper to generate a new product ID.
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================
