//! # kiln-db: Database Layer for Kiln
//!
//! This crate provides database access for the production order engine.
//! It uses SQLite for local storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Kiln Data Flow                                 │
//! │                                                                         │
//! │  ProductionEngine::commit_order                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     kiln-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │    │  (embedded)  │  │   │
//! │  │   │               │    │ material       │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ bom            │    │ 001_initial  │  │   │
//! │  │   │ begin() → Tx  │    │ production_ord │    │ _schema.sql  │  │   │
//! │  │   │               │    │ product        │    │              │  │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation, configuration and transactions
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kiln_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("kiln.db")).await?;
//! let materials = db.materials().list().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig, Tx};

// Repository re-exports for convenience
pub use repository::bom::BomRepository;
pub use repository::material::MaterialRepository;
pub use repository::product::ProductRepository;
pub use repository::production_order::{OrderFilter, ProductionOrderRepository};
