//! # Repository Module
//!
//! Database repository implementations for Kiln.
//!
//! ## Two Ways In
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Access                                    │
//! │                                                                         │
//! │  One-off call                        Inside an engine transaction      │
//! │  ─────────────                       ────────────────────────────      │
//! │  db.materials().get_by_id(id)        let mut tx = db.begin().await?;   │
//! │       │                              material::debit_stock(&mut tx, ..) │
//! │       │ acquires a connection        product::credit_stock(&mut tx, ..) │
//! │       ▼                              tx.commit().await?;                │
//! │  material::fetch(&mut conn, id)            │                            │
//! │       │                                    │                            │
//! │       └──────────────┬─────────────────────┘                            │
//! │                      ▼                                                  │
//! │               SQLite Database                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every module exposes connection-level functions taking
//! `&mut SqliteConnection` (a `Transaction` derefs to one) and a repository
//! struct holding the pool for calls that need no surrounding transaction.
//!
//! ## Available Repositories
//!
//! - [`MaterialRepository`](material::MaterialRepository) - Raw materials and stock
//! - [`BomRepository`](bom::BomRepository) - Bills of materials
//! - [`ProductionOrderRepository`](production_order::ProductionOrderRepository) - Orders, snapshots, analyses
//! - [`ProductRepository`](product::ProductRepository) - Finished goods

pub mod bom;
pub mod material;
pub mod product;
pub mod production_order;
