//! # Seed Data Generator
//!
//! Populates a development database with a small workshop catalog.
//!
//! ## Usage
//! ```bash
//! # Seed ./kiln_dev.db
//! cargo run -p kiln-db --bin seed
//!
//! # Specify database path and stock multiplier
//! cargo run -p kiln-db --bin seed -- --db ./data/kiln.db --stock 5
//! ```
//!
//! ## Generated Data
//! - Raw materials (timber, fasteners, finishes) with stock and prices
//! - One BOM per finished product, referencing those materials
//! - Empty finished products matching each BOM, with selling prices

use chrono::Utc;
use std::env;
use tracing_subscriber::EnvFilter;

use kiln_core::{Bom, BomLine, Material, Money, Product, Quantity};
use kiln_db::repository::bom::generate_bom_id;
use kiln_db::repository::material::generate_material_id;
use kiln_db::repository::product::generate_product_id;
use kiln_db::{Database, DbConfig};

/// (sku, name, unit, price in cents, stock in thousandths)
const MATERIALS: &[(&str, &str, &str, i64, i64)] = &[
    ("OAK-PLANK", "Oak plank 2m", "pcs", 2_450, 40_000),
    ("PINE-PLANK", "Pine plank 2m", "pcs", 890, 120_000),
    ("BIRCH-PLY", "Birch plywood 18mm", "m2", 3_200, 25_500),
    ("WOOD-GLUE", "Wood glue", "l", 1_150, 8_000),
    ("SCREW-4X40", "Screw 4x40", "pcs", 4, 5_000_000),
    ("DOWEL-8", "Dowel 8mm", "pcs", 6, 2_000_000),
    ("VARNISH", "Clear varnish", "l", 1_890, 12_000),
    ("FELT-PAD", "Felt pad", "pcs", 12, 800_000),
];

/// (sku, name, retail, wholesale, [(material sku, thousandths per unit)])
const PRODUCTS: &[(&str, &str, i64, i64, &[(&str, i64)])] = &[
    (
        "STOOL-OAK",
        "Oak stool",
        8_900,
        6_500,
        &[("OAK-PLANK", 1_500), ("WOOD-GLUE", 50), ("DOWEL-8", 12_000), ("VARNISH", 150), ("FELT-PAD", 4_000)],
    ),
    (
        "SHELF-PINE",
        "Pine wall shelf",
        4_500,
        3_200,
        &[("PINE-PLANK", 2_000), ("SCREW-4X40", 16_000), ("VARNISH", 200)],
    ),
    (
        "TABLE-BIRCH",
        "Birch side table",
        15_900,
        11_900,
        &[("BIRCH-PLY", 1_250), ("OAK-PLANK", 2_000), ("SCREW-4X40", 24_000), ("WOOD-GLUE", 100), ("VARNISH", 350)],
    ),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,kiln=debug,sqlx=warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./kiln_dev.db");
    let mut stock_multiplier: i64 = 1;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--stock" | "-s" => {
                if i + 1 < args.len() {
                    stock_multiplier = args[i + 1].parse().unwrap_or(1).max(1);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Kiln Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./kiln_dev.db)");
                println!("  -s, --stock <N>    Multiply seeded material stock by N (default: 1)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Kiln Seed Data Generator");
    println!("========================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.materials().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} materials", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let now = Utc::now();
    let mut material_ids = Vec::with_capacity(MATERIALS.len());

    for (sku, name, unit, price, stock) in MATERIALS {
        let material = Material {
            id: generate_material_id(),
            sku: sku.to_string(),
            name: name.to_string(),
            unit: unit.to_string(),
            purchase_price: Money::from_cents(*price),
            stock: Quantity::from_milli(stock * stock_multiplier),
            created_at: now,
            updated_at: now,
            version: 0,
        };
        db.materials().insert(&material).await?;
        println!("  + material {:<12} {:>10} {}", material.sku, material.stock, material.unit);
        material_ids.push((*sku, material.id));
    }

    for (sku, name, retail, wholesale, recipe) in PRODUCTS {
        let lines = recipe
            .iter()
            .filter_map(|(material_sku, per_unit)| {
                material_ids
                    .iter()
                    .find(|(s, _)| s == material_sku)
                    .map(|(_, id)| BomLine::new(id.clone(), Quantity::from_milli(*per_unit)))
            })
            .collect();

        let bom = Bom {
            id: generate_bom_id(),
            product_name: name.to_string(),
            product_sku: sku.to_string(),
            notes: None,
            lines,
            created_at: now,
            updated_at: now,
        };
        db.boms().insert(&bom).await?;

        let product = Product {
            id: generate_product_id(),
            sku: sku.to_string(),
            name: name.to_string(),
            stock: 0,
            cost_price: Money::zero(),
            retail_price: Money::from_cents(*retail),
            wholesale_price: Money::from_cents(*wholesale),
            is_active: true,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        db.products().insert(&product).await?;
        println!("  + product  {:<12} BOM with {} lines", product.sku, bom.lines.len());
    }

    println!();
    println!("✓ Seed complete!");

    Ok(())
}
