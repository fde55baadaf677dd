//! # Seed Data Generator
//!
//! Populates the database with a small apparel catalog for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./kassa_dev.db
//! cargo run -p kassa-db --bin seed
//!
//! # Specify database path and lots per product
//! cargo run -p kassa-db --bin seed -- --db ./data/kassa.db --lots 3
//! ```
//!
//! ## Generated Data
//! - One product per catalog entry, priced in USD
//! - `--lots` stock lots per product and option/color, oldest first
//! - A 10% promotion on every third product, valid for 30 days
//! - A walk-in customer with zero loyalty points

use chrono::{Duration, Utc};
use kassa_core::pricing::{DiscountKind, Promotion};
use kassa_core::{Currency, Customer, Money, Product, StockLot};
use kassa_db::{Database, DbConfig};
use rust_decimal::Decimal;
use std::env;
use uuid::Uuid;

const WALK_IN_CUSTOMER_ID: &str = "00000000-0000-4000-8000-000000000001";

/// (name, price in cents, options, colors)
const CATALOG: &[(&str, i64, &[&str], &[&str])] = &[
    ("Cotton T-Shirt", 1250, &["S", "M", "L"], &["white", "black"]),
    ("Linen Shirt", 2900, &["M", "L"], &["blue"]),
    ("Denim Jeans", 3999, &["30", "32", "34"], &["indigo"]),
    ("Silk Scarf", 1800, &[], &["red", "green"]),
    ("Canvas Tote", 950, &[], &[]),
    ("Krama", 600, &[], &["checked"]),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut lots_per_variant: i64 = 2;
    let mut db_path = String::from("./kassa_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--lots" | "-l" => {
                if i + 1 < args.len() {
                    lots_per_variant = args[i + 1].parse().unwrap_or(2);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Kassa Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -l, --lots <N>     Stock lots per product variant (default: 2)");
                println!("  -d, --db <PATH>    Database file path (default: ./kassa_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Kassa Seed Data Generator");
    println!("=========================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    if db.customers().get_by_id(WALK_IN_CUSTOMER_ID).await?.is_some() {
        println!("⚠ Database is already seeded");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let now = Utc::now();
    let mut lot_count = 0;
    let mut promotion_count = 0;

    for (idx, (name, price_cents, options, colors)) in CATALOG.iter().enumerate() {
        let product = Product {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            price: Money::from_cents(*price_cents),
            currency: Currency::Usd,
            is_active: true,
            created_at: now,
        };
        db.products().insert(&product).await?;

        for (option, color) in variants(options, colors) {
            for n in 0..lots_per_variant {
                let quantity = 5 + (idx as i64 * 3 + n) % 10;
                let lot = StockLot {
                    id: Uuid::new_v4().to_string(),
                    product_id: product.id.clone(),
                    quantity,
                    initial_quantity: quantity,
                    cost: Money::from_cents(price_cents * 55 / 100),
                    currency: Currency::Usd,
                    option: option.clone(),
                    color: color.clone(),
                    // Older lots first so allocation order is visible
                    created_at: now - Duration::days(lots_per_variant - n),
                };
                db.products().insert_lot(&lot).await?;
                lot_count += 1;
            }
        }

        if idx % 3 == 0 {
            let promotion = Promotion {
                id: Uuid::new_v4().to_string(),
                product_id: product.id.clone(),
                value: Decimal::from(10),
                kind: DiscountKind::Percentage,
                is_fixed: false,
                currency: Currency::Usd,
                start_at: now,
                expire_at: now + Duration::days(30),
            };
            db.products().insert_promotion(&promotion).await?;
            promotion_count += 1;
        }

        println!("  {} ({})", name, Money::from_cents(*price_cents).format_with_exponent(2));
    }

    db.customers()
        .insert(&Customer {
            id: WALK_IN_CUSTOMER_ID.to_string(),
            name: "Walk-in".to_string(),
            loyalty_points: 0,
            created_at: now,
        })
        .await?;

    println!();
    println!(
        "✓ Seeded {} products, {} lots, {} promotions",
        CATALOG.len(),
        lot_count,
        promotion_count
    );

    Ok(())
}

/// Every option/color combination; an empty list contributes `None`.
fn variants(options: &[&str], colors: &[&str]) -> Vec<(Option<String>, Option<String>)> {
    let options: Vec<Option<String>> = if options.is_empty() {
        vec![None]
    } else {
        options.iter().map(|o| Some(o.to_string())).collect()
    };
    let colors: Vec<Option<String>> = if colors.is_empty() {
        vec![None]
    } else {
        colors.iter().map(|c| Some(c.to_string())).collect()
    };

    options
        .iter()
        .flat_map(|o| colors.iter().map(move |c| (o.clone(), c.clone())))
        .collect()
}
