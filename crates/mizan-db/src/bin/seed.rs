//! # Seed Data Generator
//!
//! Populates the database with a seller profile, a small catalogue and a
//! batch of uninvoiced sales for development.
//!
//! ## Usage
//! ```bash
//! # Seed 20 sales (default)
//! cargo run -p mizan-db --bin seed
//!
//! # Custom amount and database path
//! cargo run -p mizan-db --bin seed -- --count 100 --db ./data/mizan.db
//! ```
//!
//! ## Generated Data
//! - Settings: a demo shop with a valid 15-digit TRN
//! - Products: weighed and per-piece items with VAT-inclusive prices
//! - Sales: quantities 1-5 cycling through the catalogue

use std::env;

use mizan_core::{Money, NewSale, Product, ProductUnit, Settings};
use mizan_db::{Database, DbConfig};

/// (name, unit, grams per unit, purchase halalas, selling halalas incl. VAT)
const CATALOGUE: &[(&str, ProductUnit, Option<i64>, i64, i64)] = &[
    ("Ajwa Dates 1kg", ProductUnit::Weight, Some(1000), 6000, 9200),
    ("Sukkari Dates 500g", ProductUnit::Weight, Some(500), 2200, 3450),
    ("Arabic Coffee 250g", ProductUnit::Piece, None, 2000, 3450),
    ("Cardamom 100g", ProductUnit::Weight, Some(100), 1500, 2300),
    ("Saffron 5g", ProductUnit::Piece, None, 5000, 11500),
    ("Basmati Rice 5kg", ProductUnit::Weight, Some(5000), 3500, 5175),
    ("Sidr Honey 500g", ProductUnit::Weight, Some(500), 9000, 14950),
    ("Laban 1L", ProductUnit::Piece, None, 350, 575),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut count: usize = 20;
    let mut db_path = String::from("./mizan_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(20);
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
                println!("Mizan POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of sales to record (default: 20)");
                println!("  -d, --db <PATH>    Database file path (default: ./mizan_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Mizan POS Seed Data Generator");
    println!("================================");
    println!("Database: {}", db_path);
    println!("Sales:    {}", count);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    if db.settings().get().await?.is_none() {
        db.settings()
            .upsert(&Settings {
                shop_name: "Mizan Demo Store".to_string(),
                trn: "310122393500003".to_string(),
                address: "King Fahd Road, Riyadh 12271".to_string(),
                phone: "+966112345678".to_string(),
            })
            .await?;
        println!("✓ Seller settings created");
    } else {
        println!("✓ Seller settings already present");
    }

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let mut products = Vec::with_capacity(CATALOGUE.len());
    for (name, unit, grams, purchase, selling) in CATALOGUE {
        let product = Product::new(
            *name,
            *unit,
            *grams,
            Money::from_halalas(*purchase),
            Money::from_halalas(*selling),
            100,
        )?;
        products.push(db.products().insert(&product).await?);
    }
    println!("✓ Inserted {} products", products.len());

    println!();
    println!("Recording sales...");

    let start = std::time::Instant::now();
    let mut total = Money::zero();
    let mut recorded = 0;

    for n in 0..count {
        let product = &products[n % products.len()];
        let quantity = (n % 5) as i64 + 1;

        match db.sales().create(NewSale::for_product(product, quantity)).await {
            Ok(sale) => {
                total += sale.total_with_vat();
                recorded += 1;
            }
            Err(e) => eprintln!("Failed to record sale for {}: {}", product.name, e),
        }
    }

    println!();
    println!("✓ Recorded {} sales in {:?}", recorded, start.elapsed());
    println!("  Total incl. VAT: {} SAR", total);
    println!();
    println!("✓ Seed complete!");

    Ok(())
}
