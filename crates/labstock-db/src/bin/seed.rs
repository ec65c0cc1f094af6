//! # Seed Data Generator
//!
//! Populates a development database with an active period, categories and
//! components, plus a few requests in every lifecycle state.
//!
//! ## Usage
//! ```bash
//! cargo run -p labstock-db --bin seed
//!
//! # Specify database path
//! cargo run -p labstock-db --bin seed -- --db ./data/labstock.db
//! ```

use chrono::{Duration, Utc};
use labstock_core::input::{DetailInput, NewAcademicPeriod, NewComponent, NewRequest};
use labstock_db::{Database, DbConfig};
use std::env;

/// Categories and their components, with initial stock.
const CATALOG: &[(&str, &[(&str, i64)])] = &[
    (
        "Microcontrollers",
        &[
            ("Arduino Uno R3", 25),
            ("Arduino Mega 2560", 10),
            ("ESP32 DevKit", 20),
            ("Raspberry Pi Pico", 15),
        ],
    ),
    (
        "Sensors",
        &[
            ("DHT11 Temperature Sensor", 30),
            ("HC-SR04 Ultrasonic Sensor", 30),
            ("MPU6050 IMU", 12),
        ],
    ),
    (
        "Passives",
        &[
            ("Resistor Kit 1/4W", 40),
            ("Ceramic Capacitor Kit", 40),
            ("Breadboard 830", 35),
        ],
    ),
    (
        "Instruments",
        &[("Digital Multimeter", 8), ("Bench Power Supply", 4)],
    ),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./labstock_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("LabStock Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./labstock_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("LabStock Seed Data Generator");
    println!("============================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.components().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} components", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    // Active period first: every stock movement needs one.
    let start = Utc::now() - Duration::days(14);
    let period = db
        .periods()
        .create(&NewAcademicPeriod {
            name: "Demo semester".to_string(),
            start_date: start,
            end_date: start + Duration::days(120),
        })
        .await?;
    db.periods().set_active(period.id).await?;
    println!("✓ Active period: {}", period.name);

    let mut component_ids = Vec::new();
    for (category_name, components) in CATALOG {
        let category = db.categories().create(category_name).await?;
        for (name, quantity) in components.iter() {
            let component = db
                .components()
                .create_with_stock(&NewComponent {
                    name: name.to_string(),
                    description: None,
                    initial_quantity: *quantity,
                    category_id: category.id,
                    reason: "Initial stock".to_string(),
                    image_url: None,
                    academic_period_id: None,
                })
                .await?;
            component_ids.push(component.id);
        }
        println!("  {}: {} components", category_name, components.len());
    }

    // One request per lifecycle state.
    let mut requests = Vec::new();
    for (user_id, offset) in [(101, 0usize), (102, 2), (103, 4), (104, 6)] {
        let details = component_ids
            .iter()
            .skip(offset)
            .take(2)
            .map(|&component_id| DetailInput {
                component_id,
                quantity: 1,
            })
            .collect();
        let request = db
            .requests()
            .create(&NewRequest {
                user_id,
                type_request: "Laboratory practice".to_string(),
                details,
                description: Some("Seeded request".to_string()),
                return_date: Some(Utc::now() + Duration::days(7)),
                responsible: None,
                file_url: None,
            })
            .await?;
        requests.push(request.request_id);
    }

    db.requests().accept(requests[1]).await?;
    db.requests().accept(requests[2]).await?;
    db.requests().mark_not_returned(requests[2], None).await?;
    db.requests().accept(requests[3]).await?;
    db.requests()
        .finalize(requests[3], Some("Returned in good condition".to_string()))
        .await?;

    println!();
    println!("✓ Seeded {} requests", requests.len());
    println!("  pendiente:   #{}", requests[0]);
    println!("  prestamo:    #{}", requests[1]);
    println!("  no_devuelto: #{}", requests[2]);
    println!("  finalizado:  #{}", requests[3]);
    println!();
    println!("✓ Seed complete!");

    Ok(())
}
