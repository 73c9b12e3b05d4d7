//! # Seed Data Generator
//!
//! Populates a development database with a fiscal configuration and a set
//! of open service requests carrying budget lines.
//!
//! ## Usage
//! ```bash
//! # 50 requests for provider "demo" (default)
//! cargo run -p fieldops-db --bin seed
//!
//! # Custom amount, provider and database path
//! cargo run -p fieldops-db --bin seed -- --count 200 --provider acme --db ./data/fieldops.db
//! ```
//!
//! Budget lines are drawn from the built-in suggestion catalog, one to
//! three per request.

use chrono::Utc;
use std::env;
use uuid::Uuid;

use fieldops_core::budget::{line_total, suggestions};
use fieldops_core::sla::sla_deadline;
use fieldops_core::{
    BudgetLineItem, FiscalConfiguration, HistoryEntry, Priority, Quantity, Request,
    RequestStatus, TaxRegime,
};
use fieldops_db::{Database, DbConfig};

const CLIENTS: &[(&str, &str)] = &[
    ("Padaria Central", "12345678000195"),
    ("Mercado Bom Preço", "23456789000106"),
    ("Clínica Vida", "34567890000117"),
    ("Escola Aurora", "45678901000128"),
    ("Restaurante Sabor", "56789012000139"),
    ("Hotel Mirante", "67890123000140"),
];

const SERVICES: &[&str] = &[
    "Manutenção preventiva",
    "Manutenção corretiva",
    "Instalação",
    "Limpeza de sistema",
    "Recarga de gás",
];

const PRIORITIES: &[Priority] = &[Priority::Low, Priority::Medium, Priority::High, Priority::Emergency];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut count: usize = 50;
    let mut db_path = String::from("./fieldops_dev.db");
    let mut provider_id = String::from("demo");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(50);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--provider" | "-p" => {
                if i + 1 < args.len() {
                    provider_id = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("FieldOps Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>        Number of requests to generate (default: 50)");
                println!("  -p, --provider <ID>    Provider id (default: demo)");
                println!("  -d, --db <PATH>        Database file path (default: ./fieldops_dev.db)");
                println!("  -h, --help             Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 FieldOps Seed Data Generator");
    println!("===============================");
    println!("Database: {}", db_path);
    println!("Provider: {}", provider_id);
    println!("Requests: {}", count);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    if db.fiscal().get(&provider_id).await?.is_none() {
        let config = FiscalConfiguration::suggested(&provider_id, TaxRegime::LucroPresumido);
        db.fiscal().upsert(&config, Utc::now()).await?;
        println!("✓ Fiscal configuration created (Lucro Presumido)");
    }

    if db.sequences().current(&provider_id).await?.is_some() {
        println!("⚠ Provider {} already has requests", provider_id);
        println!("  Skipping seed to avoid duplicates.");
        return Ok(());
    }

    let catalog = suggestions();
    let start = std::time::Instant::now();
    let mut generated = 0;

    for seed in 0..count {
        let request = generate_request(&provider_id, seed);
        let id = request.id.clone();

        let created = match db
            .requests()
            .create(request, &history(&id, "Request created"))
            .await
        {
            Ok(created) => created,
            Err(e) => {
                eprintln!("Failed to create request {}: {}", seed, e);
                continue;
            }
        };

        for n in 0..(1 + seed % 3) {
            let suggestion = &catalog[(seed * 7 + n * 3) % catalog.len()];
            // 1, 1.5, 2 or 2.5 units
            let quantity = Quantity::from_milli(1_000 + (seed % 4) as i64 * 500);
            let total = line_total(quantity, suggestion.suggested_price)?;
            let item = BudgetLineItem {
                id: Uuid::new_v4().to_string(),
                request_id: created.id.clone(),
                description: suggestion.description.clone(),
                quantity,
                unit_price_cents: suggestion.suggested_price.cents(),
                total_cents: total.cents(),
                category: suggestion.category,
                created_at: Utc::now(),
            };
            db.budget()
                .add_item(&item, &history(&created.id, "Budget item added"))
                .await?;
        }

        generated += 1;
        if generated % 25 == 0 {
            println!("  Generated {} requests...", generated);
        }
    }

    println!();
    println!("✓ Generated {} requests in {:?}", generated, start.elapsed());
    println!();
    println!("✓ Seed complete!");

    Ok(())
}

fn generate_request(provider_id: &str, seed: usize) -> Request {
    let now = Utc::now();
    let (client_name, document) = CLIENTS[seed % CLIENTS.len()];
    let priority = PRIORITIES[seed % PRIORITIES.len()];

    Request {
        id: Uuid::new_v4().to_string(),
        provider_id: provider_id.to_string(),
        number: 0,
        client_id: format!("client-{}", seed % CLIENTS.len()),
        client_name: client_name.to_string(),
        client_document: Some(document.to_string()),
        status: RequestStatus::Open,
        priority,
        service_type: SERVICES[seed % SERVICES.len()].to_string(),
        description: format!("Chamado de teste #{}", seed + 1),
        responsible_id: None,
        responsible_name: None,
        scheduled_at: None,
        sla_limit: sla_deadline(priority, now),
        confirmed_at: None,
        confirmed_by: None,
        observation: None,
        materials_used: None,
        next_maintenance_at: None,
        locked_by: None,
        locked_at: None,
        budget_total_cents: 0,
        budget_approved: false,
        client_signature: None,
        technician_signature: None,
        signed_at: None,
        created_at: now,
        updated_at: now,
        equipment_ids: vec![format!("equipment-{}", seed % 10)],
    }
}

fn history(request_id: &str, action: &str) -> HistoryEntry {
    HistoryEntry {
        id: Uuid::new_v4().to_string(),
        request_id: request_id.to_string(),
        actor_id: "seed".into(),
        actor_name: "Seed".into(),
        action: action.to_string(),
        details: None,
        before_value: None,
        after_value: None,
        created_at: Utc::now(),
    }
}
