//! Manual Risk Scoring
//!
//! Runs a risk scoring pass outside the scheduler, against whatever readings
//! and aggregates are currently stored. Useful after editing risk_rules.toml
//! or when `score_after_cycle` is disabled.
//!
//! Usage:
//!   cargo run --bin score_risk
//!
//! Options:
//!   --location ID     Only score one location
//!   --aggregate       Recompute rainfall aggregates before scoring
//!   --config PATH     Service configuration file (default: floodwatch.toml)
//!
//! Environment:
//!   DATABASE_URL - PostgreSQL connection string

use chrono::Utc;
use flood_risk_service::analysis::rainfall::RainfallAggregator;
use flood_risk_service::analysis::risk::RiskScoringEngine;
use flood_risk_service::config;
use flood_risk_service::store::{CatalogStore, PgStore};
use std::env;
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("🌊 Flood Risk Scoring");
    println!("=====================\n");

    let args: Vec<String> = env::args().collect();
    let location_filter: Option<i32> = args
        .iter()
        .position(|a| a == "--location")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.parse())
        .transpose()?;
    let aggregate = args.contains(&"--aggregate".to_string());
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1));

    let config = match config_path {
        Some(path) => config::load_config(path)?,
        None => config::load_config_or_default()?,
    };

    println!("📋 Loading risk rules...");
    let rules = Arc::new(config.load_rules()?);
    println!("✓ Rules version {}\n", rules.version);

    println!("📊 Connecting to database...");
    let store = PgStore::connect().unwrap_or_else(|e| {
        eprintln!("\n{}\n", e);
        std::process::exit(1);
    });
    println!("✓ Connected\n");

    let now = Utc::now();
    let engine = RiskScoringEngine::new(rules);

    if aggregate {
        println!("🔄 Recomputing rainfall aggregates...");
        let mut locations = store.list_locations()?;
        if let Some(id) = location_filter {
            locations.retain(|l| l.id == id);
        }
        let summary = RainfallAggregator::new(config.aggregation_policy).update_aggregates(&store, &locations, now)?;
        println!("✓ {} updated, {} without readings, {} failed\n", summary.updated, summary.empty, summary.failed);
    }

    match location_filter {
        Some(id) => match engine.assess_location(&store, id, now)? {
            Some(assessment) => {
                println!("✓ Location {}: {} (score {})", id, assessment.risk_level, assessment.risk_score);
                for factor in &assessment.factors {
                    println!("  - {:<14} +{:<3} {} ({})", factor.factor.as_str(), factor.score, factor.label, factor.value);
                }
                println!("  Action: {}", assessment.recommended_action);
            }
            None => println!("⚠️  Location {} has no weather readings yet", id),
        },
        None => {
            let summary = engine.assess_all(&store, now)?;
            println!(
                "✓ Scoring complete: {} assessed, {} without data, {} failed",
                summary.assessed, summary.no_data, summary.failed
            );
        }
    }

    Ok(())
}
