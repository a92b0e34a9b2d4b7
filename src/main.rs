//! Flood Risk Service - Main Daemon
//!
//! A server-side daemon that, every poll interval:
//! 1. Fetches current weather for every monitored location (OpenWeather)
//! 2. Stores the readings in PostgreSQL
//! 3. Recomputes trailing 24h/72h rainfall on the latest readings
//! 4. Optionally scores flood risk for every location
//!
//! Usage:
//!   cargo run --release                              # Start daemon
//!   cargo run --release -- --endpoint 8080           # Also serve the HTTP endpoint
//!   cargo run --release -- --config floodwatch.toml  # Use a specific config file
//!   cargo run --release -- --once                    # Run a single cycle and exit
//!
//! Environment:
//!   DATABASE_URL        - PostgreSQL connection string
//!   OPENWEATHER_API_KEY - OpenWeather API key
//!   RUST_LOG            - log filter (default: info)

use flood_risk_service::analysis::rainfall::RainfallAggregator;
use flood_risk_service::analysis::risk::RiskScoringEngine;
use flood_risk_service::config::{self, ServiceConfig};
use flood_risk_service::endpoint::{self, RiskEndpoint};
use flood_risk_service::ingest::openweather::OpenWeatherSource;
use flood_risk_service::ingest::pacing::RateLimiter;
use flood_risk_service::ingest::pipeline::IngestionPipeline;
use flood_risk_service::scheduler::{CycleRunner, Scheduler};
use flood_risk_service::store::{PgStore, Store};
use std::env;
use std::sync::Arc;

struct Args {
    endpoint_port: Option<u16>,
    config_path: Option<String>,
    once: bool,
}

fn parse_args() -> Args {
    let args: Vec<String> = env::args().collect();
    let mut parsed = Args {
        endpoint_port: None,
        config_path: None,
        once: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--endpoint" => {
                match args.get(i + 1).and_then(|p| p.parse().ok()) {
                    Some(port) => parsed.endpoint_port = Some(port),
                    None => {
                        eprintln!("Error: --endpoint requires a port number");
                        std::process::exit(1);
                    }
                }
                i += 2;
            }
            "--config" => {
                match args.get(i + 1) {
                    Some(path) => parsed.config_path = Some(path.clone()),
                    None => {
                        eprintln!("Error: --config requires a file path");
                        std::process::exit(1);
                    }
                }
                i += 2;
            }
            "--once" => {
                parsed.once = true;
                i += 1;
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                eprintln!("Usage: {} [--endpoint PORT] [--config PATH] [--once]", args[0]);
                std::process::exit(1);
            }
        }
    }

    parsed
}

fn load_config(path: Option<&str>) -> ServiceConfig {
    let result = match path {
        Some(path) => config::load_config(path),
        None => config::load_config_or_default(),
    };
    match result {
        Ok(config) => config,
        Err(e) => {
            eprintln!("\n❌ Configuration error: {}\n", e);
            std::process::exit(1);
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("🌊 Flood Risk Service");
    println!("=====================\n");

    let args = parse_args();
    let config = load_config(args.config_path.as_deref());

    println!("📋 Loading risk rules...");
    let rules = match config.load_rules() {
        Ok(rules) => Arc::new(rules),
        Err(e) => {
            eprintln!("\n❌ {}\n", e);
            std::process::exit(1);
        }
    };
    println!("✓ Rules version {}\n", rules.version);

    let api_key = match config::api_key_from_env() {
        Ok(key) => Some(key),
        Err(e) => {
            // Not fatal here: every cycle will log a configuration error until it is set.
            log::warn!("{}", e);
            None
        }
    };

    println!("📊 Connecting to database...");
    let store: Arc<dyn Store> = match PgStore::connect() {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("\n❌ Database initialization failed: {}\n", e);
            std::process::exit(1);
        }
    };
    println!("✓ Database ready\n");

    let source = match OpenWeatherSource::new(&config.weather_api_url, api_key, config.fetch_timeout()) {
        Ok(source) => Arc::new(source),
        Err(e) => {
            eprintln!("\n❌ Failed to build HTTP client: {}\n", e);
            std::process::exit(1);
        }
    };

    let limiter = Arc::new(RateLimiter::new(config.pacing_delay()));
    let pipeline = IngestionPipeline::new(source, limiter);
    let mut runner = CycleRunner::new(
        Arc::clone(&store),
        pipeline,
        RainfallAggregator::new(config.aggregation_policy),
    );
    if config.score_after_cycle {
        runner = runner.with_scoring(RiskScoringEngine::new(Arc::clone(&rules)));
    }
    let scheduler = Scheduler::new(runner, config.poll_interval());

    if let Some(port) = args.endpoint_port {
        println!("🚀 Starting HTTP endpoint server...");
        let endpoint = RiskEndpoint::new(Arc::clone(&store), RiskScoringEngine::new(Arc::clone(&rules)));
        std::thread::spawn(move || {
            if let Err(e) = endpoint::start_endpoint_server(port, endpoint) {
                eprintln!("❌ Endpoint server error: {}", e);
            }
        });
        println!("   Endpoint running on http://0.0.0.0:{}\n", port);
    }

    if args.once {
        println!("🔄 Running a single cycle...");
        scheduler.trigger();
        scheduler.wait_idle();
        match scheduler.last_report() {
            Some(report) => println!(
                "✓ Cycle finished: {} fetched, {} failed",
                report.ingestion.succeeded, report.ingestion.failed
            ),
            None => {
                eprintln!("❌ Cycle failed (see system_logs)");
                std::process::exit(1);
            }
        }
        return;
    }

    println!("🔄 Starting continuous monitoring loop...");
    println!("   Poll interval: {} minutes", config.poll_interval_minutes);
    println!("   Pacing delay: {} ms", config.pacing_delay_ms);
    println!("   Score after cycle: {}", config.score_after_cycle);
    println!("   Press Ctrl+C to stop\n");

    let installed = ctrlc::set_handler({
        let cancel = scheduler.cancel_token();
        move || {
            log::info!("Received Ctrl+C, stopping after the current location...");
            cancel.cancel();
        }
    });
    if let Err(e) = installed {
        eprintln!("\n❌ Failed to install Ctrl+C handler: {}\n", e);
        std::process::exit(1);
    }

    scheduler.run();
}
