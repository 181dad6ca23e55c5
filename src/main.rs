use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;
use log::{info, warn};
use std::sync::Arc;
use uuid::Uuid;

use crmserver::core::config::{AppConfig, StorageBackend};
use crmserver::core::middleware::issue_token;
use crmserver::core::shared::state::AppState;
use crmserver::core::shared::utils::create_conn;
use crmserver::main_module::run_axum_server;
use crmserver::store::{MemoryStore, PgStore};

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  crmserver                              start the HTTP server");
    eprintln!("  crmserver token <user-id> <company-id> print a development bearer token");
}

fn parse_uuid(label: &str, value: Option<&String>) -> Result<Uuid> {
    let value = value.ok_or_else(|| anyhow!("Missing {label}"))?;
    Uuid::parse_str(value).with_context(|| format!("Invalid {label}: {value}"))
}

async fn build_state(config: AppConfig) -> Result<AppState> {
    match config.storage {
        StorageBackend::Postgres => {
            let pool = create_conn(&config.database).context("Failed to create database pool")?;
            let store = Arc::new(PgStore::new(pool));
            let migrator = store.clone();
            tokio::task::spawn_blocking(move || migrator.migrate())
                .await
                .context("Migration task panicked")?
                .context("Failed to apply database schema")?;
            info!("Using PostgreSQL storage");
            Ok(AppState::new(config, store.clone(), store))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage; data is lost on restart");
            let store = Arc::new(MemoryStore::new());
            Ok(AppState::new(config, store.clone(), store))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config = AppConfig::from_env().context("Failed to load configuration")?;

    match args.get(1).map(String::as_str) {
        None => {}
        Some("token") => {
            let user_id = parse_uuid("user id", args.get(2))?;
            let company_id = parse_uuid("company id", args.get(3))?;
            let token = issue_token(&config.auth, user_id, company_id, None)?;
            println!("{token}");
            return Ok(());
        }
        Some("--help") | Some("-h") => {
            print_usage();
            return Ok(());
        }
        Some(other) => {
            print_usage();
            return Err(anyhow!("Unknown command: {other}"));
        }
    }

    let addr = config.bind_address()?;
    info!("Starting crmserver {} on {addr}", env!("CARGO_PKG_VERSION"));

    let state = build_state(config).await?;
    run_axum_server(Arc::new(state), addr)
        .await
        .context("HTTP server failed")?;

    info!("Server stopped");
    Ok(())
}
