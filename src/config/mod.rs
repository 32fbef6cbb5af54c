use serde::Deserialize;
use std::env;

use crate::models::TableLayout;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub seating: SeatingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
}

// DATABASE_URL is optional: without it the service runs on the in-process
// ledger (single-node deployments and demos).
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeatingConfig {
    pub total_tables: i32,
    pub seats_per_table: i32,
    pub seed_demo_tickets: bool,
}

impl SeatingConfig {
    pub fn layout(&self) -> TableLayout {
        TableLayout {
            total_tables: self.total_tables,
            seats_per_table: self.seats_per_table,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            app: AppConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()
                    .expect("PORT must be a valid number"),
                environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
                rust_log: env::var("RUST_LOG")
                    .unwrap_or_else(|_| "gala_seating=debug,tower_http=debug".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").ok(),
                pool_size: env::var("DB_POOL_SIZE")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()
                    .expect("DB_POOL_SIZE must be a valid number"),
            },
            seating: SeatingConfig {
                total_tables: env::var("TOTAL_TABLES")
                    .unwrap_or_else(|_| "25".to_string())
                    .parse()
                    .expect("TOTAL_TABLES must be a valid number"),
                seats_per_table: env::var("SEATS_PER_TABLE")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .expect("SEATS_PER_TABLE must be a valid number"),
                seed_demo_tickets: env::var("SEED_DEMO_TICKETS")
                    .unwrap_or_else(|_| "false".to_string())
                    .parse()
                    .expect("SEED_DEMO_TICKETS must be true or false"),
            },
        }
    }
}
