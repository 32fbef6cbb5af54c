pub mod config;
pub mod controllers;
pub mod error;
pub mod models;
pub mod services;
pub mod store;

use std::sync::Arc;

use tracing::info;

use crate::models::NewTicket;
use crate::services::SeatAllocator;
use crate::store::{MemoryLedger, PgLedger, SeatLedger};

// Shared state for the whole application
pub struct AppState {
    pub allocator: SeatAllocator,
    pub config: config::Config,
}

impl AppState {
    pub async fn new(config: config::Config) -> anyhow::Result<Arc<Self>> {
        let layout = config.seating.layout();

        let store: Arc<dyn SeatLedger> = match config.database.url.as_deref() {
            Some(url) => {
                let ledger = PgLedger::connect(url, config.database.pool_size, layout).await?;
                info!("Database connected");
                Arc::new(ledger)
            }
            None => {
                info!("No DATABASE_URL set, using in-process ledger");
                Arc::new(MemoryLedger::new(layout))
            }
        };

        let allocator = SeatAllocator::new(store, layout);

        if config.seating.seed_demo_tickets {
            seed_demo_tickets(&allocator).await?;
        }

        Ok(Arc::new(Self { allocator, config }))
    }
}

/// One ticket per seat in the room, GALA-0001 style, for demo setups where
/// no real ticket import has run yet.
async fn seed_demo_tickets(allocator: &SeatAllocator) -> anyhow::Result<()> {
    let stats = allocator.ticket_stats().await?;
    if stats.total > 0 {
        return Ok(());
    }

    let layout = allocator.layout();
    let count = (layout.total_tables * layout.seats_per_table) as usize;
    let tickets = (1..=count)
        .map(|i| NewTicket {
            ticket_number: format!("GALA-{:04}", i),
            full_name: format!("Guest {}", i),
        })
        .collect();

    let inserted = allocator.import_tickets(tickets).await?;
    info!("Seeded {} demo tickets", inserted);
    Ok(())
}
