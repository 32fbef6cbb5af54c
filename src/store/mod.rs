pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ClaimError, StoreError};
use crate::models::{NewTicket, SeatAssignment, TableOccupancy, Ticket, TicketStats};

pub use memory::MemoryLedger;
pub use postgres::PgLedger;

/// Whether a claim must consume the ticket or runs under a consumption this
/// caller already holds (later tables of the same party request).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeMode {
    Consume,
    AlreadyHeld,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ResetReport {
    pub assignments_deleted: u64,
    pub tickets_released: u64,
}

/// Transactional interface over tickets, seat assignments and table blocks.
///
/// The allocator is the only writer. `claim_seat` is the capacity-safe
/// primitive: it re-reads committed occupancy under a per-table exclusive
/// unit of work, so two concurrent claims can never both observe the last
/// free seat. Reads (`snapshot`, lookups) never take write locks.
#[async_trait]
pub trait SeatLedger: Send + Sync {
    async fn lookup_ticket(&self, ticket_number: &str) -> Result<Option<Ticket>, StoreError>;

    /// Atomically reserve one seat slot at `table_number` for the ticket:
    /// blocked check, capacity check, assignment insert and (in `Consume`
    /// mode) conditional ticket consumption, all in one transaction.
    /// Returns the committed assignment and the table's post-commit
    /// occupancy.
    async fn claim_seat(
        &self,
        ticket_number: &str,
        full_name: &str,
        table_number: i32,
        mode: ConsumeMode,
    ) -> Result<(SeatAssignment, TableOccupancy), ClaimError>;

    /// Delete every assignment referencing the ticket and clear its
    /// consumption flag. Returns true if anything was deleted.
    async fn release_ticket(&self, ticket_number: &str) -> Result<bool, StoreError>;

    /// Delete one assignment by id. The ticket's consumption flag is
    /// cleared only when no other assignment still references it.
    /// Returns the released ticket number, if the assignment existed.
    async fn delete_assignment(&self, id: Uuid) -> Result<Option<String>, StoreError>;

    /// Point-in-time occupancy of every configured table, ascending.
    async fn snapshot(&self) -> Result<Vec<TableOccupancy>, StoreError>;

    /// All committed assignments, ordered by table then assignment time.
    async fn assignments(&self) -> Result<Vec<SeatAssignment>, StoreError>;

    async fn find_assignments(&self, ticket_number: &str) -> Result<Vec<SeatAssignment>, StoreError>;

    /// Bulk-import tickets, skipping numbers that already exist.
    /// Returns how many were inserted.
    async fn import_tickets(&self, tickets: Vec<NewTicket>) -> Result<u64, StoreError>;

    async fn ticket_stats(&self) -> Result<TicketStats, StoreError>;

    /// Returns false if the table was already blocked.
    async fn block_table(&self, table_number: i32, reason: Option<String>) -> Result<bool, StoreError>;

    /// Returns false if the table was not blocked.
    async fn unblock_table(&self, table_number: i32) -> Result<bool, StoreError>;

    /// Clear every assignment and every ticket's consumption flag.
    /// Table blocks survive a reset. Idempotent.
    async fn reset_all(&self) -> Result<ResetReport, StoreError>;
}
