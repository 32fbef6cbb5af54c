use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::error::{ClaimError, StoreError};
use crate::models::{NewTicket, SeatAssignment, TableLayout, TableOccupancy, Ticket, TicketStats};

use super::{ConsumeMode, ResetReport, SeatLedger};

// Advisory lock namespace for per-table claim serialization.
const SEAT_LOCK_NS: i32 = 0x5EA7;

const ASSIGNMENT_COLUMNS: &str = "id, ticket_number, full_name, table_number, assigned_at";

/// Postgres-backed ledger. Capacity safety comes from a transaction-scoped
/// advisory lock keyed by table number: claims on the same table serialize,
/// claims on different tables proceed in parallel. Ticket consumption is a
/// conditional UPDATE inside the same transaction, so a concurrent duplicate
/// submission loses cleanly.
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
    layout: TableLayout,
}

impl PgLedger {
    pub async fn connect(database_url: &str, pool_size: u32, layout: TableLayout) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        info!("Running database migrations...");
        sqlx::migrate!("./src/migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Database(e.into()))?;
        info!("Migrations completed");

        Ok(Self { pool, layout })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SeatLedger for PgLedger {
    async fn lookup_ticket(&self, ticket_number: &str) -> Result<Option<Ticket>, StoreError> {
        let ticket = sqlx::query_as::<_, Ticket>(
            "SELECT ticket_number, full_name, is_used, used_at FROM tickets WHERE ticket_number = $1",
        )
        .bind(ticket_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(ticket)
    }

    async fn claim_seat(
        &self,
        ticket_number: &str,
        full_name: &str,
        table_number: i32,
        mode: ConsumeMode,
    ) -> Result<(SeatAssignment, TableOccupancy), ClaimError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        // Serialize claims per table; dropped automatically at commit/rollback.
        sqlx::query("SELECT pg_advisory_xact_lock($1, $2)")
            .bind(SEAT_LOCK_NS)
            .bind(table_number)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from)?;

        let block: Option<Option<String>> = sqlx::query_scalar(
            "SELECT reason FROM blocked_tables WHERE table_number = $1",
        )
        .bind(table_number)
        .fetch_optional(&mut *tx)
        .await
        .map_err(StoreError::from)?;
        if let Some(reason) = block {
            return Err(ClaimError::TableBlocked(table_number, reason));
        }

        let occupied: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM seat_assignments WHERE table_number = $1",
        )
        .bind(table_number)
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::from)?;
        if occupied >= self.layout.seats_per_table as i64 {
            return Err(ClaimError::TableFull(table_number));
        }

        match mode {
            ConsumeMode::Consume => {
                let updated = sqlx::query(
                    "UPDATE tickets SET is_used = TRUE, used_at = NOW()
                     WHERE ticket_number = $1 AND is_used = FALSE",
                )
                .bind(ticket_number)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::from)?
                .rows_affected();

                if updated == 0 {
                    let exists: bool = sqlx::query_scalar(
                        "SELECT EXISTS(SELECT 1 FROM tickets WHERE ticket_number = $1)",
                    )
                    .bind(ticket_number)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(StoreError::from)?;

                    return Err(if exists {
                        ClaimError::TicketAlreadyUsed(ticket_number.to_string())
                    } else {
                        ClaimError::TicketNotFound(ticket_number.to_string())
                    });
                }
            }
            ConsumeMode::AlreadyHeld => {
                let exists: bool = sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM tickets WHERE ticket_number = $1)",
                )
                .bind(ticket_number)
                .fetch_one(&mut *tx)
                .await
                .map_err(StoreError::from)?;
                if !exists {
                    return Err(ClaimError::TicketNotFound(ticket_number.to_string()));
                }
            }
        }

        let assignment = sqlx::query_as::<_, SeatAssignment>(&format!(
            "INSERT INTO seat_assignments (id, ticket_number, full_name, table_number)
             VALUES ($1, $2, $3, $4)
             RETURNING {ASSIGNMENT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(ticket_number)
        .bind(full_name)
        .bind(table_number)
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        tx.commit().await.map_err(StoreError::from)?;

        let occupancy = TableOccupancy::new(
            table_number,
            occupied as i32 + 1,
            self.layout.seats_per_table,
        );
        Ok((assignment, occupancy))
    }

    async fn release_ticket(&self, ticket_number: &str) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM seat_assignments WHERE ticket_number = $1")
            .bind(ticket_number)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query(
            "UPDATE tickets SET is_used = FALSE, used_at = NULL WHERE ticket_number = $1",
        )
        .bind(ticket_number)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(deleted > 0)
    }

    async fn delete_assignment(&self, id: Uuid) -> Result<Option<String>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let ticket_number: Option<String> = sqlx::query_scalar(
            "DELETE FROM seat_assignments WHERE id = $1 RETURNING ticket_number",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(ref ticket_number) = ticket_number {
            // Clear the flag only once the ticket's last seat is gone.
            sqlx::query(
                "UPDATE tickets SET is_used = FALSE, used_at = NULL
                 WHERE ticket_number = $1
                   AND NOT EXISTS(SELECT 1 FROM seat_assignments WHERE ticket_number = $1)",
            )
            .bind(ticket_number)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(ticket_number)
    }

    async fn snapshot(&self) -> Result<Vec<TableOccupancy>, StoreError> {
        // Repeatable read gives both statements one consistent view of the
        // ledger, so no table reflects a commit another table missed.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;

        let counts: Vec<(i32, i64)> = sqlx::query_as(
            "SELECT table_number, COUNT(*) FROM seat_assignments GROUP BY table_number",
        )
        .fetch_all(&mut *tx)
        .await?;

        let blocks: Vec<(i32, Option<String>)> = sqlx::query_as(
            "SELECT table_number, reason FROM blocked_tables",
        )
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let counts: std::collections::HashMap<i32, i64> = counts.into_iter().collect();
        let blocks: std::collections::HashMap<i32, Option<String>> = blocks.into_iter().collect();

        Ok(self
            .layout
            .table_numbers()
            .map(|n| {
                let occ = TableOccupancy::new(
                    n,
                    counts.get(&n).copied().unwrap_or(0) as i32,
                    self.layout.seats_per_table,
                );
                match blocks.get(&n) {
                    Some(reason) => occ.blocked(reason.clone()),
                    None => occ,
                }
            })
            .collect())
    }

    async fn assignments(&self) -> Result<Vec<SeatAssignment>, StoreError> {
        let all = sqlx::query_as::<_, SeatAssignment>(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM seat_assignments ORDER BY table_number, assigned_at"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(all)
    }

    async fn find_assignments(&self, ticket_number: &str) -> Result<Vec<SeatAssignment>, StoreError> {
        let found = sqlx::query_as::<_, SeatAssignment>(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM seat_assignments
             WHERE ticket_number = $1 ORDER BY assigned_at"
        ))
        .bind(ticket_number)
        .fetch_all(&self.pool)
        .await?;
        Ok(found)
    }

    async fn import_tickets(&self, tickets: Vec<NewTicket>) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for ticket in tickets {
            let ticket = ticket.normalized();
            if ticket.ticket_number.is_empty() {
                continue;
            }
            inserted += sqlx::query(
                "INSERT INTO tickets (ticket_number, full_name)
                 VALUES ($1, $2)
                 ON CONFLICT (ticket_number) DO NOTHING",
            )
            .bind(&ticket.ticket_number)
            .bind(&ticket.full_name)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn ticket_stats(&self) -> Result<TicketStats, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, COUNT(*) FILTER (WHERE is_used) AS used FROM tickets",
        )
        .fetch_one(&self.pool)
        .await?;
        let total: i64 = row.get("total");
        let used: i64 = row.get("used");
        Ok(TicketStats {
            total,
            used,
            available: total - used,
        })
    }

    async fn block_table(&self, table_number: i32, reason: Option<String>) -> Result<bool, StoreError> {
        let inserted = sqlx::query(
            "INSERT INTO blocked_tables (table_number, reason)
             VALUES ($1, $2)
             ON CONFLICT (table_number) DO NOTHING",
        )
        .bind(table_number)
        .bind(reason)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(inserted > 0)
    }

    async fn unblock_table(&self, table_number: i32) -> Result<bool, StoreError> {
        let deleted = sqlx::query("DELETE FROM blocked_tables WHERE table_number = $1")
            .bind(table_number)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }

    async fn reset_all(&self) -> Result<ResetReport, StoreError> {
        let mut tx = self.pool.begin().await?;

        let assignments_deleted = sqlx::query("DELETE FROM seat_assignments")
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let tickets_released = sqlx::query(
            "UPDATE tickets SET is_used = FALSE, used_at = NULL WHERE is_used",
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        Ok(ResetReport {
            assignments_deleted,
            tickets_released,
        })
    }
}
