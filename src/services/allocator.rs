use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::{AllocationError, ClaimError, StoreError};
use crate::models::ticket::normalize_ticket_number;
use crate::models::{NewTicket, SeatAssignment, TableLayout, TableOccupancy, Ticket, TicketStats};
use crate::store::{ConsumeMode, ResetReport, SeatLedger};

use super::broadcast::{OccupancyBroadcaster, SeatingEvent};

/// Per-table outcome of one seat request. Everything except `Assigned` left
/// the ledger untouched for that table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SeatRequestStatus {
    Assigned { assignment_id: Uuid },
    TableFull,
    TableBlocked { reason: Option<String> },
    InvalidTable,
    TicketAlreadyUsed,
    PersistenceError,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableResult {
    pub table_number: i32,
    #[serde(flatten)]
    pub status: SeatRequestStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignmentOutcome {
    pub ticket_number: String,
    pub assigned: usize,
    pub results: Vec<TableResult>,
}

impl AssignmentOutcome {
    pub fn fully_assigned(&self) -> bool {
        self.assigned == self.results.len()
    }
}

/// The transactional core: turns (ticket, tables) requests into durable
/// seat records or per-table rejections, and publishes occupancy deltas
/// after every commit. Sole writer to the ledger.
#[derive(Clone)]
pub struct SeatAllocator {
    store: Arc<dyn SeatLedger>,
    broadcaster: OccupancyBroadcaster,
    layout: TableLayout,
}

impl SeatAllocator {
    pub fn new(store: Arc<dyn SeatLedger>, layout: TableLayout) -> Self {
        Self {
            store,
            broadcaster: OccupancyBroadcaster::new(),
            layout,
        }
    }

    pub fn layout(&self) -> TableLayout {
        self.layout
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SeatingEvent> {
        self.broadcaster.subscribe()
    }

    /// Seat the ticket holder's party at the requested tables.
    ///
    /// Each table is its own claim transaction; a full or blocked table is
    /// skipped without aborting its siblings, so partial success is a valid
    /// outcome. The first successful claim consumes the ticket; if a
    /// concurrent duplicate submission wins that race instead, the rest of
    /// this call observes `TicketAlreadyUsed`.
    pub async fn assign_seats(
        &self,
        ticket_number: &str,
        full_name: &str,
        tables: &[i32],
    ) -> Result<AssignmentOutcome, AllocationError> {
        let ticket_number = normalize_ticket_number(ticket_number);
        let full_name = full_name.trim();

        if tables.is_empty() {
            return Err(AllocationError::EmptyRequest);
        }
        if full_name.is_empty() {
            return Err(AllocationError::HolderNameRequired);
        }

        // Cheap pre-check outside any transaction. The claim transaction
        // re-checks consumption, so a race here is caught below.
        let ticket = self
            .store
            .lookup_ticket(&ticket_number)
            .await?
            .ok_or_else(|| AllocationError::TicketInvalid(ticket_number.clone()))?;
        if ticket.is_used {
            return Err(AllocationError::TicketAlreadyUsed(ticket_number));
        }

        let mut results = Vec::with_capacity(tables.len());
        let mut deltas = Vec::new();
        let mut consumed = false;
        let mut lost_race = false;

        for &table_number in tables {
            if lost_race {
                results.push(TableResult {
                    table_number,
                    status: SeatRequestStatus::TicketAlreadyUsed,
                });
                continue;
            }
            if !self.layout.contains(table_number) {
                results.push(TableResult {
                    table_number,
                    status: SeatRequestStatus::InvalidTable,
                });
                continue;
            }

            let mode = if consumed {
                ConsumeMode::AlreadyHeld
            } else {
                ConsumeMode::Consume
            };

            let status = match self
                .store
                .claim_seat(&ticket_number, full_name, table_number, mode)
                .await
            {
                Ok((assignment, occupancy)) => {
                    consumed = true;
                    deltas.push(occupancy.delta());
                    tracing::info!(
                        ticket = %ticket_number,
                        table = table_number,
                        occupied = occupancy.occupied,
                        "seat assigned"
                    );
                    SeatRequestStatus::Assigned {
                        assignment_id: assignment.id,
                    }
                }
                Err(ClaimError::TableFull(_)) => SeatRequestStatus::TableFull,
                Err(ClaimError::TableBlocked(_, reason)) => {
                    SeatRequestStatus::TableBlocked { reason }
                }
                Err(ClaimError::TicketAlreadyUsed(_)) => {
                    // A concurrent duplicate submission consumed the ticket
                    // between our pre-check and this claim.
                    lost_race = true;
                    SeatRequestStatus::TicketAlreadyUsed
                }
                Err(ClaimError::TicketNotFound(_)) => {
                    return Err(AllocationError::TicketInvalid(ticket_number));
                }
                Err(ClaimError::Store(e)) => {
                    tracing::error!(
                        ticket = %ticket_number,
                        table = table_number,
                        error = %e,
                        "claim transaction failed"
                    );
                    SeatRequestStatus::PersistenceError
                }
            };
            results.push(TableResult {
                table_number,
                status,
            });
        }

        self.broadcaster.publish_deltas(deltas);

        Ok(AssignmentOutcome {
            ticket_number,
            assigned: results
                .iter()
                .filter(|r| matches!(r.status, SeatRequestStatus::Assigned { .. }))
                .count(),
            results,
        })
    }

    pub async fn snapshot(&self) -> Result<Vec<TableOccupancy>, StoreError> {
        self.store.snapshot().await
    }

    pub async fn lookup_ticket(&self, ticket_number: &str) -> Result<Option<Ticket>, StoreError> {
        self.store
            .lookup_ticket(&normalize_ticket_number(ticket_number))
            .await
    }

    pub async fn find_assignments(
        &self,
        ticket_number: &str,
    ) -> Result<Vec<SeatAssignment>, StoreError> {
        self.store
            .find_assignments(&normalize_ticket_number(ticket_number))
            .await
    }

    pub async fn assignments(&self) -> Result<Vec<SeatAssignment>, StoreError> {
        self.store.assignments().await
    }

    /// Free every seat held by the ticket and make it usable again.
    pub async fn release_ticket(&self, ticket_number: &str) -> Result<bool, StoreError> {
        let released = self
            .store
            .release_ticket(&normalize_ticket_number(ticket_number))
            .await?;
        if released {
            self.broadcaster.publish_refresh();
        }
        Ok(released)
    }

    pub async fn delete_assignment(&self, id: Uuid) -> Result<Option<String>, StoreError> {
        let released = self.store.delete_assignment(id).await?;
        if released.is_some() {
            self.broadcaster.publish_refresh();
        }
        Ok(released)
    }

    pub async fn import_tickets(&self, tickets: Vec<NewTicket>) -> Result<u64, StoreError> {
        self.store.import_tickets(tickets).await
    }

    pub async fn ticket_stats(&self) -> Result<TicketStats, StoreError> {
        self.store.ticket_stats().await
    }

    pub async fn block_table(
        &self,
        table_number: i32,
        reason: Option<String>,
    ) -> Result<bool, StoreError> {
        let blocked = self.store.block_table(table_number, reason).await?;
        if blocked {
            self.broadcaster.publish_refresh();
        }
        Ok(blocked)
    }

    pub async fn unblock_table(&self, table_number: i32) -> Result<bool, StoreError> {
        let unblocked = self.store.unblock_table(table_number).await?;
        if unblocked {
            self.broadcaster.publish_refresh();
        }
        Ok(unblocked)
    }

    /// Clear every assignment and consumption flag, then tell observers to
    /// re-snapshot. Idempotent: a second reset is a no-op with zero counts.
    pub async fn reset_all(&self) -> Result<ResetReport, StoreError> {
        let report = self.store.reset_all().await?;
        tracing::warn!(
            assignments_deleted = report.assignments_deleted,
            tickets_released = report.tickets_released,
            "seating chart reset"
        );
        self.broadcaster.publish_refresh();
        Ok(report)
    }

    pub fn observer_count(&self) -> usize {
        self.broadcaster.observer_count()
    }
}
