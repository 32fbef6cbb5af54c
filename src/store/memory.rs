use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{ClaimError, StoreError};
use crate::models::{NewTicket, SeatAssignment, TableLayout, TableOccupancy, Ticket, TicketStats};

use super::{ConsumeMode, ResetReport, SeatLedger};

#[derive(Default)]
struct LedgerState {
    tickets: HashMap<String, Ticket>,
    assignments: Vec<SeatAssignment>,
    // table number -> block reason
    blocked: HashMap<i32, Option<String>>,
}

impl LedgerState {
    fn occupied(&self, table_number: i32) -> i32 {
        self.assignments
            .iter()
            .filter(|a| a.table_number == table_number)
            .count() as i32
    }
}

/// In-process ledger for single-node deployments and tests. All writes
/// funnel through one writer lock, which makes the count-then-insert claim
/// atomic; readers share the lock and see committed state only.
pub struct MemoryLedger {
    layout: TableLayout,
    state: RwLock<LedgerState>,
}

impl MemoryLedger {
    pub fn new(layout: TableLayout) -> Self {
        Self {
            layout,
            state: RwLock::new(LedgerState::default()),
        }
    }
}

#[async_trait]
impl SeatLedger for MemoryLedger {
    async fn lookup_ticket(&self, ticket_number: &str) -> Result<Option<Ticket>, StoreError> {
        let state = self.state.read().await;
        Ok(state.tickets.get(ticket_number).cloned())
    }

    async fn claim_seat(
        &self,
        ticket_number: &str,
        full_name: &str,
        table_number: i32,
        mode: ConsumeMode,
    ) -> Result<(SeatAssignment, TableOccupancy), ClaimError> {
        let mut state = self.state.write().await;

        if let Some(reason) = state.blocked.get(&table_number) {
            return Err(ClaimError::TableBlocked(table_number, reason.clone()));
        }

        let occupied = state.occupied(table_number);
        if occupied >= self.layout.seats_per_table {
            return Err(ClaimError::TableFull(table_number));
        }

        match mode {
            ConsumeMode::Consume => {
                let ticket = state
                    .tickets
                    .get_mut(ticket_number)
                    .ok_or_else(|| ClaimError::TicketNotFound(ticket_number.to_string()))?;
                if ticket.is_used {
                    return Err(ClaimError::TicketAlreadyUsed(ticket_number.to_string()));
                }
                ticket.is_used = true;
                ticket.used_at = Some(Utc::now());
            }
            ConsumeMode::AlreadyHeld => {
                if !state.tickets.contains_key(ticket_number) {
                    return Err(ClaimError::TicketNotFound(ticket_number.to_string()));
                }
            }
        }

        let assignment = SeatAssignment {
            id: Uuid::new_v4(),
            ticket_number: ticket_number.to_string(),
            full_name: full_name.to_string(),
            table_number,
            assigned_at: Utc::now(),
        };
        state.assignments.push(assignment.clone());

        let occupancy = TableOccupancy::new(table_number, occupied + 1, self.layout.seats_per_table);
        Ok((assignment, occupancy))
    }

    async fn release_ticket(&self, ticket_number: &str) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let before = state.assignments.len();
        state.assignments.retain(|a| a.ticket_number != ticket_number);
        let deleted = state.assignments.len() < before;

        if let Some(ticket) = state.tickets.get_mut(ticket_number) {
            ticket.is_used = false;
            ticket.used_at = None;
        }
        Ok(deleted)
    }

    async fn delete_assignment(&self, id: Uuid) -> Result<Option<String>, StoreError> {
        let mut state = self.state.write().await;
        let Some(pos) = state.assignments.iter().position(|a| a.id == id) else {
            return Ok(None);
        };
        let removed = state.assignments.remove(pos);

        let still_seated = state
            .assignments
            .iter()
            .any(|a| a.ticket_number == removed.ticket_number);
        if !still_seated {
            if let Some(ticket) = state.tickets.get_mut(&removed.ticket_number) {
                ticket.is_used = false;
                ticket.used_at = None;
            }
        }
        Ok(Some(removed.ticket_number))
    }

    async fn snapshot(&self) -> Result<Vec<TableOccupancy>, StoreError> {
        let state = self.state.read().await;

        let mut counts: HashMap<i32, i32> = HashMap::new();
        for a in &state.assignments {
            *counts.entry(a.table_number).or_insert(0) += 1;
        }

        let tables = self
            .layout
            .table_numbers()
            .map(|n| {
                let occ = TableOccupancy::new(
                    n,
                    counts.get(&n).copied().unwrap_or(0),
                    self.layout.seats_per_table,
                );
                match state.blocked.get(&n) {
                    Some(reason) => occ.blocked(reason.clone()),
                    None => occ,
                }
            })
            .collect();
        Ok(tables)
    }

    async fn assignments(&self) -> Result<Vec<SeatAssignment>, StoreError> {
        let state = self.state.read().await;
        let mut all = state.assignments.clone();
        all.sort_by(|a, b| {
            (a.table_number, a.assigned_at).cmp(&(b.table_number, b.assigned_at))
        });
        Ok(all)
    }

    async fn find_assignments(&self, ticket_number: &str) -> Result<Vec<SeatAssignment>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .assignments
            .iter()
            .filter(|a| a.ticket_number == ticket_number)
            .cloned()
            .collect())
    }

    async fn import_tickets(&self, tickets: Vec<NewTicket>) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let mut inserted = 0;
        for ticket in tickets {
            let ticket = ticket.normalized();
            if ticket.ticket_number.is_empty() || state.tickets.contains_key(&ticket.ticket_number) {
                continue;
            }
            state.tickets.insert(
                ticket.ticket_number.clone(),
                Ticket {
                    ticket_number: ticket.ticket_number,
                    full_name: ticket.full_name,
                    is_used: false,
                    used_at: None,
                },
            );
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn ticket_stats(&self) -> Result<TicketStats, StoreError> {
        let state = self.state.read().await;
        let total = state.tickets.len() as i64;
        let used = state.tickets.values().filter(|t| t.is_used).count() as i64;
        Ok(TicketStats {
            total,
            used,
            available: total - used,
        })
    }

    async fn block_table(&self, table_number: i32, reason: Option<String>) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        if state.blocked.contains_key(&table_number) {
            return Ok(false);
        }
        state.blocked.insert(table_number, reason);
        Ok(true)
    }

    async fn unblock_table(&self, table_number: i32) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        Ok(state.blocked.remove(&table_number).is_some())
    }

    async fn reset_all(&self) -> Result<ResetReport, StoreError> {
        let mut state = self.state.write().await;
        let assignments_deleted = state.assignments.len() as u64;
        state.assignments.clear();

        let mut tickets_released = 0;
        for ticket in state.tickets.values_mut() {
            if ticket.is_used {
                ticket.is_used = false;
                ticket.used_at = None;
                tickets_released += 1;
            }
        }
        Ok(ResetReport {
            assignments_deleted,
            tickets_released,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> MemoryLedger {
        MemoryLedger::new(TableLayout {
            total_tables: 3,
            seats_per_table: 2,
        })
    }

    async fn seed(ledger: &MemoryLedger, count: usize) {
        let tickets = (1..=count)
            .map(|i| NewTicket {
                ticket_number: format!("GALA-{:04}", i),
                full_name: format!("Guest {}", i),
            })
            .collect();
        ledger.import_tickets(tickets).await.unwrap();
    }

    #[tokio::test]
    async fn claim_consumes_ticket_and_counts_seat() {
        let ledger = ledger();
        seed(&ledger, 2).await;

        let (assignment, occupancy) = ledger
            .claim_seat("GALA-0001", "Guest 1", 1, ConsumeMode::Consume)
            .await
            .unwrap();
        assert_eq!(assignment.table_number, 1);
        assert_eq!(occupancy.occupied, 1);
        assert!(!occupancy.is_full);

        let ticket = ledger.lookup_ticket("GALA-0001").await.unwrap().unwrap();
        assert!(ticket.is_used);
        assert!(ticket.used_at.is_some());
    }

    #[tokio::test]
    async fn full_table_rejects_claim_without_consuming() {
        let ledger = ledger();
        seed(&ledger, 3).await;

        ledger
            .claim_seat("GALA-0001", "Guest 1", 1, ConsumeMode::Consume)
            .await
            .unwrap();
        ledger
            .claim_seat("GALA-0002", "Guest 2", 1, ConsumeMode::Consume)
            .await
            .unwrap();

        let err = ledger
            .claim_seat("GALA-0003", "Guest 3", 1, ConsumeMode::Consume)
            .await
            .unwrap_err();
        assert!(matches!(err, ClaimError::TableFull(1)));

        // Loser's ticket stays unconsumed.
        let ticket = ledger.lookup_ticket("GALA-0003").await.unwrap().unwrap();
        assert!(!ticket.is_used);
    }

    #[tokio::test]
    async fn consumed_ticket_cannot_claim_again() {
        let ledger = ledger();
        seed(&ledger, 1).await;

        ledger
            .claim_seat("GALA-0001", "Guest 1", 1, ConsumeMode::Consume)
            .await
            .unwrap();
        let err = ledger
            .claim_seat("GALA-0001", "Guest 1", 2, ConsumeMode::Consume)
            .await
            .unwrap_err();
        assert!(matches!(err, ClaimError::TicketAlreadyUsed(_)));
    }

    #[tokio::test]
    async fn delete_assignment_releases_ticket_when_last_seat_goes() {
        let ledger = ledger();
        seed(&ledger, 1).await;

        let (a1, _) = ledger
            .claim_seat("GALA-0001", "Guest 1", 1, ConsumeMode::Consume)
            .await
            .unwrap();
        let (a2, _) = ledger
            .claim_seat("GALA-0001", "Guest 1", 2, ConsumeMode::AlreadyHeld)
            .await
            .unwrap();

        ledger.delete_assignment(a1.id).await.unwrap();
        let ticket = ledger.lookup_ticket("GALA-0001").await.unwrap().unwrap();
        assert!(ticket.is_used, "other seat still references the ticket");

        ledger.delete_assignment(a2.id).await.unwrap();
        let ticket = ledger.lookup_ticket("GALA-0001").await.unwrap().unwrap();
        assert!(!ticket.is_used);
    }

    #[tokio::test]
    async fn import_skips_duplicates() {
        let ledger = ledger();
        seed(&ledger, 2).await;

        let inserted = ledger
            .import_tickets(vec![
                NewTicket {
                    ticket_number: "gala-0001".into(),
                    full_name: "Someone Else".into(),
                },
                NewTicket {
                    ticket_number: "GALA-0009".into(),
                    full_name: "Guest 9".into(),
                },
            ])
            .await
            .unwrap();
        assert_eq!(inserted, 1);

        let stats = ledger.ticket_stats().await.unwrap();
        assert_eq!(stats.total, 3);
    }
}
