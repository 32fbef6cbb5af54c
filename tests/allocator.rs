use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use uuid::Uuid;

use gala_seating::error::{AllocationError, ClaimError, StoreError};
use gala_seating::models::{
    NewTicket, SeatAssignment, TableLayout, TableOccupancy, Ticket, TicketStats,
};
use gala_seating::services::{SeatAllocator, SeatRequestStatus, SeatingEvent};
use gala_seating::store::{ConsumeMode, MemoryLedger, ResetReport, SeatLedger};

async fn allocator_with(layout: TableLayout, tickets: usize) -> SeatAllocator {
    let allocator = SeatAllocator::new(Arc::new(MemoryLedger::new(layout)), layout);
    let tickets = (1..=tickets)
        .map(|i| NewTicket {
            ticket_number: format!("GALA-{:04}", i),
            full_name: format!("Guest {}", i),
        })
        .collect();
    allocator.import_tickets(tickets).await.unwrap();
    allocator
}

fn ticket(i: usize) -> String {
    format!("GALA-{:04}", i)
}

#[tokio::test]
async fn no_overbooking_when_one_seat_remains() {
    let layout = TableLayout {
        total_tables: 3,
        seats_per_table: 2,
    };
    let allocator = allocator_with(layout, 10).await;

    // One seat left at table 1.
    allocator
        .assign_seats(&ticket(1), "Guest 1", &[1])
        .await
        .unwrap();

    let contenders = (2..=7).map(|i| {
        let allocator = allocator.clone();
        tokio::spawn(async move {
            allocator
                .assign_seats(&ticket(i), &format!("Guest {}", i), &[1])
                .await
                .unwrap()
        })
    });
    let outcomes: Vec<_> = join_all(contenders)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let assigned = outcomes.iter().filter(|o| o.assigned == 1).count();
    let full = outcomes
        .iter()
        .filter(|o| o.results[0].status == SeatRequestStatus::TableFull)
        .count();
    assert_eq!(assigned, 1);
    assert_eq!(full, 5);

    let snapshot = allocator.snapshot().await.unwrap();
    assert_eq!(snapshot[0].occupied, 2);
    assert!(snapshot[0].is_full);
}

#[tokio::test]
async fn duplicate_submissions_consume_ticket_exactly_once() {
    let layout = TableLayout {
        total_tables: 25,
        seats_per_table: 10,
    };
    let allocator = allocator_with(layout, 25).await;

    let calls = (1..=10).map(|table| {
        let allocator = allocator.clone();
        tokio::spawn(async move {
            allocator
                .assign_seats("GALA-0001", "Guest 1", &[table])
                .await
        })
    });
    let outcomes: Vec<_> = join_all(calls)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let mut winners = 0;
    let mut losers = 0;
    for outcome in outcomes {
        match outcome {
            Ok(o) if o.assigned == 1 => winners += 1,
            Ok(o) => {
                assert_eq!(o.assigned, 0);
                assert!(o
                    .results
                    .iter()
                    .all(|r| r.status == SeatRequestStatus::TicketAlreadyUsed));
                losers += 1;
            }
            Err(AllocationError::TicketAlreadyUsed(_)) => losers += 1,
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(losers, 9);

    let snapshot = allocator.snapshot().await.unwrap();
    let total_occupied: i32 = snapshot.iter().map(|t| t.occupied).sum();
    assert_eq!(total_occupied, 1);
}

#[tokio::test]
async fn snapshot_stays_consistent_after_concurrent_burst() {
    let layout = TableLayout {
        total_tables: 5,
        seats_per_table: 3,
    };
    let allocator = allocator_with(layout, 40).await;

    let calls = (1..=30).map(|i| {
        let allocator = allocator.clone();
        tokio::spawn(async move {
            let table = (i as i32 % 5) + 1;
            allocator
                .assign_seats(&ticket(i), &format!("Guest {}", i), &[table])
                .await
                .unwrap()
        })
    });
    join_all(calls).await;

    let snapshot = allocator.snapshot().await.unwrap();
    for table in &snapshot {
        assert!(
            table.occupied <= table.capacity,
            "table {} over capacity: {}/{}",
            table.table_number,
            table.occupied,
            table.capacity
        );
    }

    let committed = allocator.assignments().await.unwrap().len() as i32;
    let total_occupied: i32 = snapshot.iter().map(|t| t.occupied).sum();
    assert_eq!(total_occupied, committed);
    // 5 tables x 3 seats, 6 contenders each: every table fills up.
    assert_eq!(committed, 15);
}

#[tokio::test]
async fn partial_success_skips_full_table_and_keeps_siblings() {
    let layout = TableLayout {
        total_tables: 3,
        seats_per_table: 2,
    };
    let allocator = allocator_with(layout, 10).await;

    allocator
        .assign_seats(&ticket(1), "Guest 1", &[2])
        .await
        .unwrap();
    allocator
        .assign_seats(&ticket(2), "Guest 2", &[2])
        .await
        .unwrap();

    let outcome = allocator
        .assign_seats(&ticket(3), "Guest 3", &[1, 2, 3])
        .await
        .unwrap();

    assert_eq!(outcome.assigned, 2);
    assert!(!outcome.fully_assigned());
    assert!(matches!(
        outcome.results[0].status,
        SeatRequestStatus::Assigned { .. }
    ));
    assert_eq!(outcome.results[1].status, SeatRequestStatus::TableFull);
    assert!(matches!(
        outcome.results[2].status,
        SeatRequestStatus::Assigned { .. }
    ));

    let ticket3 = allocator.lookup_ticket(&ticket(3)).await.unwrap().unwrap();
    assert!(ticket3.is_used);
}

#[tokio::test]
async fn reset_is_idempotent() {
    let layout = TableLayout {
        total_tables: 3,
        seats_per_table: 2,
    };
    let allocator = allocator_with(layout, 10).await;

    for i in 1..=3 {
        allocator
            .assign_seats(&ticket(i), &format!("Guest {}", i), &[i as i32])
            .await
            .unwrap();
    }

    let first = allocator.reset_all().await.unwrap();
    assert_eq!(first.assignments_deleted, 3);
    assert_eq!(first.tickets_released, 3);

    let second = allocator.reset_all().await.unwrap();
    assert_eq!(second.assignments_deleted, 0);
    assert_eq!(second.tickets_released, 0);

    let snapshot = allocator.snapshot().await.unwrap();
    assert!(snapshot.iter().all(|t| t.occupied == 0 && !t.is_full));

    let stats = allocator.ticket_stats().await.unwrap();
    assert_eq!(stats.used, 0);
    assert_eq!(stats.available, stats.total);
}

#[tokio::test]
async fn live_observer_receives_delta_matching_snapshot() {
    let layout = TableLayout {
        total_tables: 3,
        seats_per_table: 2,
    };
    let allocator = allocator_with(layout, 10).await;
    let mut events = allocator.subscribe();

    allocator
        .assign_seats(&ticket(1), "Guest 1", &[2])
        .await
        .unwrap();

    let event = events.recv().await.unwrap();
    let SeatingEvent::Deltas(deltas) = event else {
        panic!("expected delta event, got {:?}", event);
    };
    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas[0].table_number, 2);
    assert_eq!(deltas[0].occupied, 1);
    assert!(!deltas[0].is_full);

    let snapshot = allocator.snapshot().await.unwrap();
    let table = &snapshot[1];
    assert_eq!(table.occupied, deltas[0].occupied);
    assert_eq!(table.is_full, deltas[0].is_full);
}

#[tokio::test]
async fn release_notifies_observers_and_frees_the_ticket() {
    let layout = TableLayout {
        total_tables: 3,
        seats_per_table: 2,
    };
    let allocator = allocator_with(layout, 10).await;
    let mut events = allocator.subscribe();

    allocator
        .assign_seats(&ticket(1), "Guest 1", &[1])
        .await
        .unwrap();
    assert!(matches!(
        events.recv().await.unwrap(),
        SeatingEvent::Deltas(_)
    ));

    let released = allocator.release_ticket(&ticket(1)).await.unwrap();
    assert!(released);
    assert!(matches!(
        events.recv().await.unwrap(),
        SeatingEvent::FullRefresh
    ));

    let ticket1 = allocator.lookup_ticket(&ticket(1)).await.unwrap().unwrap();
    assert!(!ticket1.is_used);

    let snapshot = allocator.snapshot().await.unwrap();
    assert_eq!(snapshot[0].occupied, 0);

    // The freed ticket can book again.
    let outcome = allocator
        .assign_seats(&ticket(1), "Guest 1", &[3])
        .await
        .unwrap();
    assert_eq!(outcome.assigned, 1);

    // Releasing a ticket with no seats is a clean not-found.
    let released = allocator.release_ticket(&ticket(2)).await.unwrap();
    assert!(!released);
}

#[tokio::test]
async fn blocked_table_rejects_claims_until_unblocked() {
    let layout = TableLayout {
        total_tables: 3,
        seats_per_table: 2,
    };
    let allocator = allocator_with(layout, 10).await;

    assert!(allocator
        .block_table(2, Some("Head table".to_string()))
        .await
        .unwrap());
    // Double block reports the conflict.
    assert!(!allocator.block_table(2, None).await.unwrap());

    let outcome = allocator
        .assign_seats(&ticket(1), "Guest 1", &[2])
        .await
        .unwrap();
    assert_eq!(
        outcome.results[0].status,
        SeatRequestStatus::TableBlocked {
            reason: Some("Head table".to_string())
        }
    );

    // A rejected claim never consumes the ticket.
    let ticket1 = allocator.lookup_ticket(&ticket(1)).await.unwrap().unwrap();
    assert!(!ticket1.is_used);

    let snapshot = allocator.snapshot().await.unwrap();
    assert!(snapshot[1].is_blocked);
    assert_eq!(snapshot[1].block_reason.as_deref(), Some("Head table"));

    assert!(allocator.unblock_table(2).await.unwrap());
    let outcome = allocator
        .assign_seats(&ticket(1), "Guest 1", &[2])
        .await
        .unwrap();
    assert_eq!(outcome.assigned, 1);
}

#[tokio::test]
async fn out_of_range_tables_are_rejected_per_table() {
    let layout = TableLayout {
        total_tables: 3,
        seats_per_table: 2,
    };
    let allocator = allocator_with(layout, 10).await;

    let outcome = allocator
        .assign_seats(&ticket(1), "Guest 1", &[0, 99, 1])
        .await
        .unwrap();

    assert_eq!(outcome.results[0].status, SeatRequestStatus::InvalidTable);
    assert_eq!(outcome.results[1].status, SeatRequestStatus::InvalidTable);
    assert!(matches!(
        outcome.results[2].status,
        SeatRequestStatus::Assigned { .. }
    ));
    assert_eq!(outcome.assigned, 1);
}

#[tokio::test]
async fn request_validation_rejects_bad_input() {
    let layout = TableLayout {
        total_tables: 3,
        seats_per_table: 2,
    };
    let allocator = allocator_with(layout, 10).await;

    let err = allocator
        .assign_seats("NOPE-1234", "Guest", &[1])
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::TicketInvalid(_)));

    let err = allocator
        .assign_seats(&ticket(1), "   ", &[1])
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::HolderNameRequired));

    let err = allocator
        .assign_seats(&ticket(1), "Guest 1", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::EmptyRequest));
}

#[tokio::test]
async fn ticket_numbers_are_normalized() {
    let layout = TableLayout {
        total_tables: 3,
        seats_per_table: 2,
    };
    let allocator = allocator_with(layout, 10).await;

    let outcome = allocator
        .assign_seats("  gala-0001 ", "Guest 1", &[1])
        .await
        .unwrap();
    assert_eq!(outcome.ticket_number, "GALA-0001");
    assert_eq!(outcome.assigned, 1);

    let err = allocator
        .assign_seats("GALA-0001", "Guest 1", &[2])
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::TicketAlreadyUsed(_)));
}

#[tokio::test]
async fn deltas_for_one_table_arrive_in_commit_order() {
    let layout = TableLayout {
        total_tables: 1,
        seats_per_table: 64,
    };
    let allocator = allocator_with(layout, 64).await;
    let mut events = allocator.subscribe();

    let calls = (1..=64).map(|i| {
        let allocator = allocator.clone();
        tokio::spawn(async move {
            allocator
                .assign_seats(&ticket(i), &format!("Guest {}", i), &[1])
                .await
                .unwrap()
        })
    });
    join_all(calls).await;

    // Every publish happened before the calls returned; drain what reached
    // the channel and check the observed counts never run backwards.
    let mut observed = Vec::new();
    while let Ok(event) = events.try_recv() {
        let SeatingEvent::Deltas(deltas) = event else {
            panic!("unexpected event: {:?}", event);
        };
        for delta in deltas {
            assert_eq!(delta.table_number, 1);
            observed.push(delta.occupied);
        }
    }

    assert!(!observed.is_empty());
    for pair in observed.windows(2) {
        assert!(
            pair[0] < pair[1],
            "delta delivered out of commit order: {:?}",
            observed
        );
    }
    // The last delivered delta is the freshest committed count.
    let snapshot = allocator.snapshot().await.unwrap();
    assert_eq!(*observed.last().unwrap(), snapshot[0].occupied);
    assert_eq!(snapshot[0].occupied, 64);
}

#[tokio::test]
async fn party_can_split_across_tables_on_one_ticket_call() {
    let layout = TableLayout {
        total_tables: 3,
        seats_per_table: 2,
    };
    let allocator = allocator_with(layout, 10).await;

    let outcome = allocator
        .assign_seats(&ticket(1), "Guest 1", &[1, 1, 2])
        .await
        .unwrap();
    assert_eq!(outcome.assigned, 3);
    assert!(outcome.fully_assigned());

    let snapshot = allocator.snapshot().await.unwrap();
    assert_eq!(snapshot[0].occupied, 2);
    assert!(snapshot[0].is_full);
    assert_eq!(snapshot[1].occupied, 1);
}

/// Ledger wrapper that injects store failures: claims on one table fail,
/// and ticket lookups can be made to fail for the whole call.
struct FlakyLedger {
    inner: MemoryLedger,
    failing_table: AtomicI32,
    fail_lookups: AtomicBool,
}

impl FlakyLedger {
    fn new(layout: TableLayout) -> Self {
        Self {
            inner: MemoryLedger::new(layout),
            failing_table: AtomicI32::new(-1),
            fail_lookups: AtomicBool::new(false),
        }
    }

    fn fail_claims_on(&self, table_number: i32) {
        self.failing_table.store(table_number, Ordering::SeqCst);
    }

    fn store_failure() -> StoreError {
        StoreError::Database(sqlx::Error::PoolTimedOut)
    }
}

#[async_trait]
impl SeatLedger for FlakyLedger {
    async fn lookup_ticket(&self, ticket_number: &str) -> Result<Option<Ticket>, StoreError> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(Self::store_failure());
        }
        self.inner.lookup_ticket(ticket_number).await
    }

    async fn claim_seat(
        &self,
        ticket_number: &str,
        full_name: &str,
        table_number: i32,
        mode: ConsumeMode,
    ) -> Result<(SeatAssignment, TableOccupancy), ClaimError> {
        if self.failing_table.load(Ordering::SeqCst) == table_number {
            return Err(ClaimError::Store(Self::store_failure()));
        }
        self.inner
            .claim_seat(ticket_number, full_name, table_number, mode)
            .await
    }

    async fn release_ticket(&self, ticket_number: &str) -> Result<bool, StoreError> {
        self.inner.release_ticket(ticket_number).await
    }

    async fn delete_assignment(&self, id: Uuid) -> Result<Option<String>, StoreError> {
        self.inner.delete_assignment(id).await
    }

    async fn snapshot(&self) -> Result<Vec<TableOccupancy>, StoreError> {
        self.inner.snapshot().await
    }

    async fn assignments(&self) -> Result<Vec<SeatAssignment>, StoreError> {
        self.inner.assignments().await
    }

    async fn find_assignments(&self, ticket_number: &str) -> Result<Vec<SeatAssignment>, StoreError> {
        self.inner.find_assignments(ticket_number).await
    }

    async fn import_tickets(&self, tickets: Vec<NewTicket>) -> Result<u64, StoreError> {
        self.inner.import_tickets(tickets).await
    }

    async fn ticket_stats(&self) -> Result<TicketStats, StoreError> {
        self.inner.ticket_stats().await
    }

    async fn block_table(&self, table_number: i32, reason: Option<String>) -> Result<bool, StoreError> {
        self.inner.block_table(table_number, reason).await
    }

    async fn unblock_table(&self, table_number: i32) -> Result<bool, StoreError> {
        self.inner.unblock_table(table_number).await
    }

    async fn reset_all(&self) -> Result<ResetReport, StoreError> {
        self.inner.reset_all().await
    }
}

#[tokio::test]
async fn store_failure_rolls_back_one_claim_and_spares_siblings() {
    let layout = TableLayout {
        total_tables: 3,
        seats_per_table: 2,
    };
    let ledger = Arc::new(FlakyLedger::new(layout));
    let allocator = SeatAllocator::new(ledger.clone(), layout);
    allocator
        .import_tickets(vec![
            NewTicket {
                ticket_number: ticket(1),
                full_name: "Guest 1".into(),
            },
            NewTicket {
                ticket_number: ticket(2),
                full_name: "Guest 2".into(),
            },
        ])
        .await
        .unwrap();

    ledger.fail_claims_on(2);
    let outcome = allocator
        .assign_seats(&ticket(1), "Guest 1", &[1, 2, 3])
        .await
        .unwrap();

    assert!(matches!(
        outcome.results[0].status,
        SeatRequestStatus::Assigned { .. }
    ));
    assert_eq!(outcome.results[1].status, SeatRequestStatus::PersistenceError);
    assert!(matches!(
        outcome.results[2].status,
        SeatRequestStatus::Assigned { .. }
    ));
    assert_eq!(outcome.assigned, 2);

    // The failed claim committed nothing at table 2.
    let snapshot = allocator.snapshot().await.unwrap();
    assert_eq!(snapshot[1].occupied, 0);

    // Transient failure: once the store recovers, the same sub-request
    // succeeds for another caller.
    ledger.fail_claims_on(-1);
    let outcome = allocator
        .assign_seats(&ticket(2), "Guest 2", &[2])
        .await
        .unwrap();
    assert_eq!(outcome.assigned, 1);
}

#[tokio::test]
async fn lookup_failure_fails_the_whole_call() {
    let layout = TableLayout {
        total_tables: 3,
        seats_per_table: 2,
    };
    let ledger = Arc::new(FlakyLedger::new(layout));
    let allocator = SeatAllocator::new(ledger.clone(), layout);
    allocator
        .import_tickets(vec![NewTicket {
            ticket_number: ticket(1),
            full_name: "Guest 1".into(),
        }])
        .await
        .unwrap();

    ledger.fail_lookups.store(true, Ordering::SeqCst);
    let err = allocator
        .assign_seats(&ticket(1), "Guest 1", &[1])
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::Persistence(_)));

    ledger.fail_lookups.store(false, Ordering::SeqCst);
    let outcome = allocator
        .assign_seats(&ticket(1), "Guest 1", &[1])
        .await
        .unwrap();
    assert_eq!(outcome.assigned, 1);
}
