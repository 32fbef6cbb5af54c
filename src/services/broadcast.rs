use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::models::TableDelta;

const BROADCAST_CAPACITY: usize = 256;

/// Occupancy change fanned out to connected observers.
#[derive(Debug, Clone)]
pub enum SeatingEvent {
    /// New occupancy for the tables touched by one allocation call.
    Deltas(Vec<TableDelta>),
    /// The whole chart changed (reset, release, block); observers should
    /// fetch a fresh snapshot.
    FullRefresh,
}

/// Fan-out of seating events over a tokio broadcast channel. The channel's
/// subscriber set doubles as the connection registry: subscribing and
/// dropping receivers is safe against a broadcast in flight, and a lagged
/// receiver recovers by requesting a fresh snapshot.
///
/// Per-table delta order matches commit order: a delta's occupied count is
/// computed inside the serialized claim transaction, so it is the table's
/// commit sequence. Publishers may still race between commit and publish;
/// the `published` guard drops any delta at or below the last count sent,
/// so observers never see a table's count go backwards.
#[derive(Clone)]
pub struct OccupancyBroadcaster {
    tx: broadcast::Sender<SeatingEvent>,
    // table number -> highest occupied count already published
    published: Arc<Mutex<HashMap<i32, i32>>>,
}

impl OccupancyBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            tx,
            published: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SeatingEvent> {
        self.tx.subscribe()
    }

    /// Best-effort delivery; with no observers connected the event is
    /// simply dropped. Filter and send happen under one lock so two racing
    /// publishers cannot interleave into an inverted order on the channel.
    pub fn publish_deltas(&self, deltas: Vec<TableDelta>) {
        if deltas.is_empty() {
            return;
        }
        let mut published = self.published.lock().unwrap_or_else(|e| e.into_inner());
        let fresh: Vec<TableDelta> = deltas
            .into_iter()
            .filter(|delta| {
                let stale = matches!(
                    published.get(&delta.table_number),
                    Some(&last) if delta.occupied <= last
                );
                if !stale {
                    published.insert(delta.table_number, delta.occupied);
                }
                !stale
            })
            .collect();
        if !fresh.is_empty() {
            let _ = self.tx.send(SeatingEvent::Deltas(fresh));
        }
    }

    /// Counts may drop after a reset or release; the refresh event makes
    /// observers re-snapshot, so the monotonic guard starts over.
    pub fn publish_refresh(&self) {
        let mut published = self.published.lock().unwrap_or_else(|e| e.into_inner());
        published.clear();
        let _ = self.tx.send(SeatingEvent::FullRefresh);
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for OccupancyBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
