use serde::{Deserialize, Serialize};

/// Fixed room layout: tables are numbered 1..=total_tables, each with the
/// same seat capacity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TableLayout {
    pub total_tables: i32,
    pub seats_per_table: i32,
}

impl TableLayout {
    pub fn contains(&self, table_number: i32) -> bool {
        table_number >= 1 && table_number <= self.total_tables
    }

    pub fn table_numbers(&self) -> impl Iterator<Item = i32> {
        1..=self.total_tables
    }
}

/// Per-table occupancy, always derived from the assignment ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableOccupancy {
    pub table_number: i32,
    pub capacity: i32,
    pub occupied: i32,
    pub available: i32,
    pub is_full: bool,
    pub is_blocked: bool,
    pub block_reason: Option<String>,
}

impl TableOccupancy {
    pub fn new(table_number: i32, occupied: i32, capacity: i32) -> Self {
        Self {
            table_number,
            capacity,
            occupied,
            available: (capacity - occupied).max(0),
            is_full: occupied >= capacity,
            is_blocked: false,
            block_reason: None,
        }
    }

    pub fn blocked(mut self, reason: Option<String>) -> Self {
        self.is_blocked = true;
        self.block_reason = reason;
        self
    }

    /// Wire-level delta for this table's new occupancy.
    pub fn delta(&self) -> TableDelta {
        TableDelta {
            table_number: self.table_number,
            occupied: self.occupied,
            is_full: self.is_full,
        }
    }
}

/// Incremental occupancy change pushed to observers after a commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDelta {
    pub table_number: i32,
    pub occupied: i32,
    pub is_full: bool,
}
