use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_number: String,
    pub full_name: String,
    pub is_used: bool,
    pub used_at: Option<DateTime<Utc>>,
}

/// Ticket as it arrives from bulk import, before the ledger assigns state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTicket {
    pub ticket_number: String,
    pub full_name: String,
}

impl NewTicket {
    /// Ticket numbers are matched case-insensitively; the ledger stores them
    /// trimmed and uppercased.
    pub fn normalized(self) -> Self {
        Self {
            ticket_number: normalize_ticket_number(&self.ticket_number),
            full_name: self.full_name.trim().to_string(),
        }
    }
}

pub fn normalize_ticket_number(raw: &str) -> String {
    raw.trim().to_uppercase()
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TicketStats {
    pub total: i64,
    pub used: i64,
    pub available: i64,
}
