use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Durable record binding a consumed ticket to a table. The holder name is
/// denormalized at assignment time so the seating chart survives later
/// ticket edits.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SeatAssignment {
    pub id: Uuid,
    pub ticket_number: String,
    pub full_name: String,
    pub table_number: i32,
    pub assigned_at: DateTime<Utc>,
}
