use thiserror::Error;

/// Infrastructure-level store failure. Transient: the same sub-request is
/// safe to retry because nothing was committed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Outcome of a single-table claim transaction. Everything except `Store`
/// is a clean rejection: the transaction rolled back without side effects.
#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("table {0} is full")]
    TableFull(i32),

    #[error("table {0} is blocked")]
    TableBlocked(i32, Option<String>),

    #[error("ticket {0} not found")]
    TicketNotFound(String),

    #[error("ticket {0} has already been used")]
    TicketAlreadyUsed(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Call-level allocation failure. Per-table rejections are not errors at
/// this level; they travel in the per-table result list instead.
#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("unknown ticket number: {0}")]
    TicketInvalid(String),

    #[error("ticket {0} has already been used")]
    TicketAlreadyUsed(String),

    #[error("no tables requested")]
    EmptyRequest,

    #[error("holder name must not be empty")]
    HolderNameRequired,

    #[error(transparent)]
    Persistence(#[from] StoreError),
}
