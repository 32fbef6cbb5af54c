pub mod allocator;
pub mod broadcast;

pub use allocator::{AssignmentOutcome, SeatAllocator, SeatRequestStatus, TableResult};
pub use broadcast::{OccupancyBroadcaster, SeatingEvent};
