pub mod assignment;
pub mod occupancy;
pub mod ticket;

pub use assignment::SeatAssignment;
pub use occupancy::{TableDelta, TableLayout, TableOccupancy};
pub use ticket::{NewTicket, Ticket, TicketStats};
