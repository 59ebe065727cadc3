//! Reservation matching
//!
//! Purchased-capacity records and the index that assigns running resources
//! to them under a capacity bound.

mod index;
mod record;

pub use index::ReservationIndex;
pub use record::{ReservationDescriptor, ReservationRecord, ReservationScope, ReservationSummary};
