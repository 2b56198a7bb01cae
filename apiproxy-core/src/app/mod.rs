//! Application layer: request dispatching plus the two locally handled
//! exchanges, paginated enumeration and random-id reservation.

pub mod dispatch;
pub mod enumerate;
pub mod reserve;
