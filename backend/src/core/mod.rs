//! Simulation kernel: virtual time, the event calendar and the entity timer
//! contract.

pub mod calendar;
pub mod entity;
pub mod time;
