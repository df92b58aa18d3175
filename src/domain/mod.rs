//! Entities, their state machines and the ports the workflows talk through.

pub mod appointment;
pub mod directory;
pub mod invoice;
pub mod job_card;
pub mod money;
pub mod ports;
