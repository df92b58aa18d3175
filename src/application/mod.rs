//! Application layer: the workflows that drive the domain through its ports.
//!
//! Operations that read an entity, check preconditions and write it back do
//! so while holding their workflow's write lock, so a failed precondition
//! never leaves a partial write behind. Pure inserts such as appointment
//! creation rely on the store's atomic insert instead.

pub mod appointments;
pub mod authorization;
pub mod billing;
pub mod job_cards;
pub mod notifications;
pub mod payments;
pub mod signature;
pub mod validation;
