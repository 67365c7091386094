//! Client-facing services over the local database.

mod incidents;
mod outbox;

pub use incidents::IncidentService;
pub use outbox::LocalOutbox;
