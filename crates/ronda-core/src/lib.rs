//! ronda-core - Core library for Ronda
//!
//! This crate contains the incident models, the durable local outbox, the
//! sequence allocator, and the sync engine shared by the Ronda CLI and API.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod sequence;
pub mod services;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{IncidentCode, IncidentId, IncidentRecord};
