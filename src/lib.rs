//! Incremental sync of Action Network actions (petitions, events,
//! fundraising pages, advocacy campaigns, forms) into a local SQLite store.

pub mod actionnetwork;
pub mod budget;
pub mod config;
pub mod continuation;
pub mod db;
pub mod engine;
pub mod error;
pub mod mapper;
pub mod model;
pub mod status;

pub use engine::{DrainOutcome, InitReport, ItemOutcome, SyncEngine};
pub use error::{SyncError, SyncResult};
