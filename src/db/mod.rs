//! Database module: row models and SQL repositories.
//!
//! This module is split into two submodules:
//! - `model`: row view models returned by the queue repository.
//! - `repo`: SQL-only functions over the groups, queue, actions and options
//!   tables.
//!
//! External modules should import from `actionnetwork_sync::db`; the
//! repository API is re-exported here.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::QueueRow;
