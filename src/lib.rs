// src/lib.rs

//! Daily attendance-recording client for a remote tabular board.
//!
//! One record per employee per day: each Login/Logout submission is
//! reconciled against the board by querying first and then creating or
//! partially updating the found record, never blind-inserting.

pub mod activity_log;
pub mod board_client;
pub mod engine;
pub mod geo;
pub mod lookup;
pub mod mapping;
pub mod model;

#[cfg(test)]
mod engine_tests;

pub use activity_log::ActivityLog;
pub use board_client::{BoardApi, BoardClient, BoardError};
pub use engine::{EngineOptions, ReconciliationEngine};
pub use mapping::{ColumnMapping, MappingStore};
pub use model::{AttendanceEvent, AttendanceFlags, EntryAction, GeoPoint};
