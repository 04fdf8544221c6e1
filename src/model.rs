// src/model.rs

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The user action being recorded. The entry-type column on the board
/// mirrors the last action verbatim ("Login" / "Logout").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryAction {
    Login,
    Logout,
}

impl EntryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryAction::Login => "Login",
            EntryAction::Logout => "Logout",
        }
    }
}

impl fmt::Display for EntryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// One user-triggered attendance submission. Ephemeral: never persisted
/// as-is, only its fields feed the remote record.
#[derive(Debug, Clone)]
pub struct AttendanceEvent {
    pub employee_id: String,
    pub employee_name: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub action: EntryAction,
    pub location: Option<GeoPoint>,
}

/// A row on the remote board, as seen by the query layer: the opaque
/// store-assigned id plus the employee-id and date column texts echoed
/// back by the lookup. Logically keyed by (employee_id, date); the store
/// enforces no such constraint, the engine does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRecord {
    pub id: String,
    pub employee_id: String,
    pub date: String,
}

/// Login/logout time column texts of a known record. Unset columns are
/// the empty string, never absent, so boolean projection stays simple.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeFields {
    pub login_time: String,
    pub logout_time: String,
}

/// UI-gating flags derived from today's record. Advisory only: the engine
/// itself never forbids a re-submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttendanceFlags {
    pub login_disabled: bool,
    pub logout_disabled: bool,
}

/// Per-employee-per-day progression. No backward transitions, no undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceState {
    None,
    LoggedIn,
    LoggedInOut,
}

impl AttendanceState {
    pub fn from_time_fields(fields: &TimeFields) -> Self {
        match (
            fields.login_time.is_empty(),
            fields.logout_time.is_empty(),
        ) {
            (true, true) => AttendanceState::None,
            (false, true) => AttendanceState::LoggedIn,
            _ => AttendanceState::LoggedInOut,
        }
    }
}
