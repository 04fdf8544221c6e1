// src/engine.rs

use chrono::NaiveDate;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::activity_log::ActivityLog;
use crate::board_client::{BoardApi, BoardError, ColumnWrite};
use crate::lookup::{RecordLookup, DATE_FORMAT};
use crate::mapping::ColumnMapping;
use crate::model::{AttendanceEvent, AttendanceFlags, EntryAction};

pub const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Whether a repeated same-day action may overwrite an already-recorded
    /// time field. The original behavior is to overwrite; with `false` the
    /// engine drops the time write when the column already holds a value,
    /// at the cost of one extra narrow read on the update path.
    pub allow_time_overwrite: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            allow_time_overwrite: true,
        }
    }
}

/// Owns the at-most-one-record-per-(employee, date) invariant: always
/// query-before-write, never blind-insert, and update as a sparse partial
/// merge so previously-set fields survive.
///
/// No locking here. Two sessions racing the query-then-write sequence for
/// the same employee and date can both create; the surrounding collaborator
/// is expected to serialize submissions within one session, and the
/// cross-session race is an accepted limitation of the store.
#[derive(Clone)]
pub struct ReconciliationEngine {
    api: Arc<dyn BoardApi>,
    mapping: Option<ColumnMapping>,
    log: ActivityLog,
    options: EngineOptions,
}

impl ReconciliationEngine {
    pub fn new(api: Arc<dyn BoardApi>, mapping: Option<ColumnMapping>, log: ActivityLog) -> Self {
        Self::with_options(api, mapping, log, EngineOptions::default())
    }

    pub fn with_options(
        api: Arc<dyn BoardApi>,
        mapping: Option<ColumnMapping>,
        log: ActivityLog,
        options: EngineOptions,
    ) -> Self {
        Self {
            api,
            mapping,
            log,
            options,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.mapping.is_some()
    }

    pub fn activity_log(&self) -> &ActivityLog {
        &self.log
    }

    /// Records one attendance event: looks up today's record, then creates
    /// or updates it. Exactly one mutation is issued per call. Returns
    /// `true` only on an acknowledged remote write; any failure is logged
    /// and reported as `false`, never retried.
    pub async fn submit(&self, event: &AttendanceEvent) -> bool {
        let Some(mapping) = &self.mapping else {
            warn!("Submission rejected: column mapping is not configured.");
            self.log
                .push("Submission rejected: column mapping is not configured.");
            return false;
        };

        let date_text = event.date.format(DATE_FORMAT).to_string();
        self.log.push(format!(
            "Checking existing attendance record for employee '{}' on {}...",
            event.employee_id, date_text
        ));

        let lookup = RecordLookup::new(self.api.as_ref(), mapping);
        let existing = lookup
            .find_record_for_day(&event.employee_id, event.date)
            .await;

        let result = match existing {
            Some(record) => {
                self.log.push(format!(
                    "Updating existing attendance record (id {})...",
                    record.id
                ));
                self.update_record(mapping, &record.id, event).await
            }
            None => {
                self.log.push("Creating new attendance record...");
                self.create_record(mapping, event).await
            }
        };

        match result {
            Ok(id) => {
                info!(
                    "{} recorded for employee '{}' (record id {})",
                    event.action, event.employee_id, id
                );
                self.log.push(format!(
                    "{} recorded successfully (record id {}).",
                    event.action, id
                ));
                true
            }
            Err(e) => {
                error!(
                    "Failed to record {} for employee '{}': {}",
                    event.action, event.employee_id, e
                );
                self.log.push(format!(
                    "Failed to record {} for employee '{}': {}",
                    event.action, event.employee_id, e
                ));
                false
            }
        }
    }

    /// Projection of today's record into UI-gating flags. Never cached:
    /// recomputed after every successful submit and on every change of the
    /// active employee, since the remote record can change between calls.
    pub async fn derive_state(&self, employee_id: &str, today: NaiveDate) -> AttendanceFlags {
        let Some(mapping) = &self.mapping else {
            return AttendanceFlags::default();
        };

        let lookup = RecordLookup::new(self.api.as_ref(), mapping);
        let Some(record) = lookup.find_record_for_day(employee_id, today).await else {
            self.log.push("No attendance record found for today.");
            return AttendanceFlags::default();
        };

        match lookup.fetch_time_fields(&record.id).await {
            Ok(fields) => {
                self.log.push(format!(
                    "Login time: {}, Logout time: {}",
                    display_time(&fields.login_time),
                    display_time(&fields.logout_time)
                ));
                AttendanceFlags {
                    login_disabled: !fields.login_time.is_empty(),
                    logout_disabled: !fields.logout_time.is_empty(),
                }
            }
            Err(e) => {
                warn!(
                    "Failed to read time fields of record {}: {}. Leaving actions enabled.",
                    record.id, e
                );
                self.log
                    .push(format!("Failed to read time fields of record {}.", record.id));
                AttendanceFlags::default()
            }
        }
    }

    async fn create_record(
        &self,
        mapping: &ColumnMapping,
        event: &AttendanceEvent,
    ) -> Result<String, BoardError> {
        let writes = build_writes(mapping, event);
        let item_name = format!(
            "{} - {}",
            event.employee_id,
            event.date.format(DATE_FORMAT)
        );
        self.api
            .create_item(&mapping.board_id, &item_name, &writes)
            .await
    }

    async fn update_record(
        &self,
        mapping: &ColumnMapping,
        record_id: &str,
        event: &AttendanceEvent,
    ) -> Result<String, BoardError> {
        let mut writes = build_writes(mapping, event);

        if !self.options.allow_time_overwrite {
            let lookup = RecordLookup::new(self.api.as_ref(), mapping);
            let fields = lookup.fetch_time_fields(record_id).await?;
            let (time_column, already_set) = match event.action {
                EntryAction::Login => (&mapping.login_time, !fields.login_time.is_empty()),
                EntryAction::Logout => (&mapping.logout_time, !fields.logout_time.is_empty()),
            };
            if already_set {
                self.log.push(format!(
                    "{} time already recorded; leaving it untouched.",
                    event.action
                ));
                writes.retain(|w| &w.column_id != time_column);
            }
        }

        self.api
            .update_item(record_id, &mapping.board_id, &writes)
            .await
    }
}

/// Builds the sparse field-value payload for one event by walking the known
/// logical fields. Fields belonging to the opposite action are never
/// included, and a null location writes nothing, so the store's partial
/// merge leaves previously-set values alone.
pub fn build_writes(mapping: &ColumnMapping, event: &AttendanceEvent) -> Vec<ColumnWrite> {
    let mut writes = vec![
        ColumnWrite::text(&mapping.employee_id, &event.employee_id),
        ColumnWrite::text(&mapping.employee_name, &event.employee_name),
        ColumnWrite::text(&mapping.date, event.date.format(DATE_FORMAT).to_string()),
        ColumnWrite::text(&mapping.entry_type, event.action.as_str()),
    ];

    let time_text = event.time.format(TIME_FORMAT).to_string();
    match event.action {
        EntryAction::Login => {
            writes.push(ColumnWrite::text(&mapping.login_time, time_text));
            if let Some(loc) = &event.location {
                writes.push(ColumnWrite::json(
                    &mapping.location,
                    json!({ "lat": loc.lat, "lng": loc.lng }),
                ));
            }
        }
        EntryAction::Logout => {
            writes.push(ColumnWrite::text(&mapping.logout_time, time_text));
            if let Some(loc) = &event.location {
                writes.push(ColumnWrite::json(
                    &mapping.logout_location,
                    json!({ "lat": loc.lat, "lng": loc.lng }),
                ));
            }
        }
    }

    writes
}

fn display_time(text: &str) -> &str {
    if text.is_empty() {
        "not recorded"
    } else {
        text
    }
}
