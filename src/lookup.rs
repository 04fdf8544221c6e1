// src/lookup.rs

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::board_client::{BoardApi, BoardError, ColumnFilter};
use crate::mapping::ColumnMapping;
use crate::model::{AttendanceRecord, TimeFields};

/// Candidates past this page are not considered. A known scale limitation
/// of the lookup, not a failure condition.
pub const CANDIDATE_PAGE_LIMIT: usize = 50;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Record Query Layer: read-only lookups against the board, scoped to one
/// column mapping. Pure request/response, no mutation.
pub struct RecordLookup<'a> {
    api: &'a dyn BoardApi,
    mapping: &'a ColumnMapping,
}

impl<'a> RecordLookup<'a> {
    pub fn new(api: &'a dyn BoardApi, mapping: &'a ColumnMapping) -> Self {
        Self { api, mapping }
    }

    /// The unique record for (employee, date), or `None`.
    ///
    /// The remote filter may match loosely (text search), so candidates are
    /// re-matched exactly on both columns client-side; the first exact match
    /// wins. A query error degrades to `None` rather than propagating, which
    /// routes the caller to the create path — a documented correctness risk
    /// (a transient failure during an update scenario becomes a duplicate
    /// create).
    pub async fn find_record_for_day(
        &self,
        employee_id: &str,
        date: NaiveDate,
    ) -> Option<AttendanceRecord> {
        let date_text = date.format(DATE_FORMAT).to_string();
        let filters = [
            ColumnFilter::new(&self.mapping.employee_id, employee_id),
            ColumnFilter::new(&self.mapping.date, &date_text),
        ];
        let wanted = [self.mapping.employee_id.clone(), self.mapping.date.clone()];

        let items = match self
            .api
            .query_items(
                &self.mapping.board_id,
                &filters,
                &wanted,
                CANDIDATE_PAGE_LIMIT,
            )
            .await
        {
            Ok(items) => items,
            Err(e) => {
                warn!(
                    "Record query failed for employee '{}' on {}: {}. Treating as no record.",
                    employee_id, date_text, e
                );
                return None;
            }
        };

        debug!(
            "Record query for employee '{}' on {} returned {} candidate(s)",
            employee_id,
            date_text,
            items.len()
        );

        items
            .into_iter()
            .find(|item| {
                item.column_text(&self.mapping.employee_id) == employee_id
                    && item.column_text(&self.mapping.date) == date_text
            })
            .map(|item| AttendanceRecord {
                employee_id: item.column_text(&self.mapping.employee_id).to_string(),
                date: item.column_text(&self.mapping.date).to_string(),
                id: item.id,
            })
    }

    /// Login/logout time column texts of a known record. Unset columns
    /// resolve to the empty string.
    pub async fn fetch_time_fields(&self, record_id: &str) -> Result<TimeFields, BoardError> {
        let wanted = [
            self.mapping.login_time.clone(),
            self.mapping.logout_time.clone(),
        ];
        let columns = self.api.fetch_columns(record_id, &wanted).await?;

        let text_of = |column_id: &str| {
            columns
                .iter()
                .find(|cv| cv.id == column_id)
                .map(|cv| cv.text_or_empty().to_string())
                .unwrap_or_default()
        };

        Ok(TimeFields {
            login_time: text_of(&self.mapping.login_time),
            logout_time: text_of(&self.mapping.logout_time),
        })
    }
}
