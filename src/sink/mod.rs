//! Append-only reporting sink. One row lands here per foreground transition
//! while monitoring, plus per-activity aggregate rows written by the report
//! path. The sink client is constructed explicitly and handed to the monitor
//! so its connection lives exactly as long as the session.

pub mod sqlite;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};

/// Opaque identifiers every sink row is tagged with. Passed through from the
/// process arguments, never validated or interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIds {
    pub employee_id: String,
    pub organization_id: String,
}

/// Contract for the append-only reporting sink. Every write commits on its
/// own, there is no batching.
pub trait EventSink {
    /// Appends one row for a foreground transition.
    fn record_transition(
        &mut self,
        activity_title: &str,
        at: DateTime<Utc>,
        ids: &SessionIds,
    ) -> Result<()>;

    /// Appends one per-activity aggregate row for the given day.
    fn record_summary(
        &mut self,
        activity_title: &str,
        total_seconds: i64,
        date: NaiveDate,
        ids: &SessionIds,
    ) -> Result<()>;
}
