use serde::{Deserialize, Serialize};

/// Elapsed time of a completed interval, normalized into calendar components.
/// `hours` absorbs whole days, so a 25 hour interval carries `days: 1,
/// hours: 25`. The ledger format keeps both fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Duration {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl Duration {
    /// Normalizes a total second count. The result depends only on the
    /// count, so renormalizing a normalized value changes nothing.
    pub fn from_total_seconds(total_seconds: i64) -> Self {
        let total_seconds = total_seconds.max(0);
        let days = total_seconds / 86_400;
        let day_remainder = total_seconds % 86_400;
        Self {
            days,
            hours: days * 24 + day_remainder / 3600,
            minutes: day_remainder % 3600 / 60,
            seconds: day_remainder % 60,
        }
    }

    pub fn from_span(span: chrono::Duration) -> Self {
        Self::from_total_seconds(span.num_seconds())
    }

    /// Raw second count the way the summary counts it: `days` is already
    /// folded into `hours` and must not be counted again.
    pub fn total_seconds(&self) -> i64 {
        self.hours * 3600 + self.minutes * 60 + self.seconds
    }
}
