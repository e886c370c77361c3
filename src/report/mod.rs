//! Builds the per-activity totals that get replayed into the sink when a
//! session is wrapped up.

use crate::ledger::entities::ActivityLedger;

/// Total recorded seconds for one activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityTotal {
    pub name: String,
    pub total_seconds: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSummary {
    pub totals: Vec<ActivityTotal>,
    pub grand_total_seconds: i64,
}

impl LedgerSummary {
    /// Wall clock style rendering of the grand total. Hours are unbounded
    /// here, a day and an hour of use displays as `25:00:00`. This differs
    /// from the ledger's own day folding and both renderings are kept.
    pub fn grand_total_display(&self) -> String {
        format!(
            "{:02}:{:02}:{:02}",
            self.grand_total_seconds / 3600,
            self.grand_total_seconds % 3600 / 60,
            self.grand_total_seconds % 60
        )
    }
}

/// Sums every activity's entries in raw seconds, in ledger order.
pub fn summarize(ledger: &ActivityLedger) -> LedgerSummary {
    let mut totals = Vec::with_capacity(ledger.activities.len());
    let mut grand_total_seconds = 0;

    for activity in &ledger.activities {
        let total_seconds: i64 = activity
            .time_entries
            .iter()
            .map(|entry| entry.duration.total_seconds())
            .sum();
        grand_total_seconds += total_seconds;
        totals.push(ActivityTotal {
            name: activity.name.clone(),
            total_seconds,
        });
    }

    LedgerSummary {
        totals,
        grand_total_seconds,
    }
}
