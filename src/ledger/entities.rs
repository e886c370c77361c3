use chrono::DateTime;
use chrono::Utc;

use serde::Deserialize;
use serde::Serialize;

use super::duration::Duration;

/// One closed interval of continuous foreground time attributed to a single
/// activity. Immutable once appended to a ledger.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct TimeEntry {
    #[serde(with = "ledger_ts")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "ledger_ts")]
    pub end_time: DateTime<Utc>,
    #[serde(flatten)]
    pub duration: Duration,
}

impl TimeEntry {
    /// Closes the interval `[start, end)` and derives its normalized
    /// duration. The duration is never set independently afterwards.
    pub fn close(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            end_time,
            duration: Duration::from_span(end_time - start_time),
        }
    }
}

/// A named bucket of time entries. Created on the first occurrence of a new
/// activity name, it only ever grows.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct Activity {
    pub name: String,
    pub time_entries: Vec<TimeEntry>,
}

/// The full persisted state: every activity seen so far, in first-seen order.
#[derive(PartialEq, Eq, Debug, Default, Serialize, Deserialize, Clone)]
pub struct ActivityLedger {
    pub activities: Vec<Activity>,
}

impl ActivityLedger {
    /// Appends an entry under `name`, creating the bucket on first sight.
    /// Names stay unique within the ledger.
    pub fn record(&mut self, name: &str, entry: TimeEntry) {
        match self.activities.iter_mut().find(|a| a.name == name) {
            Some(activity) => activity.time_entries.push(entry),
            None => self.activities.push(Activity {
                name: name.to_string(),
                time_entries: vec![entry],
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }
}

mod ledger_ts {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    use crate::utils::time::{format_timestamp, parse_timestamp};

    pub fn serialize<S>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_timestamp(*time))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_timestamp(&s).map_err(serde::de::Error::custom)
    }
}
