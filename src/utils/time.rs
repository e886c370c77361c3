use chrono::{DateTime, NaiveDateTime, ParseError, Utc};

/// This is the standard way of formatting a timestamp in timekeep. The ledger
/// document and the sink both store timestamps in this form.
pub const LEDGER_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.format(LEDGER_TIME_FORMAT).to_string()
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, ParseError> {
    Ok(NaiveDateTime::parse_from_str(value, LEDGER_TIME_FORMAT)?.and_utc())
}
