use std::path::Path;

use anyhow::{bail, Result};
use chrono::Local;

use crate::{
    ledger::store::{JsonLedgerStore, LedgerLoad, LedgerStore},
    monitor::{LEDGER_FILE_NAME, SINK_FILE_NAME},
    report::summarize,
    sink::{sqlite::SqliteSink, EventSink, SessionIds},
};

/// Command to process `report`. Reads the persisted ledger, prints the
/// per-activity totals and replays them into the sink, dated with the
/// current day.
pub async fn process_report_command(dir: &Path, session: &SessionIds) -> Result<()> {
    let store = JsonLedgerStore::new(dir.join(LEDGER_FILE_NAME))?;

    // Unlike the monitor, reporting has nothing to do without a ledger. The
    // ledger file itself is left untouched either way.
    let ledger = match store.load().await? {
        LedgerLoad::Loaded(v) => v,
        LedgerLoad::Absent => bail!("No recorded activity to summarize"),
        LedgerLoad::Corrupt => bail!("Recorded activity is unreadable"),
    };

    let summary = summarize(&ledger);
    let today = Local::now().date_naive();

    let mut sink = SqliteSink::open(&dir.join(SINK_FILE_NAME))?;
    for total in &summary.totals {
        sink.record_summary(&total.name, total.total_seconds, today, session)?;
        println!("{}\t{}s", total.name, total.total_seconds);
    }
    println!("Time used : {}", summary.grand_total_display());
    Ok(())
}
