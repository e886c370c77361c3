use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::{
    ledger::store::{JsonLedgerStore, LedgerStore},
    resolver::{ActivityResolver, GenericResolver},
    sink::{sqlite::SqliteSink, EventSink, SessionIds},
    utils::clock::{Clock, DefaultClock},
};

use tracker::Tracker;

pub mod args;
pub mod shutdown;
pub mod tracker;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub const LEDGER_FILE_NAME: &str = "activities.json";
pub const SINK_FILE_NAME: &str = "events.db";

/// Represents the starting point for a monitoring session.
pub async fn start_monitor(dir: PathBuf, session: SessionIds) -> Result<()> {
    std::env::set_current_dir("/")?;

    let resolver = GenericResolver::new()?;
    let sink = SqliteSink::open(&dir.join(SINK_FILE_NAME))?;
    let store = JsonLedgerStore::new(dir.join(LEDGER_FILE_NAME))?;

    let shutdown_token = CancellationToken::new();

    let tracker = create_tracker(resolver, sink, store, session, &shutdown_token, DefaultClock);

    let (_, tracking_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token),
        tracker.run(),
    );

    if let Err(tracking_result) = tracking_result {
        error!("Monitor loop got an error {:?}", tracking_result);
    }

    Ok(())
}

fn create_tracker<S: LedgerStore>(
    resolver: impl ActivityResolver + 'static,
    sink: impl EventSink + 'static,
    store: S,
    session: SessionIds,
    shutdown_token: &CancellationToken,
    clock: impl Clock,
) -> Tracker<S> {
    Tracker::new(
        Box::new(resolver),
        Box::new(sink),
        store,
        session,
        shutdown_token.clone(),
        DEFAULT_POLL_INTERVAL,
        Box::new(clock),
    )
}
