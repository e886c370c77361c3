use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::{
    ledger::{
        entities::{ActivityLedger, TimeEntry},
        store::{LedgerLoad, LedgerStore},
    },
    resolver::{ActivityResolver, Resolution},
    sink::{EventSink, SessionIds},
    utils::clock::Clock,
};

/// The polling state machine. Owns the in-memory ledger for the whole
/// session: polls the resolver on a fixed tick, appends a sink row on every
/// transition, closes the interval of the previous activity into the ledger
/// and persists it before polling continues.
pub struct Tracker<S: LedgerStore> {
    resolver: Box<dyn ActivityResolver>,
    sink: Box<dyn EventSink>,
    store: S,
    session: SessionIds,
    shutdown: CancellationToken,
    poll_interval: Duration,
    clock: Box<dyn Clock>,
}

impl<S: LedgerStore> Tracker<S> {
    pub fn new(
        resolver: Box<dyn ActivityResolver>,
        sink: Box<dyn EventSink>,
        store: S,
        session: SessionIds,
        shutdown: CancellationToken,
        poll_interval: Duration,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            resolver,
            sink,
            store,
            session,
            shutdown,
            poll_interval,
            clock,
        }
    }

    /// Executes the monitor event loop.
    pub async fn run(mut self) -> Result<()> {
        let mut ledger = self.load_or_start_empty().await;

        let mut start_time = self.clock.time();
        let mut current_activity = String::new();
        let mut first_cycle = true;

        let mut poll_point = self.clock.instant();
        loop {
            poll_point += self.poll_interval;

            match self.resolver.resolve_current_activity() {
                Ok(Resolution::Activity(name)) if name != current_activity => {
                    debug!("Transition from {current_activity:?} to {name:?}");
                    self.handle_transition(
                        &mut ledger,
                        &name,
                        &current_activity,
                        &mut start_time,
                        first_cycle,
                    )
                    .await;
                    first_cycle = false;
                    current_activity = name;
                }
                // Same activity as before, or a platform without window
                // introspection. No transition either way.
                Ok(_) => (),
                Err(e) => {
                    error!("Encountered an error during resolution {:?}", e)
                }
            }

            tokio::select! {
                // Cancellation ends the session. The interval that is still
                // open gets dropped, the accumulated ledger does not.
                _ = self.shutdown.cancelled() => {
                    self.persist(&ledger).await;
                    return Ok(())
                }
                _ = self.clock.sleep_until(poll_point) => ()
            }
        }
    }

    async fn handle_transition(
        &mut self,
        ledger: &mut ActivityLedger,
        new_name: &str,
        previous: &str,
        start_time: &mut DateTime<Utc>,
        first_cycle: bool,
    ) {
        let now = self.clock.time();

        // Every transition lands in the sink, even zero length flapping. A
        // failed write must not stall polling.
        if let Err(e) = self.sink.record_transition(new_name, now, &self.session) {
            error!("Failed to record transition in the sink {e:?}");
        }

        if !first_cycle {
            let entry = TimeEntry::close(*start_time, now);
            ledger.record(previous, entry);
            self.persist(ledger).await;
            *start_time = self.clock.time();
        }
    }

    /// A missing or unreadable ledger means tracking starts from scratch,
    /// never that the monitor refuses to run.
    async fn load_or_start_empty(&self) -> ActivityLedger {
        match self.store.load().await {
            Ok(LedgerLoad::Loaded(ledger)) => ledger,
            Ok(LedgerLoad::Absent) => ActivityLedger::default(),
            Ok(LedgerLoad::Corrupt) => {
                warn!("Previous ledger is corrupt, starting fresh");
                ActivityLedger::default()
            }
            Err(e) => {
                warn!("Failed to read previous ledger, starting fresh {e:?}");
                ActivityLedger::default()
            }
        }
    }

    /// A failed save is retried once and then surfaced in the log rather
    /// than stopping the loop.
    async fn persist(&self, ledger: &ActivityLedger) {
        if let Err(first) = self.store.save(ledger).await {
            warn!("Failed to persist ledger, retrying {first:?}");
            if let Err(second) = self.store.save(ledger).await {
                error!("Failed to persist ledger after retry {second:?}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
    use tempfile::tempdir;
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    use crate::{
        ledger::store::{JsonLedgerStore, LedgerLoad, LedgerStore},
        resolver::{MockActivityResolver, Resolution},
        sink::{EventSink, SessionIds},
        utils::{clock::Clock, logging::TEST_LOGGING},
    };

    use super::Tracker;

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);

    #[derive(Clone)]
    struct TestClock {
        start_time: DateTime<Utc>,
        reference: Instant,
    }

    impl TestClock {
        fn new() -> Self {
            Self {
                start_time: Utc.from_utc_datetime(&TEST_START_DATE),
                reference: Instant::now(),
            }
        }
    }

    #[async_trait]
    impl Clock for TestClock {
        fn time(&self) -> DateTime<Utc> {
            self.start_time + self.reference.elapsed()
        }

        fn instant(&self) -> Instant {
            Instant::now()
        }

        async fn sleep_until(&self, instant: Instant) {
            tokio::time::sleep_until(instant).await;
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        transitions: Arc<Mutex<Vec<(String, DateTime<Utc>)>>>,
        fail_writes: bool,
    }

    impl RecordingSink {
        fn recorded(&self) -> Vec<(String, DateTime<Utc>)> {
            self.transitions.lock().unwrap().clone()
        }
    }

    impl EventSink for RecordingSink {
        fn record_transition(
            &mut self,
            activity_title: &str,
            at: DateTime<Utc>,
            _ids: &SessionIds,
        ) -> Result<()> {
            if self.fail_writes {
                return Err(anyhow!("sink unavailable"));
            }
            self.transitions
                .lock()
                .unwrap()
                .push((activity_title.to_string(), at));
            Ok(())
        }

        fn record_summary(
            &mut self,
            _activity_title: &str,
            _total_seconds: i64,
            _date: chrono::NaiveDate,
            _ids: &SessionIds,
        ) -> Result<()> {
            Ok(())
        }
    }

    fn test_ids() -> SessionIds {
        SessionIds {
            employee_id: "e-17".into(),
            organization_id: "o-3".into(),
        }
    }

    /// Resolver scripted with one name per tick, holding the last name once
    /// the script runs out.
    fn scripted_resolver(script: Vec<&'static str>) -> MockActivityResolver {
        let mut resolver = MockActivityResolver::new();
        let mut remaining = script.into_iter();
        let mut last = "";
        resolver.expect_resolve_current_activity().returning(move || {
            if let Some(next) = remaining.next() {
                last = next;
            }
            Ok(Resolution::Activity(last.to_string()))
        });
        resolver
    }

    fn tracker_for(
        resolver: MockActivityResolver,
        sink: RecordingSink,
        store: JsonLedgerStore,
        shutdown: &CancellationToken,
        clock: TestClock,
    ) -> Tracker<JsonLedgerStore> {
        Tracker::new(
            Box::new(resolver),
            Box::new(sink),
            store,
            test_ids(),
            shutdown.clone(),
            Duration::from_secs(1),
            Box::new(clock),
        )
    }

    async fn run_for(tracker: Tracker<JsonLedgerStore>, ticks_ms: u64, shutdown: &CancellationToken) -> Result<()> {
        let (_, result) = tokio::join!(
            async {
                tokio::time::sleep(Duration::from_millis(ticks_ms)).await;
                shutdown.cancel()
            },
            tracker.run(),
        );
        result
    }

    async fn load_ledger(store: &JsonLedgerStore) -> crate::ledger::entities::ActivityLedger {
        match store.load().await.unwrap() {
            LedgerLoad::Loaded(v) => v,
            other => panic!("Expected a loaded ledger, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_accumulates_intervals_per_activity() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let store = JsonLedgerStore::new(dir.path().join("activities.json"))?;
        let sink = RecordingSink::default();
        let shutdown = CancellationToken::new();

        // Editor for 10 ticks, the browser domain for 5, Editor again for 3,
        // then a final activity that closes the last Editor interval.
        let mut script = vec!["Editor"; 10];
        script.extend(vec!["mail.example.com"; 5]);
        script.extend(vec!["Editor"; 3]);
        script.push("Shell");

        let tracker = tracker_for(
            scripted_resolver(script),
            sink.clone(),
            JsonLedgerStore::new(dir.path().join("activities.json"))?,
            &shutdown,
            TestClock::new(),
        );

        run_for(tracker, 19_500, &shutdown).await?;

        let ledger = load_ledger(&store).await;
        assert_eq!(ledger.activities.len(), 2);

        let editor = &ledger.activities[0];
        assert_eq!(editor.name, "Editor");
        let editor_seconds: Vec<_> = editor
            .time_entries
            .iter()
            .map(|e| e.duration.total_seconds())
            .collect();
        assert_eq!(editor_seconds, vec![10, 3]);

        let browser = &ledger.activities[1];
        assert_eq!(browser.name, "mail.example.com");
        assert_eq!(browser.time_entries.len(), 1);
        assert_eq!(browser.time_entries[0].duration.total_seconds(), 5);

        // One sink row per transition, stamped with the new name.
        let names: Vec<_> = sink.recorded().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["Editor", "mail.example.com", "Editor", "Shell"]);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_flapping_produces_events_and_separate_entries() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let store = JsonLedgerStore::new(dir.path().join("activities.json"))?;
        let sink = RecordingSink::default();
        let shutdown = CancellationToken::new();

        let tracker = tracker_for(
            scripted_resolver(vec!["a", "b", "a", "c"]),
            sink.clone(),
            JsonLedgerStore::new(dir.path().join("activities.json"))?,
            &shutdown,
            TestClock::new(),
        );

        run_for(tracker, 4_500, &shutdown).await?;

        let ledger = load_ledger(&store).await;
        assert_eq!(ledger.activities.len(), 2);
        assert_eq!(ledger.activities[0].name, "a");
        // The a->b->a flap merges into the existing bucket instead of
        // creating a duplicate, and b keeps its own near zero entry.
        assert_eq!(ledger.activities[0].time_entries.len(), 2);
        assert_eq!(ledger.activities[1].name, "b");
        assert_eq!(ledger.activities[1].time_entries.len(), 1);
        assert_eq!(ledger.activities[1].time_entries[0].duration.total_seconds(), 1);

        assert_eq!(sink.recorded().len(), 4);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_interruption_drops_open_interval() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let store = JsonLedgerStore::new(dir.path().join("activities.json"))?;
        let sink = RecordingSink::default();
        let shutdown = CancellationToken::new();

        let tracker = tracker_for(
            scripted_resolver(vec!["Editor"]),
            sink.clone(),
            JsonLedgerStore::new(dir.path().join("activities.json"))?,
            &shutdown,
            TestClock::new(),
        );

        run_for(tracker, 5_500, &shutdown).await?;

        // The only interval was still open at shutdown. It is dropped, not
        // guessed closed, and the persisted ledger is a valid empty document.
        let ledger = load_ledger(&store).await;
        assert!(ledger.is_empty());
        assert_eq!(sink.recorded().len(), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolver_errors_do_not_stop_polling() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let store = JsonLedgerStore::new(dir.path().join("activities.json"))?;
        let sink = RecordingSink::default();
        let shutdown = CancellationToken::new();

        let mut resolver = MockActivityResolver::new();
        let mut calls = 0u32;
        resolver.expect_resolve_current_activity().returning(move || {
            calls += 1;
            match calls {
                1..=2 => Err(anyhow!("introspection failed")),
                3 => Ok(Resolution::Unsupported),
                4 => Ok(Resolution::Activity("Editor".into())),
                _ => Ok(Resolution::Activity("Shell".into())),
            }
        });

        let tracker = tracker_for(
            resolver,
            sink.clone(),
            JsonLedgerStore::new(dir.path().join("activities.json"))?,
            &shutdown,
            TestClock::new(),
        );

        run_for(tracker, 6_500, &shutdown).await?;

        // Failed ticks resolve nothing, the loop keeps going and picks up
        // the transition once the resolver recovers. The interval still
        // counts from session start, the failed ticks don't move it.
        let ledger = load_ledger(&store).await;
        assert_eq!(ledger.activities.len(), 1);
        assert_eq!(ledger.activities[0].name, "Editor");
        assert_eq!(ledger.activities[0].time_entries[0].duration.total_seconds(), 4);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_failures_do_not_lose_ledger_time() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let store = JsonLedgerStore::new(dir.path().join("activities.json"))?;
        let sink = RecordingSink {
            fail_writes: true,
            ..RecordingSink::default()
        };
        let shutdown = CancellationToken::new();

        let tracker = tracker_for(
            scripted_resolver(vec!["Editor", "Editor", "Shell"]),
            sink.clone(),
            JsonLedgerStore::new(dir.path().join("activities.json"))?,
            &shutdown,
            TestClock::new(),
        );

        run_for(tracker, 3_500, &shutdown).await?;

        let ledger = load_ledger(&store).await;
        assert_eq!(ledger.activities.len(), 1);
        assert_eq!(ledger.activities[0].name, "Editor");
        assert!(sink.recorded().is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_corrupt_ledger_starts_fresh() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let path = dir.path().join("activities.json");
        std::fs::write(&path, "not json at all")?;
        let store = JsonLedgerStore::new(path.clone())?;
        let sink = RecordingSink::default();
        let shutdown = CancellationToken::new();

        let tracker = tracker_for(
            scripted_resolver(vec!["Editor", "Editor", "Shell"]),
            sink.clone(),
            JsonLedgerStore::new(path)?,
            &shutdown,
            TestClock::new(),
        );

        run_for(tracker, 3_500, &shutdown).await?;

        let ledger = load_ledger(&store).await;
        assert_eq!(ledger.activities.len(), 1);
        assert_eq!(ledger.activities[0].name, "Editor");
        Ok(())
    }
}
