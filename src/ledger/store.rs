use std::{
    future::Future,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::Result;
use tokio::{fs, io::AsyncWriteExt};
use tracing::warn;

use super::entities::ActivityLedger;

/// Outcome of loading the persisted ledger. Absence and corruption are
/// ordinary states for the monitor, which starts fresh, but the report path
/// needs to tell them apart from a loaded document.
#[derive(Debug)]
pub enum LedgerLoad {
    Loaded(ActivityLedger),
    Absent,
    Corrupt,
}

/// Interface for abstracting storage of the ledger document.
pub trait LedgerStore {
    fn load(&self) -> impl Future<Output = Result<LedgerLoad>>;

    /// Replaces the persisted document with the given ledger state.
    fn save(&self, ledger: &ActivityLedger) -> impl Future<Output = Result<()>>;

    /// Resets the persisted document to a blank state.
    fn erase(&self) -> impl Future<Output = Result<()>>;
}

/// The main realization of [LedgerStore], a single JSON document on disk.
pub struct JsonLedgerStore {
    path: PathBuf,
}

impl JsonLedgerStore {
    pub fn new(path: PathBuf) -> Result<Self, std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|v| v.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl LedgerStore for JsonLedgerStore {
    async fn load(&self) -> Result<LedgerLoad> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(LedgerLoad::Absent),
            Err(e) => return Err(e.into()),
        };

        // An erased ledger is a zero length file, not an empty document.
        if contents.trim().is_empty() {
            return Ok(LedgerLoad::Absent);
        }

        match serde_json::from_str::<ActivityLedger>(&contents) {
            Ok(v) => Ok(LedgerLoad::Loaded(v)),
            Err(e) => {
                // Might happen after a shutdown cut a write short on storage
                // without atomic rename, or after manual edits.
                warn!("Ledger at {:?} holds illegal json: {e}", self.path);
                Ok(LedgerLoad::Corrupt)
            }
        }
    }

    async fn save(&self, ledger: &ActivityLedger) -> Result<()> {
        // The new contents land in a sibling file first and replace the
        // ledger through a rename, so a reader never observes a half written
        // document.
        let buffer = serde_json::to_vec_pretty(ledger)?;

        let temp = self.temp_path();
        let mut file = fs::File::create(&temp).await?;
        file.write_all(&buffer).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp, &self.path).await?;
        Ok(())
    }

    async fn erase(&self) -> Result<()> {
        fs::File::create(&self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use anyhow::Result;
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
    use tempfile::tempdir;

    use crate::ledger::entities::{ActivityLedger, TimeEntry};

    use super::{JsonLedgerStore, LedgerLoad, LedgerStore};

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);

    fn test_ledger() -> ActivityLedger {
        let start = Utc.from_utc_datetime(&TEST_START_DATE);
        let mut ledger = ActivityLedger::default();
        ledger.record(
            "editor",
            TimeEntry::close(start, start + chrono::Duration::seconds(10)),
        );
        ledger.record(
            "mail.example.com",
            TimeEntry::close(
                start + chrono::Duration::seconds(10),
                start + chrono::Duration::seconds(15),
            ),
        );
        ledger
    }

    #[tokio::test]
    async fn test_load_absent() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonLedgerStore::new(dir.path().join("activities.json"))?;

        assert!(matches!(store.load().await?, LedgerLoad::Absent));
        Ok(())
    }

    #[tokio::test]
    async fn test_save_load_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonLedgerStore::new(dir.path().join("activities.json"))?;
        let ledger = test_ledger();

        store.save(&ledger).await?;

        match store.load().await? {
            LedgerLoad::Loaded(restored) => assert_eq!(restored, ledger),
            other => panic!("Expected loaded ledger, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_save_leaves_no_temp_file() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonLedgerStore::new(dir.path().join("activities.json"))?;

        store.save(&test_ledger()).await?;
        store.save(&test_ledger()).await?;

        let files = fs::read_dir(dir.path())?.collect::<Vec<_>>();
        assert_eq!(files.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_load_corrupt() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("activities.json");
        fs::write(&path, "{\"activities\": [{\"name\"")?;
        let store = JsonLedgerStore::new(path)?;

        assert!(matches!(store.load().await?, LedgerLoad::Corrupt));
        Ok(())
    }

    #[tokio::test]
    async fn test_erased_ledger_loads_as_absent() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonLedgerStore::new(dir.path().join("activities.json"))?;

        store.save(&test_ledger()).await?;
        store.erase().await?;

        assert_eq!(fs::read(store.path())?.len(), 0);
        assert!(matches!(store.load().await?, LedgerLoad::Absent));
        Ok(())
    }
}
