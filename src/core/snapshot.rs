//! Whole-ledger JSON snapshot used by the local-only persistence mode.
//!
//! The document is `{ "transactions": [...], "exchangeRates": {...} }`. It is read once
//! when the ledger opens and rewritten in full after every mutation. Writes go to a
//! sibling temporary file first and are then renamed over the snapshot, so a reader
//! never observes a half-written document.

use crate::{
    core::{currency::ExchangeRates, ledger::Transaction},
    errors::{Error, Result},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// Owned snapshot contents, as loaded from disk.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    /// Every transaction, in insertion order
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    /// Exchange rates in effect when the snapshot was written
    #[serde(default)]
    pub exchange_rates: ExchangeRates,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotView<'a> {
    transactions: &'a [Transaction],
    exchange_rates: &'a ExchangeRates,
}

/// Location of a snapshot document on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    /// Snapshot stored at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the snapshot document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the snapshot; `Ok(None)` when the file does not exist yet.
    ///
    /// # Errors
    /// Returns `Persistence` if the file cannot be read or is not a valid snapshot.
    pub fn load(&self) -> Result<Option<LedgerSnapshot>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::Persistence {
                    message: format!("Failed to read snapshot {:?}: {e}", self.path),
                });
            }
        };
        let snapshot = serde_json::from_str(&contents).map_err(|e| Error::Persistence {
            message: format!("Failed to parse snapshot {:?}: {e}", self.path),
        })?;
        debug!("Loaded ledger snapshot from {:?}", self.path);
        Ok(Some(snapshot))
    }

    /// Moves an unreadable snapshot to `<path>.corrupt-<timestamp>` so later saves
    /// cannot overwrite it. Returns where the document now lives.
    ///
    /// # Errors
    /// Returns `Persistence` if the file cannot be renamed.
    pub fn quarantine(&self) -> Result<PathBuf> {
        let mut target = self.path.clone().into_os_string();
        target.push(format!(".corrupt-{}", Utc::now().format("%Y%m%dT%H%M%S%.3fZ")));
        let target = PathBuf::from(target);

        fs::rename(&self.path, &target).map_err(|e| Error::Persistence {
            message: format!("Failed to move snapshot {:?} aside: {e}", self.path),
        })?;
        warn!("Moved unreadable snapshot {:?} to {target:?}", self.path);
        Ok(target)
    }

    /// Replaces the snapshot with `transactions` and `exchange_rates`.
    ///
    /// # Errors
    /// Returns `Persistence` if serialization, the temporary write or the rename fails.
    pub fn save(&self, transactions: &[Transaction], exchange_rates: &ExchangeRates) -> Result<()> {
        let view = SnapshotView {
            transactions,
            exchange_rates,
        };
        let json = serde_json::to_string_pretty(&view).map_err(|e| Error::Persistence {
            message: format!("Failed to serialize snapshot: {e}"),
        })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, json).map_err(|e| Error::Persistence {
            message: format!("Failed to write snapshot {tmp:?}: {e}"),
        })?;
        fs::rename(&tmp, &self.path).map_err(|e| Error::Persistence {
            message: format!("Failed to replace snapshot {:?}: {e}", self.path),
        })?;
        debug!(
            transactions = transactions.len(),
            "Wrote ledger snapshot to {:?}", self.path
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::currency::Currency;
    use crate::test_utils::{sample_transaction, temp_snapshot};

    #[test]
    fn test_missing_file_loads_as_none() {
        let (_dir, path) = temp_snapshot().unwrap();
        assert!(SnapshotFile::new(path).load().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let (_dir, path) = temp_snapshot().unwrap();
        let file = SnapshotFile::new(path);
        let mut rates = ExchangeRates::default();
        rates.set_rate(Currency::Egp, 50.25).unwrap();
        let transactions = vec![sample_transaction(100.0), sample_transaction(40.0)];

        file.save(&transactions, &rates).unwrap();
        let loaded = file.load().unwrap().unwrap();
        assert_eq!(loaded.transactions, transactions);
        assert_eq!(loaded.exchange_rates, rates);
    }

    #[test]
    fn test_document_uses_camel_case_keys() {
        let (_dir, path) = temp_snapshot().unwrap();
        let file = SnapshotFile::new(path);
        file.save(&[sample_transaction(10.0)], &ExchangeRates::default())
            .unwrap();

        let raw = fs::read_to_string(file.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(value["exchangeRates"]["USD"].is_number());
        assert_eq!(value["transactions"][0]["type"], "income");
        assert!(value["transactions"][0]["netAmount"].is_number());
    }

    #[test]
    fn test_corrupt_file_is_a_persistence_error() {
        let (_dir, path) = temp_snapshot().unwrap();
        fs::write(&path, "{ not json").unwrap();
        let result = SnapshotFile::new(&path).load();
        assert!(matches!(result, Err(Error::Persistence { .. })));
    }

    #[test]
    fn test_unknown_rate_codes_do_not_fail_the_load() {
        let (_dir, path) = temp_snapshot().unwrap();
        let file = SnapshotFile::new(&path);
        file.save(&[sample_transaction(10.0)], &ExchangeRates::default())
            .unwrap();
        let mut value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        value["exchangeRates"]["KWD"] = serde_json::json!(0.31);
        fs::write(&path, value.to_string()).unwrap();

        let loaded = file.load().unwrap().unwrap();
        assert_eq!(loaded.transactions.len(), 1);
        assert_eq!(loaded.exchange_rates, ExchangeRates::default());
    }

    #[test]
    fn test_quarantine_moves_the_file_aside() {
        let (dir, path) = temp_snapshot().unwrap();
        fs::write(&path, "{ not json").unwrap();

        let moved = SnapshotFile::new(&path).quarantine().unwrap();
        assert!(!path.exists());
        assert!(moved.starts_with(dir.path()));
        assert!(
            moved
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("ledger.json.corrupt-")
        );
        assert_eq!(fs::read_to_string(moved).unwrap(), "{ not json");
    }

    #[test]
    fn test_unwritable_location_is_a_persistence_error() {
        let file = SnapshotFile::new("/nonexistent-smm-ledger-dir/ledger.json");
        let result = file.save(&[], &ExchangeRates::default());
        assert!(matches!(result, Err(Error::Persistence { .. })));
    }
}
