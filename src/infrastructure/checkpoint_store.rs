//! Checkpoint ledger persistence
//!
//! File format: JSON object mapping `"{row}-{col}"` to `true`.
//! A corrupted file never stops a run: it is quarantined under a timestamped
//! name and the run starts from an empty ledger.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::domain::{CellAddress, CheckpointLedger};
use crate::infrastructure::atomic_file::write_atomic;
use crate::infrastructure::errors::{StoreError, StoreResult};

/// What [`CheckpointStore::inspect`] found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerSnapshot {
    Missing,
    Corrupted { reason: String },
    Loaded(CheckpointLedger),
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the checkpoint without modifying anything on disk.
    pub async fn inspect(&self) -> LedgerSnapshot {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return LedgerSnapshot::Missing,
            Err(e) => {
                return LedgerSnapshot::Corrupted {
                    reason: format!("unreadable: {e}"),
                };
            }
        };

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => LedgerSnapshot::Loaded(self.ledger_from_map(&map)),
            Ok(_) => LedgerSnapshot::Corrupted {
                reason: "top level is not a JSON object".to_string(),
            },
            Err(e) => LedgerSnapshot::Corrupted {
                reason: e.to_string(),
            },
        }
    }

    /// Load the ledger. Missing file means empty ledger; a corrupted file is
    /// renamed to `<name>.corrupted.<unix-seconds>` and also yields an empty
    /// ledger. Only an I/O failure while quarantining is returned as an error.
    pub async fn load(&self) -> StoreResult<CheckpointLedger> {
        match self.inspect().await {
            LedgerSnapshot::Loaded(ledger) => Ok(ledger),
            LedgerSnapshot::Missing => {
                info!("No checkpoint at {:?}, starting with an empty ledger", self.path);
                Ok(CheckpointLedger::new())
            }
            LedgerSnapshot::Corrupted { reason } => {
                warn!("Corrupted checkpoint file {:?} ({}). Starting fresh.", self.path, reason);
                self.quarantine().await?;
                Ok(CheckpointLedger::new())
            }
        }
    }

    fn ledger_from_map(&self, map: &Map<String, Value>) -> CheckpointLedger {
        let mut ignored = 0usize;
        let ledger: CheckpointLedger = map
            .iter()
            .filter_map(|(key, flag)| {
                let parsed = key.parse::<CellAddress>().ok();
                match (parsed, flag) {
                    (Some(addr), Value::Bool(true)) => Some(addr),
                    _ => {
                        ignored += 1;
                        None
                    }
                }
            })
            .collect();

        if ignored > 0 {
            warn!(
                "Ignored {} checkpoint entries in {:?} with malformed keys or non-true flags",
                ignored, self.path
            );
        }
        info!("Loaded checkpoint {:?} with {} entries", self.path, ledger.len());
        ledger
    }

    async fn quarantine(&self) -> StoreResult<PathBuf> {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(format!(".corrupted.{}", Utc::now().timestamp()));
        let mut backup = self.path.with_file_name(&name);
        // same-second corruptions get a numeric suffix instead of overwriting
        let mut n = 1u32;
        while tokio::fs::try_exists(&backup)
            .await
            .map_err(|e| StoreError::io(&backup, e))?
        {
            let mut numbered = name.clone();
            numbered.push(format!(".{n}"));
            backup = self.path.with_file_name(numbered);
            n += 1;
        }

        tokio::fs::rename(&self.path, &backup)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        warn!("Backed up corrupted checkpoint to {:?}", backup);
        Ok(backup)
    }

    /// Atomically replace the checkpoint file with `ledger`.
    pub async fn save(&self, ledger: &CheckpointLedger) -> StoreResult<()> {
        let map: Map<String, Value> = ledger
            .iter()
            .map(|addr| (addr.to_string(), Value::Bool(true)))
            .collect();
        let bytes = serde_json::to_vec_pretty(&Value::Object(map)).map_err(|source| {
            StoreError::Json {
                path: self.path.clone(),
                source,
            }
        })?;
        write_atomic(&self.path, &bytes).await
    }

    /// Delete the checkpoint file. Returns whether a file was removed.
    pub async fn reset(&self) -> StoreResult<bool> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!("Checkpoint reset: removed {:?}", self.path);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(&self.path, e)),
        }
    }
}
