//! Credential store: the pool's durable state
//!
//! Holds the ordered key list, the active index, per-key usage for the
//! current accounting day, and the day usage was last zeroed. Every public
//! operation first runs the daily freshness check, then reads or mutates
//! under one tokio Mutex, and every mutation is written to disk before the
//! lock is released.
//!
//! Disk problems never reach callers. A missing or malformed snapshot loads
//! as an empty pool; a failed write is logged and counted, and the in-memory
//! state stays authoritative for the rest of the process.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use common::Credential;
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::clock::{Clock, LocalClock};
use crate::error::{Error, Result};
use crate::state::{DAY_FORMAT, PoolState, Snapshot};

/// Read-only summary of the pool for status reports.
///
/// `current_key` is already redacted. `usage` holds the full mapping; its
/// keys render redacted through `Credential`'s Display.
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub keys: usize,
    pub current_key: Option<String>,
    pub usage: HashMap<Credential, u64>,
    pub last_reset: NaiveDate,
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "API Key Status:")?;
        writeln!(f, "  Keys configured: {}", self.keys)?;
        writeln!(
            f,
            "  Current key: {}",
            self.current_key.as_deref().unwrap_or("none")
        )?;
        if self.usage.is_empty() {
            writeln!(f, "  Usage today: none")?;
        } else {
            writeln!(f, "  Usage today:")?;
            let mut entries: Vec<(&Credential, &u64)> = self.usage.iter().collect();
            entries.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.redacted().cmp(&b.0.redacted())));
            for (credential, count) in entries {
                writeln!(f, "    {credential}: {count}")?;
            }
        }
        write!(f, "  Last reset: {}", self.last_reset.format(DAY_FORMAT))
    }
}

/// One row of the masked key listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialSummary {
    pub index: usize,
    pub masked: String,
    pub requests_today: u64,
    pub active: bool,
}

/// Persistent pool of API credentials.
///
/// Cheap to share behind an `Arc`; all state sits behind one Mutex so
/// concurrent callers in a process always agree on a single active key.
pub struct CredentialStore {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    state: Mutex<PoolState>,
}

impl CredentialStore {
    /// Load the pool from `path`, using the host's local calendar day.
    pub async fn load(path: PathBuf) -> Self {
        Self::load_with_clock(path, Arc::new(LocalClock)).await
    }

    /// Load the pool from `path` with an explicit accounting-day clock.
    ///
    /// Never fails: a missing, unreadable or malformed snapshot yields an
    /// empty pool. If the snapshot is from an earlier day its usage is zeroed
    /// and the result written back immediately.
    pub async fn load_with_clock(path: PathBuf, clock: Arc<dyn Clock>) -> Self {
        let today = clock.today();
        let mut state = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => match serde_json::from_str::<Snapshot>(&contents) {
                Ok(snapshot) => {
                    let state = PoolState::from_snapshot(snapshot);
                    info!(
                        path = %path.display(),
                        credentials = state.credentials.len(),
                        "loaded credential pool"
                    );
                    state
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "pool snapshot is malformed, starting with empty pool"
                    );
                    PoolState::empty(today)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "pool snapshot not found, starting with empty pool");
                PoolState::empty(today)
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "pool snapshot unreadable, starting with empty pool"
                );
                PoolState::empty(today)
            }
        };

        if state.ensure_fresh_day(today) {
            info!(day = %today, "new accounting day, usage reset");
            persist(&path, &state).await;
        }

        Self {
            path,
            clock,
            state: Mutex::new(state),
        }
    }

    /// Snapshot file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Zero all usage if the accounting day changed since the last reset.
    ///
    /// Idempotent; every other public operation runs it first. Returns whether
    /// a reset happened.
    pub async fn ensure_fresh_day(&self) -> bool {
        let mut state = self.state.lock().await;
        self.roll_day(&mut state).await
    }

    /// Append a credential to the pool.
    ///
    /// Returns `Ok(false)` when the exact value is already present (no-op) and
    /// `Err(EmptyCredential)` for empty or whitespace-only input.
    pub async fn add(&self, credential: impl Into<Credential>) -> Result<bool> {
        let credential = credential.into();
        if credential.is_blank() {
            return Err(Error::EmptyCredential);
        }

        let mut state = self.lock_fresh().await;
        if state.credentials.contains(&credential) {
            debug!(credential = %credential, "credential already in pool");
            return Ok(false);
        }
        info!(
            credential = %credential,
            index = state.credentials.len(),
            "credential added to pool"
        );
        state.credentials.push(credential);
        persist(&self.path, &state).await;
        Ok(true)
    }

    /// Remove the credential at `index`, returning it.
    ///
    /// An active index at or after the removed slot steps back by one
    /// (stopping at zero), so it stays valid. The removed key's usage entry
    /// is dropped with it.
    pub async fn remove(&self, index: usize) -> Result<Credential> {
        let mut state = self.lock_fresh().await;
        let len = state.credentials.len();
        if index >= len {
            return Err(Error::IndexOutOfRange { index, len });
        }

        let removed = state.credentials.remove(index);
        if state.active_index >= index {
            state.active_index = state.active_index.saturating_sub(1);
        }
        state.usage.remove(removed.expose());
        info!(credential = %removed, index, "credential removed from pool");
        persist(&self.path, &state).await;
        Ok(removed)
    }

    /// The active credential, or `None` for an empty pool.
    pub async fn current(&self) -> Option<Credential> {
        self.lock_fresh().await.current().cloned()
    }

    /// Count one request against `credential` and return its new total.
    ///
    /// Usage is tracked by value: a key that is not a pool member is counted
    /// too (it may have been supplied out of band) but never joins the pool.
    pub async fn record_usage(&self, credential: &str) -> u64 {
        let mut state = self.lock_fresh().await;
        let count = {
            let entry = state.usage.entry(Credential::new(credential)).or_insert(0);
            *entry += 1;
            *entry
        };
        persist(&self.path, &state).await;
        count
    }

    /// Requests recorded against `credential` today.
    pub async fn usage_of(&self, credential: &str) -> u64 {
        self.lock_fresh().await.usage_of(credential)
    }

    /// Pool members with today's usage, in pool order.
    pub async fn usage_by_credential(&self) -> Vec<(Credential, u64)> {
        let state = self.lock_fresh().await;
        state
            .credentials
            .iter()
            .map(|c| (c.clone(), state.usage_of(c.expose())))
            .collect()
    }

    /// Make the least used credential active and return it.
    ///
    /// Ties go to the lowest index. With fewer than two credentials there is
    /// nothing to choose: the current one (if any) is returned and nothing is
    /// written.
    pub async fn select_least_used(&self) -> Option<Credential> {
        let mut state = self.lock_fresh().await;
        if state.credentials.len() <= 1 {
            return state.current().cloned();
        }

        let index = state.least_used_index()?;
        let previous = state.active_index;
        state.active_index = index;
        persist(&self.path, &state).await;

        let selected = state.current().cloned();
        if previous != index {
            debug!(from = previous, to = index, "active index moved to least used credential");
        }
        selected
    }

    /// Redacted summary for status reports.
    pub async fn stats(&self) -> PoolStats {
        let state = self.lock_fresh().await;
        PoolStats {
            keys: state.credentials.len(),
            current_key: state.current().map(Credential::redacted),
            usage: state.usage.clone(),
            last_reset: state.last_reset.unwrap_or_else(|| self.clock.today()),
        }
    }

    /// Masked listing of every pool member.
    pub async fn list(&self) -> Vec<CredentialSummary> {
        let state = self.lock_fresh().await;
        state
            .credentials
            .iter()
            .enumerate()
            .map(|(index, c)| CredentialSummary {
                index,
                masked: c.masked(),
                requests_today: state.usage_of(c.expose()),
                active: index == state.active_index,
            })
            .collect()
    }

    /// Number of credentials in the pool.
    pub async fn len(&self) -> usize {
        self.state.lock().await.credentials.len()
    }

    /// Whether the pool is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn lock_fresh(&self) -> MutexGuard<'_, PoolState> {
        let mut state = self.state.lock().await;
        self.roll_day(&mut state).await;
        state
    }

    async fn roll_day(&self, state: &mut PoolState) -> bool {
        let today = self.clock.today();
        if !state.ensure_fresh_day(today) {
            return false;
        }
        info!(day = %today, "new accounting day, usage reset");
        persist(&self.path, state).await;
        true
    }
}

/// Write the snapshot, downgrading any failure to a warning.
async fn persist(path: &Path, state: &PoolState) {
    if let Err(e) = write_atomic(path, &state.to_snapshot()).await {
        crate::metrics::record_persist_failure();
        warn!(path = %path.display(), error = %e, "failed to persist pool snapshot, keeping in-memory state");
    }
}

/// Write the snapshot atomically.
///
/// Writes a temp file next to the target and renames it over the target, so
/// a crash mid-write never leaves a torn file. The parent directory is
/// created if needed, and the file is 0600 since it holds API keys.
async fn write_atomic(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot)
        .map_err(|e| Error::Persist(format!("serializing snapshot: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Persist("snapshot path has no parent directory".into()))?;
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| Error::Persist(format!("creating snapshot directory: {e}")))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "api-keys.json".into());
    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Persist(format!("writing temp snapshot: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Persist(format!("setting snapshot permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Persist(format!("renaming temp snapshot: {e}")))?;

    debug!(path = %path.display(), "persisted pool snapshot");
    Ok(())
}
