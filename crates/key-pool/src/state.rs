//! Pool state and its on-disk snapshot form
//!
//! The snapshot keeps the field names of the original key file
//! (`keys`, `currentIndex`, `usage`, `lastReset`) so existing files and the
//! dashboard that reads them keep working. Loading is lenient: duplicate keys
//! are dropped, an out-of-range index is clamped, and an unrecognised reset
//! date counts as stale.

use std::collections::HashMap;

use chrono::NaiveDate;
use common::Credential;
use serde::{Deserialize, Serialize};

/// Calendar-day format written to `lastReset`, e.g. `Sat Oct 17 2026`.
pub(crate) const DAY_FORMAT: &str = "%a %b %d %Y";

/// Also accepted when reading.
const ISO_DAY_FORMAT: &str = "%Y-%m-%d";

/// Wire form of the pool.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Snapshot {
    #[serde(default)]
    pub keys: Vec<Credential>,
    #[serde(default)]
    pub current_index: i64,
    #[serde(default)]
    pub usage: HashMap<Credential, u64>,
    #[serde(default)]
    pub last_reset: String,
}

/// In-memory pool state guarded by the store's mutex.
#[derive(Debug)]
pub(crate) struct PoolState {
    pub credentials: Vec<Credential>,
    pub active_index: usize,
    pub usage: HashMap<Credential, u64>,
    /// `None` when the snapshot's date could not be read; the next freshness
    /// check treats that as a past day.
    pub last_reset: Option<NaiveDate>,
}

impl PoolState {
    pub fn empty(today: NaiveDate) -> Self {
        Self {
            credentials: Vec::new(),
            active_index: 0,
            usage: HashMap::new(),
            last_reset: Some(today),
        }
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut credentials: Vec<Credential> = Vec::with_capacity(snapshot.keys.len());
        for key in snapshot.keys {
            if !credentials.contains(&key) {
                credentials.push(key);
            }
        }

        let active_index = usize::try_from(snapshot.current_index)
            .ok()
            .filter(|i| *i < credentials.len())
            .unwrap_or(0);

        Self {
            credentials,
            active_index,
            usage: snapshot.usage,
            last_reset: parse_day(&snapshot.last_reset),
        }
    }

    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            keys: self.credentials.clone(),
            current_index: self.active_index as i64,
            usage: self.usage.clone(),
            last_reset: self
                .last_reset
                .map(|day| day.format(DAY_FORMAT).to_string())
                .unwrap_or_default(),
        }
    }

    /// Zero usage if the accounting day has moved on. Returns whether anything changed.
    pub fn ensure_fresh_day(&mut self, today: NaiveDate) -> bool {
        if self.last_reset == Some(today) {
            return false;
        }
        self.usage.clear();
        self.last_reset = Some(today);
        true
    }

    pub fn current(&self) -> Option<&Credential> {
        self.credentials.get(self.active_index)
    }

    pub fn usage_of(&self, credential: &str) -> u64 {
        self.usage.get(credential).copied().unwrap_or(0)
    }

    /// Index of the least used credential; the first one wins ties.
    pub fn least_used_index(&self) -> Option<usize> {
        self.credentials
            .iter()
            .enumerate()
            .min_by_key(|(_, credential)| self.usage_of(credential.expose()))
            .map(|(index, _)| index)
    }
}

fn parse_day(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, DAY_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(raw, ISO_DAY_FORMAT))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn state_with(keys: &[&str], usage: &[(&str, u64)]) -> PoolState {
        let mut state = PoolState::empty(day(2026, 10, 17));
        state.credentials = keys.iter().map(|k| Credential::new(*k)).collect();
        state.usage = usage
            .iter()
            .map(|(k, n)| (Credential::new(*k), *n))
            .collect();
        state
    }

    #[test]
    fn parses_original_day_format() {
        assert_eq!(parse_day("Sat Oct 17 2026"), Some(day(2026, 10, 17)));
        assert_eq!(parse_day("Thu Jan 01 2026"), Some(day(2026, 1, 1)));
    }

    #[test]
    fn parses_iso_day() {
        assert_eq!(parse_day("2026-10-17"), Some(day(2026, 10, 17)));
    }

    #[test]
    fn unrecognised_day_is_none() {
        assert_eq!(parse_day(""), None);
        assert_eq!(parse_day("yesterday"), None);
    }

    #[test]
    fn snapshot_writes_original_day_format() {
        let state = PoolState::empty(day(2026, 10, 17));
        assert_eq!(state.to_snapshot().last_reset, "Sat Oct 17 2026");
    }

    #[test]
    fn from_snapshot_drops_duplicates_keeping_first() {
        let snapshot = Snapshot {
            keys: vec!["a".into(), "b".into(), "a".into()],
            current_index: 1,
            ..Default::default()
        };
        let state = PoolState::from_snapshot(snapshot);
        assert_eq!(
            state.credentials,
            vec![Credential::new("a"), Credential::new("b")]
        );
        assert_eq!(state.active_index, 1);
    }

    #[test]
    fn from_snapshot_clamps_bad_index() {
        for bad in [-1, 2, 99] {
            let snapshot = Snapshot {
                keys: vec!["a".into(), "b".into()],
                current_index: bad,
                ..Default::default()
            };
            assert_eq!(PoolState::from_snapshot(snapshot).active_index, 0, "index {bad}");
        }
    }

    #[test]
    fn fresh_day_is_idempotent() {
        let mut state = state_with(&["a"], &[("a", 3)]);
        state.last_reset = Some(day(2026, 10, 16));

        assert!(state.ensure_fresh_day(day(2026, 10, 17)));
        assert!(state.usage.is_empty());
        assert!(!state.ensure_fresh_day(day(2026, 10, 17)));
    }

    #[test]
    fn least_used_prefers_lowest_index_on_tie() {
        let state = state_with(&["a", "b", "c"], &[("a", 4), ("b", 1), ("c", 1)]);
        assert_eq!(state.least_used_index(), Some(1));
    }

    #[test]
    fn least_used_counts_missing_entries_as_zero() {
        let state = state_with(&["a", "b"], &[("a", 1)]);
        assert_eq!(state.least_used_index(), Some(1));
    }

    #[test]
    fn least_used_on_empty_pool() {
        let state = state_with(&[], &[]);
        assert_eq!(state.least_used_index(), None);
    }
}
