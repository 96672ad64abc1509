//! Rotation policy: request-lifecycle hooks over the credential store
//!
//! The policy owns the ambient active credential (the key request executors
//! should use next) and is its only writer. Readers hold an
//! `ActiveCredential` handle and see every rotation.
//!
//! Rotation happens at two points:
//! - every `check_interval`-th request start, when the active key has served
//!   at least `usage_threshold` requests today and some other pool key has
//!   served fewer than `idle_threshold` (threshold rule)
//! - immediately on any failure carrying a quota / rate-limit signal
//!
//! Both move to the least used key. When no key is under the idle threshold
//! the threshold rule stays on the current key.

use std::sync::Arc;

use common::Credential;
use serde::Deserialize;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info};

use crate::signal::{self, RequestError};
use crate::store::CredentialStore;

pub const DEFAULT_CHECK_INTERVAL: u64 = 10;
pub const DEFAULT_USAGE_THRESHOLD: u64 = 50;
pub const DEFAULT_IDLE_THRESHOLD: u64 = 10;

/// Tunables for the threshold rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RotationConfig {
    /// Evaluate the threshold rule every this many requests
    pub check_interval: u64,
    /// Active key usage at or above which rotation is considered
    pub usage_threshold: u64,
    /// Another key must be below this usage to be worth rotating to
    pub idle_threshold: u64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            usage_threshold: DEFAULT_USAGE_THRESHOLD,
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
        }
    }
}

impl RotationConfig {
    /// Whether `active` has earned a rotation given today's pool usage.
    pub fn threshold_exceeded(
        &self,
        active: &Credential,
        active_usage: u64,
        pool: &[(Credential, u64)],
    ) -> bool {
        active_usage >= self.usage_threshold
            && pool
                .iter()
                .any(|(credential, usage)| credential != active && *usage < self.idle_threshold)
    }

    fn is_check_due(&self, request_count: u64) -> bool {
        self.check_interval > 0 && request_count % self.check_interval == 0
    }
}

/// What caused the active credential to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationReason {
    Threshold,
    Quota,
    Manual,
}

impl RotationReason {
    /// Label for logging and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            RotationReason::Threshold => "threshold",
            RotationReason::Quota => "quota",
            RotationReason::Manual => "manual",
        }
    }
}

/// Read handle onto the ambient active credential.
///
/// Clone it into whatever issues requests; it always reflects the latest
/// rotation.
#[derive(Debug, Clone)]
pub struct ActiveCredential {
    rx: watch::Receiver<Option<Credential>>,
}

impl ActiveCredential {
    /// The credential to use for the next request.
    pub fn get(&self) -> Option<Credential> {
        self.rx.borrow().clone()
    }

    /// Wait for the next rotation. Returns `false` once the policy is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Whether a rotation happened since the last `get`/`changed` observed one.
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }

    /// Like `get`, marking the current value as seen.
    pub fn get_and_mark_seen(&mut self) -> Option<Credential> {
        self.rx.borrow_and_update().clone()
    }
}

/// Request-lifecycle hooks that decide when to rotate.
pub struct RotationPolicy {
    store: Arc<CredentialStore>,
    config: RotationConfig,
    active: watch::Sender<Option<Credential>>,
    /// Requests started so far; the lock also serialises hook bodies.
    request_count: Mutex<u64>,
}

impl RotationPolicy {
    /// Start with the store's current credential as the ambient one.
    pub async fn new(store: Arc<CredentialStore>, config: RotationConfig) -> Self {
        Self::with_initial(store, config, None).await
    }

    /// Start with an externally configured credential if one is given.
    ///
    /// A non-blank `initial` wins over the pool (it need not be a pool
    /// member; its usage is still counted). Otherwise the store's current
    /// credential is used.
    pub async fn with_initial(
        store: Arc<CredentialStore>,
        config: RotationConfig,
        initial: Option<Credential>,
    ) -> Self {
        let initial = match initial.filter(|c| !c.is_blank()) {
            Some(credential) => Some(credential),
            None => store.current().await,
        };
        info!(
            credential = ?initial,
            check_interval = config.check_interval,
            usage_threshold = config.usage_threshold,
            idle_threshold = config.idle_threshold,
            "rotation policy initialized"
        );
        let (active, _) = watch::channel(initial);
        Self {
            store,
            config,
            active,
            request_count: Mutex::new(0),
        }
    }

    /// New read handle onto the ambient credential.
    pub fn active(&self) -> ActiveCredential {
        ActiveCredential {
            rx: self.active.subscribe(),
        }
    }

    /// The ambient credential right now.
    pub fn current(&self) -> Option<Credential> {
        self.active.borrow().clone()
    }

    /// Requests started since the policy was created.
    pub async fn request_count(&self) -> u64 {
        *self.request_count.lock().await
    }

    /// Call before issuing a request.
    ///
    /// Counts the request against the ambient credential and, on every
    /// `check_interval`-th call, applies the threshold rule. Returns the new
    /// credential if this call rotated.
    pub async fn on_request_start(&self) -> Option<Credential> {
        let mut count = self.request_count.lock().await;
        *count += 1;
        crate::metrics::record_request();

        let current = self.ambient_or_pool_current().await?;
        let used = self.store.record_usage(current.expose()).await;

        if !self.config.is_check_due(*count) {
            return None;
        }

        let pool = self.store.usage_by_credential().await;
        if !self.config.threshold_exceeded(&current, used, &pool) {
            debug!(
                credential = %current,
                usage = used,
                request = *count,
                "threshold check: staying on current credential"
            );
            return None;
        }

        let next = self.store.select_least_used().await?;
        self.publish(next, RotationReason::Threshold)
    }

    /// Call after a request succeeded.
    pub async fn on_request_success(&self) {
        crate::metrics::record_success();
        debug!(credential = ?self.current(), "request succeeded");
    }

    /// Call after a request failed.
    ///
    /// A quota / rate-limit signal rotates to the least used credential
    /// regardless of thresholds and returns the credential now active (which
    /// may be unchanged in a single-key pool). Other failures return `None`.
    pub async fn on_request_error(&self, error: &RequestError) -> Option<Credential> {
        let Some(signal) = signal::rotation_signal(error) else {
            debug!(status = ?error.status, "request failed without rotation signal");
            return None;
        };

        let _serialised = self.request_count.lock().await;
        let next = self.store.select_least_used().await?;
        info!(signal = %signal, credential = %next, "rotation signal from upstream");
        self.publish(next.clone(), RotationReason::Quota);
        Some(next)
    }

    /// Rotate to the least used credential now (operator request).
    pub async fn rotate_now(&self) -> Option<Credential> {
        let _serialised = self.request_count.lock().await;
        let next = self.store.select_least_used().await?;
        self.publish(next.clone(), RotationReason::Manual);
        Some(next)
    }

    /// The ambient credential, adopting the pool's current one if none is set yet.
    async fn ambient_or_pool_current(&self) -> Option<Credential> {
        if let Some(current) = self.current() {
            return Some(current);
        }
        let adopted = self.store.current().await?;
        debug!(credential = %adopted, "adopting pool credential as ambient");
        self.active.send_replace(Some(adopted.clone()));
        Some(adopted)
    }

    /// Make `next` the ambient credential. Returns it only if it differs from before.
    fn publish(&self, next: Credential, reason: RotationReason) -> Option<Credential> {
        let changed = self.active.send_if_modified(|slot| {
            if slot.as_ref() == Some(&next) {
                return false;
            }
            *slot = Some(next.clone());
            true
        });
        if !changed {
            return None;
        }
        crate::metrics::record_rotation(reason.label());
        info!(credential = %next, reason = reason.label(), "switched active credential");
        Some(next)
    }
}
