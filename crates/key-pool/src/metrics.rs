//! Pool metrics
//!
//! Emitted through the `metrics` facade; they are no-ops until the host
//! process installs a recorder.
//!
//! - `keypool_requests_total` (counter)
//! - `keypool_request_successes_total` (counter)
//! - `keypool_rotations_total` (counter): label `reason`
//! - `keypool_persist_failures_total` (counter)

pub const REQUESTS_TOTAL: &str = "keypool_requests_total";
pub const REQUEST_SUCCESSES_TOTAL: &str = "keypool_request_successes_total";
pub const ROTATIONS_TOTAL: &str = "keypool_rotations_total";
pub const PERSIST_FAILURES_TOTAL: &str = "keypool_persist_failures_total";

pub fn record_request() {
    metrics::counter!(REQUESTS_TOTAL).increment(1);
}

pub fn record_success() {
    metrics::counter!(REQUEST_SUCCESSES_TOTAL).increment(1);
}

/// Record a change of the active credential, labelled with what caused it.
pub fn record_rotation(reason: &'static str) {
    metrics::counter!(ROTATIONS_TOTAL, "reason" => reason).increment(1);
}

pub fn record_persist_failure() {
    metrics::counter!(PERSIST_FAILURES_TOTAL).increment(1);
}
