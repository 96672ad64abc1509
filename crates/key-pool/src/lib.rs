//! Credential pool for interchangeable API keys
//!
//! Holds a set of API keys, counts how many requests each one served on the
//! current accounting day, and picks which key backs the next outbound
//! request. The `CredentialStore` is the single source of truth and persists
//! every mutation to a JSON snapshot; the `RotationPolicy` wraps it with
//! request-lifecycle hooks and owns the ambient "key to use next".
//!
//! Key lifecycle:
//! 1. Operator adds a key → appended to the pool, usage zero
//! 2. Policy hands out the active key; every request start records usage
//! 3. Every `check_interval` requests, a heavily used key (≥ `usage_threshold`)
//!    rotates to the least used one if some other key is still mostly idle
//! 4. Upstream reports a quota / rate-limit failure → immediate rotation
//! 5. At the first operation of a new calendar day, all usage resets to zero

pub mod clock;
pub mod error;
pub mod metrics;
pub mod policy;
pub mod signal;
mod state;
pub mod store;

pub use clock::{Clock, LocalClock, ManualClock};
pub use common::Credential;
pub use error::{Error, Result};
pub use policy::{ActiveCredential, RotationConfig, RotationPolicy, RotationReason};
pub use signal::{RequestError, Signal, is_rotation_signal, rotation_signal};
pub use store::{CredentialStore, CredentialSummary, PoolStats};
