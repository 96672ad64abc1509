//! Credential wrapper for pooled API keys
//!
//! A credential is an opaque secret string. It is its own identity (the pool
//! keys usage by value), so equality and hashing use the full value, but every
//! human-facing rendering (Debug, Display, logs) shows only the tail.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Number of characters kept visible at either end of a redacted credential.
pub const VISIBLE_CHARS: usize = 8;

/// An API credential. Redacted in Debug/Display/logs, zeroized on drop.
///
/// Serializes as the bare secret string so it can live in the pool snapshot.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    /// Wrap a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret (use sparingly: request executors and persistence only)
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// True when the value is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Ellipsis followed by the trailing characters, e.g. `...AAAAwxyz`.
    pub fn redacted(&self) -> String {
        format!("...{}", self.tail())
    }

    /// Leading and trailing characters around an ellipsis, e.g. `AIzaSyAA...AAAAwxyz`.
    ///
    /// Values too short to hide anything between the two ends fall back to
    /// [`Credential::redacted`].
    pub fn masked(&self) -> String {
        if self.0.chars().count() <= VISIBLE_CHARS * 2 {
            return self.redacted();
        }
        let head: String = self.0.chars().take(VISIBLE_CHARS).collect();
        format!("{head}...{}", self.tail())
    }

    fn tail(&self) -> String {
        let len = self.0.chars().count();
        self.0
            .chars()
            .skip(len.saturating_sub(VISIBLE_CHARS))
            .collect()
    }
}

impl From<String> for Credential {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Credential {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

// Hash/Eq delegate to the inner String, so lookups by &str agree with lookups
// by Credential.
impl Borrow<str> for Credential {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", self.redacted())
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl Drop for Credential {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}
