//! Rotation signals in upstream failures
//!
//! Request executors report failures as a `RequestError` carrying whatever
//! they know: an HTTP status, a message, or both. A 429 status or a message
//! mentioning quota or rate limiting means the active key is spent and the
//! pool should rotate right away. Everything else is left to the caller.

use std::fmt;

/// HTTP status for "too many requests".
pub const TOO_MANY_REQUESTS: u16 = 429;

/// Message fragments that mark a quota or rate-limit failure (matched case-insensitively).
const QUOTA_PATTERNS: &[&str] = &["quota"];
const RATE_LIMIT_PATTERNS: &[&str] = &["rate limit"];

/// What an outbound request executor knows about a failed request.
///
/// Both fields are optional; a missing field simply cannot match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestError {
    pub status: Option<u16>,
    pub message: Option<String>,
}

impl RequestError {
    pub fn from_status(status: u16) -> Self {
        Self {
            status: Some(status),
            message: None,
        }
    }

    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: Some(message.into()),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl<E: std::error::Error> From<&E> for RequestError {
    fn from(err: &E) -> Self {
        Self::from_message(err.to_string())
    }
}

/// Why a failure counts as a rotation signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// HTTP 429
    TooManyRequests,
    /// Message mentions quota
    QuotaExhausted,
    /// Message mentions rate limiting
    RateLimited,
}

impl Signal {
    /// Label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Signal::TooManyRequests => "too_many_requests",
            Signal::QuotaExhausted => "quota_exhausted",
            Signal::RateLimited => "rate_limited",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify a failed request. Status wins over message when both match.
pub fn rotation_signal(error: &RequestError) -> Option<Signal> {
    if error.status == Some(TOO_MANY_REQUESTS) {
        return Some(Signal::TooManyRequests);
    }

    let message = error.message.as_deref()?.to_lowercase();
    if QUOTA_PATTERNS.iter().any(|p| message.contains(p)) {
        return Some(Signal::QuotaExhausted);
    }
    if RATE_LIMIT_PATTERNS.iter().any(|p| message.contains(p)) {
        return Some(Signal::RateLimited);
    }
    None
}

/// Whether the failure should trigger an immediate rotation.
pub fn is_rotation_signal(error: &RequestError) -> bool {
    rotation_signal(error).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_429_is_signal() {
        assert_eq!(
            rotation_signal(&RequestError::from_status(429)),
            Some(Signal::TooManyRequests)
        );
    }

    #[test]
    fn quota_message_is_signal() {
        let err = RequestError::from_message("Quota exceeded for quota metric 'Generate Content'");
        assert_eq!(rotation_signal(&err), Some(Signal::QuotaExhausted));
    }

    #[test]
    fn rate_limit_message_is_signal() {
        let err = RequestError::from_message("Rate limit reached, slow down");
        assert_eq!(rotation_signal(&err), Some(Signal::RateLimited));
    }

    #[test]
    fn status_takes_precedence_over_message() {
        let err = RequestError::from_status(429).with_message("quota exceeded");
        assert_eq!(rotation_signal(&err), Some(Signal::TooManyRequests));
    }

    #[test]
    fn message_matches_with_non_signal_status() {
        let err = RequestError::from_status(403).with_message("RESOURCE_EXHAUSTED: quota");
        assert!(is_rotation_signal(&err));
    }

    #[test]
    fn other_failures_are_not_signals() {
        assert!(!is_rotation_signal(&RequestError::from_status(500)));
        assert!(!is_rotation_signal(&RequestError::from_status(401)));
        assert!(!is_rotation_signal(&RequestError::from_message(
            "connection reset by peer"
        )));
        assert!(!is_rotation_signal(&RequestError::from_message("ratelimited")));
    }

    #[test]
    fn empty_error_is_tolerated() {
        assert!(!is_rotation_signal(&RequestError::default()));
        assert!(!is_rotation_signal(&RequestError::from_message("")));
    }

    #[test]
    fn converts_from_std_error() {
        let io = std::io::Error::other("upstream said: rate limit exceeded");
        let err = RequestError::from(&io);
        assert_eq!(rotation_signal(&err), Some(Signal::RateLimited));
    }

    #[test]
    fn status_added_to_converted_error() {
        let io = std::io::Error::other("upstream closed connection");
        let err = RequestError::from(&io).with_status(429);
        assert_eq!(rotation_signal(&err), Some(Signal::TooManyRequests));
        assert_eq!(err.message.as_deref(), Some("upstream closed connection"));
    }

    #[test]
    fn signal_labels() {
        assert_eq!(Signal::TooManyRequests.to_string(), "too_many_requests");
        assert_eq!(Signal::QuotaExhausted.label(), "quota_exhausted");
        assert_eq!(Signal::RateLimited.label(), "rate_limited");
    }
}
