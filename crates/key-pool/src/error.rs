//! Error types for pool operations

/// Errors from pool operations.
///
/// Only input validation reaches callers. Persistence failures are logged and
/// counted inside the store; the variant exists so the write path can use `?`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("credential must not be empty")]
    EmptyCredential,

    #[error("index {index} out of range for pool of {len} credential(s)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("failed to persist pool snapshot: {0}")]
    Persist(String),
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_message_names_index_and_len() {
        let err = Error::IndexOutOfRange { index: 5, len: 2 };
        assert_eq!(
            err.to_string(),
            "index 5 out of range for pool of 2 credential(s)"
        );
    }
}
