//! Common types for the keypool workspace

mod credential;
mod error;

pub use credential::{Credential, VISIBLE_CHARS};
pub use error::{Error, Result};
