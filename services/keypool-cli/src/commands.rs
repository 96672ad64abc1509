//! Operator commands over the credential pool
//!
//! Each command maps onto one store or policy operation. Output goes to the
//! supplied writer; input problems come back as `Outcome::Rejected` with a
//! message for the operator instead of an error.

use std::fmt;
use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use clap::Subcommand;
use key_pool::{Credential, CredentialStore, RotationConfig, RotationPolicy};

const EMPTY_POOL_HINT: &str = "No API keys configured. Use keypool add YOUR_KEY first.";

#[derive(Subcommand)]
pub enum Command {
    /// Add an API key to the pool
    Add {
        /// The API key (surrounding whitespace is trimmed)
        key: Option<String>,
    },
    /// Remove the API key at INDEX (see `keypool list`)
    Remove { index: usize },
    /// List pooled keys, masked, with today's usage
    List,
    /// Show API key usage status
    Status,
    /// Switch to the least used API key
    Switch,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Add { .. } => "add",
            Command::Remove { .. } => "remove",
            Command::List => "list",
            Command::Status => "status",
            Command::Switch => "switch",
        }
    }
}

// Hand-written so a key given on the command line only ever shows redacted.
impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Add { key } => f
                .debug_struct("Add")
                .field("key", &key.as_deref().map(Credential::new))
                .finish(),
            Command::Remove { index } => f.debug_struct("Remove").field("index", index).finish(),
            Command::List => f.write_str("List"),
            Command::Status => f.write_str("Status"),
            Command::Switch => f.write_str("Switch"),
        }
    }
}

/// How a command ended.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// Invalid input; the message is meant for the operator.
    Rejected(String),
}

/// Run one command against the pool.
pub async fn run<W: Write>(
    command: Command,
    store: Arc<CredentialStore>,
    rotation: RotationConfig,
    out: &mut W,
) -> Result<Outcome> {
    match command {
        Command::Add { key } => {
            let key = key.as_deref().map(str::trim).unwrap_or_default();
            if key.is_empty() {
                return Ok(Outcome::Rejected(
                    "Please provide an API key: keypool add YOUR_KEY".into(),
                ));
            }
            let credential = Credential::new(key);
            let redacted = credential.redacted();
            match store.add(credential).await {
                Ok(true) => writeln!(out, "API key added (ending in {redacted})")?,
                Ok(false) => writeln!(out, "API key already configured (ending in {redacted})")?,
                Err(e) => return Ok(Outcome::Rejected(e.to_string())),
            }
        }
        Command::Remove { index } => match store.remove(index).await {
            Ok(removed) => writeln!(out, "API key removed (ending in {})", removed.redacted())?,
            Err(e) => return Ok(Outcome::Rejected(format!("Cannot remove API key: {e}"))),
        },
        Command::List => {
            let entries = store.list().await;
            if entries.is_empty() {
                writeln!(out, "{EMPTY_POOL_HINT}")?;
            }
            for entry in entries {
                let marker = if entry.active { "*" } else { " " };
                writeln!(
                    out,
                    "{marker} [{}] {}  {} request(s) today",
                    entry.index, entry.masked, entry.requests_today
                )?;
            }
        }
        Command::Status => {
            let stats = store.stats().await;
            writeln!(out, "{stats}")?;
            writeln!(
                out,
                "  Rotation: every {} requests, switch at {} when another key is under {}",
                rotation.check_interval, rotation.usage_threshold, rotation.idle_threshold
            )?;
        }
        Command::Switch => {
            let policy = RotationPolicy::new(store, rotation).await;
            match policy.rotate_now().await {
                Some(credential) => writeln!(
                    out,
                    "Switched to API key ending in {}",
                    credential.redacted()
                )?,
                None => return Ok(Outcome::Rejected(EMPTY_POOL_HINT.into())),
            }
        }
    }
    Ok(Outcome::Done)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store(dir: &tempfile::TempDir) -> Arc<CredentialStore> {
        Arc::new(CredentialStore::load(dir.path().join("api-keys.json")).await)
    }

    async fn run_captured(command: Command, store: &Arc<CredentialStore>) -> (Outcome, String) {
        let mut out = Vec::new();
        let outcome = run(command, store.clone(), RotationConfig::default(), &mut out)
            .await
            .unwrap();
        (outcome, String::from_utf8(out).unwrap())
    }

    fn add(key: &str) -> Command {
        Command::Add {
            key: Some(key.into()),
        }
    }

    #[tokio::test]
    async fn add_trims_and_reports_redacted_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        let (outcome, output) = run_captured(add("  AAAAAAAAwxyz \n"), &store).await;
        assert_eq!(outcome, Outcome::Done);
        assert_eq!(output, "API key added (ending in ...AAAAwxyz)\n");
        assert_eq!(
            store.current().await.map(|c| c.expose().to_string()),
            Some("AAAAAAAAwxyz".to_string())
        );
    }

    #[tokio::test]
    async fn add_duplicate_is_informational() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        run_captured(add("AAAAAAAAwxyz"), &store).await;

        let (outcome, output) = run_captured(add("AAAAAAAAwxyz"), &store).await;
        assert_eq!(outcome, Outcome::Done);
        assert!(output.contains("already configured"), "output: {output}");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn add_without_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        for command in [Command::Add { key: None }, add(""), add("   ")] {
            let (outcome, output) = run_captured(command, &store).await;
            assert_eq!(
                outcome,
                Outcome::Rejected("Please provide an API key: keypool add YOUR_KEY".into())
            );
            assert!(output.is_empty());
        }
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn remove_out_of_range_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        run_captured(add("AAAAAAAAwxyz"), &store).await;

        let (outcome, _) = run_captured(Command::Remove { index: 4 }, &store).await;
        match outcome {
            Outcome::Rejected(msg) => assert!(msg.contains("index 4 out of range"), "msg: {msg}"),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn remove_reports_redacted_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        run_captured(add("AAAAAAAAwxyz"), &store).await;

        let (outcome, output) = run_captured(Command::Remove { index: 0 }, &store).await;
        assert_eq!(outcome, Outcome::Done);
        assert_eq!(output, "API key removed (ending in ...AAAAwxyz)\n");
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn list_marks_active_and_masks_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        run_captured(add("AIzaSyAA-hidden-middle-AAAAwxyz"), &store).await;
        run_captured(add("AIzaSyBB-hidden-middle-BBBBwxyz"), &store).await;

        let (_, output) = run_captured(Command::List, &store).await;
        assert_eq!(
            output,
            "* [0] AIzaSyAA...AAAAwxyz  0 request(s) today\n  [1] AIzaSyBB...BBBBwxyz  0 request(s) today\n"
        );
        assert!(!output.contains("hidden"));
    }

    #[tokio::test]
    async fn list_empty_pool_shows_hint() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        let (outcome, output) = run_captured(Command::List, &store).await;
        assert_eq!(outcome, Outcome::Done);
        assert!(output.contains(EMPTY_POOL_HINT));
    }

    #[tokio::test]
    async fn status_shows_redacted_report_and_rotation_settings() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        run_captured(add("AAAAAAAAwxyz"), &store).await;
        store.record_usage("AAAAAAAAwxyz").await;

        let (_, output) = run_captured(Command::Status, &store).await;
        assert!(output.contains("Keys configured: 1"), "output: {output}");
        assert!(output.contains("Current key: ...AAAAwxyz"), "output: {output}");
        assert!(output.contains("...AAAAwxyz: 1"), "output: {output}");
        assert!(
            output.contains("every 10 requests, switch at 50 when another key is under 10"),
            "output: {output}"
        );
        assert!(!output.contains("AAAAAAAAwxyz"));
    }

    #[tokio::test]
    async fn switch_moves_to_least_used() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        run_captured(add("AAAAAAAAwxyz"), &store).await;
        run_captured(add("BBBBBBBBwxyz"), &store).await;
        store.record_usage("AAAAAAAAwxyz").await;

        let (outcome, output) = run_captured(Command::Switch, &store).await;
        assert_eq!(outcome, Outcome::Done);
        assert_eq!(output, "Switched to API key ending in ...BBBBwxyz\n");
        assert_eq!(
            store.current().await.map(|c| c.redacted()),
            Some("...BBBBwxyz".to_string())
        );
    }

    #[test]
    fn debug_output_redacts_key() {
        let rendered = format!("{:?}", add("AIzaSyFULLSECRETVALUE-AAAAwxyz"));
        assert_eq!(rendered, "Add { key: Some(Credential(...AAAAwxyz)) }");
        assert_eq!(
            format!("{:?}", Command::Remove { index: 3 }),
            "Remove { index: 3 }"
        );
    }

    #[tokio::test]
    async fn switch_on_empty_pool_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        let (outcome, _) = run_captured(Command::Switch, &store).await;
        assert_eq!(outcome, Outcome::Rejected(EMPTY_POOL_HINT.into()));
    }
}
