//! Integration test suite for appsync
//!
//! End-to-end tests that drive the public API and the `appsync` binary against
//! scripted collaborators and local HTTP servers.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **archive**: content root discovery for arbitrary archive layouts
//! - **atomicity**: crash at every promote step, then recovery
//! - **cli**: the `appsync` binary via `assert_cmd`
//! - **http**: the HTTP oracle and fetcher wired from a deploy config
//! - **reconcile**: idempotence, no-regression and backoff scenarios

mod archive;
mod atomicity;
mod cli;
mod http;
mod reconcile;

use appsync_cli::reconcile::{Reconciler, ReconcilerSettings, RetryPolicy};
use appsync_cli::state::StateStore;
use appsync_cli::test_utils::{ScriptedFetcher, ScriptedOracle, init_test_logging, zip_with_root};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// A sandboxed deployment with scripted remote collaborators.
pub struct Deployment {
    pub temp: TempDir,
    pub live: PathBuf,
    pub store: StateStore,
    pub oracle: Arc<ScriptedOracle>,
    pub fetcher: Arc<ScriptedFetcher>,
}

impl Deployment {
    /// Versions `A` and `B` are published with distinct content.
    pub fn new() -> Self {
        init_test_logging(None);
        let temp = TempDir::new().unwrap();
        let live = temp.path().join("apps").join("widget");
        let store = StateStore::new(temp.path().join("state").join("widget.json"));
        let oracle = Arc::new(ScriptedOracle::new());
        let fetcher = Arc::new(ScriptedFetcher::new(temp.path().join("apps").join(".staging")));
        fetcher.publish(
            "A",
            zip_with_root("widget-A", &[("index.js", "console.log('A')"), ("package.json", "{}")]),
        );
        fetcher.publish(
            "B",
            zip_with_root(
                "widget-B",
                &[("index.js", "console.log('B')"), ("lib/util.js", "exports.b = 1")],
            ),
        );
        Self {
            temp,
            live,
            store,
            oracle,
            fetcher,
        }
    }

    pub fn reconciler(&self) -> Reconciler {
        let mut settings = ReconcilerSettings::new(&self.live);
        settings.retry = RetryPolicy::new(4, Duration::from_millis(5), Duration::from_millis(100));
        Reconciler::new(settings, self.oracle.clone(), self.fetcher.clone(), self.store.clone())
            .with_staging(self.fetcher.staging().clone())
    }

    pub fn read_live(&self, relative: &str) -> String {
        std::fs::read_to_string(self.live.join(relative)).unwrap()
    }
}
