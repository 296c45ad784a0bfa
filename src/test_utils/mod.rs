//! Test utilities for appsync
//!
//! Scripted stand-ins for the remote collaborators, plus archive builders, so
//! the reconciler can be driven through every phase without a network.
//!
//! - [`ScriptedOracle`]: answers "latest" from a queue of results
//! - [`ScriptedFetcher`]: stages in-memory archives and can be told to fail
//! - [`RecordingHook`]: counts invocations of an install hook or launcher
//!
//! To enable logging in tests via environment variable:
//! ```bash
//! RUST_LOG=debug cargo test
//! ```

use crate::core::{DeployError, UnavailableCause};
use crate::hooks::{InstallHook, Launcher};
use crate::oracle::{VersionOracle, VersionRecord};
use crate::snapshot::{Snapshot, SnapshotFetcher, StagingArea};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, Once};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests, once per process.
///
/// Uses `level` when given, otherwise `RUST_LOG`; with neither, stays silent.
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Builds a zip archive whose entries all live under one top-level directory,
/// the way repository archive endpoints lay them out.
pub fn zip_with_root(root: &str, files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();

    writer.add_directory(format!("{root}/"), options).unwrap();
    for (path, content) in files {
        writer.start_file(format!("{root}/{path}"), options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// A version record with a fixed timestamp.
pub fn version(id: &str) -> VersionRecord {
    VersionRecord::new(id, Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
}

/// Version oracle that replays a queue of answers.
///
/// Once the queue is drained, the last answer repeats.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    script: Mutex<VecDeque<Result<VersionRecord, DeployError>>>,
    last: Mutex<Option<Result<VersionRecord, DeployError>>>,
    calls: AtomicU32,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ok(&self, id: &str) {
        self.script.lock().unwrap().push_back(Ok(version(id)));
    }

    pub fn push_err(&self, cause: UnavailableCause) {
        self.script.lock().unwrap().push_back(Err(DeployError::Unavailable {
            endpoint: "scripted".to_string(),
            cause,
            reason: "scripted failure".to_string(),
        }));
    }

    /// Number of `resolve` calls so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VersionOracle for ScriptedOracle {
    async fn resolve(&self) -> Result<VersionRecord, DeployError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            *last = Some(next);
        }
        last.clone().unwrap_or_else(|| {
            Err(DeployError::Unavailable {
                endpoint: "scripted".to_string(),
                cause: UnavailableCause::Malformed,
                reason: "nothing scripted".to_string(),
            })
        })
    }
}

/// Snapshot fetcher serving published in-memory archives.
#[derive(Debug)]
pub struct ScriptedFetcher {
    staging: StagingArea,
    archives: Mutex<HashMap<String, Vec<u8>>>,
    failures: AtomicU32,
    fetches: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new(staging_root: impl Into<PathBuf>) -> Self {
        Self {
            staging: StagingArea::new(staging_root),
            archives: Mutex::new(HashMap::new()),
            failures: AtomicU32::new(0),
            fetches: Mutex::new(Vec::new()),
        }
    }

    /// Makes `archive` the content of `version_id`.
    pub fn publish(&self, version_id: &str, archive: Vec<u8>) {
        self.archives.lock().unwrap().insert(version_id.to_string(), archive);
    }

    /// The next `count` fetches fail with a transient network error.
    pub fn fail_next(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Version ids of every fetch attempt, failed ones included.
    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }
}

#[async_trait]
impl SnapshotFetcher for ScriptedFetcher {
    async fn fetch(&self, version_id: &str) -> Result<Snapshot, DeployError> {
        self.fetches.lock().unwrap().push(version_id.to_string());
        let url = format!("scripted://{version_id}");

        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(DeployError::NetworkError {
                url,
                reason: "connection reset".to_string(),
            });
        }

        let archive = self.archives.lock().unwrap().get(version_id).cloned();
        match archive {
            Some(bytes) => self.staging.stage_bytes(version_id, &bytes).await,
            None => Err(DeployError::NetworkError {
                url,
                reason: "HTTP 404".to_string(),
            }),
        }
    }
}

/// Install hook and launcher that records how often it ran.
#[derive(Debug)]
pub struct RecordingHook {
    name: String,
    fail: bool,
    calls: AtomicU32,
    live_paths: Mutex<Vec<PathBuf>>,
}

impl RecordingHook {
    pub fn succeeding(name: &str) -> Self {
        Self::build(name, false)
    }

    pub fn failing(name: &str) -> Self {
        Self::build(name, true)
    }

    fn build(name: &str, fail: bool) -> Self {
        Self {
            name: name.to_string(),
            fail,
            calls: AtomicU32::new(0),
            live_paths: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn live_paths(&self) -> Vec<PathBuf> {
        self.live_paths.lock().unwrap().clone()
    }

    fn record(&self, live_path: &Path) -> Result<(), DeployError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.live_paths.lock().unwrap().push(live_path.to_path_buf());
        if self.fail {
            return Err(DeployError::HookFailed {
                name: self.name.clone(),
                reason: "exit code 1".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl InstallHook for RecordingHook {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, live_path: &Path) -> Result<(), DeployError> {
        self.record(live_path)
    }
}

#[async_trait]
impl Launcher for RecordingHook {
    async fn launch(&self, live_path: &Path) -> Result<(), DeployError> {
        self.record(live_path)
    }
}
