//! The reconciliation loop.
//!
//! A [`Reconciler`] compares the remote "latest" with what is installed and, on
//! drift, fetches and promotes a fresh snapshot. One cycle walks this state
//! machine:
//!
//! ```text
//! CHECKING ─┬─> UP_TO_DATE
//!           └─> UPDATING ─> FETCHING ─> SWAPPING ─> PERSISTING ─> DONE
//!
//! any phase ──(transient)──> RETRY_WAIT ──> CHECKING
//! any phase ──(other / exhausted)──> FATAL
//! ```
//!
//! Components never retry on their own; every retry decision is made here from
//! [`DeployError::class`]. `CHECKING` re-queries the oracle on every attempt,
//! since "latest" may have moved during the wait.
//!
//! # Locking
//!
//! After the oracle answers, the cycle takes the [`InstallLock`] for the live
//! path and holds it through `PERSISTING` (and through post-install hooks).
//! Under the lock it first repairs any interrupted promote and sweeps stale
//! staging directories, then reads the state record.
//!
//! # Trust
//!
//! A matching `installed_id` is only trusted if the live tree still matches the
//! recorded digest (see [`LiveAssessment`]). Anything doubtful is reinstalled.

mod report;
mod retry;
mod shutdown;

pub use report::{
    CheckReport, CycleOutcome, CycleReport, HookReport, LiveAssessment, ReconcilePhase,
    StatusReport, SyncReport, WatchSummary,
};
pub use retry::RetryPolicy;
pub use shutdown::Shutdown;

use crate::config::{ResolvedConfig, credential_provider};
use crate::core::DeployError;
use crate::hooks::{CommandHook, InstallHook, Launcher, Provisioner};
use crate::oracle::{HttpVersionOracle, VersionOracle};
use crate::snapshot::{HttpSnapshotFetcher, SnapshotFetcher, StagingArea, verify_manifest};
use crate::state::{InstallationState, StateStore};
use crate::swap::{InstallLock, InstallationSwapper};
use crate::utils::fs::is_non_empty_dir;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Reconciler knobs that are not components.
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub live_path: PathBuf,
    pub retry: RetryPolicy,
    /// How long to wait for the install lock; zero fails fast.
    pub lock_timeout: Duration,
    /// Verify the live tree against the recorded digest before trusting it.
    pub verify_live_digest: bool,
}

impl ReconcilerSettings {
    pub fn new(live_path: impl Into<PathBuf>) -> Self {
        Self {
            live_path: live_path.into(),
            retry: RetryPolicy::default(),
            lock_timeout: Duration::ZERO,
            verify_live_digest: true,
        }
    }
}

/// Orchestrates oracle, fetcher, swapper and state store.
pub struct Reconciler {
    oracle: Arc<dyn VersionOracle>,
    fetcher: Arc<dyn SnapshotFetcher>,
    store: StateStore,
    swapper: InstallationSwapper,
    staging: Option<StagingArea>,
    settings: ReconcilerSettings,
    provisioner: Option<Arc<dyn InstallHook>>,
    dependency_installer: Option<Arc<dyn InstallHook>>,
    launcher: Option<Arc<dyn Launcher>>,
}

impl Reconciler {
    pub fn new(
        settings: ReconcilerSettings,
        oracle: Arc<dyn VersionOracle>,
        fetcher: Arc<dyn SnapshotFetcher>,
        store: StateStore,
    ) -> Self {
        Self {
            oracle,
            fetcher,
            store,
            swapper: InstallationSwapper::new(),
            staging: None,
            settings,
            provisioner: None,
            dependency_installer: None,
            launcher: None,
        }
    }

    /// Wires the HTTP oracle and fetcher and the configured hooks.
    pub fn from_config(config: &ResolvedConfig) -> Result<Self, DeployError> {
        let credentials = credential_provider(config);
        let staging = StagingArea::new(&config.staging_root);

        let oracle = HttpVersionOracle::new(
            &config.oracle_url,
            &config.user_agent,
            config.oracle_timeout,
            Arc::clone(&credentials),
        )?;
        let fetcher = HttpSnapshotFetcher::new(
            &config.snapshot_template,
            staging.clone(),
            &config.user_agent,
            config.snapshot_timeout,
            credentials,
        )?;

        let settings = ReconcilerSettings {
            live_path: config.live_path.clone(),
            retry: config.retry,
            lock_timeout: config.lock_timeout,
            verify_live_digest: config.verify_live_digest,
        };
        let mut reconciler = Self::new(
            settings,
            Arc::new(oracle),
            Arc::new(fetcher),
            StateStore::new(&config.state_path),
        )
        .with_staging(staging);

        if !config.provision.is_empty() {
            reconciler =
                reconciler.with_provisioner(Arc::new(Provisioner::new(config.provision.clone())));
        }
        if let Some(argv) = &config.dependency_install {
            reconciler = reconciler.with_dependency_installer(Arc::new(CommandHook::new(
                "dependency install",
                argv.clone(),
                config.hook_timeout,
            )?));
        }
        if let Some(argv) = &config.launch {
            reconciler = reconciler.with_launcher(Arc::new(CommandHook::new(
                "launch",
                argv.clone(),
                config.hook_timeout,
            )?));
        }
        Ok(reconciler)
    }

    /// Staging area swept of leftovers under the lock before each attempt.
    #[must_use]
    pub fn with_staging(mut self, staging: StagingArea) -> Self {
        self.staging = Some(staging);
        self
    }

    #[must_use]
    pub fn with_provisioner(mut self, hook: Arc<dyn InstallHook>) -> Self {
        self.provisioner = Some(hook);
        self
    }

    #[must_use]
    pub fn with_dependency_installer(mut self, hook: Arc<dyn InstallHook>) -> Self {
        self.dependency_installer = Some(hook);
        self
    }

    #[must_use]
    pub fn with_launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn live_path(&self) -> &Path {
        &self.settings.live_path
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Runs one cycle to `UP_TO_DATE`/`DONE`, retrying transient failures.
    pub async fn run_cycle(&self, shutdown: &mut Shutdown) -> Result<CycleReport, DeployError> {
        let (report, _lock) = self.reconcile(shutdown).await?;
        Ok(report)
    }

    /// Install-and-exit: one cycle, post-install hooks, then launch.
    ///
    /// A failed dependency install is reported, never rolled back, and
    /// suppresses the launch.
    pub async fn sync(&self, shutdown: &mut Shutdown) -> Result<SyncReport, DeployError> {
        let (cycle, lock) = self.reconcile(shutdown).await?;
        let (provisioning, dependencies) = self.post_install(&cycle.outcome).await;
        drop(lock);

        let mut report = SyncReport {
            cycle,
            provisioning,
            dependencies,
            launched: false,
        };

        if report.dependencies_ok() == Some(false) {
            warn!(live_path = %self.live_path().display(), "Dependencies are broken; not launching");
            return Ok(report);
        }
        if let Some(launcher) = &self.launcher {
            launcher.launch(self.live_path()).await?;
            report.launched = true;
        }
        Ok(report)
    }

    /// Daemon mode: cycles separated by `interval` until `shutdown` fires.
    ///
    /// Failed cycles are logged and the loop keeps going; only cancellation
    /// ends it (or `max_cycles`, when set). Never launches.
    pub async fn watch(
        &self,
        shutdown: &mut Shutdown,
        interval: Duration,
        max_cycles: Option<u32>,
    ) -> WatchSummary {
        let mut summary = WatchSummary::default();
        info!(live_path = %self.live_path().display(), interval_secs = interval.as_secs(), "Watching for updates");

        loop {
            match self.reconcile(shutdown).await {
                Ok((cycle, lock)) => {
                    if cycle.outcome.installed() {
                        summary.installs += 1;
                    }
                    self.post_install(&cycle.outcome).await;
                    drop(lock);
                }
                Err(DeployError::Cancelled) => break,
                Err(e) => {
                    summary.failures += 1;
                    error!(error = %e, class = %e.class(), "Reconciliation cycle failed");
                }
            }
            summary.cycles += 1;

            if max_cycles.is_some_and(|max| summary.cycles >= max) {
                break;
            }
            if shutdown.wait(interval).await {
                break;
            }
        }

        info!(cycles = summary.cycles, installs = summary.installs, "Stopped watching");
        summary
    }

    /// Compares the remote latest with the state record. Takes no lock and writes nothing.
    pub async fn check(&self) -> Result<CheckReport, DeployError> {
        let latest = self.oracle.resolve().await?;
        let installed = self.store.read().await;
        Ok(CheckReport {
            latest,
            installed,
        })
    }

    /// Reports the state record and whether the live tree still matches it.
    pub async fn status(&self) -> StatusReport {
        let state = self.store.read().await;
        let assessment = self.assess(state.as_ref()).await;
        StatusReport {
            live_path: self.settings.live_path.clone(),
            state_path: self.store.path().to_path_buf(),
            state,
            assessment,
        }
    }

    async fn reconcile(
        &self,
        shutdown: &mut Shutdown,
    ) -> Result<(CycleReport, InstallLock), DeployError> {
        let policy = self.settings.retry;
        let mut transitions = Vec::new();
        let mut retry_delays = Vec::new();
        let mut attempt = 1;

        loop {
            match self.attempt(&mut transitions).await {
                Ok((outcome, lock)) => {
                    return Ok((
                        CycleReport {
                            transitions,
                            attempts: attempt,
                            retry_delays,
                            outcome,
                        },
                        lock,
                    ));
                }
                Err(e) if e.is_transient() && policy.allows_retry_after(attempt) => {
                    let delay = policy.delay_after(attempt);
                    enter(&mut transitions, ReconcilePhase::RetryWait);
                    retry_delays.push(delay);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Transient failure, retrying"
                    );
                    if shutdown.wait(delay).await {
                        info!(attempt, "Reconciliation cancelled during retry wait");
                        return Err(DeployError::Cancelled);
                    }
                    attempt += 1;
                }
                Err(e) => {
                    enter(&mut transitions, ReconcilePhase::Fatal);
                    let error = if e.is_transient() {
                        DeployError::RetriesExhausted {
                            attempts: attempt,
                            last: Box::new(e),
                        }
                    } else {
                        e
                    };
                    error!(attempt, class = %error.class(), error = %error, "Reconciliation failed");
                    return Err(error);
                }
            }
        }
    }

    async fn attempt(
        &self,
        transitions: &mut Vec<ReconcilePhase>,
    ) -> Result<(CycleOutcome, InstallLock), DeployError> {
        let live = &self.settings.live_path;

        enter(transitions, ReconcilePhase::Checking);
        let latest = self.oracle.resolve().await?;

        let lock = InstallLock::acquire(live, self.settings.lock_timeout).await?;
        let recovery = self.swapper.recover(live).await?;
        if recovery.restored {
            warn!(live_path = %live.display(), "Recovered from an interrupted promote");
        }
        if let Some(staging) = &self.staging {
            staging.sweep().await;
        }

        let state = self.store.read().await;
        let assessment = self.assess(state.as_ref()).await;

        if let Some(current) = &state
            && current.installed_id == latest.id
            && assessment.is_trusted()
        {
            enter(transitions, ReconcilePhase::UpToDate);
            let refreshed = current.checked_now();
            if let Err(e) = self.store.write(&refreshed).await {
                warn!(error = %e, "Failed to record check time");
            }
            info!(version_id = %latest.short_id(), "Installation is up to date");
            return Ok((
                CycleOutcome::UpToDate {
                    version: latest,
                    state: refreshed,
                },
                lock,
            ));
        }

        enter(transitions, ReconcilePhase::Updating);
        info!(
            version_id = %latest.short_id(),
            installed_id = state.as_ref().map_or("none", |s| s.installed_id.as_str()),
            assessment = %assessment,
            "Installing latest version"
        );

        enter(transitions, ReconcilePhase::Fetching);
        let snapshot = self.fetcher.fetch(&latest.id).await?;
        let digest = snapshot.digest.clone();
        let manifest = snapshot.manifest.clone();

        enter(transitions, ReconcilePhase::Swapping);
        self.swapper.promote(snapshot, live).await?;

        enter(transitions, ReconcilePhase::Persisting);
        let installed = InstallationState::promoted(latest.id.clone(), Some(digest));
        self.store.write_manifest(&manifest).await?;
        self.store.write(&installed).await?;

        enter(transitions, ReconcilePhase::Done);
        Ok((
            CycleOutcome::Installed {
                version: latest,
                previous_id: state.map(|s| s.installed_id),
                state: installed,
            },
            lock,
        ))
    }

    async fn assess(&self, state: Option<&InstallationState>) -> LiveAssessment {
        let Some(state) = state else {
            return LiveAssessment::NotInstalled;
        };
        let live = self.settings.live_path.clone();
        if !is_non_empty_dir(&live) {
            return LiveAssessment::Missing;
        }
        if !self.settings.verify_live_digest {
            return LiveAssessment::Unverified;
        }

        let Some(expected) = state.content_digest.clone() else {
            return LiveAssessment::Doubtful {
                reason: "no content digest recorded".to_string(),
            };
        };
        let Some(manifest) = self.store.read_manifest().await else {
            return LiveAssessment::Doubtful {
                reason: "no content manifest recorded".to_string(),
            };
        };

        let verified =
            tokio::task::spawn_blocking(move || verify_manifest(&live, &manifest, &expected)).await;
        match verified {
            Ok(Ok(())) => LiveAssessment::Verified,
            Ok(Err(e)) => LiveAssessment::Doubtful {
                reason: e.to_string(),
            },
            Err(e) => LiveAssessment::Doubtful {
                reason: format!("verification task failed: {e}"),
            },
        }
    }

    /// Provisioning on every successful cycle; dependency install after a
    /// promote or while the last one is unresolved.
    async fn post_install(
        &self,
        outcome: &CycleOutcome,
    ) -> (Option<HookReport>, Option<HookReport>) {
        let live = self.live_path();

        let provisioning = match &self.provisioner {
            Some(hook) => Some(run_hook(hook.as_ref(), live).await),
            None => None,
        };

        let state = outcome.state();
        let needs_dependencies = outcome.installed() || state.dependencies_ok != Some(true);
        let dependencies = match &self.dependency_installer {
            Some(hook) if needs_dependencies => {
                let report = run_hook(hook.as_ref(), live).await;
                let updated = InstallationState {
                    dependencies_ok: Some(report.succeeded()),
                    ..state.clone()
                };
                if let Err(e) = self.store.write(&updated).await {
                    warn!(error = %e, "Failed to record dependency install result");
                }
                Some(report)
            }
            _ => None,
        };

        (provisioning, dependencies)
    }
}

async fn run_hook(hook: &dyn InstallHook, live: &Path) -> HookReport {
    let error = match hook.run(live).await {
        Ok(()) => None,
        Err(e) => {
            warn!(hook = hook.name(), error = %e, "Post-install hook failed");
            Some(e)
        }
    };
    HookReport {
        name: hook.name().to_string(),
        error,
    }
}

fn enter(transitions: &mut Vec<ReconcilePhase>, phase: ReconcilePhase) {
    debug!(phase = %phase, "Reconciler transition");
    transitions.push(phase);
}
