//! Observable results of reconciliation.

use crate::core::DeployError;
use crate::oracle::VersionRecord;
use crate::state::InstallationState;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// States of the reconciliation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePhase {
    Checking,
    UpToDate,
    Updating,
    Fetching,
    Swapping,
    Persisting,
    Done,
    RetryWait,
    Fatal,
}

impl fmt::Display for ReconcilePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Checking => "CHECKING",
            Self::UpToDate => "UP_TO_DATE",
            Self::Updating => "UPDATING",
            Self::Fetching => "FETCHING",
            Self::Swapping => "SWAPPING",
            Self::Persisting => "PERSISTING",
            Self::Done => "DONE",
            Self::RetryWait => "RETRY_WAIT",
            Self::Fatal => "FATAL",
        };
        f.write_str(name)
    }
}

/// How a successful cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The live installation already matched the latest version.
    UpToDate {
        version: VersionRecord,
        state: InstallationState,
    },
    /// A new snapshot was promoted and recorded.
    Installed {
        version: VersionRecord,
        previous_id: Option<String>,
        state: InstallationState,
    },
}

impl CycleOutcome {
    pub fn version(&self) -> &VersionRecord {
        match self {
            Self::UpToDate { version, .. } | Self::Installed { version, .. } => version,
        }
    }

    pub fn state(&self) -> &InstallationState {
        match self {
            Self::UpToDate { state, .. } | Self::Installed { state, .. } => state,
        }
    }

    pub const fn installed(&self) -> bool {
        matches!(self, Self::Installed { .. })
    }
}

/// Trace of one reconciliation cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Every phase entered, in order.
    pub transitions: Vec<ReconcilePhase>,
    /// Attempts made, including the successful one.
    pub attempts: u32,
    /// Delay slept in each `RETRY_WAIT`.
    pub retry_delays: Vec<Duration>,
    pub outcome: CycleOutcome,
}

impl CycleReport {
    /// Number of times the cycle entered `phase`.
    pub fn count(&self, phase: ReconcilePhase) -> usize {
        self.transitions.iter().filter(|p| **p == phase).count()
    }
}

/// Result of one external collaborator.
#[derive(Debug, Clone)]
pub struct HookReport {
    pub name: String,
    pub error: Option<DeployError>,
}

impl HookReport {
    pub const fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of `sync`: one cycle plus the collaborators around it.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub cycle: CycleReport,
    pub provisioning: Option<HookReport>,
    pub dependencies: Option<HookReport>,
    pub launched: bool,
}

impl SyncReport {
    /// `Some(false)` when the dependency install ran and failed.
    pub fn dependencies_ok(&self) -> Option<bool> {
        self.dependencies.as_ref().map(HookReport::succeeded)
    }
}

/// Result of a watch session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchSummary {
    pub cycles: u32,
    pub installs: u32,
    pub failures: u32,
}

/// Result of `check`: remote truth versus the local record.
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub latest: VersionRecord,
    pub installed: Option<InstallationState>,
}

impl CheckReport {
    pub fn update_available(&self) -> bool {
        self.installed.as_ref().is_none_or(|state| state.installed_id != self.latest.id)
    }
}

/// Whether the live tree can be trusted to be what the state record says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveAssessment {
    /// No state record.
    NotInstalled,
    /// A record exists but the live directory is missing or empty.
    Missing,
    /// Digest verification is disabled; the record is taken at its word.
    Unverified,
    /// The live tree matches the recorded digest.
    Verified,
    /// The record cannot be confirmed against the live tree.
    Doubtful { reason: String },
}

impl LiveAssessment {
    pub const fn is_trusted(&self) -> bool {
        matches!(self, Self::Verified | Self::Unverified)
    }
}

impl fmt::Display for LiveAssessment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInstalled => f.write_str("not installed"),
            Self::Missing => f.write_str("live directory missing"),
            Self::Unverified => f.write_str("not verified (digest check disabled)"),
            Self::Verified => f.write_str("verified"),
            Self::Doubtful { reason } => write!(f, "doubtful: {reason}"),
        }
    }
}

/// Result of `status`: the local record and how far it can be trusted.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub live_path: PathBuf,
    pub state_path: PathBuf,
    pub state: Option<InstallationState>,
    pub assessment: LiveAssessment,
}
