use std::fmt;
use std::path::PathBuf;

use crate::runtime::LivenessResult;
use crate::snapshot::Category;
use crate::util::RunOutcome;

/// Pipeline states, in the order a successful run visits them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreState {
    Start,
    SafetySnapshot,
    ServicesStopped,
    CategoryRestored(Category),
    PatchesApplied,
    ServicesStarted,
    Verified,
    Done,
    /// Absorbing; reachable from any step
    Failed,
}

impl RestoreState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RestoreState::Done | RestoreState::Failed)
    }

    /// Whether live files may have been overwritten once this state is reached
    pub fn touches_live_state(&self) -> bool {
        matches!(
            self,
            RestoreState::CategoryRestored(_)
                | RestoreState::PatchesApplied
                | RestoreState::ServicesStarted
                | RestoreState::Verified
                | RestoreState::Done
        )
    }
}

impl fmt::Display for RestoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestoreState::Start => f.write_str("start"),
            RestoreState::SafetySnapshot => f.write_str("safety-snapshot"),
            RestoreState::ServicesStopped => f.write_str("services-stopped"),
            RestoreState::CategoryRestored(c) => write!(f, "category-restored[{}]", c.dir_name()),
            RestoreState::PatchesApplied => f.write_str("patches-applied"),
            RestoreState::ServicesStarted => f.write_str("services-started"),
            RestoreState::Verified => f.write_str("verified"),
            RestoreState::Done => f.write_str("done"),
            RestoreState::Failed => f.write_str("failed"),
        }
    }
}

/// Everything a restore run did
#[derive(Debug, Clone)]
pub struct RestoreReport {
    /// Name of the snapshot restored from
    pub snapshot: String,
    /// Rollback point created at the start of the run
    pub safety_snapshot: Option<PathBuf>,
    /// States entered, in order
    pub transitions: Vec<RestoreState>,
    pub warnings: Vec<String>,
    /// Categories the snapshot did not carry
    pub untouched: Vec<Category>,
    /// Where each overwritten live path was moved
    pub moved_aside: Vec<PathBuf>,
    pub liveness: Option<LivenessResult>,
    /// Why the run ended in `failed`
    pub failure: Option<String>,
}

impl RestoreReport {
    pub(crate) fn new(snapshot: String) -> Self {
        Self {
            snapshot,
            safety_snapshot: None,
            transitions: vec![RestoreState::Start],
            warnings: Vec::new(),
            untouched: Vec::new(),
            moved_aside: Vec::new(),
            liveness: None,
            failure: None,
        }
    }

    pub(crate) fn enter(&mut self, state: RestoreState) {
        tracing::info!(state = %state, "Restore state");
        self.transitions.push(state);
    }

    pub fn final_state(&self) -> RestoreState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(RestoreState::Start)
    }

    pub fn is_done(&self) -> bool {
        self.final_state() == RestoreState::Done
    }

    pub fn reached(&self, state: RestoreState) -> bool {
        self.transitions.contains(&state)
    }

    pub fn outcome(&self) -> RunOutcome {
        let failed = usize::from(self.final_state() == RestoreState::Failed);
        RunOutcome::from_counts(failed, self.warnings.len())
    }
}
