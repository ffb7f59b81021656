//! Verification report model

use std::fmt;

use serde::Serialize;

use crate::util::{Progress, RunOutcome};

/// The six check groups, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckGroup {
    Structure,
    Manifest,
    Configuration,
    Code,
    UiAssets,
    Integrity,
}

impl CheckGroup {
    pub const ALL: [CheckGroup; 6] = [
        CheckGroup::Structure,
        CheckGroup::Manifest,
        CheckGroup::Configuration,
        CheckGroup::Code,
        CheckGroup::UiAssets,
        CheckGroup::Integrity,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            CheckGroup::Structure => "Structural presence",
            CheckGroup::Manifest => "Manifest integrity",
            CheckGroup::Configuration => "Configuration completeness",
            CheckGroup::Code => "Code completeness",
            CheckGroup::UiAssets => "UI-assets completeness",
            CheckGroup::Integrity => "Integrity and size",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub group: CheckGroup,
    pub name: String,
    pub status: CheckStatus,
    pub detail: Option<String>,
}

/// Overall verdict, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    CompleteAndValid,
    UsableWithWarnings,
    CriticalIssues,
}

impl Verdict {
    pub fn from_counts(failures: usize, warnings: usize) -> Self {
        match RunOutcome::from_counts(failures, warnings) {
            RunOutcome::Succeeded => Verdict::CompleteAndValid,
            RunOutcome::SucceededWithWarnings => Verdict::UsableWithWarnings,
            RunOutcome::Failed => Verdict::CriticalIssues,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::CompleteAndValid => "complete-and-valid",
            Verdict::UsableWithWarnings => "usable-with-warnings",
            Verdict::CriticalIssues => "critical-issues",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one verifier run. Never written into the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub snapshot: String,
    pub checks: Vec<CheckResult>,
}

impl VerificationReport {
    pub fn new(snapshot: impl Into<String>) -> Self {
        Self {
            snapshot: snapshot.into(),
            checks: Vec::new(),
        }
    }

    pub fn push(
        &mut self,
        group: CheckGroup,
        name: impl Into<String>,
        status: CheckStatus,
        detail: Option<String>,
    ) {
        self.checks.push(CheckResult {
            group,
            name: name.into(),
            status,
            detail,
        });
    }

    pub fn pass(&mut self, group: CheckGroup, name: impl Into<String>, detail: Option<String>) {
        self.push(group, name, CheckStatus::Pass, detail);
    }

    pub fn warn(&mut self, group: CheckGroup, name: impl Into<String>, detail: impl Into<String>) {
        self.push(group, name, CheckStatus::Warn, Some(detail.into()));
    }

    pub fn fail(&mut self, group: CheckGroup, name: impl Into<String>, detail: impl Into<String>) {
        self.push(group, name, CheckStatus::Fail, Some(detail.into()));
    }

    fn count(&self, status: CheckStatus) -> usize {
        self.checks.iter().filter(|c| c.status == status).count()
    }

    pub fn passes(&self) -> usize {
        self.count(CheckStatus::Pass)
    }

    pub fn warnings(&self) -> usize {
        self.count(CheckStatus::Warn)
    }

    pub fn failures(&self) -> usize {
        self.count(CheckStatus::Fail)
    }

    pub fn verdict(&self) -> Verdict {
        Verdict::from_counts(self.failures(), self.warnings())
    }

    /// Look up a check by name
    pub fn check(&self, name: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.name == name)
    }

    /// Print one stage per group, then the totals and verdict
    pub fn render(&self, progress: &Progress) {
        for group in CheckGroup::ALL {
            let checks: Vec<_> = self.checks.iter().filter(|c| c.group == group).collect();
            if checks.is_empty() {
                continue;
            }
            progress.stage(group.title());
            for check in checks {
                let line = match &check.detail {
                    Some(detail) => format!("{}: {detail}", check.name),
                    None => check.name.clone(),
                };
                match check.status {
                    CheckStatus::Pass => progress.ok(line),
                    CheckStatus::Warn => progress.warn(line),
                    CheckStatus::Fail => progress.fail(line),
                }
            }
        }

        let flagged: Vec<String> = self
            .checks
            .iter()
            .filter(|c| c.status != CheckStatus::Pass)
            .map(|c| c.name.clone())
            .collect();
        progress.summary(
            "Verification",
            RunOutcome::from_counts(self.failures(), self.warnings()),
            &flagged,
        );
        progress.info(format!(
            "{} passed, {} warnings, {} failures: {}",
            self.passes(),
            self.warnings(),
            self.failures(),
            self.verdict()
        ));
    }
}
