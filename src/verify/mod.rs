//! Read-only snapshot inspection.
//!
//! The verifier opens a snapshot directory or archive, runs the six check
//! groups in order, and returns a [`VerificationReport`]. Archives are
//! extracted into a scratch directory that is removed when verification
//! ends, whatever the outcome.

mod checks;
mod report;

use std::path::Path;

use thiserror::Error;

use crate::config::VerifyConfig;
use crate::snapshot::{ArchiveError, OpenedSnapshot};

pub use checks::ENV_FILE;
pub use report::{CheckGroup, CheckResult, CheckStatus, Verdict, VerificationReport};

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("Cannot open snapshot {path}: {source}")]
    Inaccessible {
        path: String,
        #[source]
        source: ArchiveError,
    },
}

pub struct Verifier {
    config: VerifyConfig,
}

impl Verifier {
    pub fn new(config: VerifyConfig) -> Self {
        Self { config }
    }

    /// Verify the snapshot at `path`. `detailed` adds per-file checks.
    pub fn verify(&self, path: &Path, detailed: bool) -> Result<VerificationReport, VerifyError> {
        let opened = OpenedSnapshot::open(path).map_err(|source| VerifyError::Inaccessible {
            path: path.display().to_string(),
            source,
        })?;
        tracing::info!(
            snapshot = %path.display(),
            extracted = opened.is_extracted(),
            detailed,
            "Verifying snapshot"
        );

        let mut report = VerificationReport::new(opened.name());
        let ctx = checks::CheckContext::new(opened.root(), &self.config, detailed);
        checks::run_all(&ctx, &mut report);

        tracing::info!(
            snapshot = %report.snapshot,
            passes = report.passes(),
            warnings = report.warnings(),
            failures = report.failures(),
            verdict = %report.verdict(),
            "Verification finished"
        );
        Ok(report)
    }
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new(VerifyConfig::default())
    }
}
