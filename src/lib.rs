pub mod cli;
pub mod config;
pub mod deployment;
pub mod git;
pub mod restore;
pub mod runtime;
pub mod snapshot;
pub mod util;
pub mod verify;

pub use config::Config;
pub use deployment::DeploymentHandle;
pub use restore::{RestoreError, RestoreOptions, RestoreReport, RestoreState, Restorer};
pub use runtime::{ProcessManager, ProcessSet, RuntimeController};
pub use snapshot::{BackupOptions, Category, Manifest, SnapshotBuilder, SnapshotError};
pub use verify::{Verdict, VerificationReport, Verifier, VerifyError};
