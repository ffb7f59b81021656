//! Revision-control collaborator

mod revision;
mod status;

pub use revision::{
    apply_patch, capture_revision_state, patch_already_applied, GitError, GitRepo, RevisionState,
    NO_REVISION,
};
pub use status::GitDiffStats;
