//! Restore pipeline.
//!
//! ```text
//! start -> safety-snapshot -> services-stopped
//!       -> category-restored[config|code|webui|memory|scripts|logs|models]
//!       -> patches-applied -> services-started -> verified -> done
//! ```
//!
//! `failed` is reachable from any step. A safety snapshot is always taken
//! before anything live is touched, so recovery from a failed run is another
//! restore pointed at that snapshot. Live paths are moved aside, never deleted.

mod restorer;
mod state;

pub use restorer::{RestoreError, RestoreOptions, Restorer, MOVED_ASIDE_MARKER};
pub use state::{RestoreReport, RestoreState};
