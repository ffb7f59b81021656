//! Staged operator-facing progress output
//!
//! Every pipeline stage prints one line group:
//!
//! ```text
//! ==> Stopping services
//!   ok    agent-zero stopped
//!   warn  redis was not running
//! ```
//!
//! The same events are mirrored to `tracing` so the log file carries them too.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

/// Final three-way outcome shared by backup, verify and restore
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    SucceededWithWarnings,
    Failed,
}

impl RunOutcome {
    /// Derive the outcome from failure/warning counts
    pub fn from_counts(failures: usize, warnings: usize) -> Self {
        if failures > 0 {
            RunOutcome::Failed
        } else if warnings > 0 {
            RunOutcome::SucceededWithWarnings
        } else {
            RunOutcome::Succeeded
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Succeeded => "succeeded",
            RunOutcome::SucceededWithWarnings => "succeeded with warnings",
            RunOutcome::Failed => "failed",
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress printer. Cheap to clone; clones share the same sink.
#[derive(Clone)]
pub struct Progress {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Default for Progress {
    fn default() -> Self {
        Self::stdout()
    }
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress").finish_non_exhaustive()
    }
}

impl Progress {
    /// Print to stdout
    pub fn stdout() -> Self {
        Self::to_writer(io::stdout())
    }

    /// Discard all output (tests, nested runs)
    pub fn quiet() -> Self {
        Self::to_writer(io::sink())
    }

    pub fn to_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    fn line(&self, text: fmt::Arguments<'_>) {
        let mut sink = self.sink.lock();
        // Progress output is best-effort; a closed stdout must not abort a restore.
        let _ = writeln!(sink, "{text}");
        let _ = sink.flush();
    }

    /// Start a new stage group
    pub fn stage(&self, name: &str) {
        tracing::info!(stage = name, "Stage started");
        self.line(format_args!("==> {name}"));
    }

    pub fn ok(&self, message: impl fmt::Display) {
        tracing::info!("{message}");
        self.line(format_args!("  ok    {message}"));
    }

    pub fn info(&self, message: impl fmt::Display) {
        tracing::info!("{message}");
        self.line(format_args!("  info  {message}"));
    }

    pub fn warn(&self, message: impl fmt::Display) {
        tracing::warn!("{message}");
        self.line(format_args!("  warn  {message}"));
    }

    pub fn fail(&self, message: impl fmt::Display) {
        tracing::error!("{message}");
        self.line(format_args!("  FAIL  {message}"));
    }

    /// Print the closing summary block
    pub fn summary(&self, operation: &str, outcome: RunOutcome, warnings: &[String]) {
        self.line(format_args!(""));
        self.line(format_args!("{operation} {outcome}"));
        for warning in warnings {
            self.line(format_args!("  - {warning}"));
        }
    }
}
