//! Utility modules

pub mod fs;
pub mod names;
pub mod paths;
pub mod progress;

pub use names::{host_identity, operator_identity, snapshot_name};
pub use paths::{data_dir, init_data_dir, log_file_path, logs_dir};
pub use progress::{Progress, RunOutcome};
