//! Core library for funnel: capacity limiter, ordered task queue, config, setup and run history.
//! Used by the CLI binary; the task_queue module has no CLI assumptions.

pub mod cache;
pub mod config;
pub mod digest;
pub mod error;
pub mod exec;
pub mod setup;
pub mod task_queue;
pub mod utils;

// Re-export main API for CLI
pub use cache::{load_history, record_run, RunRecord};
pub use config::{effective_concurrency, home_dir, read_runtime_config, Config, Location};
pub use digest::{digest_files, FileDigest};
pub use error::FunnelError;
pub use exec::{default_shell, parse_commands, run_commands, CommandOutput, ExecOptions};
pub use setup::{clean_cache, setup, setup_list};
pub use task_queue::{limiter, CapacityLimiter, OrderedTaskQueue};
pub use utils::{log, log_debug, log_error};
