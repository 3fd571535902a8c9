//! Run history kept in .funnelcache.json (nearest one found, else the global one).

use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::config::{resolve_file, CACHE_FILE};
use crate::error::{utils::io_error, FunnelError};
use crate::utils::log_error;

/// Oldest records are dropped beyond this.
pub const MAX_RECORDS: usize = 50;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub command: String,
    pub tasks: usize,
    pub concurrency: usize,
    pub succeeded: bool,
    pub duration_ms: u64,
    pub finished_at: String,
}

impl RunRecord {
    pub fn new(command: &str, tasks: usize, concurrency: usize, succeeded: bool, duration_ms: u64) -> Self {
        Self {
            command: command.to_string(),
            tasks,
            concurrency,
            succeeded,
            duration_ms,
            finished_at: Local::now().to_rfc3339(),
        }
    }
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct RunHistory {
    #[serde(default)]
    runs: Vec<RunRecord>,
}

/// File that history is read from and appended to.
pub fn history_path(cwd: &Path, home: Option<&Path>) -> PathBuf {
    match resolve_file(CACHE_FILE, cwd, home) {
        Some(resolved) => resolved.filepath,
        None => home.unwrap_or(cwd).join(CACHE_FILE),
    }
}

fn read_history(path: &Path) -> RunHistory {
    let Ok(s) = std::fs::read_to_string(path) else {
        return RunHistory::default();
    };
    serde_json::from_str(&s).unwrap_or_else(|e| {
        log_error(&format!("discarding unreadable history {}: {}", path.display(), e));
        RunHistory::default()
    })
}

/// Append a record, trimming to [`MAX_RECORDS`]. Returns the file written.
pub fn record_run(cwd: &Path, home: Option<&Path>, record: RunRecord) -> Result<PathBuf, FunnelError> {
    let path = history_path(cwd, home);
    let mut history = read_history(&path);
    history.runs.push(record);
    if history.runs.len() > MAX_RECORDS {
        let excess = history.runs.len() - MAX_RECORDS;
        history.runs.drain(..excess);
    }
    let body = serde_json::to_string_pretty(&history)?;
    let path_str = path.to_string_lossy().to_string();
    std::fs::write(&path, body).map_err(|e| io_error("record_run", Some(&path_str), e))?;
    Ok(path)
}

/// Recorded runs, oldest first. No file means no history.
pub fn load_history(cwd: &Path, home: Option<&Path>) -> Vec<RunRecord> {
    read_history(&history_path(cwd, home)).runs
}
