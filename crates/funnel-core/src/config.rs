//! Settings from .funnelrc.json, found in the current directory, one of its
//! ancestors, or the home directory. CLI flags and env override these.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{utils::config_error, utils::io_error, FunnelError};

pub const CONFIG_FILE: &str = ".funnelrc.json";
pub const CACHE_FILE: &str = ".funnelcache.json";

/// Where a config or cache file lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Location {
    /// Current directory or one of its ancestors
    Local,
    /// Home directory
    Global,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local => write!(f, "local"),
            Location::Global => write!(f, "global"),
        }
    }
}

/// A file found by [`resolve_file`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedFile {
    pub dir: PathBuf,
    pub filepath: PathBuf,
    pub location: Location,
}

/// Home directory; `FUNNEL_HOME` overrides the platform default.
pub fn home_dir() -> Option<PathBuf> {
    if let Ok(dir) = env::var("FUNNEL_HOME") {
        if !dir.trim().is_empty() {
            return Some(PathBuf::from(dir.trim()));
        }
    }
    dirs::home_dir()
}

/// Directory a setup command writes to.
pub fn location_dir(location: Location, cwd: &Path, home: Option<&Path>) -> Result<PathBuf, FunnelError> {
    match location {
        Location::Local => Ok(cwd.to_path_buf()),
        Location::Global => home.map(Path::to_path_buf).ok_or_else(|| {
            config_error("location_dir", None, "could not determine the home directory")
        }),
    }
}

/// Look for `filename` in `cwd`, then each ancestor, then `home`.
pub fn resolve_file(filename: &str, cwd: &Path, home: Option<&Path>) -> Option<ResolvedFile> {
    let candidates = cwd.ancestors().chain(home);
    for dir in candidates {
        let filepath = dir.join(filename);
        if filepath.is_file() {
            let location = if Some(dir) == home {
                Location::Global
            } else {
                Location::Local
            };
            return Some(ResolvedFile {
                dir: dir.to_path_buf(),
                filepath,
                location,
            });
        }
    }
    None
}

/// One configurable setting, in questionnaire order.
pub struct SettingInfo {
    pub key: &'static str,
    pub question: &'static str,
}

pub const SETTINGS: &[SettingInfo] = &[
    SettingInfo {
        key: "concurrency",
        question: "how many tasks may run at the same time?",
    },
    SettingInfo {
        key: "shell",
        question: "which shell should run commands?",
    },
    SettingInfo {
        key: "timeout",
        question: "per-task timeout in seconds?",
    },
];

/// Settings as stored on disk. Unset keys are omitted.
#[derive(Default, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl Config {
    /// Current value of a setting, formatted for display.
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "concurrency" => self.concurrency.map(|v| v.to_string()),
            "shell" => self.shell.clone(),
            "timeout" => self.timeout.map(|v| v.to_string()),
            _ => None,
        }
    }

    /// Parse and store a setting from user input.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), FunnelError> {
        let value = value.trim();
        match key {
            "concurrency" => self.concurrency = Some(parse_concurrency(value, "concurrency")?),
            "shell" => {
                if value.is_empty() {
                    return Err(config_error("set", Some(key), "shell must not be empty"));
                }
                self.shell = Some(value.to_string());
            }
            "timeout" => {
                let secs = value.parse::<u64>().ok().filter(|s| *s > 0).ok_or_else(|| {
                    config_error(
                        "set",
                        Some(key),
                        &format!("expected a positive number of seconds, got {:?}", value),
                    )
                })?;
                self.timeout = Some(secs);
            }
            _ => return Err(config_error("set", Some(key), "unknown setting")),
        }
        Ok(())
    }
}

fn parse_concurrency(value: &str, field: &str) -> Result<usize, FunnelError> {
    value.trim().parse::<usize>().ok().filter(|n| *n > 0).ok_or_else(|| {
        config_error(
            "concurrency",
            Some(field),
            &format!("expected a positive integer, got {:?}", value.trim()),
        )
    })
}

/// Load config from `path`. Missing file = default; malformed file = error.
pub fn load_config(path: &Path) -> Result<Config, FunnelError> {
    if !path.is_file() {
        return Ok(Config::default());
    }
    let path_str = path.to_string_lossy();
    let s = std::fs::read_to_string(path).map_err(|e| io_error("load_config", Some(&path_str), e))?;
    if s.trim().is_empty() {
        return Ok(Config::default());
    }
    serde_json::from_str(&s).map_err(|e| {
        config_error(
            "load_config",
            None,
            &format!("invalid {}: {}", path_str, e),
        )
    })
}

/// Write config as pretty JSON.
pub fn write_config(path: &Path, config: &Config) -> Result<(), FunnelError> {
    let path_str = path.to_string_lossy();
    let body = serde_json::to_string_pretty(config)?;
    std::fs::write(path, body + "\n").map_err(|e| io_error("write_config", Some(&path_str), e))
}

/// Resolve and load the effective config file, if any.
pub fn read_runtime_config(cwd: &Path, home: Option<&Path>) -> Result<(Config, Option<ResolvedFile>), FunnelError> {
    match resolve_file(CONFIG_FILE, cwd, home) {
        Some(resolved) => Ok((load_config(&resolved.filepath)?, Some(resolved))),
        None => Ok((Config::default(), None)),
    }
}

/// Concurrency precedence: CLI flag, then `env_value`, then config, then CPU count.
pub fn resolve_concurrency(
    cli: Option<usize>,
    env_value: Option<&str>,
    config: &Config,
) -> Result<usize, FunnelError> {
    if let Some(n) = cli {
        return parse_concurrency(&n.to_string(), "--concurrency");
    }
    if let Some(v) = env_value.filter(|v| !v.trim().is_empty()) {
        return parse_concurrency(v, "FUNNEL_CONCURRENCY");
    }
    if let Some(n) = config.concurrency {
        return parse_concurrency(&n.to_string(), "concurrency");
    }
    Ok(num_cpus::get().max(1))
}

/// [`resolve_concurrency`] with `FUNNEL_CONCURRENCY` read from the environment.
pub fn effective_concurrency(cli: Option<usize>, config: &Config) -> Result<usize, FunnelError> {
    let env_value = env::var("FUNNEL_CONCURRENCY").ok();
    resolve_concurrency(cli, env_value.as_deref(), config)
}
