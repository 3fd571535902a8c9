use std::env;
use std::fs::OpenOptions;
use std::io::Write;

use chrono::Local;

/// Console verbosity, from `FUNNEL_LOG`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Info,
    Debug,
}

impl LogLevel {
    fn label(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

/// Parse a `FUNNEL_LOG` value. Unknown values fall back to info.
pub fn parse_log_level(value: &str) -> LogLevel {
    match value.trim().to_lowercase().as_str() {
        "quiet" | "error" => LogLevel::Error,
        "debug" | "trace" => LogLevel::Debug,
        _ => LogLevel::Info,
    }
}

fn max_level() -> LogLevel {
    env::var("FUNNEL_LOG")
        .map(|v| parse_log_level(&v))
        .unwrap_or(LogLevel::Info)
}

fn is_quiet() -> bool {
    env::var("FUNNEL_QUIET")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false)
}

fn format_line(level: LogLevel, message: &str) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    format!("[{}] {}: {}", timestamp, level.label(), message)
}

fn emit(level: LogLevel, message: &str) {
    if level > max_level() {
        return;
    }
    let line = format_line(level, message);

    // stdout belongs to command output
    if !is_quiet() {
        eprintln!("{}", line);
    }

    if let Ok(path) = env::var("FUNNEL_LOG_FILE") {
        if path.trim().is_empty() {
            return;
        }
        // Append-only: this runs from many tasks at once
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path.trim()) {
            let _ = writeln!(file, "{}", line);
        }
    }
}

pub fn log(message: &str) {
    emit(LogLevel::Info, message);
}

pub fn log_error(message: &str) {
    emit(LogLevel::Error, message);
}

pub fn log_debug(message: &str) {
    emit(LogLevel::Debug, message);
}
