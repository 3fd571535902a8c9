//! Interactive setup of .funnelrc.json, listing of effective settings, and
//! removal of run-history cache files.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use crate::config::{
    load_config, location_dir, resolve_file, write_config, Config, Location, CACHE_FILE,
    CONFIG_FILE, SETTINGS,
};
use crate::error::{utils::io_error, FunnelError};
use crate::utils::{log, log_error};

fn interrupted() -> FunnelError {
    FunnelError::Interrupted {
        operation: "setup".to_string(),
    }
}

/// Ask one question until the answer parses. An empty answer keeps the current value.
fn ask<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    prompt: &str,
    key: &str,
    config: &mut Config,
) -> Result<(), FunnelError> {
    loop {
        match config.get(key) {
            Some(current) => write!(output, "{} [{}] ", prompt, current)?,
            None => write!(output, "{} ", prompt)?,
        }
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(interrupted());
        }
        let answer = line.trim();
        if answer.is_empty() {
            return Ok(());
        }
        match config.set(key, answer) {
            Ok(()) => return Ok(()),
            Err(err) => writeln!(output, "{}", err)?,
        }
    }
}

/// Run the questionnaire and write the answers to the config file at `location`.
/// Returns the written path.
pub fn setup<R: BufRead, W: Write>(
    location: Location,
    cwd: &Path,
    home: Option<&Path>,
    input: &mut R,
    output: &mut W,
) -> Result<PathBuf, FunnelError> {
    let dir = location_dir(location, cwd, home)?;
    let filepath = dir.join(CONFIG_FILE);
    let mut config = load_config(&filepath).unwrap_or_else(|err| {
        log_error(&format!("ignoring unreadable config: {}", err));
        Config::default()
    });

    writeln!(output, "hit enter to keep the current value.")?;
    for (i, setting) in SETTINGS.iter().enumerate() {
        let prompt = format!("{}/{} | {}", i + 1, SETTINGS.len(), setting.question);
        ask(input, output, &prompt, setting.key, &mut config)?;
    }

    write_config(&filepath, &config)?;
    log(&format!("wrote {} config {}", location, filepath.display()));
    Ok(filepath)
}

/// One line per setting with its effective value, `<empty>` when unset.
pub fn setup_list(cwd: &Path, home: Option<&Path>) -> Result<String, FunnelError> {
    let config = match resolve_file(CONFIG_FILE, cwd, home) {
        Some(resolved) => load_config(&resolved.filepath)?,
        None => Config::default(),
    };
    let lines: Vec<String> = SETTINGS
        .iter()
        .enumerate()
        .map(|(i, setting)| {
            format!(
                "{}/{} | {} {}",
                i + 1,
                SETTINGS.len(),
                setting.question,
                config.get(setting.key).unwrap_or_else(|| "<empty>".to_string())
            )
        })
        .collect();
    Ok(lines.join("\n"))
}

/// Delete every run-history cache file visible from `cwd`, nearest first.
/// Returns the removed paths.
pub fn clean_cache(cwd: &Path, home: Option<&Path>) -> Result<Vec<PathBuf>, FunnelError> {
    let mut removed = Vec::new();
    while let Some(resolved) = resolve_file(CACHE_FILE, cwd, home) {
        let path_str = resolved.filepath.to_string_lossy().to_string();
        std::fs::remove_file(&resolved.filepath)
            .map_err(|e| io_error("clean_cache", Some(&path_str), e))?;
        log(&format!("removed {} cache {}", resolved.location, path_str));
        removed.push(resolved.filepath);
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn layout() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let home = tmp.path().join("home");
        let project = home.join("project");
        std::fs::create_dir_all(&project).unwrap();
        (tmp, home, project)
    }

    #[test]
    fn test_setup_writes_answers() {
        let (_tmp, home, project) = layout();
        let mut input = Cursor::new("3\nbash\n\n");
        let mut output = Vec::new();

        let path = setup(Location::Local, &project, Some(&home), &mut input, &mut output).unwrap();
        assert_eq!(path, project.join(CONFIG_FILE));

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.concurrency, Some(3));
        assert_eq!(cfg.shell.as_deref(), Some("bash"));
        assert_eq!(cfg.timeout, None);

        let prompts = String::from_utf8(output).unwrap();
        assert!(prompts.contains("1/3 | how many tasks"));
        assert!(prompts.contains("3/3 | per-task timeout"));
    }

    #[test]
    fn test_setup_keeps_current_values_and_reasks_invalid() {
        let (_tmp, home, project) = layout();
        let existing = Config {
            concurrency: Some(8),
            shell: Some("zsh".to_string()),
            timeout: None,
        };
        write_config(&home.join(CONFIG_FILE), &existing).unwrap();

        let mut input = Cursor::new("nope\n\n\n30\n");
        let mut output = Vec::new();
        setup(Location::Global, &project, Some(&home), &mut input, &mut output).unwrap();

        let cfg = load_config(&home.join(CONFIG_FILE)).unwrap();
        assert_eq!(cfg.concurrency, Some(8));
        assert_eq!(cfg.shell.as_deref(), Some("zsh"));
        assert_eq!(cfg.timeout, Some(30));
        let prompts = String::from_utf8(output).unwrap();
        assert!(prompts.contains("[8]"));
    }

    #[test]
    fn test_setup_interrupted_on_eof() {
        let (_tmp, home, project) = layout();
        let mut input = Cursor::new("2\n");
        let mut output = Vec::new();
        let err = setup(Location::Local, &project, Some(&home), &mut input, &mut output).unwrap_err();
        assert!(matches!(err, FunnelError::Interrupted { .. }));
        assert!(!project.join(CONFIG_FILE).exists());
    }

    #[test]
    fn test_setup_list_shows_empty_values() {
        let (_tmp, home, project) = layout();
        let listing = setup_list(&project, Some(&home)).unwrap();
        assert_eq!(listing.lines().count(), SETTINGS.len());
        assert!(listing.lines().all(|l| l.ends_with("<empty>")));

        let cfg = Config {
            concurrency: Some(2),
            ..Default::default()
        };
        write_config(&project.join(CONFIG_FILE), &cfg).unwrap();
        let listing = setup_list(&project, Some(&home)).unwrap();
        assert!(listing.starts_with("1/3 | how many tasks may run at the same time? 2"));
    }

    #[test]
    fn test_clean_cache_removes_local_and_global() {
        let (_tmp, home, project) = layout();
        std::fs::write(project.join(CACHE_FILE), "{}").unwrap();
        std::fs::write(home.join(CACHE_FILE), "{}").unwrap();

        let removed = clean_cache(&project, Some(&home)).unwrap();
        assert_eq!(removed, vec![project.join(CACHE_FILE), home.join(CACHE_FILE)]);
        assert!(clean_cache(&project, Some(&home)).unwrap().is_empty());
    }
}
