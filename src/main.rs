//! Thin CLI layer: parse args, styled output, and call into funnel-core.
//! Crash-proof: panic caught and reported; all errors return Result.

use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::fs;
use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use funnel_core::{FunnelError, Location, RunRecord};

// ---- UI helpers (no-op when stdout isn't a TTY) ----

fn use_color() -> bool {
    std::io::stdout().is_terminal()
        && env::var("NO_COLOR").unwrap_or_default().is_empty()
}

fn success(msg: &str) {
    if use_color() {
        println!("{}", msg.green());
    } else {
        println!("{}", msg);
    }
}

fn error(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.red());
    } else {
        eprintln!("{}", msg);
    }
}

fn info(msg: &str) {
    if use_color() {
        println!("{}", msg.cyan());
    } else {
        println!("{}", msg);
    }
}

fn dim(msg: &str) {
    if use_color() {
        println!("{}", msg.dimmed());
    } else {
        println!("{}", msg);
    }
}

/// Counts settled tasks on stderr; hidden when quiet or stderr isn't a TTY.
fn progress_bar(len: usize, quiet: bool) -> ProgressBar {
    if quiet || !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.dim} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
    {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

fn runtime() -> Result<tokio::runtime::Runtime, String> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start async runtime: {}", e))
}

fn concurrency_arg() -> Arg {
    Arg::new("concurrency")
        .short('j')
        .long("concurrency")
        .value_parser(clap::value_parser!(usize))
        .help("Max tasks in flight (default: FUNNEL_CONCURRENCY, config, or CPU count)")
}

fn quiet_arg() -> Arg {
    Arg::new("quiet")
        .short('q')
        .long("quiet")
        .action(ArgAction::SetTrue)
        .help("No progress bar")
}

fn cli() -> Command {
    Command::new("funnel")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Run many shell commands or file jobs with a hard concurrency cap; output stays in input order")
        .after_help(
            "Examples:\n  funnel exec -j 4 -f jobs.txt\n  cat jobs.txt | funnel exec\n  funnel digest -j 8 *.tar.gz\n  funnel setup --local\n  funnel setup --list",
        )
        .arg_required_else_help(true)
        .subcommand(
            Command::new("exec")
                .about("Run one shell command per line (from --file or stdin)")
                .arg(concurrency_arg())
                .arg(
                    Arg::new("file")
                        .short('f')
                        .long("file")
                        .help("Read commands from this file instead of stdin"),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .value_parser(clap::value_parser!(u64).range(1..))
                        .help("Fail a command that runs longer than this many seconds"),
                )
                .arg(quiet_arg()),
        )
        .subcommand(
            Command::new("digest")
                .about("Print SHA-256 of each file, in argument order")
                .arg(
                    Arg::new("paths")
                        .required(true)
                        .num_args(1..)
                        .help("Files to hash"),
                )
                .arg(concurrency_arg())
                .arg(quiet_arg()),
        )
        .subcommand(
            Command::new("setup")
                .about("Answer the settings questionnaire (writes ~/.funnelrc.json)")
                .arg(
                    Arg::new("local")
                        .long("local")
                        .action(ArgAction::SetTrue)
                        .help("Write .funnelrc.json in the current directory instead"),
                )
                .arg(
                    Arg::new("list")
                        .long("list")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("local")
                        .help("Show effective settings"),
                ),
        )
        .subcommand(
            Command::new("clean-cache").about("Remove every .funnelcache.json visible from here"),
        )
        .subcommand(
            Command::new("history")
                .about("Show recorded runs")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output machine-readable JSON"),
                ),
        )
}

fn record(cwd: &Path, home: Option<&Path>, record: RunRecord) {
    if let Err(e) = funnel_core::record_run(cwd, home, record) {
        funnel_core::log_error(&format!("could not record run: {}", e));
    }
}

fn exec_cmd(sub: &ArgMatches, cwd: &Path, home: Option<&Path>) -> Result<(), String> {
    let (config, _) = funnel_core::read_runtime_config(cwd, home).map_err(|e| e.to_string())?;
    let concurrency = funnel_core::effective_concurrency(sub.get_one::<usize>("concurrency").copied(), &config)
        .map_err(|e| e.to_string())?;

    let text = match sub.get_one::<String>("file") {
        Some(path) => fs::read_to_string(path).map_err(|e| format!("Could not read {}: {}", path, e))?,
        None => {
            let mut s = String::new();
            std::io::stdin()
                .read_to_string(&mut s)
                .map_err(|e| format!("Could not read stdin: {}", e))?;
            s
        }
    };
    let commands = funnel_core::parse_commands(&text);
    if commands.is_empty() {
        dim("No commands to run.");
        return Ok(());
    }

    let options = funnel_core::ExecOptions {
        shell: config.shell.clone().unwrap_or_else(funnel_core::default_shell),
        timeout: sub
            .get_one::<u64>("timeout")
            .copied()
            .or(config.timeout)
            .map(Duration::from_secs),
        cwd: cwd.to_path_buf(),
    };
    let total = commands.len();
    funnel_core::log_debug(&format!("exec: {} command(s), concurrency {}", total, concurrency));

    let bar = progress_bar(total, sub.get_flag("quiet"));
    let tick = bar.clone();
    let started = Instant::now();
    let result = runtime()?.block_on(funnel_core::run_commands(concurrency, commands, options, move || {
        tick.inc(1)
    }));
    bar.finish_and_clear();

    let elapsed = started.elapsed().as_millis() as u64;
    record(cwd, home, RunRecord::new("exec", total, concurrency, result.is_ok(), elapsed));
    let outputs = result.map_err(|e| e.to_string())?;
    for output in outputs {
        print!("{}", output.stdout);
    }
    Ok(())
}

fn digest_cmd(sub: &ArgMatches, cwd: &Path, home: Option<&Path>) -> Result<(), String> {
    let (config, _) = funnel_core::read_runtime_config(cwd, home).map_err(|e| e.to_string())?;
    let concurrency = funnel_core::effective_concurrency(sub.get_one::<usize>("concurrency").copied(), &config)
        .map_err(|e| e.to_string())?;
    let paths: Vec<PathBuf> = sub
        .get_many::<String>("paths")
        .map(|v| v.map(|p| cwd.join(p)).collect())
        .unwrap_or_default();
    let shown: Vec<String> = sub
        .get_many::<String>("paths")
        .map(|v| v.cloned().collect())
        .unwrap_or_default();
    let total = paths.len();

    let bar = progress_bar(total, sub.get_flag("quiet"));
    let tick = bar.clone();
    let started = Instant::now();
    let result = runtime()?.block_on(funnel_core::digest_files(concurrency, paths, move || tick.inc(1)));
    bar.finish_and_clear();

    let elapsed = started.elapsed().as_millis() as u64;
    record(cwd, home, RunRecord::new("digest", total, concurrency, result.is_ok(), elapsed));
    let digests = result.map_err(|e| e.to_string())?;
    for (digest, name) in digests.iter().zip(shown) {
        println!("{}  {}", digest.sha256, name);
    }
    Ok(())
}

fn setup_cmd(sub: &ArgMatches, cwd: &Path, home: Option<&Path>) -> Result<(), String> {
    if sub.get_flag("list") {
        let listing = funnel_core::setup_list(cwd, home).map_err(|e| e.to_string())?;
        println!("{}", listing);
        return Ok(());
    }
    let location = if sub.get_flag("local") {
        Location::Local
    } else {
        Location::Global
    };
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut output = std::io::stdout();
    match funnel_core::setup(location, cwd, home, &mut input, &mut output) {
        Ok(path) => {
            success(&format!("Wrote {}", path.display()));
            Ok(())
        }
        Err(FunnelError::Interrupted { .. }) => Err("Setup cancelled; nothing written.".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

fn history_cmd(sub: &ArgMatches, cwd: &Path, home: Option<&Path>) -> Result<(), String> {
    let runs = funnel_core::load_history(cwd, home);
    if sub.get_flag("json") {
        println!(
            "{}",
            serde_json::to_string_pretty(&runs).unwrap_or_else(|_| "[]".to_string())
        );
        return Ok(());
    }
    if runs.is_empty() {
        dim("No runs recorded.");
        return Ok(());
    }
    info(&format!("Recorded runs ({})", runs.len()));
    for run in runs {
        println!(
            "  {}  {:<6} {} task(s), concurrency {}, {} in {}ms",
            run.finished_at,
            run.command,
            run.tasks,
            run.concurrency,
            if run.succeeded { "ok" } else { "failed" },
            run.duration_ms
        );
    }
    Ok(())
}

fn run() -> Result<(), String> {
    let matches = cli().get_matches();
    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let home = funnel_core::home_dir();
    let home = home.as_deref();

    match matches.subcommand() {
        Some(("exec", sub)) => exec_cmd(sub, &cwd, home),
        Some(("digest", sub)) => digest_cmd(sub, &cwd, home),
        Some(("setup", sub)) => setup_cmd(sub, &cwd, home),
        Some(("clean-cache", _)) => {
            let removed = funnel_core::clean_cache(&cwd, home).map_err(|e| e.to_string())?;
            if removed.is_empty() {
                dim("No cache files found.");
            } else {
                success(&format!("Removed {} cache file(s).", removed.len()));
            }
            Ok(())
        }
        Some(("history", sub)) => history_cmd(sub, &cwd, home),
        _ => {
            dim("Use `funnel exec`, `funnel digest`, `funnel setup`, `funnel clean-cache`, or `funnel history`.");
            Ok(())
        }
    }
}

fn main() {
    if !use_color() {
        colored::control::set_override(false);
    }

    let code = match std::panic::catch_unwind(run) {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            error(&e);
            1
        }
        Err(_) => {
            error("An unexpected error occurred. Please report this issue.");
            1
        }
    };
    std::process::exit(code);
}
