//! Session logger — backend for the `log` facade that writes every record to
//! a single file in the OS data directory.
//!
//! The file is **truncated (overwritten) at each launch**, so it only ever
//! contains output from the most-recent session.
//!
//! Log location:
//!   Windows:  `%APPDATA%\PhotoDust\photodust.log`
//!   Linux:    `~/.local/share/PhotoDust/photodust.log`
//!   macOS:    `~/Library/Application Support/PhotoDust/photodust.log`
//!
//! Use the ordinary `log::info!` / `log::warn!` / `log::error!` macros.
//! Warnings and errors are echoed to stderr as well.  The level comes from
//! `PHOTODUST_LOG` (`error`, `warn`, `info`, `debug`, `trace`; default
//! `info`).  Panics are mirrored to the file by a hook.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{Level, LevelFilter, Log, Metadata, Record};

/// Environment variable holding the level filter.
pub const LEVEL_ENV: &str = "PHOTODUST_LOG";

static LOG_FILE: OnceLock<Mutex<File>> = OnceLock::new();
static LOGGER: SessionLogger = SessionLogger;

/// Write a line to the session log.  Silently ignores I/O errors so that
/// logging never crashes the application.
fn write_line(line: &str) {
    if let Some(mutex) = LOG_FILE.get()
        && let Ok(mut file) = mutex.lock()
    {
        let _ = writeln!(file, "{}", line);
    }
}

/// `[HH:MM:SS] [LEVEL] message`
pub fn format_line(ts: &str, level: Level, msg: &str) -> String {
    format!("[{}] [{}] {}", ts, level, msg)
}

struct SessionLogger;

impl Log for SessionLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(&timestamp(), record.level(), &record.args().to_string());
        if record.level() <= Level::Warn {
            eprintln!("{line}");
        }
        write_line(&line);
    }

    fn flush(&self) {
        if let Some(mutex) = LOG_FILE.get()
            && let Ok(mut file) = mutex.lock()
        {
            let _ = file.flush();
        }
    }
}

/// Parse a `PHOTODUST_LOG` value; unknown or empty values mean `info`.
pub fn level_from_env(value: Option<&str>) -> LevelFilter {
    value
        .and_then(|v| v.trim().parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info)
}

/// Initialise the session logger.  Call once, first thing in `main`.
///
/// * Creates (or truncates) the log file.  A file that cannot be opened is
///   not fatal; records still reach stderr.
/// * Registers the logger with the `log` facade.
/// * Installs a panic hook that writes the panic message to the log before
///   propagating to the default handler.
pub fn init() {
    let level = level_from_env(std::env::var(LEVEL_ENV).ok().as_deref());
    if log::set_logger(&LOGGER).is_err() {
        // Already initialised (e.g. from a test harness).
        return;
    }
    log::set_max_level(level);

    let path = log_file_path();
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    match OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)
    {
        Ok(f) => {
            let _ = LOG_FILE.set(Mutex::new(f));
        }
        Err(e) => {
            eprintln!("[logger] Failed to open log file {:?}: {}", path, e);
        }
    }

    write_line(&format!(
        "=== PhotoDust session started {} ===",
        human_timestamp()
    ));
    write_line(&format!("Log file: {}", path.display()));
    write_line("");

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write_line(&format!("[{}] [PANIC] {}", timestamp(), info));
        prev(info);
    }));
}

fn log_file_path() -> PathBuf {
    data_dir().join("PhotoDust").join("photodust.log")
}

/// Platform data directory (without the app sub-folder).
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support");
        }
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}

/// `HH:MM:SS` within the current (UTC) day.
fn timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => clock_of_day(d.as_secs()),
        Err(_) => "??:??:??".to_string(),
    }
}

fn clock_of_day(secs: u64) -> String {
    let h = (secs % 86400) / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    format!("{:02}:{:02}:{:02}", h, m, s)
}

fn human_timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => format!("(unix {})", d.as_secs()),
        Err(_) => "(unknown time)".to_string(),
    }
}
