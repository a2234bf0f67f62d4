//! Logging setup. Grounded on the teacher's `env_logger`-backed custom `Log`
//! wrapper (`formatted_local_time_builder` / `colored_level`); the
//! `indicatif` progress-bar suspension from the teacher's `log_wrapper` is
//! replaced with a fan-out to the two on-disk log files the persistent state
//! layout requires.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::Local;
use env_logger::fmt::{Color, Style, StyledValue};
use env_logger::{Builder, Logger};
use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::dirs;

/// Installs the process-wide logger. `debug` raises the level to `trace`,
/// mirroring the teacher's `default_logger(debug)`.
pub fn init(data_folder: &Path, debug: bool) -> Result<(), anyhow::Error> {
    let level = if debug { LevelFilter::Trace } else { LevelFilter::Info };
    let console = default_logger(level);

    let all_logs = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dirs::all_logs_file_path(data_folder))?;
    let last_run = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(dirs::last_run_file_path(data_folder))?;

    log::set_max_level(level);
    log::set_boxed_logger(Box::new(FanOutLogger {
        console,
        files: Mutex::new(FileSinks { all_logs, last_run }),
    }))
    .map_err(anyhow::Error::from)
}

/// Truncates `last_run.txt` at the start of a run, per the persistence
/// contract ("cleared on each run").
pub fn clear_last_run(data_folder: &Path) -> Result<(), anyhow::Error> {
    File::create(dirs::last_run_file_path(data_folder))?;
    Ok(())
}

fn default_logger(level: LevelFilter) -> Logger {
    formatted_local_time_builder("%H:%M:%S.%3f")
        .filter_level(level)
        .parse_default_env()
        .build()
}

fn formatted_local_time_builder(fmt: &'static str) -> Builder {
    let mut builder = Builder::new();

    builder.format(move |f, record| {
        let mut style = f.style();
        let level = colored_level(&mut style, record.level());
        let time = Local::now().format(fmt);

        writeln!(f, "{} {} > {}", time, level, record.args())
    });

    builder
}

fn colored_level(style: &'_ mut Style, level: Level) -> StyledValue<'_, &'static str> {
    match level {
        Level::Trace => style.set_color(Color::Magenta).value("TRACE"),
        Level::Debug => style.set_color(Color::Blue).value("DEBUG"),
        Level::Info => style.set_color(Color::Green).value("INFO "),
        Level::Warn => style.set_color(Color::Yellow).value("WARN "),
        Level::Error => style.set_color(Color::Red).value("ERROR"),
    }
}

struct FileSinks {
    all_logs: File,
    last_run: File,
}

/// Fans every record out to stderr plus the two append-only log files,
/// all serialized by one mutex (one log mutex per §5's file-sink policy).
struct FanOutLogger {
    console: Logger,
    files: Mutex<FileSinks>,
}

impl Log for FanOutLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.console.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        self.console.log(record);

        let line = format!(
            "{} {} > {}\n",
            Local::now().format("%H:%M:%S.%3f"),
            plain_level(record.level()),
            record.args()
        );

        if let Ok(mut sinks) = self.files.lock() {
            let _ = sinks.all_logs.write_all(line.as_bytes());
            let _ = sinks.last_run.write_all(line.as_bytes());
        }
    }

    fn flush(&self) {
        self.console.flush();
        if let Ok(mut sinks) = self.files.lock() {
            let _ = sinks.all_logs.flush();
            let _ = sinks.last_run.flush();
        }
    }
}

fn plain_level(level: Level) -> &'static str {
    match level {
        Level::Trace => "TRACE",
        Level::Debug => "DEBUG",
        Level::Info => "INFO ",
        Level::Warn => "WARN ",
        Level::Error => "ERROR",
    }
}
