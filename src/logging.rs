use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use clap::{Args, ValueEnum};
use log::{Level, LevelFilter, Log, Metadata, Record};

type SyslogLogger = syslog::Logger<syslog::LoggerBackend, syslog::Formatter3164>;

const PROGRAM: &str = "timer-stability";

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
        }
    }
}

#[derive(Debug, Args)]
pub struct LogArgs {
    /// Log level (default: warn)
    #[arg(long = "log-level", value_enum)]
    pub log_level: Option<LogLevel>,

    /// Append log messages to a file shared by every process
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Send log messages to syslog
    #[arg(long)]
    pub syslog: bool,
}

/// Process family a record belongs to, taken from the module that logged it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoleTag {
    Timer,
    Load,
    Main,
}

impl RoleTag {
    fn from_target(target: &str) -> Self {
        match target.rsplit("::").next() {
            Some("timer") | Some("sampler") => RoleTag::Timer,
            Some("loadgen") => RoleTag::Load,
            _ => RoleTag::Main,
        }
    }
}

/// One diagnostic line. The pid is read per record because the logger is
/// installed before the fan-out and inherited by every child.
struct LogLine<'a> {
    role: RoleTag,
    pid: u32,
    level: Level,
    args: &'a fmt::Arguments<'a>,
}

impl fmt::Display for LogLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.level {
            Level::Error => "error",
            Level::Warn => "warning",
            Level::Info => "info",
            Level::Debug | Level::Trace => "debug",
        };
        match self.role {
            RoleTag::Timer => write!(f, "[{} timer {}]", PROGRAM, self.pid)?,
            RoleTag::Load => write!(f, "[{} load {}]", PROGRAM, self.pid)?,
            RoleTag::Main => write!(f, "[{} {}]", PROGRAM, self.pid)?,
        }
        write!(f, " {}: {}", severity, self.args)
    }
}

struct StabilityLogger {
    max: LevelFilter,
    log_file: Option<Mutex<File>>,
    syslog: Option<Mutex<SyslogLogger>>,
}

impl StabilityLogger {
    fn to_syslog(&self, pid: u32, level: Level, text: &str) {
        let Some(ref logger) = self.syslog else {
            return;
        };
        if let Ok(mut l) = logger.lock() {
            // The formatter was built in the parent; children report their own pid.
            l.formatter.pid = pid;
            let _ = match level {
                Level::Error => l.err(text),
                Level::Warn => l.warning(text),
                Level::Info => l.info(text),
                Level::Debug | Level::Trace => l.debug(text),
            };
        }
    }
}

impl Log for StabilityLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let pid = std::process::id();
        let mut line = LogLine {
            role: RoleTag::from_target(record.target()),
            pid,
            level: record.level(),
            args: record.args(),
        }
        .to_string();
        line.push('\n');

        // Single write per sink so lines from sibling processes don't interleave.
        let _ = std::io::stderr().lock().write_all(line.as_bytes());

        if let Some(ref file) = self.log_file {
            if let Ok(mut f) = file.lock() {
                let _ = f.write_all(line.as_bytes());
            }
        }

        self.to_syslog(pid, record.level(), &record.args().to_string());
    }

    fn flush(&self) {
        if let Some(ref file) = self.log_file {
            if let Ok(mut f) = file.lock() {
                let _ = f.flush();
            }
        }
    }
}

pub fn init(args: &LogArgs) {
    let max = LevelFilter::from(args.log_level.unwrap_or(LogLevel::Warn));

    let mut file_error = None;
    let log_file = match args.log_file {
        Some(ref path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => Some(Mutex::new(f)),
            Err(e) => {
                file_error = Some(format!("cannot open log file {}: {}", path.display(), e));
                None
            }
        },
        None => None,
    };

    let syslog = if args.syslog {
        syslog::unix(syslog::Formatter3164 {
            facility: syslog::Facility::LOG_USER,
            hostname: None,
            process: PROGRAM.into(),
            pid: std::process::id(),
        })
        .ok()
        .map(Mutex::new)
    } else {
        None
    };

    let logger = StabilityLogger {
        max,
        log_file,
        syslog,
    };

    if log::set_boxed_logger(Box::new(logger)).is_ok() {
        log::set_max_level(max);
    }
    if let Some(msg) = file_error {
        log::warn!("{}", msg);
    }
}
