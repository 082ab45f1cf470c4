//! Logging bootstrap for the register bridge services
//!
//! Installs a console layer and an optional daily file layer behind one
//! `EnvFilter`. `RUST_LOG` always wins over the configured levels.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::error::{CommonError, Result};

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Event formatter producing `timestamp [LEVEL] message fields`
///
/// Example output: `2025-12-02T00:50:44.809123Z [INFO] Device inverter_1 ready`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m",
                Level::DEBUG => "\x1b[34m",
                Level::INFO => "\x1b[32m",
                Level::WARN => "\x1b[33m",
                Level::ERROR => "\x1b[31m",
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

// Keeps the non-blocking file writer flushing until process exit
static GUARDS: OnceLock<Mutex<Vec<WorkerGuard>>> = OnceLock::new();

/// Daily file writer named `{YYYYMMDD}_{service}.log`
struct DailyFileWriter {
    service_name: String,
    log_dir: PathBuf,
    current_date: Arc<Mutex<String>>,
    current_file: Arc<Mutex<Option<File>>>,
}

impl DailyFileWriter {
    fn new(service_name: String, log_dir: PathBuf) -> std::io::Result<Self> {
        fs::create_dir_all(&log_dir)?;
        let current_date = chrono::Local::now().format("%Y%m%d").to_string();
        let file = Self::open(&log_dir, &current_date, &service_name)?;

        Ok(Self {
            service_name,
            log_dir,
            current_date: Arc::new(Mutex::new(current_date)),
            current_file: Arc::new(Mutex::new(Some(file))),
        })
    }

    fn open(log_dir: &Path, date: &str, service_name: &str) -> std::io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join(format!("{}_{}.log", date, service_name)))
    }

    fn file(&self) -> std::io::Result<std::sync::MutexGuard<'_, Option<File>>> {
        let today = chrono::Local::now().format("%Y%m%d").to_string();
        let mut current_date = self
            .current_date
            .lock()
            .map_err(|e| std::io::Error::other(format!("Mutex poisoned: {}", e)))?;

        if *current_date != today {
            let new_file = Self::open(&self.log_dir, &today, &self.service_name)?;
            *current_date = today;
            let mut current_file = self
                .current_file
                .lock()
                .map_err(|e| std::io::Error::other(format!("Mutex poisoned: {}", e)))?;
            *current_file = Some(new_file);
        }

        self.current_file
            .lock()
            .map_err(|e| std::io::Error::other(format!("Mutex poisoned: {}", e)))
    }
}

impl Write for DailyFileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match *self.file()? {
            Some(ref mut file) => file.write(buf),
            None => Ok(0),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match *self.file()? {
            Some(ref mut file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name, used as the default filter target and in file names
    pub service_name: String,
    /// Directory for daily log files
    pub log_dir: PathBuf,
    pub console_level: Level,
    pub file_level: Level,
    /// Write daily log files in addition to the console
    pub enable_file: bool,
    /// Colored console output
    pub enable_ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".to_string(),
            log_dir: PathBuf::from("logs"),
            console_level: Level::INFO,
            file_level: Level::DEBUG,
            enable_file: true,
            enable_ansi: true,
        }
    }
}

/// Parse a level name such as `info` or `WARN`
pub fn parse_level(name: &str) -> Option<Level> {
    name.parse::<Level>().ok()
}

fn build_filter(config: &LogConfig) -> EnvFilter {
    match std::env::var("RUST_LOG") {
        Ok(env_str) if !env_str.is_empty() => EnvFilter::new(env_str),
        _ => {
            // The most verbose of the two sinks decides what reaches the layers
            let finest = std::cmp::max(config.console_level, config.file_level);
            EnvFilter::new(format!(
                "info,{}={}",
                config.service_name,
                finest.as_str().to_lowercase()
            ))
        },
    }
}

/// Initialize logging system with configuration
pub fn init_with_config(config: LogConfig) -> Result<()> {
    let console_filter = tracing_subscriber::filter::LevelFilter::from_level(config.console_level);
    let console_layer = fmt::layer()
        .event_format(BracketedLevelFormat)
        .with_ansi(config.enable_ansi)
        .with_filter(console_filter);

    let file_layer = if config.enable_file {
        let writer = DailyFileWriter::new(config.service_name.clone(), config.log_dir.clone())?;
        let (non_blocking, guard) = tracing_appender::non_blocking(writer);

        let guards = GUARDS.get_or_init(|| Mutex::new(Vec::new()));
        match guards.lock() {
            Ok(mut guards) => guards.push(guard),
            Err(poisoned) => poisoned.into_inner().push(guard),
        }

        Some(
            fmt::layer()
                .event_format(BracketedLevelFormat)
                .with_ansi(false)
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::filter::LevelFilter::from_level(
                    config.file_level,
                )),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(build_filter(&config))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| CommonError::Logging(e.to_string()))?;

    tracing::info!(
        "Logging initialized for {} (console {}, file {})",
        config.service_name,
        config.console_level,
        if config.enable_file {
            config.file_level.as_str()
        } else {
            "off"
        }
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_level() {
        assert_eq!(format_level(&Level::INFO), "[INFO]");
        assert_eq!(format_level(&Level::ERROR), "[ERROR]");
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), Some(Level::DEBUG));
        assert_eq!(parse_level("WARN"), Some(Level::WARN));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_daily_writer_creates_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut writer =
            DailyFileWriter::new("regsrv".to_string(), dir.path().to_path_buf()).unwrap();
        writer.write_all(b"hello\n").unwrap();
        writer.flush().unwrap();

        let today = chrono::Local::now().format("%Y%m%d").to_string();
        let content =
            fs::read_to_string(dir.path().join(format!("{}_regsrv.log", today))).unwrap();
        assert_eq!(content, "hello\n");
    }
}
