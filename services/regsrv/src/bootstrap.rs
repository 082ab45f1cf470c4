//! Process bootstrap: command-line arguments and logging

use std::path::PathBuf;

use clap::Parser;
use common::logging::parse_level;
use common::LogConfig;
use tracing::Level;

use crate::error::{RegSrvError, Result};

pub const SERVICE_NAME: &str = "regsrv";

/// Register bridge service
#[derive(Debug, Clone, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// Configuration file (yaml, json or toml)
    #[arg(
        short,
        long,
        env = "REGSRV_CONFIG",
        default_value = "config/regsrv.yaml"
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    pub log_level: String,

    /// Directory for daily log files; console only when unset
    #[arg(long, env = "REGSRV_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Only validate configuration without starting the service
    #[arg(long)]
    pub validate: bool,
}

impl Args {
    pub fn level(&self) -> Level {
        parse_level(&self.log_level).unwrap_or(Level::INFO)
    }

    pub fn log_config(&self) -> LogConfig {
        let level = self.level();
        LogConfig {
            service_name: SERVICE_NAME.to_string(),
            log_dir: self
                .log_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("logs")),
            console_level: level,
            file_level: level.max(Level::DEBUG),
            enable_file: self.log_dir.is_some(),
            enable_ansi: !self.no_color,
        }
    }
}

pub fn init_logging(args: &Args) -> Result<()> {
    common::init_with_config(args.log_config()).map_err(RegSrvError::from)
}
