//! Configuration management for paxfs server
//!
//! Sources, lowest precedence first: `conf/application.yml` (optional), the
//! environment (`paxfs.` prefix), then command line overrides.

use std::path::PathBuf;

use clap::Parser;
use config::{Config, Environment};
use paxfs_common::PaxfsError;
use paxfs_consistency::PaxosConfig;

use super::constants::{
    DATA_DIR_PROPERTY, DEFAULT_CONFIG_FILE, DEFAULT_DATA_DIR, DEFAULT_SERVER_PORT,
    INITIAL_LEADER_PROPERTY, LOG_CONSOLE_PROPERTY, LOG_FILE_PROPERTY, LOG_LEVEL_PROPERTY,
    LOG_PATH_PROPERTY, REPLICA_COUNT_PROPERTY, SERVER_ADDRESS_PROPERTY, SERVER_PORT_PROPERTY,
    STORAGE_MODE_PROPERTY,
};
use crate::startup::LoggingConfig;

/// Command line arguments for the server
#[derive(Debug, Default, Parser)]
#[command(name = "paxfs-server", about = "Paxos-replicated namespace and lock server")]
pub struct Cli {
    /// Number of replicas in the in-process group
    #[arg(long = "replica-count", env = "PAXFS_REPLICA_COUNT")]
    pub replica_count: Option<u64>,
    /// Directory holding per-replica storage
    #[arg(long = "data-dir", env = "PAXFS_DATA_DIR")]
    pub data_dir: Option<String>,
    /// HTTP listen port
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,
    /// Console and file log level
    #[arg(long = "log-level")]
    pub log_level: Option<String>,
    /// Alternate configuration file
    #[arg(short = 'c', long = "config")]
    pub config_file: Option<String>,
}

/// How replicas keep their logs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageMode {
    Memory,
    RocksDb,
}

impl std::str::FromStr for StorageMode {
    type Err = PaxfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StorageMode::Memory),
            "rocksdb" | "rocks" => Ok(StorageMode::RocksDb),
            other => Err(PaxfsError::Config(format!("unknown storage mode '{}'", other))),
        }
    }
}

impl std::fmt::Display for StorageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageMode::Memory => write!(f, "memory"),
            StorageMode::RocksDb => write!(f, "rocksdb"),
        }
    }
}

fn config_error(e: config::ConfigError) -> PaxfsError {
    PaxfsError::Config(e.to_string())
}

/// Application configuration loaded from config files and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Load from the process command line, environment and config file
    pub fn new() -> Result<Self, PaxfsError> {
        Self::from_cli(Cli::parse())
    }

    pub fn from_cli(args: Cli) -> Result<Self, PaxfsError> {
        let config_file = args
            .config_file
            .clone()
            .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

        let mut builder = Config::builder()
            .add_source(config::File::with_name(&config_file).required(false))
            .add_source(
                Environment::with_prefix("paxfs")
                    .separator(".")
                    .try_parsing(true),
            );

        if let Some(v) = args.replica_count {
            builder = builder
                .set_override(REPLICA_COUNT_PROPERTY, v as i64)
                .map_err(config_error)?;
        }
        if let Some(v) = args.data_dir {
            builder = builder
                .set_override(DATA_DIR_PROPERTY, v)
                .map_err(config_error)?;
        }
        if let Some(v) = args.port {
            builder = builder
                .set_override(SERVER_PORT_PROPERTY, i64::from(v))
                .map_err(config_error)?;
        }
        if let Some(v) = args.log_level {
            builder = builder
                .set_override(LOG_LEVEL_PROPERTY, v)
                .map_err(config_error)?;
        }

        let config = builder.build().map_err(config_error)?;
        Ok(Configuration { config })
    }

    /// Wrap an already built `config::Config`
    pub fn from_config(config: Config) -> Self {
        Configuration { config }
    }

    // ========================================================================
    // Server Configuration
    // ========================================================================

    pub fn server_address(&self) -> String {
        self.config
            .get_string(SERVER_ADDRESS_PROPERTY)
            .unwrap_or("0.0.0.0".to_string())
    }

    pub fn server_port(&self) -> u16 {
        self.config
            .get_int(SERVER_PORT_PROPERTY)
            .unwrap_or(DEFAULT_SERVER_PORT.into()) as u16
    }

    // ========================================================================
    // Replication Configuration
    // ========================================================================

    pub fn replica_count(&self) -> usize {
        self.config.get_int(REPLICA_COUNT_PROPERTY).unwrap_or(3) as usize
    }

    pub fn data_dir(&self) -> PathBuf {
        self.config
            .get_string(DATA_DIR_PROPERTY)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR))
    }

    pub fn storage_mode(&self) -> Result<StorageMode, PaxfsError> {
        self.config
            .get_string(STORAGE_MODE_PROPERTY)
            .unwrap_or_else(|_| "rocksdb".to_string())
            .parse()
    }

    /// Replica elected leader at startup
    pub fn initial_leader(&self) -> u64 {
        self.config.get_int(INITIAL_LEADER_PROPERTY).unwrap_or(0) as u64
    }

    /// Replication settings, defaults from `PaxosConfig`
    pub fn paxos_config(&self) -> PaxosConfig {
        let defaults = PaxosConfig::default();
        let int = |key: &str, default: u64| -> u64 {
            self.config
                .get_int(key)
                .map(|v| v.max(0) as u64)
                .unwrap_or(default)
        };

        PaxosConfig {
            replica_count: self.replica_count(),
            proposal_timeout_ms: int(
                "paxfs.paxos.proposal_timeout_ms",
                defaults.proposal_timeout_ms,
            ),
            max_proposal_attempts: int(
                "paxfs.paxos.max_proposal_attempts",
                defaults.max_proposal_attempts.into(),
            ) as u32,
            fetch_batch_size: int(
                "paxfs.paxos.fetch_batch_size",
                defaults.fetch_batch_size as u64,
            ) as usize,
            snapshot_threshold: int(
                "paxfs.paxos.snapshot_threshold",
                defaults.snapshot_threshold,
            ),
            sync_interval_ms: int("paxfs.paxos.sync_interval_ms", defaults.sync_interval_ms),
            unclaimed_window: int("paxfs.paxos.unclaimed_window", defaults.unclaimed_window),
            data_dir: self.data_dir(),
        }
    }

    // ========================================================================
    // Logging Configuration
    // ========================================================================

    pub fn logging_config(&self) -> LoggingConfig {
        let env_config = LoggingConfig::from_env();
        let log_dir = self
            .config
            .get_string(LOG_PATH_PROPERTY)
            .unwrap_or_else(|_| env_config.log_dir.display().to_string());
        let level = self
            .config
            .get_string(LOG_LEVEL_PROPERTY)
            .unwrap_or_else(|_| env_config.console_level.to_string());
        let console = self
            .config
            .get_bool(LOG_CONSOLE_PROPERTY)
            .unwrap_or(env_config.console_output);
        let file = self
            .config
            .get_bool(LOG_FILE_PROPERTY)
            .unwrap_or(env_config.file_logging);

        LoggingConfig::from_config(Some(log_dir), console, file, level)
    }
}
