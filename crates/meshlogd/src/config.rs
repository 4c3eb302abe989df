//! Configuration for meshlogd

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// meshlogd - replicated notification log daemon
#[derive(Parser, Debug, Clone)]
#[command(name = "meshlogd")]
#[command(about = "Gossip-replicated notification log service")]
pub struct Config {
    /// Snapshot file for log state (unset skips snapshotting)
    #[arg(long, env = "MESHLOG_SNAPSHOT_FILE")]
    pub snapshot_file: Option<PathBuf>,

    /// Retention for log entries in seconds
    #[arg(long, default_value = "432000")]
    pub retention_secs: u64,

    /// Maintenance interval in seconds (0 disables background processing)
    #[arg(long, default_value = "900")]
    pub maintenance_interval_secs: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,
}

impl Config {
    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(path) = &self.snapshot_file {
            if path.is_dir() {
                anyhow::bail!("snapshot file {} is a directory", path.display());
            }
        }
        if self.log_format != "json" && self.log_format != "pretty" {
            anyhow::bail!("unknown log format {:?}", self.log_format);
        }
        Ok(())
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::parse_from(["meshlogd"]);
        assert!(config.validate().is_ok());
        assert_eq!(config.retention(), Duration::from_secs(432_000));
        assert_eq!(config.maintenance_interval(), Duration::from_secs(900));
    }

    #[test]
    fn test_rejects_unknown_log_format() {
        let config = Config::parse_from(["meshlogd", "--log-format", "xml"]);
        assert!(config.validate().is_err());
    }
}
