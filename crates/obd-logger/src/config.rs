//! Logger configuration
//!
//! Layered: built-in defaults, then the TOML file, then `OBD_LOGGER_*`
//! environment variables, then command-line flags.

use crate::engine::EngineSettings;
use clap::{ArgAction, Parser};
use cloud_sync::CloudConfig;
use gps_client::{DEFAULT_GPSD_HOST, DEFAULT_GPSD_PORT};
use obd_protocol::{parse_wishlist, ObdProtocol};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use telemetry::{DriveSession, DEFAULT_MAX_PAYLOAD_BYTES};
use thiserror::Error;

/// Config file read when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "/etc/obd-logger.toml";

const ENV_PREFIX: &str = "OBD_LOGGER";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration could not be loaded: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Parser, Debug, Default)]
#[command(name = "obd-logger", author, version, about, long_about = None)]
pub struct Cli {
    #[arg(long, help = "Configuration file path (default: /etc/obd-logger.toml)")]
    pub config: Option<PathBuf>,

    #[arg(short = 's', long, help = "Serial device of the OBD adapter, or \"mock\"")]
    pub serial_port: Option<String>,

    #[arg(short = 'b', long, help = "Serial baud rate (default: 38400)")]
    pub baud_rate: Option<u32>,

    #[arg(short = 'o', long, action = ArgAction::SetTrue, help = "Tell the adapter how many bytes each PID returns")]
    pub optimisations: bool,

    #[arg(short = 'i', long, help = "Comma separated OBD columns to log")]
    pub log_columns: Option<String>,

    #[arg(short = 'a', long, help = "Samples per second, 0 for as fast as possible (default: 10)")]
    pub sample_rate: Option<f64>,

    #[arg(short = 'c', long, help = "Stop after this many samples")]
    pub sample_count: Option<u64>,

    #[arg(short = 'q', long, help = "Queue address messages are sent to")]
    pub queue_address: Option<String>,

    #[arg(short = 'p', long, action = ArgAction::SetTrue, help = "Print the supported OBD columns and exit")]
    pub capabilities: bool,

    #[arg(short = 't', long, action = ArgAction::SetTrue, help = "Echo every reading")]
    pub verbose: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggerConfig {
    pub serial_port: String,
    pub baud_rate: u32,
    /// ELM327 protocol number, 0 = automatic
    pub protocol: u8,
    pub optimisations: bool,
    pub log_columns: String,
    pub sample_rate: f64,
    pub sample_count: Option<u64>,
    pub gpsd_host: String,
    pub gpsd_port: u16,
    pub gps_retry_secs: u64,
    pub broker_host: String,
    pub broker_port: u16,
    pub queue_address: Option<String>,
    pub client_id: Option<String>,
    pub max_payload_bytes: usize,
    pub flush_on_engine_stop: bool,
    pub log_level: String,
    pub verbose: bool,
}

impl LoggerConfig {
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let (path, required) = match &cli.config {
            Some(path) => (path.clone(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        let file = config::File::from(path.as_path())
            .format(config::FileFormat::Toml)
            .required(required);
        let settings = Self::defaults()?
            .add_source(file)
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .set_override_option("serial_port", cli.serial_port.clone())?
            .set_override_option("baud_rate", cli.baud_rate.map(i64::from))?
            .set_override_option("optimisations", cli.optimisations.then_some(true))?
            .set_override_option("log_columns", cli.log_columns.clone())?
            .set_override_option("sample_rate", cli.sample_rate)?
            .set_override_option("sample_count", cli.sample_count)?
            .set_override_option("queue_address", cli.queue_address.clone())?
            .set_override_option("verbose", cli.verbose.then_some(true))?
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Ok(config::Config::builder()
            .set_default("serial_port", "/dev/ttyUSB0")?
            .set_default("baud_rate", 38400)?
            .set_default("protocol", 0)?
            .set_default("optimisations", false)?
            .set_default("log_columns", "temp,rpm,vss,maf,throttlepos")?
            .set_default("sample_rate", 10.0)?
            .set_default("gpsd_host", DEFAULT_GPSD_HOST)?
            .set_default("gpsd_port", i64::from(DEFAULT_GPSD_PORT))?
            .set_default("gps_retry_secs", 10)?
            .set_default("broker_host", "localhost")?
            .set_default("broker_port", 1883)?
            .set_default("max_payload_bytes", DEFAULT_MAX_PAYLOAD_BYTES as i64)?
            .set_default("flush_on_engine_stop", true)?
            .set_default("log_level", "info")?
            .set_default("verbose", false)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.sample_rate.is_finite() || self.sample_rate < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "sample_rate must be zero or positive, got {}",
                self.sample_rate
            )));
        }
        if self.sample_rate > 0.0 && Duration::try_from_secs_f64(self.sample_rate.recip()).is_err() {
            return Err(ConfigError::Invalid(format!(
                "sample_rate {} is too low to pace",
                self.sample_rate
            )));
        }
        if self.max_payload_bytes == 0 {
            return Err(ConfigError::Invalid("max_payload_bytes must be positive".into()));
        }
        if ObdProtocol::from_code(self.protocol).is_none() {
            return Err(ConfigError::Invalid(format!(
                "unknown OBD protocol number {}",
                self.protocol
            )));
        }
        Ok(())
    }

    /// Destination address, if one is configured
    pub fn destination(&self) -> Option<&str> {
        self.queue_address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
    }

    /// Tick length; `None` samples as fast as possible
    pub fn interval(&self) -> Option<Duration> {
        if self.sample_rate > 0.0 {
            Duration::try_from_secs_f64(self.sample_rate.recip()).ok()
        } else {
            None
        }
    }

    pub fn protocol(&self) -> ObdProtocol {
        ObdProtocol::from_code(self.protocol).unwrap_or_default()
    }

    pub fn wishlist(&self) -> Vec<String> {
        parse_wishlist(&self.log_columns)
    }

    pub fn gps_retry(&self) -> Duration {
        Duration::from_secs(self.gps_retry_secs)
    }

    pub fn cloud_config(&self, session: DriveSession) -> CloudConfig {
        CloudConfig {
            broker_host: self.broker_host.clone(),
            broker_port: self.broker_port,
            client_id: self
                .client_id
                .clone()
                .unwrap_or_else(|| format!("obd-logger-{}", session.as_uuid().simple())),
            ..CloudConfig::default()
        }
    }

    pub fn engine_settings(&self, destination: &str) -> EngineSettings {
        EngineSettings {
            destination: destination.to_string(),
            wishlist: self.wishlist(),
            optimisations: self.optimisations,
            interval: self.interval(),
            sample_count: self.sample_count,
            max_payload_bytes: self.max_payload_bytes,
            flush_on_engine_stop: self.flush_on_engine_stop,
            verbose: self.verbose,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cli_with_file(contents: &str) -> (Cli, PathBuf) {
        let path = std::env::temp_dir().join(format!(
            "obd-logger-test-{}-{}.toml",
            std::process::id(),
            DriveSession::new()
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        let cli = Cli {
            config: Some(path.clone()),
            ..Cli::default()
        };
        (cli, path)
    }

    #[test]
    fn test_defaults() {
        let (cli, path) = cli_with_file("");
        let config = LoggerConfig::load(&cli).unwrap();
        std::fs::remove_file(path).unwrap();

        assert_eq!(config.serial_port, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 38400);
        assert_eq!(config.max_payload_bytes, 1024);
        assert_eq!(config.interval(), Some(Duration::from_millis(100)));
        assert_eq!(config.wishlist(), vec!["temp", "rpm", "vss", "maf", "throttlepos"]);
        assert_eq!(config.protocol(), ObdProtocol::Auto);
        assert!(config.flush_on_engine_stop);
        assert_eq!(config.destination(), None);
    }

    #[test]
    fn test_file_then_cli_override() {
        let (mut cli, path) = cli_with_file(
            "serial_port = \"mock\"\nqueue_address = \"from-file\"\nsample_rate = 2.0\nflush_on_engine_stop = false\n",
        );
        cli.queue_address = Some("from-cli".to_string());
        cli.sample_count = Some(5);
        cli.verbose = true;
        let config = LoggerConfig::load(&cli).unwrap();
        std::fs::remove_file(path).unwrap();

        assert_eq!(config.serial_port, "mock");
        assert_eq!(config.destination(), Some("from-cli"));
        assert_eq!(config.interval(), Some(Duration::from_millis(500)));
        assert_eq!(config.sample_count, Some(5));
        assert!(config.verbose);
        assert!(!config.flush_on_engine_stop);
    }

    #[test]
    fn test_zero_rate_is_unpaced() {
        let (mut cli, path) = cli_with_file("");
        cli.sample_rate = Some(0.0);
        let config = LoggerConfig::load(&cli).unwrap();
        std::fs::remove_file(path).unwrap();
        assert_eq!(config.interval(), None);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let (mut cli, path) = cli_with_file("protocol = 42\n");
        assert!(matches!(LoggerConfig::load(&cli), Err(ConfigError::Invalid(_))));

        cli.config = None;
        cli.sample_rate = Some(-1.0);
        assert!(matches!(LoggerConfig::load(&cli), Err(ConfigError::Invalid(_))));
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_rate_too_low_to_pace_rejected() {
        let cli = Cli {
            sample_rate: Some(1e-300),
            ..Cli::default()
        };
        assert!(matches!(LoggerConfig::load(&cli), Err(ConfigError::Invalid(_))));

        let cli = Cli {
            sample_rate: Some(0.5),
            ..Cli::default()
        };
        let config = LoggerConfig::load(&cli).unwrap();
        assert_eq!(config.interval(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_blank_destination_is_absent() {
        let (mut cli, path) = cli_with_file("");
        cli.queue_address = Some("   ".to_string());
        let config = LoggerConfig::load(&cli).unwrap();
        std::fs::remove_file(path).unwrap();
        assert_eq!(config.destination(), None);
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let cli = Cli {
            config: Some(PathBuf::from("/nonexistent/obd-logger.toml")),
            ..Cli::default()
        };
        assert!(matches!(LoggerConfig::load(&cli), Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_cli_parses_short_flags() {
        let cli = Cli::parse_from([
            "obd-logger", "-s", "mock", "-q", "car/1", "-a", "5", "-c", "20", "-i", "rpm", "-t", "-o",
        ]);
        assert_eq!(cli.serial_port.as_deref(), Some("mock"));
        assert_eq!(cli.queue_address.as_deref(), Some("car/1"));
        assert_eq!(cli.sample_rate, Some(5.0));
        assert_eq!(cli.sample_count, Some(20));
        assert_eq!(cli.log_columns.as_deref(), Some("rpm"));
        assert!(cli.verbose && cli.optimisations && !cli.capabilities);
    }
}
