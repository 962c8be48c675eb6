//! Server configuration.
//!
//! Settings come from an optional TOML file, then environment variables
//! prefixed with `LES_` (e.g. `LES_PORT=7676`), then command line flags.
//! The short key names of older configuration files (`ttydev`, `w`,
//! `winsize`, `dlow`, ...) are accepted as aliases.
//!
//! ```toml
//! tty_device = "/dev/ttyUSB0"
//! tty_speed = 115200
//! fit_function = "100000.0+200000.0*X"
//! smoothing = 0.85
//! window_size = 1
//! low_delay_threshold = 135000
//! protocol = "udp"
//! port = 7575
//! outfile = "delays.log"
//! skip_sync = false
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use les_types::Sample;
use serde::{Deserialize, Serialize};

use crate::device::SUPPORTED_SPEEDS;
use crate::error::ConfigError;
use crate::estimator::{EstimatorParams, Expression};
use crate::protocol::Protocol;

/// Fully resolved server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Serial device the timing samples arrive on.
    #[serde(alias = "ttydev")]
    pub tty_device: PathBuf,

    /// Serial line speed in baud.
    #[serde(alias = "ttyspeed")]
    pub tty_speed: u32,

    /// Load curve over the window average delay `X`.
    #[serde(alias = "fitfunc")]
    pub fit_function: String,

    /// Smoothing factor `w`.
    #[serde(alias = "w")]
    pub smoothing: f64,

    /// Sliding window capacity in samples.
    #[serde(alias = "winsize")]
    pub window_size: usize,

    /// Window averages below this delay (ns) count as no load.
    #[serde(alias = "dlow")]
    pub low_delay_threshold: Sample,

    /// Drop SYNC duplicate samples.
    #[serde(alias = "skipsync")]
    pub skip_sync: bool,

    pub protocol: Protocol,
    pub port: u16,
    pub bind: IpAddr,

    /// Append-only sample log.
    pub outfile: PathBuf,

    /// Read samples from a recorded capture instead of the serial device.
    pub replay: Option<PathBuf>,

    /// Upper bound on each wait for a client message or connection.
    pub receive_timeout_ms: u64,

    /// Upper bound on reading one device line.
    pub device_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tty_device: PathBuf::from("/dev/ttyUSB0"),
            tty_speed: 115200,
            fit_function: "100000.0+200000.0*X".to_string(),
            smoothing: 0.85,
            window_size: 1,
            low_delay_threshold: 135_000,
            skip_sync: false,
            protocol: Protocol::Udp,
            port: 7575,
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            outfile: PathBuf::from("delays.log"),
            replay: None,
            receive_timeout_ms: 1000,
            device_timeout_ms: 1200,
        }
    }
}

impl Settings {
    /// Load settings from `path` (if any) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        let settings = builder
            .add_source(Environment::with_prefix("LES").try_parsing(true))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Check value ranges and that the fit function parses.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(ConfigError::Invalid {
                key: "smoothing",
                reason: format!("{} is outside [0, 1]", self.smoothing),
            });
        }
        if self.window_size == 0 {
            return Err(ConfigError::Invalid {
                key: "window_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if !SUPPORTED_SPEEDS.contains(&self.tty_speed) {
            return Err(ConfigError::Invalid {
                key: "tty_speed",
                reason: format!(
                    "{} baud is not supported (use one of {:?})",
                    self.tty_speed, SUPPORTED_SPEEDS
                ),
            });
        }
        if self.receive_timeout_ms == 0 || self.device_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "timeouts",
                reason: "must be nonzero".to_string(),
            });
        }
        self.curve()?;
        Ok(())
    }

    /// The parsed fit function.
    pub fn curve(&self) -> Result<Expression, ConfigError> {
        Expression::parse(&self.fit_function).map_err(|source| ConfigError::FitFunction {
            expression: self.fit_function.clone(),
            source,
        })
    }

    pub fn estimator_params(&self) -> Result<EstimatorParams, ConfigError> {
        let window_size =
            NonZeroUsize::new(self.window_size).ok_or_else(|| ConfigError::Invalid {
                key: "window_size",
                reason: "must be at least 1".to_string(),
            })?;
        Ok(EstimatorParams {
            smoothing: self.smoothing,
            low_delay_threshold: self.low_delay_threshold,
            window_size,
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn device_timeout(&self) -> Duration {
        Duration::from_millis(self.device_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn toml_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();

        assert_eq!(settings.listen_addr().port(), 7575);
        assert_eq!(settings.device_timeout(), Duration::from_millis(1200));
        assert_eq!(settings.estimator_params().unwrap().window_size.get(), 1);
    }

    #[test]
    fn test_load_full_names() {
        let file = toml_file(
            r#"
            tty_device = "/dev/ttyS1"
            tty_speed = 38400
            fit_function = "X/400000"
            smoothing = 0.5
            window_size = 8
            low_delay_threshold = 90000
            protocol = "tcp"
            port = 7600
            outfile = "/tmp/les-delays.log"
            skip_sync = true
            "#,
        );
        let settings = Settings::load(Some(file.path())).unwrap();

        assert_eq!(settings.tty_device, PathBuf::from("/dev/ttyS1"));
        assert_eq!(settings.tty_speed, 38400);
        assert_eq!(settings.smoothing, 0.5);
        assert_eq!(settings.window_size, 8);
        assert_eq!(settings.low_delay_threshold, 90_000);
        assert_eq!(settings.protocol, Protocol::Tcp);
        assert_eq!(settings.port, 7600);
        assert!(settings.skip_sync);
        // Unset keys keep their defaults
        assert_eq!(settings.receive_timeout_ms, 1000);
        settings.validate().unwrap();
    }

    #[test]
    fn test_load_short_aliases() {
        let file = toml_file(
            r#"
            ttydev = "/dev/ttyUSB1"
            fitfunc = "e^-(1.08X)"
            w = 0.7
            winsize = 4
            dlow = 120000
            protocol = "UDP"
            skipsync = 1
            "#,
        );
        let settings = Settings::load(Some(file.path())).unwrap();

        assert_eq!(settings.tty_device, PathBuf::from("/dev/ttyUSB1"));
        assert_eq!(settings.fit_function, "e^-(1.08X)");
        assert_eq!(settings.smoothing, 0.7);
        assert_eq!(settings.window_size, 4);
        assert_eq!(settings.low_delay_threshold, 120_000);
        assert_eq!(settings.protocol, Protocol::Udp);
        assert!(settings.skip_sync);
    }

    #[test]
    fn test_missing_file_is_a_load_error() {
        let err = Settings::load(Some(Path::new("/nonexistent/les.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    fn test_validation_errors() {
        let settings = Settings {
            smoothing: 1.5,
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Invalid { key: "smoothing", .. })
        ));

        let settings = Settings {
            window_size: 0,
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Invalid { key: "window_size", .. })
        ));

        let settings = Settings {
            tty_speed: 4800,
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Invalid { key: "tty_speed", .. })
        ));

        let settings = Settings {
            fit_function: "100000 +* X".to_string(),
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::FitFunction { .. })
        ));
    }
}
