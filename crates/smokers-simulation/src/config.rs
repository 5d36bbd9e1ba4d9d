//! Configuration for the Simulation
//!
//! [`SimulationConfig`] is loaded from TOML (every field optional) and then
//! overridden from the command line. Validation happens before any
//! synchronisation resource is created.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smokers_core::{DelayModel, SnapshotFormat};
use thiserror::Error;

//-----------------------------------------------------------------------------
// Errors
//-----------------------------------------------------------------------------

/// Configuration errors. All of them are reported before the run starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Error on the access key communication: `{0}` is not a valid key")]
    InvalidKey(String),

    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

//-----------------------------------------------------------------------------
// Access key
//-----------------------------------------------------------------------------

/// Key identifying the shared resources of one simulation.
///
/// Accepts decimal, `0x`/`0X` hexadecimal, or octal with a leading `0`. The
/// whole string must be a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawKey", into = "String")]
pub struct AccessKey(u32);

impl AccessKey {
    pub const DEFAULT: AccessKey = AccessKey(0x534d);

    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for AccessKey {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl FromStr for AccessKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidKey(s.to_string());
        let unsigned = s.strip_prefix('+').unwrap_or(s);

        let (digits, radix) = if let Some(hex) = unsigned
            .strip_prefix("0x")
            .or_else(|| unsigned.strip_prefix("0X"))
        {
            (hex, 16)
        } else if unsigned.len() > 1 && unsigned.starts_with('0') {
            (&unsigned[1..], 8)
        } else {
            (unsigned, 10)
        };

        if digits.is_empty() || digits.starts_with(['+', '-']) {
            return Err(invalid());
        }
        u32::from_str_radix(digits, radix)
            .map(AccessKey)
            .map_err(|_| invalid())
    }
}

impl fmt::Display for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<AccessKey> for String {
    fn from(key: AccessKey) -> Self {
        key.to_string()
    }
}

/// Keys may be written as TOML integers or as strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawKey {
    Number(u32),
    Text(String),
}

impl TryFrom<RawKey> for AccessKey {
    type Error = ConfigError;

    fn try_from(raw: RawKey) -> Result<Self, Self::Error> {
        match raw {
            RawKey::Number(value) => Ok(AccessKey(value)),
            RawKey::Text(text) => text.parse(),
        }
    }
}

//-----------------------------------------------------------------------------
// Configuration Structures
//-----------------------------------------------------------------------------

/// Where and how snapshots of the shared state are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub path: PathBuf,
    pub format: SnapshotFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("smokers.log"),
            format: SnapshotFormat::Table,
        }
    }
}

/// Full configuration of one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub key: AccessKey,
    /// Supply rounds the agent performs before closing the factory.
    pub cigarettes: u64,
    /// Base seed; actor `i` uses `seed + i`. Drawn from entropy when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub delay: DelayModel,
    pub log: LogConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            key: AccessKey::default(),
            cigarettes: 10,
            seed: None,
            delay: DelayModel::default(),
            log: LogConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Load and validate a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: SimulationConfig =
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cigarettes == 0 {
            return Err(ConfigError::Invalid(
                "cigarettes must be greater than zero".to_string(),
            ));
        }
        for (name, value) in [("delay.base", self.delay.base), ("delay.stddev", self.delay.stddev)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a finite, non-negative number (got {value})"
                )));
            }
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smokers_core::TimeUnit;

    #[test]
    fn test_key_accepts_decimal_hex_and_octal() {
        assert_eq!("1234".parse::<AccessKey>().unwrap().value(), 1234);
        assert_eq!("0x1f".parse::<AccessKey>().unwrap().value(), 0x1f);
        assert_eq!("0X1F".parse::<AccessKey>().unwrap().value(), 0x1f);
        assert_eq!("017".parse::<AccessKey>().unwrap().value(), 0o17);
        assert_eq!("0".parse::<AccessKey>().unwrap().value(), 0);
        assert_eq!("+42".parse::<AccessKey>().unwrap().value(), 42);
    }

    #[test]
    fn test_malformed_keys_are_rejected() {
        for bad in ["", "12ab", "0x", "09", "-1", "0x-1", "key", " 12", "99999999999"] {
            assert!(
                matches!(bad.parse::<AccessKey>(), Err(ConfigError::InvalidKey(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        let config: SimulationConfig = toml::from_str("").unwrap();
        assert_eq!(config, SimulationConfig::default());
        assert_eq!(config.delay, DelayModel::new(100.0, 30.0, TimeUnit::Microseconds));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("smokers.toml");
        std::fs::write(
            &path,
            r#"
key = "0x10"
cigarettes = 3
seed = 9

[delay]
base = 5.0
stddev = 1.0
unit = "milliseconds"

[log]
path = "out.jsonl"
format = "json"
"#,
        )
        .unwrap();

        let config = SimulationConfig::load(&path).unwrap();
        assert_eq!(config.key.value(), 16);
        assert_eq!(config.cigarettes, 3);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.delay.unit, TimeUnit::Milliseconds);
        assert_eq!(config.log.format, SnapshotFormat::Json);
    }

    #[test]
    fn test_integer_key_in_toml() {
        let config: SimulationConfig = toml::from_str("key = 255").unwrap();
        assert_eq!(config.key.value(), 255);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = SimulationConfig::default();
        config.cigarettes = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = SimulationConfig::default();
        config.delay.stddev = -1.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = SimulationConfig::default();
        config.delay.base = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip_keeps_key_readable() {
        let config = SimulationConfig {
            seed: Some(1),
            ..SimulationConfig::default()
        };
        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("key = \"0x534d\""));
        let parsed: SimulationConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
