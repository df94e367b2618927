//! YAML configuration: customers, their VDCs and the metric commands.
//!
//! Durations are humantime strings. `EcsbeatConfig::from_yaml` parses and
//! validates in one step.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level ecsbeat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EcsbeatConfig {
    /// Default interval for every command without its own override.
    #[serde(with = "humantime_serde")]
    pub period: Duration,
    #[serde(default)]
    pub customers: Vec<Customer>,
    #[serde(default)]
    pub commands: Vec<CommandConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Customer {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub username: String,
    pub password: String,
    #[serde(default = "default_req_timeout", with = "humantime_serde")]
    pub req_timeout: Duration,
    /// How long a failing management endpoint is skipped.
    #[serde(default = "default_block_duration", with = "humantime_serde")]
    pub block_duration: Duration,
    /// Topology refresh interval; zero disables scheduled refresh.
    #[serde(default, with = "humantime_serde")]
    pub cfg_refresh: Duration,
    #[serde(default = "default_mgmt_port")]
    pub mgmt_port: u16,
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default)]
    pub insecure_skip_verify: bool,
    pub vdcs: Vec<VdcConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VdcConfig {
    pub name: String,
    /// Node IPs. Each one is both a management endpoint and a seeded node.
    #[serde(default)]
    pub nodes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    pub uri: String,
    #[serde(rename = "type")]
    pub cmd_type: String,
    pub level: crate::command::CommandLevel,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, with = "humantime_serde::option")]
    pub interval: Option<Duration>,
}

/// Upper bound for every configured duration; keeps deadlines from overflowing.
pub const MAX_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

fn check_duration(field: &str, value: Duration) -> Result<(), ConfigError> {
    if value > MAX_DURATION {
        return Err(ConfigError::Invalid(format!(
            "{} of {} exceeds the maximum of {}",
            field,
            humantime::format_duration(value),
            humantime::format_duration(MAX_DURATION)
        )));
    }
    Ok(())
}

fn default_true() -> bool {
    true
}

fn default_req_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_block_duration() -> Duration {
    Duration::from_secs(300)
}

fn default_mgmt_port() -> u16 {
    4443
}

fn default_scheme() -> String {
    "https".into()
}

impl EcsbeatConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_yaml(&text)?;
        tracing::debug!(
            path = %path.display(),
            customers = config.customers.len(),
            commands = config.commands.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.period.is_zero() {
            return Err(ConfigError::Invalid("period must be greater than zero".into()));
        }
        check_duration("period", self.period)?;
        for cmd in &self.commands {
            if let Some(interval) = cmd.interval {
                check_duration(&format!("interval of command '{}'", cmd.uri), interval)?;
            }
        }

        let mut seen = HashSet::new();
        for customer in &self.customers {
            if customer.name.trim().is_empty() {
                return Err(ConfigError::Invalid("customer name must not be empty".into()));
            }
            if !seen.insert(customer.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate customer '{}'",
                    customer.name
                )));
            }
            customer.validate()?;
        }
        Ok(())
    }

    /// Customers that should be polled, in config order.
    pub fn enabled_customers(&self) -> impl Iterator<Item = &Customer> {
        self.customers.iter().filter(|c| c.enabled)
    }
}

impl Customer {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.vdcs.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "customer '{}' declares no vdcs",
                self.name
            )));
        }
        check_duration("req_timeout", self.req_timeout)?;
        check_duration("block_duration", self.block_duration)?;
        check_duration("cfg_refresh", self.cfg_refresh)?;

        let mut names = HashSet::new();
        for vdc in &self.vdcs {
            if !names.insert(vdc.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "customer '{}' declares vdc '{}' twice",
                    self.name, vdc.name
                )));
            }
        }
        Ok(())
    }

    /// Management base URLs per VDC, derived from the declared node IPs.
    pub fn management_endpoints(&self) -> BTreeMap<String, Vec<String>> {
        self.vdcs
            .iter()
            .map(|vdc| {
                let urls = vdc
                    .nodes
                    .iter()
                    .map(|ip| format!("{}://{}:{}", self.scheme, ip, self.mgmt_port))
                    .collect();
                (vdc.name.clone(), urls)
            })
            .collect()
    }
}

/// Durations as humantime strings ("30s", "5m", "1h 30m").
pub mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(s.trim()).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Option::<String>::deserialize(deserializer)? {
                Some(s) => humantime::parse_duration(s.trim())
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                None => Ok(None),
            }
        }
    }
}
