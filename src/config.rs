//! Master configuration: network interface, tick budget, and default timing parameters for the
//! dispatcher's poll interval and the arbiter's issue/response timeouts.

use core::time::Duration;

/// Configuration errors (surfaced via [`crate::Error::Config`]).
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[cfg(feature = "config-file")]
    #[error("could not parse configuration file: {0}")]
    Parse(String),
}

/// Master-wide configuration, built either programmatically via [`MasterConfig::builder`] or
/// loaded from a TOML file when the `config-file` feature is enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MasterConfig {
    pub interface_name: String,
    /// How many dispatcher polls a sent descriptor may wait before timing out (default 20 polls
    /// at 1us each).
    pub poll_budget: u32,
    pub cyclic_tick_timeout_us: u64,
    pub parameter_response_timeout_ms: u64,
    pub service_channel_response_timeout_ms: u64,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            interface_name: String::new(),
            poll_budget: 20,
            cyclic_tick_timeout_us: 1_000,
            parameter_response_timeout_ms: 3_000,
            service_channel_response_timeout_ms: 1_000,
        }
    }
}

impl MasterConfig {
    pub fn builder() -> MasterConfigBuilder {
        MasterConfigBuilder::default()
    }

    pub fn cyclic_tick_timeout(&self) -> Duration {
        Duration::from_micros(self.cyclic_tick_timeout_us)
    }

    pub fn parameter_response_timeout(&self) -> Duration {
        Duration::from_millis(self.parameter_response_timeout_ms)
    }

    pub fn service_channel_response_timeout(&self) -> Duration {
        Duration::from_millis(self.service_channel_response_timeout_ms)
    }

    #[cfg(feature = "config-file")]
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

/// Fluent builder for [`MasterConfig`].
#[derive(Debug, Default)]
pub struct MasterConfigBuilder {
    interface_name: Option<String>,
    poll_budget: Option<u32>,
}

impl MasterConfigBuilder {
    pub fn interface_name(mut self, name: impl Into<String>) -> Self {
        self.interface_name = Some(name.into());
        self
    }

    pub fn poll_budget(mut self, budget: u32) -> Self {
        self.poll_budget = Some(budget);
        self
    }

    pub fn build(self) -> Result<MasterConfig, ConfigError> {
        let mut config = MasterConfig::default();
        config.interface_name = self
            .interface_name
            .ok_or(ConfigError::MissingField("interface_name"))?;
        if let Some(poll_budget) = self.poll_budget {
            config.poll_budget = poll_budget;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_requires_interface_name() {
        assert_eq!(
            MasterConfig::builder().build().unwrap_err(),
            ConfigError::MissingField("interface_name")
        );
    }

    #[test]
    fn builder_applies_overrides() {
        let config = MasterConfig::builder()
            .interface_name("eth0")
            .poll_budget(50)
            .build()
            .unwrap();

        assert_eq!(config.interface_name, "eth0");
        assert_eq!(config.poll_budget, 50);
        assert_eq!(config.parameter_response_timeout_ms, 3_000);
    }
}
