//! Configuration Management Module
//!
//! Settings for the built-in drivers, loadable from TOML. Every field has a
//! default, so an empty file is a valid configuration.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::driver::dummy::DUMMY_MTU;
use crate::driver::loopback::{LOOPBACK_MTU, LOOPBACK_QUEUE_LIMIT};
use crate::intr::IRQ_LOOPBACK;

/// Largest transmit queue a driver may be configured with
pub const MAX_QUEUE_LIMIT: usize = 4096;

/// Configuration error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    #[error("Config parse error: {0}")]
    ParseError(String),

    #[error("Config validation error: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(String),
}

/// Loopback driver configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoopbackConfig {
    /// MTU (default: 65535, the largest IP datagram)
    pub mtu: u16,
    /// Frames that may wait for the interrupt handler (default: 16)
    pub queue_limit: usize,
    /// Interrupt line
    pub irq: u32,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            mtu: LOOPBACK_MTU,
            queue_limit: LOOPBACK_QUEUE_LIMIT,
            irq: IRQ_LOOPBACK,
        }
    }
}

impl LoopbackConfig {
    /// Validate loopback configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mtu == 0 {
            return Err(ConfigError::ValidationError(
                "Loopback MTU must be non-zero".to_string(),
            ));
        }
        if self.queue_limit < 1 || self.queue_limit > MAX_QUEUE_LIMIT {
            return Err(ConfigError::ValidationError(format!(
                "Loopback queue limit must be 1-{}",
                MAX_QUEUE_LIMIT
            )));
        }
        Ok(())
    }
}

/// Discard device configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DummyConfig {
    /// MTU (default: 65535)
    pub mtu: u16,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self { mtu: DUMMY_MTU }
    }
}

impl DummyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mtu == 0 {
            return Err(ConfigError::ValidationError(
                "Dummy MTU must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Stack configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StackConfig {
    pub loopback: LoopbackConfig,
    pub dummy: DummyConfig,
}

impl StackConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.as_ref().display().to_string())
            } else {
                ConfigError::IoError(e.to_string())
            }
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: StackConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration sections
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.loopback.validate()?;
        self.dummy.validate()?;
        Ok(())
    }
}
