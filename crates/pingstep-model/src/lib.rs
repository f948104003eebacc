//! Shared data structures for pingstep.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest TTL the IPv4 header can carry.
pub const MAX_TTL: u32 = 255;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("target must not be empty")]
    EmptyTarget,
    #[error("ttl must be between 1 and {MAX_TTL}, got {0}")]
    TtlOutOfRange(u32),
}

/// Target and hop budget for a single probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProbeConfig {
    pub target: String,
    pub ttl: u32,
}

impl ProbeConfig {
    /// Builds a config, rejecting a blank target or a TTL outside `1..=255`.
    pub fn new(target: impl Into<String>, ttl: u32) -> Result<Self, ConfigError> {
        let config = Self {
            target: target.into(),
            ttl,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks a config that may not have come through [`ProbeConfig::new`],
    /// e.g. one deserialized or built from its public fields.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.trim().is_empty() {
            return Err(ConfigError::EmptyTarget);
        }
        if self.ttl == 0 || self.ttl > MAX_TTL {
            return Err(ConfigError::TtlOutOfRange(self.ttl));
        }
        Ok(())
    }
}

/// Round-trip statistics from the tool's trailing summary line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RttStats {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
    pub mdev: f64,
}

/// Outcome of one completed probe. Built once by the response accumulator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeResult {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub config: ProbeConfig,
    pub hostname: Option<String>,
    pub address: Option<String>,
    pub latency_ms: u64,
    pub ttl_at_response: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rtt: Option<RttStats>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Completed,
    PacketLoss,
    Unparsable,
    ExecutionFailure,
    Error,
}

/// One line of the report: either a result or the reason there is none.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeRecord {
    pub target: String,
    pub ttl: u32,
    pub status: ProbeStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<ProbeResult>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeFile {
    pub version: u32,
    pub records: Vec<ProbeRecord>,
}
