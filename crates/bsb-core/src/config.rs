//! Controller configuration
//!
//! Stored as JSON:
//!
//! ```json
//! {
//!   "port": "/dev/ttyAMA3",
//!   "src_address": 66,
//!   "requests": ["boiler_temp", {"outer_temp": 60}],
//!   "timing": { "send_retries": 10 }
//! }
//! ```
//!
//! A bare name in `requests` is polled once; `{name: seconds}` is polled
//! periodically.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::controller::ControllerTiming;
use crate::messages::MessageRegistry;
use crate::protocol::{open_port, BusDriver, DriverTiming, ProtocolError, SerialChannel, DEFAULT_SRC};
use crate::simulator::{SimulatedBus, TEST_PORT};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading or writing the file failed
    #[error("Failed to read config: {0}")]
    Io(#[from] io::Error),

    /// Malformed JSON
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A monitored name is not in the registry
    #[error("Unknown message in config: {0}")]
    UnknownMessage(String),
}

/// One entry of the `requests` list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MonitoredRequest {
    /// Poll once
    Once(String),
    /// Poll every N seconds
    Every(BTreeMap<String, u64>),
}

/// Optional timing overrides, all in milliseconds unless named otherwise
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Send attempts per telegram, raised to one if zero
    pub send_retries: Option<u32>,
    /// Lower bound of the pause before a resend
    pub settle_min_ms: Option<u64>,
    /// Upper bound of the pause before a resend
    pub settle_max_ms: Option<u64>,
    /// Pause between polls while waiting for an answer
    pub poll_interval_ms: Option<u64>,
    /// Polls before a query gives up
    pub reply_attempts: Option<u32>,
    /// Monitor sleep when the bus is quiet
    pub idle_sleep_ms: Option<u64>,
    /// How long a sent SET waits for its ACK
    pub pending_set_ttl_ms: Option<u64>,
}

/// Top-level configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Serial device, or `TEST` for the simulated bus
    pub port: String,

    /// Our bus address
    #[serde(default = "default_src_address")]
    pub src_address: u8,

    /// Monitored messages
    #[serde(default)]
    pub requests: Vec<MonitoredRequest>,

    /// Timing overrides
    #[serde(default)]
    pub timing: TimingConfig,
}

fn default_src_address() -> u8 {
    DEFAULT_SRC
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            port: TEST_PORT.to_string(),
            src_address: default_src_address(),
            requests: Vec::new(),
            timing: TimingConfig::default(),
        }
    }
}

impl BusConfig {
    /// Read a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse configuration from a JSON string
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Write the configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate the monitored messages and turn them into a poll schedule
    pub fn monitored(&self, registry: &MessageRegistry) -> Result<Vec<(String, Option<Duration>)>, ConfigError> {
        let mut monitored = Vec::new();
        for request in &self.requests {
            match request {
                MonitoredRequest::Once(name) => monitored.push((name.clone(), None)),
                MonitoredRequest::Every(map) => monitored.extend(
                    map.iter()
                        .map(|(name, secs)| (name.clone(), Some(Duration::from_secs(*secs)))),
                ),
            }
        }

        if let Some((name, _)) = monitored.iter().find(|(name, _)| registry.by_name(name).is_none()) {
            return Err(ConfigError::UnknownMessage(name.clone()));
        }
        Ok(monitored)
    }

    /// Driver timing with overrides applied
    pub fn driver_timing(&self) -> DriverTiming {
        let mut timing = if self.is_simulated() {
            DriverTiming::immediate()
        } else {
            DriverTiming::default()
        };
        let t = &self.timing;
        if let Some(retries) = t.send_retries {
            timing.send_retries = retries.max(1);
        }
        if let Some(ms) = t.settle_min_ms {
            timing.settle_min = Duration::from_millis(ms);
        }
        if let Some(ms) = t.settle_max_ms {
            timing.settle_max = Duration::from_millis(ms);
        }
        timing
    }

    /// Controller timing with overrides applied
    pub fn controller_timing(&self) -> ControllerTiming {
        let mut timing = ControllerTiming::default();
        let t = &self.timing;
        if let Some(ms) = t.poll_interval_ms {
            timing.poll_interval = Duration::from_millis(ms);
        }
        if let Some(attempts) = t.reply_attempts {
            timing.reply_attempts = attempts;
        }
        if let Some(ms) = t.idle_sleep_ms {
            timing.idle_sleep = Duration::from_millis(ms);
        }
        if let Some(ms) = t.pending_set_ttl_ms {
            timing.pending_set_ttl = Duration::from_millis(ms);
        }
        timing
    }

    /// Whether the simulated bus is selected
    pub fn is_simulated(&self) -> bool {
        self.port == TEST_PORT
    }

    /// Open the configured transport
    pub fn open_driver(&self, registry: Arc<MessageRegistry>) -> Result<BusDriver, ProtocolError> {
        let timing = self.driver_timing();
        if self.is_simulated() {
            let bus = SimulatedBus::new(Arc::clone(&registry));
            return Ok(BusDriver::new(Box::new(bus), registry, timing));
        }
        let port = open_port(&self.port)?;
        Ok(BusDriver::new(Box::new(SerialChannel::new(port)), registry, timing))
    }
}
