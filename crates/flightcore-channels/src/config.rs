//! Runtime tunables.
//!
//! Defaults are the flight values. A JSON file may override any subset;
//! durations are written in milliseconds.

use std::path::Path;
use std::time::Duration;

use flightcore_hal::RadioSettings;
use flightcore_packet::{DEFAULT_MAX_FRAME, RADIO_MAX_FRAME};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Scheduler time slice and per-channel stack budgets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    #[serde(with = "millis", rename = "slice_ms")]
    pub slice: Duration,
    pub radio_stack: usize,
    pub pdu_stack: usize,
    pub companion_stack: usize,
    /// How long shutdown waits for channels to leave their contexts.
    #[serde(with = "millis", rename = "shutdown_grace_ms")]
    pub shutdown_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            slice: Duration::from_millis(10),
            radio_stack: 4096,
            pdu_stack: 8192,
            companion_stack: 9000,
            shutdown_grace: Duration::from_secs(6),
        }
    }
}

/// Channel queue capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 50 }
    }
}

/// PDU protocol timing, deployment sequence and heater regulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PduConfig {
    #[serde(with = "millis", rename = "reply_timeout_ms")]
    pub reply_timeout: Duration,
    #[serde(with = "millis", rename = "retry_interval_ms")]
    pub retry_interval: Duration,
    pub max_retries: u32,
    #[serde(with = "millis", rename = "poll_interval_ms")]
    pub poll_interval: Duration,
    #[serde(with = "millis", rename = "warmup_ms")]
    pub warmup: Duration,
    #[serde(with = "millis", rename = "deployment_delay_ms")]
    pub deployment_delay: Duration,
    #[serde(with = "millis", rename = "burn_wire_on_ms")]
    pub burn_wire_on: Duration,
    #[serde(with = "millis", rename = "deployment_window_ms")]
    pub deployment_window: Duration,
    #[serde(with = "millis", rename = "deployment_loop_interval_ms")]
    pub deployment_loop_interval: Duration,
    #[serde(with = "millis", rename = "heater_check_interval_ms")]
    pub heater_check_interval: Duration,
    pub heater_threshold_c: f32,
    #[serde(with = "millis", rename = "loop_period_ms")]
    pub loop_period: Duration,
}

impl Default for PduConfig {
    fn default() -> Self {
        Self {
            reply_timeout: Duration::from_secs(5),
            retry_interval: Duration::from_secs(1),
            max_retries: 3,
            poll_interval: Duration::from_millis(100),
            warmup: Duration::from_secs(5),
            deployment_delay: Duration::from_secs(5),
            burn_wire_on: Duration::from_secs(5),
            deployment_window: Duration::from_secs(60),
            deployment_loop_interval: Duration::from_secs(10),
            heater_check_interval: Duration::from_secs(60),
            heater_threshold_c: -10.0,
            loop_period: Duration::from_millis(100),
        }
    }
}

/// Radio transceiver settings and transport timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    pub frequency_mhz: f32,
    pub tx_power_dbm: i8,
    pub max_frame: usize,
    #[serde(with = "millis", rename = "send_timeout_ms")]
    pub send_timeout: Duration,
    #[serde(with = "millis", rename = "receive_timeout_ms")]
    pub receive_timeout: Duration,
    #[serde(with = "millis", rename = "backlog_step_ms")]
    pub backlog_step: Duration,
    #[serde(with = "millis", rename = "min_receive_timeout_ms")]
    pub min_receive_timeout: Duration,
    #[serde(with = "millis", rename = "post_send_delay_ms")]
    pub post_send_delay: Duration,
    #[serde(with = "millis", rename = "poll_interval_ms")]
    pub poll_interval: Duration,
    #[serde(with = "millis", rename = "init_retry_interval_ms")]
    pub init_retry_interval: Duration,
    #[serde(with = "millis", rename = "loop_period_ms")]
    pub loop_period: Duration,
}

impl RadioConfig {
    pub fn settings(&self) -> RadioSettings {
        RadioSettings {
            frequency_mhz: self.frequency_mhz,
            tx_power_dbm: self.tx_power_dbm,
        }
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        let settings = RadioSettings::default();
        Self {
            frequency_mhz: settings.frequency_mhz,
            tx_power_dbm: settings.tx_power_dbm,
            max_frame: RADIO_MAX_FRAME,
            send_timeout: Duration::from_secs(1),
            receive_timeout: Duration::from_secs(5),
            backlog_step: Duration::from_secs(1),
            min_receive_timeout: Duration::from_millis(200),
            post_send_delay: Duration::from_millis(500),
            poll_interval: Duration::from_millis(10),
            init_retry_interval: Duration::from_secs(1),
            loop_period: Duration::from_millis(10),
        }
    }
}

/// Companion-computer link and power sequencing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanionConfig {
    pub max_frame: usize,
    /// Time the companion computer needs after power-on before it listens.
    #[serde(with = "millis", rename = "boot_delay_ms")]
    pub boot_delay: Duration,
    #[serde(with = "millis", rename = "shutdown_grace_ms")]
    pub shutdown_grace: Duration,
    #[serde(with = "millis", rename = "loop_period_ms")]
    pub loop_period: Duration,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            max_frame: DEFAULT_MAX_FRAME,
            boot_delay: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(20),
            loop_period: Duration::from_millis(100),
        }
    }
}

/// Router thresholds and pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Minimum battery voltage for powering the companion computer.
    pub companion_min_voltage: f32,
    #[serde(with = "millis", rename = "deployment_beacon_interval_ms")]
    pub deployment_beacon_interval: Duration,
    #[serde(with = "millis", rename = "loop_period_ms")]
    pub loop_period: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            companion_min_voltage: 7.0,
            deployment_beacon_interval: Duration::from_secs(20),
            loop_period: Duration::from_millis(10),
        }
    }
}

/// Complete flight configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightConfig {
    pub scheduler: SchedulerConfig,
    pub queues: QueueConfig,
    pub pdu: PduConfig,
    pub radio: RadioConfig,
    pub companion: CompanionConfig,
    pub router: RouterConfig,
}

impl FlightConfig {
    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON configuration file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }
}
