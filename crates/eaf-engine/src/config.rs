//! Run configuration (what to simulate) and clock settings (how to drive it).

use std::path::Path;
use std::time::Duration;

use eaf_core::constants::AMBIENT_K;
use eaf_furnace::{
    AlertThresholds, FurnaceModel, MaterialInjection, OperatingParameters, ZoneKind,
};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Material charged before the first tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InitialMaterial {
    pub material: String,
    pub amount_kg: f64,
    pub zone: ZoneKind,
}

/// Everything `start` needs. Fixed for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Bath capacity in tonnes.
    pub furnace_capacity_t: f64,
    /// Simulated duration (s); the run completes once reached.
    pub duration_s: f64,
    /// Fixed step Δt (s).
    pub time_step_s: f64,
    pub initial_temperature_k: f64,
    pub parameters: OperatingParameters,
    pub initial_materials: Vec<InitialMaterial>,
    pub alerts: AlertThresholds,
    pub model: FurnaceModel,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            furnace_capacity_t: 150.0,
            duration_s: 3600.0,
            time_step_s: 1.0,
            initial_temperature_k: AMBIENT_K,
            parameters: OperatingParameters::default(),
            initial_materials: Vec::new(),
            alerts: AlertThresholds::default(),
            model: FurnaceModel::default(),
        }
    }
}

fn ensure_positive(key: &'static str, value: f64) -> ConfigResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(key, format!("must be positive, got {value}")))
    }
}

impl RunConfig {
    /// A realistic heat with a scrap and lime charge, as written by `example-config`.
    pub fn example() -> Self {
        Self {
            initial_materials: vec![
                InitialMaterial {
                    material: "steel_scrap".to_string(),
                    amount_kg: 5000.0,
                    zone: ZoneKind::LiquidMetal,
                },
                InitialMaterial {
                    material: "lime".to_string(),
                    amount_kg: 200.0,
                    zone: ZoneKind::Slag,
                },
            ],
            ..Self::default()
        }
    }

    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        let config: RunConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn to_yaml_string(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        ensure_positive("furnace_capacity_t", self.furnace_capacity_t)?;
        ensure_positive("duration_s", self.duration_s)?;
        ensure_positive("time_step_s", self.time_step_s)?;
        if self.time_step_s > self.duration_s {
            return Err(ConfigError::invalid(
                "time_step_s",
                "must not exceed the run duration",
            ));
        }
        if !(self.initial_temperature_k.is_finite() && self.initial_temperature_k >= 0.0) {
            return Err(ConfigError::invalid(
                "initial_temperature_k",
                format!("must be >= 0 K, got {}", self.initial_temperature_k),
            ));
        }
        self.parameters.validate()?;
        self.model.validate()?;
        for item in &self.initial_materials {
            MaterialInjection::new(item.material.as_str(), item.amount_kg, item.zone, 0)?;
        }
        let alerts = &self.alerts;
        if !(alerts.min_temperature_k < alerts.max_temperature_k) {
            return Err(ConfigError::invalid(
                "alerts",
                "min_temperature_k must be below max_temperature_k",
            ));
        }
        Ok(())
    }

    /// Ticks until the configured duration is reached.
    pub fn total_ticks(&self) -> u64 {
        (self.duration_s / self.time_step_s).ceil() as u64
    }
}

/// Knobs for driving a clock in wall-clock time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClockSettings {
    /// Simulated seconds per wall-clock second.
    pub speedup: f64,
    pub history_capacity: usize,
    /// Per-subscriber queue bound; the oldest event is dropped on overflow.
    pub subscriber_queue: usize,
    pub heartbeat_interval_ms: u64,
    /// Commands applied per tick boundary at most.
    pub command_budget: usize,
    /// Poll interval while idle or paused.
    pub idle_poll_ms: u64,
}

impl Default for ClockSettings {
    fn default() -> Self {
        Self {
            speedup: 1.0,
            history_capacity: 1000,
            subscriber_queue: 64,
            heartbeat_interval_ms: 1000,
            command_budget: 64,
            idle_poll_ms: 20,
        }
    }
}

impl ClockSettings {
    pub fn validate(&self) -> ConfigResult<()> {
        ensure_positive("speedup", self.speedup)?;
        let counts = [
            ("history_capacity", self.history_capacity),
            ("subscriber_queue", self.subscriber_queue),
            ("command_budget", self.command_budget),
        ];
        for (key, value) in counts {
            if value == 0 {
                return Err(ConfigError::invalid(key, "must be at least 1"));
            }
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::invalid("heartbeat_interval_ms", "must be at least 1"));
        }
        Ok(())
    }

    /// Wall-clock spacing between ticks for a step of `time_step_s`.
    pub fn tick_interval(&self, time_step_s: f64) -> Duration {
        Duration::from_secs_f64((time_step_s / self.speedup).max(0.0))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}
