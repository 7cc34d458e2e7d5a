//! Immutable per-tick snapshots, heartbeats and their wire shapes.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use eaf_core::units::{Energy, Length, Power, Temperature, Time, j, k, m, s, w};
use eaf_furnace::{AlertReport, OperatingParameters, ZoneKind, ZoneSet};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Stopped,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Idle => "idle",
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Stopped => "stopped",
        }
    }

    /// Running or paused.
    pub fn is_active(self) -> bool {
        matches!(self, RunStatus::Running | RunStatus::Paused)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// `stop()` was called.
    Requested,
    /// The configured duration elapsed.
    Completed,
    /// A numeric fault aborted the run.
    Fault,
}

/// Why and how a run ended. Present only on the final snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Termination {
    pub reason: StopReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Full state of one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSnapshot {
    pub run_id: Uuid,
    pub tick: u64,
    pub simulation_time_s: f64,
    /// Configured run length (s).
    pub duration_s: f64,
    /// Wall-clock seconds since the run started.
    pub wall_offset_s: f64,
    pub status: RunStatus,
    pub zones: ZoneSet,
    /// Delivered power (W).
    pub current_power_w: f64,
    /// `V × I × pf` before the supply clamp (W).
    pub requested_power_w: f64,
    pub cumulative_energy_j: f64,
    pub efficiency_percent: f64,
    pub arc_length_m: f64,
    pub parameters: OperatingParameters,
    pub alert: AlertReport,
    /// Applied mass per material since start (kg).
    pub materials_applied_kg: BTreeMap<String, f64>,
    pub termination: Option<Termination>,
}

impl SimulationSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.termination.is_some()
    }

    pub fn power(&self) -> Power {
        w(self.current_power_w)
    }

    pub fn energy(&self) -> Energy {
        j(self.cumulative_energy_j)
    }

    pub fn simulation_time(&self) -> Time {
        s(self.simulation_time_s)
    }

    pub fn temperature(&self, kind: ZoneKind) -> Temperature {
        k(self.zones.get(kind).temperature_k)
    }

    pub fn arc_length(&self) -> Length {
        m(self.arc_length_m)
    }

    /// Share of the configured duration simulated so far, capped at 100.
    pub fn progress_percent(&self) -> f64 {
        if self.duration_s <= 0.0 {
            return 0.0;
        }
        (100.0 * self.simulation_time_s / self.duration_s).min(100.0)
    }

    /// Transport-facing projection.
    pub fn frame(&self) -> SnapshotFrame {
        let zones = &self.zones;
        SnapshotFrame {
            tick: self.tick,
            status: self.status,
            simulation_time: self.simulation_time_s,
            duration: self.duration_s,
            progress: self.progress_percent(),
            current_power: self.current_power_w,
            energy_efficiency: self.efficiency_percent,
            zone_temperatures: ZoneTemperatures {
                arc: zones.arc.temperature_k,
                liquid_metal: zones.liquid_metal.temperature_k,
                slag: zones.slag.temperature_k,
                refractory: zones.refractory.temperature_k,
            },
            zone_masses: ZoneMasses {
                liquid_metal: zones.liquid_metal.mass_kg,
                slag: zones.slag.mass_kg,
            },
            arc_length: self.arc_length_m,
            electrode_position: self.parameters.electrode_position,
            alert: self.alert.clone(),
            termination: self.termination.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneTemperatures {
    pub arc: f64,
    pub liquid_metal: f64,
    pub slag: f64,
    pub refractory: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneMasses {
    pub liquid_metal: f64,
    pub slag: f64,
}

/// Snapshot as sent over a transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotFrame {
    pub tick: u64,
    pub status: RunStatus,
    pub simulation_time: f64,
    pub duration: f64,
    /// Percent of `duration` simulated.
    pub progress: f64,
    pub current_power: f64,
    pub energy_efficiency: f64,
    pub zone_temperatures: ZoneTemperatures,
    pub zone_masses: ZoneMasses,
    pub arc_length: f64,
    pub electrode_position: f64,
    pub alert: AlertReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination: Option<Termination>,
}

/// Liveness signal, independent of simulation ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatEvent {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub tick: u64,
    pub sequence: u64,
    pub sent_at: DateTime<Utc>,
}

/// What a subscriber receives.
#[derive(Debug, Clone)]
pub enum FurnaceEvent {
    Snapshot(Arc<SimulationSnapshot>),
    Heartbeat(HeartbeatEvent),
}

impl FurnaceEvent {
    pub fn as_snapshot(&self) -> Option<&Arc<SimulationSnapshot>> {
        match self {
            FurnaceEvent::Snapshot(snapshot) => Some(snapshot),
            FurnaceEvent::Heartbeat(_) => None,
        }
    }

    pub fn wire(&self) -> WireEvent {
        match self {
            FurnaceEvent::Snapshot(snapshot) => WireEvent::Snapshot(snapshot.frame()),
            FurnaceEvent::Heartbeat(beat) => WireEvent::Heartbeat(beat.clone()),
        }
    }
}

/// Serializable form of [`FurnaceEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireEvent {
    Snapshot(SnapshotFrame),
    Heartbeat(HeartbeatEvent),
}
