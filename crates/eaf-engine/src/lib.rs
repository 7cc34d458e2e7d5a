//! Live engine around the furnace physics.
//!
//! Provides:
//! - Run configuration (YAML) and clock settings
//! - The command channel with synchronous validation
//! - The simulation clock (single owner of state, fixed-Δt ticks)
//! - Snapshot fan-out with bounded per-subscriber queues and heartbeats
//! - A bounded history of snapshots
//! - A threaded runtime wiring it all together

pub mod broadcast;
pub mod clock;
pub mod command;
pub mod config;
pub mod error;
pub mod history;
pub mod runtime;
pub mod snapshot;

pub use broadcast::{Broadcaster, Subscription};
pub use clock::{SimulationClock, SimulationState, TickOutcome};
pub use command::{Command, CommandChannel, Queued};
pub use config::{ClockSettings, InitialMaterial, RunConfig};
pub use error::{
    ConfigError, ConfigResult, ControlError, ControlResult, EngineError, EngineResult,
    ErrorCategory,
};
pub use history::{HistoryRing, SharedHistory};
pub use runtime::{FurnaceRuntime, ShutdownReport};
pub use snapshot::{
    FurnaceEvent, HeartbeatEvent, RunStatus, SimulationSnapshot, SnapshotFrame, StopReason,
    Termination, WireEvent, ZoneMasses, ZoneTemperatures,
};
