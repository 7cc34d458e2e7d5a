//! Command channel: the only cross-thread path into the clock.
//!
//! Calls validate synchronously and enqueue; they never touch simulation
//! state. The channel keeps a projected lifecycle (what the clock's status
//! will be once everything queued so far is applied) under a mutex, so the
//! state check and the enqueue of one call are atomic with respect to other
//! callers. The clock writes back into the same lifecycle whenever a run
//! ends, and is the only writer of the stop reason.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::Sender;
use eaf_furnace::{MaterialInjection, ParameterPatch, ZoneKind};
use tracing::{debug, info};

use crate::config::RunConfig;
use crate::error::{ControlError, ControlResult};
use crate::snapshot::{RunStatus, StopReason};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start(Box<RunConfig>),
    Stop,
    Pause,
    Resume,
    UpdateParameters(ParameterPatch),
    AddMaterial(MaterialInjection),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Start(_) => "start",
            Command::Stop => "stop",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::UpdateParameters(_) => "update_parameters",
            Command::AddMaterial(_) => "add_material",
        }
    }
}

/// A command tagged with its arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct Queued {
    pub sequence: u64,
    pub command: Command,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Lifecycle {
    pub status: RunStatus,
    pub stop_reason: Option<StopReason>,
    pub fault: Option<ControlError>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SharedLifecycle(Arc<Mutex<Lifecycle>>);

impl SharedLifecycle {
    pub fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable producer handle.
#[derive(Debug, Clone)]
pub struct CommandChannel {
    tx: Sender<Queued>,
    lifecycle: SharedLifecycle,
    sequence: Arc<AtomicU64>,
    tick: Arc<AtomicU64>,
}

impl CommandChannel {
    pub(crate) fn new(
        tx: Sender<Queued>,
        lifecycle: SharedLifecycle,
        tick: Arc<AtomicU64>,
    ) -> Self {
        Self {
            tx,
            lifecycle,
            sequence: Arc::new(AtomicU64::new(0)),
            tick,
        }
    }

    fn send(&self, command: Command) -> ControlResult<u64> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        debug!(sequence, command = command.name(), "command queued");
        self.tx
            .send(Queued { sequence, command })
            .map_err(|_| ControlError::Stopped)?;
        Ok(sequence)
    }

    /// Mutations need an active run.
    fn ensure_active(lifecycle: &Lifecycle) -> ControlResult<()> {
        match lifecycle.status {
            RunStatus::Idle => Err(ControlError::NotRunning),
            RunStatus::Stopped => Err(ControlError::Stopped),
            RunStatus::Running | RunStatus::Paused => Ok(()),
        }
    }

    pub fn start(&self, config: RunConfig) -> ControlResult<()> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.status != RunStatus::Idle {
            return Err(ControlError::AlreadyRunning);
        }
        config.validate()?;
        self.send(Command::Start(Box::new(config)))?;
        lifecycle.status = RunStatus::Running;
        info!("start accepted");
        Ok(())
    }

    /// One transition; a second call reports `already_stopped`.
    pub fn stop(&self) -> ControlResult<()> {
        let mut lifecycle = self.lifecycle.lock();
        match lifecycle.status {
            RunStatus::Idle => return Err(ControlError::NotRunning),
            RunStatus::Stopped => return Err(ControlError::AlreadyStopped),
            RunStatus::Running | RunStatus::Paused => {}
        }
        self.send(Command::Stop)?;
        lifecycle.status = RunStatus::Stopped;
        info!("stop accepted");
        Ok(())
    }

    /// Pausing a paused run is a no-op.
    pub fn pause(&self) -> ControlResult<()> {
        let mut lifecycle = self.lifecycle.lock();
        Self::ensure_active(&lifecycle)?;
        if lifecycle.status == RunStatus::Running {
            self.send(Command::Pause)?;
            lifecycle.status = RunStatus::Paused;
        }
        Ok(())
    }

    /// Resuming a running run is a no-op.
    pub fn resume(&self) -> ControlResult<()> {
        let mut lifecycle = self.lifecycle.lock();
        Self::ensure_active(&lifecycle)?;
        if lifecycle.status == RunStatus::Paused {
            self.send(Command::Resume)?;
            lifecycle.status = RunStatus::Running;
        }
        Ok(())
    }

    pub fn update_parameters(&self, patch: ParameterPatch) -> ControlResult<()> {
        let lifecycle = self.lifecycle.lock();
        Self::ensure_active(&lifecycle)?;
        patch.validate()?;
        self.send(Command::UpdateParameters(patch))?;
        Ok(())
    }

    /// Parse a JSON object against the parameter schema, then update.
    pub fn update_parameters_json(&self, payload: &str) -> ControlResult<()> {
        let lifecycle = self.lifecycle.lock();
        Self::ensure_active(&lifecycle)?;
        let patch = ParameterPatch::from_json(payload)?;
        self.send(Command::UpdateParameters(patch))?;
        Ok(())
    }

    /// Queue `amount_kg` of `material` for `zone` (a zone wire name).
    pub fn add_material(&self, material: &str, amount_kg: f64, zone: &str) -> ControlResult<()> {
        let lifecycle = self.lifecycle.lock();
        Self::ensure_active(&lifecycle)?;
        let zone: ZoneKind = zone.parse()?;
        let injection = MaterialInjection::new(material, amount_kg, zone, self.tick())?;
        self.send(Command::AddMaterial(injection))?;
        Ok(())
    }

    /// Projected status, including commands not yet applied.
    pub fn status(&self) -> RunStatus {
        self.lifecycle.lock().status
    }

    /// Set by the clock once the run has actually ended.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.lifecycle.lock().stop_reason
    }

    /// The numeric fault that ended the run, if any.
    pub fn fault(&self) -> Option<ControlError> {
        self.lifecycle.lock().fault.clone()
    }

    /// Last committed tick.
    pub fn tick(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }
}
