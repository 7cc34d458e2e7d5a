//! The simulation clock: sole owner and mutator of the simulation state.
//!
//! Per tick boundary the clock
//! 1. drains queued commands (bounded budget, arrival order, at most one
//!    parameter update per tick),
//! 2. turns continuous feed rates into ledger injections,
//! 3. calls [`eaf_furnace::step`] once if running,
//! 4. commits the result, appends it to the history and publishes it.
//!
//! [`SimulationClock::tick`] performs one boundary synchronously;
//! [`SimulationClock::run`] drives it in wall-clock time.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use eaf_furnace::{
    FurnaceState, MaterialInjection, MaterialLedger, OperatingParameters, PowerReading, arc_length_m,
    composition_for, feed_injections, step,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::broadcast::Broadcaster;
use crate::command::{Command, CommandChannel, Queued, SharedLifecycle};
use crate::config::{ClockSettings, RunConfig};
use crate::error::{ControlError, ControlResult};
use crate::history::SharedHistory;
use crate::snapshot::{
    FurnaceEvent, HeartbeatEvent, RunStatus, SimulationSnapshot, StopReason, Termination,
};

/// Live aggregate of an active run.
#[derive(Debug, Clone)]
pub struct SimulationState {
    pub config: RunConfig,
    pub furnace: FurnaceState,
    pub ledger: MaterialLedger,
    pub params: OperatingParameters,
    pub last_power: PowerReading,
}

impl SimulationState {
    fn start(config: RunConfig) -> ControlResult<Self> {
        let mut furnace = FurnaceState::new(
            config.furnace_capacity_t,
            config.initial_temperature_k,
            &config.model,
        )?;
        let mut ledger = MaterialLedger::new();
        let mut charged = Vec::with_capacity(config.initial_materials.len());
        for item in &config.initial_materials {
            let injection =
                MaterialInjection::new(item.material.as_str(), item.amount_kg, item.zone, 0)?;
            furnace.zones.get_mut(item.zone).merge(
                item.amount_kg,
                &composition_for(&item.material),
                config.model.ambient_temperature_k,
            )?;
            charged.push(injection);
        }
        ledger.record_applied(&charged);

        let params = config.parameters;
        let requested_w = params.arc_power_w();
        Ok(Self {
            furnace,
            ledger,
            params,
            last_power: PowerReading {
                requested_w,
                delivered_w: 0.0,
                clamped: false,
            },
            config,
        })
    }
}

/// What one call to [`SimulationClock::tick`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No run yet.
    Idle,
    Paused,
    /// A step was taken and committed at this tick index.
    Advanced(u64),
    /// The run is over (possibly ended during this call).
    Stopped,
}

/// The clock's committed status, readable from other threads.
#[derive(Debug, Clone, Default)]
pub(crate) struct StatusCell(Arc<AtomicU8>);

impl StatusCell {
    fn encode(status: RunStatus) -> u8 {
        match status {
            RunStatus::Idle => 0,
            RunStatus::Running => 1,
            RunStatus::Paused => 2,
            RunStatus::Stopped => 3,
        }
    }

    pub(crate) fn load(&self) -> RunStatus {
        match self.0.load(Ordering::Acquire) {
            0 => RunStatus::Idle,
            1 => RunStatus::Running,
            2 => RunStatus::Paused,
            _ => RunStatus::Stopped,
        }
    }

    fn store(&self, status: RunStatus) {
        self.0.store(Self::encode(status), Ordering::Release);
    }
}

pub struct SimulationClock {
    settings: ClockSettings,
    run_id: Uuid,
    rx: Receiver<Queued>,
    lifecycle: SharedLifecycle,
    tick_counter: Arc<AtomicU64>,
    broadcaster: Broadcaster,
    history: SharedHistory,
    status: RunStatus,
    committed: StatusCell,
    backlog: VecDeque<Queued>,
    state: Option<SimulationState>,
    termination: Option<Termination>,
    fault: Option<ControlError>,
    started_at: Option<Instant>,
}

impl SimulationClock {
    /// A fresh idle clock and the channel that feeds it.
    pub fn new(settings: ClockSettings) -> (Self, CommandChannel) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let lifecycle = SharedLifecycle::default();
        let tick_counter = Arc::new(AtomicU64::new(0));
        let channel = CommandChannel::new(tx, lifecycle.clone(), Arc::clone(&tick_counter));
        let clock = Self {
            broadcaster: Broadcaster::new(settings.subscriber_queue),
            history: SharedHistory::new(settings.history_capacity),
            settings,
            run_id: Uuid::new_v4(),
            rx,
            lifecycle,
            tick_counter,
            status: RunStatus::Idle,
            committed: StatusCell::default(),
            backlog: VecDeque::new(),
            state: None,
            termination: None,
            fault: None,
            started_at: None,
        };
        (clock, channel)
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn state(&self) -> Option<&SimulationState> {
        self.state.as_ref()
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn history(&self) -> &SharedHistory {
        &self.history
    }

    pub(crate) fn status_cell(&self) -> StatusCell {
        self.committed.clone()
    }

    pub(crate) fn tick_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.tick_counter)
    }

    pub fn settings(&self) -> &ClockSettings {
        &self.settings
    }

    pub fn termination(&self) -> Option<&Termination> {
        self.termination.as_ref()
    }

    /// The numeric fault that ended the run, if any.
    pub fn fault(&self) -> Option<&ControlError> {
        self.fault.as_ref()
    }

    /// Commands waiting for a later tick boundary.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len() + self.rx.len()
    }

    /// One tick boundary: apply commands, then step once if running.
    pub fn tick(&mut self) -> TickOutcome {
        if self.status == RunStatus::Stopped {
            return TickOutcome::Stopped;
        }
        self.apply_commands();
        match self.status {
            RunStatus::Idle => TickOutcome::Idle,
            RunStatus::Paused => TickOutcome::Paused,
            RunStatus::Stopped => TickOutcome::Stopped,
            RunStatus::Running => self.advance(),
        }
    }

    /// Drive ticks at `time_step / speedup` until the run stops or
    /// `shutdown` is raised. Late ticks are not caught up.
    ///
    /// Returns the clock so the caller can inspect the final state.
    pub fn run(mut self, shutdown: &AtomicBool) -> Self {
        info!(run_id = %self.run_id, "clock loop started");
        loop {
            if shutdown.load(Ordering::Acquire) {
                self.shutdown();
                break;
            }
            let tick_start = Instant::now();
            self.tick();
            let cadence = match (&self.state, self.status) {
                (_, RunStatus::Stopped) => break,
                (Some(state), RunStatus::Running) => {
                    self.settings.tick_interval(state.config.time_step_s)
                }
                _ => self.settings.idle_poll(),
            };
            if let Some(remaining) = cadence.checked_sub(tick_start.elapsed()) {
                thread::park_timeout(remaining);
            }
        }
        info!(run_id = %self.run_id, status = %self.status, "clock loop exited");
        self
    }

    /// End the run now, as if `stop()` had been applied.
    pub fn shutdown(&mut self) {
        self.finish(StopReason::Requested, None);
    }

    fn set_status(&mut self, status: RunStatus) {
        self.status = status;
        self.committed.store(status);
    }

    fn next_command(&mut self) -> Option<Queued> {
        self.backlog.pop_front().or_else(|| self.rx.try_recv().ok())
    }

    fn apply_commands(&mut self) {
        let mut applied = 0;
        let mut params_updated = false;
        while applied < self.settings.command_budget {
            let Some(queued) = self.next_command() else {
                break;
            };
            if matches!(queued.command, Command::UpdateParameters(_)) {
                if params_updated {
                    // This update and everything behind it waits for the next tick.
                    self.backlog.push_front(queued);
                    break;
                }
                params_updated = true;
            }
            applied += 1;
            self.apply(queued);
            if self.status == RunStatus::Stopped {
                self.discard_pending();
                return;
            }
        }
        if applied > 0 {
            debug!(applied, waiting = self.backlog_len(), "commands applied");
        }
    }

    fn apply(&mut self, queued: Queued) {
        let Queued { sequence, command } = queued;
        debug!(sequence, command = command.name(), "applying command");
        match command {
            Command::Start(config) => {
                if self.status != RunStatus::Idle {
                    warn!(sequence, "start ignored, run already started");
                    return;
                }
                match SimulationState::start(*config) {
                    Ok(state) => {
                        info!(
                            run_id = %self.run_id,
                            capacity_t = state.config.furnace_capacity_t,
                            time_step_s = state.config.time_step_s,
                            "run started"
                        );
                        self.state = Some(state);
                        self.set_status(RunStatus::Running);
                        self.started_at = Some(Instant::now());
                    }
                    Err(e) => {
                        error!(error = %e, "run failed to start");
                        self.finish(StopReason::Fault, Some(e));
                    }
                }
            }
            Command::Stop => self.finish(StopReason::Requested, None),
            Command::Pause => {
                if self.status == RunStatus::Running {
                    self.set_status(RunStatus::Paused);
                    info!(tick = self.current_tick(), "run paused");
                }
            }
            Command::Resume => {
                if self.status == RunStatus::Paused {
                    self.set_status(RunStatus::Running);
                    info!(tick = self.current_tick(), "run resumed");
                }
            }
            Command::UpdateParameters(patch) => {
                let Some(state) = self.state.as_mut() else {
                    warn!(sequence, "parameter update without a run");
                    return;
                };
                match patch.apply_to(&state.params) {
                    Ok(params) => {
                        state.params = params;
                        debug!(sequence, fields = patch.fields().len(), "parameters updated");
                    }
                    Err(e) => warn!(sequence, error = %e, "parameter update rejected"),
                }
            }
            Command::AddMaterial(injection) => match self.state.as_mut() {
                Some(state) => state.ledger.queue(injection),
                None => warn!(sequence, "material injection without a run"),
            },
        }
    }

    fn discard_pending(&mut self) {
        let mut dropped = self.backlog.len();
        self.backlog.clear();
        dropped += self.rx.try_iter().count();
        if dropped > 0 {
            warn!(dropped, "commands discarded after stop");
        }
    }

    fn current_tick(&self) -> u64 {
        self.state.as_ref().map_or(0, |s| s.furnace.tick)
    }

    fn advance(&mut self) -> TickOutcome {
        let Some(state) = self.state.as_mut() else {
            return TickOutcome::Idle;
        };
        let dt = state.config.time_step_s;
        let mut injections = state.ledger.take_pending();
        injections.extend(feed_injections(&state.params, dt, state.furnace.tick));

        let report = match step(&state.furnace, &state.params, &injections, &state.config.model, dt)
        {
            Ok(report) => report,
            Err(e) => {
                let fault = ControlError::from(e);
                error!(
                    tick = state.furnace.tick + 1,
                    code = %fault.code(),
                    error = %fault,
                    "numeric fault, stopping run"
                );
                self.finish(StopReason::Fault, Some(fault));
                return TickOutcome::Stopped;
            }
        };

        state.ledger.record_applied(&injections);
        state.furnace = report.state;
        state.last_power = report.power;
        let tick = state.furnace.tick;
        let completed = state.furnace.time_s + 1e-9 >= state.config.duration_s;
        self.tick_counter.store(tick, Ordering::Release);

        if completed {
            // This tick's own snapshot is the terminal one.
            self.finish(StopReason::Completed, None);
            return TickOutcome::Stopped;
        }
        if let Some(snapshot) = self.publish(None, true) {
            debug!(
                tick,
                power_w = snapshot.current_power_w,
                metal_k = snapshot.zones.liquid_metal.temperature_k,
                "tick committed"
            );
            if snapshot.alert.is_breached() {
                debug!(tick, severity = ?snapshot.alert.severity, "alert thresholds breached");
            }
        }
        TickOutcome::Advanced(tick)
    }

    /// Build and broadcast a snapshot of the current state. `record` appends
    /// it to the history; a tick is recorded at most once.
    fn publish(
        &self,
        termination: Option<Termination>,
        record: bool,
    ) -> Option<Arc<SimulationSnapshot>> {
        let state = self.state.as_ref()?;
        let snapshot = Arc::new(self.snapshot(state, termination));
        if record {
            self.history.append(Arc::clone(&snapshot));
        }
        self.broadcaster
            .publish(FurnaceEvent::Snapshot(Arc::clone(&snapshot)));
        Some(snapshot)
    }

    fn snapshot(
        &self,
        state: &SimulationState,
        termination: Option<Termination>,
    ) -> SimulationSnapshot {
        let furnace = &state.furnace;
        let metal = &furnace.zones.liquid_metal;
        let alert = state.config.alerts.evaluate(
            metal.temperature_k,
            metal.mass_kg,
            metal.composition.fraction("C"),
            state.last_power.requested_w,
        );
        SimulationSnapshot {
            run_id: self.run_id,
            tick: furnace.tick,
            simulation_time_s: furnace.time_s,
            duration_s: state.config.duration_s,
            wall_offset_s: self
                .started_at
                .map_or(0.0, |t| t.elapsed().as_secs_f64()),
            status: self.status,
            zones: furnace.zones.clone(),
            current_power_w: furnace.current_power_w,
            requested_power_w: state.last_power.requested_w,
            cumulative_energy_j: furnace.cumulative_energy_j,
            efficiency_percent: furnace.efficiency_percent(),
            arc_length_m: arc_length_m(&state.params, &state.config.model),
            parameters: state.params,
            alert,
            materials_applied_kg: state.ledger.applied_totals().clone(),
            termination,
        }
    }

    /// End the run and broadcast a terminal snapshot. It enters the history
    /// only if the current tick is not recorded there yet.
    fn finish(&mut self, reason: StopReason, fault: Option<ControlError>) {
        if self.status == RunStatus::Stopped {
            return;
        }
        let reason = if fault.is_some() {
            StopReason::Fault
        } else {
            reason
        };
        self.set_status(RunStatus::Stopped);
        {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle.status = RunStatus::Stopped;
            lifecycle.stop_reason = Some(reason);
            lifecycle.fault = fault.clone();
        }

        let termination = Termination {
            reason,
            error_code: fault.as_ref().map(ControlError::code),
            message: fault.as_ref().map(ToString::to_string),
        };
        self.fault = fault;
        self.termination = Some(termination.clone());
        let recorded = self.history.latest().map(|s| s.tick);
        self.publish(Some(termination), recorded != Some(self.current_tick()));
        self.broadcaster.close();
        info!(
            run_id = %self.run_id,
            tick = self.current_tick(),
            reason = ?reason,
            "run stopped"
        );
    }
}

/// Heartbeat carrying the clock's committed status and tick.
pub(crate) fn heartbeat_event(
    run_id: Uuid,
    status: &StatusCell,
    tick: &AtomicU64,
    sequence: u64,
) -> HeartbeatEvent {
    HeartbeatEvent {
        run_id,
        status: status.load(),
        tick: tick.load(Ordering::Acquire),
        sequence,
        sent_at: chrono::Utc::now(),
    }
}

/// Publish a heartbeat every `interval`.
///
/// Ends when `shutdown` is raised or the broadcaster closes. Returns the
/// number of heartbeats sent.
pub(crate) fn heartbeat_loop(
    run_id: Uuid,
    status: StatusCell,
    tick: Arc<AtomicU64>,
    broadcaster: Broadcaster,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
) -> u64 {
    let mut sequence = 0;
    while !shutdown.load(Ordering::Acquire) && !broadcaster.is_closed() {
        sequence += 1;
        broadcaster.publish(FurnaceEvent::Heartbeat(heartbeat_event(
            run_id, &status, &tick, sequence,
        )));
        thread::park_timeout(interval);
    }
    sequence
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_reports_committed_status() {
        let (mut clock, channel) = SimulationClock::new(ClockSettings::default());
        let cell = clock.status_cell();
        let counter = clock.tick_counter();

        channel.start(RunConfig::default()).unwrap();
        // Accepted but not yet applied by the clock.
        assert_eq!(channel.status(), RunStatus::Running);
        let beat = heartbeat_event(clock.run_id(), &cell, &counter, 1);
        assert_eq!(beat.status, RunStatus::Idle);
        assert_eq!(beat.tick, 0);

        clock.tick();
        let beat = heartbeat_event(clock.run_id(), &cell, &counter, 2);
        assert_eq!(beat.status, RunStatus::Running);
        assert_eq!(beat.tick, 1);

        channel.pause().unwrap();
        assert_eq!(cell.load(), RunStatus::Running);
        clock.tick();
        assert_eq!(cell.load(), RunStatus::Paused);

        channel.stop().unwrap();
        clock.tick();
        assert_eq!(cell.load(), RunStatus::Stopped);
    }

    #[test]
    fn status_cell_round_trips() {
        let cell = StatusCell::default();
        for status in [
            RunStatus::Idle,
            RunStatus::Running,
            RunStatus::Paused,
            RunStatus::Stopped,
        ] {
            cell.store(status);
            assert_eq!(cell.load(), status);
        }
    }
}
