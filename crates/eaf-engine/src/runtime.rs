//! Threaded runtime: clock thread plus heartbeat thread.
//!
//! The clock runs on `eaf-clock` at the configured cadence; the heartbeat on
//! `eaf-heartbeat` at its own interval. Control goes through the
//! [`CommandChannel`], observation through [`Subscription`]s and the
//! [`SharedHistory`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{info, warn};
use uuid::Uuid;

use crate::broadcast::{Broadcaster, Subscription};
use crate::clock::{SimulationClock, heartbeat_loop};
use crate::command::CommandChannel;
use crate::config::ClockSettings;
use crate::error::{ControlError, EngineError, EngineResult};
use crate::history::SharedHistory;
use crate::snapshot::{RunStatus, Termination};

/// Outcome of [`FurnaceRuntime::shutdown`].
#[derive(Debug, Clone, PartialEq)]
pub struct ShutdownReport {
    pub run_id: Uuid,
    pub final_tick: u64,
    pub heartbeats_sent: u64,
    pub termination: Option<Termination>,
    pub fault: Option<ControlError>,
    pub elapsed: Duration,
}

struct Threads {
    shutdown: Arc<AtomicBool>,
    clock: JoinHandle<SimulationClock>,
    heartbeat: JoinHandle<u64>,
}

pub struct FurnaceRuntime {
    settings: ClockSettings,
    run_id: Uuid,
    channel: CommandChannel,
    broadcaster: Broadcaster,
    history: SharedHistory,
    threads: Option<Threads>,
}

impl FurnaceRuntime {
    /// Spawn an idle clock and its heartbeat.
    pub fn spawn(settings: ClockSettings) -> EngineResult<Self> {
        settings.validate()?;
        let (clock, channel) = SimulationClock::new(settings.clone());
        let run_id = clock.run_id();
        let broadcaster = clock.broadcaster().clone();
        let history = clock.history().clone();
        let status = clock.status_cell();
        let tick = clock.tick_counter();
        let shutdown = Arc::new(AtomicBool::new(false));

        let clock_shutdown = Arc::clone(&shutdown);
        let clock = thread::Builder::new()
            .name("eaf-clock".into())
            .spawn(move || clock.run(&clock_shutdown))
            .map_err(|source| EngineError::Spawn {
                name: "eaf-clock",
                source,
            })?;

        let beat_broadcaster = broadcaster.clone();
        let beat_shutdown = Arc::clone(&shutdown);
        let interval = settings.heartbeat_interval();
        let heartbeat = thread::Builder::new()
            .name("eaf-heartbeat".into())
            .spawn(move || {
                heartbeat_loop(run_id, status, tick, beat_broadcaster, interval, beat_shutdown)
            })
            .map_err(|source| {
                // Do not leave the clock thread running unowned.
                shutdown.store(true, Ordering::Release);
                clock.thread().unpark();
                EngineError::Spawn {
                    name: "eaf-heartbeat",
                    source,
                }
            });
        let heartbeat = match heartbeat {
            Ok(handle) => handle,
            Err(e) => {
                let _ = clock.join();
                return Err(e);
            }
        };

        info!(%run_id, "furnace runtime spawned");
        Ok(Self {
            settings,
            run_id,
            channel,
            broadcaster,
            history,
            threads: Some(Threads {
                shutdown,
                clock,
                heartbeat,
            }),
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Control handle; clone freely.
    pub fn channel(&self) -> &CommandChannel {
        &self.channel
    }

    pub fn subscribe(&self) -> Subscription {
        self.broadcaster.subscribe()
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        self.broadcaster.unsubscribe(subscription);
    }

    pub fn history(&self) -> &SharedHistory {
        &self.history
    }

    pub fn status(&self) -> RunStatus {
        self.channel.status()
    }

    /// Wait for the clock thread to finish on its own (completion, stop or fault).
    pub fn wait_until_stopped(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            match &self.threads {
                Some(threads) if !threads.clock.is_finished() => {
                    thread::sleep(Duration::from_millis(5));
                }
                _ => return true,
            }
        }
        false
    }

    /// Stop the run if active, then join both threads.
    pub fn shutdown(mut self) -> EngineResult<ShutdownReport> {
        self.join()
    }

    /// Tear down the current run and start over with a fresh idle clock.
    ///
    /// The only way forward after a stop or a numeric fault. Existing
    /// channel clones and subscriptions stay bound to the old run.
    pub fn reset(&mut self) -> EngineResult<ShutdownReport> {
        let report = self.join()?;
        *self = Self::spawn(self.settings.clone())?;
        info!(previous = %report.run_id, run_id = %self.run_id, "runtime reset");
        Ok(report)
    }

    fn join(&mut self) -> EngineResult<ShutdownReport> {
        let start = Instant::now();
        let Some(threads) = self.threads.take() else {
            return Ok(ShutdownReport {
                run_id: self.run_id,
                final_tick: self.channel.tick(),
                heartbeats_sent: 0,
                termination: None,
                fault: None,
                elapsed: Duration::ZERO,
            });
        };
        threads.shutdown.store(true, Ordering::Release);
        threads.clock.thread().unpark();
        threads.heartbeat.thread().unpark();

        let clock = threads
            .clock
            .join()
            .map_err(|_| EngineError::ThreadPanicked("eaf-clock"))?;
        let heartbeats_sent = threads
            .heartbeat
            .join()
            .map_err(|_| EngineError::ThreadPanicked("eaf-heartbeat"))?;

        let report = ShutdownReport {
            run_id: self.run_id,
            final_tick: self.channel.tick(),
            heartbeats_sent,
            termination: clock.termination().cloned(),
            fault: clock.fault().cloned(),
            elapsed: start.elapsed(),
        };
        info!(
            run_id = %report.run_id,
            final_tick = report.final_tick,
            heartbeats = report.heartbeats_sent,
            "furnace runtime shut down"
        );
        Ok(report)
    }
}

impl Drop for FurnaceRuntime {
    fn drop(&mut self) {
        if self.threads.is_some()
            && let Err(e) = self.join()
        {
            warn!(error = %e, "runtime shutdown on drop failed");
        }
    }
}
