//! Integration test: driving the clock tick by tick.
//!
//! Checks that demonstrate:
//! - 400 V × 50 kA × 0.8 delivers 16 MW on every tick and warms the bath
//! - Injections land exactly once at the next boundary
//! - Rejected commands leave the next snapshot untouched
//! - Commands apply in arrival order, one parameter update per tick
//! - stop() is idempotent and ends every subscription after a final snapshot
//! - Every tick is published and recorded once, terminal snapshots included
//! - A numeric fault is terminal and leaves a diagnostic snapshot

use std::sync::Arc;

use eaf_engine::{
    ClockSettings, ControlError, ErrorCategory, FurnaceEvent, RunConfig, RunStatus,
    SimulationClock, SimulationSnapshot, StopReason, Subscription, TickOutcome,
};
use eaf_furnace::{OperatingParameters, ParamField, ParameterPatch};

fn quiet_config() -> RunConfig {
    RunConfig {
        furnace_capacity_t: 150.0,
        duration_s: 3600.0,
        time_step_s: 1.0,
        parameters: OperatingParameters {
            arc_voltage: 400.0,
            arc_current: 50_000.0,
            power_factor: 0.8,
            oxygen_flow_rate: 0.0,
            carbon_injection_rate: 0.0,
            lime_addition_rate: 0.0,
            dolomite_addition_rate: 0.0,
            ..Default::default()
        },
        ..RunConfig::default()
    }
}

fn started(settings: ClockSettings) -> (SimulationClock, eaf_engine::CommandChannel, Subscription) {
    let (clock, channel) = SimulationClock::new(settings);
    let sub = clock.broadcaster().subscribe();
    channel.start(quiet_config()).expect("start");
    (clock, channel, sub)
}

fn snapshots(sub: &Subscription) -> Vec<Arc<SimulationSnapshot>> {
    sub.drain()
        .into_iter()
        .filter_map(|event| match event {
            FurnaceEvent::Snapshot(snapshot) => Some(snapshot),
            FurnaceEvent::Heartbeat(_) => None,
        })
        .collect()
}

#[test]
fn sixteen_megawatts_for_ten_ticks() {
    let (mut clock, _channel, sub) = started(ClockSettings::default());

    for expected in 1..=10 {
        assert_eq!(clock.tick(), TickOutcome::Advanced(expected));
    }

    let frames = snapshots(&sub);
    assert_eq!(frames.len(), 10);
    let mut last_metal = 0.0;
    for (i, snap) in frames.iter().enumerate() {
        assert_eq!(snap.tick, i as u64 + 1);
        assert_eq!(snap.current_power_w, 16_000_000.0);
        assert_eq!(snap.status, RunStatus::Running);
        let metal = snap.zones.liquid_metal.temperature_k;
        assert!(metal >= last_metal, "bath cooled at tick {}", snap.tick);
        last_metal = metal;
    }
    assert_eq!(frames[9].simulation_time_s, 10.0);
    assert_eq!(clock.history().len(), 10);
}

#[test]
fn scrap_injection_adds_exactly_once() {
    let (mut clock, channel, sub) = started(ClockSettings::default());
    clock.tick();
    let before = snapshots(&sub).pop().expect("first snapshot");

    channel
        .add_material("steel_scrap", 1000.0, "liquid_metal")
        .expect("accepted");
    clock.tick();
    clock.tick();
    let frames = snapshots(&sub);

    let after = &frames[0];
    let gained = after.frame().zone_masses.liquid_metal - before.frame().zone_masses.liquid_metal;
    assert!((gained - 1000.0).abs() < 1e-6, "gained {gained}");
    assert!(after.zones.liquid_metal.composition.is_normalized());
    assert_eq!(after.materials_applied_kg["steel_scrap"], 1000.0);
    // Nothing more arrives on the following tick.
    assert_eq!(
        frames[1].zones.liquid_metal.mass_kg,
        after.zones.liquid_metal.mass_kg
    );
}

#[test]
fn rejected_update_leaves_state_unchanged() {
    let (mut clock, channel, sub) = started(ClockSettings::default());
    clock.tick();

    let err = channel
        .update_parameters(ParameterPatch::single(ParamField::ArcVoltage, -10.0))
        .unwrap_err();
    assert_eq!(err.code(), "out_of_range:arc_voltage");
    assert_eq!(err.category(), ErrorCategory::Validation);
    assert_eq!(clock.backlog_len(), 0);

    clock.tick();
    let frames = snapshots(&sub);
    let next = frames.last().expect("snapshot");
    assert_eq!(next.parameters.arc_voltage, 400.0);
    assert_eq!(next.current_power_w, 16_000_000.0);
}

#[test]
fn commands_apply_in_order_one_update_per_tick() {
    let (mut clock, channel, sub) = started(ClockSettings::default());
    clock.tick();
    let _ = snapshots(&sub);

    channel
        .update_parameters(ParameterPatch::single(ParamField::ArcVoltage, 500.0))
        .unwrap();
    channel
        .update_parameters_json(r#"{"arc_voltage": 600}"#)
        .unwrap();
    channel.add_material("lime", 100.0, "slag").unwrap();

    clock.tick();
    clock.tick();
    let frames = snapshots(&sub);

    assert_eq!(frames[0].parameters.arc_voltage, 500.0);
    assert!(!frames[0].materials_applied_kg.contains_key("lime"));
    assert_eq!(frames[1].parameters.arc_voltage, 600.0);
    assert_eq!(frames[1].materials_applied_kg["lime"], 100.0);
}

#[test]
fn command_budget_defers_the_rest() {
    let settings = ClockSettings {
        command_budget: 2,
        ..ClockSettings::default()
    };
    let (mut clock, channel, _sub) = started(settings);
    clock.tick();

    for _ in 0..3 {
        channel.add_material("lime", 10.0, "slag").unwrap();
    }
    clock.tick();
    assert_eq!(clock.backlog_len(), 1);
    clock.tick();
    assert_eq!(clock.backlog_len(), 0);
    let state = clock.state().expect("running");
    assert_eq!(state.ledger.applied_totals()["lime"], 30.0);
}

#[test]
fn pause_holds_the_tick_index() {
    let (mut clock, channel, sub) = started(ClockSettings::default());
    clock.tick();
    channel.pause().unwrap();
    assert_eq!(channel.status(), RunStatus::Paused);
    assert_eq!(clock.tick(), TickOutcome::Paused);
    assert_eq!(clock.tick(), TickOutcome::Paused);
    // Material may still be queued while paused.
    channel.add_material("lime", 5.0, "slag").unwrap();
    channel.resume().unwrap();
    assert_eq!(clock.tick(), TickOutcome::Advanced(2));

    let ticks: Vec<u64> = snapshots(&sub).iter().map(|s| s.tick).collect();
    assert_eq!(ticks, vec![1, 2]);
}

#[test]
fn stop_twice_is_one_transition() {
    let (mut clock, channel, sub) = started(ClockSettings::default());
    clock.tick();
    clock.tick();

    assert_eq!(channel.stop(), Ok(()));
    assert_eq!(channel.stop(), Err(ControlError::AlreadyStopped));
    assert_eq!(channel.stop_reason(), None);
    assert_eq!(clock.tick(), TickOutcome::Stopped);
    assert_eq!(channel.stop_reason(), Some(StopReason::Requested));
    assert_eq!(clock.tick(), TickOutcome::Stopped);
    assert_eq!(clock.status(), RunStatus::Stopped);

    let frames = snapshots(&sub);
    let last = frames.last().expect("final snapshot");
    assert_eq!(last.tick, 2);
    assert_eq!(last.status, RunStatus::Stopped);
    let termination = last.termination.as_ref().expect("terminal");
    assert_eq!(termination.reason, StopReason::Requested);
    assert_eq!(frames.iter().filter(|s| s.is_terminal()).count(), 1);
    // Tick 2 was already recorded when it committed.
    let history = clock.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history.range(2..=2).len(), 1);
    assert!(history.latest().is_some_and(|s| !s.is_terminal()));

    assert_eq!(sub.recv().unwrap_err(), ControlError::SubscriptionClosed);
    assert_eq!(
        channel.add_material("lime", 5.0, "slag"),
        Err(ControlError::Stopped)
    );
}

#[test]
fn numeric_fault_is_terminal() {
    let (mut clock, channel, sub) = started(ClockSettings::default());
    clock.tick();

    // Each value is in range on its own; their product overflows.
    channel
        .update_parameters_json(r#"{"arc_voltage": 1e300, "arc_current": 1e300}"#)
        .unwrap();
    assert_eq!(clock.tick(), TickOutcome::Stopped);

    let fault = clock.fault().expect("fault recorded");
    assert_eq!(fault.code(), "numeric_fault:arc_power");
    assert_eq!(fault.category(), ErrorCategory::Numeric);
    assert_eq!(channel.fault().map(|f| f.code()), Some(fault.code()));
    assert_eq!(channel.status(), RunStatus::Stopped);

    let frames = snapshots(&sub);
    let last = frames.last().expect("diagnostic snapshot");
    let termination = last.termination.as_ref().expect("terminal");
    assert_eq!(termination.reason, StopReason::Fault);
    assert_eq!(termination.error_code.as_deref(), Some("numeric_fault:arc_power"));
    // The diagnostic carries the last good state.
    assert_eq!(last.tick, 1);
    assert!(last.zones.liquid_metal.temperature_k.is_finite());
    assert_eq!(channel.stop_reason(), Some(StopReason::Fault));
    assert_eq!(clock.history().len(), 1);
    assert_eq!(clock.history().range(1..=1).len(), 1);

    assert_eq!(
        channel.update_parameters(ParameterPatch::single(ParamField::ArcVoltage, 400.0)),
        Err(ControlError::Stopped)
    );
    assert_eq!(channel.stop(), Err(ControlError::AlreadyStopped));
}

#[test]
fn run_completes_at_duration() {
    let (mut clock, channel) = SimulationClock::new(ClockSettings::default());
    let sub = clock.broadcaster().subscribe();
    channel
        .start(RunConfig {
            duration_s: 5.0,
            ..quiet_config()
        })
        .unwrap();

    let mut outcomes = Vec::new();
    for _ in 0..7 {
        outcomes.push(clock.tick());
    }
    assert_eq!(outcomes[3], TickOutcome::Advanced(4));
    assert_eq!(outcomes[4], TickOutcome::Stopped);
    assert_eq!(outcomes[6], TickOutcome::Stopped);
    assert_eq!(channel.stop_reason(), Some(StopReason::Completed));

    let frames = snapshots(&sub);
    let ticks: Vec<u64> = frames.iter().map(|s| s.tick).collect();
    assert_eq!(ticks, vec![1, 2, 3, 4, 5]);
    let terminal: Vec<u64> = frames.iter().filter(|s| s.is_terminal()).map(|s| s.tick).collect();
    assert_eq!(terminal, vec![5]);
    let last = frames.last().expect("final snapshot");
    assert_eq!(
        last.termination.as_ref().map(|t| t.reason),
        Some(StopReason::Completed)
    );
    assert_eq!(last.duration_s, 5.0);
    assert_eq!(last.frame().progress, 100.0);

    let history = clock.history();
    assert_eq!(history.len(), 5);
    assert_eq!(history.range(5..=5).len(), 1);
    assert!(history.latest().is_some_and(|s| s.is_terminal()));
}

#[test]
fn history_keeps_the_most_recent() {
    let settings = ClockSettings {
        history_capacity: 4,
        ..ClockSettings::default()
    };
    let (mut clock, _channel, _sub) = started(settings);
    for _ in 0..10 {
        clock.tick();
    }
    let history = clock.history();
    assert_eq!(history.len(), 4);
    assert_eq!(history.latest().map(|s| s.tick), Some(10));
    let ticks: Vec<u64> = history.last_n(2).iter().map(|s| s.tick).collect();
    assert_eq!(ticks, vec![9, 10]);
    assert_eq!(history.range(8..=9).len(), 2);
    assert_eq!(history.time_range(0.0, 6.5).len(), 0);
    assert_eq!(history.read(|ring| ring.total_appended()), 10);
}

#[test]
fn alerts_flag_without_faulting() {
    let (mut clock, channel) = SimulationClock::new(ClockSettings::default());
    let sub = clock.broadcaster().subscribe();
    let mut config = quiet_config();
    config.alerts.max_power_w = 10.0e6;
    channel.start(config).unwrap();

    assert_eq!(clock.tick(), TickOutcome::Advanced(1));
    let snap = snapshots(&sub).pop().expect("snapshot");
    assert!(snap.alert.has(eaf_furnace::AlertKind::OverPower));
    assert_eq!(snap.status, RunStatus::Running);
}
