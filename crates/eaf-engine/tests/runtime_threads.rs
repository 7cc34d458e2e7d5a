//! Integration test: the threaded runtime in wall-clock time.
//!
//! Checks that demonstrate:
//! - Heartbeats flow while the clock is idle
//! - A subscriber that never drains loses frames without slowing the clock
//! - Stop ends the stream after a terminal snapshot and both threads join
//! - reset() is the way forward after a fault

use std::time::Duration;

use eaf_engine::{
    ClockSettings, ControlError, FurnaceEvent, FurnaceRuntime, RunConfig, RunStatus, StopReason,
};
use eaf_furnace::OperatingParameters;

const WAIT: Duration = Duration::from_secs(5);

fn quiet_config() -> RunConfig {
    RunConfig {
        parameters: OperatingParameters {
            oxygen_flow_rate: 0.0,
            carbon_injection_rate: 0.0,
            lime_addition_rate: 0.0,
            dolomite_addition_rate: 0.0,
            ..Default::default()
        },
        ..RunConfig::default()
    }
}

fn fast_settings() -> ClockSettings {
    ClockSettings {
        // 1 s steps every 20 ms.
        speedup: 50.0,
        subscriber_queue: 4,
        heartbeat_interval_ms: 10,
        idle_poll_ms: 5,
        ..ClockSettings::default()
    }
}

#[test]
fn heartbeats_while_idle() {
    let runtime = FurnaceRuntime::spawn(fast_settings()).expect("spawn");
    let sub = runtime.subscribe();

    let event = sub.recv_timeout(WAIT).expect("open").expect("heartbeat");
    match event {
        FurnaceEvent::Heartbeat(beat) => {
            assert_eq!(beat.status, RunStatus::Idle);
            assert_eq!(beat.tick, 0);
            assert_eq!(beat.run_id, runtime.run_id());
        }
        FurnaceEvent::Snapshot(_) => panic!("no snapshots before start"),
    }

    let report = runtime.shutdown().expect("shutdown");
    assert!(report.heartbeats_sent >= 1);
    assert_eq!(report.final_tick, 0);
}

#[test]
fn lagging_subscriber_does_not_slow_the_clock() {
    let settings = ClockSettings {
        heartbeat_interval_ms: 1000,
        ..fast_settings()
    };
    let runtime = FurnaceRuntime::spawn(settings).expect("spawn");
    let lagging = runtime.subscribe();
    runtime.channel().start(quiet_config()).expect("start");

    let mut last_missed = 0;
    for _ in 0..15 {
        std::thread::sleep(Duration::from_millis(40));
        let missed = lagging.missed_frames();
        assert!(missed >= last_missed);
        last_missed = missed;
    }
    assert!(last_missed > 0, "subscriber never overflowed");
    assert!(lagging.pending() <= 4);

    let history = runtime.history().last_n(20);
    assert!(history.len() >= 10, "only {} ticks", history.len());
    let offsets: Vec<f64> = history.iter().map(|s| s.wall_offset_s).collect();
    let gaps: Vec<f64> = offsets.windows(2).map(|w| w[1] - w[0]).collect();
    let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
    assert!(
        (0.015..0.045).contains(&mean),
        "mean tick spacing {mean:.4} s"
    );

    runtime.shutdown().expect("shutdown");
}

#[test]
fn stop_flushes_final_snapshot_and_closes() {
    let runtime = FurnaceRuntime::spawn(fast_settings()).expect("spawn");
    let channel = runtime.channel().clone();
    let sub = runtime.subscribe();
    channel.start(quiet_config()).expect("start");

    // Wait for a few ticks.
    while channel.tick() < 3 {
        std::thread::sleep(Duration::from_millis(5));
    }
    channel.stop().expect("stop");
    assert_eq!(channel.stop(), Err(ControlError::AlreadyStopped));
    assert!(runtime.wait_until_stopped(WAIT));

    let mut last_snapshot = None;
    loop {
        match sub.recv_timeout(WAIT) {
            Ok(Some(FurnaceEvent::Snapshot(snap))) => last_snapshot = Some(snap),
            Ok(Some(FurnaceEvent::Heartbeat(_))) => {}
            Ok(None) => panic!("stream did not end"),
            Err(e) => {
                assert_eq!(e, ControlError::SubscriptionClosed);
                break;
            }
        }
    }
    let last = last_snapshot.expect("final snapshot");
    assert_eq!(
        last.termination.as_ref().map(|t| t.reason),
        Some(StopReason::Requested)
    );

    let report = runtime.shutdown().expect("shutdown");
    assert!(report.final_tick >= 3);
    assert!(report.fault.is_none());
}

#[test]
fn reset_after_fault_starts_fresh() {
    let mut runtime = FurnaceRuntime::spawn(fast_settings()).expect("spawn");
    runtime.channel().start(quiet_config()).expect("start");
    runtime
        .channel()
        .update_parameters_json(r#"{"arc_voltage": 1e300, "arc_current": 1e300}"#)
        .expect("in range");
    assert!(runtime.wait_until_stopped(WAIT));
    assert_eq!(
        runtime.channel().add_material("lime", 1.0, "slag"),
        Err(ControlError::Stopped)
    );

    let old_run = runtime.run_id();
    let report = runtime.reset().expect("reset");
    assert_eq!(report.run_id, old_run);
    assert_eq!(
        report.fault.as_ref().map(ControlError::code).as_deref(),
        Some("numeric_fault:arc_power")
    );

    assert_ne!(runtime.run_id(), old_run);
    assert_eq!(runtime.status(), RunStatus::Idle);
    runtime.channel().start(quiet_config()).expect("fresh start");
    runtime.shutdown().expect("shutdown");
}
