use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use eaf_engine::{
    ClockSettings, CommandChannel, EngineResult, FurnaceEvent, FurnaceRuntime, RunConfig,
    StopReason,
};

#[derive(Parser)]
#[command(name = "eaf-cli")]
#[command(about = "ArcFlow CLI - Electric arc furnace simulation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a heat and stream snapshots as JSON lines
    Run {
        /// Run configuration YAML (defaults are used when omitted)
        config: Option<PathBuf>,
        /// Simulated seconds per wall-clock second
        #[arg(long, default_value_t = 60.0)]
        speedup: f64,
        /// Stop after this many ticks
        #[arg(long)]
        max_ticks: Option<u64>,
        /// Print every Nth snapshot
        #[arg(long, default_value_t = 1)]
        every: u64,
        /// Also print heartbeats
        #[arg(long)]
        heartbeats: bool,
        /// Inject material at a tick: MATERIAL:KG:ZONE@TICK
        #[arg(long = "inject")]
        injections: Vec<Scheduled>,
        /// Update parameters at a tick: JSON@TICK, e.g. '{"arc_voltage":450}@30'
        #[arg(long = "set")]
        updates: Vec<Scheduled>,
    },
    /// Print an example run configuration
    ExampleConfig {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a run configuration file
    ValidateConfig {
        /// Path to the run configuration YAML
        config: PathBuf,
    },
}

/// An argument applied once the stream reaches `at_tick`.
#[derive(Debug, Clone)]
struct Scheduled {
    payload: String,
    at_tick: u64,
}

impl FromStr for Scheduled {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (payload, tick) = s
            .rsplit_once('@')
            .ok_or_else(|| format!("expected VALUE@TICK, got '{s}'"))?;
        let at_tick = tick
            .trim()
            .parse()
            .map_err(|e| format!("invalid tick '{tick}': {e}"))?;
        Ok(Self {
            payload: payload.to_string(),
            at_tick,
        })
    }
}

enum Action {
    Inject(Scheduled),
    Update(Scheduled),
}

impl Action {
    fn at_tick(&self) -> u64 {
        match self {
            Action::Inject(s) | Action::Update(s) => s.at_tick,
        }
    }

    fn apply(&self, channel: &CommandChannel) {
        let result = match self {
            Action::Inject(s) => {
                let parts: Vec<&str> = s.payload.split(':').collect();
                match parts.as_slice() {
                    [material, kg, zone] => match kg.parse::<f64>() {
                        Ok(kg) => channel.add_material(material, kg, zone),
                        Err(_) => {
                            eprintln!("✗ inject '{}': amount is not a number", s.payload);
                            return;
                        }
                    },
                    _ => {
                        eprintln!("✗ inject '{}': expected MATERIAL:KG:ZONE", s.payload);
                        return;
                    }
                }
            }
            Action::Update(s) => channel.update_parameters_json(&s.payload),
        };
        match result {
            Ok(()) => tracing::info!(tick = self.at_tick(), "scheduled command accepted"),
            Err(e) => eprintln!("✗ rejected [{}]: {}", e.code(), e),
        }
    }
}

fn main() -> EngineResult<()> {
    // Initialize tracing
    tracing_subscriber::fmt().with_writer(io::stderr).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            speedup,
            max_ticks,
            every,
            heartbeats,
            injections,
            updates,
        } => {
            let mut actions: Vec<Action> = injections
                .into_iter()
                .map(Action::Inject)
                .chain(updates.into_iter().map(Action::Update))
                .collect();
            actions.sort_by_key(Action::at_tick);
            let settings = ClockSettings {
                speedup,
                ..ClockSettings::default()
            };
            cmd_run(
                config.as_deref(),
                settings,
                max_ticks,
                every.max(1),
                heartbeats,
                actions,
            )
        }
        Commands::ExampleConfig { output } => cmd_example_config(output.as_deref()),
        Commands::ValidateConfig { config } => cmd_validate_config(&config),
    }
}

fn cmd_run(
    config_path: Option<&Path>,
    settings: ClockSettings,
    max_ticks: Option<u64>,
    every: u64,
    heartbeats: bool,
    mut actions: Vec<Action>,
) -> EngineResult<()> {
    let config = match config_path {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };

    let runtime = FurnaceRuntime::spawn(settings)?;
    let channel = runtime.channel().clone();
    let subscription = runtime.subscribe();
    channel.start(config)?;
    eprintln!("Run {} started", runtime.run_id());

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut stop_sent = false;
    actions.reverse();

    for event in subscription.iter() {
        match &event {
            FurnaceEvent::Snapshot(snapshot) => {
                while actions
                    .last()
                    .is_some_and(|action| action.at_tick() <= snapshot.tick)
                {
                    if let Some(action) = actions.pop() {
                        action.apply(&channel);
                    }
                }
                if snapshot.tick % every == 0 || snapshot.is_terminal() {
                    serde_json::to_writer(&mut out, &event.wire())?;
                    writeln!(out)?;
                }
                if !stop_sent && max_ticks.is_some_and(|max| snapshot.tick >= max) {
                    stop_sent = true;
                    if let Err(e) = channel.stop() {
                        tracing::debug!(code = %e.code(), "stop not needed");
                    }
                }
            }
            FurnaceEvent::Heartbeat(_) if heartbeats => {
                serde_json::to_writer(&mut out, &event.wire())?;
                writeln!(out)?;
            }
            FurnaceEvent::Heartbeat(_) => {}
        }
    }
    out.flush()?;

    let missed = subscription.missed_frames();
    let report = runtime.shutdown()?;
    match &report.termination {
        Some(t) if t.reason == StopReason::Fault => {
            eprintln!(
                "✗ Run {} faulted at tick {}: {}",
                report.run_id,
                report.final_tick,
                t.message.as_deref().unwrap_or("unknown fault")
            );
        }
        Some(t) => eprintln!(
            "✓ Run {} ended at tick {} ({:?})",
            report.run_id, report.final_tick, t.reason
        ),
        None => eprintln!("✓ Run {} ended at tick {}", report.run_id, report.final_tick),
    }
    if missed > 0 {
        eprintln!("  {missed} frames dropped (output too slow)");
    }
    Ok(())
}

fn cmd_example_config(output: Option<&Path>) -> EngineResult<()> {
    let yaml = RunConfig::example().to_yaml_string()?;
    match output {
        Some(path) => {
            std::fs::write(path, yaml)?;
            eprintln!("✓ Wrote {}", path.display());
        }
        None => print!("{yaml}"),
    }
    Ok(())
}

fn cmd_validate_config(path: &Path) -> EngineResult<()> {
    println!("Validating config: {}", path.display());
    let config = RunConfig::load(path)?;
    println!("✓ Config is valid");
    println!(
        "  {} t, {} s at Δt = {} s ({} ticks), {} initial charge(s)",
        config.furnace_capacity_t,
        config.duration_s,
        config.time_step_s,
        config.total_ticks(),
        config.initial_materials.len()
    );
    let power = config.parameters.arc_power_w();
    println!("  arc power {:.2} MW", power / 1.0e6);
    if power > config.model.max_power_w {
        println!(
            "  ! requested power exceeds the {:.2} MW supply limit",
            config.model.max_power_w / 1.0e6
        );
    }
    Ok(())
}
