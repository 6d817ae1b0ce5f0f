mod script;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use wellmind_core::{
    FrameSink, LevelDefinition, LevelState, PlanStep, PlanStepKind, StartState, WellConfig,
    WellWorld, WinDefinition, WorldSnapshot,
};

use crate::script::{Script, ScriptEvent};

#[derive(Parser, Debug)]
#[command(
    name = "wellmind",
    version,
    about = "Run a wellmind level headlessly and print the final snapshot"
)]
struct Cli {
    /// Level definition JSON; the built-in demo level is used when omitted.
    #[arg(long, env = "WELLMIND_LEVEL")]
    level: Option<PathBuf>,

    /// Configuration overrides JSON (missing fields keep their defaults).
    #[arg(long, env = "WELLMIND_CONFIG")]
    config: Option<PathBuf>,

    /// Timed input script (JSON list of events).
    #[arg(long)]
    script: Option<PathBuf>,

    /// Simulated seconds to run.
    #[arg(long, default_value_t = 30.0)]
    seconds: f64,

    /// Frame delta in seconds.
    #[arg(long, default_value_t = 0.05)]
    dt: f64,

    /// RNG seed for the level start state.
    #[arg(long, env = "WELLMIND_SEED")]
    seed: Option<u64>,

    /// Write the session save blob here when the run finishes.
    #[arg(long)]
    save: Option<PathBuf>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    anyhow::ensure!(
        cli.dt.is_finite() && cli.dt > 0.0,
        "--dt must be a positive number"
    );
    anyhow::ensure!(
        cli.seconds.is_finite() && cli.seconds >= 0.0,
        "--seconds must be a non-negative number"
    );

    let mut config = match &cli.config {
        Some(path) => read_json::<WellConfig>(path, "config")?,
        None => WellConfig::default(),
    };
    if cli.seed.is_some() {
        config.rng_seed = cli.seed;
    }
    let level = match &cli.level {
        Some(path) => read_json::<LevelDefinition>(path, "level")?,
        None => demo_level(),
    };
    let mut script = match &cli.script {
        Some(path) => Script::load(path)?,
        None => Script::default(),
    };

    let mut world = WellWorld::new(config, level).context("failed to build world")?;
    world.set_frame_sink(Box::new(ProgressSink::new(1.0)));
    info!(
        level = world.level().id,
        win = world.level().win.kind_name(),
        seconds = cli.seconds,
        "Starting wellmind run"
    );

    let snapshot = run(&mut world, &mut script, cli.seconds, cli.dt);
    if script.remaining() > 0 {
        warn!(
            remaining = script.remaining(),
            "run finished before every scripted event fired"
        );
    }

    for line in world.run_log() {
        info!(entry = %line, "run log");
    }
    if let Some(path) = &cli.save {
        let blob = serde_json::to_string_pretty(&world.save()).context("failed to encode save")?;
        fs::write(path, blob).with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), "session saved");
    }

    let json = serde_json::to_string_pretty(&snapshot).context("failed to encode snapshot")?;
    println!("{json}");
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {what} {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {what} {}", path.display()))
}

/// Drive frames until `seconds` elapse or the level ends.
fn run(world: &mut WellWorld, script: &mut Script, seconds: f64, dt: f64) -> WorldSnapshot {
    fire_due(world, script);
    while world.sim_time() < seconds && world.level_state() == LevelState::Playing {
        world.frame(dt);
        while let Some(popup) = world.take_popup() {
            info!(key = %popup.key, "{}", popup.lines.join(" | "));
        }
        fire_due(world, script);
    }
    let snapshot = world.snapshot();
    info!(
        tick = snapshot.tick.0,
        sim_time = snapshot.sim_time,
        level_state = ?snapshot.level_state,
        breaks = world.breaks().total(),
        "Run complete"
    );
    snapshot
}

fn fire_due(world: &mut WellWorld, script: &mut Script) {
    for event in script.due(world.sim_time()) {
        match event {
            ScriptEvent::Command { command } => {
                let name = command.name();
                match world.dispatch(command) {
                    Ok(receipt) => debug!(action = name, charged = receipt.charged, "command applied"),
                    Err(err) => info!(action = name, reason = err.reason(), "command refused"),
                }
            }
            ScriptEvent::Named { name, args } => {
                let response = world.dispatch_named(&name, &args);
                debug!(action = %name, ok = response.ok, reason = ?response.reason, "named command");
            }
            ScriptEvent::Jam { cause, index } => {
                let outcome = world.trigger_jam(cause, index);
                debug!(cause = cause.code(), index, ?outcome, "jam reported");
            }
            ScriptEvent::EndSession => {
                world.end_session();
            }
        }
    }
}

/// Logs a one-line summary every `interval` simulated seconds.
struct ProgressSink {
    interval: f64,
    next_at: f64,
}

impl ProgressSink {
    fn new(interval: f64) -> Self {
        Self {
            interval,
            next_at: 0.0,
        }
    }
}

impl FrameSink for ProgressSink {
    fn on_frame(&mut self, snapshot: &WorldSnapshot) {
        if snapshot.sim_time + 1e-9 < self.next_at {
            return;
        }
        self.next_at = snapshot.sim_time + self.interval;
        let done = snapshot
            .objectives
            .iter()
            .filter(|objective| objective.complete)
            .count();
        info!(
            tick = snapshot.tick.0,
            energy = snapshot.energy,
            psyche = ?snapshot.psyche,
            objectives_done = done,
            objectives_total = snapshot.objectives.len(),
            level_state = ?snapshot.level_state,
            "frame"
        );
    }
}

fn demo_level() -> LevelDefinition {
    LevelDefinition {
        id: 1,
        name: Some("Settle the wheel".into()),
        start: StartState::default(),
        energy: None,
        dispositions: Vec::new(),
        win: WinDefinition::PlanChain {
            steps: vec![
                PlanStep {
                    kind: PlanStepKind::SpinZero,
                    hold_sec: None,
                    text: Some("Still every well".into()),
                },
                PlanStep {
                    kind: PlanStepKind::AllBand {
                        low: 100.0,
                        high: 400.0,
                    },
                    hold_sec: Some(5.0),
                    text: None,
                },
            ],
        },
    }
}
