//! feedbacks: play composite feedbacks from YAML and inspect sequences.
//!
//! Usage:
//!   feedbacks run door.yaml              - play once and print the trace
//!   feedbacks run door.yaml --json       - same, as JSON lines
//!   feedbacks quantize door.yaml --sequence knock --bpm 120

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use feedbacks::composite::NotificationKind;
use feedbacks::config::{BuildContext, CompositeConfig, Settings};
use feedbacks::effects::PlayRecord;
use feedbacks::sequence::QuantizedSequence;
use feedbacks::{Owner, Vec3};

#[derive(Parser)]
#[command(name = "feedbacks", version, about = "Tick-driven feedback sequencing")]
struct Cli {
    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a composite and print what happened
    Run {
        config: PathBuf,
        /// Emit JSON lines instead of text
        #[arg(long)]
        json: bool,
        /// Sleep between ticks so the run takes wall-clock time
        #[arg(long)]
        realtime: bool,
        /// Play in reverse
        #[arg(long)]
        reverse: bool,
        #[arg(long, default_value_t = 1.0)]
        intensity: f64,
        /// Play position as x,y,z
        #[arg(long, value_delimiter = ',', num_args = 3)]
        position: Option<Vec<f64>>,
        /// Seconds per tick (defaults to the settings tick rate)
        #[arg(long)]
        tick: Option<f64>,
        /// Give up after this many seconds of feedback time
        #[arg(long, default_value_t = 30.0)]
        duration: f64,
        /// Seed for chance rolls
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print a sequence quantized at a tempo
    Quantize {
        config: PathBuf,
        #[arg(long)]
        sequence: String,
        #[arg(long, default_value_t = 120.0)]
        bpm: f64,
        #[arg(long)]
        json: bool,
    },
}

/// One line of a run trace.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TraceLine {
    Notification {
        kind: NotificationKind,
        label: String,
        time: f64,
    },
    Effect(PlayRecord),
}

impl TraceLine {
    fn time(&self) -> f64 {
        match self {
            TraceLine::Notification { time, .. } => *time,
            TraceLine::Effect(record) => record.time,
        }
    }

    fn print(&self, json: bool) -> Result<()> {
        if json {
            println!("{}", serde_json::to_string(self)?);
            return Ok(());
        }
        match self {
            TraceLine::Notification { kind, label, time } => {
                println!("{time:>8.3}  {label}: {kind:?}")
            }
            TraceLine::Effect(r) => println!(
                "{:>8.3}    {} #{} intensity {:.2} {:?}",
                r.time, r.effect, r.iteration, r.intensity, r.direction
            ),
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load();
    let level = if cli.verbose {
        "debug"
    } else {
        settings.log_level.as_str()
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Run {
            config,
            json,
            realtime,
            reverse,
            intensity,
            position,
            tick,
            duration,
            seed,
        } => {
            let position = match position.as_deref() {
                Some([x, y, z]) => Vec3::new(*x, *y, *z),
                Some(_) => bail!("--position takes exactly three values"),
                None => Vec3::ZERO,
            };
            let options = RunOptions {
                json,
                realtime,
                reverse,
                intensity,
                position,
                tick: tick.unwrap_or_else(|| settings.tick()),
                duration,
                seed: seed.or(settings.seed),
            };
            run(&config, &options)
        }
        Commands::Quantize {
            config,
            sequence,
            bpm,
            json,
        } => quantize(&config, &sequence, bpm, json),
    }
}

struct RunOptions {
    json: bool,
    realtime: bool,
    reverse: bool,
    intensity: f64,
    position: Vec3,
    tick: f64,
    duration: f64,
    seed: Option<u64>,
}

fn run(path: &Path, options: &RunOptions) -> Result<()> {
    if !(options.tick.is_finite() && options.tick > 0.0) {
        bail!("tick must be a positive number of seconds");
    }
    let mut config = CompositeConfig::load(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    if config.settings.seed.is_none() {
        config.settings.seed = options.seed;
    }

    let cx = BuildContext::default();
    let mut composite = config.build_with(&cx);
    composite.initialize(&Owner::new(0, "cli"));

    let pending: Rc<RefCell<Vec<TraceLine>>> = Rc::default();
    let sink = pending.clone();
    composite.subscribe(move |n| {
        sink.borrow_mut().push(TraceLine::Notification {
            kind: n.kind,
            label: n.label.to_string(),
            time: n.time,
        })
    });

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = running.clone();
    ctrlc::set_handler(move || handler_flag.store(false, Ordering::SeqCst))
        .context("failed to install Ctrl-C handler")?;

    let played = if options.reverse {
        composite.play_in_reverse(options.position, options.intensity)
    } else {
        composite.play(options.position, options.intensity)
    };
    if !played {
        log::warn!("'{}' refused to play", composite.label());
    }

    let flush = |pending: &Rc<RefCell<Vec<TraceLine>>>| -> Result<()> {
        let mut lines = std::mem::take(&mut *pending.borrow_mut());
        lines.extend(cx.tap.take().into_iter().map(TraceLine::Effect));
        lines.sort_by(|a, b| a.time().total_cmp(&b.time()));
        for line in &lines {
            line.print(options.json)?;
        }
        Ok(())
    };

    flush(&pending)?;
    let mut elapsed = 0.0;
    while composite.is_playing() && elapsed < options.duration {
        if !running.load(Ordering::SeqCst) {
            composite.stop(options.position, options.intensity);
            eprintln!("interrupted at {:.3}", composite.now());
            break;
        }
        composite.tick(options.tick);
        elapsed += options.tick;
        flush(&pending)?;
        if options.realtime {
            thread::sleep(Duration::from_secs_f64(options.tick));
        }
    }
    if composite.is_playing() {
        log::info!("still playing after {:.3}s, stopping", elapsed);
        composite.stop(options.position, options.intensity);
    }
    flush(&pending)
}

fn quantize(path: &Path, name: &str, bpm: f64, json: bool) -> Result<()> {
    let config = CompositeConfig::load(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    let Some(sequence) = config.sequence(name) else {
        bail!("no sequence named '{name}' in {}", path.display());
    };
    let grid = sequence.quantize(bpm);
    if json {
        println!("{}", serde_json::to_string_pretty(&grid)?);
    } else {
        print_grid(&grid);
    }
    Ok(())
}

fn print_grid(grid: &QuantizedSequence) {
    println!(
        "{}: {} beats of {:.3}s at {} BPM ({:.3}s)",
        grid.name,
        grid.beat_count(),
        grid.beat_duration,
        grid.bpm,
        grid.length
    );
    for track in &grid.tracks {
        let row: String = track
            .slots
            .iter()
            .map(|slot| if slot.track_id.is_some() { 'x' } else { '.' })
            .collect();
        println!("  track {:>3}  {row}", track.track_id.0);
    }
}
