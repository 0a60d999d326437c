use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use glam::Vec2;
use terrastream_common::ChunkCoord;
use terrastream_heightfield::{Shaping, TerrainParams, height01};
use terrastream_lod::{SnapMode, fix_ladder, is_legal_ladder, validate_resolution};
use terrastream_stream::{ChunkManager, StreamConfig, ThreadedBackend};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "terrastream-cli", about = "CLI tool for terrain streaming operations")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Snap {
    Up,
    Down,
}

impl From<Snap> for SnapMode {
    fn from(snap: Snap) -> Self {
        match snap {
            Snap::Up => SnapMode::Up,
            Snap::Down => SnapMode::Down,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and the default configuration
    Info,
    /// Load and validate a stream configuration file
    Validate {
        /// Path to a .json, .yaml or .yml config
        #[arg(short, long)]
        config: PathBuf,
        /// Print a corrected LOD section instead of failing
        #[arg(long)]
        fix: bool,
    },
    /// Check a resolution ladder and print its corrected form
    FixLadder {
        /// Finest resolution (2^n + 1)
        #[arg(short, long, default_value = "129")]
        base: u32,
        /// Comma-separated ladder, finest first
        #[arg(short, long, value_delimiter = ',', required = true)]
        ladder: Vec<u32>,
    },
    /// Snap a candidate resolution to the nearest legal 2^n + 1 value
    Resolution {
        #[arg(long)]
        value: u32,
        #[arg(long, default_value = "9")]
        min: u32,
        #[arg(long, default_value = "2049")]
        max: u32,
        #[arg(short, long, value_enum, default_value = "up")]
        snap: Snap,
    },
    /// Evaluate the height function at an absolute lattice cell
    Sample {
        #[arg(short, long, allow_negative_numbers = true)]
        x: i64,
        #[arg(short, long, allow_negative_numbers = true)]
        y: i64,
        /// Override the configured seed
        #[arg(short, long, allow_negative_numbers = true)]
        seed: Option<i32>,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Run the streaming loop with a moving observer
    Simulate {
        /// Number of updates to run
        #[arg(short, long, default_value = "120")]
        ticks: u64,
        /// Observer speed in local units per update
        #[arg(long, default_value = "40")]
        speed: f32,
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Teleport to absolute chunk "x,y" halfway through
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
        teleport: Option<Vec<i64>>,
        /// Generation worker threads
        #[arg(long, default_value = "4")]
        threads: usize,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<StreamConfig> {
    match path {
        Some(path) => StreamConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(StreamConfig::default()),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match cli.command {
        Commands::Info => {
            println!("terrastream-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("default configuration:");
            print!("{}", serde_yaml::to_string(&StreamConfig::default())?);
        }
        Commands::Validate { config, fix } => {
            let loaded = load_config(Some(&config))?;
            match loaded.validate() {
                Ok(()) => println!("{}: OK", config.display()),
                Err(e) if fix => {
                    println!("{}: {e}", config.display());
                    let fixed = StreamConfig {
                        lod: loaded.lod.fixed(),
                        ..loaded
                    };
                    fixed
                        .validate()
                        .context("configuration is still invalid after fixing the LOD ladder")?;
                    println!("corrected lod section:");
                    print!("{}", serde_yaml::to_string(&fixed.lod)?);
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("validating {}", config.display()));
                }
            }
        }
        Commands::FixLadder { base, ladder } => {
            match is_legal_ladder(base, &ladder) {
                Ok(()) => println!("ladder {ladder:?} is legal for base {base}"),
                Err(reason) => println!("ladder {ladder:?} is illegal: {reason}"),
            }
            let fixed = fix_ladder(base, &ladder);
            println!("fixed: {fixed:?}");
        }
        Commands::Resolution {
            value,
            min,
            max,
            snap,
        } => {
            println!("{}", validate_resolution(value, min, max, snap.into()));
        }
        Commands::Sample { x, y, seed, config } => {
            let config = load_config(config.as_ref())?;
            let terrain = TerrainParams {
                seed: seed.unwrap_or(config.terrain.seed),
                ..config.terrain
            };
            println!(
                "height01({x}, {y}, seed={}) = {}",
                terrain.seed,
                height01(x, y, terrain.seed, &terrain.noise)
            );
            if terrain.shaping != Shaping::Fbm || terrain.warp.is_some() {
                println!("shaped ({:?}) = {}", terrain.shaping, terrain.sample(x, y));
            }
        }
        Commands::Simulate {
            ticks,
            speed,
            config,
            teleport,
            threads,
        } => {
            let teleport = match teleport.as_deref() {
                None => None,
                Some([x, y]) => Some(ChunkCoord::new(*x, *y)),
                Some(other) => anyhow::bail!("--teleport expects x,y, got {other:?}"),
            };
            let config = load_config(config.as_ref())?;
            let backend = ThreadedBackend::new(threads)?;
            let mut manager = ChunkManager::new(config, backend)?;

            let mut observer = Vec2::ZERO;
            let velocity = Vec2::new(speed, speed * 0.5);
            for t in 0..ticks {
                if t == ticks / 2 {
                    if let Some(target) = teleport {
                        let report = manager.teleport(target, observer);
                        println!(
                            "tick {t}: teleported to {target}, retired={}, created={}",
                            report.retired, report.created
                        );
                    }
                }
                observer += velocity;
                let stats = manager.update(&mut observer);
                if let Some(by) = stats.shifted {
                    println!("tick {t}: origin shifted by {by}");
                }
                tracing::debug!(
                    tick = t,
                    observer = %stats.observer_chunk,
                    loaded = stats.loaded,
                    ready = stats.ready,
                    in_flight = stats.tick.in_flight,
                    "simulate step"
                );
                // Give workers a moment so results arrive between updates.
                std::thread::sleep(std::time::Duration::from_millis(2));
            }

            let stats = manager.stats();
            let timer = manager.timer();
            println!(
                "Simulated {ticks} updates: origin={}, observer chunk={}",
                manager.origin().origin(),
                stats.observer_chunk
            );
            println!(
                "Chunks: loaded={}, ready={}, pooled={}, in_flight={}, queued={}",
                stats.loaded, stats.ready, stats.pooled, stats.tick.in_flight, stats.tick.queued
            );
            println!(
                "Update time: avg={:?}, min={:?}, max={:?} over {} samples",
                timer.average(),
                timer.min(),
                timer.max(),
                timer.count()
            );
            println!("Allocated containers: {}", manager.factory().allocated());
        }
    }

    Ok(())
}
