//! CLI for exercising the flight recorder against a small demo simulation.
//!
//! Provides commands for:
//! - Capturing a recording of a tick-driven demo simulation
//! - Replaying a recording frame by frame
//! - Seeking a recording to an arbitrary tick

mod demo;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ecs_core::config::EcsConfig;
use ecs_core::repository::EntityRepository;
use ecs_recorder::controller::PlaybackController;
use ecs_recorder::reader::RecordingReader;
use ecs_recorder::writer::AsyncRecorder;
use ecs_recorder::{FrameType, TypedBinding};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the demo simulation, recording a keyframe then deltas to `out`.
    Record {
        /// Output recording path.
        #[arg(short, long)]
        out: PathBuf,

        /// Number of simulation ticks to capture.
        #[arg(short, long, default_value_t = 100)]
        ticks: u32,

        /// Number of entities in the demo simulation.
        #[arg(short, long, default_value_t = 1_000)]
        entities: u32,

        /// Emit a keyframe every N ticks instead of only at the start.
        #[arg(short, long, default_value_t = 0)]
        keyframe_interval: u32,
    },

    /// Replay a recording frame by frame, printing tick and a sample entity.
    Replay {
        #[arg(short, long)]
        path: PathBuf,
    },

    /// Seek a recording to a specific tick and print the resulting state.
    Seek {
        #[arg(short, long)]
        path: PathBuf,

        #[arg(short, long)]
        tick: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Record {
            out,
            ticks,
            entities,
            keyframe_interval,
        } => run_record(&out, ticks, entities, keyframe_interval),
        Commands::Replay { path } => run_replay(&path),
        Commands::Seek { path, tick } => run_seek(&path, tick),
    }
}

fn run_record(out: &PathBuf, ticks: u32, entities: u32, keyframe_interval: u32) -> Result<()> {
    let config = EcsConfig::default();
    let (mut repo, mut time_system) = demo::build_demo_repo(&config, entities)?;
    let position_binding = TypedBinding::<demo::Position>::new(&repo)?;
    let velocity_binding = TypedBinding::<demo::Velocity>::new(&repo)?;
    let unmanaged: Vec<Box<dyn ecs_recorder::UnmanagedBinding>> =
        vec![Box::new(position_binding), Box::new(velocity_binding)];
    let bindings = ecs_recorder::Bindings {
        unmanaged: &unmanaged,
        managed: &[],
    };

    let mut recorder = AsyncRecorder::create(out, &config).context("opening recording file")?;
    recorder.capture_keyframe(&repo, &bindings, true)?;

    for tick in 1..=ticks {
        repo.tick();
        demo::advance(&mut repo, &mut time_system);
        if keyframe_interval > 0 && tick % keyframe_interval == 0 {
            recorder.capture_keyframe(&repo, &bindings, true)?;
        } else {
            recorder.capture_frame(&repo, &bindings, true)?;
        }
    }

    recorder.dispose().context("closing recording file")?;
    tracing::info!(ticks, entities, path = %out.display(), "recording complete");
    Ok(())
}

fn run_replay(path: &PathBuf) -> Result<()> {
    let mut reader = RecordingReader::open(path).context("opening recording file")?;
    let mut frame_count = 0u64;
    while let Some(frame) = reader.next_frame()? {
        let kind = match frame.frame_type {
            FrameType::Keyframe => "keyframe",
            FrameType::Delta => "delta",
        };
        println!(
            "frame {frame_count}: {kind} tick={} base_tick={} payload_bytes={}",
            frame.tick,
            frame.base_tick,
            frame.payload.len()
        );
        frame_count += 1;
    }
    println!("read {frame_count} frames");
    Ok(())
}

fn run_seek(path: &PathBuf, tick: u64) -> Result<()> {
    let config = EcsConfig::default();
    let mut repo = EntityRepository::new(config.clone())?;
    repo.register_component::<demo::Position>("Position", None)?;
    repo.register_component::<demo::Velocity>("Velocity", None)?;
    repo.set_phase("NetworkReceive")?;
    repo.set_phase("Simulation")?;

    let position_binding = TypedBinding::<demo::Position>::new(&repo)?;
    let velocity_binding = TypedBinding::<demo::Velocity>::new(&repo)?;
    let unmanaged: Vec<Box<dyn ecs_recorder::UnmanagedBinding>> =
        vec![Box::new(position_binding), Box::new(velocity_binding)];
    let bindings = ecs_recorder::Bindings {
        unmanaged: &unmanaged,
        managed: &[],
    };

    let controller = PlaybackController::open(path).context("indexing recording file")?;
    controller.seek_to_tick(&mut repo, &bindings, tick)?;

    let sample = ecs_core::Entity::new(0, repo.entity_generation(0)?);
    match repo.get_ro::<demo::Position>(sample) {
        Ok(position) => println!(
            "seeked to tick {tick}: global_version={}, entity 0 position=({}, {})",
            repo.global_version(),
            position.x,
            position.y
        ),
        Err(_) => println!(
            "seeked to tick {tick}: global_version={}, entity 0 has no Position",
            repo.global_version()
        ),
    }
    Ok(())
}
