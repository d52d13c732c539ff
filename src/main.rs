//! vocalis - record and score a performance from the default microphone.
//!
//! Commands:
//! - record: count in, record a track, score it and queue the result
//! - calibrate: measure the input latency and store it in settings
//! - status: show queued results and the local best score

use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;

use vocalis_lib::calibration::calibrate_latency;
use vocalis_lib::pitch::{MicrophoneInput, PitchExtractor};
use vocalis_lib::session::SessionNotice;
use vocalis_lib::sync::MemoryRemoteStore;
use vocalis_lib::telemetry::TelemetryEvent;
use vocalis_lib::{
    data_dir_from_env, init_logging, Engine, SessionConfig, SessionState, TokioScheduler,
    TrackMetadata,
};

#[derive(Parser)]
#[command(name = "vocalis")]
#[command(version)]
#[command(about = "Record, score and queue vocal performances", long_about = None)]
struct Cli {
    /// Directory holding the local store and settings
    #[arg(long, env = "VOCALIS_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record one session against a track description (JSON)
    Record {
        #[arg(short, long)]
        track: PathBuf,

        /// Sing against a ghost opponent
        #[arg(long)]
        duel: bool,
    },

    /// Measure input latency: clap once when prompted
    Calibrate {
        #[arg(long, default_value = "5")]
        timeout_secs: u64,
    },

    /// Show queued results for the configured user
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();
    let data_dir = cli.data_dir.unwrap_or_else(data_dir_from_env);

    // No backend is configured for the command line: results stay queued
    // locally until an embedding application syncs them.
    let engine = match Engine::open(&data_dir, Arc::new(MemoryRemoteStore::new())) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("Failed to open {}: {err:#}", data_dir.display());
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Record { track, duel } => record(&engine, track, duel).await,
        Commands::Calibrate { timeout_secs } => calibrate(&engine, timeout_secs).await,
        Commands::Status => status(&engine).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn microphone(engine: &Engine) -> MicrophoneInput {
    MicrophoneInput::new(PitchExtractor {
        noise_floor: engine.settings.noise_floor(),
        ..PitchExtractor::default()
    })
}

async fn record(engine: &Engine, track_path: PathBuf, duel: bool) -> anyhow::Result<()> {
    let contents = fs::read_to_string(&track_path)?;
    let track: TrackMetadata = serde_json::from_str(&contents)?;

    let orchestrator = engine.orchestrator(Arc::new(microphone(engine)), Arc::new(TokioScheduler));
    let mut states = orchestrator.subscribe_states();
    let mut notices = orchestrator.subscribe_notices();

    let mut config = SessionConfig::new(track, engine.settings.latency_offset_ms());
    if duel {
        config = config.with_duel(None);
    }
    orchestrator.start(config).await?;

    let mut interrupted = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                if matches!(orchestrator.state().await, SessionState::Recording { .. }) {
                    orchestrator.stop().await?;
                } else {
                    orchestrator.cancel().await?;
                }
            }
            state = states.recv() => match state {
                Ok(SessionState::CountingDown(n)) => println!("{n}..."),
                Ok(SessionState::Recording { elapsed }) if elapsed == 0.0 => println!("Sing!"),
                Ok(SessionState::Completed { summary }) => {
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                }
                Ok(SessionState::Cancelled) => {
                    println!("Session cancelled");
                    return Ok(());
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return Ok(()),
            },
            notice = notices.recv() => match notice {
                Ok(SessionNotice::Telemetry { event: TelemetryEvent::AchievementUnlocked(name) }) => {
                    println!("Achievement unlocked: {name}");
                }
                Ok(SessionNotice::DuelFinished { outcome }) => {
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                }
                Ok(SessionNotice::Persisted { outcome }) => {
                    println!("Result stored ({})", outcome.log_id());
                    return Ok(());
                }
                Ok(SessionNotice::PersistRejected { reason }) => {
                    println!("Result not stored: {reason}");
                    return Ok(());
                }
                Ok(SessionNotice::CaptureFailed { reason }) => {
                    anyhow::bail!("capture failed: {reason}");
                }
                Ok(SessionNotice::Telemetry { .. }) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}

async fn calibrate(engine: &Engine, timeout_secs: u64) -> anyhow::Result<()> {
    println!("Clap once, now.");
    let input = microphone(engine);
    let result = calibrate_latency(&input, &engine.settings, Duration::from_secs(timeout_secs)).await?;
    if result.measured {
        println!("Latency offset set to {}ms", result.latency_offset_ms);
    } else {
        println!("Nothing heard; keeping {}ms", result.latency_offset_ms);
    }
    Ok(())
}

async fn status(engine: &Engine) -> anyhow::Result<()> {
    let user_id = engine.settings.user_id();
    let queued = engine.db.list_unsynced_logs(&user_id).await?;
    let best = engine
        .db
        .get_user_profile(&user_id)
        .await?
        .map(|profile| profile.best_score)
        .unwrap_or(0.0);

    println!("User {user_id}: best {best:.1}, {} result(s) queued", queued.len());
    for log in queued {
        println!(
            "  {} {} accuracy {:.1} ({}s)",
            log.timestamp.to_rfc3339(),
            log.song_id,
            log.pitch_accuracy,
            log.duration_seconds
        );
    }
    Ok(())
}
