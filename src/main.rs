use beat_boxer::chart::{self, ChartSource};
use beat_boxer::config::GameConfig;
use beat_boxer::console_display;
use beat_boxer::coordinator;
use beat_boxer::judge::JudgmentMode;
use beat_boxer::note::TargetGeometry;
use beat_boxer::session::{PlaySession, SessionCommand, TickReport};
use beat_boxer::session_log;
use beat_boxer::simulator;
use beat_boxer::telemetry::Telemetry;
use beat_boxer::types::*;

use clap::Parser;
use crossbeam_channel::bounded;
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

#[derive(Parser)]
#[command(name = "beat-boxer")]
#[command(about = "Rhythm judgment engine for a motion-controlled boxing game")]
struct Cli {
    /// Game configuration (JSON). Missing or invalid files fall back to defaults.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Chart: a song directory, a grid chart (.txt) or a row chart (.json)
    #[arg(long, default_value = "songs/demo")]
    chart: PathBuf,

    /// Difficulty level name (defaults to the configured default level)
    #[arg(long)]
    level: Option<String>,

    /// Record every matching decision (debug log)
    #[arg(long)]
    diagnostic: bool,

    /// Skip calibration and go straight to the countdown
    #[arg(long)]
    skip_calibration: bool,

    /// Judgment tick rate (Hz)
    #[arg(long, default_value_t = 60.0)]
    tick_hz: f64,

    /// Simulated sensor rate (Hz)
    #[arg(long, default_value_t = 30)]
    sensor_hz: u32,

    /// Constant lateness of the simulated player (ms, negative = early)
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    timing_error_ms: f64,

    /// Write judgments and diagnostic records to JSONL
    #[arg(long)]
    log_data: bool,

    /// Output directory for logged sessions
    #[arg(long, default_value = "./sessions")]
    output_dir: PathBuf,

    /// Enable console display (terminal HUD)
    #[arg(long)]
    console: bool,

    /// Console display refresh rate (Hz)
    #[arg(long, default_value_t = 10)]
    display_hz: u32,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let config = GameConfig::load_or_default(&cli.config);
    let settings = config.settings(cli.level.as_deref());
    let song = config.difficulty.song_info;
    let events = chart::load_or_empty(&ChartSource::from_path(&cli.chart, song));
    let clock = SessionClock::new();
    let telemetry = Telemetry::new(cli.chart.display().to_string());
    let mode = if cli.diagnostic {
        JudgmentMode::Diagnostic
    } else {
        JudgmentMode::Normal
    };

    info!("═══════════════════════════════════════════════");
    info!("  BEAT BOXER v{}", env!("CARGO_PKG_VERSION"));
    info!("  Chart: {} ({} notes)", cli.chart.display(), events.len());
    info!(
        "  Level: {}  windows {:.3}/{:.3}/{:.3}s  lead {:.2}s",
        cli.level.as_deref().unwrap_or(&config.difficulty.default),
        settings.thresholds.perfect,
        settings.thresholds.great,
        settings.thresholds.good,
        settings.lead_time
    );
    info!("  Mode: {:?}", mode);
    if cli.console {
        info!("  UI: Console HUD");
    }
    if cli.log_data {
        info!("  Logging to: {:?}", cli.output_dir);
    }
    info!("═══════════════════════════════════════════════");

    // Channel: simulator + operator → coordinator
    let (input_tx, input_rx) = bounded::<InputEvent>(1024);

    // Channels: coordinator → consumers
    let mut report_txs: Vec<crossbeam_channel::Sender<TickReport>> = Vec::new();
    let mut handles = Vec::new();

    // ─── Console display (opt-in) ───────────────────────────────────
    if cli.console {
        let (tx, rx) = bounded::<TickReport>(256);
        report_txs.push(tx);
        let (tick_hz, display_hz) = (cli.tick_hz, cli.display_hz);
        let spawned = thread::Builder::new()
            .name("display".into())
            .spawn(move || console_display::ConsoleDisplay::new(rx, tick_hz, display_hz).run());
        match spawned {
            Ok(h) => handles.push(h),
            Err(e) => {
                error!("Failed to spawn display thread: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    // ─── Session logger (opt-in) ────────────────────────────────────
    if cli.log_data {
        let (tx, rx) = bounded::<TickReport>(4096);
        let logger = match session_log::SessionLogger::new(rx, &cli.output_dir) {
            Ok(logger) => logger,
            Err(e) => {
                error!("Failed to create session directory under {:?}: {}", cli.output_dir, e);
                return ExitCode::FAILURE;
            }
        };
        report_txs.push(tx);
        let spawned = thread::Builder::new().name("logger".into()).spawn(move || {
            if let Err(e) = logger.run() {
                error!("Session logger stopped: {}", e);
            }
        });
        match spawned {
            Ok(h) => handles.push(h),
            Err(e) => {
                error!("Failed to spawn logger thread: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    // ─── Simulated player ───────────────────────────────────────────
    let rules = &config.rules;
    let play_offset = if cli.skip_calibration || !rules.calibration_enabled {
        rules.countdown_secs
    } else {
        rules.calibration_hold_time + rules.countdown_secs
    };
    let sim = simulator::Simulator::new(
        clock.clone(),
        input_tx.clone(),
        events.clone(),
        TargetGeometry::from_layout(&config.layout),
        cli.sensor_hz,
    )
    .with_play_offset(play_offset)
    .with_timing_error(cli.timing_error_ms / 1000.0);
    let spawned = thread::Builder::new()
        .name("simulator".into())
        .spawn(move || {
            let mut sim = sim;
            sim.run();
        });
    if let Err(e) = spawned {
        error!("Failed to spawn simulator thread: {}", e);
        return ExitCode::FAILURE;
    }

    // ─── Operator ───────────────────────────────────────────────────
    let command = if cli.skip_calibration {
        SessionCommand::SkipCalibration {
            diagnostic: cli.diagnostic,
        }
    } else {
        SessionCommand::Start
    };
    let _ = input_tx.send(InputEvent::Command(command));
    drop(input_tx);

    // ─── Coordinator ────────────────────────────────────────────────
    let session = PlaySession::new(&config, settings, events, mode, &telemetry);
    let layout = config.layout.clone();
    let tick_hz = cli.tick_hz;
    let coord_clock = clock.clone();
    let coord_telemetry = telemetry.clone();
    let spawned = thread::Builder::new().name("coordinator".into()).spawn(move || {
        coordinator::Coordinator::new(input_rx, report_txs, session, layout, &coord_telemetry)
            .with_tick_rate(tick_hz)
            .run(&coord_clock)
    });
    let final_score = match spawned.map(|h| h.join()) {
        Ok(Ok(score)) => score,
        Ok(Err(_)) => {
            error!("Coordinator thread panicked");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            error!("Failed to spawn coordinator thread: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // The coordinator dropped every report sender; displays drain and exit.
    for h in handles {
        let _ = h.join();
    }

    info!("═══════════════════════════════════════════════");
    info!("  Score: {}   Max combo: {}", final_score.score, final_score.max_combo);
    for grade in JudgmentGrade::ALL {
        info!("  {:<8} {}", grade.label(), final_score.tally.get(grade));
    }
    if final_score.hazards_triggered > 0 {
        info!("  Hazards struck: {}", final_score.hazards_triggered);
    }
    info!("═══════════════════════════════════════════════");
    ExitCode::SUCCESS
}
