//! `scope-cli` – smart-scope fire-control binary.
//!
//! This binary wires the whole stack together:
//!
//! 1. Loads `~/.scope/config.toml` (writing the defaults on first run).
//! 2. Loads the bullet calibration file, falling back to an all-zero table
//!    and raising a calibration fault when it is missing or corrupt.
//! 3. Optionally uploads the radar chirp profile, then starts one link
//!    supervisor per serial port and the periodic runtime tasks.
//! 4. Optionally measures the gyro's resting offset.
//! 5. Runs until **Ctrl-C**, then stops the runtime tasks. Link threads stop
//!    at their next frame or reopen.

mod config;

use colored::Colorize;
use std::fs::{File, OpenOptions};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

use scope_calibration::CalibrationStore;
use scope_middleware::{EventBus, LinkConfig, LinkSupervisor, Topic, TopicReceiver};
use scope_middleware::{RadarConfigError, UploadReport, read_commands, upload_commands};
use scope_runtime::{Clock, RadarDump, ScopeRuntime, Started};
use scope_types::{AimOutcome, Event, EventPayload};

/// How long tasks get to notice the shutdown flag before they are abandoned.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

fn main() -> ExitCode {
    let _guard = scope_runtime::init_tracing("scope");

    print_banner();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    let cfg = load_config();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("scope-rt")
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to build Tokio runtime");
            return ExitCode::FAILURE;
        }
    };
    runtime.block_on(run(cfg, shutdown));
    println!("{}", "  ✓ Scope stopped.".green());
    ExitCode::SUCCESS
}

fn load_config() -> config::Config {
    match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    }
}

async fn run(cfg: config::Config, shutdown: Arc<AtomicBool>) {
    let clock = Clock::start();
    let bus = EventBus::default();
    let monitor = tokio::spawn(monitor(
        bus.subscribe_to(Topic::SystemAlerts),
        bus.subscribe_to(Topic::AimEvents),
        Arc::clone(&shutdown),
    ));

    // ── Calibration ───────────────────────────────────────────────────────
    let (store, fault) = CalibrationStore::open_or_default(&cfg.calibration_path);
    if let Some(e) = fault {
        let event = Event::new(
            "scope-cli",
            EventPayload::CalibrationFault { message: e.to_string() },
        );
        if let Err(e) = bus.publish_to(Topic::SystemAlerts, event) {
            warn!(error = %e, "Calibration fault not delivered");
        }
    }

    // ── Radar profile ─────────────────────────────────────────────────────
    if let Some(profile) = &cfg.radar_profile {
        configure_radar(&cfg, profile).await;
    }

    // ── Runtime tasks ─────────────────────────────────────────────────────
    let scope = ScopeRuntime::new(clock, bus.clone(), Arc::clone(&shutdown), store)
        .with_periods(cfg.periods())
        .with_imu_config(cfg.imu());
    let gyro = scope.gyro();
    let Started { handles, mut radar_ingest, mut sensor_ingest, tasks } = scope.start();

    if let Some(path) = &cfg.radar_dump {
        match RadarDump::create(path) {
            Ok(dump) => {
                info!(path = %path.display(), "Dumping radar points");
                radar_ingest = radar_ingest.with_dump(dump);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Cannot create radar dump"),
        }
    }

    // ── Link supervisors ──────────────────────────────────────────────────
    let radar_port = cfg.radar_port.clone();
    let radar_link = LinkSupervisor::new(
        LinkConfig { reopen_delay: cfg.reopen_delay(), ..LinkConfig::radar() },
        Arc::clone(&shutdown),
    )
    .with_alerts(bus.clone())
    .spawn(move || File::open(&radar_port), move |frame| radar_ingest.handle(frame));

    let sensor_port = cfg.sensor_port.clone();
    let sensor_link = LinkSupervisor::new(
        LinkConfig { reopen_delay: cfg.reopen_delay(), ..LinkConfig::sensor_board() },
        Arc::clone(&shutdown),
    )
    .with_alerts(bus.clone())
    .spawn(move || File::open(&sensor_port), move |frame| sensor_ingest.handle(frame));

    let links: Vec<_> = [radar_link, sensor_link]
        .into_iter()
        .filter_map(|spawned| {
            spawned
                .map_err(|e| error!(error = %e, "Failed to spawn link thread"))
                .ok()
        })
        .collect();

    // ── Gyro offset ───────────────────────────────────────────────────────
    if cfg.calibrate_imu_on_boot {
        println!("  {}", "Hold the scope still – calibrating gyro …".yellow());
        match tokio::task::spawn_blocking(move || gyro.calibrate()).await {
            Ok(offset) => println!("  {} Gyro offset {offset:.4} deg/s", "✓".green().bold()),
            Err(e) => warn!(error = %e, "Gyro calibration did not complete"),
        }
    }

    println!("  {}", "Scope running. Press Ctrl-C to stop.".bold());
    while !shutdown.load(Ordering::Relaxed) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    // ── Shutdown ──────────────────────────────────────────────────────────
    drop(handles);
    for task in tasks.into_iter().chain([monitor]) {
        if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
            warn!("Task did not stop in time");
        }
    }
    // A link blocked in a read cannot be interrupted; leave it to process exit.
    tokio::time::sleep(Duration::from_millis(100)).await;
    for link in links {
        if link.is_finished() {
            match link.join() {
                Ok(report) => info!(?report, "Link joined"),
                Err(_) => warn!("Link thread panicked"),
            }
        }
    }
}

async fn configure_radar(cfg: &config::Config, profile: &std::path::Path) {
    let commands = match read_commands(profile) {
        Ok(commands) => commands,
        Err(e) => {
            error!(error = %e, "Radar profile unavailable; radar left unconfigured");
            return;
        }
    };
    let port = cfg.radar_control_port.clone();
    let upload = tokio::task::spawn_blocking(move || -> Result<UploadReport, RadarConfigError> {
        let mut control = OpenOptions::new().read(true).write(true).open(&port)?;
        upload_commands(&mut control, &commands)
    })
    .await;
    match upload {
        Ok(Ok(report)) if report.acknowledged < report.sent => {
            warn!(?report, "Radar rejected part of its profile")
        }
        Ok(Ok(_)) => {}
        Ok(Err(e)) => error!(error = %e, "Radar configuration failed"),
        Err(e) => error!(error = %e, "Radar configuration aborted"),
    }
}

/// Log alerts and aim outcomes until shutdown.
async fn monitor(mut alerts: TopicReceiver, mut aim: TopicReceiver, shutdown: Arc<AtomicBool>) {
    while !shutdown.load(Ordering::Relaxed) {
        while let Some(event) = alerts.try_next() {
            match event.payload {
                EventPayload::LinkReset { link, zero_reads } => {
                    warn!(%link, zero_reads, "Link reset")
                }
                EventPayload::CalibrationFault { message } => {
                    println!("  {} {}", "Calibration fault:".red().bold(), message);
                }
                other => info!(source = %event.source, payload = ?other, "Alert"),
            }
        }
        while let Some(event) = aim.try_next() {
            if let EventPayload::AimOutcome(outcome) = event.payload {
                match outcome {
                    AimOutcome::Fired { distance, angular_velocity } => {
                        info!(distance, angular_velocity, "Fire solution")
                    }
                    AimOutcome::Failed { reasons } => info!(?reasons, "Track failed"),
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ____                      "#.bold().cyan());
    println!("{}", r#"  / __/______  ___  ___      "#.bold().cyan());
    println!("{}", r#" _\ \/ __/ _ \/ _ \/ -_)     "#.bold().cyan());
    println!("{}", r#"/___/\__/\___/ .__/\__/      "#.bold().cyan());
    println!("{}", r#"            /_/              "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Scope".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Radar + IMU fire-control engine");
    println!();
}
