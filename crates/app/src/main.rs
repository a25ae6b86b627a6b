use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant, SystemTime},
};

use clap::{Parser, Subcommand};
use djviz_core::{
    script, AppConfig, CpalBackend, FeatureExtractor, FrameBus, FrameTick, HeadlessScene,
    InputBackend, MappingEngine, ObjectDefinition, RenderClock, TickStats, VisualiserError,
    DEFAULT_DEVICE,
};
use tracing_subscriber::EnvFilter;

fn main() -> djviz_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Devices => list_devices(),
        Commands::Check { script } => check_script(&script),
        Commands::Live {
            script,
            device,
            seconds,
        } => run_live(&config, &script, device, seconds),
    }
}

fn list_devices() -> djviz_core::Result<()> {
    let devices = CpalBackend::new().input_devices()?;
    if devices.is_empty() {
        tracing::warn!("no audio input devices found");
    }
    for device in devices {
        let marker = if device.is_default { "*" } else { " " };
        println!("{marker} {}", device.id);
    }
    Ok(())
}

fn check_script(path: &Path) -> djviz_core::Result<()> {
    let source = std::fs::read_to_string(path)?;
    let objects = script::compile(&source)?;
    let json = serde_json::to_string_pretty(&objects)
        .map_err(|err| VisualiserError::msg(err.to_string()))?;
    println!("{json}");
    tracing::info!(?path, objects = objects.len(), "script compiled");
    Ok(())
}

fn run_live(
    config: &AppConfig,
    script_path: &Path,
    device: Option<String>,
    seconds: Option<u64>,
) -> djviz_core::Result<()> {
    let device = device
        .or_else(|| config.audio.device.clone())
        .unwrap_or_else(|| DEFAULT_DEVICE.to_string());
    tracing::info!(%device, script = ?script_path, "starting live mode");

    let shutdown = spawn_shutdown_listener()?;
    let mut watcher = ScriptWatcher::new(script_path);
    let mut engine = MappingEngine::new(HeadlessScene::new());
    engine.attach(watcher.load()?)?;

    let mut extractor = FeatureExtractor::new(CpalBackend::new(), config.audio.clone())?;
    extractor.start(&device)?;
    let bus = extractor.bus();

    let mut clock = RenderClock::new(config.render.fps);
    let stop_at = seconds.map(|seconds| Instant::now() + Duration::from_secs(seconds));
    let reload_every = Duration::from_millis(config.render.reload_interval_ms);
    let report_every = Duration::from_millis(config.render.report_interval_ms);
    let mut last_reload = Instant::now();
    let mut last_report = Instant::now();

    loop {
        let tick = clock.wait();
        if should_stop(&shutdown, stop_at, Instant::now()) {
            break;
        }

        if last_reload.elapsed() >= reload_every {
            last_reload = Instant::now();
            match watcher.poll() {
                Ok(Some(objects)) => {
                    if let Err(err) = engine.attach(objects) {
                        tracing::warn!(%err, "could not attach reloaded objects");
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(%err, "script reload failed, keeping previous objects")
                }
            }
        }

        let stats = engine.tick_latest(&bus);
        engine.scene().draw()?;

        if last_report.elapsed() >= report_every {
            last_report = Instant::now();
            report(&engine, &bus, tick, stats);
        }
    }

    extractor.stop();
    engine.detach();
    Ok(())
}

fn should_stop(shutdown: &AtomicBool, stop_at: Option<Instant>, now: Instant) -> bool {
    shutdown.load(Ordering::SeqCst) || stop_at.is_some_and(|stop_at| now >= stop_at)
}

/// Sets the returned flag on Ctrl+C or SIGTERM so the render loop can stop
/// the audio input and release the scene before exiting.
fn spawn_shutdown_listener() -> djviz_core::Result<Arc<AtomicBool>> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let flag = shutdown.clone();
    std::thread::Builder::new()
        .name("shutdown-signal".to_string())
        .spawn(move || {
            runtime.block_on(wait_for_shutdown());
            flag.store(true, Ordering::SeqCst);
        })?;

    Ok(shutdown)
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(%err, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(err) => {
                tracing::warn!(%err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}

fn report(engine: &MappingEngine<HeadlessScene>, bus: &FrameBus, tick: FrameTick, stats: TickStats) {
    let frame = bus.latest_or_silent();
    tracing::info!(
        frame = tick.index,
        elapsed = ?tick.elapsed,
        average_volume = frame.average_volume,
        low_power = frame.low_power,
        mid_power = frame.mid_power,
        high_power = frame.high_power,
        applied = stats.applied,
        skipped = stats.skipped,
        "render tick"
    );
    for mesh in engine.scene().meshes() {
        tracing::info!(
            name = %mesh.descriptor.name,
            position = ?mesh.transform.position,
            rotation = ?mesh.transform.rotation,
            scale = ?mesh.transform.scale,
            "object transform"
        );
    }
}

/// Recompiles the script whenever its modification time changes.
struct ScriptWatcher {
    path: PathBuf,
    modified: Option<SystemTime>,
}

impl ScriptWatcher {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            modified: None,
        }
    }

    fn load(&mut self) -> djviz_core::Result<Vec<ObjectDefinition>> {
        self.modified = std::fs::metadata(&self.path)?.modified().ok();
        let source = std::fs::read_to_string(&self.path)?;
        script::compile(&source)
    }

    /// Returns the new object set if the file changed since the last load.
    fn poll(&mut self) -> djviz_core::Result<Option<Vec<ObjectDefinition>>> {
        let modified = std::fs::metadata(&self.path)?.modified().ok();
        if modified == self.modified {
            return Ok(None);
        }
        let objects = self.load()?;
        tracing::info!(objects = objects.len(), "script reloaded");
        Ok(Some(objects))
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio-reactive 3D scene driven by a mapping script", long_about = None)]
struct Cli {
    /// JSON configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List audio input devices. The default device is marked with `*`.
    Devices,
    /// Compile a script and print the resulting objects as JSON.
    Check {
        /// Script in the line grammar or the JSON document form.
        script: PathBuf,
    },
    /// Capture live audio and drive the script's objects at frame rate.
    Live {
        /// Script in the line grammar or the JSON document form.
        script: PathBuf,
        /// Input device name. Defaults to the configured or host default device.
        #[arg(short, long)]
        device: Option<String>,
        /// Stop after this many seconds instead of running until Ctrl+C.
        #[arg(short, long)]
        seconds: Option<u64>,
    },
}
