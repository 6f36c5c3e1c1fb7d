//! `tapwised` entry point.
//!
//! Loads the configuration, wires the native adapters into an [`Engine`]
//! and supervises it until Ctrl-C.
//!
//! ```text
//! main()
//!  └─ load_config() + to_settings()
//!  └─ Engine::new(native deps).start()
//!  └─ supervise
//!       ├─ every 2s: display change check + tap health check
//!       ├─ SIGHUP:   reload config, Engine::apply_settings
//!       └─ Ctrl-C:   Engine::shutdown
//! ```
//!
//! [`Engine`]: tapwise_daemon::application::engine::Engine

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tapwise_daemon::application::settings::Settings;
use tapwise_daemon::infrastructure::storage::config::{default_config_toml, load_config};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "tapwised", version, about = "Input event correction daemon")]
struct Cli {
    /// Path to the configuration file (defaults to the platform config dir).
    #[arg(long, env = "TAPWISE_CONFIG")]
    config: Option<PathBuf>,

    /// Print the default configuration as TOML and exit.
    #[arg(long)]
    print_default_config: bool,

    /// Show the system Accessibility prompt if permission is missing.
    #[arg(long)]
    request_permission: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.print_default_config {
        print!("{}", default_config_toml()?);
        return Ok(());
    }

    let config = load_config(cli.config.as_deref()).context("loading configuration")?;

    // `RUST_LOG` wins over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.general.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = config.to_settings().context("validating configuration")?;
    run(cli, settings).await
}

#[cfg(not(target_os = "macos"))]
async fn run(_cli: Cli, _settings: Settings) -> anyhow::Result<()> {
    anyhow::bail!("unsupported platform: tapwised requires macOS event taps")
}

#[cfg(target_os = "macos")]
async fn run(cli: Cli, settings: Settings) -> anyhow::Result<()> {
    use std::sync::Arc;

    use tapwise_daemon::application::engine::{Engine, EngineDeps};
    use tapwise_daemon::application::tap_manager::PermissionChecker;
    use tapwise_daemon::application::window_geometry::SystemClock;
    use tapwise_daemon::infrastructure::devices::NativeDeviceMonitor;
    use tapwise_daemon::infrastructure::displays::NativeScreenEnumerator;
    use tapwise_daemon::infrastructure::event_tap::NativeTapBackend;
    use tapwise_daemon::infrastructure::permissions::AccessibilityPermissions;
    use tapwise_daemon::infrastructure::scheduler::TokioScheduler;
    use tapwise_daemon::infrastructure::system_prefs::system_scroll_preference;
    use tapwise_daemon::infrastructure::windows::{NativeWindowMover, NativeWindowQuery};
    use tracing::{info, warn};

    info!(version = env!("CARGO_PKG_VERSION"), "tapwised starting");

    let permissions = Arc::new(AccessibilityPermissions::new());
    if cli.request_permission && !permissions.is_trusted() {
        permissions.request_access();
    }
    if !permissions.is_trusted() {
        warn!("accessibility permission not granted; event-tap features stay off until granted");
    }

    let deps = EngineDeps {
        tap_backend: Arc::new(NativeTapBackend::new()),
        permissions,
        scheduler: Arc::new(TokioScheduler::current()),
        device_monitor: Arc::new(NativeDeviceMonitor::new()),
        window_query: Arc::new(NativeWindowQuery::new()),
        window_mover: Arc::new(NativeWindowMover::new()),
        scroll_preference: Arc::new(system_scroll_preference()),
        screens: Arc::new(NativeScreenEnumerator::new()),
        clock: Arc::new(SystemClock),
    };
    let engine = Arc::new(Engine::new(deps, settings));

    let starting = Arc::clone(&engine);
    let report = tokio::task::spawn_blocking(move || starting.start()).await?;
    supervisor::log_report("start", &report);

    supervisor::supervise(engine, cli.config).await
}

#[cfg(target_os = "macos")]
mod supervisor {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use tapwise_daemon::application::engine::{Engine, StartReport};
    use tapwise_daemon::infrastructure::storage::config::load_config;
    use tokio::signal::unix::{signal, SignalKind};
    use tracing::{error, info};

    const POLL_INTERVAL: Duration = Duration::from_secs(2);

    pub fn log_report(phase: &str, report: &StartReport) {
        for (feature, outcome) in &report.features {
            if outcome.is_failure() {
                error!(phase, %feature, %outcome, "feature not running");
            } else {
                info!(phase, %feature, %outcome, "feature state");
            }
        }
    }

    pub async fn supervise(engine: Arc<Engine>, config_path: Option<PathBuf>) -> anyhow::Result<()> {
        let mut hangup = signal(SignalKind::hangup())?;
        let mut poll = tokio::time::interval(POLL_INTERVAL);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!("tapwised ready. Press Ctrl-C to exit.");
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received");
                    break;
                }
                _ = hangup.recv() => {
                    reload(&engine, config_path.clone()).await;
                }
                _ = poll.tick() => {
                    engine.on_display_change();
                    engine.health_check();
                }
            }
        }

        let stopping = Arc::clone(&engine);
        tokio::task::spawn_blocking(move || stopping.shutdown()).await?;
        info!("tapwised stopped");
        Ok(())
    }

    async fn reload(engine: &Arc<Engine>, config_path: Option<PathBuf>) {
        let settings = match load_config(config_path.as_deref()).and_then(|c| c.to_settings()) {
            Ok(settings) => settings,
            Err(e) => {
                error!(error = %e, "configuration reload failed; keeping current settings");
                return;
            }
        };
        let applying = Arc::clone(engine);
        match tokio::task::spawn_blocking(move || applying.apply_settings(settings)).await {
            Ok(report) => log_report("reload", &report),
            Err(e) => error!(error = %e, "settings reload task failed"),
        }
    }
}
