// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! `hive` — the worker binary.
//!
//! `run` starts the engine; `doctor` runs preflight checks;
//! `print-config` dumps the effective configuration. Exit codes:
//! 0 success, 1 startup/config failure, 124 internal timeout.

mod exit_error;

use clap::{Parser, Subcommand, ValueEnum};
use exit_error::ExitError;
use hive_transport::TransportMode;
use hive_worker::{preflight, Container, WorkerConfig, WorkerOverrides};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "hive", version, about = "Hive distributed crawl worker")]
struct Cli {
    /// Path to the YAML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TransportArg {
    Direct,
    Gateway,
}

impl From<TransportArg> for TransportMode {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Direct => TransportMode::Direct,
            TransportArg::Gateway => TransportMode::Gateway,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
#[value(rename_all = "UPPER")]
enum LogLevelArg {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevelArg {
    fn as_filter(self) -> &'static str {
        match self {
            LogLevelArg::Debug => "debug",
            LogLevelArg::Info => "info",
            LogLevelArg::Warning => "warn",
            LogLevelArg::Error => "error",
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Start the worker engine.
    Run {
        /// Worker display name.
        #[arg(long)]
        name: Option<String>,
        /// Bind/advertise port.
        #[arg(long)]
        port: Option<u16>,
        /// Bind/advertise host.
        #[arg(long)]
        host: Option<String>,
        /// Transport binding.
        #[arg(long, value_enum)]
        transport: Option<TransportArg>,
        /// Redis URL (Direct mode).
        #[arg(long)]
        redis_url: Option<String>,
        /// Gateway endpoint `host:port` (Gateway mode).
        #[arg(long)]
        gateway_endpoint: Option<String>,
        /// Persistent worker id.
        #[arg(long)]
        worker_id: Option<String>,
        /// One-shot install key (Gateway first boot).
        #[arg(long)]
        worker_key: Option<String>,
        #[arg(long, value_enum)]
        log_level: Option<LogLevelArg>,
    },
    /// Run preflight checks; exit 0 if all pass.
    Doctor,
    /// Dump the effective configuration.
    PrintConfig {
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ConfigFormat {
    Yaml,
    Json,
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run_main(cli) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {}", e.message);
            e.code
        }
    };
    std::process::exit(exit_code);
}

fn run_main(cli: Cli) -> Result<(), ExitError> {
    match cli.command {
        Command::Run {
            name,
            port,
            host,
            transport,
            redis_url,
            gateway_endpoint,
            worker_id,
            worker_key,
            log_level,
        } => {
            let overrides = WorkerOverrides {
                name,
                host,
                port,
                transport_mode: transport.map(Into::into),
                redis_url,
                gateway_endpoint,
                worker_id,
                worker_key,
                log_level: log_level.map(|l| l.as_filter().to_string()),
            };
            let config = load_config(cli.config.as_deref(), &overrides)?;
            config
                .validate()
                .map_err(|e| ExitError::new(1, format!("invalid configuration: {e}")))?;
            run_worker(config)
        }
        Command::Doctor => {
            let config = load_config(cli.config.as_deref(), &WorkerOverrides::default())?;
            doctor(config)
        }
        Command::PrintConfig { format } => {
            let config = load_config(cli.config.as_deref(), &WorkerOverrides::default())?;
            print_config(&config, format)
        }
    }
}

fn load_config(
    path: Option<&std::path::Path>,
    overrides: &WorkerOverrides,
) -> Result<WorkerConfig, ExitError> {
    // Default file next to the data dir convention when none is given.
    let default_path = PathBuf::from("worker_config.yaml");
    let yaml_path = path.or_else(|| default_path.exists().then_some(default_path.as_path()));
    WorkerConfig::resolve(yaml_path, overrides)
        .map_err(|e| ExitError::new(1, format!("configuration error: {e}")))
}

fn init_tracing(config: &WorkerConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_lowercase()));

    let log_dir = config.data_dir.join("logs");
    if std::fs::create_dir_all(&log_dir).is_err() {
        tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
        return None;
    }
    let file_appender = tracing_appender::rolling::daily(log_dir, "worker.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
        .init();
    Some(guard)
}

fn run_worker(config: WorkerConfig) -> Result<(), ExitError> {
    let _guard = init_tracing(&config);

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| ExitError::new(1, format!("failed to start runtime: {e}")))?;

    runtime.block_on(async {
        let container = Container::build(config)
            .map_err(|e| ExitError::new(1, format!("startup failed: {e}")))?;

        let cancel = CancellationToken::new();
        spawn_signal_handler(cancel.clone());

        container
            .run(cancel)
            .await
            .map_err(|e| ExitError::new(1, format!("worker failed: {e}")))
    })
}

/// SIGTERM/SIGINT → graceful shutdown via the cancellation token.
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => return,
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("received SIGINT, shutting down"),
                _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("received interrupt, shutting down");
        }
        cancel.cancel();
    });
}

fn doctor(config: WorkerConfig) -> Result<(), ExitError> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| ExitError::new(1, format!("failed to start runtime: {e}")))?;
    let checks = runtime
        .block_on(async {
            tokio::time::timeout(std::time::Duration::from_secs(120), preflight(&config)).await
        })
        .map_err(|_| ExitError::timeout("preflight checks timed out"))?;

    let mut all_ok = true;
    for check in &checks {
        let marker = if check.ok { "ok" } else { "FAIL" };
        println!("{marker:>4}  {:<20} {}", check.name, check.detail);
        all_ok &= check.ok;
    }
    if all_ok {
        println!("all checks passed");
        Ok(())
    } else {
        Err(ExitError::new(1, "one or more preflight checks failed"))
    }
}

fn print_config(config: &WorkerConfig, format: ConfigFormat) -> Result<(), ExitError> {
    let rendered = match format {
        ConfigFormat::Yaml => serde_yaml::to_string(config)
            .map_err(|e| ExitError::new(1, format!("serialize config: {e}")))?,
        ConfigFormat::Json => serde_json::to_string_pretty(config)
            .map_err(|e| ExitError::new(1, format!("serialize config: {e}")))?,
    };
    println!("{rendered}");
    Ok(())
}
