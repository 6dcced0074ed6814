mod config;

use clap::{Parser, ValueEnum};
use config::Config;
use docswap_core::{FileServer, Monitor, MonitorConfig, ServerConfig};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

// Use mimalloc for better performance
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Written to the root when the document is missing at startup
const DEFAULT_DOCUMENT: &[u8] = include_bytes!("../assets/index.html");

#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Config file, created with defaults if missing
    #[arg(short, long, default_value_os_t = PathBuf::from("docswap.toml"))]
    config: PathBuf,

    /// Directory files are served from
    #[arg(short, long, default_value_os_t = PathBuf::from("."))]
    root: PathBuf,

    /// Listen port, overrides `web_port`
    #[arg(short, long)]
    port: Option<u16>,

    /// Set the output style of the logs
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn main() -> ExitCode {
    let args = Args::parse();
    set_up_logger(args.log_format);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to build runtime");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(run(args));
    ExitCode::SUCCESS
}

fn set_up_logger(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .json()
                .flatten_event(true)
                .with_env_filter(filter)
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .compact()
                .with_env_filter(filter)
                .init();
        }
    }
}

async fn run(args: Args) {
    let config = Config::load_or_default(&args.config);
    let port = args.port.unwrap_or(config.web_port);

    let server_config = ServerConfig::new(&args.root).port(port);
    provision_document(&args.root, &server_config.document);

    let server = FileServer::new(server_config);
    if let Err(e) = server.start().await {
        error!(error = %e, "web server failed to start");
    }

    let monitor = Monitor::new(MonitorConfig::default().target(&config.monitor_web_status))
        .local_server(server.clone());
    monitor.start().await;

    shutdown_signal().await;
    info!("shutting down");

    monitor.stop().await;
    server.stop().await;
}

fn provision_document(root: &Path, name: &str) {
    let path = root.join(name);
    if path.exists() {
        return;
    }

    let written =
        std::fs::create_dir_all(root).and_then(|_| std::fs::write(&path, DEFAULT_DOCUMENT));
    match written {
        Ok(()) => info!(path = %path.display(), "created default document"),
        Err(e) => warn!(path = %path.display(), error = %e, "failed to create default document"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
