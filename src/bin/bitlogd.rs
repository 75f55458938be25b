//! The `bitlogd` binary (§4.J): parses flags, opens the engine, starts the
//! server, and blocks until a shutdown signal or a fatal server error.

use bitlogd::config::{Config, Overrides};
use bitlogd::engine::Engine;
use bitlogd::server::Server;

use clap::Parser;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "bitlogd", version, about = "An embedded, crash-safe key-value store")]
struct Cli {
    /// Address to listen on.
    #[arg(short = 'a', long = "addr")]
    addr: Option<String>,

    /// Path to the database directory.
    #[arg(long = "path", visible_alias = "db")]
    path: Option<std::path::PathBuf>,

    /// Path to an optional TOML config file.
    #[arg(long = "config")]
    config: Option<std::path::PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let overrides = Overrides { listen_addr: cli.addr, db_path: cli.path, config_file: cli.config };
    let config = match Config::load(&overrides) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("bitlogd: failed to load configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.log_level);

    log::info!("bitlogd: version '{}'", env!("CARGO_PKG_VERSION"));

    let engine = match Engine::open(&config.db_path) {
        Ok(engine) => Arc::new(engine),
        Err(err) => {
            log::error!("bitlogd: failed to open database at {}: {err}", config.db_path.display());
            return ExitCode::FAILURE;
        }
    };

    let server = match Server::bind(&config.listen_addr, engine.clone(), config.idle_timeout()) {
        Ok(server) => server,
        Err(err) => {
            log::error!("bitlogd: failed to bind {}: {err}", config.listen_addr);
            let _ = engine.close();
            return ExitCode::FAILURE;
        }
    };

    log::info!("bitlogd: listening on {}", config.listen_addr);

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        let server = server.clone();
        if let Err(err) = ctrlc::set_handler(move || {
            log::info!("bitlogd: received interrupt, shutting down");
            shutdown.store(true, Ordering::SeqCst);
            if let Err(err) = server.close() {
                log::error!("bitlogd: error closing server: {err}");
            }
        }) {
            log::warn!("bitlogd: failed to install signal handler: {err}");
        }
    }

    let serve_result = server.serve();

    if let Err(err) = engine.close() {
        log::error!("bitlogd: error closing database: {err}");
        return ExitCode::FAILURE;
    }

    match serve_result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if shutdown.load(Ordering::SeqCst) => {
            log::debug!("bitlogd: server loop ended during shutdown: {err}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("bitlogd: server loop failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str) {
    let level = level.parse().unwrap_or(log::LevelFilter::Info);
    let _ = simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    );
}
