use clap::Parser;
use sheet_sync::args::{Args, Command, UpDown};
use sheet_sync::{commands, Config, Mode, Result};
use std::process::ExitCode;
use tracing::{debug, error, trace};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Values from a .env file fill in the environment before the arguments are parsed
    let dotenv = dotenvy::dotenv();
    let args = Args::parse();
    let log_level = args.common().log_level();
    init_logger(log_level);
    debug!("Log level set to {}", log_level.to_string().to_lowercase());
    match dotenv {
        Ok(path) => debug!("Loaded {}", path.display()),
        Err(e) => trace!("No .env file loaded: {e}"),
    }

    match main_inner(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Exiting with error: {e}");
            ExitCode::FAILURE
        }
    }
}

pub async fn main_inner(args: Args) -> Result<()> {
    trace!("{args:?}");

    // This allows for running the program without hitting the Google APIs. When
    // SHEET_SYNC_IN_TEST_MODE is set and non-empty, then the mode will be Mode::Test,
    // otherwise it will be Mode::Google.
    let mode = Mode::from_env();
    let config = Config::from_args(args.common(), mode)?;

    let _: () = match args.command() {
        Command::Serve(serve_args) => {
            commands::serve(config.with_serve(serve_args)?, mode)
                .await?
                .print()
        }

        Command::Sync(sync_args) => match sync_args.direction() {
            UpDown::Up => commands::sync_up(config, mode).await?.print(),
            UpDown::Down => commands::sync_down(config, mode).await?.print(),
        },
    };
    Ok(())
}

/// Initializes the tracing subscriber.
pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => {
            // RUST_LOG exists; use it.
            EnvFilter::from_default_env()
        }
        None => {
            // RUST_LOG does not exist; use default log level for this crate only.
            EnvFilter::new(format!(
                "{}={},{}={},tower_http={}",
                env!("CARGO_CRATE_NAME"),
                level,
                env!("CARGO_BIN_NAME"),
                level,
                level
            ))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
