#![deny(missing_docs)]
//! FactorialHR command-line interface.
//!
//! Manages the OAuth2 session used to talk to the FactorialHR API.

mod account;

use account::{Context, LoginArgs};
use clap::{Parser, Subcommand};
use factorial_core::ClientConfig;
use factorial_core::config::DEFAULT_HTTP_TIMEOUT_SECS;
use factorial_core::store::SESSION_PATH_ENV;
use std::path::PathBuf;
use std::time::Duration;

pub(crate) type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "factorialhr", version, about = "FactorialHR CLI")]
struct Cli {
    /// Override the session file path.
    #[arg(long, env = SESSION_PATH_ENV, global = true)]
    session_path: Option<PathBuf>,
    /// HTTP timeout in seconds.
    #[arg(long, env = "FACTORIAL_HTTP_TIMEOUT", global = true, default_value_t = DEFAULT_HTTP_TIMEOUT_SECS)]
    http_timeout: u64,
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an OAuth2 session through the browser.
    Login(LoginArgs),
    /// Show the current session.
    Status,
    /// Refresh the current session.
    Refresh,
    /// Revoke and remove the current session.
    Logout,
}

#[cfg(not(test))]
#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
fn main() {}

#[cfg(not(test))]
async fn run(cli: Cli) -> CliResult<()> {
    use factorial_core::{FileSessionStore, ReqwestOAuthClient, SystemClock};
    use std::sync::Arc;

    let ctx = context(cli.session_path, cli.http_timeout)?;
    match cli.command {
        Commands::Login(args) => account::run_login(args, &ctx).await?,
        Commands::Status => {
            let store = FileSessionStore::new(&ctx.session_path);
            println!("{}", account::run_status_with(&store, &SystemClock).await?);
        }
        Commands::Refresh => {
            let message = account::run_refresh_with(
                ReqwestOAuthClient::new(&ctx.client_config)?,
                FileSessionStore::new(&ctx.session_path),
                Arc::new(SystemClock),
                &ctx.client_config,
            )
            .await?;
            println!("{message}");
        }
        Commands::Logout => {
            let message = account::run_logout_with(
                ReqwestOAuthClient::new(&ctx.client_config)?,
                FileSessionStore::new(&ctx.session_path),
                Arc::new(SystemClock),
                &ctx.client_config,
            )
            .await?;
            println!("{message}");
        }
    }
    Ok(())
}

#[cfg_attr(test, allow(dead_code))]
fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

/// Resolve the session path and HTTP settings shared by every command.
fn context(session_path: Option<PathBuf>, http_timeout_secs: u64) -> CliResult<Context> {
    let session_path = factorial_core::resolve_session_path(session_path)?;
    let client_config =
        ClientConfig::default().with_http_timeout(Duration::from_secs(http_timeout_secs));
    Ok(Context {
        session_path,
        client_config,
    })
}
