//! postboard - command-line front end for the postboard session.
//!
//! Signs in against the identity provider, keeps a remembered session on disk
//! and, in watch mode, keeps the token refreshed until interrupted.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use postboard_core::api::Endpoints;
use postboard_core::auth::{SessionController, SessionRecord, SessionState};
use postboard_core::store::{FileStore, MemoryStore, SessionStore};
use postboard_core::{Config, IdentityClient};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// How often watch mode re-checks expiry
const EXPIRY_CHECK_INTERVAL_SECS: u64 = 30;

#[derive(Parser)]
#[command(name = "postboard", version, about = "Sign in to postboard and keep the session alive")]
struct Cli {
    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an account and sign in
    SignUp {
        email: String,
        /// Keep the session across restarts
        #[arg(long)]
        remember: bool,
        /// Stay running and keep the session refreshed
        #[arg(long)]
        watch: bool,
    },
    /// Sign in to an existing account
    SignIn {
        email: String,
        /// Keep the session across restarts
        #[arg(long)]
        remember: bool,
        /// Stay running and keep the session refreshed
        #[arg(long)]
        watch: bool,
    },
    /// Change the password of the remembered session
    ChangePassword,
    /// Show the remembered session
    Status,
    /// Forget the session
    Logout,
    /// Keep the remembered session refreshed until Ctrl+C
    Watch,
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let Some(path) = log_file else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .context("Log file path has no file name")?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .init();
    Ok(Some(guard))
}

fn open_store(config: &Config) -> Result<Arc<SessionStore>> {
    let dir = config.session_dir()?;
    let durable = FileStore::new(dir.clone())
        .with_context(|| format!("Failed to open session directory {}", dir.display()))?;
    Ok(Arc::new(SessionStore::new(
        Box::new(durable),
        Box::new(MemoryStore::new()),
    )))
}

fn open_controller(config: &Config, client: IdentityClient) -> Result<SessionController> {
    Ok(SessionController::new(
        Arc::new(client),
        open_store(config)?,
        config.refresh_config(),
    ))
}

fn print_session(session: &SessionRecord) {
    let expires = session.expires_at().with_timezone(&Local);
    println!("Email:       {}", session.email());
    println!("User ID:     {}", session.user_id());
    println!("Remembered:  {}", if session.remember_me() { "yes" } else { "no" });
    println!("Expires:     {}", expires.format("%Y-%m-%d %H:%M:%S"));
    println!("Logged in:   {}", if session.is_expired() { "no (expired)" } else { "yes" });
}

fn read_new_password() -> Result<String> {
    let password = rpassword::prompt_password("New password: ").context("Failed to read password")?;
    let confirm = rpassword::prompt_password("Confirm password: ").context("Failed to read password")?;
    if password != confirm {
        bail!("Passwords do not match");
    }
    Ok(password)
}

/// Resolves on the first Ctrl+C
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

/// Stay alive so the scheduler keeps refreshing, reporting each change,
/// until `shutdown` resolves or the session ends
async fn watch_session(
    controller: &SessionController,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    if !controller.is_logged_in() {
        bail!("Not logged in");
    }

    let mut changes = controller.subscribe();
    let mut expiry_check = tokio::time::interval(Duration::from_secs(EXPIRY_CHECK_INTERVAL_SECS));
    tokio::pin!(shutdown);
    println!("Keeping session alive, press Ctrl+C to stop");

    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = changes.borrow_and_update().clone();
                match state {
                    SessionState::Authenticated(session) => {
                        let expires = session.expires_at().with_timezone(&Local);
                        println!("Token refreshed, now expires {}", expires.format("%H:%M:%S"));
                    }
                    SessionState::Anonymous => {
                        println!("Session ended");
                        break;
                    }
                }
            }
            _ = expiry_check.tick() => {
                if !controller.is_logged_in() {
                    println!("Session expired");
                    break;
                }
            }
            _ = &mut shutdown => break,
        }
    }
    Ok(())
}

/// Sign up or sign in, then optionally stay alive refreshing the token
async fn authenticate(config: &Config, email: &str, remember: bool, watch: bool, sign_up: bool) -> Result<()> {
    let controller = open_controller(config, IdentityClient::from_config(config)?)?;
    let password = rpassword::prompt_password("Password: ").context("Failed to read password")?;

    let session = if sign_up {
        controller.sign_up(email, &password, remember).await?
    } else {
        controller.sign_in(email, &password, remember).await?
    };
    print_session(&session);

    if watch {
        watch_session(&controller, interrupted()).await?;
    } else if !remember {
        eprintln!("Session is not remembered and ends now; use --remember or --watch to keep it");
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_file.as_deref())?;
    let config = Config::load()?;
    info!("postboard starting");

    match cli.command {
        Command::SignUp { email, remember, watch } => {
            authenticate(&config, &email, remember, watch, true).await?;
        }
        Command::SignIn { email, remember, watch } => {
            authenticate(&config, &email, remember, watch, false).await?;
        }
        Command::ChangePassword => {
            let controller = open_controller(&config, IdentityClient::from_config(&config)?)?;
            if !controller.is_logged_in() {
                bail!("Not logged in");
            }
            let password = read_new_password()?;
            let session = controller.change_password(&password).await?;
            println!("Password changed");
            print_session(&session);
        }
        Command::Status => match open_store(&config)?.get_session() {
            Some(session) => print_session(&session),
            None => println!("Not logged in"),
        },
        Command::Logout => {
            // Logout never touches the network, so a missing API key is fine
            let client = IdentityClient::new(
                config.api_key.clone().unwrap_or_default(),
                Endpoints::from(&config),
            )?;
            open_controller(&config, client)?.logout();
            println!("Logged out");
        }
        Command::Watch => {
            let controller = open_controller(&config, IdentityClient::from_config(&config)?)?;
            watch_session(&controller, interrupted()).await?;
        }
    }

    info!("postboard exiting");
    Ok(())
}
