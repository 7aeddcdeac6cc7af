mod backend;
mod error;
mod local;
mod output;
mod remote;
mod session;

use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;

use circulation_app::circulation::{FineInput, RequestAction};
use circulation_kernel::settings::Settings;

use backend::Circulation;
use local::LocalConfig;
use remote::RemoteClient;

#[derive(Parser)]
#[command(name = "circulation", version, about = "Library circulation client")]
struct Cli {
    /// Server base URL (defaults to client.base_url)
    #[arg(long, env = "CIRCULATION_BASE_URL")]
    base_url: Option<String>,

    /// Bearer token from `circulation login`
    #[arg(long, env = "CIRCULATION_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// User to act as when working from the local store
    #[arg(long, env = "CIRCULATION_AS_USER")]
    as_user: Option<String>,

    /// Skip the server and use the local store directly
    #[arg(long)]
    offline: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Open a session and print the token
    Login {
        user_id: String,
        #[arg(long, env = "CIRCULATION_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Show who the client acts as
    Whoami,
    /// List the catalog
    Books,
    /// Fetch every collection and print an overview
    Snapshot,
    /// Show the queue of pending requests for a book
    Waitlist { book_id: String },
    /// Ask to borrow a book
    Borrow { book_id: String },
    /// Approve a pending request
    Approve { request_id: String },
    /// Deny a pending request
    Deny { request_id: String },
    /// Return a borrowed book, optionally raising a fine
    Return {
        book_id: String,
        user_id: String,
        #[arg(long)]
        fine_amount: Option<f64>,
        #[arg(long, requires = "fine_amount")]
        fine_reason: Option<String>,
    },
    /// Mark a fine paid
    PayFine { fine_id: String },
    /// Refetch everything on an interval until interrupted
    Watch {
        /// Seconds between polls (defaults to client.poll_interval_secs)
        #[arg(long)]
        interval: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load().context("failed to load circulation settings")?;
    if settings.telemetry.filter.is_none() && std::env::var_os("RUST_LOG").is_none() {
        settings.telemetry.filter = Some("warn".to_string());
    }
    circulation_telemetry::init_stderr(&settings.telemetry)?;

    let acting_user = cli
        .as_user
        .clone()
        .unwrap_or_else(|| settings.auth.admin_user_id.clone());
    let local = LocalConfig::new(settings.client.fallback_dir.clone(), &settings.auth);

    let mut circulation = if cli.offline {
        Circulation::offline(local, acting_user).await?
    } else {
        let base_url = cli
            .base_url
            .clone()
            .unwrap_or_else(|| settings.client.base_url.clone());
        let client = RemoteClient::new(
            &base_url,
            cli.token.clone(),
            Duration::from_millis(settings.client.timeout_ms),
        )?;
        Circulation::remote(client, local, acting_user)
    };

    run(&cli, &settings, &mut circulation).await?;

    if let Some(path) = circulation.local_path() {
        eprintln!("(offline: changes kept in {})", path.display());
    }
    Ok(())
}

async fn run(cli: &Cli, settings: &Settings, circulation: &mut Circulation) -> anyhow::Result<()> {
    match &cli.command {
        Command::Login { user_id, password } => {
            let outcome = circulation.login(user_id, password.as_deref()).await?;
            match &outcome.token {
                Some(token) if !cli.json => {
                    println!(
                        "signed in as {} ({:?})",
                        outcome.identity.user_name, outcome.identity.role
                    );
                    println!("export CIRCULATION_TOKEN={}", token);
                }
                Some(token) => emit_json(&serde_json::json!({
                    "token": token,
                    "principal": outcome.identity,
                }))?,
                None => show(cli.json, &outcome.identity, |me| {
                    format!("acting locally as {} ({:?})\n", me.user_name, me.role)
                })?,
            }
        }
        Command::Whoami => {
            let me = circulation.whoami().await?;
            show(cli.json, &me, |me| {
                format!("{} ({}) {:?}\n", me.user_name, me.user_id, me.role)
            })?;
        }
        Command::Books => {
            let books = circulation.books().await?;
            show(cli.json, &books, |b| output::books(b))?;
        }
        Command::Snapshot => {
            let library = circulation.snapshot().await?;
            show(cli.json, &library, output::summary)?;
        }
        Command::Waitlist { book_id } => {
            let entries = circulation.snapshot().await?.waitlist(book_id);
            show(cli.json, &entries, |e| output::waitlist(book_id, e))?;
        }
        Command::Borrow { book_id } => {
            let request = circulation.borrow(book_id).await?;
            show(cli.json, &request, output::request)?;
            refetch(cli, circulation).await?;
        }
        Command::Approve { request_id } => {
            let resolution = circulation
                .resolve(request_id, RequestAction::Approve)
                .await?;
            show(cli.json, &resolution, output::resolution)?;
            refetch(cli, circulation).await?;
        }
        Command::Deny { request_id } => {
            let resolution = circulation.resolve(request_id, RequestAction::Deny).await?;
            show(cli.json, &resolution, output::resolution)?;
            refetch(cli, circulation).await?;
        }
        Command::Return {
            book_id,
            user_id,
            fine_amount,
            fine_reason,
        } => {
            let fine = fine_amount.map(|amount| FineInput {
                amount,
                reason: fine_reason.clone().unwrap_or_default(),
            });
            let receipt = circulation.return_book(book_id, user_id, fine).await?;
            show(cli.json, &receipt, output::receipt)?;
            refetch(cli, circulation).await?;
        }
        Command::PayFine { fine_id } => {
            let fine = circulation.pay_fine(fine_id).await?;
            show(cli.json, &fine, output::fine)?;
            refetch(cli, circulation).await?;
        }
        Command::Watch { interval } => {
            let every = Duration::from_secs(
                interval.unwrap_or(settings.client.poll_interval_secs).max(1),
            );
            watch(cli, circulation, every).await?;
        }
    }
    Ok(())
}

/// Full refetch after a mutation so the printed state is the server's.
async fn refetch(cli: &Cli, circulation: &mut Circulation) -> anyhow::Result<()> {
    let library = circulation.snapshot().await?;
    if !cli.json {
        print!("{}", output::summary(&library));
    }
    Ok(())
}

async fn watch(cli: &Cli, circulation: &mut Circulation, every: Duration) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                match circulation.snapshot().await {
                    Ok(library) => {
                        let stamp = chrono::Utc::now().format("%H:%M:%S");
                        if cli.json {
                            emit_json(&library)?;
                        } else {
                            print!("[{}] {}", stamp, output::summary(&library));
                        }
                    }
                    Err(err) => tracing::warn!(error = %err, "refresh failed"),
                }
            }
        }
    }
    Ok(())
}

fn show<T: Serialize>(json: bool, value: &T, human: impl FnOnce(&T) -> String) -> anyhow::Result<()> {
    if json {
        emit_json(value)
    } else {
        print!("{}", human(value));
        Ok(())
    }
}

fn emit_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
