//! copydesk: operator console for a follow-trading backend.
//!
//! Live follower dashboard, trader-admin client table and emergency stop,
//! driven from the terminal against the backend's REST API.

mod actions;
mod api;
mod auth;
mod config;
mod db;
mod editor;
mod models;
mod poller;
mod view;

use std::io::{BufRead, Write};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::actions::{
    AssumeYes, Confirm, EmergencyOutcome, Notice, TOGGLE_REFRESH_DELAY, TRIGGER_REFRESH_DELAYS,
};
use crate::api::{ApiClient, ApiError, DashboardBackend, TraderBackend, TriggerOrderRequest};
use crate::config::DeskConfig;
use crate::db::Database;
use crate::editor::ClientTable;
use crate::models::{DashboardSummary, RelationStatus};
use crate::poller::{PollState, Poller, RefreshOutcome};

/// Follow-trading operator console.
#[derive(Parser)]
#[command(name = "copydesk")]
#[command(about = "Watch and steer a follow-trading backend from the terminal", long_about = None)]
struct Cli {
    /// Database URL (overrides COPYDESK_DATABASE)
    #[arg(short, long)]
    database: Option<String>,

    /// Backend base URL (overrides COPYDESK_API_URL)
    #[arg(short, long)]
    api_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "COPYDESK_LOG", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the session
    Login {
        username: String,

        /// Prompted for when omitted
        #[arg(short, long, env = "COPYDESK_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Create an account
    Register {
        username: String,
        email: String,

        #[arg(short, long)]
        password: String,

        /// Must match --password
        #[arg(short, long)]
        confirm: String,
    },

    /// Forget the stored session
    Logout,

    /// Show who is logged in
    Whoami,

    /// Fetch and print the dashboard once
    Dashboard,

    /// Live dashboard (Enter: refresh, t: toggle follow, q: quit)
    Watch {
        /// Refresh interval in milliseconds (0 disables polling)
        #[arg(short, long)]
        interval_ms: Option<u64>,

        /// Do not record snapshots
        #[arg(long)]
        no_record: bool,
    },

    /// Turn follow trading on or off
    Follow {
        #[command(subcommand)]
        state: Switch,
    },

    /// Send a simulated master order
    Trigger {
        #[arg(short, long, default_value = "BTC/USDT")]
        symbol: String,

        /// Signed position size
        #[arg(long, default_value = "1.0", allow_negative_numbers = true)]
        size: f64,

        #[arg(long, default_value = "50000")]
        price: f64,

        #[arg(long, default_value = "1")]
        master_user_id: i64,
    },

    /// List the trader's clients
    Clients {
        /// Filter on name or email
        #[arg(short, long, default_value = "")]
        search: String,

        /// Only this status (active, pending, blocked)
        #[arg(long)]
        status: Option<RelationStatus>,
    },

    /// Set a client's copy ratio
    ClientRatio {
        relation_id: i64,

        #[arg(allow_hyphen_values = true)]
        ratio: String,
    },

    /// Set a client's status (active, pending, blocked)
    ClientStatus {
        relation_id: i64,
        status: RelationStatus,
    },

    /// Emergency stop for all of the trader's clients
    EmergencyStop {
        #[command(subcommand)]
        action: EmergencyCommand,

        /// Skip the confirmation prompt
        #[arg(short, long, global = true)]
        yes: bool,
    },

    /// Show recorded dashboard snapshots
    History {
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Show current configuration
    Config,
}

#[derive(Subcommand, Clone, Copy)]
enum Switch {
    On,
    Off,
}

#[derive(Subcommand, Clone, Copy)]
enum EmergencyCommand {
    Status,
    On,
    Off,
}

/// Asks on the terminal, defaulting to no.
struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        print!("{} [y/N] ", prompt);
        let _ = std::io::stdout().flush();

        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging; RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = DeskConfig::from_env()?;
    if let Some(url) = cli.api_url {
        config.api_url = url;
    }
    if let Some(database) = cli.database {
        config.database = database;
    }

    let db = Database::new(&config.database).await?;
    let client = ApiClient::new(&config.api_url, config.timeout())
        .context("Failed to build HTTP client")?;

    // A 401 on login is a bad password, not an expired session
    let logging_in = matches!(cli.command, Commands::Login { .. });

    if let Err(e) = run(cli.command, &config, &db, client).await {
        match e.downcast_ref::<ApiError>() {
            Some(ApiError::Unauthenticated) => {}
            Some(api) if api.is_auth_failure() && !logging_in => {
                eprintln!("Session rejected by the backend. Log in again with 'copydesk login <username>'.");
            }
            _ => {}
        }
        return Err(e);
    }

    Ok(())
}

async fn run(command: Commands, config: &DeskConfig, db: &Database, client: ApiClient) -> Result<()> {
    match command {
        Commands::Login { username, password } => {
            let password = match password {
                Some(p) => p,
                None => prompt("Password: ")?,
            };
            let session = auth::login(&client, &db, &username, &password).await?;
            println!("Logged in as {}", session.username);
        }

        Commands::Register {
            username,
            email,
            password,
            confirm,
        } => {
            let user = auth::register(&client, &username, &email, &password, &confirm).await?;
            println!("Registered {} (id {}). Log in with 'copydesk login {}'.", user.username, user.id, user.username);
        }

        Commands::Logout => {
            if auth::logout(&db).await? {
                println!("Logged out");
            } else {
                println!("No session stored");
            }
        }

        Commands::Whoami => match db.load_session().await? {
            Some(session) => {
                println!("Logged in as {}", session.username);
                println!("Since:  {}", session.created_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S"));
                println!("Token:  {}", session.token_hint());
                println!("Server: {}", client.base_url());
            }
            None => println!("Not logged in. Use 'copydesk login <username>'."),
        },

        Commands::Dashboard => {
            let (_, client) = auth::authorized_client(&db, client).await?;
            let summary = client.dashboard_summary().await?;
            if let Err(e) = db.record_snapshot_capped(&summary, config.history_keep).await {
                warn!(error = %e, "Failed to record snapshot");
            }
            let state = PollState {
                data: Some(summary),
                updated_at: Some(chrono::Utc::now()),
                fetches: 1,
                ..Default::default()
            };
            print!("{}", view::render_dashboard(&state));
        }

        Commands::Watch {
            interval_ms,
            no_record,
        } => {
            let (session, client) = auth::authorized_client(&db, client).await?;
            let interval = interval_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.poll_interval());

            info!(user = %session.username, interval_ms = interval.as_millis() as u64, "Starting watch");
            watch_dashboard(&db, client, interval, !no_record, config.history_keep).await?;
        }

        Commands::Follow { state } => {
            let (_, client) = auth::authorized_client(&db, client).await?;
            let want = matches!(state, Switch::On);

            let poller = dashboard_poller(&client, Duration::ZERO);
            let mut rx = poller.subscribe();
            let summary = first_summary(&mut rx).await?;

            if summary.is_active == want {
                println!("{}", Notice::info(format!("Follow trading already {}", if want { "on" } else { "off" })));
                return Ok(());
            }

            let notice = actions::toggle_follow(&client, &summary, &poller.handle()).await?;
            println!("{}", notice);

            let state = settle(&mut rx, TOGGLE_REFRESH_DELAY).await?;
            print!("{}", view::render_dashboard(&state));
        }

        Commands::Trigger {
            symbol,
            size,
            price,
            master_user_id,
        } => {
            let (_, client) = auth::authorized_client(&db, client).await?;
            let order = TriggerOrderRequest {
                master_user_id,
                symbol,
                position_size: size,
                entry_price: price,
                ..Default::default()
            };

            let poller = dashboard_poller(&client, Duration::ZERO);
            let mut rx = poller.subscribe();
            first_summary(&mut rx).await?;

            let notice = actions::trigger_test_order(&client, &order, &poller.handle()).await?;
            println!("{}", notice);

            let last = TRIGGER_REFRESH_DELAYS[TRIGGER_REFRESH_DELAYS.len() - 1];
            println!("Waiting {}ms for followers to react...", last.as_millis());
            let state = settle(&mut rx, last).await?;
            print!("{}", view::render_dashboard(&state));
        }

        Commands::Clients { search, status } => {
            let (_, client) = auth::authorized_client(&db, client).await?;
            let table = ClientTable::load(&client).await?;

            match client.emergency_stop_status().await {
                Ok(stop) => println!("{}\n", view::render_emergency(&stop)),
                Err(e) => warn!(error = %e, "Could not read emergency stop status"),
            }
            print!("{}", view::render_clients(&table.filter(&search, status), table.counts(), chrono::Utc::now()));
        }

        Commands::ClientRatio { relation_id, ratio } => {
            let (_, client) = auth::authorized_client(&db, client).await?;
            let mut table = ClientTable::load(&client).await?;

            let parsed = table.edit_copy_ratio(relation_id, &ratio)?;
            if ratio.trim().parse::<f64>().is_err() {
                println!("{}", Notice::warning(format!("Interpreting '{}' as {}", ratio, parsed)));
            }

            match table.commit_copy_ratio(&client, relation_id).await {
                Ok(Some(confirmed)) => {
                    println!(
                        "{}",
                        Notice::success(format!(
                            "Relation {} copy ratio is now {}",
                            confirmed.relation_id, confirmed.copy_ratio
                        ))
                    );
                    show_relation(&client, &mut table, relation_id).await;
                }
                Ok(None) => println!("{}", Notice::info("Nothing to update")),
                Err(e) => {
                    println!("{}", Notice::error(format!("Update failed: {}", e)));
                    return Err(e.into());
                }
            }
        }

        Commands::ClientStatus { relation_id, status } => {
            let (_, client) = auth::authorized_client(&db, client).await?;
            let mut table = ClientTable::load(&client).await?;

            match table.set_status(&client, relation_id, status).await {
                Ok(confirmed) => {
                    println!(
                        "{}",
                        Notice::success(format!(
                            "Relation {} is now {}",
                            confirmed.relation_id, confirmed.status
                        ))
                    );
                    show_relation(&client, &mut table, relation_id).await;
                }
                Err(e) => {
                    println!("{}", Notice::error(format!("Update failed: {}", e)));
                    return Err(e.into());
                }
            }
        }

        Commands::EmergencyStop { action, yes } => {
            let (_, client) = auth::authorized_client(&db, client).await?;
            let confirm: &dyn Confirm = if yes { &AssumeYes } else { &StdinConfirm };

            let stop_all = match action {
                EmergencyCommand::Status => {
                    let status = client.emergency_stop_status().await?;
                    println!("{}", view::render_emergency(&status));
                    return Ok(());
                }
                EmergencyCommand::On => true,
                EmergencyCommand::Off => false,
            };

            match actions::set_emergency_stop(&client, stop_all, confirm).await? {
                EmergencyOutcome::Declined => println!("{}", Notice::info("Cancelled, nothing sent")),
                EmergencyOutcome::Applied(status) => println!("{}", view::render_emergency(&status)),
            }
        }

        Commands::History { limit } => {
            let points = db.recent_snapshots(limit).await?;
            print!("{}", view::render_history(&points));
        }

        Commands::Config => {
            let session = db.load_session().await?;

            println!("\n=== copydesk Configuration ===\n");
            println!("Backend:");
            println!("  API URL:          {}", config.api_url);
            println!("  Request Timeout:  {}s", config.timeout_secs);
            println!("\nDashboard:");
            println!("  Poll Interval:    {}ms", config.poll_interval_ms);
            println!("  History Kept:     {} snapshots", config.history_keep);
            println!("\nStorage:");
            println!("  Database:         {}", config.database);
            println!(
                "  Session:          {}",
                session.map(|s| s.username).unwrap_or_else(|| "none".to_string())
            );
        }
    }

    Ok(())
}

/// Re-read the client list and print one relation.
async fn show_relation(client: &ApiClient, table: &mut ClientTable, relation_id: i64) {
    match client.clients().await {
        Ok(clients) => table.replace(clients),
        Err(e) => warn!(error = %e, "Could not reload clients, showing last known values"),
    }
    if let Some(row) = table.row(relation_id) {
        print!("\n{}", view::render_clients(&[row], table.counts(), chrono::Utc::now()));
    }
}

/// Poller over the dashboard summary endpoint.
fn dashboard_poller(client: &ApiClient, interval: Duration) -> Poller<DashboardSummary> {
    let client = client.clone();
    Poller::spawn(
        "dashboard",
        move || {
            let client = client.clone();
            async move { client.dashboard_summary().await }
        },
        interval,
    )
}

/// Wait for the first fetch to finish and return its data.
async fn first_summary(rx: &mut watch::Receiver<PollState<DashboardSummary>>) -> Result<DashboardSummary> {
    let state = rx
        .wait_for(|s| s.fetches >= 1 && !s.loading)
        .await
        .context("Dashboard poller stopped")?
        .clone();

    match (state.data, state.error) {
        (Some(summary), _) => Ok(summary),
        (None, Some(e)) => Err(anyhow!("Failed to load dashboard: {}", e)),
        (None, None) => Err(anyhow!("Dashboard returned no data")),
    }
}

/// Wait past a scheduled refresh and return the settled state.
async fn settle(
    rx: &mut watch::Receiver<PollState<DashboardSummary>>,
    after: Duration,
) -> Result<PollState<DashboardSummary>> {
    tokio::time::sleep(after + Duration::from_millis(200)).await;
    let state = rx
        .wait_for(|s| !s.loading)
        .await
        .context("Dashboard poller stopped")?
        .clone();
    Ok(state)
}

/// Interactive dashboard loop.
async fn watch_dashboard(
    db: &Database,
    client: ApiClient,
    interval: Duration,
    record: bool,
    history_keep: u32,
) -> Result<()> {
    let mut poller = dashboard_poller(&client, interval);
    let handle = poller.handle();
    let mut rx = poller.subscribe();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut last_updated = None;

    println!("Watching dashboard. Enter: refresh, t: toggle follow, q: quit, Ctrl+C: stop.\n");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nStopping...");
                break;
            }

            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = rx.borrow_and_update().clone();
                if state.loading {
                    continue;
                }

                if state.updated_at != last_updated {
                    last_updated = state.updated_at;
                    if let (true, Some(summary)) = (record, &state.data) {
                        if let Err(e) = db.record_snapshot_capped(summary, history_keep).await {
                            warn!(error = %e, "Failed to record snapshot");
                        }
                    }
                }

                print!("\x1B[2J\x1B[H{}", view::render_dashboard(&state));
                let _ = std::io::stdout().flush();
            }

            line = lines.next_line(), if stdin_open => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) | Err(_) => {
                        stdin_open = false;
                        continue;
                    }
                };

                match line.trim() {
                    "" | "r" => {
                        if handle.refresh().await == RefreshOutcome::Skipped {
                            println!("{}", Notice::info("Refresh already in progress"));
                        }
                    }
                    "t" => match handle.snapshot().data {
                        Some(summary) => match actions::toggle_follow(&client, &summary, &handle).await {
                            Ok(notice) => println!("{}", notice),
                            Err(e) => println!("{}", Notice::error(format!("Toggle failed: {}", e))),
                        },
                        None => println!("{}", Notice::warning("Dashboard not loaded yet")),
                    },
                    "q" => break,
                    other => println!("{}", Notice::warning(format!("Unknown command '{}'", other))),
                }
            }
        }
    }

    poller.stop().await;
    Ok(())
}

/// Read one line from the terminal.
fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    std::io::stdout().flush()?;

    let mut value = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut value)
        .context("Failed to read from terminal")?;
    Ok(value.trim_end_matches(['\r', '\n']).to_string())
}
