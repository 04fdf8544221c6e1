// src/main.rs

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use punchboard::activity_log::ActivityLog;
use punchboard::board_client::{BoardApi, BoardClient};
use punchboard::engine::ReconciliationEngine;
use punchboard::geo::{acquire_location, FixedPosition, GeolocationSource, Unsupported};
use punchboard::mapping::{ColumnMapping, MappingStore, DEFAULT_CONFIG_DIR, DEFAULT_NAMESPACE};
use punchboard::model::{AttendanceEvent, EntryAction, GeoPoint};

const API_URL_VAR: &str = "PUNCHBOARD_API_URL";
const API_TOKEN_VAR: &str = "PUNCHBOARD_API_TOKEN";

#[derive(Parser)]
#[command(
    name = "punchboard",
    about = "Record daily employee Login/Logout events on a remote board, one record per employee per day"
)]
struct Cli {
    /// Directory holding the column-mapping blob.
    #[arg(long, default_value = DEFAULT_CONFIG_DIR, global = true)]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct SubmitArgs {
    #[arg(long)]
    employee_id: String,

    #[arg(long, default_value = "")]
    employee_name: String,

    /// Latitude of the current position; requires --lng.
    #[arg(long, requires = "lng")]
    lat: Option<f64>,

    /// Longitude of the current position; requires --lat.
    #[arg(long, requires = "lat")]
    lng: Option<f64>,

    /// Give up on location acquisition after this many seconds.
    #[arg(long, default_value_t = 10)]
    location_timeout_secs: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Record a Login for today.
    Login(SubmitArgs),

    /// Record a Logout for today.
    Logout(SubmitArgs),

    /// Show whether Login/Logout are already recorded today.
    Status {
        #[arg(long)]
        employee_id: String,
    },

    /// Write the board/column mapping used by all other commands.
    Configure {
        #[arg(long)]
        board_id: String,
        #[arg(long)]
        employee_id_column: String,
        #[arg(long)]
        employee_name_column: String,
        #[arg(long)]
        date_column: String,
        #[arg(long)]
        login_time_column: String,
        #[arg(long)]
        logout_time_column: String,
        #[arg(long)]
        entry_type_column: String,
        #[arg(long)]
        location_column: String,
        #[arg(long)]
        logout_location_column: String,
    },

    /// Print the stored mapping, if any.
    ShowConfig,

    /// List boards visible to the session (mapping discovery).
    Boards {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// List the columns of one board (mapping discovery).
    Columns {
        #[arg(long)]
        board_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let store = MappingStore::new(&cli.config_dir, DEFAULT_NAMESPACE);

    match cli.command {
        Command::Login(args) => record_action(&store, EntryAction::Login, args).await,
        Command::Logout(args) => record_action(&store, EntryAction::Logout, args).await,
        Command::Status { employee_id } => show_status(&store, &employee_id).await,
        Command::Configure {
            board_id,
            employee_id_column,
            employee_name_column,
            date_column,
            login_time_column,
            logout_time_column,
            entry_type_column,
            location_column,
            logout_location_column,
        } => {
            let mapping = ColumnMapping {
                board_id,
                employee_id: employee_id_column,
                employee_name: employee_name_column,
                date: date_column,
                login_time: login_time_column,
                logout_time: logout_time_column,
                entry_type: entry_type_column,
                location: location_column,
                logout_location: logout_location_column,
            };
            store.save(&mapping)?;
            println!("Configuration saved to {:?}.", store.blob_path());
            Ok(())
        }
        Command::ShowConfig => {
            match store.load()? {
                Some(mapping) => println!("{}", serde_json::to_string_pretty(&mapping)?),
                None => println!("Not configured. Run `punchboard configure` first."),
            }
            Ok(())
        }
        Command::Boards { limit } => {
            let client = board_client_from_env()?;
            for board in client.list_boards(limit).await? {
                println!("{}\t{}", board.id, board.name);
            }
            Ok(())
        }
        Command::Columns { board_id } => {
            let client = board_client_from_env()?;
            for column in client.list_columns(&board_id).await? {
                println!("{}\t{} ({})", column.id, column.title, column.type_);
            }
            Ok(())
        }
    }
}

fn board_client_from_env() -> Result<BoardClient> {
    let endpoint = env::var(API_URL_VAR).with_context(|| format!("{} must be set", API_URL_VAR))?;
    let token =
        env::var(API_TOKEN_VAR).with_context(|| format!("{} must be set", API_TOKEN_VAR))?;
    Ok(BoardClient::new(&endpoint, token)?)
}

fn load_engine(store: &MappingStore) -> Result<(ReconciliationEngine, ActivityLog)> {
    let mapping = store.load()?;
    let api: Arc<dyn BoardApi> = Arc::new(board_client_from_env()?);
    let log = ActivityLog::new();
    Ok((ReconciliationEngine::new(api, mapping, log.clone()), log))
}

async fn record_action(store: &MappingStore, action: EntryAction, args: SubmitArgs) -> Result<()> {
    let (engine, log) = load_engine(store)?;
    if !engine.is_configured() {
        anyhow::bail!("column mapping is not configured");
    }

    let source: Box<dyn GeolocationSource> = match (args.lat, args.lng) {
        (Some(lat), Some(lng)) => Box::new(FixedPosition(GeoPoint { lat, lng })),
        _ => Box::new(Unsupported),
    };
    let location = acquire_location(
        source.as_ref(),
        Duration::from_secs(args.location_timeout_secs),
    )
    .await;

    let now = Local::now();
    let event = AttendanceEvent {
        employee_id: args.employee_id.clone(),
        employee_name: args.employee_name,
        date: now.date_naive(),
        time: now.time(),
        action,
        location,
    };

    info!(
        "Submitting {} for employee '{}' on {}",
        action,
        event.employee_id,
        event.date
    );
    let ok = engine.submit(&event).await;

    if ok {
        let flags = engine.derive_state(&args.employee_id, now.date_naive()).await;
        println!(
            "{} recorded for employee '{}'. Login recorded today: {}. Logout recorded today: {}.",
            action, args.employee_id, flags.login_disabled, flags.logout_disabled
        );
    }

    print_activity(&log);
    if !ok {
        anyhow::bail!("failed to record {} for employee '{}'", action, args.employee_id);
    }
    Ok(())
}

async fn show_status(store: &MappingStore, employee_id: &str) -> Result<()> {
    let (engine, log) = load_engine(store)?;
    if !engine.is_configured() {
        anyhow::bail!("column mapping is not configured");
    }

    let today = Local::now().date_naive();
    let flags = engine.derive_state(employee_id, today).await;
    println!(
        "Employee '{}' on {}: login recorded: {}, logout recorded: {}",
        employee_id, today, flags.login_disabled, flags.logout_disabled
    );

    print_activity(&log);
    Ok(())
}

fn print_activity(log: &ActivityLog) {
    for entry in log.snapshot() {
        println!("{}", entry);
    }
}
