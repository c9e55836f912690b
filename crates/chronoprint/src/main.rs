//! ChronoPrint: recurring job scheduler
//!
//! Main binary with subcommands:
//! - `daemon`: Load schedules and fire them until interrupted
//! - `add`, `edit`, `list`, `logs`, `enable`, `disable`, `delete`: Manage schedules

use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chronoprint_scheduler::{DayOfWeek, Recurrence, ScheduleEdit, StartTime};

mod commands;
mod daemon;

#[derive(Parser)]
#[command(name = "chronoprint")]
#[command(about = "Recurring job scheduler", long_about = None)]
struct Cli {
    /// Document store base URL
    #[arg(long, env = "CHRONOPRINT_STORE_URL")]
    store_url: String,

    /// Bearer token for the document store
    #[arg(long, env = "CHRONOPRINT_STORE_TOKEN", hide_env_values = true)]
    store_token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler loop until Ctrl-C
    Daemon {
        /// Longest pause between checks, in seconds
        #[arg(long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
        tick_interval: u64,
    },

    /// Create a schedule
    Add {
        /// Job name
        #[arg(long)]
        name: String,

        /// Recurrence kind
        #[arg(long = "type", value_enum)]
        kind: Kind,

        /// Start time of day (HH:MM)
        #[arg(long, value_parser = parse_start_time)]
        start: StartTime,

        /// Minutes between runs (hourly schedules)
        #[arg(long)]
        interval: Option<u32>,

        /// Days to run on, comma-separated (weekly schedules)
        #[arg(long, value_delimiter = ',', value_parser = parse_day)]
        days: Vec<DayOfWeek>,
    },

    /// Change a schedule's name, start time or recurrence
    Edit {
        id: String,

        /// New job name
        #[arg(long)]
        name: Option<String>,

        /// New start time of day (HH:MM)
        #[arg(long, value_parser = parse_start_time)]
        start: Option<StartTime>,

        /// New recurrence kind
        #[arg(long = "type", value_enum)]
        kind: Option<Kind>,

        /// Minutes between runs (with --type hourly)
        #[arg(long, requires = "kind")]
        interval: Option<u32>,

        /// Days to run on, comma-separated (with --type weekly)
        #[arg(long, value_delimiter = ',', value_parser = parse_day, requires = "kind")]
        days: Vec<DayOfWeek>,
    },

    /// List schedules, newest first
    List,

    /// Show execution logs, newest first
    Logs {
        /// Only logs of this schedule
        #[arg(long)]
        job: Option<String>,
    },

    /// Enable a schedule
    Enable { id: String },

    /// Disable a schedule
    Disable { id: String },

    /// Delete a schedule and its logs
    Delete { id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Kind {
    Hourly,
    Daily,
    Weekly,
}

fn parse_start_time(s: &str) -> Result<StartTime, String> {
    s.parse().map_err(|e: chronoprint_scheduler::SchedulerError| e.to_string())
}

fn parse_day(s: &str) -> Result<DayOfWeek, String> {
    s.parse().map_err(|e: chronoprint_scheduler::SchedulerError| e.to_string())
}

/// Build a recurrence from the `add` flags.
fn recurrence_from_args(
    kind: Kind,
    interval: Option<u32>,
    days: Vec<DayOfWeek>,
) -> Result<Recurrence, String> {
    match kind {
        Kind::Hourly => interval
            .map(|interval_minutes| Recurrence::Hourly { interval_minutes })
            .ok_or_else(|| "--interval is required for hourly schedules".to_string()),
        Kind::Daily => Ok(Recurrence::Daily),
        Kind::Weekly if days.is_empty() => {
            Err("--days is required for weekly schedules".to_string())
        }
        Kind::Weekly => Ok(Recurrence::weekly(days)),
    }
}

/// Build an edit from the `edit` flags. At least one change is required.
fn edit_from_args(
    name: Option<String>,
    start: Option<StartTime>,
    kind: Option<Kind>,
    interval: Option<u32>,
    days: Vec<DayOfWeek>,
) -> Result<ScheduleEdit, String> {
    let edit = ScheduleEdit {
        job_name: name,
        start_time: start,
        recurrence: kind
            .map(|kind| recurrence_from_args(kind, interval, days))
            .transpose()?,
    };
    if edit.is_empty() {
        return Err("nothing to change: pass --name, --start or --type".to_string());
    }
    Ok(edit)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "chronoprint=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let store = commands::StoreArgs {
        url: cli.store_url,
        token: cli.store_token,
    };

    match cli.command {
        Commands::Daemon { tick_interval } => {
            daemon::run(&store, Duration::from_secs(tick_interval)).await
        }
        Commands::Add {
            name,
            kind,
            start,
            interval,
            days,
        } => {
            let recurrence =
                recurrence_from_args(kind, interval, days).map_err(|e| miette::miette!("{}", e))?;
            commands::add(&store, name, start, recurrence).await
        }
        Commands::Edit {
            id,
            name,
            start,
            kind,
            interval,
            days,
        } => {
            let edit = edit_from_args(name, start, kind, interval, days)
                .map_err(|e| miette::miette!("{}", e))?;
            commands::edit(&store, &id, edit).await
        }
        Commands::List => commands::list(&store).await,
        Commands::Logs { job } => commands::logs(&store, job.as_deref()).await,
        Commands::Enable { id } => commands::set_enabled(&store, &id, true).await,
        Commands::Disable { id } => commands::set_enabled(&store, &id, false).await,
        Commands::Delete { id } => commands::delete(&store, &id).await,
    }
}
