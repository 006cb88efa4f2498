use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use itinerary_agent::{HttpBackend, ItineraryManager, ManagerOptions};
use itinerary_core::state::StopTransition;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "itinerary-agent", version, about = "Driver client for the itinerary daemon")]
struct Cli {
    /// Daemon base URL, e.g. http://127.0.0.1:8080
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    daemon_url: String,

    /// Client identifier (stable string). If omitted, a random UUID is used.
    #[arg(long)]
    client_id: Option<String>,

    /// Vehicle to request. If omitted, any free vehicle is assigned.
    #[arg(long)]
    vehicle_id: Option<String>,

    /// Quiet period before a reorder is sent, in milliseconds.
    #[arg(long, default_value_t = 2000)]
    reorder_quiet_ms: u64,

    /// Request timeout in seconds.
    #[arg(long, default_value_t = 10)]
    timeout_seconds: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the itinerary.
    Show,
    /// Move the active stop along the state machine.
    Advance {
        #[arg(value_enum)]
        transition: Transition,
        /// Only act if this stop is the active one.
        #[arg(long)]
        stop_id: Option<String>,
    },
    /// Record outcomes for tasks.
    Outcome {
        task_ids: Vec<String>,
        /// Record FAILED instead of SUCCEEDED.
        #[arg(long, default_value_t = false)]
        failed: bool,
    },
    /// Send a new visit order; stops left out are completed.
    Reorder { stop_ids: Vec<String> },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Transition {
    Begin,
    Arrive,
    Complete,
    Cancel,
}

impl From<Transition> for StopTransition {
    fn from(t: Transition) -> Self {
        match t {
            Transition::Begin => StopTransition::BeginNavigation,
            Transition::Arrive => StopTransition::Arrive,
            Transition::Complete => StopTransition::Complete,
            Transition::Cancel => StopTransition::CancelNavigation,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let client_id = cli
        .client_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let backend = HttpBackend::new(&cli.daemon_url, Duration::from_secs(cli.timeout_seconds))
        .context("building http client")?;
    let options = ManagerOptions {
        reorder_quiet_period: Duration::from_millis(cli.reorder_quiet_ms),
    };
    let manager = ItineraryManager::start(
        Arc::new(backend),
        client_id,
        cli.vehicle_id.as_deref(),
        options,
    )
    .await
    .context("starting delivery session")?;
    info!(client_id = %manager.client_id(), vehicle_id = %manager.vehicle_id(), daemon = %cli.daemon_url, "session ready");

    match cli.command {
        Command::Show => {}
        Command::Advance {
            transition,
            stop_id,
        } => {
            let changed = match stop_id {
                Some(id) => manager.advance_stop_at(&id, transition.into()).await?,
                None => manager.advance_stop(transition.into()).await?,
            };
            if changed.is_none() {
                println!("no stop changed");
            }
        }
        Command::Outcome { task_ids, failed } => {
            let failures = manager.record_task_outcomes(&task_ids, !failed).await;
            if !failures.is_empty() {
                println!("failed tasks: {}", failures.join(", "));
            }
        }
        Command::Reorder { stop_ids } => {
            manager
                .reorder_or_complete_stops(&stop_ids)
                .await
                .context("reordering stops")?;
        }
    }

    print_itinerary(&manager).await;
    Ok(())
}

async fn print_itinerary(manager: &ItineraryManager) {
    let active = manager.active_stop().await.map(|s| s.stop_id);
    println!("vehicle {}", manager.vehicle_id());
    for stop in manager.stops().await {
        let marker = if active.as_deref() == Some(stop.stop_id.as_str()) {
            '>'
        } else {
            ' '
        };
        let title = stop.waypoint.description.as_deref().unwrap_or("");
        println!("{marker} {:<12} {:<10} {title}", stop.stop_id, stop.state.to_string());
        for task in &stop.tasks {
            println!("      {} {} {}", task.task_id, task.task_type, task.task_outcome);
        }
    }
    println!("remaining: {}", manager.remaining_stop_ids().await.join(", "));
}
