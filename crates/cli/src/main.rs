//! Escapist CLI: the main entry point.
//!
//! Commands:
//! - `plan`          Plan a multi-day trip and save the itinerary
//! - `recommend`     Ask the guide for rooms in a region
//! - `availability`  Ask the reservationist for one room's slots
//! - `search`        Run the directory search directly
//! - `cache`         Inspect cached directory results
//! - `doctor`        Diagnose configuration

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "escapist",
    about = "Escapist: plan multi-day escape room trips",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan a trip: recommendations, availability checks, itinerary
    Plan {
        /// City or region, e.g. "Boston"
        region: String,

        /// First day of the trip (YYYY-MM-DD)
        #[arg(short, long)]
        start: NaiveDate,

        /// Trip length in days
        #[arg(short, long)]
        days: Option<u32>,

        /// Number of people
        #[arg(short, long)]
        group_size: Option<u32>,

        /// Themes, difficulty, budget...
        #[arg(short, long)]
        preferences: Option<String>,

        /// Where to write the itinerary
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Print only, don't save
        #[arg(long)]
        no_save: bool,
    },

    /// Get escape room recommendations for a region
    Recommend {
        region: String,

        #[arg(short, long)]
        preferences: Option<String>,

        /// Also extract the recommended rooms and print them as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check booking availability for one room
    Availability {
        /// Venue website
        url: String,

        /// Room name as listed by the venue
        room: String,

        /// Target date (YYYY-MM-DD)
        date: NaiveDate,
    },

    /// Search the directory for a region and print the listings
    Search { region: String },

    /// Inspect the listing cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Diagnose configuration
    Doctor,
}

#[derive(Subcommand)]
enum CacheAction {
    /// How old the cached listings for a region are
    Age { region: String },

    /// Print the cached listings for a region
    Show { region: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Plan {
            region,
            start,
            days,
            group_size,
            preferences,
            output_dir,
            no_save,
        } => {
            commands::plan::run(commands::plan::PlanArgs {
                region,
                start,
                days,
                group_size,
                preferences,
                output_dir,
                save: !no_save,
            })
            .await?
        }
        Commands::Recommend {
            region,
            preferences,
            json,
        } => commands::recommend::run(&region, preferences.as_deref(), json).await?,
        Commands::Availability { url, room, date } => {
            commands::availability::run(&url, &room, date).await?
        }
        Commands::Search { region } => commands::search::run(&region).await?,
        Commands::Cache { action } => match action {
            CacheAction::Age { region } => commands::cache::age(&region).await?,
            CacheAction::Show { region } => commands::cache::show(&region).await?,
        },
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
