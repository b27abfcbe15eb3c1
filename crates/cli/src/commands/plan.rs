//! `escapist plan`: run the planner and save the itinerary.

use chrono::NaiveDate;
use escapist_agent::{LoopSettings, Planner, TripRequest, save_itinerary};
use std::path::PathBuf;
use std::sync::Arc;

use super::CliResult;

pub struct PlanArgs {
    pub region: String,
    pub start: NaiveDate,
    pub days: Option<u32>,
    pub group_size: Option<u32>,
    pub preferences: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub save: bool,
}

pub async fn run(args: PlanArgs) -> CliResult {
    let config = super::load_config()?;
    if !super::check_api_key(&config) {
        return Ok(());
    }

    let mut request = TripRequest::new(&args.region, args.start)
        .with_num_days(args.days.unwrap_or(config.planner.num_days))
        .with_group_size(args.group_size.unwrap_or(config.planner.group_size));
    if let Some(p) = args.preferences {
        request = request.with_preferences(p);
    }

    let provider = super::provider(&config)?;
    let guide = Arc::new(super::guide(&config, provider.clone())?);
    let reservationist = Arc::new(super::reservationist(&config, provider.clone()));
    let planner = Planner::new(provider, LoopSettings::from_config(&config), guide, reservationist);

    println!(
        "Planning {}-day escape room trip in {}...",
        request.num_days, request.region
    );
    println!(
        "Dates: {} to {}, group size: {}",
        request.start_date,
        request.end_date(),
        request.group_size
    );
    println!("{}", "-".repeat(50));

    let outcome = planner.plan(&request).await?;
    println!("{}", outcome.text);

    if args.save && !outcome.retry.rate_limited {
        let dir = args.output_dir.unwrap_or(config.planner.itineraries_dir);
        let path = save_itinerary(&dir, &outcome.text, &request.region, request.start_date)?;
        println!("{}", "-".repeat(50));
        println!("Itinerary saved to: {}", path.display());
    }

    Ok(())
}
