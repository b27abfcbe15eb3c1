//! `escapist availability`: check one room's booking slots.

use chrono::NaiveDate;

use super::CliResult;

pub async fn run(url: &str, room: &str, date: NaiveDate) -> CliResult {
    let config = super::load_config()?;
    if !super::check_api_key(&config) {
        return Ok(());
    }

    println!("Checking availability for: {room}");
    println!("URL: {url}");
    println!("Target date: {date}");
    println!("{}", "-".repeat(50));

    let reservationist = super::reservationist(&config, super::provider(&config)?);
    let record = reservationist
        .check_availability(url, room, &date.to_string())
        .await?;
    println!("{}", record.render());
    Ok(())
}
