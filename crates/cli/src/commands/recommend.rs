//! `escapist recommend`: ask the guide for rooms in a region.

use super::CliResult;

pub async fn run(region: &str, preferences: Option<&str>, json: bool) -> CliResult {
    let config = super::load_config()?;
    if !super::check_api_key(&config) {
        return Ok(());
    }

    let guide = super::guide(&config, super::provider(&config)?)?;
    if !json {
        let text = guide.recommend(region, preferences).await?;
        println!("\nRecommendations:\n{text}");
        return Ok(());
    }

    let report = guide.recommend_structured(region, preferences).await?;
    if report.rate_limited {
        eprintln!("{}", report.text);
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(&report.rooms)?);
    Ok(())
}
