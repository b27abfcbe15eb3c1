//! `escapist search`: run the directory search without a model.

use super::CliResult;

pub async fn run(region: &str) -> CliResult {
    let config = super::load_config()?;
    let tool = super::search_tool(&config)?;

    let listings = tool.search(region).await?;
    println!("{}", serde_json::to_string_pretty(&listings)?);
    eprintln!("{} listing(s) for {region}", listings.len());
    Ok(())
}
