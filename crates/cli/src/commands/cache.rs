//! `escapist cache`: inspect cached directory results.

use escapist_core::cache::CacheStore;
use escapist_tools::DirectorySearchTool;

use super::CliResult;

pub async fn age(region: &str) -> CliResult {
    let config = super::load_config()?;
    let cache = super::file_cache(&config);
    let key = DirectorySearchTool::cache_key(region);

    match cache.age(&key).await? {
        Some(age) => {
            let days = age.as_secs_f64() / 86_400.0;
            let state = if age < cache.ttl() { "fresh" } else { "expired" };
            println!("{key}: {days:.1} day(s) old ({state})");
        }
        None => println!("{key}: not cached"),
    }
    Ok(())
}

pub async fn show(region: &str) -> CliResult {
    let config = super::load_config()?;
    let cache = super::file_cache(&config);
    let key = DirectorySearchTool::cache_key(region);

    let Some(entry) = cache.entry(&key).await? else {
        println!("{key}: not cached ({})", cache.path_for(&key).display());
        return Ok(());
    };

    eprintln!("{key}: created {}", entry.created_at.to_rfc3339());
    println!("{}", serde_json::to_string_pretty(&entry.payload)?);
    Ok(())
}
