//! `escapist doctor`: diagnose configuration.

use escapist_config::AppConfig;

use super::CliResult;

pub async fn run() -> CliResult {
    println!("Escapist Doctor");
    println!("===============\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  ℹ️  No config file at {}, using defaults", config_path.display());
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Configuration valid");
            config
        }
        Err(e) => {
            println!("  ❌ Configuration invalid: {e}");
            println!("\n  ⚠️  1 issue found. See above for details.");
            return Ok(());
        }
    };

    if config.has_api_key() {
        println!("  ✅ API key configured");
    } else {
        println!("  ⚠️  No API key: set ANTHROPIC_API_KEY or add api_key to config.toml");
        issues += 1;
    }

    println!("  ✅ Model: {}", config.model);

    let cache_dir = &config.cache.dir;
    if cache_dir.is_dir() {
        println!("  ✅ Cache directory: {}", cache_dir.display());
    } else {
        println!(
            "  ℹ️  Cache directory {} will be created on first search",
            cache_dir.display()
        );
    }

    let browser = format!("{} {}", config.browser.command, config.browser.args.join(" "));
    println!("  ✅ Browser host: {browser}");

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
