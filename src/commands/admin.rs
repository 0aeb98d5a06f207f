use anyhow::{bail, Context, Result};
use reqwest::Client;
use std::path::Path;

use blockwatch::config::Config;
use blockwatch::models::{Country, Target};
use blockwatch::notifications::format_registry;
use blockwatch::probe::SiteProber;
use blockwatch::storage::{SqliteStore, Store};

fn open_store(config: &Config) -> Result<SqliteStore> {
    SqliteStore::open(&config.database.sqlite_path).with_context(|| {
        format!(
            "Failed to open database: {}",
            config.database.sqlite_path.display()
        )
    })
}

/// Add one target, vetting it over a direct connection unless `force` is set
pub async fn add(config: Config, url: String, force: bool) -> Result<()> {
    let url = Target::normalize_url(&url)?;

    if !force {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .gzip(true)
            .deflate(true)
            .build()
            .context("Failed to build HTTP client")?;
        let prober = SiteProber::with_timeout(config.probe_timeout());

        let reachable = prober
            .check_url(&client, &url)
            .await
            .with_context(|| format!("Direct check of {url} failed"))?;
        if !reachable {
            bail!("{url} is not reachable even without a proxy, not adding it");
        }
    }

    let store = open_store(&config)?;
    match store.add_target(&url)? {
        Some(target) => println!("Added {} (id {})", target.url, target.id),
        None => println!("Already monitored: {url}"),
    }

    Ok(())
}

/// Bulk insert targets from a file, one URL per line
pub async fn seed(config: Config, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read seed file: {}", file.display()))?;

    let store = open_store(&config)?;
    let mut added = 0;
    let mut skipped = 0;

    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Err(e) = url::Url::parse(line) {
            tracing::warn!(url = %line, error = %e, "Skipping invalid URL");
            skipped += 1;
            continue;
        }

        match store.add_target(line) {
            Ok(Some(target)) => {
                tracing::info!(url = %target.url, id = target.id, "Target added");
                added += 1;
            }
            Ok(None) => {
                tracing::info!(url = %line, "Target already monitored");
                skipped += 1;
            }
            Err(e) => {
                tracing::error!(url = %line, error = %e, "Could not add target");
                skipped += 1;
            }
        }
    }

    println!("Seed finished: {added} added, {skipped} skipped");
    Ok(())
}

/// Soft-delete a target
pub fn remove(config: Config, url: String) -> Result<()> {
    let store = open_store(&config)?;
    let url = url.trim();

    // Targets added through `add` carry the normalized form
    let normalized = Target::normalize_url(url).ok();
    let removed = store.remove_target(url)?
        || match normalized.as_deref() {
            Some(n) if n != url => store.remove_target(n)?,
            _ => false,
        };

    if removed {
        println!("Removed {url}");
    } else {
        println!("Not monitored: {url}");
    }
    Ok(())
}

/// Register a SOCKS5 proxy for a country
pub fn add_proxy(
    config: Config,
    country: Country,
    addr: String,
    username: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let store = open_store(&config)?;
    let record = store.add_proxy(&country, &addr, username.as_deref(), password.as_deref())?;

    println!(
        "Added proxy {} for {} (id {})",
        record.addr, record.country, record.id
    );
    Ok(())
}

/// Print the registry listing of one country
pub fn report(config: Config, country: Country) -> Result<()> {
    let store = open_store(&config)?;
    let rows = store.list_outcomes(&country)?;
    print!("{}", format_registry(&country, &rows));
    Ok(())
}

/// Flip the subscription flag of a chat
pub fn set_subscription(config: Config, chat_id: i64, active: bool) -> Result<()> {
    let store = open_store(&config)?;
    store.set_subscription(chat_id, active)?;

    if active {
        println!("Chat {chat_id} subscribed");
    } else {
        println!("Chat {chat_id} unsubscribed");
    }
    Ok(())
}
