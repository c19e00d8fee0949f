//! Command-line interface for labwatch.
//!
//! This binary queries the daemon's status API.

use std::env;

use anyhow::{Context, Result, bail};

use labwatch::api_client::{
    self,
    types::{DEFAULT_EVENT_LIMIT, HistoryRange},
};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: labwatch-cli <command>");
        eprintln!();
        eprintln!("Commands:");
        eprintln!("  status       Show service health and device state");
        eprintln!("  events [N]   Show the N most recent events (default: {DEFAULT_EVENT_LIMIT})");
        eprintln!("  history [R]  Show averaged readings over 1h, 24h, 7d or 30d (default: 24h)");
        eprintln!();
        eprintln!("Environment:");
        eprintln!(
            "  LABWATCH_API_URL    API base URL (default: {})",
            api_client::DEFAULT_BASE_URL
        );
        std::process::exit(1);
    }

    let command = &args[1];

    match command.as_str() {
        "status" => cmd_status().await?,
        "events" => {
            let limit = match args.get(2) {
                Some(n) => n
                    .parse()
                    .with_context(|| format!("invalid event count: {n}"))?,
                None => DEFAULT_EVENT_LIMIT,
            };
            cmd_events(limit).await?
        }
        "history" => {
            let range = match args.get(2) {
                Some(r) => r
                    .parse()
                    .with_context(|| format!("invalid range: {r}"))?,
                None => HistoryRange::default(),
            };
            cmd_history(range).await?
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            eprintln!("Run without arguments to see usage.");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Build an API client, honoring LABWATCH_API_URL if set.
fn make_client() -> api_client::Client {
    match env::var("LABWATCH_API_URL") {
        Ok(url) => api_client::Client::with_base_url(url),
        Err(_) => api_client::Client::new(),
    }
}

/// Print service health and the last known device state.
async fn cmd_status() -> Result<()> {
    let client = make_client();
    let health = client.get_health().await?;
    if health.trim() != "OK" {
        bail!("service unhealthy: {health}");
    }
    let devices = client.get_devices().await?;

    println!("Service: OK");
    let presence = match devices.online {
        Some(true) => "online",
        Some(false) => "offline",
        None => "unknown",
    };
    println!("Device:  {presence}");

    if devices.actuators.is_empty() {
        println!("Actuators: (no reports yet)");
    } else {
        println!("Actuators:");
        for (name, state) in &devices.actuators {
            println!("  - {name}: {state}");
        }
    }

    Ok(())
}

/// Print recent audit records, oldest first.
async fn cmd_events(limit: usize) -> Result<()> {
    let client = make_client();
    let events = client.get_events(limit).await?;

    if events.is_empty() {
        println!("No events recorded.");
        return Ok(());
    }

    for event in &events {
        let details = serde_json::Value::Object(event.details.clone());
        println!(
            "{:>5}  {}  {:<18} {}",
            event.seq, event.recorded_at, event.event_type, details
        );
    }

    Ok(())
}

/// Print one line per bucket with the averaged readings.
async fn cmd_history(range: HistoryRange) -> Result<()> {
    let client = make_client();
    let buckets = client.get_history(range).await?;

    if buckets.is_empty() {
        println!("No samples in the last {range}.");
        return Ok(());
    }

    for bucket in &buckets {
        let averages: Vec<String> = bucket
            .averages
            .iter()
            .map(|(key, value)| format!("{key}={value:.1}"))
            .collect();
        println!(
            "{}  {:>5}  {}",
            bucket.time_bucket,
            bucket.samples,
            averages.join(" ")
        );
    }

    Ok(())
}
