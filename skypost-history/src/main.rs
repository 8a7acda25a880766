use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use clap::Parser;
use libskypost::service::history::{HistoryQuery, HistoryService};
use libskypost::{Config, Database, PublishAttempt, PublishStatus};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "skypost-history")]
#[command(version, about = "Query the local log of Bluesky publish attempts")]
#[command(long_about = r#"Query the local log of Bluesky publish attempts.

Every publish leaves one row: sent (record created), failed (the server
rejected the record or the network failed) or aborted (no write call was
made, e.g. the session could not be refreshed).

EXAMPLES:
    # Last 20 attempts (default)
    skypost-history

    # Everything that did not go out
    skypost-history --status failed
    skypost-history --status aborted

    # One post
    skypost-history --post 5

    # Since a date
    skypost-history --since "2024-03-01"

    # Totals
    skypost-history --stats

    # JSON for scripting
    skypost-history --format json | jq -r '.[] | .record_uri'

OUTPUT FORMATS:
    text  - Human-readable (default)
    json  - JSON array
    jsonl - JSON lines, one object per line
    csv   - CSV with headers

EXIT CODES:
    0 - Success (including empty results)
    1 - Error (database not found, bad filter, query failed)
"#)]
struct Args {
    /// Only attempts for this post id
    #[arg(short, long, value_name = "POST_ID")]
    post: Option<String>,

    /// Only attempts with this outcome (sent, failed, aborted)
    #[arg(short, long, value_name = "STATUS")]
    status: Option<String>,

    /// Attempts since this date (Unix timestamp, YYYY-MM-DD, or RFC 3339)
    #[arg(long, value_name = "DATE")]
    since: Option<String>,

    /// Maximum number of attempts to return
    #[arg(short, long, default_value = "20", value_name = "N")]
    limit: usize,

    /// Print totals per outcome instead of individual attempts
    #[arg(long)]
    stats: bool,

    /// Output format
    #[arg(short, long, default_value = "text", value_name = "FORMAT")]
    #[arg(value_parser = ["text", "json", "jsonl", "csv"])]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Parse date string to a UTC timestamp
fn parse_date(date_str: &str) -> Result<DateTime<Utc>> {
    if let Ok(timestamp) = date_str.parse::<i64>() {
        return Utc
            .timestamp_opt(timestamp, 0)
            .single()
            .with_context(|| format!("Timestamp out of range: {}", timestamp));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(date_str) {
        return Ok(dt.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").with_context(|| {
        format!(
            "Invalid date format: {}. Use Unix timestamp, YYYY-MM-DD or YYYY-MM-DDTHH:MM:SSZ",
            date_str
        )
    })?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .with_context(|| format!("Invalid date: {}", date_str))?;
    Ok(midnight.and_utc())
}

fn format_timestamp(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn print_attempts(attempts: &[PublishAttempt], format: &str) -> Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(attempts)?),
        "jsonl" => {
            for attempt in attempts {
                println!("{}", serde_json::to_string(attempt)?);
            }
        }
        "csv" => {
            println!("id,post_id,status,attempted_at,record_uri,error");
            for attempt in attempts {
                println!(
                    "{},{},{},{},{},{}",
                    attempt.id.unwrap_or_default(),
                    csv_field(&attempt.post_id),
                    attempt.status,
                    attempt.attempted_at,
                    csv_field(attempt.record_uri.as_deref().unwrap_or("")),
                    csv_field(attempt.error_message.as_deref().unwrap_or("")),
                );
            }
        }
        _ => {
            for attempt in attempts {
                let symbol = match attempt.status {
                    PublishStatus::Sent => "✓",
                    PublishStatus::Failed => "✗",
                    PublishStatus::Aborted => "-",
                };
                let detail = attempt
                    .record_uri
                    .as_deref()
                    .or(attempt.error_message.as_deref())
                    .unwrap_or("");
                println!(
                    "{} | {} {} {} | {}",
                    format_timestamp(attempt.attempted_at),
                    symbol,
                    attempt.status,
                    attempt.post_id,
                    detail
                );
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    libskypost::logging::init("warn", args.verbose);
    tracing::debug!("skypost-history started with args: {:?}", args);

    let config = Config::load().context("Failed to load configuration")?;

    let db_path = shellexpand::tilde(&config.database.path).to_string();
    if !std::path::Path::new(&db_path).exists() {
        eprintln!("Error: Database not found at {}", db_path);
        eprintln!("Nothing has been published yet. Try: skypost-post <POST_ID>");
        std::process::exit(1);
    }

    let db = Database::new(&db_path)
        .await
        .context("Failed to open history database")?;
    let history = HistoryService::new(Arc::new(db));

    if args.stats {
        let stats = history.stats().await.context("Failed to query history")?;
        match args.format.as_str() {
            "json" | "jsonl" => println!("{}", serde_json::to_string(&stats)?),
            "csv" => {
                println!("total,sent,failed,aborted,success_rate");
                println!(
                    "{},{},{},{},{:.3}",
                    stats.total, stats.sent, stats.failed, stats.aborted, stats.success_rate
                );
            }
            _ => {
                println!("total:   {}", stats.total);
                println!("sent:    {}", stats.sent);
                println!("failed:  {}", stats.failed);
                println!("aborted: {}", stats.aborted);
                println!("success: {:.1}%", stats.success_rate * 100.0);
            }
        }
        return Ok(());
    }

    let status = args
        .status
        .as_deref()
        .map(str::parse::<PublishStatus>)
        .transpose()
        .map_err(anyhow::Error::msg)?;

    let since = args.since.as_deref().map(parse_date).transpose()?;

    let attempts = history
        .list_attempts(HistoryQuery {
            post_id: args.post,
            status,
            since,
            limit: Some(args.limit),
        })
        .await
        .context("Failed to query history")?;

    print_attempts(&attempts, &args.format)
}
