//! skypost-post - Publish one post to Bluesky right now

use clap::Parser;
use libskypost::config::expand_path;
use libskypost::service::posting::PublishOutcome;
use libskypost::service::SkypostService;
use libskypost::{
    Config, JsonPostSource, PostSource, PublishError, Publisher, Result, SkypostError, XrpcClient,
};

#[derive(Parser, Debug)]
#[command(name = "skypost-post")]
#[command(version)]
#[command(about = "Publish one post to Bluesky right now", long_about = None)]
#[command(after_help = "\
EXIT CODES:
    0 - Record created
    1 - Publish failed (server rejected the record, network error, unknown post)
    2 - Not logged in or session refresh rejected (run skypost-creds login)
    3 - Invalid input")]
struct Cli {
    /// Post id as exported by the CMS
    post_id: String,

    /// Print the record that would be sent and exit without contacting Bluesky
    #[arg(long)]
    dry_run: bool,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    libskypost::logging::init("warn", cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let json = match cli.format.as_str() {
        "text" => false,
        "json" => true,
        other => {
            return Err(SkypostError::InvalidInput(format!(
                "Invalid format '{}'. Valid options: text, json",
                other
            )))
        }
    };

    let post_id = cli.post_id.trim();
    if post_id.is_empty() {
        return Err(SkypostError::InvalidInput(
            "Post id cannot be empty".to_string(),
        ));
    }

    let config = Config::load()?;
    tracing::debug!(
        post_id = %post_id,
        domain = %config.bluesky.normalized_domain(),
        dry_run = cli.dry_run,
        "Configuration loaded"
    );

    if cli.dry_run {
        return dry_run(&config, post_id, json).await;
    }

    let service = SkypostService::from_config(config).await?;
    let outcome = service.posting().publish_by_id(post_id).await?;
    print_outcome(&outcome, json)
}

async fn dry_run(config: &Config, post_id: &str, json: bool) -> Result<()> {
    let source = JsonPostSource::new(expand_path(&config.posts.path));
    let post = source
        .get(post_id)
        .await?
        .ok_or_else(|| PublishError::PostNotFound(post_id.to_string()))?;

    let publisher = Publisher::new(XrpcClient::new(config.bluesky.timeout())?)
        .with_max_bytes(config.bluesky.max_bytes)
        .with_link_card(config.bluesky.link_card);
    let record = publisher.build_record(&post)?;

    if json {
        println!("{}", to_json(&record)?);
    } else {
        println!("{}", record.text);
    }
    Ok(())
}

fn print_outcome(outcome: &PublishOutcome, json: bool) -> Result<()> {
    if json {
        let value = serde_json::json!({
            "post_id": outcome.post_id,
            "status": "sent",
            "record_uri": outcome.record_uri(),
            "cid": outcome.record.as_ref().map(|r| r.cid.as_str()),
        });
        println!("{}", to_json(&value)?);
    } else {
        match outcome.record_uri() {
            Some(uri) => println!("{}", uri),
            None => println!("sent {}", outcome.post_id),
        }
    }
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| SkypostError::InvalidInput(format!("Failed to encode output: {}", e)))
}
