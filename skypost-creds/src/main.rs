//! skypost-creds - Manage the stored Bluesky session
//!
//! The app password is only ever used for `login`; what gets stored is the
//! access/refresh token pair and the account DID.

use anyhow::Result;
use clap::{Parser, Subcommand};
use libskypost::config::{expand_path, Config};
use libskypost::{
    AccountCredentials, ConnectionStatus, CredentialManager, FileSessionStore, SkypostError,
    XrpcClient,
};
use std::sync::Arc;
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(name = "skypost-creds")]
#[command(version)]
#[command(about = "Manage the stored Bluesky session", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with an app password and store the session
    Login {
        /// Handle or email (default: bluesky.identifier from config)
        #[arg(long)]
        identifier: Option<String>,

        /// Read the app password from stdin (for automation/agents)
        #[arg(long)]
        stdin: bool,
    },

    /// Refresh the stored session now
    Refresh,

    /// Show whether a session is stored (never prints tokens)
    Status {
        /// Output format (text or json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Delete the stored session
    Logout {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    libskypost::logging::init("info", cli.verbose);

    if let Err(e) = run_command(cli.command).await {
        eprintln!("Error: {}", e);
        let code = e
            .downcast_ref::<SkypostError>()
            .map(SkypostError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run_command(command: Commands) -> Result<()> {
    let config = Config::load()?;

    match command {
        Commands::Login { identifier, stdin } => login(&config, identifier, stdin).await,
        Commands::Refresh => refresh(&config).await,
        Commands::Status { format } => status(&config, &format),
        Commands::Logout { force } => logout(&config, force),
    }
}

fn open_manager(config: &Config) -> Result<(CredentialManager, Arc<FileSessionStore>)> {
    let store = Arc::new(FileSessionStore::new(expand_path(&config.session.path)));
    tracing::debug!("Session file: {}", store.path().display());
    let client = XrpcClient::new(config.bluesky.timeout()).map_err(SkypostError::from)?;
    Ok((CredentialManager::new(client, store.clone()), store))
}

async fn login(config: &Config, identifier: Option<String>, use_stdin: bool) -> Result<()> {
    let identifier = identifier.unwrap_or_else(|| config.bluesky.identifier.clone());
    if identifier.trim().is_empty() {
        anyhow::bail!(
            "No identifier. Pass --identifier or set bluesky.identifier in the config file."
        );
    }

    let mut password = if use_stdin {
        use std::io::Read;
        let mut buffer = Zeroizing::new(String::new());
        std::io::stdin().read_to_string(&mut buffer)?;
        Zeroizing::new(buffer.trim().to_string())
    } else {
        if !atty::is(atty::Stream::Stdin) {
            anyhow::bail!("Not a TTY. Use --stdin flag to read the app password from stdin.");
        }
        Zeroizing::new(rpassword::prompt_password(format!(
            "App password for {}: ",
            identifier
        ))?)
    };

    if password.is_empty() {
        anyhow::bail!("App password cannot be empty");
    }

    let (manager, store) = open_manager(config)?;
    let credentials = AccountCredentials::new(
        config.bluesky.normalized_domain(),
        identifier,
        std::mem::take(&mut *password),
    );

    let session = manager.connect(credentials).await?;

    println!(
        "✓ Connected as {} (session stored in {})",
        session.actor_id,
        store.path().display()
    );
    Ok(())
}

async fn refresh(config: &Config) -> Result<()> {
    let (manager, _store) = open_manager(config)?;
    let session = manager
        .refresh_stored(&config.bluesky.normalized_domain())
        .await?;

    println!("✓ Session refreshed for {}", session.actor_id);
    Ok(())
}

fn status(config: &Config, format: &str) -> Result<()> {
    let (manager, store) = open_manager(config)?;
    let status = manager.status()?;
    let session = manager.session()?;

    let presence = |value: &str| if value.is_empty() { "absent" } else { "present" };

    match format {
        "text" => {
            println!("{}", status);
            println!("  domain:        {}", config.bluesky.normalized_domain());
            println!("  identifier:    {}", config.bluesky.identifier);
            println!("  access token:  {}", presence(&session.access_token));
            println!("  refresh token: {}", presence(&session.refresh_token));
            println!("  session file:  {}", store.path().display());
        }
        "json" => {
            let actor_id = match &status {
                ConnectionStatus::Connected { actor_id } => Some(actor_id.as_str()),
                ConnectionStatus::NotConnected => None,
            };
            let value = serde_json::json!({
                "connected": status.is_connected(),
                "actor_id": actor_id,
                "domain": config.bluesky.normalized_domain(),
                "identifier": config.bluesky.identifier,
                "has_access_token": !session.access_token.is_empty(),
                "has_refresh_token": !session.refresh_token.is_empty(),
                "backend": manager.store().backend_name(),
                "path": store.path().display().to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        other => {
            return Err(SkypostError::InvalidInput(format!(
                "Invalid format '{}'. Valid options: text, json",
                other
            ))
            .into())
        }
    }
    Ok(())
}

fn logout(config: &Config, force: bool) -> Result<()> {
    let (manager, _store) = open_manager(config)?;

    if !manager.status()?.is_connected() {
        println!("No stored session");
        return Ok(());
    }

    if !force && atty::is(atty::Stream::Stdin) {
        use std::io::{self, Write};
        print!("Delete the stored Bluesky session? [y/N]: ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled");
            return Ok(());
        }
    }

    manager.logout()?;
    println!("✓ Logged out");
    Ok(())
}
