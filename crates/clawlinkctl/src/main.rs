use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use clawlink::{
    Config, Credentials, Dialect, GatewayClient, Outcome, OutcomeStream, TokenPlacement,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "clawlinkctl", about = "OpenClaw Gateway client")]
struct Args {
    /// Path to config file (TOML). Defaults to ~/.clawlink/config.toml if present.
    #[arg(long, short, env = "CLAWLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Gateway URL (https://, or http:// on a local network)
    #[arg(long, env = "CLAWLINK_GATEWAY_URL")]
    url: Option<String>,

    /// Gateway authentication token
    #[arg(long, env = "CLAWLINK_GATEWAY_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Send messages as legacy `session.send` frames
    #[arg(long)]
    legacy: bool,

    /// Send the token as an Authorization header instead of in the handshake
    #[arg(long)]
    token_in_header: bool,

    /// Fail if the handshake is not acknowledged within this many seconds
    #[arg(long)]
    handshake_timeout: Option<u64>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Check whether a URL may carry a gateway token
    CheckUrl {
        url: String,
    },
    /// Connect, wait for the handshake, then disconnect
    Test {
        /// Seconds to wait for the handshake
        #[arg(long, default_value_t = 15)]
        wait_secs: u64,
    },
    /// Send one chat message and print replies as JSON lines
    Send {
        message: String,
        /// Session key (overrides config)
        #[arg(long)]
        session_key: Option<String>,
        /// Stop after this many seconds without an outcome
        #[arg(long, default_value_t = 60)]
        idle_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match &args.command {
        Cmd::CheckUrl { url } => check_url(url),
        Cmd::Test { wait_secs } => {
            let config = load_config(&args)?;
            test_connection(&config, Duration::from_secs(*wait_secs)).await
        }
        Cmd::Send {
            message,
            session_key,
            idle_secs,
        } => {
            let config = load_config(&args)?;
            let session_key = session_key.as_deref().unwrap_or(&config.session_key);
            send(&config, message, session_key, Duration::from_secs(*idle_secs)).await
        }
    }
}

fn check_url(url: &str) -> anyhow::Result<()> {
    let secure = clawlink::is_secure(url);
    println!("{}", serde_json::json!({ "url": url, "secure": secure }));
    if !secure {
        std::process::exit(1);
    }
    Ok(())
}

async fn test_connection(config: &Config, wait: Duration) -> anyhow::Result<()> {
    let client = GatewayClient::from_config(config);
    let outcomes = client.outcomes();

    client.connect(gateway_url(config)?, config.auth_token.clone()).await?;
    let connected = wait_connected(&outcomes, wait).await;
    client.disconnect().await;
    if !connected {
        std::process::exit(1);
    }
    Ok(())
}

async fn send(config: &Config, message: &str, session_key: &str, idle: Duration) -> anyhow::Result<()> {
    let client = GatewayClient::from_config(config);
    let outcomes = client.outcomes();

    client.connect(gateway_url(config)?, config.auth_token.clone()).await?;
    if !wait_connected(&outcomes, idle).await {
        client.disconnect().await;
        std::process::exit(1);
    }

    if let Some(id) = client.send(message, session_key).await {
        info!(id = %id, session_key, "message sent");
    }

    // Print replies until the connection drops or goes quiet.
    while let Ok(Some(outcome)) = tokio::time::timeout(idle, outcomes.recv()).await {
        print_outcome(&outcome);
        if outcome.is_error() && !client.is_ready().await {
            break;
        }
    }
    client.disconnect().await;
    Ok(())
}

fn gateway_url(config: &Config) -> anyhow::Result<&str> {
    config
        .gateway_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("no gateway URL: pass --url or set gateway_url"))
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => {
            let path = Config::default_path();
            if path.exists() {
                Config::load(&path)?
            } else {
                Config::default()
            }
        }
    };

    if let Some(url) = &args.url {
        config.gateway_url = Some(url.clone());
    }
    if let Some(token) = &args.token {
        config.auth_token = Credentials::bearer(token.clone());
    }
    if args.legacy {
        config.dialect = Dialect::Legacy;
    }
    if args.token_in_header {
        config.token_placement = TokenPlacement::Header;
    }
    if let Some(secs) = args.handshake_timeout {
        config.handshake_timeout_secs = Some(secs);
    }

    config.validate()?;
    Ok(config)
}

/// Print outcomes until `Connected`, an error, or the deadline.
async fn wait_connected(outcomes: &OutcomeStream, wait: Duration) -> bool {
    loop {
        match tokio::time::timeout(wait, outcomes.recv()).await {
            Ok(Some(outcome)) => {
                print_outcome(&outcome);
                match outcome {
                    Outcome::Connected => return true,
                    Outcome::Error(_) => return false,
                    Outcome::Response(_) => {}
                }
            }
            Ok(None) => return false,
            Err(_) => {
                warn!(timeout = ?wait, "gave up waiting for the Gateway handshake");
                return false;
            }
        }
    }
}

fn print_outcome(outcome: &Outcome) {
    match serde_json::to_string(outcome) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!(error = %e, "failed to encode outcome"),
    }
}
