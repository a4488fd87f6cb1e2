//! lgtv-client command-line driver
//!
//! Connects to one TV, pairs (showing the on-screen prompt the first time),
//! then runs a single request, subscription or input event. Responses are
//! printed to stdout as JSON; logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lgtv_client::{ClientEvent, ProtocolClient};
use lgtv_core::config::{self, ClientConfig};
use lgtv_core::credentials;
use lgtv_protocol::InputEvent;

/// Scheme assumed for URIs given without one
const DEFAULT_SCHEME: &str = "ssap://";

#[derive(Parser)]
#[command(name = "lgtv-client")]
#[command(author, version, about = "Control a webOS TV over its websocket protocol")]
#[command(propagate_version = true)]
struct Cli {
    /// Device URL (overrides config), e.g. ws://192.168.1.20:3000
    #[arg(short, long, global = true, env = "LGTV_URL")]
    url: Option<String>,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Seconds to wait for pairing to complete
    #[arg(long, global = true, default_value_t = 60)]
    pair_timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and pair, storing the client key
    Pair,

    /// Send a one-shot request and print the response
    Request {
        /// Control URI, e.g. ssap://audio/getVolume or audio/getVolume
        uri: String,
        /// JSON payload
        payload: Option<String>,
    },

    /// Subscribe and print every update until interrupted
    Subscribe {
        /// Control URI
        uri: String,
        /// JSON payload
        payload: Option<String>,
    },

    /// Send one event on an input socket
    Input {
        /// Socket address, e.g. com.webos.service.networkinput/getPointerInputSocket
        address: String,
        /// Event type, e.g. button
        event_type: String,
        /// Event fields as key=value
        fields: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level.clone()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(config::default_config_path);

    let mut client_config: ClientConfig = if config_path.exists() {
        config::load_config(&config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        tracing::debug!("No config at {:?}, using defaults", config_path);
        ClientConfig::default()
    };
    if let Some(url) = cli.url.clone() {
        client_config.url = url;
    }

    let store = credentials::from_config(&client_config.credentials)
        .context("Failed to set up credential storage")?;

    let mut builder = ProtocolClient::builder(client_config.clone(), store);
    if let Some(path) = &client_config.manifest_path {
        let manifest = config::load_manifest(path)
            .with_context(|| format!("Failed to load pairing manifest from {:?}", path))?;
        builder = builder.manifest(manifest);
    }
    let client = builder.spawn();

    let pair_timeout = Duration::from_secs(cli.pair_timeout);
    tokio::time::timeout(pair_timeout, wait_until_paired(&client))
        .await
        .with_context(|| format!("Pairing did not complete within {:?}", pair_timeout))??;

    let outcome = run_command(&client, cli.command).await;
    client.disconnect();
    outcome
}

async fn run_command(client: &ProtocolClient, command: Commands) -> Result<()> {
    match command {
        Commands::Pair => {
            print_json(&json!({ "paired": true, "state": client.state() }))?;
        }

        Commands::Request { uri, payload } => {
            let payload = parse_payload(payload.as_deref())?;
            let uri = normalize_uri(&uri);
            let response = client
                .request(uri.clone(), payload)
                .await
                .with_context(|| format!("Request to {} failed", uri))?;
            print_json(&response)?;
        }

        Commands::Subscribe { uri, payload } => {
            let payload = parse_payload(payload.as_deref())?;
            let mut subscription = client.subscribe(normalize_uri(&uri), payload);
            loop {
                tokio::select! {
                    update = subscription.next() => match update {
                        Some(Ok(update)) => print_json(&update)?,
                        Some(Err(e)) => tracing::warn!("Subscription error: {}", e),
                        None => {
                            tracing::info!("Subscription ended");
                            break;
                        }
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }

        Commands::Input {
            address,
            event_type,
            fields,
        } => {
            let event = parse_event(&event_type, &fields)?;
            let socket = client
                .get_socket(normalize_uri(&address))
                .await
                .context("Failed to open input socket")?;
            socket.send(&event).await.context("Failed to send input event")?;
            socket.close();
            print_json(&json!({ "sent": event.to_text()? }))?;
        }
    }

    Ok(())
}

/// Connect and wait for `Ready`, explaining the pairing prompt if it shows
async fn wait_until_paired(client: &ProtocolClient) -> Result<()> {
    let mut events = client.events();
    client.connect();

    loop {
        match events.recv().await {
            Ok(ClientEvent::Ready) => return Ok(()),
            Ok(ClientEvent::Connecting { url }) => tracing::info!("Connecting to {}", url),
            Ok(ClientEvent::PairingPrompt) => {
                eprintln!("Accept the pairing request on the TV screen to continue.");
            }
            Ok(ClientEvent::Error(e)) => eprintln!("{}", e),
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!("Skipped {} client events", skipped);
            }
            Err(RecvError::Closed) => anyhow::bail!("Client stopped before pairing"),
        }
    }
}

/// Prefix `ssap://` when the URI has no scheme
fn normalize_uri(uri: &str) -> String {
    if uri.contains("://") {
        uri.to_string()
    } else {
        format!("{}{}", DEFAULT_SCHEME, uri)
    }
}

fn parse_payload(payload: Option<&str>) -> Result<Option<Value>> {
    payload
        .map(|text| serde_json::from_str(text).context("Payload is not valid JSON"))
        .transpose()
}

fn parse_event(event_type: &str, fields: &[String]) -> Result<InputEvent> {
    if event_type == "button" && fields.len() == 1 && !fields[0].contains('=') {
        let event = InputEvent::button(&fields[0]);
        event.validate().context("Invalid button name")?;
        return Ok(event);
    }

    let mut event = InputEvent::new(event_type);
    for field in fields {
        let (key, value) = field
            .split_once('=')
            .with_context(|| format!("Field {:?} is not key=value", field))?;
        event = event.field(key, value);
    }
    event.validate().context("Invalid input event")?;
    Ok(event)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
