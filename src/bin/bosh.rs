//! BOSH client CLI binary.
//!
//! # Commands
//!
//! - `connect` - Open a session, send stdin lines as payload, print events
//! - `config` - Print the effective configuration

use std::path::PathBuf;

use bosh::{Body, BoshClient, Config, SessionEvent, VERSION};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "bosh")]
#[command(version = VERSION)]
#[command(about = "BOSH (XEP-0124) client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a session and relay stdin/stdout
    Connect {
        /// Connection manager URI
        #[arg(short, long)]
        uri: Option<String>,

        /// Target domain
        #[arg(short, long)]
        to: Option<String>,

        /// Upstream server override (xmpp:host:port)
        #[arg(long)]
        route: Option<String>,

        /// Requests the CM may hold
        #[arg(long)]
        hold: Option<u32>,

        /// Longest wait for a held request, in seconds
        #[arg(long)]
        wait: Option<u32>,

        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Verbose logging
        #[arg(short, long)]
        verbose: bool,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Connect {
            uri,
            to,
            route,
            hold,
            wait,
            config,
            verbose,
            json,
        } => {
            let mut config = Config::load(config.as_deref())?;
            if let Some(uri) = uri {
                config.transport.uri = uri;
            }
            if let Some(to) = to {
                config.session.to = to;
            }
            if route.is_some() {
                config.session.route = route;
            }
            if let Some(hold) = hold {
                config.session.hold = hold;
            }
            if let Some(wait) = wait {
                config.session.wait_secs = wait;
            }
            cmd_connect(config, verbose, json)
        },

        Commands::Config { config } => cmd_config(config),
    }
}

fn cmd_connect(config: Config, verbose: bool, json: bool) -> anyhow::Result<()> {
    // Initialize logging (stderr; stdout carries events)
    let log_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    config.validate()?;
    tracing::info!("Connecting to {} (to={})", config.transport.uri, config.session.to);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let (client, mut events) = BoshClient::from_config(&config)?;
        client.send(Body::empty()).await?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    let closed = matches!(event, SessionEvent::ConnectionClosed { .. });
                    print_event(&event, json)?;
                    if closed {
                        break;
                    }
                },
                line = lines.next_line(), if stdin_open => {
                    match line? {
                        Some(line) if line.trim().is_empty() => {},
                        Some(line) => {
                            client.send(Body::builder().payload(line).build()).await?;
                        },
                        None => {
                            stdin_open = false;
                            tracing::info!("stdin closed, disconnecting");
                            client.disconnect().await?;
                        },
                    }
                },
            }
        }

        let stats = client.stats().await;
        tracing::info!(
            "Requests: {} ({} empty), responses: {}, retries: {}",
            stats.requests_sent,
            stats.empty_requests,
            stats.responses_received,
            stats.retries
        );
        Ok::<_, anyhow::Error>(())
    })
}

fn print_event(event: &SessionEvent, json: bool) -> anyhow::Result<()> {
    if json {
        let value = match event {
            SessionEvent::SessionEstablished { sid, params } => json!({
                "event": event.kind(),
                "sid": sid,
                "params": serde_json::to_value(params)?,
            }),
            SessionEvent::BodyReceived(body) => json!({
                "event": event.kind(),
                "body": body.to_xml(),
            }),
            SessionEvent::ConnectionClosed { cause, unsent } => json!({
                "event": event.kind(),
                "cause": serde_json::to_value(cause)?,
                "unsent": unsent.len(),
            }),
        };
        println!("{value}");
        return Ok(());
    }

    match event {
        SessionEvent::SessionEstablished { sid, params } => {
            println!(
                "Session {sid} established (hold={}, requests={}, wait={}s, polling={}s{})",
                params.hold,
                params.requests,
                params.wait_secs,
                params.polling_secs,
                if params.legacy { ", legacy" } else { "" }
            );
        },
        SessionEvent::BodyReceived(body) => {
            for node in body.payload() {
                println!("{node}");
            }
        },
        SessionEvent::ConnectionClosed { cause, unsent } => {
            println!("Session closed: {cause}");
            if !unsent.is_empty() {
                println!("{} queued bodies were not sent", unsent.len());
            }
        },
    }
    Ok(())
}

fn cmd_config(path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = Config::load(path.as_deref())?;
    if let Some(default_path) = Config::default_path() {
        eprintln!("# default config file: {}", default_path.display());
    }
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
