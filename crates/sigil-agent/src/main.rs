// ============================================
// File: crates/sigil-agent/src/main.rs
// ============================================
//! # Sigil Agent Entry Point
//!
//! ## Creation Reason
//! Command-line front end for the agent library: key management, a local
//! verifier for testing, and one-shot authentication runs.
//!
//! ## Main Functionality
//! - CLI argument parsing with clap
//! - Logging initialization with tracing
//! - Configuration loading
//! - Command dispatch
//!
//! ## Usage
//! ```bash
//! # Create the device key
//! sigil-agent keygen
//!
//! # Run a verifier on this machine (prints its commitment)
//! sigil-agent serve --listen 127.0.0.1:7400 --metadata "front desk"
//!
//! # Authenticate to it
//! sigil-agent authenticate --address tcp://127.0.0.1:7400 --commitment <hex>
//!
//! # Inspect an address
//! sigil-agent parse-address btspp://AABBCCDDEEFF:0A
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `serve` accepts every prover that proves its key; it is a test tool
//! - `authenticate` uses in-memory stores, so nothing outlives the process
//!   except the key file
//!
//! ## Last Modified
//! v0.1.0 - Initial CLI implementation

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sigil_agent::engine::{ChannelProgress, Proxy, Verifier};
use sigil_agent::keyfile::{load_key, save_key};
use sigil_agent::{
    AgentConfig, AuthOutcome, Authenticator, CredentialStore, KeyPairing, MemoryCredentialStore,
    MemorySessionStore, Pairing, Service,
};
use sigil_core::crypto::{Commitment, IdentityKeyPair};
use sigil_core::protocol::ExtraData;
use sigil_transport::{Endpoint, TcpChannel};

// ============================================
// CLI Definition
// ============================================

/// Sigil device agent
#[derive(Parser, Debug)]
#[command(name = "sigil-agent")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "/etc/sigil/agent.toml")]
    config: PathBuf,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate the device key pair
    Keygen {
        /// Output path (defaults to device.key_file)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing key file
        #[arg(long)]
        force: bool,
    },

    /// Print the commitment for a key and metadata
    Commitment {
        /// Key file (defaults to device.key_file)
        #[arg(short, long)]
        key_file: Option<PathBuf>,

        /// Metadata bound into the commitment
        #[arg(short, long, default_value = "")]
        metadata: String,
    },

    /// Run a TCP verifier that accepts every prover
    Serve {
        /// Listen address
        #[arg(short, long, default_value = "127.0.0.1:7400")]
        listen: String,

        /// Verifier key file (a fresh key is generated if omitted)
        #[arg(short, long)]
        key_file: Option<PathBuf>,

        /// Metadata bound into the commitment
        #[arg(short, long, default_value = "")]
        metadata: String,

        /// Text sent back with every accepting verdict
        #[arg(long)]
        extra: Option<String>,
    },

    /// Authenticate to a service
    Authenticate {
        /// Service address (tcp://, http(s)://, btspp://)
        #[arg(short, long)]
        address: String,

        /// Expected commitment (hex)
        #[arg(short = 'C', long)]
        commitment: String,

        /// Display name for the service
        #[arg(short, long, default_value = "service")]
        name: String,

        /// Text sent to the service, sealed under the session key
        #[arg(long)]
        extra: Option<String>,
    },

    /// Parse an address and show how it would be reached
    ParseAddress {
        /// Address URI
        address: String,
    },
}

// ============================================
// Main
// ============================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = load_or_default_config(&cli.config).await;
    init_logging(&config.logging.level);

    let result = match cli.command {
        Commands::Keygen { output, force } => cmd_keygen(&config, output, force).await,
        Commands::Commitment { key_file, metadata } => {
            cmd_commitment(&config, key_file, &metadata).await
        }
        Commands::Serve {
            listen,
            key_file,
            metadata,
            extra,
        } => cmd_serve(&config, &listen, key_file, metadata, extra).await,
        Commands::Authenticate {
            address,
            commitment,
            name,
            extra,
        } => cmd_authenticate(&config, &address, &commitment, name, extra).await,
        Commands::ParseAddress { address } => cmd_parse_address(&address),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

// ============================================
// Commands
// ============================================

/// Generates and stores the device key.
async fn cmd_keygen(config: &AgentConfig, output: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = output.unwrap_or_else(|| PathBuf::from(&config.device.key_file));
    if path.exists() && !force {
        bail!("{} already exists (use --force to replace it)", path.display());
    }

    let identity = IdentityKeyPair::generate();
    save_key(&identity, &path).await?;

    println!("🔑 Device key written to {}", path.display());
    println!("   Public key: {}", identity.public_key());
    Ok(())
}

/// Prints `SHA-256` commitment of a key and metadata.
async fn cmd_commitment(
    config: &AgentConfig,
    key_file: Option<PathBuf>,
    metadata: &str,
) -> anyhow::Result<()> {
    let path = key_file.unwrap_or_else(|| PathBuf::from(&config.device.key_file));
    let identity = load_key(&path).await?;
    println!("{}", Commitment::derive(&identity.public_key(), metadata.as_bytes()));
    Ok(())
}

/// Runs the local verifier until Ctrl-C.
async fn cmd_serve(
    config: &AgentConfig,
    listen: &str,
    key_file: Option<PathBuf>,
    metadata: String,
    extra: Option<String>,
) -> anyhow::Result<()> {
    let identity = match key_file {
        Some(path) => load_key(&path).await?,
        None => IdentityKeyPair::generate(),
    };

    let mut verifier = Verifier::new(identity, metadata.into_bytes());
    if let Some(text) = extra {
        verifier = verifier.with_extra(ExtraData::text(text));
    }
    let verifier = Arc::new(verifier);

    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("binding {listen}"))?;
    let local = listener.local_addr()?;

    println!("🛡️  Verifier listening on tcp://{local}");
    println!("   Commitment: {}", verifier.commitment());

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "Accept failed");
                        continue;
                    }
                };
                let verifier = Arc::clone(&verifier);
                let options = config.channel_options();
                tokio::spawn(async move {
                    let channel = match TcpChannel::from_stream(stream, options) {
                        Ok(channel) => channel,
                        Err(e) => {
                            warn!(peer = %peer, error = %e, "Could not set up channel");
                            return;
                        }
                    };
                    let mut proxy = Proxy::json(Box::new(channel));
                    match verifier.respond(&mut proxy).await {
                        Ok(outcome) => info!(
                            peer = %peer,
                            session_id = %outcome.session_id,
                            prover = %outcome.prover_identity,
                            accepted = outcome.accepted,
                            "Prover handled"
                        ),
                        Err(e) => warn!(peer = %peer, kind = %e.kind(), error = %e, "Prover run failed"),
                    }
                    proxy.close().await;
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down verifier");
                return Ok(());
            }
        }
    }
}

/// Runs one pairing authentication and prints the outcome.
async fn cmd_authenticate(
    config: &AgentConfig,
    address: &str,
    commitment: &str,
    name: String,
    extra: Option<String>,
) -> anyhow::Result<()> {
    let commitment: Commitment = commitment
        .parse()
        .with_context(|| format!("invalid commitment '{commitment}'"))?;
    let service = Service::new(name, address, commitment)?;

    let credentials = Arc::new(MemoryCredentialStore::new());
    let key_path = Path::new(&config.device.key_file);
    if key_path.exists() {
        let key_pair = load_key(key_path).await?;
        credentials
            .save_or_update_pairing(&Pairing::Key(KeyPairing {
                service: service.clone(),
                key_pair,
                extra: None,
            }))
            .await?;
    } else {
        warn!(path = %key_path.display(), "No device key, using a fresh one");
    }

    let (sink, mut progress) = ChannelProgress::new();
    tokio::spawn(async move {
        while let Some(p) = progress.recv().await {
            println!("   [{}/{}] {}", p.stage, p.total, p.description);
        }
    });

    let authenticator =
        Authenticator::from_config(config, credentials, Arc::new(MemorySessionStore::new()))
            .with_progress(Arc::new(sink));

    println!("🔐 Authenticating to {} ({})", service.name, service.endpoint);
    let outcome = authenticator
        .authenticate_pairing(&service, extra.map(ExtraData::text))
        .await?;
    let code = outcome.code();
    println!("   Outcome: {code}");

    match outcome {
        AuthOutcome::PairingAuthenticated(session) => {
            if let Some(id) = session.id() {
                println!("   Session: {id}");
            }
            if let Some(extra) = session.extra() {
                println!("   Extra:   {}", extra.data());
            }
            Ok(())
        }
        AuthOutcome::PairingRejected(session) => {
            if let Some(id) = session.id() {
                println!("   Session: {id} (declined)");
            }
            Ok(())
        }
        AuthOutcome::Failed { failure, .. } => {
            bail!("authentication failed ({}): {failure}", failure.kind())
        }
        AuthOutcome::TerminalAuthenticated { .. } | AuthOutcome::TerminalUntrusted { .. } => {
            bail!("unexpected outcome {code}")
        }
    }
}

/// Prints how an address parses.
fn cmd_parse_address(address: &str) -> anyhow::Result<()> {
    let endpoint = Endpoint::parse(address)?;
    println!("Scheme: {}", endpoint.scheme());
    match &endpoint {
        Endpoint::Tcp { host, port } => {
            println!("Host:   {host}");
            println!("Port:   {port}");
        }
        Endpoint::Rendezvous { base, channel_id } => {
            println!("Relay:  {base}");
            if let Some(id) = channel_id {
                println!("Box:    {id}");
            }
        }
        Endpoint::Bluetooth { address, channel } => {
            println!("Device: {address}");
            match channel {
                Some(c) => println!("Channel: {c} (0x{c:02X})"),
                None => println!("Channel: default"),
            }
        }
    }
    Ok(())
}

// ============================================
// Helpers
// ============================================

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .ok();
}

async fn load_or_default_config(path: &Path) -> AgentConfig {
    if !path.exists() {
        return AgentConfig::default();
    }
    match AgentConfig::load(path).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("⚠️  {e}; using defaults");
            AgentConfig::default()
        }
    }
}
