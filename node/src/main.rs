// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # CredVault Registry Node
//!
//! Entry point for the `credvault-node` binary. Parses CLI arguments,
//! initializes logging and metrics, replays the registry journal, and serves
//! the HTTP API.
//!
//! The binary supports five subcommands:
//!
//! - `run`     start the registry node
//! - `init`    initialize a data directory and generate the owner key
//! - `keygen`  print a fresh holder or participant keypair
//! - `status`  query a running node's status endpoint
//! - `version` print build version information

mod api;
mod cli;
mod logging;
mod metrics;
mod nonces;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;

use credvault_contracts::{CredentialRegistry, RegistryJournal, SharedRegistry};
use credvault_protocol::crypto::{EncryptionKeypair, SigningKeypair};
use credvault_protocol::identity::Address;
use credvault_protocol::storage::{ContentStore, HttpStore, HttpStoreConfig, SledStore};

use cli::{Commands, CredVaultNodeCli, KeyKind};
use logging::LogFormat;
use metrics::NodeMetrics;
use nonces::NonceLedger;

/// Owner signing key written by `init`, hex-encoded.
const OWNER_KEY_FILE: &str = "owner.key";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CredVaultNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Keygen(args) => keygen(args),
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the registry node: API server and metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        logging::DEFAULT_FILTER,
        LogFormat::from_str_lossy(&args.log_format),
    );

    tracing::info!(
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        "starting credvault-node"
    );

    let owner = resolve_owner(args.owner.as_deref(), &args.data_dir)?;

    // --- Persistent storage ---
    // One sled database holds both the journal and the local blob tree.
    let db_path = args.data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;
    let db = sled::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "database opened");

    let journal = RegistryJournal::from_db(db.clone()).context("failed to open registry journal")?;
    tracing::info!(events = journal.len(), "replaying registry journal");
    let registry = CredentialRegistry::open(owner, journal)
        .context("failed to replay registry journal")?;
    let registry = SharedRegistry::new(registry);

    // --- Blob store ---
    let store: Arc<dyn ContentStore> = match &args.store_url {
        Some(url) => {
            tracing::info!(url = %url, "using remote blob store");
            Arc::new(HttpStore::new(HttpStoreConfig::new(url.as_str()))?)
        }
        None => Arc::new(SledStore::from_db(db.clone()).context("failed to open blob store")?),
    };

    let nonces = NonceLedger::from_db(&db).context("failed to open call nonce tree")?;

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);

    // --- Event log ---
    let mut events = registry.subscribe();
    let event_log = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::debug!(?event, "registry event"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "event log lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // --- Application state ---
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            credvault_protocol::config::PROTOCOL_VERSION,
        ),
        registry,
        store,
        nonces,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    event_log.abort();
    db.flush_async().await.context("failed to flush database")?;
    tracing::info!("credvault-node stopped");
    Ok(())
}

/// The owner address from `--owner`, or from the key file `init` wrote.
fn resolve_owner(explicit: Option<&str>, data_dir: &Path) -> Result<Address> {
    if let Some(addr) = explicit {
        return Address::parse(addr).with_context(|| format!("invalid owner address: {addr}"));
    }

    let key_path = data_dir.join(OWNER_KEY_FILE);
    if !key_path.exists() {
        bail!(
            "no owner configured: pass --owner or run `credvault-node init -d {}` first",
            data_dir.display()
        );
    }
    let hex = std::fs::read_to_string(&key_path)
        .with_context(|| format!("failed to read owner key from {}", key_path.display()))?;
    let keypair = SigningKeypair::from_hex(hex.trim())
        .with_context(|| format!("malformed owner key in {}", key_path.display()))?;
    Ok(Address::from_public_key(&keypair.public_key()))
}

/// Initializes a new data directory and generates the registry owner key.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("credvault_node=info", LogFormat::Pretty);

    let data_dir = &args.data_dir;
    tracing::info!(data_dir = %data_dir.display(), "initializing node");

    let (owner, key_path) = write_owner_key(data_dir)?;
    tracing::info!(%owner, key_path = %key_path.display(), "owner key generated");

    println!("Node initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Owner key      : {}", key_path.display());
    println!("  Owner address  : {}", owner);

    Ok(())
}

/// Generates the owner key into `data_dir`. Refuses to overwrite one.
fn write_owner_key(data_dir: &Path) -> Result<(Address, std::path::PathBuf)> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let key_path = data_dir.join(OWNER_KEY_FILE);
    if key_path.exists() {
        bail!("owner key already exists at {}", key_path.display());
    }

    let keypair = SigningKeypair::generate();
    std::fs::write(&key_path, keypair.secret_key_hex())
        .with_context(|| format!("failed to write owner key to {}", key_path.display()))?;

    // Restrict permissions on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok((Address::from_public_key(&keypair.public_key()), key_path))
}

/// Prints a fresh keypair as JSON on stdout.
fn keygen(args: cli::KeygenArgs) -> Result<()> {
    let out = match args.kind {
        KeyKind::Holder => {
            let keypair = EncryptionKeypair::generate();
            serde_json::json!({
                "kind": "holder",
                "public_key": keypair.public_key_hex(),
                "secret_key": keypair.secret_key_hex(),
            })
        }
        KeyKind::Participant => {
            let keypair = SigningKeypair::generate();
            let public_key = keypair.public_key();
            serde_json::json!({
                "kind": "participant",
                "address": Address::from_public_key(&public_key).to_string(),
                "public_key": public_key.to_hex(),
                "secret_key": keypair.secret_key_hex(),
            })
        }
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

/// Queries a running node's status endpoint and prints the result.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let url = format!("{}/status", args.rpc_url.trim_end_matches('/'));
    let resp = reqwest::get(&url)
        .await
        .with_context(|| format!("failed to connect to {}", url))?
        .error_for_status()
        .with_context(|| format!("status request to {} failed", url))?;
    let status: api::StatusResponse = resp.json().await.context("malformed status response")?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("credvault-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol       {}", credvault_protocol::config::PROTOCOL_VERSION);
    println!(
        "record format  v{}",
        credvault_protocol::config::SEALED_RECORD_VERSION
    );
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_key_resolves_to_owner() {
        let dir = tempfile::tempdir().unwrap();
        let (owner, key_path) = write_owner_key(dir.path()).unwrap();
        assert!(key_path.exists());
        assert_eq!(resolve_owner(None, dir.path()).unwrap(), owner);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&key_path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        write_owner_key(dir.path()).unwrap();
        assert!(write_owner_key(dir.path()).is_err());
    }

    #[test]
    fn explicit_owner_wins() {
        let dir = tempfile::tempdir().unwrap();
        write_owner_key(dir.path()).unwrap();
        let other = Address::from_key_hash([7; 32]);
        let resolved = resolve_owner(Some(&other.to_string()), dir.path()).unwrap();
        assert_eq!(resolved, other);
    }

    #[test]
    fn missing_owner_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_owner(None, dir.path()).is_err());
        assert!(resolve_owner(Some("cred1nope"), dir.path()).is_err());
    }
}
