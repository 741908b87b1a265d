//! # CLI Interface
//!
//! Defines the command-line argument structure for `credvault-node` using
//! `clap` derive. Subcommands: `run`, `init`, `keygen`, `status`, and
//! `version`. Every `run` option can also come from a `CREDVAULT_*`
//! environment variable.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// CredVault registry node.
///
/// Hosts a credential registry (issuers, credential types, issued
/// credentials), persists it to a local journal, and serves it over HTTP
/// together with a content-addressed blob endpoint for sealed credential
/// documents.
#[derive(Parser, Debug)]
#[command(
    name = "credvault-node",
    about = "CredVault credential registry node",
    version,
    propagate_version = true
)]
pub struct CredVaultNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the registry node.
    Run(RunArgs),
    /// Initialize a data directory and generate the registry owner key.
    Init(InitArgs),
    /// Generate a fresh keypair and print it as JSON.
    Keygen(KeygenArgs),
    /// Query the status of a running node.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Data directory holding the registry journal, blobs, and owner key.
    #[arg(long, short = 'd', env = "CREDVAULT_DATA_DIR", default_value = "./credvault-data")]
    pub data_dir: PathBuf,

    /// Port for the REST API.
    #[arg(long, env = "CREDVAULT_RPC_PORT", default_value_t = credvault_protocol::config::DEFAULT_RPC_PORT)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "CREDVAULT_METRICS_PORT", default_value_t = credvault_protocol::config::DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Registry owner address (`cred1...`).
    ///
    /// When omitted, the owner is derived from `owner.key` in the data
    /// directory, as written by `init`.
    #[arg(long, env = "CREDVAULT_OWNER")]
    pub owner: Option<String>,

    /// Base URL of an external blob store to use instead of the local one.
    ///
    /// The node's own `/blobs` endpoints then forward to it.
    #[arg(long, env = "CREDVAULT_STORE_URL")]
    pub store_url: Option<String>,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "CREDVAULT_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "CREDVAULT_DATA_DIR", default_value = "./credvault-data")]
    pub data_dir: PathBuf,
}

/// Which kind of key `keygen` produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KeyKind {
    /// X25519 keypair a holder receives sealed credentials under.
    Holder,
    /// Ed25519 keypair that signs registry calls; yields an address.
    Participant,
}

/// Arguments for the `keygen` subcommand.
#[derive(Parser, Debug)]
pub struct KeygenArgs {
    #[arg(long, value_enum, default_value_t = KeyKind::Participant)]
    pub kind: KeyKind,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// REST endpoint of the running node.
    #[arg(long, default_value = "http://127.0.0.1:9841")]
    pub rpc_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        CredVaultNodeCli::command().debug_assert();
    }

    #[test]
    fn run_defaults() {
        let cli = CredVaultNodeCli::parse_from(["credvault-node", "run"]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.rpc_port, 9841);
                assert_eq!(args.metrics_port, 9842);
                assert!(args.store_url.is_none());
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn keygen_holder() {
        let cli = CredVaultNodeCli::parse_from(["credvault-node", "keygen", "--kind", "holder"]);
        assert!(matches!(
            cli.command,
            Commands::Keygen(KeygenArgs { kind: KeyKind::Holder })
        ));
    }
}
