use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "nsi", about = "NSI Connection Service provider — control core", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the provider: load config, build the stores/backend/engine,
    /// and serve the message/query API until a shutdown signal arrives.
    Serve {
        /// Path to the provider config YAML.
        #[arg(long)]
        config: PathBuf,
    },

    /// Re-read the topology file without restarting the provider.
    ///
    /// Hits a running server's `/admin/topology/reload` endpoint. Requires
    /// the same config the server was started with, to resolve the bind
    /// address and auth token.
    ReloadTopology {
        #[arg(long)]
        config: PathBuf,
    },

    /// Print liveness/readiness status of a running provider.
    Status {
        /// Base URL of the running server, e.g. http://localhost:8080.
        #[arg(long)]
        url: String,

        /// Bearer token to authenticate with.
        #[arg(long, env = "NSI_TOKEN")]
        token: Option<String>,
    },
}
