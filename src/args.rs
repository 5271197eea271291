use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

/// Import payments from bunq into Firefly III.
///
/// Connection settings come from the environment: FIREFLY_III_URI, FIREFLY_III_ACCESS_TOKEN,
/// BUNQ_SESSION_TOKEN and optionally BUNQ_API_URI and CONNECTION_TIMEOUT.
#[derive(Parser, Debug)]
pub struct Args {
    /// Import configuration file
    #[clap(long, global = true, default_value = "config.json")]
    pub config: PathBuf,

    /// Directory for downloads and job status
    #[clap(long, global = true, default_value = "storage")]
    pub storage_dir: PathBuf,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check that bunq and Firefly III can be reached
    TestConnection,

    /// List the accounts of the bunq user
    ListBunqAccounts,

    /// List the Firefly III accounts counter-parties can be mapped to
    ListLedgerAccounts,

    /// Download payments from bunq without importing them
    Download {
        /// Identifier of the job to download for. A new job is created if not given.
        #[clap(long)]
        identifier: Option<String>,
    },

    /// List the counter-parties of a downloaded job, as used in the mapping
    CounterParties {
        #[clap(long)]
        identifier: String,
    },

    /// Download payments from bunq and send them to Firefly III
    Import {
        /// Continue an existing job instead of creating a new one
        #[clap(long)]
        identifier: Option<String>,
    },

    /// Show the status of a job
    Status {
        #[clap(long)]
        identifier: String,
    },

    /// Serve the job status API
    Serve {
        #[clap(long, default_value = "127.0.0.1")]
        address: IpAddr,

        #[clap(long, default_value_t = 8080)]
        port: u16,
    },
}

pub fn parse() -> Args {
    Args::parse()
}
