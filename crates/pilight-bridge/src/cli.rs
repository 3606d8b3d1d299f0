//! Clap derive structures for the `pilight-bridge` daemon.

use std::path::PathBuf;

use clap::Parser;

/// pilight-bridge -- keep pilight devices mirrored over WebSocket
#[derive(Debug, Parser)]
#[command(
    name = "pilight-bridge",
    version,
    about = "Bridge one or more pilight daemons into a supervised device registry",
    long_about = "Connects to every configured pilight daemon over WebSocket,\n\
        discovers switches and dimmers from the daemon config, and keeps\n\
        their state in sync with broadcast updates. Commands are retried\n\
        until the daemon confirms them."
)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, short = 'c', env = "PILIGHT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    pub check: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}
