//! CLI flag definitions using clap.

use std::net::SocketAddr;

use clap::Parser;
use url::Url;

/// saturn - delayed-action registry
#[derive(Parser, Debug)]
#[command(name = "saturn")]
#[command(version)]
#[command(about = "Register named events that fire a webhook when their timeout elapses")]
pub struct Cli {
    /// Where emitted events are delivered
    #[arg(long, default_value = "http://localhost:3000/webhook")]
    pub webhook_url: Url,

    /// Address to serve the API on
    #[arg(long, default_value = "0.0.0.0:3000")]
    pub bind: SocketAddr,

    /// Upper bound, in seconds, on any registration's or extension's total duration
    #[arg(long, default_value_t = 86_400)]
    pub max_timeout_secs: u64,
}
