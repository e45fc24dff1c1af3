#![forbid(unsafe_code)]
//! HTTP server for the txledger balance and transaction API

use clap::Parser;
use std::path::PathBuf;
use txledger::config::load_config;
use txledger::node::Node;

#[derive(Parser, Debug)]
#[command(name = "txledger-server", version, about = "Balance and transaction ledger API")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = load_config(&args.config)?;

    let node = Node::init(config)?;
    node.run().await
}
