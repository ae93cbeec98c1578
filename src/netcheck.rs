use anyhow::Result;
use clap::Parser;
use tracing::info;

use wallet_session::{
    config::{DEFAULT_RPC_URL, RPC_URL_VAR},
    utils::{http_provider, init_tracing, network_info},
};

/// Checks that a JSON-RPC node is reachable.
#[derive(Debug, Parser)]
struct Args {
    #[arg(long, env = RPC_URL_VAR, default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();
    let args = Args::parse();

    let provider = http_provider(&args.rpc_url)?;
    let (chain_id, block) = network_info(provider.as_ref()).await?;
    info!(url = %args.rpc_url, %chain_id, %block, "node reachable");
    println!("chain id {} at block {}", chain_id, block);
    Ok(())
}
