use anyhow::{format_err, Context, Result};
use clap::Parser;
use ethers::{
    abi::Abi,
    contract::ContractFactory,
    middleware::SignerMiddleware,
    signers::{LocalWallet, Signer},
    types::Bytes,
};
use serde::Deserialize;
use std::{fs, path::PathBuf, sync::Arc};
use tracing::info;

use wallet_session::{
    config::{DEFAULT_RPC_URL, RPC_URL_VAR},
    utils::{http_provider, init_tracing, network_info},
};

/// Deploys the `Transactions` ledger from a compiled hardhat artifact.
#[derive(Debug, Parser)]
struct Args {
    /// e.g. artifacts/contracts/Transactions.sol/Transactions.json
    #[arg(long)]
    artifact: PathBuf,

    #[arg(long, env = RPC_URL_VAR, default_value = DEFAULT_RPC_URL)]
    rpc_url: String,

    #[arg(long, env = "DEPLOYER_PRIVATE_KEY", hide_env_values = true)]
    private_key: String,

    #[arg(long, default_value_t = 1)]
    confirmations: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Artifact {
    contract_name: Option<String>,
    abi: Abi,
    bytecode: String,
}

impl Artifact {
    fn bytecode(&self) -> Result<Bytes> {
        let raw = self.bytecode.trim();
        let code = hex::decode(raw.strip_prefix("0x").unwrap_or(raw))
            .context("artifact bytecode is not hex")?;
        if code.is_empty() {
            return Err(format_err!("artifact has no bytecode, is the contract abstract?"));
        }
        Ok(code.into())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();
    let args = Args::parse();

    let raw = fs::read_to_string(&args.artifact)
        .with_context(|| format!("reading {}", args.artifact.display()))?;
    let artifact: Artifact = serde_json::from_str(&raw).context("parsing hardhat artifact")?;
    let bytecode = artifact.bytecode()?;
    let name = artifact
        .contract_name
        .clone()
        .unwrap_or_else(|| "Transactions".to_string());

    let provider = http_provider(&args.rpc_url)?;
    let (chain_id, block) = network_info(provider.as_ref()).await?;
    info!(%chain_id, %block, "connected to node");

    let wallet: LocalWallet = args
        .private_key
        .trim()
        .trim_start_matches("0x")
        .parse()
        .context("DEPLOYER_PRIVATE_KEY is not a valid private key")?;
    let wallet = wallet.with_chain_id(chain_id.as_u64());
    info!(deployer = ?wallet.address(), contract = %name, "deploying");

    let client = Arc::new(SignerMiddleware::new(provider.as_ref().clone(), wallet));
    let factory = ContractFactory::new(artifact.abi, bytecode, client);
    let contract = factory
        .deploy(())?
        .confirmations(args.confirmations)
        .send()
        .await
        .context("deployment failed")?;

    info!(address = ?contract.address(), contract = %name, "deployed");
    println!("{:?}", contract.address());
    Ok(())
}
