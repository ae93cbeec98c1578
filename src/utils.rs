use ethers::{
    providers::{Http, Middleware, Provider},
    types::{U256, U64},
};
use std::{sync::Arc, time::Duration};
use tracing_subscriber::EnvFilter;

use crate::{
    error::{Result, SessionError},
    provider::classify,
};

pub const DEFAULT_LOG_DIRECTIVE: &str = "wallet_session=info";

/// Installs the fmt subscriber. `RUST_LOG` wins over the default directive.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE));
    // a second init in the same process is a no-op
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub fn http_provider(url: &str) -> Result<Arc<Provider<Http>>> {
    let provider = Provider::<Http>::try_from(url)
        .map_err(|e| SessionError::Config(format!("rpc url {:?}: {}", url, e)))?
        .interval(Duration::from_millis(500));
    Ok(Arc::new(provider))
}

/// Chain id and latest block number of the node behind `client`.
pub async fn network_info<M: Middleware>(client: &M) -> Result<(U256, U64)> {
    let chain_id = client.get_chainid().await.map_err(classify)?;
    let block = client.get_block_number().await.map_err(classify)?;
    Ok((chain_id, block))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_provider_rejects_bad_url() {
        assert!(matches!(http_provider("not a url"), Err(SessionError::Config(_))));
        assert!(http_provider("http://localhost:8545").is_ok());
    }
}
