use async_trait::async_trait;
use ethers::{
    providers::{Middleware, MiddlewareError, PendingTransaction},
    types::{Address, TransactionReceipt, TransactionRequest, TxHash, U256, U64},
};
use std::{fmt::Debug, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use crate::{
    contract::{EthersLedger, LedgerContract},
    error::{Result, SessionError},
};

/// Gas limit of a plain value transfer.
pub const TRANSFER_GAS: u64 = 21_000;

/// EIP-1193 `User Rejected Request`.
pub const USER_REJECTED_CODE: i64 = 4001;
/// EIP-1193 `Unauthorized`.
pub const UNAUTHORIZED_CODE: i64 = 4100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferRequest {
    pub from: Address,
    pub to: Address,
    /// wei
    pub value: U256,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferReceipt {
    pub tx_hash: TxHash,
    pub success: bool,
}

/// The injected wallet: account access and signing of value transfers.
#[async_trait]
pub trait WalletProvider: Send + Sync + Debug {
    /// Accounts the wallet has already exposed to us, without prompting (`eth_accounts`).
    async fn accounts(&self) -> Result<Vec<Address>>;

    /// Asks the wallet to expose its accounts, which may suspend on a user prompt
    /// (`eth_requestAccounts`).
    async fn request_accounts(&self) -> Result<Vec<Address>>;

    /// Hands a value transfer to the wallet for signing and broadcast, returning
    /// once the hash is known (`eth_sendTransaction`).
    async fn send_transaction(&self, tx: TransferRequest) -> Result<TxHash>;

    /// Waits until `tx_hash` is mined.
    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TransferReceipt>;
}

/// Maps a JSON-RPC error object onto the session taxonomy.
pub fn classify_rpc_error(code: i64, message: &str) -> SessionError {
    match code {
        USER_REJECTED_CODE | UNAUTHORIZED_CODE => SessionError::ProviderRejected(message.to_string()),
        _ => SessionError::Network(format!("{} (code {})", message, code)),
    }
}

pub(crate) fn classify<E: MiddlewareError>(err: E) -> SessionError {
    match err.as_error_response() {
        Some(resp) => classify_rpc_error(resp.code, &resp.message),
        None => SessionError::Network(err.to_string()),
    }
}

#[derive(Clone, Debug)]
pub struct WalletOptions {
    pub confirmations: usize,
    pub poll_interval: Option<Duration>,
    pub transfer_gas: U256,
}

impl Default for WalletOptions {
    fn default() -> Self {
        Self {
            confirmations: 1,
            poll_interval: None,
            transfer_gas: TRANSFER_GAS.into(),
        }
    }
}

/// [`WalletProvider`] over any ethers middleware whose node (or signer layer)
/// holds the accounts.
#[derive(Debug)]
pub struct EthersWallet<M> {
    client: Arc<M>,
    options: WalletOptions,
}

impl<M: Middleware> EthersWallet<M> {
    pub fn new(client: Arc<M>, options: WalletOptions) -> Self {
        Self { client, options }
    }
}

#[async_trait]
impl<M> WalletProvider for EthersWallet<M>
where
    M: Middleware + 'static,
{
    async fn accounts(&self) -> Result<Vec<Address>> {
        let accounts = self.client.get_accounts().await.map_err(classify)?;
        debug!(count = accounts.len(), "eth_accounts");
        Ok(accounts)
    }

    async fn request_accounts(&self) -> Result<Vec<Address>> {
        let accounts: Vec<Address> = self
            .client
            .provider()
            .request("eth_requestAccounts", ())
            .await
            .map_err(classify)?;
        debug!(count = accounts.len(), "eth_requestAccounts");
        Ok(accounts)
    }

    async fn send_transaction(&self, tx: TransferRequest) -> Result<TxHash> {
        let request = transfer_request(&tx, self.options.transfer_gas);
        let pending = self
            .client
            .send_transaction(request, None)
            .await
            .map_err(classify)?;
        let tx_hash = pending.tx_hash();
        info!(?tx_hash, to = ?tx.to, value = %tx.value, "transfer submitted");
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TransferReceipt> {
        let mut pending = PendingTransaction::new(tx_hash, self.client.provider())
            .confirmations(self.options.confirmations);
        if let Some(interval) = self.options.poll_interval {
            pending = pending.interval(interval);
        }
        let receipt = pending.await.map_err(classify)?;
        transfer_receipt(tx_hash, receipt)
    }
}

fn transfer_request(tx: &TransferRequest, gas: U256) -> TransactionRequest {
    TransactionRequest::new()
        .from(tx.from)
        .to(tx.to)
        .value(tx.value)
        .gas(gas)
}

fn transfer_receipt(tx_hash: TxHash, receipt: Option<TransactionReceipt>) -> Result<TransferReceipt> {
    let receipt = receipt
        .ok_or_else(|| SessionError::Network(format!("transfer {:?} was dropped", tx_hash)))?;

    // pre-byzantium receipts carry no status
    let success = receipt.status.map_or(true, |status| status == U64::one());
    if !success {
        warn!(?tx_hash, "transfer mined with failed status");
    }
    Ok(TransferReceipt { tx_hash, success })
}

/// A contract handle bound to an injected wallet.
#[derive(Clone, Debug)]
pub struct Binding {
    pub wallet: Arc<dyn WalletProvider>,
    pub ledger: Arc<dyn LedgerContract>,
}

impl Binding {
    pub fn new(wallet: Arc<dyn WalletProvider>, ledger: Arc<dyn LedgerContract>) -> Self {
        Self { wallet, ledger }
    }
}

/// Binds the ledger contract at `contract_address` to the injected wallet.
/// Nothing goes over the wire until a method is called on the result.
pub fn bind<M>(
    injected: Option<Arc<M>>,
    contract_address: Address,
    options: WalletOptions,
) -> Result<Binding>
where
    M: Middleware + 'static,
{
    let client = injected.ok_or(SessionError::ProviderUnavailable)?;
    let ledger = EthersLedger::new(contract_address, client.clone(), options.clone());
    let wallet = EthersWallet::new(client, options);
    debug!(contract = ?contract_address, "bound ledger contract");
    Ok(Binding::new(Arc::new(wallet), Arc::new(ledger)))
}
