use async_trait::async_trait;
use ethers::{
    contract::ContractError,
    providers::Middleware,
    types::{Address, TransactionReceipt, TxHash, U256, U64},
};
use std::{fmt::Debug, sync::Arc};
use tracing::{debug, info};

use crate::{
    error::{Result, SessionError},
    models::LedgerEntry,
    provider::{classify, WalletOptions},
};

mod bindings {
    ethers::contract::abigen!(Transactions, "abi/Transactions.json");
}

pub use bindings::{Transactions, TransferStruct};

/// The on-chain transaction ledger.
#[async_trait]
pub trait LedgerContract: Send + Sync + Debug {
    fn address(&self) -> Address;

    /// Every recorded entry, in ledger order.
    async fn get_all_transactions(&self) -> Result<Vec<LedgerEntry>>;

    async fn get_transaction_count(&self) -> Result<u64>;

    /// Appends the metadata of a transfer, signed by `from`, and waits for it to be mined.
    async fn add_to_blockchain(
        &self,
        from: Address,
        receiver: Address,
        amount: U256,
        message: String,
        keyword: String,
    ) -> Result<TxHash>;
}

fn contract_error<M: Middleware>(err: ContractError<M>) -> SessionError {
    match err {
        ContractError::MiddlewareError { e } => classify(e),
        ContractError::ProviderError { e } => classify(e),
        other => SessionError::Contract(other.to_string()),
    }
}

impl From<TransferStruct> for LedgerEntry {
    fn from(src: TransferStruct) -> Self {
        Self {
            sender: src.sender,
            receiver: src.receiver,
            amount: src.amount,
            message: src.message,
            timestamp: src.timestamp,
            keyword: src.keyword,
        }
    }
}

/// [`LedgerContract`] backed by the generated `Transactions` bindings.
#[derive(Debug)]
pub struct EthersLedger<M> {
    contract: Transactions<M>,
    options: WalletOptions,
}

impl<M: Middleware> EthersLedger<M> {
    pub fn new(address: Address, client: Arc<M>, options: WalletOptions) -> Self {
        Self {
            contract: Transactions::new(address, client),
            options,
        }
    }
}

#[async_trait]
impl<M> LedgerContract for EthersLedger<M>
where
    M: Middleware + 'static,
{
    fn address(&self) -> Address {
        self.contract.address()
    }

    async fn get_all_transactions(&self) -> Result<Vec<LedgerEntry>> {
        let raw = self
            .contract
            .get_all_transactions()
            .call()
            .await
            .map_err(contract_error)?;
        debug!(count = raw.len(), "getAllTransactions");
        Ok(raw.into_iter().map(LedgerEntry::from).collect())
    }

    async fn get_transaction_count(&self) -> Result<u64> {
        let count = self
            .contract
            .get_transaction_count()
            .call()
            .await
            .map_err(contract_error)?;
        if count > U256::from(u64::MAX) {
            return Err(SessionError::Contract(format!(
                "transaction count {} out of range",
                count
            )));
        }
        debug!(%count, "getTransactionCount");
        Ok(count.as_u64())
    }

    async fn add_to_blockchain(
        &self,
        from: Address,
        receiver: Address,
        amount: U256,
        message: String,
        keyword: String,
    ) -> Result<TxHash> {
        let call = self
            .contract
            .add_to_blockchain(receiver, amount, message, keyword)
            .from(from);
        let mut pending = call
            .send()
            .await
            .map_err(contract_error)?
            .confirmations(self.options.confirmations);
        if let Some(interval) = self.options.poll_interval {
            pending = pending.interval(interval);
        }
        let tx_hash = pending.tx_hash();
        let receipt = pending.await.map_err(classify)?;
        append_receipt(tx_hash, receipt)?;
        info!(?tx_hash, ?receiver, "ledger append mined");
        Ok(tx_hash)
    }
}

fn append_receipt(tx_hash: TxHash, receipt: Option<TransactionReceipt>) -> Result<TxHash> {
    let receipt = receipt.ok_or_else(|| {
        SessionError::Network(format!("ledger append {:?} was dropped", tx_hash))
    })?;
    if receipt.status == Some(U64::zero()) {
        return Err(SessionError::Contract(format!(
            "ledger append {:?} reverted",
            tx_hash
        )));
    }
    Ok(tx_hash)
}
