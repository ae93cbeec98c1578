use chrono::{DateTime, Utc};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::units::{format_ether_amount, timestamp_from_epoch};

/// A ledger entry exactly as the contract stores it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub sender: Address,
    pub receiver: Address,
    /// wei
    pub amount: U256,
    pub message: String,
    /// seconds since the unix epoch
    pub timestamp: U256,
    pub keyword: String,
}

/// Display projection of a [`LedgerEntry`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub address_from: Address,
    pub address_to: Address,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub keyword: String,
    /// Decimal ether amount.
    pub amount: String,
    pub amount_wei: U256,
}

impl TransactionRecord {
    pub fn display_timestamp(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
    }
}

impl From<&LedgerEntry> for TransactionRecord {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            address_from: entry.sender,
            address_to: entry.receiver,
            // out-of-range timestamps collapse to the epoch
            timestamp: timestamp_from_epoch(entry.timestamp).unwrap_or_default(),
            message: entry.message.clone(),
            keyword: entry.keyword.clone(),
            amount: format_ether_amount(entry.amount),
            amount_wei: entry.amount,
        }
    }
}
