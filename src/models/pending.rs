use ethers::types::{Address, TxHash, U256};
use serde::{Deserialize, Serialize};

use super::LedgerEntry;

/// A confirmed value transfer whose ledger append has not been observed yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAppend {
    pub tx_hash: TxHash,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    pub message: String,
    pub keyword: String,
    /// Ledger length when the transfer was confirmed. The append can only
    /// land at or after this index.
    pub ledger_index: u64,
}

impl PendingAppend {
    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        self.from == entry.sender
            && self.to == entry.receiver
            && self.amount == entry.amount
            && self.message == entry.message
            && self.keyword == entry.keyword
    }

    /// Returns the entries of `pending` with no counterpart in `ledger`. Each
    /// ledger entry satisfies at most one pending append.
    pub fn unmatched(pending: &[PendingAppend], ledger: &[LedgerEntry]) -> Vec<PendingAppend> {
        let mut used = vec![false; ledger.len()];
        pending
            .iter()
            .filter(|append| {
                let hit = ledger
                    .iter()
                    .zip(used.iter_mut())
                    .enumerate()
                    .find(|(idx, (entry, used))| {
                        *idx as u64 >= append.ledger_index && !**used && append.matches(entry)
                    })
                    .map(|(_, hit)| hit);
                match hit {
                    Some((_, used)) => {
                        *used = true;
                        false
                    }
                    None => true,
                }
            })
            .cloned()
            .collect()
    }
}
