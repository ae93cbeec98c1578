pub mod config;
pub mod contract;
pub mod error;
pub mod models;
pub mod provider;
pub mod session;
pub mod storage;
pub mod units;
pub mod utils;

#[cfg(test)]
mod test;

pub use config::Config;
pub use contract::{EthersLedger, LedgerContract};
pub use error::{Result, SessionError, ValidationError};
pub use models::{FormField, PendingAppend, TransactionForm, TransactionRecord};
pub use provider::{bind, Binding, EthersWallet, WalletOptions, WalletProvider};
pub use session::{ConnectionState, Session, SessionState, SubmissionOutcome, SubmissionPhase};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
