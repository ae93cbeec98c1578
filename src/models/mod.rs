mod form;
mod pending;
mod record;

pub use form::{FormField, TransactionForm, ValidatedTransfer};
pub use pending::PendingAppend;
pub use record::{LedgerEntry, TransactionRecord};
