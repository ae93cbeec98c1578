use ethers::types::{Address, TxHash};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::{
    error::{Result, SessionError},
    models::{FormField, LedgerEntry, PendingAppend, TransactionForm, TransactionRecord},
    provider::{Binding, TransferRequest},
    storage::{self, KeyValueStore},
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Waiting on the wallet to approve an account request.
    Connecting,
    Connected(Address),
}

impl ConnectionState {
    pub fn account(&self) -> Option<Address> {
        match self {
            ConnectionState::Connected(account) => Some(*account),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmissionPhase {
    Validating,
    /// The wallet broadcast the value transfer.
    Submitted(TxHash),
    /// The value transfer was mined.
    Confirmed(TxHash),
    /// The ledger append for the transfer is in flight.
    Appending(TxHash),
    Completed { transfer: TxHash, append: TxHash },
    Failed(String),
}

/// Everything a front end renders. Published through [`Session::subscribe`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionState {
    pub connection: ConnectionState,
    pub form: TransactionForm,
    pub transactions: Vec<TransactionRecord>,
    /// Last known ledger length, cached across sessions.
    pub transaction_count: Option<u64>,
    /// Ledger length `transactions` was fetched at.
    pub synced_count: Option<u64>,
    pub is_loading: bool,
    pub submission: Option<SubmissionPhase>,
    /// Confirmed transfers whose ledger entry is not known to exist yet.
    pub pending_appends: Vec<PendingAppend>,
    pub last_error: Option<String>,
}

impl SessionState {
    pub fn current_account(&self) -> Option<Address> {
        self.connection.account()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubmissionOutcome {
    pub transfer: TxHash,
    pub append: TxHash,
    pub transaction_count: u64,
}

// Held for the duration of a submission or retry.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns the wallet session: connection, cached count, history and submissions.
pub struct Session {
    binding: Option<Binding>,
    store: Arc<dyn KeyValueStore>,
    state: watch::Sender<SessionState>,
    in_flight: AtomicBool,
}

impl Session {
    /// Creates a session over an optional injected wallet binding, restoring the
    /// cached count and the pending-append journal from `store`.
    pub fn new(binding: Option<Binding>, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let state = SessionState {
            transaction_count: storage::load_transaction_count(store.as_ref())?,
            pending_appends: storage::load_pending_appends(store.as_ref())?,
            ..Default::default()
        };
        if binding.is_none() {
            warn!("no wallet provider injected");
        }
        let (state, _) = watch::channel(state);
        Ok(Self {
            binding,
            store,
            state,
            in_flight: AtomicBool::new(false),
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// A snapshot of the current state.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn current_account(&self) -> Option<Address> {
        self.state.borrow().current_account()
    }

    pub fn binding(&self) -> Result<&Binding> {
        self.binding.as_ref().ok_or(SessionError::ProviderUnavailable)
    }

    fn update(&self, f: impl FnOnce(&mut SessionState)) {
        self.state.send_modify(f);
    }

    fn record(&self, err: SessionError) -> SessionError {
        error!(error = %err, "session error");
        let msg = err.to_string();
        self.update(|s| s.last_error = Some(msg));
        err
    }

    /// Runs once when the front end starts: silently restores a previously
    /// granted account, reconciles the cached count with the contract and, when
    /// connected, loads history and checks the pending-append journal.
    pub async fn mount(&self) -> Result<()> {
        self.binding().map_err(|e| self.record(e))?;
        let account = self.restore_connection().await?;
        if account.is_none() {
            self.reconcile_count().await?;
            return Ok(());
        }
        match self.sync().await? {
            Some(ledger) => self.match_pending(&ledger).map(|_| ()),
            None => self.reconcile_pending().await.map(|_| ()),
        }
    }

    /// Everything `mount` does, with transient state dropped first.
    pub async fn reload(&self) -> Result<()> {
        debug!("reloading session");
        self.update(|s| {
            s.form = TransactionForm::default();
            s.transactions.clear();
            s.synced_count = None;
            s.submission = None;
            s.last_error = None;
        });
        self.mount().await
    }

    /// Adopts whatever account the wallet already exposes, without prompting.
    pub async fn restore_connection(&self) -> Result<Option<Address>> {
        let binding = self.binding().map_err(|e| self.record(e))?;
        let accounts = binding
            .wallet
            .accounts()
            .await
            .map_err(|e| self.record(e))?;
        match accounts.first() {
            Some(&account) => {
                info!(?account, "restored wallet connection");
                self.update(|s| s.connection = ConnectionState::Connected(account));
                Ok(Some(account))
            }
            None => {
                debug!("no accounts found");
                self.update(|s| s.connection = ConnectionState::Disconnected);
                Ok(None)
            }
        }
    }

    /// Prompts the wallet for account access. On approval the first account
    /// becomes active and the session reloads; on failure the connection state
    /// reverts to what it was before.
    pub async fn connect(&self) -> Result<Address> {
        let binding = self.binding().map_err(|e| self.record(e))?;

        let previous = self.state.borrow().connection.clone();
        self.update(|s| s.connection = ConnectionState::Connecting);

        let approved = binding
            .wallet
            .request_accounts()
            .await
            .and_then(|accounts| {
                accounts.first().copied().ok_or_else(|| {
                    SessionError::ProviderRejected("wallet returned no accounts".into())
                })
            });
        let account = match approved {
            Ok(account) => account,
            Err(e) => {
                self.update(|s| s.connection = previous);
                return Err(self.record(e));
            }
        };

        info!(?account, "wallet connected");
        self.update(|s| s.connection = ConnectionState::Connected(account));
        self.reload().await?;
        Ok(account)
    }

    /// Reacts to the wallet switching or revoking accounts.
    pub async fn on_accounts_changed(&self, accounts: Vec<Address>) -> Result<()> {
        let current = self.current_account();
        match accounts.first().copied() {
            None => {
                info!("wallet revoked account access");
                self.update(|s| s.connection = ConnectionState::Disconnected);
                Ok(())
            }
            Some(account) if Some(account) == current => Ok(()),
            Some(account) => {
                info!(?account, previous = ?current, "wallet switched account");
                self.update(|s| s.connection = ConnectionState::Connected(account));
                self.reload().await
            }
        }
    }

    pub fn form(&self) -> TransactionForm {
        self.state.borrow().form.clone()
    }

    pub fn update_form(&self, field: FormField, value: impl Into<String>) {
        let value = value.into();
        self.update(|s| s.form.set(field, value));
    }

    pub fn set_form(&self, form: TransactionForm) {
        self.update(|s| s.form = form);
    }

    /// Reads the authoritative count from the contract and writes it to the cache.
    pub async fn reconcile_count(&self) -> Result<u64> {
        let binding = self.binding().map_err(|e| self.record(e))?;
        let count = binding
            .ledger
            .get_transaction_count()
            .await
            .map_err(|e| self.record(e))?;

        let cached = self.state.borrow().transaction_count;
        if cached != Some(count) {
            debug!(?cached, count, "transaction count changed");
        }
        storage::save_transaction_count(self.store.as_ref(), count).map_err(|e| self.record(e))?;
        self.update(|s| s.transaction_count = Some(count));
        Ok(count)
    }

    /// Refetches history only when the ledger length moved since the last fetch.
    pub async fn sync_history(&self) -> Result<Vec<TransactionRecord>> {
        self.sync().await?;
        Ok(self.state.borrow().transactions.clone())
    }

    /// Fetches the whole ledger and replaces the in-memory list with it.
    pub async fn refresh_history(&self) -> Result<Vec<TransactionRecord>> {
        self.fetch_ledger().await?;
        Ok(self.state.borrow().transactions.clone())
    }

    // Returns the ledger when it had to be refetched.
    async fn sync(&self) -> Result<Option<Vec<LedgerEntry>>> {
        let count = self.reconcile_count().await?;
        let synced = self.state.borrow().synced_count;
        if synced == Some(count) {
            debug!(count, "history up to date");
            return Ok(None);
        }
        self.fetch_ledger().await.map(Some)
    }

    async fn fetch_ledger(&self) -> Result<Vec<LedgerEntry>> {
        let binding = self.binding().map_err(|e| self.record(e))?;
        let entries = binding
            .ledger
            .get_all_transactions()
            .await
            .map_err(|e| self.record(e))?;
        let records = entries
            .iter()
            .map(TransactionRecord::from)
            .collect::<Vec<_>>();
        info!(count = records.len(), "loaded transaction history");

        let synced = records.len() as u64;
        self.update(|s| {
            s.transactions = records;
            s.synced_count = Some(synced);
        });
        Ok(entries)
    }

    /// Submits the current form: value transfer, then the ledger append, then a
    /// count refresh. Only one submission runs at a time.
    pub async fn submit(&self) -> Result<SubmissionOutcome> {
        let _guard = InFlight::acquire(&self.in_flight).ok_or_else(|| {
            warn!("rejecting submission while another is in flight");
            SessionError::SubmissionInFlight
        })?;

        self.update(|s| {
            s.is_loading = true;
            s.submission = Some(SubmissionPhase::Validating);
            s.last_error = None;
        });
        let res = self.run_submission().await;
        self.finish(&res);
        res
    }

    fn set_phase(&self, phase: SubmissionPhase) {
        debug!(?phase, "submission phase");
        self.update(|s| s.submission = Some(phase));
    }

    fn finish(&self, res: &Result<SubmissionOutcome>) {
        match res {
            Ok(outcome) => {
                info!(transfer = ?outcome.transfer, append = ?outcome.append, "submission completed");
                self.update(|s| {
                    s.is_loading = false;
                    s.submission = Some(SubmissionPhase::Completed {
                        transfer: outcome.transfer,
                        append: outcome.append,
                    });
                });
            }
            Err(e) => {
                error!(error = %e, "submission failed");
                let msg = e.to_string();
                self.update(|s| {
                    s.is_loading = false;
                    s.submission = Some(SubmissionPhase::Failed(msg.clone()));
                    s.last_error = Some(msg);
                });
            }
        }
    }

    async fn run_submission(&self) -> Result<SubmissionOutcome> {
        let transfer = self.form().validate()?;
        let binding = self.binding()?;
        let from = self.current_account().ok_or(SessionError::NotConnected)?;

        let tx_hash = binding
            .wallet
            .send_transaction(TransferRequest {
                from,
                to: transfer.to,
                value: transfer.amount,
            })
            .await?;
        self.set_phase(SubmissionPhase::Submitted(tx_hash));

        let receipt = binding.wallet.wait_for_receipt(tx_hash).await?;
        if !receipt.success {
            return Err(SessionError::TransferFailed(tx_hash));
        }
        self.set_phase(SubmissionPhase::Confirmed(tx_hash));

        let pending = PendingAppend {
            tx_hash,
            from,
            to: transfer.to,
            amount: transfer.amount,
            message: transfer.message,
            keyword: transfer.keyword,
            ledger_index: self.state.borrow().transaction_count.unwrap_or_default(),
        };
        let journaled = self.journal_push(pending.clone());
        let append = match self.append(&pending).await {
            Ok(append) => append,
            Err(SessionError::PartialSubmission { tx_hash, reason }) => {
                let reason = match journaled {
                    Ok(()) => reason,
                    Err(e) => format!("{} (journal not saved: {})", reason, e),
                };
                return Err(SessionError::PartialSubmission { tx_hash, reason });
            }
            Err(e) => return Err(e),
        };
        self.update(|s| s.form = TransactionForm::default());

        let transaction_count = self.reconcile_count().await?;
        if let Err(e) = self.sync_history().await {
            warn!(error = %e, "history refresh after submission failed");
        }
        Ok(SubmissionOutcome {
            transfer: tx_hash,
            append,
            transaction_count,
        })
    }

    async fn append(&self, pending: &PendingAppend) -> Result<TxHash> {
        let binding = self.binding()?;
        self.set_phase(SubmissionPhase::Appending(pending.tx_hash));
        let append = binding
            .ledger
            .add_to_blockchain(
                pending.from,
                pending.to,
                pending.amount,
                pending.message.clone(),
                pending.keyword.clone(),
            )
            .await
            .map_err(|e| SessionError::PartialSubmission {
                tx_hash: pending.tx_hash,
                reason: e.to_string(),
            })?;
        self.journal_remove(pending.tx_hash);
        Ok(append)
    }

    /// Adds `pending` to the in-memory journal, then persists it. The entry
    /// stays in memory when persisting fails.
    fn journal_push(&self, pending: PendingAppend) -> Result<()> {
        let tx_hash = pending.tx_hash;
        let mut journal = self.state.borrow().pending_appends.clone();
        journal.push(pending);
        let saved = storage::save_pending_appends(self.store.as_ref(), &journal);
        if let Err(e) = &saved {
            warn!(error = %e, ?tx_hash, "could not persist pending ledger append");
        }
        self.update(|s| s.pending_appends = journal);
        saved
    }

    // A stale persisted entry is dropped by the next `reconcile_pending`.
    fn journal_remove(&self, tx_hash: TxHash) {
        let mut journal = self.state.borrow().pending_appends.clone();
        journal.retain(|p| p.tx_hash != tx_hash);
        if let Err(e) = storage::save_pending_appends(self.store.as_ref(), &journal) {
            warn!(error = %e, ?tx_hash, "could not persist ledger append completion");
        }
        self.update(|s| s.pending_appends = journal);
    }

    /// Drops journal entries whose ledger append has landed after all and
    /// returns the transfers that still have no ledger entry.
    pub async fn reconcile_pending(&self) -> Result<Vec<PendingAppend>> {
        let empty = self.state.borrow().pending_appends.is_empty();
        if empty {
            return Ok(Vec::new());
        }
        let ledger = self.fetch_ledger().await?;
        self.match_pending(&ledger)
    }

    fn match_pending(&self, ledger: &[LedgerEntry]) -> Result<Vec<PendingAppend>> {
        let journal = self.state.borrow().pending_appends.clone();
        if journal.is_empty() {
            return Ok(journal);
        }
        let unmatched = PendingAppend::unmatched(&journal, ledger);

        if unmatched.len() != journal.len() {
            info!(
                reconciled = journal.len() - unmatched.len(),
                "pending ledger appends found on chain"
            );
            storage::save_pending_appends(self.store.as_ref(), &unmatched)
                .map_err(|e| self.record(e))?;
        }
        if !unmatched.is_empty() {
            warn!(
                count = unmatched.len(),
                "transfers mined without a ledger entry"
            );
        }
        let published = unmatched.clone();
        self.update(|s| s.pending_appends = published);
        Ok(unmatched)
    }

    /// Retries the ledger append of one journaled transfer. The connected
    /// account must be the transfer's sender.
    pub async fn retry_append(&self, tx_hash: TxHash) -> Result<SubmissionOutcome> {
        let _guard = InFlight::acquire(&self.in_flight).ok_or(SessionError::SubmissionInFlight)?;

        self.update(|s| {
            s.is_loading = true;
            s.last_error = None;
        });
        let res = self.run_retry(tx_hash).await;
        self.finish(&res);
        res
    }

    async fn run_retry(&self, tx_hash: TxHash) -> Result<SubmissionOutcome> {
        let pending = self
            .state
            .borrow()
            .pending_appends
            .iter()
            .find(|p| p.tx_hash == tx_hash)
            .cloned()
            .ok_or(SessionError::UnknownPendingAppend(tx_hash))?;
        let connected = self.current_account().ok_or(SessionError::NotConnected)?;
        if connected != pending.from {
            return Err(SessionError::AccountMismatch {
                expected: pending.from,
                connected,
            });
        }

        info!(?tx_hash, "retrying ledger append");
        let append = self.append(&pending).await?;
        let transaction_count = self.reconcile_count().await?;
        if let Err(e) = self.sync_history().await {
            warn!(error = %e, "history refresh after retry failed");
        }
        Ok(SubmissionOutcome {
            transfer: tx_hash,
            append,
            transaction_count,
        })
    }
}
