use async_trait::async_trait;
use ethers::types::{Address, TxHash, H256, U256};
use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::{
    contract::LedgerContract,
    error::{Result, SessionError},
    models::LedgerEntry,
    provider::{Binding, TransferReceipt, TransferRequest, WalletProvider},
    session::Session,
    storage::{KeyValueStore, MemoryStore},
};

pub(crate) static ALICE: Lazy<Address> = Lazy::new(|| {
    "0xa94f5374Fce5edBC8E2a8697C15331677e6EbF0B"
        .parse()
        .expect("bad address")
});
pub(crate) static BOB: Lazy<Address> = Lazy::new(|| {
    "0x0d4c6c6605a729a379216c93e919711a081beba2"
        .parse()
        .expect("bad address")
});

/// Every wallet interaction, in call order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum WalletCall {
    Accounts,
    RequestAccounts,
    SendTransaction(TransferRequest),
    WaitForReceipt(TxHash),
}

#[derive(Debug, Default)]
struct WalletInner {
    exposed: Vec<Address>,
    approvable: Vec<Address>,
    reject_code: Option<i64>,
    fail_send: Option<String>,
    revert_transfer: bool,
    next_hash: u8,
    calls: Vec<WalletCall>,
}

/// A wallet that signs whatever it is handed.
#[derive(Debug, Default)]
pub(crate) struct FakeWallet {
    inner: Mutex<WalletInner>,
    send_gate: Option<Arc<Notify>>,
}

impl FakeWallet {
    /// A wallet that has not exposed any account but approves `accounts` on request.
    pub fn approving(accounts: Vec<Address>) -> Self {
        let wallet = Self::default();
        wallet.inner.lock().unwrap().approvable = accounts;
        wallet
    }

    /// A wallet that already granted `accounts` in an earlier session.
    pub fn connected(accounts: Vec<Address>) -> Self {
        let wallet = Self::approving(accounts.clone());
        wallet.inner.lock().unwrap().exposed = accounts;
        wallet
    }

    pub fn rejecting(self, code: i64) -> Self {
        self.inner.lock().unwrap().reject_code = Some(code);
        self
    }

    pub fn failing_send(self, reason: &str) -> Self {
        self.inner.lock().unwrap().fail_send = Some(reason.to_string());
        self
    }

    pub fn reverting(self) -> Self {
        self.inner.lock().unwrap().revert_transfer = true;
        self
    }

    /// Holds every `send_transaction` until the gate is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.send_gate = Some(gate);
        self
    }

    /// Simulates the user picking other accounts inside the wallet.
    pub fn switch(&self, accounts: Vec<Address>) {
        self.inner.lock().unwrap().exposed = accounts;
    }

    pub fn calls(&self) -> Vec<WalletCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    fn record(&self, call: WalletCall) {
        self.inner.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl WalletProvider for FakeWallet {
    async fn accounts(&self) -> Result<Vec<Address>> {
        self.record(WalletCall::Accounts);
        Ok(self.inner.lock().unwrap().exposed.clone())
    }

    async fn request_accounts(&self) -> Result<Vec<Address>> {
        self.record(WalletCall::RequestAccounts);
        let mut inner = self.inner.lock().unwrap();
        if let Some(code) = inner.reject_code {
            return Err(crate::provider::classify_rpc_error(code, "User rejected the request."));
        }
        inner.exposed = inner.approvable.clone();
        Ok(inner.exposed.clone())
    }

    async fn send_transaction(&self, tx: TransferRequest) -> Result<TxHash> {
        self.record(WalletCall::SendTransaction(tx));
        if let Some(gate) = &self.send_gate {
            gate.notified().await;
        }
        let mut inner = self.inner.lock().unwrap();
        if let Some(reason) = &inner.fail_send {
            return Err(SessionError::Network(reason.clone()));
        }
        inner.next_hash += 1;
        Ok(H256::repeat_byte(inner.next_hash))
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TransferReceipt> {
        self.record(WalletCall::WaitForReceipt(tx_hash));
        let success = !self.inner.lock().unwrap().revert_transfer;
        Ok(TransferReceipt { tx_hash, success })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum LedgerCall {
    GetAllTransactions,
    GetTransactionCount,
    AddToBlockchain(LedgerEntry),
}

#[derive(Debug, Default)]
struct LedgerInner {
    entries: Vec<LedgerEntry>,
    fail_append: Option<String>,
    fail_reads: bool,
    calls: Vec<LedgerCall>,
}

/// An in-memory `Transactions` contract.
#[derive(Debug, Default)]
pub(crate) struct FakeLedger {
    inner: Mutex<LedgerInner>,
}

impl FakeLedger {
    pub fn with_entries(entries: Vec<LedgerEntry>) -> Self {
        let ledger = Self::default();
        ledger.inner.lock().unwrap().entries = entries;
        ledger
    }

    pub fn fail_appends(&self, reason: Option<&str>) {
        self.inner.lock().unwrap().fail_append = reason.map(str::to_string);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.inner.lock().unwrap().fail_reads = fail;
    }

    /// Records an entry as though some other client appended it.
    pub fn push(&self, entry: LedgerEntry) {
        self.inner.lock().unwrap().entries.push(entry);
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.inner.lock().unwrap().entries.clone()
    }

    pub fn calls(&self) -> Vec<LedgerCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }
}

#[async_trait]
impl LedgerContract for FakeLedger {
    fn address(&self) -> Address {
        Address::repeat_byte(0xcc)
    }

    async fn get_all_transactions(&self) -> Result<Vec<LedgerEntry>> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(LedgerCall::GetAllTransactions);
        if inner.fail_reads {
            return Err(SessionError::Network("connection refused".into()));
        }
        Ok(inner.entries.clone())
    }

    async fn get_transaction_count(&self) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(LedgerCall::GetTransactionCount);
        if inner.fail_reads {
            return Err(SessionError::Network("connection refused".into()));
        }
        Ok(inner.entries.len() as u64)
    }

    async fn add_to_blockchain(
        &self,
        from: Address,
        receiver: Address,
        amount: U256,
        message: String,
        keyword: String,
    ) -> Result<TxHash> {
        let mut inner = self.inner.lock().unwrap();
        let entry = LedgerEntry {
            sender: from,
            receiver,
            amount,
            message,
            timestamp: (1_700_000_000 + inner.entries.len() as u64).into(),
            keyword,
        };
        inner.calls.push(LedgerCall::AddToBlockchain(entry.clone()));
        if let Some(reason) = &inner.fail_append {
            return Err(SessionError::Network(reason.clone()));
        }
        inner.entries.push(entry);
        Ok(H256::repeat_byte(0xf0))
    }
}

/// A [`MemoryStore`] whose writes to selected keys fail.
#[derive(Debug, Default)]
pub(crate) struct FlakyStore {
    inner: MemoryStore,
    failing: Mutex<Vec<String>>,
}

impl FlakyStore {
    pub fn failing(key: &str) -> Self {
        let store = Self::default();
        store.failing.lock().unwrap().push(key.to_string());
        store
    }

    fn check(&self, key: &str) -> Result<()> {
        if self.failing.lock().unwrap().iter().any(|k| k == key) {
            return Err(SessionError::Storage(format!("disk full writing {}", key)));
        }
        Ok(())
    }
}

impl KeyValueStore for FlakyStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        self.check(key)?;
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.check(key)?;
        self.inner.remove(key)
    }
}

pub(crate) struct Fixture {
    pub session: Arc<Session>,
    pub wallet: Arc<FakeWallet>,
    pub ledger: Arc<FakeLedger>,
    pub store: Arc<MemoryStore>,
}

impl Fixture {
    pub fn new(wallet: FakeWallet, ledger: FakeLedger) -> Self {
        Self::with_store(wallet, ledger, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(wallet: FakeWallet, ledger: FakeLedger, store: Arc<MemoryStore>) -> Self {
        let wallet = Arc::new(wallet);
        let ledger = Arc::new(ledger);
        let binding = Binding::new(wallet.clone(), ledger.clone());
        let session = Session::new(Some(binding), store.clone()).expect("session");
        Self {
            session: Arc::new(session),
            wallet,
            ledger,
            store,
        }
    }
}

pub(crate) fn entry(sender: Address, receiver: Address, ether: &str, keyword: &str) -> LedgerEntry {
    LedgerEntry {
        sender,
        receiver,
        amount: crate::units::parse_ether_amount(ether).expect("bad amount"),
        message: format!("{} from {:?}", keyword, sender),
        timestamp: 1_600_000_000u64.into(),
        keyword: keyword.to_string(),
    }
}
