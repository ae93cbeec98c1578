use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ethers::types::TxHash;
use std::{path::PathBuf, sync::Arc};
use tracing::warn;

use wallet_session::{
    bind,
    utils::{http_provider, init_tracing},
    Config, FileStore, Session, SessionError, SessionState, TransactionForm,
};

/// Terminal front end for the wallet session, run against a node that manages
/// its own accounts.
#[derive(Debug, Parser)]
struct Cli {
    /// TOML config file, WALLET_* variables override it
    #[arg(long, short)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Connection, cached count and unrecorded transfers
    Status,
    /// Request account access from the wallet
    Connect,
    /// Print the ledger
    History,
    /// Send ether and record it on the ledger
    Send {
        #[arg(long)]
        to: String,
        /// in ether, e.g. 0.1
        #[arg(long)]
        amount: String,
        #[arg(long)]
        keyword: String,
        #[arg(long)]
        message: String,
    },
    /// Check journaled transfers against the ledger
    Reconcile,
    /// Retry the ledger append of a journaled transfer
    Retry { tx_hash: String },
}

fn print_status(state: &SessionState) {
    match state.current_account() {
        Some(account) => println!("account:      {:?}", account),
        None => println!("account:      not connected"),
    }
    match state.transaction_count {
        Some(count) => println!("transactions: {}", count),
        None => println!("transactions: unknown"),
    }
    for pending in &state.pending_appends {
        println!(
            "unrecorded:   {:?} ({} wei to {:?})",
            pending.tx_hash, pending.amount, pending.to
        );
    }
}

fn print_history(state: &SessionState) {
    if state.transactions.is_empty() {
        println!("no transactions yet");
    }
    for tx in &state.transactions {
        println!(
            "{}  {:?} -> {:?}  {} ETH  [{}] {}",
            tx.display_timestamp(),
            tx.address_from,
            tx.address_to,
            tx.amount,
            tx.keyword,
            tx.message
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let provider = http_provider(&config.rpc_url)?;
    let binding = bind(
        Some(provider),
        config.contract_address,
        config.wallet_options(),
    )?;
    let store = Arc::new(FileStore::open(&config.store_path)?);
    let session = Session::new(Some(binding), store.clone())?;
    session.mount().await?;

    match cli.command {
        Command::Status => {
            println!("contract:     {:?}", session.binding()?.ledger.address());
            println!("store:        {}", store.path().display());
            print_status(&session.state());
        }
        Command::Connect => {
            let account = session.connect().await?;
            println!("connected {:?}", account);
        }
        Command::History => {
            session.sync_history().await?;
            print_history(&session.state());
        }
        Command::Send {
            to,
            amount,
            keyword,
            message,
        } => {
            if session.current_account().is_none() {
                session.connect().await?;
            }
            session.set_form(TransactionForm::new(to, amount, keyword, message));
            match session.submit().await {
                Ok(outcome) => println!(
                    "sent {:?}, ledger entry {:?}, {} transactions",
                    outcome.transfer, outcome.append, outcome.transaction_count
                ),
                Err(SessionError::PartialSubmission { tx_hash, reason }) => {
                    warn!(?tx_hash, %reason, "ledger append failed");
                    println!(
                        "transfer {:?} went through but was not recorded, run `retry {:?}`",
                        tx_hash, tx_hash
                    );
                    std::process::exit(2);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Reconcile => {
            let unmatched = session.reconcile_pending().await?;
            println!("{} transfers without a ledger entry", unmatched.len());
            print_status(&session.state());
        }
        Command::Retry { tx_hash } => {
            let tx_hash: TxHash = tx_hash.parse().context("invalid transaction hash")?;
            let outcome = session.retry_append(tx_hash).await?;
            println!(
                "recorded {:?} as {:?}, {} transactions",
                outcome.transfer, outcome.append, outcome.transaction_count
            );
        }
    }
    Ok(())
}
