use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};

use hashledger::blockchain::crypto::{public_key_to_pem, verify_signature};
use hashledger::{Blockchain, LedgerConfig, SharedRecord, Transaction, Wallet};

#[derive(Parser)]
#[command(name = "hashledger", version, about = "Hash-linked ledger demonstrations")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Build a branching chain and detect tampering
    Chain,
    /// Generate a key pair, print it as PEM and check a signature
    Keys,
    /// Build, sign and validate a multi-party transaction
    Transaction,
    /// Run every demonstration
    All,
}

// Build the chain from the classic walkthrough, then tamper with it twice
fn run_chain() -> Result<()> {
    let mut chain = Blockchain::new("I am root");
    let root = Arc::clone(chain.genesis());

    let b1 = chain.branch(b"I am a child.", &root)?;
    chain.branch("I am B1s brother", &root)?;
    let b3 = chain.branch(12354i64, &b1)?;

    let greeting: SharedRecord = [("text", "Hi there!")].into_iter().collect();
    greeting.set("num", 328965i64);
    let b4 = chain.branch(greeting.clone(), &b3)?;
    let b5 = chain.branch("Top block", &b4)?;

    for link in chain.verify().links.iter().skip(1) {
        if link.status.is_ok() {
            info!("Success! Hash is good for block {}", link.index);
        } else {
            error!("ERROR! Hash is no good for block {}", link.index);
        }
    }

    b3.set_payload(12345i64);
    if b4.verify_link() {
        error!("ERROR! Couldn't detect tampering.");
    } else {
        info!("Success! Tampering detected.");
    }

    info!("Shared record before: {}", greeting);
    greeting.set("num", 99999i64);
    info!("Shared record after: {}", greeting);
    if b5.verify_link() {
        error!("ERROR! Couldn't detect tampering.");
    } else {
        info!("Success! Tampering detected.");
    }

    let report = chain.verify();
    info!(
        "{} of {} blocks have broken links",
        report.broken().count(),
        report.len()
    );

    Ok(())
}

fn run_keys() -> Result<()> {
    let wallet = Wallet::new();
    println!("{}", wallet.to_pem()?);
    println!("{}", public_key_to_pem(wallet.public_key())?);

    let message = b"This is a secret message";
    let signature = wallet.sign(message);
    info!("This is the signature: {}", signature);

    if verify_signature(message, &signature, wallet.public_key()) {
        info!("Success! Good Signature");
    } else {
        error!("ERROR! Signature is bad");
    }

    Ok(())
}

fn run_transaction(config: &LedgerConfig) -> Result<()> {
    let w1 = Wallet::new();
    let w2 = Wallet::new();
    let w3 = Wallet::new();

    let mut tx = Transaction::with_policy(config.signer_policy);
    tx.add_input(w1.address().clone(), 1)?;
    tx.add_output(w2.address().clone(), 1)?;
    tx.add_reqd(w1.address().clone())?;

    if let Err(err) = tx.sign(&w3) {
        info!("Success! Outsider rejected: {}", err);
    }
    tx.sign(&w1)?;

    if tx.is_valid() {
        info!("Success! Tx is valid");
    } else {
        error!("ERROR! Tx is invalid");
    }

    let mut chain = Blockchain::new("I am root");
    chain.append(tx);
    info!("Recorded transaction; chain valid: {}", chain.verify().is_valid());

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => LedgerConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => LedgerConfig::default(),
    };

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(config.log_level.as_str()));

    match cli.command.unwrap_or(Command::All) {
        Command::Chain => run_chain(),
        Command::Keys => run_keys(),
        Command::Transaction => run_transaction(&config),
        Command::All => {
            run_chain()?;
            run_keys()?;
            run_transaction(&config)
        }
    }
}
