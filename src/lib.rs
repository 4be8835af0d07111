//! A hash-linked block chain with multi-signature transactions.

pub mod blockchain;
pub mod config;

pub use blockchain::{
    Address, Block, BlockHash, BlockRef, Blockchain, ChainReport, DigitalSignature, Payload,
    SharedRecord, SignerPolicy, Transaction, TransactionError, Wallet,
};
pub use config::LedgerConfig;
