// Blockchain module
//
// This module contains the core ledger implementation including:
// - Block payloads and their canonical encoding
// - Hash-linked blocks
// - Chain ownership and verification
// - Transaction structure with multi-party signing
// - Cryptography utilities

pub mod block;
pub mod chain;
pub mod crypto;
pub mod payload;
pub mod transaction;

// Re-export main components for easier access
pub use block::{Block, BlockHash, BlockRef, LinkStatus};
pub use chain::{verify_chain, Blockchain, ChainError, ChainReport, LinkReport};
pub use crypto::{Address, CryptoError, DigitalSignature, Wallet};
pub use payload::{Payload, PayloadError, SharedRecord, Value};
pub use transaction::{SignerPolicy, Transaction, TransactionError};
