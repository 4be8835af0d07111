use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::crypto::{verify_signature, Address, DigitalSignature, Wallet};
use super::payload::put_len_prefixed;

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Transaction already signed")]
    AlreadySigned,

    #[error("Unauthorized signer: {0} is not a required signer")]
    UnauthorizedSigner(Address),
}

/// Decides which addresses must authorize a transaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignerPolicy {
    /// Only addresses passed to `add_reqd` are required
    #[default]
    Explicit,

    /// Every input owner is required in addition to `add_reqd`
    InputOwners,
}

impl SignerPolicy {
    fn tag(self) -> u8 {
        match self {
            SignerPolicy::Explicit => 0x00,
            SignerPolicy::InputOwners => 0x01,
        }
    }
}

/// Funds drawn from an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub address: Address,
    pub amount: u64,
}

/// Funds paid to an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: Address,
    pub amount: u64,
}

/// Represents a multi-party transfer
///
/// Fields are only reachable through the checked mutators, and decoding goes
/// through the same checks, so a signed body cannot be altered in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "TransactionData")]
pub struct Transaction {
    /// Addresses funds are drawn from, in order
    inputs: Vec<TxInput>,

    /// Addresses funds are paid to, in order
    outputs: Vec<TxOutput>,

    /// Addresses whose signatures are mandatory
    required_signers: BTreeSet<Address>,

    /// Signatures collected so far, keyed by signer
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    signatures: BTreeMap<Address, DigitalSignature>,

    policy: SignerPolicy,
}

/// Wire form of a transaction before its invariants are checked
#[derive(Deserialize)]
struct TransactionData {
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
    #[serde(default)]
    required_signers: BTreeSet<Address>,
    #[serde(default)]
    signatures: BTreeMap<Address, DigitalSignature>,
    #[serde(default)]
    policy: SignerPolicy,
}

impl TryFrom<TransactionData> for Transaction {
    type Error = TransactionError;

    fn try_from(data: TransactionData) -> Result<Self, Self::Error> {
        let mut tx = Transaction {
            inputs: data.inputs,
            outputs: data.outputs,
            required_signers: data.required_signers,
            signatures: BTreeMap::new(),
            policy: data.policy,
        };

        // Rebuild what the policy demands instead of trusting the wire
        if tx.policy == SignerPolicy::InputOwners {
            let owners: Vec<Address> = tx.inputs.iter().map(|input| input.address.clone()).collect();
            tx.required_signers.extend(owners);
        }

        for (address, signature) in data.signatures {
            if !tx.required_signers.contains(&address) {
                return Err(TransactionError::UnauthorizedSigner(address));
            }
            tx.signatures.insert(address, signature);
        }

        Ok(tx)
    }
}

impl Transaction {
    /// Creates an empty transaction with the explicit signer policy
    pub fn new() -> Self {
        Transaction::default()
    }

    /// Creates an empty transaction with the given signer policy
    pub fn with_policy(policy: SignerPolicy) -> Self {
        Transaction {
            policy,
            ..Transaction::default()
        }
    }

    /// Adds an input
    ///
    /// # Errors
    ///
    /// `AlreadySigned` once any signature is attached
    pub fn add_input(&mut self, address: Address, amount: u64) -> Result<(), TransactionError> {
        self.ensure_unsigned()?;

        if self.policy == SignerPolicy::InputOwners {
            self.required_signers.insert(address.clone());
        }
        self.inputs.push(TxInput { address, amount });
        Ok(())
    }

    /// Adds an output
    ///
    /// # Errors
    ///
    /// `AlreadySigned` once any signature is attached
    pub fn add_output(&mut self, address: Address, amount: u64) -> Result<(), TransactionError> {
        self.ensure_unsigned()?;
        self.outputs.push(TxOutput { address, amount });
        Ok(())
    }

    /// Adds a required signer
    ///
    /// # Errors
    ///
    /// `AlreadySigned` once any signature is attached
    pub fn add_reqd(&mut self, address: Address) -> Result<(), TransactionError> {
        self.ensure_unsigned()?;
        self.required_signers.insert(address);
        Ok(())
    }

    /// Signs the transaction with a wallet
    ///
    /// Signing again with the same wallet replaces the earlier signature.
    ///
    /// # Errors
    ///
    /// `UnauthorizedSigner` when the wallet's address is not a required signer;
    /// the transaction is left untouched in that case.
    pub fn sign(&mut self, wallet: &Wallet) -> Result<(), TransactionError> {
        let address = wallet.address();

        if !self.required_signers.contains(address) {
            warn!("Rejected signature from non-required signer {}", address);
            return Err(TransactionError::UnauthorizedSigner(address.clone()));
        }

        let signature = wallet.sign(&self.signing_bytes());
        self.signatures.insert(address.clone(), signature);

        Ok(())
    }

    /// Checks every required signature and that inputs balance outputs
    pub fn is_valid(&self) -> bool {
        if !self.is_balanced() {
            debug!(
                "Transaction unbalanced: inputs {:?}, outputs {:?}",
                self.total_input(),
                self.total_output()
            );
            return false;
        }

        let message = self.signing_bytes();

        self.required_signers.iter().all(|address| {
            let signature = match self.signatures.get(address) {
                Some(signature) => signature,
                None => {
                    debug!("Missing signature from {}", address);
                    return false;
                }
            };

            match address.to_public_key() {
                Ok(public_key) => verify_signature(&message, signature, &public_key),
                Err(err) => {
                    debug!("Required signer {} is not a valid key: {}", address, err);
                    false
                }
            }
        })
    }

    /// Whether the inputs sum to the outputs without overflow
    pub fn is_balanced(&self) -> bool {
        match (self.total_input(), self.total_output()) {
            (Some(inputs), Some(outputs)) => inputs == outputs,
            _ => false,
        }
    }

    /// Sum of input amounts, `None` on overflow
    pub fn total_input(&self) -> Option<u64> {
        self.inputs
            .iter()
            .try_fold(0u64, |total, input| total.checked_add(input.amount))
    }

    /// Sum of output amounts, `None` on overflow
    pub fn total_output(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |total, output| total.checked_add(output.amount))
    }

    pub fn inputs(&self) -> &[TxInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TxOutput] {
        &self.outputs
    }

    pub fn required_signers(&self) -> &BTreeSet<Address> {
        &self.required_signers
    }

    pub fn signatures(&self) -> &BTreeMap<Address, DigitalSignature> {
        &self.signatures
    }

    pub fn policy(&self) -> SignerPolicy {
        self.policy
    }

    pub fn is_signed(&self) -> bool {
        !self.signatures.is_empty()
    }

    /// Required signers that have not signed yet
    pub fn missing_signers(&self) -> Vec<&Address> {
        self.required_signers
            .iter()
            .filter(|address| !self.signatures.contains_key(*address))
            .collect()
    }

    /// The bytes every signer signs
    ///
    /// Covers inputs, outputs, the signer policy and the required signer set;
    /// the signatures themselves are excluded.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();

        out.extend_from_slice(&(self.inputs.len() as u64).to_le_bytes());
        for input in &self.inputs {
            put_len_prefixed(&mut out, input.address.as_str().as_bytes());
            out.extend_from_slice(&input.amount.to_le_bytes());
        }

        out.extend_from_slice(&(self.outputs.len() as u64).to_le_bytes());
        for output in &self.outputs {
            put_len_prefixed(&mut out, output.address.as_str().as_bytes());
            out.extend_from_slice(&output.amount.to_le_bytes());
        }

        out.push(self.policy.tag());

        out.extend_from_slice(&(self.required_signers.len() as u64).to_le_bytes());
        for address in &self.required_signers {
            put_len_prefixed(&mut out, address.as_str().as_bytes());
        }

        out
    }

    /// Full encoding used when the transaction is a block payload
    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.signing_bytes());

        out.extend_from_slice(&(self.signatures.len() as u64).to_le_bytes());
        for (address, signature) in &self.signatures {
            put_len_prefixed(out, address.as_str().as_bytes());
            put_len_prefixed(out, signature.0.as_bytes());
        }
    }

    fn ensure_unsigned(&self) -> Result<(), TransactionError> {
        if self.is_signed() {
            return Err(TransactionError::AlreadySigned);
        }
        Ok(())
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tx({} in, {} out, {}/{} signed)",
            self.inputs.len(),
            self.outputs.len(),
            self.signatures.len(),
            self.required_signers.len()
        )
    }
}
