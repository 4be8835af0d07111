use log::{debug, warn};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use super::payload::{Payload, PayloadError};

const TAG_NO_PREDECESSOR: u8 = 0x00;
const TAG_PREDECESSOR: u8 = 0x01;

/// Shared handle to a block; descendants keep their predecessor alive
pub type BlockRef = Arc<Block>;

/// SHA-256 digest of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockHash(pub [u8; 32]);

impl BlockHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for BlockHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(BlockHash(bytes))
    }
}

impl Serialize for BlockHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BlockHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Result of checking one block's link to its predecessor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    /// No predecessor to check
    Root,

    /// The predecessor still hashes to the stored commitment
    Intact,

    /// The predecessor changed after the commitment was taken
    Broken {
        committed: BlockHash,
        actual: BlockHash,
    },

    /// Predecessor and commitment disagree on whether the block is a root
    Inconsistent,
}

impl LinkStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, LinkStatus::Root | LinkStatus::Intact)
    }
}

/// Represents a block in the chain
///
/// The commitment to the predecessor is taken once, in [`Block::new`], and is
/// never recomputed. The payload stays writable so that later tampering can be
/// observed through [`Block::verify_link`] on descendants.
#[derive(Debug)]
pub struct Block {
    /// Data carried by this block
    payload: RwLock<Payload>,

    /// The block this one extends, `None` for a root
    previous_block: Option<BlockRef>,

    /// Hash of `previous_block` at construction time
    previous_hash: Option<BlockHash>,
}

impl Block {
    /// Creates a new block
    ///
    /// # Arguments
    ///
    /// * `payload` - The data carried by the block
    /// * `previous_block` - The block this one extends, `None` for a root
    ///
    /// # Returns
    ///
    /// A shared handle to the new block
    pub fn new(payload: impl Into<Payload>, previous_block: Option<&BlockRef>) -> BlockRef {
        let previous_hash = previous_block.map(|previous| previous.compute_hash());

        let block = Block {
            payload: RwLock::new(payload.into()),
            previous_block: previous_block.cloned(),
            previous_hash,
        };

        if let Some(hash) = &block.previous_hash {
            debug!("Created block committing to {}", hash);
        }

        Arc::new(block)
    }

    /// Creates a block with no predecessor
    pub fn root(payload: impl Into<Payload>) -> BlockRef {
        Block::new(payload, None)
    }

    /// Creates a block from untyped JSON data
    ///
    /// # Errors
    ///
    /// `PayloadError::Unsupported` when the value has no canonical encoding
    pub fn from_json(
        value: serde_json::Value,
        previous_block: Option<&BlockRef>,
    ) -> Result<BlockRef, PayloadError> {
        let payload = Payload::try_from(value)?;
        Ok(Block::new(payload, previous_block))
    }

    /// Calculates the hash of the block
    ///
    /// # Returns
    ///
    /// `SHA256(canonical(payload) || canonical(previous_hash))`
    pub fn compute_hash(&self) -> BlockHash {
        let mut hasher = Sha256::new();

        hasher.update(self.payload().canonical_bytes());

        match &self.previous_hash {
            Some(hash) => {
                hasher.update([TAG_PREDECESSOR]);
                hasher.update(hash.as_bytes());
            }
            None => hasher.update([TAG_NO_PREDECESSOR]),
        }

        BlockHash(hasher.finalize().into())
    }

    /// Classifies this block's link to its predecessor
    pub fn link_status(&self) -> LinkStatus {
        match (&self.previous_block, &self.previous_hash) {
            (None, None) => LinkStatus::Root,
            (Some(previous), Some(committed)) => {
                let actual = previous.compute_hash();
                if &actual == committed {
                    LinkStatus::Intact
                } else {
                    LinkStatus::Broken {
                        committed: *committed,
                        actual,
                    }
                }
            }
            _ => LinkStatus::Inconsistent,
        }
    }

    /// Checks the stored commitment against the predecessor's current hash
    ///
    /// A root block has nothing to check and is always intact.
    pub fn verify_link(&self) -> bool {
        let status = self.link_status();
        match &status {
            LinkStatus::Broken { committed, actual } => {
                warn!("Link broken: committed {}, predecessor now hashes to {}", committed, actual);
            }
            LinkStatus::Inconsistent => warn!("Block has a predecessor without a commitment"),
            LinkStatus::Root | LinkStatus::Intact => {}
        }
        status.is_ok()
    }

    /// Checks this block's link and every link behind it
    ///
    /// Tampering with any ancestor fails this for every later block, while
    /// [`Block::verify_link`] only fails for the tampered block's children.
    pub fn verify_ancestry(&self) -> bool {
        self.verify_link() && self.ancestors().all(Block::verify_link)
    }

    /// Read access to the payload
    pub fn payload(&self) -> RwLockReadGuard<'_, Payload> {
        self.payload.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the payload in place, returning the old one
    pub fn set_payload(&self, payload: impl Into<Payload>) -> Payload {
        let mut guard = self.payload.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, payload.into())
    }

    /// Mutates the payload in place
    pub fn update_payload<R>(&self, f: impl FnOnce(&mut Payload) -> R) -> R {
        let mut guard = self.payload.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut *guard)
    }

    pub fn previous_block(&self) -> Option<&BlockRef> {
        self.previous_block.as_ref()
    }

    pub fn previous_hash(&self) -> Option<&BlockHash> {
        self.previous_hash.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.previous_block.is_none()
    }

    /// Iterates over the predecessors, nearest first
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors {
            next: self.previous_block.as_deref(),
        }
    }

    /// Number of predecessors between this block and its root
    pub fn height(&self) -> usize {
        self.ancestors().count()
    }
}

impl Drop for Block {
    // Unlink iteratively so dropping a long chain does not recurse per block
    fn drop(&mut self) {
        let mut next = self.previous_block.take();
        while let Some(block) = next {
            match Arc::try_unwrap(block) {
                Ok(mut block) => next = block.previous_block.take(),
                Err(_) => break,
            }
        }
    }
}

/// Iterator returned by [`Block::ancestors`]
pub struct Ancestors<'a> {
    next: Option<&'a Block>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a Block;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.previous_block.as_deref();
        Some(current)
    }
}
