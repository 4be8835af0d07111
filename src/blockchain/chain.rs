use log::{info, warn};
use thiserror::Error;

use std::sync::Arc;

use super::block::{Block, BlockHash, BlockRef, LinkStatus};
use super::payload::Payload;

/// Errors that can occur during chain operations
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Parent block does not belong to this chain")]
    ForeignParent,
}

/// Per-block verification outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkReport {
    /// Position of the block in the verified slice
    pub index: usize,

    /// Hash of the block at verification time
    pub hash: BlockHash,

    pub status: LinkStatus,
}

/// Outcome of verifying a sequence of blocks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainReport {
    pub links: Vec<LinkReport>,
}

impl ChainReport {
    /// true only if no link is broken
    pub fn is_valid(&self) -> bool {
        self.links.iter().all(|link| link.status.is_ok())
    }

    /// Reports for the broken links
    pub fn broken(&self) -> impl Iterator<Item = &LinkReport> {
        self.links.iter().filter(|link| !link.status.is_ok())
    }

    pub fn first_broken(&self) -> Option<&LinkReport> {
        self.broken().next()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// Verifies the link of every block, collecting all failures
pub fn verify_chain(blocks: &[BlockRef]) -> ChainReport {
    let links: Vec<LinkReport> = blocks
        .iter()
        .enumerate()
        .map(|(index, block)| LinkReport {
            index,
            hash: block.compute_hash(),
            status: block.link_status(),
        })
        .collect();

    for link in links.iter().filter(|link| !link.status.is_ok()) {
        warn!("Block {} ({}) no longer matches its predecessor", link.index, link.hash);
    }

    ChainReport { links }
}

/// Owns every block it creates, in creation order
///
/// Several blocks may share a parent, so the chain can branch.
#[derive(Debug)]
pub struct Blockchain {
    blocks: Vec<BlockRef>,
}

impl Blockchain {
    /// Creates a new chain holding only a genesis block
    pub fn new(genesis_payload: impl Into<Payload>) -> Self {
        let genesis = Block::root(genesis_payload);
        info!("Created genesis block {}", genesis.compute_hash());

        Blockchain {
            blocks: vec![genesis],
        }
    }

    /// Extends the most recently added block
    pub fn append(&mut self, payload: impl Into<Payload>) -> BlockRef {
        let tip = Arc::clone(self.tip());
        self.push(Block::new(payload, Some(&tip)))
    }

    /// Extends an arbitrary block of this chain
    ///
    /// # Errors
    ///
    /// `ForeignParent` when `parent` was not created by this chain
    pub fn branch(&mut self, payload: impl Into<Payload>, parent: &BlockRef) -> Result<BlockRef, ChainError> {
        if !self.contains(parent) {
            return Err(ChainError::ForeignParent);
        }
        Ok(self.push(Block::new(payload, Some(parent))))
    }

    fn push(&mut self, block: BlockRef) -> BlockRef {
        self.blocks.push(Arc::clone(&block));
        block
    }

    pub fn contains(&self, block: &BlockRef) -> bool {
        self.blocks.iter().any(|owned| Arc::ptr_eq(owned, block))
    }

    pub fn genesis(&self) -> &BlockRef {
        &self.blocks[0]
    }

    /// The most recently added block
    pub fn tip(&self) -> &BlockRef {
        // A chain always holds its genesis block
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn get(&self, index: usize) -> Option<&BlockRef> {
        self.blocks.get(index)
    }

    pub fn blocks(&self) -> &[BlockRef] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false; a chain holds at least its genesis block
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Verifies every block of the chain
    pub fn verify(&self) -> ChainReport {
        verify_chain(&self.blocks)
    }

    /// Verifies the path from `block` back to its root, nearest link first
    pub fn verify_lineage(block: &BlockRef) -> ChainReport {
        let mut lineage = vec![Arc::clone(block)];
        let mut current = block.previous_block().cloned();
        while let Some(previous) = current {
            current = previous.previous_block().cloned();
            lineage.push(previous);
        }
        verify_chain(&lineage)
    }
}
