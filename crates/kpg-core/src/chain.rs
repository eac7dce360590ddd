//! Block index and in-memory active chain.
//!
//! A [`BlockIndex`] is one node of the header tree: parent-linked, carrying
//! the fields kernel validation reads (time, difficulty bits, stake
//! modifier). The [`Chain`] is the distinguished active branch, indexable
//! by height. The production node keeps its own persistent index; this
//! in-memory form serves the staker and the test suites.

use std::sync::Arc;

use crate::error::ChainError;
use crate::traits::ActiveChain;
use crate::types::Hash256;

/// One entry of the header tree.
///
/// `stake_modifier` is fixed when the block is accepted and never mutated;
/// forks carry independent modifier sequences along each branch.
#[derive(Clone, Debug)]
pub struct BlockIndex {
    /// Hash of this block's header.
    pub hash: Hash256,
    /// Height above genesis.
    pub height: u32,
    /// Block timestamp (Unix seconds).
    pub time: u32,
    /// Compact-form difficulty target of this block.
    pub n_bits: u32,
    /// Stake modifier as of this block. Zero at genesis.
    pub stake_modifier: Hash256,
    /// Whether the block was produced by staking.
    pub proof_of_stake: bool,
    /// Parent entry; `None` only at genesis.
    pub prev: Option<Arc<BlockIndex>>,
}

impl BlockIndex {
    /// The genesis entry: height 0, zero stake modifier, no parent.
    pub fn genesis(hash: Hash256, time: u32, n_bits: u32) -> Self {
        Self {
            hash,
            height: 0,
            time,
            n_bits,
            stake_modifier: Hash256::ZERO,
            proof_of_stake: false,
            prev: None,
        }
    }

    /// A child entry linked to `parent`.
    pub fn new_child(
        parent: &Arc<BlockIndex>,
        hash: Hash256,
        time: u32,
        n_bits: u32,
        stake_modifier: Hash256,
        proof_of_stake: bool,
    ) -> Self {
        Self {
            hash,
            height: parent.height + 1,
            time,
            n_bits,
            stake_modifier,
            proof_of_stake,
            prev: Some(Arc::clone(parent)),
        }
    }

    /// The ancestor of this entry at the given height.
    ///
    /// Walks parent links; defined only for `height <= self.height`.
    /// Returns `None` above this entry or past a broken link.
    pub fn ancestor(&self, height: u32) -> Option<&BlockIndex> {
        if height > self.height {
            return None;
        }
        let mut cursor = self;
        while cursor.height > height {
            cursor = cursor.prev.as_deref()?;
        }
        Some(cursor)
    }
}

/// The active chain: an ordered run of block indexes from genesis.
///
/// Not thread-safe; the consensus engine owns it under the chain lock.
#[derive(Debug, Default)]
pub struct Chain {
    blocks: Vec<Arc<BlockIndex>>,
}

impl Chain {
    /// An empty chain (no genesis connected yet).
    pub fn new() -> Self {
        Self { blocks: Vec::new() }
    }

    /// Append an entry at the tip.
    ///
    /// The entry's height must be the next height and its parent link must
    /// name the current tip (genesis excepted).
    pub fn push(&mut self, index: Arc<BlockIndex>) -> Result<(), ChainError> {
        let expected = self.blocks.len() as u32;
        if index.height != expected {
            return Err(ChainError::HeightMismatch {
                expected,
                got: index.height,
            });
        }
        if let Some(tip) = self.blocks.last() {
            let linked = index
                .prev
                .as_ref()
                .is_some_and(|prev| prev.hash == tip.hash);
            if !linked {
                return Err(ChainError::BrokenLink);
            }
        }
        self.blocks.push(index);
        Ok(())
    }

    /// Drop every entry above `height` (reorg to a shorter branch).
    pub fn truncate(&mut self, height: u32) {
        self.blocks.truncate(height as usize + 1);
    }

    /// Number of entries (tip height + 1 when non-empty).
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl ActiveChain for Chain {
    fn block_index_at(&self, height: u32) -> Option<Arc<BlockIndex>> {
        self.blocks.get(height as usize).cloned()
    }

    fn tip(&self) -> Option<Arc<BlockIndex>> {
        self.blocks.last().cloned()
    }
}
