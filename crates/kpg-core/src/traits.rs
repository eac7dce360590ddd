//! Trait interfaces between the validation core and its collaborators.
//!
//! - [`CoinView`] — UTXO lookups (node implements over its coin database)
//! - [`ActiveChain`] — active-branch lookups by height
//! - [`StakeIndexReader`] — persisted staker key-ids by height
//!
//! [`MemoryCoinView`] and [`MemoryStakeIndex`] are HashMap-backed
//! implementations for the staker's candidate evaluation and for tests.

use std::collections::HashMap;
use std::sync::Arc;

use crate::chain::BlockIndex;
use crate::error::ViewError;
use crate::types::{Coin, Hash160, OutPoint};

/// Read access to the UTXO set.
///
/// The two lookups are distinct capabilities: [`coin`](CoinView::coin) sees
/// only live outputs, while
/// [`spent_coin_from_main_chain`](CoinView::spent_coin_from_main_chain)
/// recovers an already-spent output from main-chain history. Callers fall
/// back to the second only where the protocol says so (block-signature
/// checks and the staker's uncached kernel path).
pub trait CoinView {
    /// Current UTXO lookup. `None` if unknown or spent.
    fn coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>, ViewError>;

    /// Recover an already-spent coin by walking main-chain blocks back
    /// from `tip`. `None` if the outpoint never existed on this branch.
    fn spent_coin_from_main_chain(
        &self,
        tip: &BlockIndex,
        outpoint: &OutPoint,
    ) -> Result<Option<Coin>, ViewError>;
}

/// Read access to the active chain by height.
pub trait ActiveChain {
    /// The active-branch entry at `height`, if within the chain.
    fn block_index_at(&self, height: u32) -> Option<Arc<BlockIndex>>;

    /// The current tip entry.
    fn tip(&self) -> Option<Arc<BlockIndex>>;
}

/// Read access to the persisted stake index.
pub trait StakeIndexReader {
    /// Hash-160 of the staker key for the block at `height`.
    ///
    /// Returns [`Hash160::ZERO`] when the index has no entry — the caller
    /// degrades rather than aborting.
    fn read_stake_index(&self, height: u32) -> Result<Hash160, ViewError>;
}

/// In-memory coin view backed by two maps: live coins and spent history.
///
/// Suitable for the staker's candidate evaluation and for tests; the
/// production node implements [`CoinView`] over its coin database.
#[derive(Debug, Default)]
pub struct MemoryCoinView {
    live: HashMap<OutPoint, Coin>,
    spent: HashMap<OutPoint, Coin>,
}

impl MemoryCoinView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a live (unspent) coin.
    pub fn insert(&mut self, outpoint: OutPoint, coin: Coin) {
        self.live.insert(outpoint, coin);
    }

    /// Record a coin as spent main-chain history.
    pub fn insert_spent(&mut self, outpoint: OutPoint, coin: Coin) {
        self.spent.insert(outpoint, coin);
    }

    /// Mark a live coin spent, moving it into history.
    pub fn spend(&mut self, outpoint: &OutPoint) -> Option<Coin> {
        let coin = self.live.remove(outpoint)?;
        self.spent.insert(outpoint.clone(), coin.clone());
        Some(coin)
    }
}

impl CoinView for MemoryCoinView {
    fn coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>, ViewError> {
        Ok(self.live.get(outpoint).cloned())
    }

    fn spent_coin_from_main_chain(
        &self,
        _tip: &BlockIndex,
        outpoint: &OutPoint,
    ) -> Result<Option<Coin>, ViewError> {
        Ok(self.spent.get(outpoint).cloned())
    }
}

/// In-memory stake index: height → staker key-id.
#[derive(Debug, Default)]
pub struct MemoryStakeIndex {
    stakers: HashMap<u32, Hash160>,
}

impl MemoryStakeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the staker key-id for a height.
    pub fn insert(&mut self, height: u32, key_id: Hash160) {
        self.stakers.insert(height, key_id);
    }
}

impl StakeIndexReader for MemoryStakeIndex {
    fn read_stake_index(&self, height: u32) -> Result<Hash160, ViewError> {
        Ok(self.stakers.get(&height).copied().unwrap_or(Hash160::ZERO))
    }
}
