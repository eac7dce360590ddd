//! MPoS reward distribution: resolving historical staker scripts.
//!
//! Each PoS block splits its reward between the current staker and the
//! previous `N − 1` stakers, offset back by the maturity depth so every
//! recipient already holds matured rewards. Recipient scripts come from
//! the persisted stake index; resolved scripts are memoized in an owned
//! [`MposScriptCache`] keyed by height and validated against the active
//! chain's block hash on every access.
//!
//! A missing stake-index entry degrades to an OP_RETURN burn for that
//! share instead of halting the chain: one corrupted index entry must not
//! stop the network.

use std::collections::HashMap;

use tracing::warn;

use kpg_core::error::MposError;
use kpg_core::params::ChainParams;
use kpg_core::script::Script;
use kpg_core::traits::{ActiveChain, StakeIndexReader};
use kpg_core::types::{Hash256, Transaction, TxOutput};

/// A resolved recipient script, pinned to the block hash it was resolved
/// against so reorgs invalidate it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptCacheEntry {
    /// The recipient script (P2PKH of the staker, or a burn).
    pub script: Script,
    /// Active-chain block hash at the entry's height when resolved.
    pub block_hash: Hash256,
}

/// Owned cache of resolved staker scripts, keyed by block height.
///
/// Created at node start and held by the PoS subsystem; all access happens
/// on the thread holding the chain lock (single writer, single reader).
/// Every read and every write first evicts entries that left the retention
/// window or fell off the active chain.
#[derive(Debug, Default)]
pub struct MposScriptCache {
    entries: HashMap<u32, ScriptCacheEntry>,
}

impl MposScriptCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evict entries outside `height ± ⌊1.5 · N⌋` or whose pinned block
    /// hash no longer matches the active chain.
    pub fn clean(&mut self, chain: &dyn ActiveChain, params: &ChainParams, height: u32) {
        let window = params.mpos_reward_recipients * 3 / 2;
        self.entries.retain(|&entry_height, entry| {
            let in_window =
                entry_height + window >= height && entry_height <= height + window;
            if !in_window {
                return false;
            }
            chain
                .block_index_at(entry_height)
                .is_some_and(|index| index.hash == entry.block_hash)
        });
    }

    /// Cleaned lookup: the entry at `height`, if still pinned to
    /// `block_hash`.
    fn lookup(
        &mut self,
        chain: &dyn ActiveChain,
        params: &ChainParams,
        height: u32,
        block_hash: &Hash256,
    ) -> Option<Script> {
        self.clean(chain, params, height);
        self.entries
            .get(&height)
            .filter(|entry| entry.block_hash == *block_hash)
            .map(|entry| entry.script.clone())
    }

    /// Cleaned insert.
    fn store(
        &mut self,
        chain: &dyn ActiveChain,
        params: &ChainParams,
        height: u32,
        entry: ScriptCacheEntry,
    ) {
        self.clean(chain, params, height);
        self.entries.insert(height, entry);
    }
}

/// Resolve the recipient script for the block at `height` and append it.
///
/// Cache hit (height and block hash both match) short-circuits. Otherwise
/// the stake index provides the staker's key-id: a zero key-id (the
/// missing-entry sentinel) burns the share, anything else pays P2PKH, and
/// either outcome is cached. A non-PoS block at `height` is tolerated only
/// on an on-demand-mining chain, again as a burn.
pub fn add_mpos_script(
    cache: &mut MposScriptCache,
    list: &mut Vec<Script>,
    chain: &dyn ActiveChain,
    stake_index: &dyn StakeIndexReader,
    params: &ChainParams,
    height: u32,
) -> Result<(), MposError> {
    let index = chain
        .block_index_at(height)
        .ok_or(MposError::MissingBlockIndex(height))?;

    if let Some(script) = cache.lookup(chain, params, height, &index.hash) {
        list.push(script);
        return Ok(());
    }

    let script = if index.proof_of_stake {
        let staker = stake_index.read_stake_index(height)?;
        let script = if staker.is_zero() {
            warn!(height, "stake index entry missing, burning MPoS share");
            Script::burn()
        } else {
            Script::pay_to_pubkey_hash(&staker)
        };
        cache.store(
            chain,
            params,
            height,
            ScriptCacheEntry { script: script.clone(), block_hash: index.hash },
        );
        script
    } else if params.mine_blocks_on_demand {
        Script::burn()
    } else {
        return Err(MposError::NonPosBlock(height));
    };

    list.push(script);
    Ok(())
}

/// The `N − 1` historical recipient scripts for a block at `height`.
///
/// Recipients sit at heights `base, base − 1, …, base − (N − 2)` where
/// `base = height − maturity`, newest first. Fails if any height precedes
/// genesis or any lookup fails.
pub fn get_mpos_output_scripts(
    cache: &mut MposScriptCache,
    chain: &dyn ActiveChain,
    stake_index: &dyn StakeIndexReader,
    params: &ChainParams,
    height: u32,
) -> Result<Vec<Script>, MposError> {
    let recipients = params.mpos_reward_recipients;
    let base = i64::from(height) - i64::from(params.coinbase_maturity);

    let mut scripts = Vec::with_capacity(recipients.saturating_sub(1) as usize);
    for offset in 0..recipients.saturating_sub(1) {
        let target = base - i64::from(offset);
        let target_height =
            u32::try_from(target).map_err(|_| MposError::HeightOutOfRange(target))?;
        add_mpos_script(cache, &mut scripts, chain, stake_index, params, target_height)?;
    }
    Ok(scripts)
}

/// Append the `N − 1` MPoS reward outputs to a coinstake under
/// construction, each paying `reward_piece`.
pub fn create_mpos_outputs(
    cache: &mut MposScriptCache,
    chain: &dyn ActiveChain,
    stake_index: &dyn StakeIndexReader,
    params: &ChainParams,
    tx: &mut Transaction,
    reward_piece: i64,
    height: u32,
) -> Result<(), MposError> {
    let scripts = get_mpos_output_scripts(cache, chain, stake_index, params, height)?;
    for script_pubkey in scripts {
        tx.outputs.push(TxOutput { value: reward_piece, script_pubkey });
    }
    Ok(())
}
