//! Stake candidate cache for the staker's kernel search.
//!
//! A staker evaluates many outpoints against many candidate timestamps.
//! The two expensive inputs to the kernel — the creating block's time and
//! the staked amount — are immutable until a reorg past the coin's height,
//! so they are memoized per outpoint. Entries are inserted once and never
//! overwritten; the cache is owned by a single staker task and bounded by
//! caller policy.
//!
//! A cache hit that *passes* the kernel is always re-validated through the
//! uncached path: after a deep reorg the memoized pair may describe a coin
//! that no longer exists on the active branch, and the authoritative
//! re-check is what keeps a false positive from being published. The
//! common failing-candidate path stays cheap.

use std::collections::HashMap;

use kpg_core::chain::BlockIndex;
use kpg_core::error::{ProofOfStakeError, ViewError};
use kpg_core::params::ChainParams;
use kpg_core::traits::CoinView;
use kpg_core::types::OutPoint;

use crate::kernel::{check_stake_kernel_hash, KernelProof};

/// Memoized kernel inputs for one staking candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CachedStake {
    /// Timestamp of the block that created the staked output.
    pub block_from_time: u32,
    /// Staked amount in kels.
    pub amount: i64,
}

/// Per-staker memoization: outpoint → kernel inputs.
pub type StakeCache = HashMap<OutPoint, CachedStake>;

/// Memoize the kernel inputs for a candidate outpoint.
///
/// Does nothing when the outpoint is already cached, the coin is unknown
/// to the current view, the stake is not yet mature, or the creating block
/// is not an ancestor of `parent`. Never overwrites an existing entry.
pub fn cache_kernel(
    cache: &mut StakeCache,
    params: &ChainParams,
    parent: &BlockIndex,
    prevout: &OutPoint,
    view: &dyn CoinView,
) -> Result<(), ViewError> {
    if cache.contains_key(prevout) {
        return Ok(());
    }
    let Some(coin_prev) = view.coin(prevout)? else {
        return Ok(());
    };

    let is_super_staker = params.is_super_staker(&coin_prev.script_pubkey);
    let depth = i64::from(parent.height) + 1 - i64::from(coin_prev.height);
    if !is_super_staker && depth < i64::from(params.coinbase_maturity) {
        return Ok(());
    }

    let Some(block_from) = parent.ancestor(coin_prev.height) else {
        return Ok(());
    };

    cache.insert(
        prevout.clone(),
        CachedStake {
            block_from_time: block_from.time,
            amount: coin_prev.value,
        },
    );
    Ok(())
}

/// Evaluate a staking candidate, using the cache when possible.
///
/// On a cache hit the kernel runs against the memoized pair (without the
/// super-staker relaxation — the entry carries no script). A failing fast
/// path is final; a passing one falls through to
/// [`check_kernel_uncached`], whose verdict is authoritative. A cache miss
/// evaluates the uncached path directly.
pub fn check_kernel(
    params: &ChainParams,
    parent: &BlockIndex,
    n_bits: u32,
    n_time_block: u32,
    prevout: &OutPoint,
    view: &dyn CoinView,
    cache: &StakeCache,
) -> Result<KernelProof, ProofOfStakeError> {
    if let Some(stake) = cache.get(prevout) {
        let proof = check_stake_kernel_hash(
            parent,
            n_bits,
            stake.block_from_time,
            stake.amount,
            prevout,
            n_time_block,
            false,
        )?;
        if !proof.passed {
            return Ok(proof);
        }
        return check_kernel_uncached(params, parent, n_bits, n_time_block, prevout, view);
    }
    check_kernel_uncached(params, parent, n_bits, n_time_block, prevout, view)
}

/// Evaluate a staking candidate against the live view.
///
/// Fetches the coin (falling back to spent-coin recovery for outputs
/// consumed since the candidate was scanned), re-checks maturity and
/// ancestry, and runs the kernel with the super-staker flag derived from
/// the coin's actual script.
pub fn check_kernel_uncached(
    params: &ChainParams,
    parent: &BlockIndex,
    n_bits: u32,
    n_time_block: u32,
    prevout: &OutPoint,
    view: &dyn CoinView,
) -> Result<KernelProof, ProofOfStakeError> {
    let coin_prev = match view.coin(prevout)? {
        Some(coin) => coin,
        None => view
            .spent_coin_from_main_chain(parent, prevout)?
            .ok_or_else(|| ProofOfStakeError::MissingStakePrevout(prevout.to_string()))?,
    };

    let is_super_staker = params.is_super_staker(&coin_prev.script_pubkey);
    let depth = i64::from(parent.height) + 1 - i64::from(coin_prev.height);
    if !is_super_staker && depth < i64::from(params.coinbase_maturity) {
        return Err(ProofOfStakeError::Immature {
            depth,
            required: params.coinbase_maturity,
        });
    }

    let block_from = parent
        .ancestor(coin_prev.height)
        .ok_or(ProofOfStakeError::MissingAncestor(coin_prev.height))?;

    check_stake_kernel_hash(
        parent,
        n_bits,
        block_from.time,
        coin_prev.value,
        prevout,
        n_time_block,
        is_super_staker,
    )
}
