//! Stake kernel: modifier chain, kernel hash, weighted difficulty.
//!
//! A staker wins the right to produce a block when the SHA-256d of a fixed
//! 76-byte preimage falls below the compact-form target scaled by the
//! staked amount. The preimage mixes in the chain-wide stake modifier so
//! future kernels cannot be precomputed, and the time of the block that
//! created the staked output so the search space per output is one hash
//! per timestamp-grid slot.
//!
//! Every byte here is consensus-critical: a deviation in layout, width, or
//! endianness forks the chain.

use primitive_types::U256;

use kpg_core::chain::BlockIndex;
use kpg_core::compact;
use kpg_core::crypto;
use kpg_core::error::ProofOfStakeError;
use kpg_core::params::ChainParams;
use kpg_core::types::{Hash256, OutPoint};

/// Seconds past the parent block after which a super staker is exempt from
/// the difficulty comparison.
pub const SUPER_STAKER_DELAY: u32 = 64;

/// Serialized size of the kernel preimage:
/// modifier ‖ block_from_time ‖ prevout.txid ‖ prevout.n ‖ n_time_block.
const KERNEL_PREIMAGE_SIZE: usize = 32 + 4 + 32 + 4 + 4;

/// Outcome of a kernel evaluation.
///
/// The proof and the weighted target are reported whether or not the check
/// passed, so callers can log both sides of a failing comparison.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KernelProof {
    /// SHA-256d of the kernel preimage.
    pub hash_proof: Hash256,
    /// Compact-form target scaled by the staked amount.
    pub target: U256,
    /// Whether the kernel satisfied the target (or a super-staker bypass).
    pub passed: bool,
}

/// Compute the stake modifier for a block being accepted.
///
/// Genesis has the zero modifier. Every later block chains the modifier:
/// SHA-256d over the accepted kernel hash followed by the parent's
/// modifier, both as 32 consensus-order bytes. Advanced exactly once per
/// accepted block; forks carry independent sequences along each branch.
pub fn compute_stake_modifier(parent: Option<&BlockIndex>, kernel_hash: &Hash256) -> Hash256 {
    let Some(parent) = parent else {
        return Hash256::ZERO;
    };
    let mut data = Vec::with_capacity(64);
    data.extend_from_slice(kernel_hash.as_bytes());
    data.extend_from_slice(parent.stake_modifier.as_bytes());
    crypto::sha256d(&data)
}

/// Hash the kernel preimage for one `(output, timestamp)` candidate.
///
/// `block_from_time` is the timestamp of the block that created the staked
/// output; `n_time_block` is the timestamp of the block being produced.
pub fn stake_kernel_hash(
    modifier: &Hash256,
    block_from_time: u32,
    prevout: &OutPoint,
    n_time_block: u32,
) -> Hash256 {
    let mut data = Vec::with_capacity(KERNEL_PREIMAGE_SIZE);
    data.extend_from_slice(modifier.as_bytes());
    data.extend_from_slice(&block_from_time.to_le_bytes());
    data.extend_from_slice(prevout.txid.as_bytes());
    data.extend_from_slice(&prevout.n.to_le_bytes());
    data.extend_from_slice(&n_time_block.to_le_bytes());
    debug_assert_eq!(data.len(), KERNEL_PREIMAGE_SIZE);
    crypto::sha256d(&data)
}

/// Scale the compact-form target by the staked amount.
///
/// A negative or overflowing compact value saturates to the maximum, as
/// does the multiplication itself: consensus requires defined behavior at
/// 2²⁵⁶ − 1 rather than language-level wrapping. In practice amounts fit
/// in ~51 bits and live targets carry 100+ leading zero bits, so honest
/// inputs never saturate.
pub fn weighted_target(n_bits: u32, amount: i64) -> U256 {
    let Ok(base) = compact::decode_compact(n_bits) else {
        return U256::MAX;
    };
    let weight = U256::from(amount.max(0) as u64);
    base.checked_mul(weight).unwrap_or(U256::MAX)
}

/// Evaluate the kernel for one candidate.
///
/// Fails with [`ProofOfStakeError::TimestampViolation`] when the candidate
/// timestamp precedes the staked output's block. Otherwise compares the
/// kernel hash against the weighted target, both treated as big-endian
/// unsigned 256-bit integers (strictly less-than passes). A super staker
/// producing at least [`SUPER_STAKER_DELAY`] seconds after the parent
/// skips the comparison.
pub fn check_stake_kernel_hash(
    parent: &BlockIndex,
    n_bits: u32,
    block_from_time: u32,
    amount: i64,
    prevout: &OutPoint,
    n_time_block: u32,
    is_super_staker: bool,
) -> Result<KernelProof, ProofOfStakeError> {
    if n_time_block < block_from_time {
        return Err(ProofOfStakeError::TimestampViolation {
            time: n_time_block,
            block_from_time,
        });
    }

    let target = weighted_target(n_bits, amount);
    let hash_proof = stake_kernel_hash(&parent.stake_modifier, block_from_time, prevout, n_time_block);

    let bypass =
        is_super_staker && n_time_block >= parent.time.saturating_add(SUPER_STAKER_DELAY);
    let passed = bypass || U256::from_big_endian(hash_proof.as_bytes()) < target;

    Ok(KernelProof { hash_proof, target, passed })
}

/// Whether a block timestamp sits on the consensus timestamp grid.
pub fn check_coinstake_timestamp(params: &ChainParams, n_time_block: u32) -> bool {
    n_time_block & params.stake_timestamp_mask == 0
}
