//! # kpg-consensus — Proof-of-stake kernel validation.
//!
//! The consensus-critical core that decides whether a block claiming to
//! stake a particular unspent output is valid:
//!
//! - [`kernel`] — stake modifier chain, kernel hash, weighted difficulty
//! - [`stake`] — full coinstake verification, key correspondence, and
//!   block-signature recovery
//! - [`cache`] — the staker's per-outpoint candidate cache
//! - [`mpos`] — MPoS reward recipient resolution and its script cache
//!
//! Everything here is synchronous and deterministic: no wall-clock reads,
//! no randomness, no floating point. Identical inputs produce bitwise
//! identical results on every platform.

pub mod cache;
pub mod kernel;
pub mod mpos;
pub mod stake;

pub use kernel::{check_stake_kernel_hash, compute_stake_modifier, KernelProof};
pub use stake::check_proof_of_stake;
