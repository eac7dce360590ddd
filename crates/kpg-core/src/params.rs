//! Consensus parameters. All monetary values in kels (1 KPG = 10^8 kels).
//!
//! Every numeric here is consensus data: changing any value on a running
//! network forks the chain. Parameters are carried in an owned
//! [`ChainParams`] created at node start and passed by reference; nothing
//! in this crate reads global state.

use std::collections::BTreeSet;

use crate::script::Script;
use crate::types::Hash160;

pub const COIN: i64 = 100_000_000;

/// Depth a staked output must be buried below the new block before it may
/// stake (blocks). Super stakers are exempt.
pub const COINBASE_MATURITY: u32 = 500;

/// Timestamp grid mask: block times must satisfy `time & MASK == 0`,
/// snapping stakes to a 16-second granularity.
pub const STAKE_TIMESTAMP_MASK: u32 = 0x0000_000F;

/// Number of reward recipients per PoS block: the staker plus the previous
/// `N - 1` stakers.
pub const MPOS_REWARD_RECIPIENTS: u32 = 10;

/// Key-ids of the mainnet super-staker scripts. Consensus data: the set is
/// fixed at compile time and identical on every node.
const MAINNET_SUPER_STAKERS: [[u8; 20]; 2] = [
    [
        0x3b, 0x8f, 0x0a, 0xd1, 0x57, 0x6c, 0x22, 0xc9, 0xc4, 0x0e,
        0x81, 0x2f, 0x66, 0x5d, 0xa1, 0x0b, 0x43, 0x1a, 0x72, 0x5d,
    ],
    [
        0x91, 0x04, 0xcc, 0x3e, 0xa2, 0xf7, 0x10, 0x58, 0xb1, 0x26,
        0x4d, 0x06, 0x9f, 0x8a, 0x26, 0xe1, 0x0c, 0xf5, 0x38, 0x27,
    ],
];

/// Consensus parameters for one deployed network.
#[derive(Clone, Debug)]
pub struct ChainParams {
    /// Required stake depth in blocks.
    pub coinbase_maturity: u32,
    /// Timestamp grid mask for PoS blocks.
    pub stake_timestamp_mask: u32,
    /// Total MPoS reward recipients (current staker included). At least 1.
    pub mpos_reward_recipients: u32,
    /// Regtest-style consensus: blocks may be minted on demand, and MPoS
    /// tolerates non-PoS history by burning those shares.
    pub mine_blocks_on_demand: bool,
    /// Scripts exempt from maturity and (with sufficient block spacing)
    /// from the kernel difficulty check.
    super_staker_scripts: BTreeSet<Script>,
}

impl ChainParams {
    /// Mainnet consensus parameters.
    pub fn mainnet() -> Self {
        let super_staker_scripts = MAINNET_SUPER_STAKERS
            .iter()
            .map(|id| Script::pay_to_pubkey_hash(&Hash160(*id)))
            .collect();
        Self {
            coinbase_maturity: COINBASE_MATURITY,
            stake_timestamp_mask: STAKE_TIMESTAMP_MASK,
            mpos_reward_recipients: MPOS_REWARD_RECIPIENTS,
            mine_blocks_on_demand: false,
            super_staker_scripts,
        }
    }

    /// Regtest consensus parameters: same kernel rules, on-demand blocks,
    /// no super stakers.
    pub fn regtest() -> Self {
        Self {
            coinbase_maturity: COINBASE_MATURITY,
            stake_timestamp_mask: STAKE_TIMESTAMP_MASK,
            mpos_reward_recipients: MPOS_REWARD_RECIPIENTS,
            mine_blocks_on_demand: true,
            super_staker_scripts: BTreeSet::new(),
        }
    }

    /// Whether a script is on the super-staker whitelist.
    pub fn is_super_staker(&self, script: &Script) -> bool {
        self.super_staker_scripts.contains(script)
    }

    /// Override the maturity depth.
    ///
    /// Available under test (or with the `testing` feature) so suites can
    /// build short chains without minting hundreds of blocks.
    #[cfg(any(test, feature = "testing"))]
    pub fn with_coinbase_maturity(mut self, maturity: u32) -> Self {
        self.coinbase_maturity = maturity;
        self
    }

    /// Install an extra super-staker script.
    ///
    /// Available under test (or with the `testing` feature); the production
    /// list is fixed at compile time.
    #[cfg(any(test, feature = "testing"))]
    pub fn with_super_staker(mut self, script: Script) -> Self {
        self.super_staker_scripts.insert(script);
        self
    }

    /// Override the recipient count.
    #[cfg(any(test, feature = "testing"))]
    pub fn with_mpos_recipients(mut self, recipients: u32) -> Self {
        self.mpos_reward_recipients = recipients;
        self
    }
}
