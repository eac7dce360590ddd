//! Error types for the KPG protocol.
use thiserror::Error;

/// Transient lookup failures from external storage.
///
/// These are local I/O conditions, not consensus verdicts: callers may retry
/// at their discretion and must not penalize peers for them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ViewError {
    #[error("coin lookup I/O: {0}")] CoinLookupIo(String),
    #[error("block read I/O: {0}")] BlockReadIo(String),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactError {
    #[error("compact target is negative")] Negative,
    #[error("compact target overflows 256 bits")] Overflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid secret key bytes")] InvalidSecretKey,
    #[error("invalid public key bytes")] InvalidPublicKey,
    #[error("invalid signature bytes")] InvalidSignature,
    #[error("signature verification failed")] VerificationFailed,
    #[error("public key does not match the spent script")] KeyMismatch,
    #[error("script shape cannot be spent by key")] UnsupportedScript,
    #[error("input index out of bounds: {index} >= {len}")] InputIndexOutOfBounds { index: usize, len: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("height mismatch: expected {expected}, got {got}")] HeightMismatch { expected: u32, got: u32 },
    #[error("block does not link to the current tip")] BrokenLink,
}

/// Rejection verdicts for proof-of-stake validation.
///
/// The peer-penalty band of each variant is consensus data: every
/// implementation must score identical rejections identically or the
/// network's banning policy diverges. See [`ProofOfStakeError::dos_score`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProofOfStakeError {
    #[error("transaction is not a coinstake")]
    NotCoinstake,
    #[error("stake prevout not found: {0}")]
    MissingStakePrevout(String),
    #[error("stake depth {depth} below maturity {required}")]
    Immature { depth: i64, required: u32 },
    #[error("no ancestor at height {0}")]
    MissingAncestor(u32),
    #[error("invalid coinstake signature")]
    BadSignature,
    #[error("coinstake output vector malformed")]
    MalformedCoinstake,
    #[error("stake input key does not match reward output key")]
    InputOutputKeyMismatch,
    #[error("kernel hash did not meet the weighted target")]
    KernelFailed,
    #[error("stake time {time} before kernel block time {block_from_time}")]
    TimestampViolation { time: u32, block_from_time: u32 },
    #[error(transparent)]
    View(#[from] ViewError),
}

impl ProofOfStakeError {
    /// Peer misbehavior score attached to this rejection.
    ///
    /// 100 marks the block as malicious (impossible to produce honestly),
    /// 1 marks rejections that can legitimately arise during initial sync,
    /// 0 marks local transient failures that carry no verdict at all.
    pub fn dos_score(&self) -> u32 {
        match self {
            Self::NotCoinstake
            | Self::MissingStakePrevout(_)
            | Self::Immature { .. }
            | Self::MissingAncestor(_)
            | Self::BadSignature
            | Self::MalformedCoinstake
            | Self::InputOutputKeyMismatch => 100,
            Self::KernelFailed | Self::TimestampViolation { .. } => 1,
            Self::View(_) => 0,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MposError {
    #[error("block at height {0} is not proof-of-stake")] NonPosBlock(u32),
    #[error("no active-chain block at height {0}")] MissingBlockIndex(u32),
    #[error("MPoS recipient height {0} precedes genesis")] HeightOutOfRange(i64),
    #[error(transparent)] View(#[from] ViewError),
}
