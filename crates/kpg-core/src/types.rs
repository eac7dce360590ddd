//! Core protocol types: transactions, proof-of-stake blocks, coins.
//!
//! All monetary values are in kels (1 KPG = 10^8 kels) and use `i64` per
//! protocol convention. Consensus hashing always goes through the explicit
//! little-endian byte layouts written out in this module; the serde/bincode
//! derives exist for storage and wire use and never feed a consensus hash.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto;
use crate::script::Script;

/// A 32-byte hash value.
///
/// Used for transaction IDs, block hashes, stake modifiers, and kernel
/// proofs (all SHA-256d). The byte order is the consensus serialization
/// order; the kernel difficulty comparison interprets the bytes as a
/// big-endian 256-bit unsigned integer.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash (32 zero bytes). Genesis stake modifier and null txids.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a Hash256 from a byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A 20-byte hash value (hash-160 of a public key).
///
/// Identifies key owners in P2PKH scripts and in the persisted stake index.
/// The zero value is the stake-index lookup-failure sentinel.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash160(pub [u8; 20]);

impl Hash160 {
    /// The zero key-id, used as the missing-entry sentinel by the stake index.
    pub const ZERO: Self = Self([0u8; 20]);

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Check if this is the zero key-id.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for Hash160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 20]> for Hash160 {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

/// Reference to a specific output of a previous transaction.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash,
    bincode::Encode, bincode::Decode,
)]
pub struct OutPoint {
    /// Transaction ID containing the referenced output.
    pub txid: Hash256,
    /// Index of the output within the transaction.
    pub n: u32,
}

impl OutPoint {
    /// The null outpoint. Marks proof-of-work blocks (no staked output).
    pub fn null() -> Self {
        Self {
            txid: Hash256::ZERO,
            n: u32::MAX,
        }
    }

    /// Check if this is the null outpoint.
    pub fn is_null(&self) -> bool {
        self.txid.is_zero() && self.n == u32::MAX
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.n)
    }
}

/// A transaction input, spending a previous output.
///
/// Inputs carry the spending witness directly: a compact ECDSA signature
/// and the serialized secp256k1 public key. Script interpretation stays
/// outside this crate.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxInput {
    /// The outpoint being spent.
    pub prevout: OutPoint,
    /// ECDSA signature (64-byte compact form). Empty until signed.
    pub signature: Vec<u8>,
    /// Serialized secp256k1 public key (33 or 65 bytes). Empty until signed.
    pub public_key: Vec<u8>,
}

/// A transaction output, creating a new UTXO.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxOutput {
    /// Value in kels.
    pub value: i64,
    /// Locking script of the recipient.
    pub script_pubkey: Script,
}

impl TxOutput {
    /// An empty output: zero value and empty script.
    ///
    /// The first output of every coinstake must have this shape.
    pub fn empty() -> Self {
        Self {
            value: 0,
            script_pubkey: Script::default(),
        }
    }

    /// Check for the empty marker shape (zero value AND empty script).
    pub fn is_empty(&self) -> bool {
        self.value == 0 && self.script_pubkey.is_empty()
    }
}

/// A transaction transferring value between scripts.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    /// Protocol version.
    pub version: i32,
    /// Inputs consuming previous outputs.
    pub inputs: Vec<TxInput>,
    /// New outputs created by this transaction.
    pub outputs: Vec<TxOutput>,
    /// Block height or timestamp before which this tx is invalid.
    pub lock_time: u32,
}

impl Transaction {
    /// Compute the transaction ID: SHA-256d over the canonical byte layout.
    pub fn txid(&self) -> Hash256 {
        crypto::sha256d(&self.consensus_bytes())
    }

    /// Check the coinstake shape: at least one input, at least two outputs,
    /// and an empty first output (zero value, empty script).
    pub fn is_coinstake(&self) -> bool {
        !self.inputs.is_empty() && self.outputs.len() >= 2 && self.outputs[0].is_empty()
    }

    /// Canonical little-endian serialization used for the txid.
    ///
    /// Layout: version ‖ input count ‖ inputs (prevout, length-prefixed
    /// signature and key) ‖ output count ‖ outputs (value, length-prefixed
    /// script) ‖ lock_time. Counts and length prefixes are u32 LE.
    pub fn consensus_bytes(&self) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&self.version.to_le_bytes());
        data.extend_from_slice(&(self.inputs.len() as u32).to_le_bytes());
        for input in &self.inputs {
            data.extend_from_slice(input.prevout.txid.as_bytes());
            data.extend_from_slice(&input.prevout.n.to_le_bytes());
            data.extend_from_slice(&(input.signature.len() as u32).to_le_bytes());
            data.extend_from_slice(&input.signature);
            data.extend_from_slice(&(input.public_key.len() as u32).to_le_bytes());
            data.extend_from_slice(&input.public_key);
        }
        data.extend_from_slice(&(self.outputs.len() as u32).to_le_bytes());
        for output in &self.outputs {
            data.extend_from_slice(&output.value.to_le_bytes());
            data.extend_from_slice(&(output.script_pubkey.len() as u32).to_le_bytes());
            data.extend_from_slice(output.script_pubkey.as_bytes());
        }
        data.extend_from_slice(&self.lock_time.to_le_bytes());
        data
    }
}

/// Block header with the proof-of-stake fields.
///
/// `prevout_stake` names the staked coin; `block_sig` is the producer's
/// ECDSA signature over [`hash_without_sig`](BlockHeader::hash_without_sig).
/// A null `prevout_stake` marks a proof-of-work block.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockHeader {
    /// Protocol version.
    pub version: i32,
    /// Hash of the previous block header.
    pub prev_hash: Hash256,
    /// Merkle root of the block's transactions.
    pub merkle_root: Hash256,
    /// Block timestamp (Unix seconds, snapped to the consensus grid).
    pub time: u32,
    /// Compact-form difficulty target.
    pub n_bits: u32,
    /// Header nonce.
    pub nonce: u32,
    /// The staked outpoint. Null for proof-of-work blocks.
    pub prevout_stake: OutPoint,
    /// ECDSA block signature (DER or 64-byte compact). Excluded from
    /// [`hash_without_sig`](BlockHeader::hash_without_sig).
    pub block_sig: Vec<u8>,
}

impl BlockHeader {
    /// Serialized size of the signature-free header fields.
    const BASE_SIZE: usize = 4 + 32 + 32 + 4 + 4 + 4 + 32 + 4;

    /// Compute the block hash (SHA-256d over all fields, signature included).
    pub fn hash(&self) -> Hash256 {
        let mut data = self.base_bytes();
        data.extend_from_slice(&(self.block_sig.len() as u32).to_le_bytes());
        data.extend_from_slice(&self.block_sig);
        crypto::sha256d(&data)
    }

    /// Compute the block hash with the signature omitted.
    ///
    /// This is the message the block producer signs; including the signature
    /// in its own preimage would be circular.
    pub fn hash_without_sig(&self) -> Hash256 {
        crypto::sha256d(&self.base_bytes())
    }

    /// Whether this header claims a staked output.
    pub fn is_proof_of_stake(&self) -> bool {
        !self.prevout_stake.is_null()
    }

    /// Canonical field order, all integers little-endian, signature omitted.
    fn base_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(Self::BASE_SIZE);
        data.extend_from_slice(&self.version.to_le_bytes());
        data.extend_from_slice(self.prev_hash.as_bytes());
        data.extend_from_slice(self.merkle_root.as_bytes());
        data.extend_from_slice(&self.time.to_le_bytes());
        data.extend_from_slice(&self.n_bits.to_le_bytes());
        data.extend_from_slice(&self.nonce.to_le_bytes());
        data.extend_from_slice(self.prevout_stake.txid.as_bytes());
        data.extend_from_slice(&self.prevout_stake.n.to_le_bytes());
        data
    }
}

/// A complete block: header plus transactions.
///
/// In a proof-of-stake block the first transaction is the coinbase and the
/// second is the coinstake spending `header.prevout_stake`.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Block {
    /// Block header.
    pub header: BlockHeader,
    /// Ordered list of transactions.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Whether this block claims a staked output.
    pub fn is_proof_of_stake(&self) -> bool {
        self.header.is_proof_of_stake()
    }

    /// The coinstake transaction, if the block is PoS and correctly shaped.
    pub fn coinstake(&self) -> Option<&Transaction> {
        if !self.is_proof_of_stake() {
            return None;
        }
        self.transactions.get(1).filter(|tx| tx.is_coinstake())
    }
}

/// A UTXO snapshot as returned by a coin view.
///
/// Views return `None` for spent or unknown outpoints; there is no separate
/// spent flag. Recovery of an already-spent coin from main-chain history is
/// a distinct capability on the view.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Coin {
    /// Locking script of the output.
    pub script_pubkey: Script,
    /// Value in kels.
    pub value: i64,
    /// Height of the block that created the output.
    pub height: u32,
    /// Whether the output is from a coinbase transaction.
    pub is_coinbase: bool,
}
