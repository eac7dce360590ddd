//! Consensus script shapes.
//!
//! Script *interpretation* lives outside this crate. Kernel validation only
//! needs to recognize the handful of shapes the protocol cares about:
//! pay-to-pubkey-hash, pay-to-pubkey, and the single-opcode OP_RETURN burn
//! emitted for unrecoverable MPoS recipients.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto;
use crate::types::Hash160;

pub const OP_RETURN: u8 = 0x6a;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;

/// Serialized length of a canonical P2PKH script.
const P2PKH_LEN: usize = 25;

/// A locking script (scriptPubKey) as raw consensus bytes.
///
/// Ordered and hashable so scripts can key the super-staker set and the
/// MPoS script cache.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Script(Vec<u8>);

/// Recognized locking-script shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptKind {
    /// `OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG`
    PayToPubkeyHash,
    /// `<33 or 65 byte key> OP_CHECKSIG`
    PayToPubkey,
    /// Single `OP_RETURN`: provably unspendable.
    Burn,
    /// Anything else.
    NonStandard,
}

impl Script {
    /// Wrap raw script bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The underlying bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical P2PKH script for a key-id.
    pub fn pay_to_pubkey_hash(key_id: &Hash160) -> Self {
        let mut bytes = Vec::with_capacity(P2PKH_LEN);
        bytes.push(OP_DUP);
        bytes.push(OP_HASH160);
        bytes.push(20);
        bytes.extend_from_slice(key_id.as_bytes());
        bytes.push(OP_EQUALVERIFY);
        bytes.push(OP_CHECKSIG);
        Self(bytes)
    }

    /// P2PK script embedding a serialized public key (33 or 65 bytes).
    pub fn pay_to_pubkey(pubkey: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(pubkey.len() + 2);
        bytes.push(pubkey.len() as u8);
        bytes.extend_from_slice(pubkey);
        bytes.push(OP_CHECKSIG);
        Self(bytes)
    }

    /// The single-opcode OP_RETURN burn script.
    pub fn burn() -> Self {
        Self(vec![OP_RETURN])
    }

    /// Classify the script shape.
    pub fn kind(&self) -> ScriptKind {
        let b = &self.0;
        if b.len() == P2PKH_LEN
            && b[0] == OP_DUP
            && b[1] == OP_HASH160
            && b[2] == 20
            && b[23] == OP_EQUALVERIFY
            && b[24] == OP_CHECKSIG
        {
            return ScriptKind::PayToPubkeyHash;
        }
        if self.pubkey().is_some() {
            return ScriptKind::PayToPubkey;
        }
        if b.len() == 1 && b[0] == OP_RETURN {
            return ScriptKind::Burn;
        }
        ScriptKind::NonStandard
    }

    /// The key-id the script pays to.
    ///
    /// The embedded hash for P2PKH, the hash-160 of the embedded key for
    /// P2PK, `None` for every other shape.
    pub fn key_id(&self) -> Option<Hash160> {
        match self.kind() {
            ScriptKind::PayToPubkeyHash => {
                let mut id = [0u8; 20];
                id.copy_from_slice(&self.0[3..23]);
                Some(Hash160(id))
            }
            ScriptKind::PayToPubkey => self.pubkey().map(crypto::hash160),
            _ => None,
        }
    }

    /// The embedded public key bytes, for P2PK scripts only.
    pub fn pubkey(&self) -> Option<&[u8]> {
        let b = &self.0;
        let key_len = *b.first()? as usize;
        if (key_len == 33 || key_len == 65)
            && b.len() == key_len + 2
            && b[key_len + 1] == OP_CHECKSIG
        {
            Some(&b[1..=key_len])
        } else {
            None
        }
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}
