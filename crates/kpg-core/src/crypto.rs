//! secp256k1 cryptographic operations for the KPG protocol.
//!
//! Provides the consensus digests (SHA-256d and hash-160), key management,
//! transaction-input signing, and the public-key recovery primitive used by
//! block-signature validation.
//!
//! # Signing scheme
//!
//! Transaction inputs are signed over a **sighash** that commits to:
//! - Transaction version and lock_time
//! - All input outpoints (txid + index)
//! - All outputs (value + script)
//! - The index of the input being signed
//!
//! Signatures and public keys are excluded from the sighash to avoid
//! circularity and allow inputs to be signed independently in any order.
//! Block producers sign the header hash-without-signature instead; that
//! message is defined in [`types::BlockHeader`](crate::types::BlockHeader).

use ripemd::Ripemd160;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId, Signature};
use secp256k1::{Message, SecretKey, SECP256K1};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::CryptoError;
use crate::script::{Script, ScriptKind};
use crate::types::{Hash160, Hash256, Transaction};

/// SHA-256d: double SHA-256, the consensus hash for everything 256-bit.
pub fn sha256d(data: &[u8]) -> Hash256 {
    let first = Sha256::digest(data);
    Hash256(Sha256::digest(first).into())
}

/// Hash-160: RIPEMD-160 of SHA-256, the key-id digest.
pub fn hash160(data: &[u8]) -> Hash160 {
    let sha = Sha256::digest(data);
    Hash160(Ripemd160::digest(sha).into())
}

/// secp256k1 keypair for signing transaction inputs and blocks.
///
/// Use [`KeyPair::generate`] for random keys or
/// [`KeyPair::from_secret_bytes`] for deterministic derivation from a seed.
pub struct KeyPair {
    secret: SecretKey,
}

impl KeyPair {
    /// Generate a random keypair using the thread-local cryptographic RNG.
    pub fn generate() -> Self {
        Self {
            secret: SecretKey::new(&mut rand::thread_rng()),
        }
    }

    /// Create a keypair from 32-byte secret key material.
    ///
    /// Fails if the bytes are not a valid curve scalar.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        let secret =
            SecretKey::from_slice(&bytes).map_err(|_| CryptoError::InvalidSecretKey)?;
        Ok(Self { secret })
    }

    /// Derive the public key from this keypair.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(secp256k1::PublicKey::from_secret_key(SECP256K1, &self.secret))
    }

    /// Sign a 32-byte message, returning the 64-byte compact signature.
    pub fn sign(&self, msg: &Hash256) -> [u8; 64] {
        let msg = Message::from_digest(*msg.as_bytes());
        SECP256K1.sign_ecdsa(&msg, &self.secret).serialize_compact()
    }

    /// Sign a 32-byte message, returning the DER-encoded signature.
    ///
    /// Block signatures are carried in DER form.
    pub fn sign_der(&self, msg: &Hash256) -> Vec<u8> {
        let msg = Message::from_digest(*msg.as_bytes());
        SECP256K1.sign_ecdsa(&msg, &self.secret).serialize_der().to_vec()
    }
}

impl Clone for KeyPair {
    fn clone(&self) -> Self {
        Self { secret: self.secret }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// secp256k1 public key.
///
/// The hash-160 of the *compressed* encoding is the canonical key-id used
/// in P2PKH scripts and in the stake index. Block-signature recovery also
/// matches the uncompressed encoding, so both serializations are exposed.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(secp256k1::PublicKey);

impl PublicKey {
    /// Parse a serialized public key (33-byte compressed or 65-byte
    /// uncompressed).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        secp256k1::PublicKey::from_slice(bytes)
            .map(Self)
            .map_err(|_| CryptoError::InvalidPublicKey)
    }

    /// Compressed 33-byte encoding.
    pub fn to_bytes(&self) -> [u8; 33] {
        self.0.serialize()
    }

    /// Uncompressed 65-byte encoding.
    pub fn to_bytes_uncompressed(&self) -> [u8; 65] {
        self.0.serialize_uncompressed()
    }

    /// Serialize in the requested encoding.
    pub fn serialized(&self, compressed: bool) -> Vec<u8> {
        if compressed {
            self.to_bytes().to_vec()
        } else {
            self.to_bytes_uncompressed().to_vec()
        }
    }

    /// The canonical key-id: hash-160 of the compressed encoding.
    pub fn key_id(&self) -> Hash160 {
        hash160(&self.to_bytes())
    }

    /// Verify a compact ECDSA signature over a 32-byte message.
    pub fn verify(&self, msg: &Hash256, sig: &[u8; 64]) -> Result<(), CryptoError> {
        let msg = Message::from_digest(*msg.as_bytes());
        let sig = Signature::from_compact(sig).map_err(|_| CryptoError::InvalidSignature)?;
        SECP256K1
            .verify_ecdsa(&msg, &sig, &self.0)
            .map_err(|_| CryptoError::VerificationFailed)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.to_bytes()))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.to_bytes()))
    }
}

/// One public-key recovery attempt for a given recovery id.
///
/// Returns `None` when the id or signature does not yield a valid point.
/// The 8-candidate search over `(recid, compressed)` belongs to the caller;
/// compression only affects serialization, not the recovered point.
pub fn recover_pubkey(msg: &Hash256, compact_sig: &[u8; 64], recid: i32) -> Option<PublicKey> {
    let recid = RecoveryId::from_i32(recid).ok()?;
    let sig = RecoverableSignature::from_compact(compact_sig, recid).ok()?;
    let msg = Message::from_digest(*msg.as_bytes());
    SECP256K1.recover_ecdsa(&msg, &sig).ok().map(PublicKey)
}

/// Normalize a signature to 64-byte compact form.
///
/// Accepts DER (the block-signature encoding) or compact bytes; returns
/// `None` for anything that parses as neither.
pub fn parse_signature(bytes: &[u8]) -> Option<[u8; 64]> {
    if let Ok(sig) = Signature::from_der(bytes) {
        return Some(sig.serialize_compact());
    }
    Signature::from_compact(bytes).ok().map(|sig| sig.serialize_compact())
}

/// Compute the signing hash (sighash) for a transaction input.
///
/// Commits to all inputs (outpoints only), all outputs, version, lock_time,
/// and the index of the input being signed. SHA-256d.
pub fn signature_hash(tx: &Transaction, input_index: usize) -> Result<Hash256, CryptoError> {
    if input_index >= tx.inputs.len() {
        return Err(CryptoError::InputIndexOutOfBounds {
            index: input_index,
            len: tx.inputs.len(),
        });
    }

    let mut data = Vec::new();
    data.extend_from_slice(&tx.version.to_le_bytes());

    data.extend_from_slice(&(tx.inputs.len() as u32).to_le_bytes());
    for input in &tx.inputs {
        data.extend_from_slice(input.prevout.txid.as_bytes());
        data.extend_from_slice(&input.prevout.n.to_le_bytes());
    }

    data.extend_from_slice(&(tx.outputs.len() as u32).to_le_bytes());
    for output in &tx.outputs {
        data.extend_from_slice(&output.value.to_le_bytes());
        data.extend_from_slice(&(output.script_pubkey.len() as u32).to_le_bytes());
        data.extend_from_slice(output.script_pubkey.as_bytes());
    }

    data.extend_from_slice(&tx.lock_time.to_le_bytes());
    data.extend_from_slice(&(input_index as u32).to_le_bytes());

    Ok(sha256d(&data))
}

/// Sign a transaction input in place.
///
/// Writes the compact signature and the compressed public key into the
/// input. Inputs can be signed in any order since the sighash excludes
/// signatures.
pub fn sign_transaction_input(
    tx: &mut Transaction,
    input_index: usize,
    keypair: &KeyPair,
) -> Result<(), CryptoError> {
    let sighash = signature_hash(tx, input_index)?;
    let signature = keypair.sign(&sighash);
    let pubkey = keypair.public_key().to_bytes();

    tx.inputs[input_index].signature = signature.to_vec();
    tx.inputs[input_index].public_key = pubkey.to_vec();
    Ok(())
}

/// Verify a transaction input's signature against the script it spends.
///
/// Checks that:
/// 1. The spent script is P2PKH or P2PK
/// 2. The witness public key corresponds to the script (hash-160 match for
///    P2PKH, byte-for-byte match for P2PK)
/// 3. The ECDSA signature verifies against the input's sighash
pub fn verify_input_signature(
    script_pubkey: &Script,
    tx: &Transaction,
    input_index: usize,
) -> Result<(), CryptoError> {
    let input = tx
        .inputs
        .get(input_index)
        .ok_or(CryptoError::InputIndexOutOfBounds {
            index: input_index,
            len: tx.inputs.len(),
        })?;

    match script_pubkey.kind() {
        ScriptKind::PayToPubkeyHash => {
            let expected = script_pubkey.key_id().expect("P2PKH embeds a key-id");
            if hash160(&input.public_key) != expected {
                return Err(CryptoError::KeyMismatch);
            }
        }
        ScriptKind::PayToPubkey => {
            let embedded = script_pubkey.pubkey().expect("P2PK embeds a key");
            if input.public_key != embedded {
                return Err(CryptoError::KeyMismatch);
            }
        }
        ScriptKind::Burn | ScriptKind::NonStandard => {
            return Err(CryptoError::UnsupportedScript);
        }
    }

    let pubkey = PublicKey::from_bytes(&input.public_key)?;
    let sig = parse_signature(&input.signature).ok_or(CryptoError::InvalidSignature)?;
    let sighash = signature_hash(tx, input_index)?;
    pubkey.verify(&sighash, &sig)
}
