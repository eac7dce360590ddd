//! Proof-of-stake validation for incoming blocks.
//!
//! Three block-context checks compose here:
//!
//! - [`check_proof_of_stake`] — the coinstake gauntlet: coin exists, stake
//!   is mature, the spend is signed, and the kernel meets the weighted
//!   target. Checks run in a fixed order; later checks rely on earlier
//!   successes.
//! - [`check_block_input_pubkey_matches_output_pubkey`] — the staked input
//!   and the first reward output must pay the same key.
//! - [`check_recovered_pubkey_from_block_signature`] — the header signature
//!   must recover to the key that owns the staked output.
//!
//! Rejections carry a peer-penalty band
//! ([`ProofOfStakeError::dos_score`]): a kernel miss can legitimately
//! happen during initial sync, but a malformed coinstake cannot.

use tracing::{debug, warn};

use kpg_core::chain::BlockIndex;
use kpg_core::crypto;
use kpg_core::error::ProofOfStakeError;
use kpg_core::params::ChainParams;
use kpg_core::script::ScriptKind;
use kpg_core::traits::CoinView;
use kpg_core::types::{Block, BlockHeader, Transaction};

use crate::kernel::{check_stake_kernel_hash, KernelProof};

/// Validate a coinstake transaction in block context.
///
/// Checks, in order:
/// 1. `tx` has the coinstake shape
/// 2. The staked outpoint exists in the current view
/// 3. The stake is mature (super stakers exempt)
/// 4. The creating block is an ancestor of `parent`
/// 5. The spend signature verifies against the staked script
/// 6. The kernel meets the weighted target (or a super-staker bypass)
///
/// Returns the kernel proof on success so the caller can persist and log
/// it; the accepted kernel feeds the next stake modifier.
pub fn check_proof_of_stake(
    params: &ChainParams,
    parent: &BlockIndex,
    tx: &Transaction,
    n_bits: u32,
    n_time_block: u32,
    view: &dyn CoinView,
) -> Result<KernelProof, ProofOfStakeError> {
    if !tx.is_coinstake() {
        return Err(ProofOfStakeError::NotCoinstake);
    }

    let txin = &tx.inputs[0];
    let coin_prev = view
        .coin(&txin.prevout)?
        .ok_or_else(|| ProofOfStakeError::MissingStakePrevout(txin.prevout.to_string()))?;

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

    if crypto::verify_input_signature(&coin_prev.script_pubkey, tx, 0).is_err() {
        warn!(prevout = %txin.prevout, "coinstake signature check failed");
        return Err(ProofOfStakeError::BadSignature);
    }

    let proof = check_stake_kernel_hash(
        parent,
        n_bits,
        block_from.time,
        coin_prev.value,
        &txin.prevout,
        n_time_block,
        is_super_staker,
    )?;
    if !proof.passed {
        let target_hex = format!("{:x}", proof.target);
        debug!(
            proof = %proof.hash_proof,
            weighted_target = %target_hex,
            prevout = %txin.prevout,
            "stake kernel below weighted target"
        );
        return Err(ProofOfStakeError::KernelFailed);
    }

    Ok(proof)
}

/// Require the staked input and the first reward output to pay the same key.
///
/// Byte-identical scripts always pass. Otherwise the single allowed
/// combination is a P2PKH stake emitting to a P2PK reward for the same
/// key-id — the shape a staker produces when exposing its raw key in the
/// coinstake. Every other combination fails.
pub fn check_block_input_pubkey_matches_output_pubkey(
    block: &Block,
    view: &dyn CoinView,
) -> Result<(), ProofOfStakeError> {
    let prevout = &block.header.prevout_stake;
    let coin_in = view
        .coin(prevout)?
        .ok_or_else(|| ProofOfStakeError::MissingStakePrevout(prevout.to_string()))?;

    let coinstake = block
        .transactions
        .get(1)
        .ok_or(ProofOfStakeError::MalformedCoinstake)?;
    if coinstake.outputs.len() < 2 {
        return Err(ProofOfStakeError::MalformedCoinstake);
    }

    let script_in = &coin_in.script_pubkey;
    let script_out = &coinstake.outputs[1].script_pubkey;
    if script_in == script_out {
        return Ok(());
    }

    match (script_in.kind(), script_out.kind()) {
        (ScriptKind::PayToPubkeyHash, ScriptKind::PayToPubkey) => {
            let key_in = script_in.key_id();
            if key_in.is_some() && key_in == script_out.key_id() {
                Ok(())
            } else {
                Err(ProofOfStakeError::InputOutputKeyMismatch)
            }
        }
        _ => Err(ProofOfStakeError::InputOutputKeyMismatch),
    }
}

/// Recover the block signer and match it against the staked coin's script.
///
/// The staked coin may already be spent by the time a block arrives (its
/// own coinstake spends it), so the lookup falls back to main-chain
/// history. Recovery tries the four recovery ids; for each recovered key
/// both the compressed and uncompressed encodings are hashed against the
/// script's key-id, and any match short-circuits. A node must not require
/// a specific `(recid, compressed)` pair.
pub fn check_recovered_pubkey_from_block_signature(
    parent: &BlockIndex,
    header: &BlockHeader,
    view: &dyn CoinView,
) -> Result<bool, ProofOfStakeError> {
    let prevout = &header.prevout_stake;
    let coin_prev = match view.coin(prevout)? {
        Some(coin) => coin,
        None => view
            .spent_coin_from_main_chain(parent, prevout)?
            .ok_or_else(|| ProofOfStakeError::MissingStakePrevout(prevout.to_string()))?,
    };

    if header.block_sig.is_empty() {
        return Ok(false);
    }
    let Some(key_id) = coin_prev.script_pubkey.key_id() else {
        return Ok(false);
    };
    let Some(compact) = crypto::parse_signature(&header.block_sig) else {
        return Ok(false);
    };

    let hash = header.hash_without_sig();
    for recid in 0..4 {
        let Some(pubkey) = crypto::recover_pubkey(&hash, &compact, recid) else {
            continue;
        };
        for compressed in [false, true] {
            if crypto::hash160(&pubkey.serialized(compressed)) == key_id {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use kpg_core::crypto::KeyPair;
    use kpg_core::script::Script;
    use kpg_core::traits::MemoryCoinView;
    use kpg_core::types::{Coin, Hash256, OutPoint, TxInput, TxOutput};
    use kpg_core::params::COIN;

    /// Easiest compact target: saturates once weighted, passes any kernel.
    const EASY_BITS: u32 = 0x207f_ffff;
    /// Hardest compact target: weighted target 1, fails any kernel.
    const HARD_BITS: u32 = 0x0300_0001;

    fn build_parent(height: u32) -> Arc<BlockIndex> {
        let mut tip = Arc::new(BlockIndex::genesis(Hash256([0; 32]), 1_600, EASY_BITS));
        for h in 1..=height {
            tip = Arc::new(BlockIndex::new_child(
                &tip,
                Hash256([h as u8; 32]),
                1_600 + h * 16,
                EASY_BITS,
                Hash256([0x0D; 32]),
                true,
            ));
        }
        tip
    }

    fn stake_outpoint() -> OutPoint {
        OutPoint { txid: Hash256([0x77; 32]), n: 1 }
    }

    fn stake_coin(script: Script, height: u32) -> Coin {
        Coin {
            script_pubkey: script,
            value: 2_000 * COIN,
            height,
            is_coinbase: false,
        }
    }

    fn signed_coinstake(keypair: &KeyPair, reward_script: Script) -> Transaction {
        let mut tx = Transaction {
            version: 1,
            inputs: vec![TxInput {
                prevout: stake_outpoint(),
                signature: vec![],
                public_key: vec![],
            }],
            outputs: vec![
                TxOutput::empty(),
                TxOutput { value: 2_001 * COIN, script_pubkey: reward_script },
            ],
            lock_time: 0,
        };
        crypto::sign_transaction_input(&mut tx, 0, keypair).unwrap();
        tx
    }

    /// A mature, correctly signed P2PKH staking setup.
    fn valid_setup(maturity: u32) -> (ChainParams, Arc<BlockIndex>, Transaction, MemoryCoinView) {
        let params = ChainParams::regtest().with_coinbase_maturity(maturity);
        let keypair = KeyPair::from_secret_bytes([0x42; 32]).unwrap();
        let script = Script::pay_to_pubkey_hash(&keypair.public_key().key_id());

        let parent = build_parent(maturity + 5);
        let mut view = MemoryCoinView::new();
        view.insert(stake_outpoint(), stake_coin(script, 2));

        let tx = signed_coinstake(&keypair, Script::pay_to_pubkey(&keypair.public_key().to_bytes()));
        (params, parent, tx, view)
    }

    fn grid_time(parent: &BlockIndex) -> u32 {
        (parent.time + 16) & !0x0F
    }

    // ------------------------------------------------------------------
    // check_proof_of_stake
    // ------------------------------------------------------------------

    #[test]
    fn valid_coinstake_passes() {
        let (params, parent, tx, view) = valid_setup(10);
        let proof = check_proof_of_stake(&params, &parent, &tx, EASY_BITS, grid_time(&parent), &view)
            .unwrap();
        assert!(proof.passed);
    }

    #[test]
    fn non_coinstake_rejected() {
        let (params, parent, mut tx, view) = valid_setup(10);
        tx.outputs[0].value = 1;
        let err = check_proof_of_stake(&params, &parent, &tx, EASY_BITS, grid_time(&parent), &view)
            .unwrap_err();
        assert_eq!(err, ProofOfStakeError::NotCoinstake);
        assert_eq!(err.dos_score(), 100);
    }

    #[test]
    fn missing_prevout_rejected() {
        let (params, parent, tx, _) = valid_setup(10);
        let empty = MemoryCoinView::new();
        let err = check_proof_of_stake(&params, &parent, &tx, EASY_BITS, grid_time(&parent), &empty)
            .unwrap_err();
        assert!(matches!(err, ProofOfStakeError::MissingStakePrevout(_)));
        assert_eq!(err.dos_score(), 100);
    }

    #[test]
    fn immature_stake_rejected() {
        // Seed scenario: coin at height 100, parent at height 500,
        // maturity 500 → depth 401 is rejected.
        let params = ChainParams::regtest();
        let keypair = KeyPair::from_secret_bytes([0x42; 32]).unwrap();
        let script = Script::pay_to_pubkey_hash(&keypair.public_key().key_id());

        let parent = build_parent(500);
        let mut view = MemoryCoinView::new();
        view.insert(stake_outpoint(), stake_coin(script, 100));
        let tx = signed_coinstake(&keypair, Script::burn());

        let err = check_proof_of_stake(&params, &parent, &tx, EASY_BITS, grid_time(&parent), &view)
            .unwrap_err();
        assert_eq!(err, ProofOfStakeError::Immature { depth: 401, required: 500 });
    }

    #[test]
    fn super_staker_exempt_from_maturity_and_difficulty() {
        // Seed scenario: coin at height 100, parent at height 101, script
        // whitelisted, block 64 seconds after the parent, impossible target.
        let keypair = KeyPair::from_secret_bytes([0x42; 32]).unwrap();
        let script = Script::pay_to_pubkey_hash(&keypair.public_key().key_id());
        let params = ChainParams::regtest().with_super_staker(script.clone());

        let parent = build_parent(101);
        let mut view = MemoryCoinView::new();
        view.insert(stake_outpoint(), stake_coin(script, 100));
        let tx = signed_coinstake(&keypair, Script::burn());

        let n_time = (parent.time + 64) & !0x0F;
        let proof =
            check_proof_of_stake(&params, &parent, &tx, HARD_BITS, n_time, &view).unwrap();
        assert!(proof.passed);
    }

    #[test]
    fn super_staker_soon_after_parent_still_fails_kernel() {
        let keypair = KeyPair::from_secret_bytes([0x42; 32]).unwrap();
        let script = Script::pay_to_pubkey_hash(&keypair.public_key().key_id());
        let params = ChainParams::regtest().with_super_staker(script.clone());

        let parent = build_parent(101);
        let mut view = MemoryCoinView::new();
        view.insert(stake_outpoint(), stake_coin(script, 100));
        let tx = signed_coinstake(&keypair, Script::burn());

        let n_time = (parent.time + 32) & !0x0F;
        let err =
            check_proof_of_stake(&params, &parent, &tx, HARD_BITS, n_time, &view).unwrap_err();
        assert_eq!(err, ProofOfStakeError::KernelFailed);
        assert_eq!(err.dos_score(), 1);
    }

    #[test]
    fn missing_ancestor_rejected() {
        // A super staker (maturity-exempt) staking a coin claimed to be
        // created above the parent: no such ancestor.
        let keypair = KeyPair::from_secret_bytes([0x42; 32]).unwrap();
        let script = Script::pay_to_pubkey_hash(&keypair.public_key().key_id());
        let params = ChainParams::regtest().with_super_staker(script.clone());

        let parent = build_parent(50);
        let mut view = MemoryCoinView::new();
        view.insert(stake_outpoint(), stake_coin(script, 60));
        let tx = signed_coinstake(&keypair, Script::burn());

        let err = check_proof_of_stake(&params, &parent, &tx, EASY_BITS, grid_time(&parent), &view)
            .unwrap_err();
        assert_eq!(err, ProofOfStakeError::MissingAncestor(60));
    }

    #[test]
    fn wrong_signer_rejected() {
        let (params, parent, _, view) = valid_setup(10);
        let intruder = KeyPair::from_secret_bytes([0x66; 32]).unwrap();
        let forged = signed_coinstake(&intruder, Script::burn());

        let err =
            check_proof_of_stake(&params, &parent, &forged, EASY_BITS, grid_time(&parent), &view)
                .unwrap_err();
        assert_eq!(err, ProofOfStakeError::BadSignature);
        assert_eq!(err.dos_score(), 100);
    }

    #[test]
    fn kernel_failure_is_soft() {
        let (params, parent, tx, view) = valid_setup(10);
        let err = check_proof_of_stake(&params, &parent, &tx, HARD_BITS, grid_time(&parent), &view)
            .unwrap_err();
        assert_eq!(err, ProofOfStakeError::KernelFailed);
        assert_eq!(err.dos_score(), 1);
    }

    #[test]
    fn stake_before_its_own_block_rejected() {
        let (params, parent, tx, view) = valid_setup(10);
        // The coin was created at height 2 (time 1632); claim an earlier block time.
        let err = check_proof_of_stake(&params, &parent, &tx, EASY_BITS, 1_600, &view).unwrap_err();
        assert!(matches!(err, ProofOfStakeError::TimestampViolation { .. }));
        assert_eq!(err.dos_score(), 1);
    }

    // ------------------------------------------------------------------
    // Input/output key correspondence
    // ------------------------------------------------------------------

    fn block_with_coinstake(tx: Transaction) -> Block {
        Block {
            header: BlockHeader {
                version: 1,
                prev_hash: Hash256([0xAA; 32]),
                merkle_root: Hash256([0xBB; 32]),
                time: 1_600,
                n_bits: EASY_BITS,
                nonce: 0,
                prevout_stake: stake_outpoint(),
                block_sig: vec![],
            },
            transactions: vec![
                Transaction { version: 1, inputs: vec![], outputs: vec![], lock_time: 0 },
                tx,
            ],
        }
    }

    #[test]
    fn identical_scripts_pass() {
        let keypair = KeyPair::from_secret_bytes([0x42; 32]).unwrap();
        let script = Script::pay_to_pubkey_hash(&keypair.public_key().key_id());
        let mut view = MemoryCoinView::new();
        view.insert(stake_outpoint(), stake_coin(script.clone(), 2));

        let block = block_with_coinstake(signed_coinstake(&keypair, script));
        assert!(check_block_input_pubkey_matches_output_pubkey(&block, &view).is_ok());
    }

    #[test]
    fn p2pkh_stake_to_p2pk_reward_same_key_passes() {
        let keypair = KeyPair::from_secret_bytes([0x42; 32]).unwrap();
        let stake_script = Script::pay_to_pubkey_hash(&keypair.public_key().key_id());
        let reward_script = Script::pay_to_pubkey(&keypair.public_key().to_bytes());
        let mut view = MemoryCoinView::new();
        view.insert(stake_outpoint(), stake_coin(stake_script, 2));

        let block = block_with_coinstake(signed_coinstake(&keypair, reward_script));
        assert!(check_block_input_pubkey_matches_output_pubkey(&block, &view).is_ok());
    }

    #[test]
    fn different_keys_fail() {
        let staker = KeyPair::from_secret_bytes([0x42; 32]).unwrap();
        let thief = KeyPair::from_secret_bytes([0x66; 32]).unwrap();
        let stake_script = Script::pay_to_pubkey_hash(&staker.public_key().key_id());
        let reward_script = Script::pay_to_pubkey(&thief.public_key().to_bytes());
        let mut view = MemoryCoinView::new();
        view.insert(stake_outpoint(), stake_coin(stake_script, 2));

        let block = block_with_coinstake(signed_coinstake(&staker, reward_script));
        assert_eq!(
            check_block_input_pubkey_matches_output_pubkey(&block, &view).unwrap_err(),
            ProofOfStakeError::InputOutputKeyMismatch
        );
    }

    #[test]
    fn reverse_direction_fails() {
        // P2PK stake emitting to P2PKH of the same key is not allowed.
        let keypair = KeyPair::from_secret_bytes([0x42; 32]).unwrap();
        let stake_script = Script::pay_to_pubkey(&keypair.public_key().to_bytes());
        let reward_script = Script::pay_to_pubkey_hash(&keypair.public_key().key_id());
        let mut view = MemoryCoinView::new();
        view.insert(stake_outpoint(), stake_coin(stake_script, 2));

        let block = block_with_coinstake(signed_coinstake(&keypair, reward_script));
        assert_eq!(
            check_block_input_pubkey_matches_output_pubkey(&block, &view).unwrap_err(),
            ProofOfStakeError::InputOutputKeyMismatch
        );
    }

    #[test]
    fn short_output_vector_is_malformed() {
        let keypair = KeyPair::from_secret_bytes([0x42; 32]).unwrap();
        let script = Script::pay_to_pubkey_hash(&keypair.public_key().key_id());
        let mut view = MemoryCoinView::new();
        view.insert(stake_outpoint(), stake_coin(script.clone(), 2));

        let mut tx = signed_coinstake(&keypair, script);
        tx.outputs.truncate(1);
        let block = block_with_coinstake(tx);
        assert_eq!(
            check_block_input_pubkey_matches_output_pubkey(&block, &view).unwrap_err(),
            ProofOfStakeError::MalformedCoinstake
        );
    }

    // ------------------------------------------------------------------
    // Block signature recovery
    // ------------------------------------------------------------------

    fn signed_header(keypair: &KeyPair, der: bool) -> BlockHeader {
        let mut header = BlockHeader {
            version: 1,
            prev_hash: Hash256([0xAA; 32]),
            merkle_root: Hash256([0xBB; 32]),
            time: 1_600,
            n_bits: EASY_BITS,
            nonce: 0,
            prevout_stake: stake_outpoint(),
            block_sig: vec![],
        };
        let msg = header.hash_without_sig();
        header.block_sig = if der {
            keypair.sign_der(&msg)
        } else {
            keypair.sign(&msg).to_vec()
        };
        header
    }

    #[test]
    fn der_signature_recovers_staker() {
        let keypair = KeyPair::from_secret_bytes([0x42; 32]).unwrap();
        let script = Script::pay_to_pubkey_hash(&keypair.public_key().key_id());
        let mut view = MemoryCoinView::new();
        view.insert(stake_outpoint(), stake_coin(script, 2));

        let parent = build_parent(3);
        let header = signed_header(&keypair, true);
        assert!(check_recovered_pubkey_from_block_signature(&parent, &header, &view).unwrap());
    }

    #[test]
    fn compact_signature_recovers_staker() {
        let keypair = KeyPair::from_secret_bytes([0x42; 32]).unwrap();
        let script = Script::pay_to_pubkey(&keypair.public_key().to_bytes());
        let mut view = MemoryCoinView::new();
        view.insert(stake_outpoint(), stake_coin(script, 2));

        let parent = build_parent(3);
        let header = signed_header(&keypair, false);
        assert!(check_recovered_pubkey_from_block_signature(&parent, &header, &view).unwrap());
    }

    #[test]
    fn uncompressed_key_script_matches() {
        let keypair = KeyPair::from_secret_bytes([0x42; 32]).unwrap();
        let key_id = crypto::hash160(&keypair.public_key().to_bytes_uncompressed());
        let script = Script::pay_to_pubkey_hash(&key_id);
        let mut view = MemoryCoinView::new();
        view.insert(stake_outpoint(), stake_coin(script, 2));

        let parent = build_parent(3);
        let header = signed_header(&keypair, true);
        assert!(check_recovered_pubkey_from_block_signature(&parent, &header, &view).unwrap());
    }

    #[test]
    fn empty_signature_fails() {
        let keypair = KeyPair::from_secret_bytes([0x42; 32]).unwrap();
        let script = Script::pay_to_pubkey_hash(&keypair.public_key().key_id());
        let mut view = MemoryCoinView::new();
        view.insert(stake_outpoint(), stake_coin(script, 2));

        let parent = build_parent(3);
        let mut header = signed_header(&keypair, true);
        header.block_sig.clear();
        assert!(!check_recovered_pubkey_from_block_signature(&parent, &header, &view).unwrap());
    }

    #[test]
    fn wrong_signer_fails() {
        let staker = KeyPair::from_secret_bytes([0x42; 32]).unwrap();
        let intruder = KeyPair::from_secret_bytes([0x66; 32]).unwrap();
        let script = Script::pay_to_pubkey_hash(&staker.public_key().key_id());
        let mut view = MemoryCoinView::new();
        view.insert(stake_outpoint(), stake_coin(script, 2));

        let parent = build_parent(3);
        let header = signed_header(&intruder, true);
        assert!(!check_recovered_pubkey_from_block_signature(&parent, &header, &view).unwrap());
    }

    #[test]
    fn spent_coin_recovered_from_history() {
        let keypair = KeyPair::from_secret_bytes([0x42; 32]).unwrap();
        let script = Script::pay_to_pubkey_hash(&keypair.public_key().key_id());
        let mut view = MemoryCoinView::new();
        view.insert_spent(stake_outpoint(), stake_coin(script, 2));

        let parent = build_parent(3);
        let header = signed_header(&keypair, true);
        assert!(check_recovered_pubkey_from_block_signature(&parent, &header, &view).unwrap());
    }

    #[test]
    fn unknown_coin_is_an_error() {
        let keypair = KeyPair::from_secret_bytes([0x42; 32]).unwrap();
        let view = MemoryCoinView::new();
        let parent = build_parent(3);
        let header = signed_header(&keypair, true);
        assert!(matches!(
            check_recovered_pubkey_from_block_signature(&parent, &header, &view).unwrap_err(),
            ProofOfStakeError::MissingStakePrevout(_)
        ));
    }

    #[test]
    fn burn_script_never_matches() {
        let keypair = KeyPair::from_secret_bytes([0x42; 32]).unwrap();
        let mut view = MemoryCoinView::new();
        view.insert(stake_outpoint(), stake_coin(Script::burn(), 2));

        let parent = build_parent(3);
        let header = signed_header(&keypair, true);
        assert!(!check_recovered_pubkey_from_block_signature(&parent, &header, &view).unwrap());
    }
}
