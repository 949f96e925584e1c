//! Block validation: proofs, context-free sanity, and connecting to a UTXO view

use std::collections::HashSet;

use crate::types::*;
use crate::error::{BlockError, Result};
use crate::economic::get_block_value;
use crate::identity::{header_signing_key, verify_header_signature};
use crate::merkle::calculate_merkle_root;
use crate::params::ChainParams;
use crate::pok::{derive_pok, embedded_pok, is_pok_block, SerializedTxCache};
use crate::pow::check_proof_of_work;
use crate::script::{ScriptVerifier, SCRIPT_VERIFY_P2SH};
use crate::serialize::block_size;
use crate::transaction::{
    calculate_tx_id, check_transaction, check_tx_inputs, is_coinbase, legacy_sigop_count, p2sh_sigops,
    value_out,
};
use crate::utxo::{transaction_outputs, UtxoCache, UtxoView};

/// CheckBlock: ℬ → {ok, FailedProofOfWork, PoKMismatch, BadHeaderSignature}
///
/// For block b = (h, txs) with a nonce header:
/// 1. CheckProofOfWork(h), which covers the embedded commitment
/// 2. Let pok = DerivePoK(h, txs); any failure is a PoK mismatch
/// 3. The commitment embedded in h.version must equal pok
///
/// With a signature header:
/// 1. h must be signed by the coinbase output key
/// 2. Let pok = DerivePoK(h, txs); any failure is a PoK mismatch
/// 3. CheckProofOfWork(h, pok)
pub fn check_block(
    block: &Block,
    params: &ChainParams,
    cache: Option<&mut SerializedTxCache>,
) -> std::result::Result<(), BlockError> {
    let header = &block.header;
    let transactions = block.transactions();

    match header.variant() {
        HeaderVariant::Nonce => {
            let embedded = embedded_pok(header, params.pok_mask);
            check_proof_of_work(header, embedded, params)?;

            let pok = derive_pok(header, transactions, params.pok_mask, cache).map_err(|_| BlockError::PoKMismatch)?;
            if embedded != pok {
                return Err(BlockError::PoKMismatch);
            }
        }
        HeaderVariant::Signature => {
            let key = transactions
                .first()
                .and_then(header_signing_key)
                .ok_or(BlockError::BadHeaderSignature)?;
            if !verify_header_signature(header, &key) {
                return Err(BlockError::BadHeaderSignature);
            }

            let pok = derive_pok(header, transactions, params.pok_mask, cache).map_err(|_| BlockError::PoKMismatch)?;
            check_proof_of_work(header, pok, params)?;
        }
    }

    Ok(())
}

/// Context-free block rules
///
/// 1. At least one transaction, serialized size ≤ max block size
/// 2. First transaction is the only coinbase
/// 3. Every transaction passes CheckTransaction
/// 4. Transaction ids are unique and the merkle root matches
/// 5. Legacy sigops ≤ max block sigops
pub fn check_block_sanity(block: &Block, params: &ChainParams) -> Result<ValidationResult> {
    let transactions = block.transactions();
    if transactions.is_empty() {
        return Ok(ValidationResult::Invalid("bad-blk-length: no transactions".to_string()));
    }
    if transactions.len() > params.max_block_size || block_size(block) > params.max_block_size {
        return Ok(ValidationResult::Invalid("bad-blk-length".to_string()));
    }

    if !is_coinbase(&transactions[0]) {
        return Ok(ValidationResult::Invalid("bad-cb-missing".to_string()));
    }
    if transactions[1..].iter().any(is_coinbase) {
        return Ok(ValidationResult::Invalid("bad-cb-multiple".to_string()));
    }

    for (i, tx) in transactions.iter().enumerate() {
        if let ValidationResult::Invalid(reason) = check_transaction(tx)? {
            return Ok(ValidationResult::Invalid(format!("{} (transaction {})", reason, i)));
        }
    }

    // duplicate txids would collide in the duplicate-last merkle rule
    let mut seen = HashSet::with_capacity(transactions.len());
    if !transactions.iter().all(|tx| seen.insert(calculate_tx_id(tx))) {
        return Ok(ValidationResult::Invalid("bad-txns-duplicate".to_string()));
    }

    if block.header.merkle_root != calculate_merkle_root(transactions) {
        return Ok(ValidationResult::Invalid("bad-txnmrklroot".to_string()));
    }

    let sigops: usize = transactions.iter().map(legacy_sigop_count).sum();
    if sigops > params.max_block_sigops {
        return Ok(ValidationResult::Invalid("bad-blk-sigops".to_string()));
    }

    Ok(ValidationResult::Valid)
}

/// ConnectBlock: ℬ × 𝒰𝒮 × ℕ → {valid, invalid} × 𝒰𝒮
///
/// For block b = (h, txs) on top of UTXO view us at height height:
/// 1. Context-free sanity; with `check_proof`, also CheckBlock
/// 2. For each transaction tx ∈ txs:
///    - Check inputs against us (existence, maturity, value ranges)
///    - Count legacy and P2SH sigops against the block ceiling
///    - Verify scripts
///    - Apply tx to us
/// 3. Let fees = Σ fee(tx)
/// 4. If coinbase output > GetBlockValue(height, fees, IsPoKBlock(h)): invalid
/// 5. Return (valid, us')
///
/// The returned overlay holds the block's spends and additions; the base
/// view is never modified.
pub fn connect_block<'a, V: UtxoView + ?Sized>(
    block: &Block,
    view: &'a V,
    height: Natural,
    params: &ChainParams,
    verifier: &dyn ScriptVerifier,
    check_proof: bool,
) -> Result<(ValidationResult, UtxoCache<'a, V>)> {
    let mut cache = UtxoCache::new(view);

    if let ValidationResult::Invalid(reason) = check_block_sanity(block, params)? {
        return Ok((ValidationResult::Invalid(reason), cache));
    }
    if check_proof {
        if let Err(err) = check_block(block, params, None) {
            return Ok((ValidationResult::Invalid(err.reason().to_string()), cache));
        }
    }

    let mut total_fees = 0i64;
    let mut sigops = 0usize;

    for (i, tx) in block.transactions().iter().enumerate() {
        sigops += legacy_sigop_count(tx);

        if !is_coinbase(tx) {
            let (input_valid, fee) = check_tx_inputs(tx, &cache, height, params.coinbase_maturity)?;
            if let ValidationResult::Invalid(reason) = input_valid {
                return Ok((ValidationResult::Invalid(format!("{} (transaction {})", reason, i)), cache));
            }

            sigops += p2sh_sigops(tx, &cache);
            if sigops > params.max_block_sigops {
                return Ok((ValidationResult::Invalid("bad-blk-sigops".to_string()), cache));
            }

            for (j, input) in tx.inputs.iter().enumerate() {
                let script_pubkey = match cache.get_utxo(&input.prevout) {
                    Some(utxo) => utxo.script_pubkey.clone(),
                    None => Vec::new(),
                };
                if !verifier.verify_input(tx, j, &script_pubkey, SCRIPT_VERIFY_P2SH) {
                    return Ok((ValidationResult::Invalid(
                        format!("mandatory-script-verify-flag-failed (transaction {}, input {})", i, j)
                    ), cache));
                }
            }

            total_fees += fee;
        }

        cache.apply_transaction(tx, height);
    }

    let coinbase_value = value_out(&block.transactions()[0]).unwrap_or(i64::MAX);
    let allowed = get_block_value(height, total_fees, is_pok_block(&block.header), params);
    if coinbase_value > allowed {
        return Ok((ValidationResult::Invalid(
            format!("bad-cb-amount: actual {} vs limit {}", coinbase_value, allowed)
        ), cache));
    }

    Ok((ValidationResult::Valid, cache))
}

/// ApplyTransaction: 𝒯𝒳 × 𝒰𝒮 → 𝒰𝒮
///
/// us' = (us \ {i.prevout : i ∈ tx.inputs}) ∪ {(tx.id, i) ↦ tx.outputs[i]}
///
/// Coinbase inputs spend nothing.
pub fn apply_transaction(tx: &Transaction, mut utxo_set: UtxoSet, height: Natural) -> UtxoSet {
    if !is_coinbase(tx) {
        for input in &tx.inputs {
            utxo_set.remove(&input.prevout);
        }
    }
    utxo_set.extend(transaction_outputs(tx, height));
    utxo_set
}
