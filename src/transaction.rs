//! Transaction rules: structure, coinbase shape, finality, fees and priority

use std::collections::HashSet;

use crate::types::*;
use crate::constants::*;
use crate::error::Result;
use crate::hash::hash256;
use crate::serialize::{serialize_transaction, transaction_size};
use crate::script::{count_sigops, p2sh_sigop_count};
use crate::utxo::UtxoView;

/// Transaction id: double SHA-256 of the canonical encoding
pub fn calculate_tx_id(tx: &Transaction) -> Hash {
    hash256(&serialize_transaction(tx))
}

/// IsCoinBase: 𝒯𝒳 → {true, false}
///
/// 1 ≤ |ins| ≤ 25 and every input spends the null outpoint.
pub fn is_coinbase(tx: &Transaction) -> bool {
    !tx.inputs.is_empty()
        && tx.inputs.len() <= MAX_COINBASE_INPUTS
        && tx.inputs.iter().all(|input| input.prevout.is_null())
}

pub fn is_money_range(value: Integer) -> bool {
    (0..=MAX_MONEY).contains(&value)
}

/// Σ output values, or `None` when any output or the running sum leaves the money range
pub fn value_out(tx: &Transaction) -> Option<Integer> {
    tx.outputs.iter().try_fold(0i64, |total, output| {
        if !is_money_range(output.value) {
            return None;
        }
        let total = total + output.value;
        is_money_range(total).then_some(total)
    })
}

/// CheckTransaction: 𝒯𝒳 → {valid, invalid}
///
/// A transaction tx = (v, ins, outs, lt) is valid if and only if:
/// 1. |ins| > 0 ∧ |outs| > 0
/// 2. |tx| ≤ M_max_block_size
/// 3. ∀o ∈ outs: 0 ≤ o.value ≤ M_max and Σ o.value ≤ M_max
/// 4. No outpoint is spent twice
/// 5. Coinbase: 2 ≤ |scriptSig| ≤ 100 per input; otherwise no null prevouts
pub fn check_transaction(tx: &Transaction) -> Result<ValidationResult> {
    if tx.inputs.is_empty() || tx.outputs.is_empty() {
        return Ok(ValidationResult::Invalid("bad-txns-empty".to_string()));
    }

    let size = transaction_size(tx);
    if size > MAX_TX_SIZE {
        return Ok(ValidationResult::Invalid(format!("bad-txns-oversize: {} bytes", size)));
    }

    for (i, output) in tx.outputs.iter().enumerate() {
        if output.value < 0 {
            return Ok(ValidationResult::Invalid(format!("bad-txns-vout-negative at index {}", i)));
        }
        if output.value > MAX_MONEY {
            return Ok(ValidationResult::Invalid(format!("bad-txns-vout-toolarge at index {}", i)));
        }
    }
    if value_out(tx).is_none() {
        return Ok(ValidationResult::Invalid("bad-txns-txouttotal-toolarge".to_string()));
    }

    let mut seen = HashSet::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        if !seen.insert(input.prevout) {
            return Ok(ValidationResult::Invalid("bad-txns-inputs-duplicate".to_string()));
        }
    }

    if is_coinbase(tx) {
        for input in &tx.inputs {
            let len = input.script_sig.len();
            if !(MIN_COINBASE_SCRIPT_SIZE..=MAX_COINBASE_SCRIPT_SIZE).contains(&len) {
                return Ok(ValidationResult::Invalid("bad-cb-length".to_string()));
            }
        }
    } else if tx.inputs.iter().any(|input| input.prevout.is_null()) {
        return Ok(ValidationResult::Invalid("bad-txns-prevout-null".to_string()));
    }

    Ok(ValidationResult::Valid)
}

/// CheckTxInputs: 𝒯𝒳 × 𝒰𝒮 × ℕ → {valid, invalid} × ℤ
///
/// For transaction tx spent in a block at height h:
/// 1. If tx is coinbase: return (valid, 0)
/// 2. Every input must exist; coinbase outputs need `maturity` confirmations
/// 3. Let total_in = Σᵢ us(i.prevout).value, within the money range
/// 4. If total_in < Σₒ o.value: return (invalid, 0)
/// 5. Return (valid, total_in − total_out)
pub fn check_tx_inputs<V: UtxoView + ?Sized>(
    tx: &Transaction,
    view: &V,
    spend_height: Natural,
    maturity: Natural,
) -> Result<(ValidationResult, Integer)> {
    if is_coinbase(tx) {
        return Ok((ValidationResult::Valid, 0));
    }

    let mut total_in = 0i64;
    for (i, input) in tx.inputs.iter().enumerate() {
        let utxo = match view.get_utxo(&input.prevout) {
            Some(utxo) => utxo,
            None => {
                return Ok((ValidationResult::Invalid(
                    format!("bad-txns-inputs-missingorspent: input {}", i)
                ), 0));
            }
        };
        if utxo.is_coinbase && spend_height.saturating_sub(utxo.height) < maturity {
            return Ok((ValidationResult::Invalid(
                format!("bad-txns-premature-spend-of-coinbase: input {}", i)
            ), 0));
        }
        total_in = match total_in.checked_add(utxo.value) {
            Some(total) if is_money_range(utxo.value) && is_money_range(total) => total,
            _ => return Ok((ValidationResult::Invalid("bad-txns-inputvalues-outofrange".to_string()), 0)),
        };
    }

    let total_out = value_out(tx).unwrap_or(MAX_MONEY + 1);
    if total_in < total_out {
        return Ok((ValidationResult::Invalid("bad-txns-in-belowout".to_string()), 0));
    }

    Ok((ValidationResult::Valid, total_in - total_out))
}

/// IsFinalTx: 𝒯𝒳 × ℕ × ℕ → {true, false}
///
/// Final if lock time is zero, already passed (height or time depending on
/// the threshold), or every input has a final sequence number.
pub fn is_final_tx(tx: &Transaction, block_height: Natural, block_time: u32) -> bool {
    if tx.lock_time == 0 {
        return true;
    }
    let limit = if tx.lock_time < LOCKTIME_THRESHOLD {
        block_height
    } else {
        block_time as u64
    };
    if (tx.lock_time as u64) < limit {
        return true;
    }
    tx.inputs.iter().all(|input| input.sequence == SEQUENCE_FINAL)
}

/// Σ value × confirmations over the inputs `view` resolves, for a block
/// built on top of `tip_height`
pub fn input_priority<V: UtxoView + ?Sized>(tx: &Transaction, view: &V, tip_height: Natural) -> f64 {
    tx.inputs
        .iter()
        .filter_map(|input| view.get_utxo(&input.prevout))
        .map(|utxo| {
            let confirmations = (tip_height + 1).saturating_sub(utxo.height);
            utxo.value as f64 * confirmations as f64
        })
        .sum()
}

/// Size used for priority, discounting per-input overhead and up to 110
/// bytes of scriptSig per input. Never negative.
pub fn modified_size(tx: &Transaction, size: usize) -> usize {
    tx.inputs.iter().fold(size, |size, input| {
        let offset = PRIORITY_INPUT_OVERHEAD + input.script_sig.len().min(PRIORITY_SCRIPT_SIG_ALLOWANCE);
        if size > offset {
            size - offset
        } else {
            size
        }
    })
}

/// ComputePriority: (Σ value × depth) / modified_size
pub fn compute_priority(tx: &Transaction, input_priority: f64, size: usize) -> f64 {
    let size = modified_size(tx, size);
    if size == 0 {
        return 0.0;
    }
    input_priority / size as f64
}

/// Fee per 1000 bytes
pub fn fee_per_kb(fee: Integer, size: usize) -> f64 {
    if size == 0 {
        return 0.0;
    }
    fee as f64 / (size as f64 / 1000.0)
}

/// Priority high enough to be mined without fee
pub fn allow_free(priority: f64) -> bool {
    priority > FREE_PRIORITY_THRESHOLD
}

/// Minimum fee for a transaction of `size` bytes at `fee_per_kb`
pub fn min_fee(size: usize, fee_per_kb: Integer) -> Integer {
    let fee = (1 + size as i64 / 1000) * fee_per_kb;
    fee.min(MAX_MONEY)
}

/// Legacy signature operations over every scriptSig and scriptPubKey
pub fn legacy_sigop_count(tx: &Transaction) -> usize {
    let inputs: usize = tx.inputs.iter().map(|i| count_sigops(&i.script_sig, false)).sum();
    let outputs: usize = tx.outputs.iter().map(|o| count_sigops(&o.script_pubkey, false)).sum();
    inputs + outputs
}

/// Redeem-script signature operations of pay-to-script-hash inputs
pub fn p2sh_sigops<V: UtxoView + ?Sized>(tx: &Transaction, view: &V) -> usize {
    if is_coinbase(tx) {
        return 0;
    }
    tx.inputs
        .iter()
        .filter_map(|input| {
            view.get_utxo(&input.prevout)
                .map(|utxo| p2sh_sigop_count(&utxo.script_pubkey, &input.script_sig))
        })
        .sum()
}
