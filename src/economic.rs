//! Block reward schedule and fee accounting

use crate::types::*;
use crate::constants::{MAX_SUBSIDY, NON_POK_SUBSIDY_PERCENT};
use crate::error::{Result, ConsensusError};
use crate::params::ChainParams;
use crate::transaction::{is_coinbase, value_out};
use crate::utxo::UtxoView;

/// GetBlockSubsidy: ℕ → ℤ
///
/// With M = MAX_SUBSIDY, L₁ = last max-subsidy block, L₂ = last decreasing block:
/// - h = 0: 0 (the genesis coinbase carries the premine)
/// - 1 ≤ h ≤ L₁: M
/// - L₁ < h ≤ L₂: ⌊M · (L₂ − h + 1) / (L₂ − L₁ + 1)⌋
/// - h > L₂: 0, blocks earn fees only
pub fn get_block_subsidy(height: Natural, params: &ChainParams) -> Integer {
    let last_max = params.last_max_subsidy_block;
    let last_decreasing = params.last_decreasing_subsidy_block;
    if height == 0 || height > last_decreasing {
        return 0;
    }
    if height <= last_max {
        return MAX_SUBSIDY;
    }
    let steps = (last_decreasing - last_max + 1) as i128;
    let remaining = (last_decreasing - height + 1) as i128;
    (MAX_SUBSIDY as i128 * remaining / steps) as Integer
}

/// GetBlockValue: subsidy plus the fees collected by the block
///
/// Blocks mined without a proof of knowledge keep only
/// NON_POK_SUBSIDY_PERCENT of the subsidy; fees are always paid in full.
pub fn get_block_value(height: Natural, fees: Integer, use_pok: bool, params: &ChainParams) -> Integer {
    let subsidy = get_block_subsidy(height, params);
    let subsidy = if use_pok {
        subsidy
    } else {
        subsidy * NON_POK_SUBSIDY_PERCENT / 100
    };
    subsidy + fees
}

/// TotalSupply: ℕ → ℤ
///
/// Σ subsidy(h) for h ∈ [0, height], premine excluded. The decreasing
/// segment is summed in closed form.
pub fn total_supply(height: Natural, params: &ChainParams) -> Integer {
    let last_decreasing = params.last_decreasing_subsidy_block;
    let last_max = params.last_max_subsidy_block.min(last_decreasing);

    let flat = height.min(last_max) as i128 * MAX_SUBSIDY as i128;
    if height <= last_max {
        return flat as Integer;
    }

    // subsidy(h) = ⌊M·k / steps⌋ with k = L₂ − h + 1 running from `low` up to L₂ − L₁
    let end = height.min(last_decreasing);
    let steps = (last_decreasing - last_max + 1) as u128;
    let low = (last_decreasing - end + 1) as u128;
    let count = (end - last_max) as u128;
    let decreasing = floor_sum(count, steps, MAX_SUBSIDY as u128, MAX_SUBSIDY as u128 * low);

    (flat + decreasing as i128) as Integer
}

/// Σ ⌊(a·i + b) / m⌋ for i ∈ [0, n)
fn floor_sum(mut n: u128, mut m: u128, mut a: u128, mut b: u128) -> u128 {
    let mut total = 0u128;
    loop {
        if a >= m {
            total += n * (n.saturating_sub(1)) / 2 * (a / m);
            a %= m;
        }
        if b >= m {
            total += n * (b / m);
            b %= m;
        }
        let y_max = a * n + b;
        if y_max < m {
            return total;
        }
        n = y_max / m;
        b = y_max % m;
        std::mem::swap(&mut m, &mut a);
    }
}

/// Fee = Σ inputs − Σ outputs
pub fn calculate_fee<V: UtxoView + ?Sized>(tx: &Transaction, view: &V) -> Result<Integer> {
    if is_coinbase(tx) {
        return Ok(0);
    }

    let total_input = view
        .total_input_value(tx)
        .ok_or_else(|| ConsensusError::UtxoNotFound("input of fee calculation".to_string()))?;
    let total_output = value_out(tx)
        .ok_or_else(|| ConsensusError::EconomicValidation("Output value out of range".to_string()))?;

    let fee = total_input - total_output;
    if fee < 0 {
        return Err(ConsensusError::EconomicValidation("Negative fee".to_string()));
    }

    Ok(fee)
}
