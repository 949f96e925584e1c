//! Pending transaction pool
//!
//! Entries are keyed and iterated by txid so that every consumer sees the
//! same order for a given pool snapshot. The pool also exposes the outputs of
//! its transactions as a [`UtxoView`], which is how dependent (unconfirmed)
//! spends are resolved.

use std::collections::{BTreeMap, HashMap};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::types::*;
use crate::constants::*;
use crate::error::Result;
use crate::script::{ScriptVerifier, SCRIPT_VERIFY_P2SH};
use crate::serialize::transaction_size;
use crate::transaction::{
    allow_free, calculate_tx_id, check_transaction, compute_priority, input_priority, is_coinbase,
    is_final_tx, min_fee, value_out,
};
use crate::utxo::{transaction_outputs, FallbackView, UtxoView};

/// Height recorded for outputs that only exist in the pool
pub const MEMPOOL_HEIGHT: Natural = 0x7fff_ffff;

/// A pool transaction and the metadata captured when it entered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MempoolEntry {
    pub tx: Transaction,
    pub txid: Hash,
    pub fee: Integer,
    pub size: usize,
    /// Arrival time, unix seconds
    pub time: u64,
    /// Priority at `height`
    pub priority: f64,
    /// Chain height when the entry was added
    pub height: Natural,
}

impl MempoolEntry {
    pub fn new(tx: Transaction, fee: Integer, time: u64, priority: f64, height: Natural) -> Self {
        let txid = calculate_tx_id(&tx);
        let size = transaction_size(&tx);
        MempoolEntry { tx, txid, fee, size, time, priority, height }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MempoolResult {
    Accepted,
    Rejected(String),
}

#[derive(Debug, Default, Clone)]
pub struct TxMemPool {
    entries: BTreeMap<Hash, MempoolEntry>,
    /// Outpoint → txid of the pool transaction spending it
    spends: HashMap<OutPoint, Hash>,
    /// Outputs created by pool transactions
    outputs: HashMap<OutPoint, UTXO>,
    transactions_updated: u64,
}

impl TxMemPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, txid: &Hash) -> bool {
        self.entries.contains_key(txid)
    }

    pub fn get(&self, txid: &Hash) -> Option<&MempoolEntry> {
        self.entries.get(txid)
    }

    /// Entries in txid order
    pub fn iter(&self) -> impl Iterator<Item = &MempoolEntry> {
        self.entries.values()
    }

    /// Pool transaction spending `outpoint`, if any
    pub fn spender(&self, outpoint: &OutPoint) -> Option<&Hash> {
        self.spends.get(outpoint)
    }

    /// Monotonic counter bumped on every insertion or removal
    pub fn transactions_updated(&self) -> u64 {
        self.transactions_updated
    }

    /// Insert without any validation. Returns false if the txid is already present.
    pub fn add_unchecked(&mut self, entry: MempoolEntry) -> bool {
        if self.entries.contains_key(&entry.txid) {
            return false;
        }
        for input in &entry.tx.inputs {
            self.spends.insert(input.prevout, entry.txid);
        }
        self.outputs.extend(transaction_outputs(&entry.tx, MEMPOOL_HEIGHT));
        self.entries.insert(entry.txid, entry);
        self.transactions_updated += 1;
        true
    }

    /// Remove a transaction; with `recursive`, also every pool transaction
    /// descending from it. Returns the removed transactions.
    pub fn remove(&mut self, txid: &Hash, recursive: bool) -> Vec<Transaction> {
        let mut removed = Vec::new();
        let mut pending = vec![*txid];
        while let Some(id) = pending.pop() {
            let entry = match self.entries.remove(&id) {
                Some(entry) => entry,
                None => continue,
            };
            for input in &entry.tx.inputs {
                if self.spends.get(&input.prevout) == Some(&id) {
                    self.spends.remove(&input.prevout);
                }
            }
            for index in 0..entry.tx.outputs.len() {
                let outpoint = OutPoint { hash: id, index: index as u32 };
                self.outputs.remove(&outpoint);
                if recursive {
                    if let Some(child) = self.spends.get(&outpoint) {
                        pending.push(*child);
                    }
                }
            }
            self.transactions_updated += 1;
            removed.push(entry.tx);
        }
        removed
    }

    /// Remove pool transactions (and their descendants) that spend any input of `tx`
    pub fn remove_conflicts(&mut self, tx: &Transaction) -> Vec<Transaction> {
        let txid = calculate_tx_id(tx);
        let conflicting: Vec<Hash> = tx
            .inputs
            .iter()
            .filter_map(|input| self.spends.get(&input.prevout))
            .filter(|spender| **spender != txid)
            .copied()
            .collect();
        conflicting.iter().flat_map(|id| self.remove(id, true)).collect()
    }

    /// Drop transactions confirmed by a connected block along with anything they conflict with
    pub fn remove_for_block(&mut self, transactions: &[Transaction]) {
        for tx in transactions {
            let txid = calculate_tx_id(tx);
            self.remove(&txid, false);
            let conflicts = self.remove_conflicts(tx);
            if !conflicts.is_empty() {
                debug!("removed {} pool transactions conflicting with {:02x?}", conflicts.len(), &txid[..4]);
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.spends.clear();
        self.outputs.clear();
        self.transactions_updated += 1;
    }
}

impl UtxoView for TxMemPool {
    fn get_utxo(&self, outpoint: &OutPoint) -> Option<&UTXO> {
        self.outputs.get(outpoint)
    }
}

/// AcceptToMemoryPool: 𝒯𝒳 × 𝒰𝒮 → {accepted, rejected}
///
/// For transaction tx, chain view us and pool mp:
/// 1. Reject coinbases and structurally invalid transactions
/// 2. Reject if not final in the next block
/// 3. Reject duplicates and transactions double-spending a pool input
/// 4. Resolve every input from us, falling back to outputs in mp
/// 5. Verify input scripts
/// 6. Require the minimum relay fee unless priority allows free relay
/// 7. Insert with fee, size, priority and entry height
pub fn accept_to_memory_pool<V: UtxoView + ?Sized>(
    pool: &mut TxMemPool,
    tx: Transaction,
    view: &V,
    tip_height: Natural,
    now: u64,
    verifier: &dyn ScriptVerifier,
) -> Result<MempoolResult> {
    if is_coinbase(&tx) {
        return Ok(MempoolResult::Rejected("coinbase".to_string()));
    }

    if let ValidationResult::Invalid(reason) = check_transaction(&tx)? {
        return Ok(MempoolResult::Rejected(reason));
    }

    if !is_final_tx(&tx, tip_height + 1, now.min(u32::MAX as u64) as u32) {
        return Ok(MempoolResult::Rejected("non-final".to_string()));
    }

    let txid = calculate_tx_id(&tx);
    if pool.contains(&txid) {
        return Ok(MempoolResult::Rejected("txn-already-in-mempool".to_string()));
    }

    if tx.inputs.iter().any(|input| pool.spender(&input.prevout).is_some()) {
        return Ok(MempoolResult::Rejected("txn-mempool-conflict".to_string()));
    }

    let combined = FallbackView { primary: view, fallback: &*pool };
    let total_in = match combined.total_input_value(&tx) {
        Some(total) => total,
        None => return Ok(MempoolResult::Rejected("missing-inputs".to_string())),
    };
    let total_out = value_out(&tx).unwrap_or(MAX_MONEY + 1);
    if total_in < total_out {
        return Ok(MempoolResult::Rejected("bad-txns-in-belowout".to_string()));
    }
    let fee = total_in - total_out;

    for (i, input) in tx.inputs.iter().enumerate() {
        let script_pubkey = combined
            .get_utxo(&input.prevout)
            .map(|utxo| utxo.script_pubkey.as_slice())
            .unwrap_or_default();
        if !verifier.verify_input(&tx, i, script_pubkey, SCRIPT_VERIFY_P2SH) {
            return Ok(MempoolResult::Rejected(format!("mandatory-script-verify-flag-failed: input {}", i)));
        }
    }

    let size = transaction_size(&tx);
    let priority = compute_priority(&tx, input_priority(&tx, view, tip_height), size);
    if fee < min_fee(size, MIN_RELAY_TX_FEE) && !allow_free(priority) {
        return Ok(MempoolResult::Rejected(format!("insufficient fee: {} < {}", fee, min_fee(size, MIN_RELAY_TX_FEE))));
    }

    pool.add_unchecked(MempoolEntry::new(tx, fee, now, priority, tip_height));
    Ok(MempoolResult::Accepted)
}
