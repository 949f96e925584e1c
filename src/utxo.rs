//! Unspent output views
//!
//! `UtxoView` is the read interface validation and assembly need. `UtxoSet`
//! implements it directly; `UtxoCache` layers pending spends and additions
//! over any view so a template build can run without copying the base set.

use std::collections::{HashMap, HashSet};

use crate::types::*;
use crate::transaction::{calculate_tx_id, is_coinbase};

pub trait UtxoView {
    fn get_utxo(&self, outpoint: &OutPoint) -> Option<&UTXO>;

    fn have(&self, outpoint: &OutPoint) -> bool {
        self.get_utxo(outpoint).is_some()
    }

    /// True if every input of a non-coinbase transaction is unspent here
    fn have_inputs(&self, tx: &Transaction) -> bool {
        is_coinbase(tx) || tx.inputs.iter().all(|input| self.have(&input.prevout))
    }

    /// Σ input values, or `None` if any input is missing
    fn total_input_value(&self, tx: &Transaction) -> Option<Integer> {
        if is_coinbase(tx) {
            return Some(0);
        }
        tx.inputs.iter().try_fold(0i64, |acc, input| {
            self.get_utxo(&input.prevout).map(|utxo| acc.saturating_add(utxo.value))
        })
    }
}

impl UtxoView for UtxoSet {
    fn get_utxo(&self, outpoint: &OutPoint) -> Option<&UTXO> {
        self.get(outpoint)
    }
}

impl<V: UtxoView + ?Sized> UtxoView for &V {
    fn get_utxo(&self, outpoint: &OutPoint) -> Option<&UTXO> {
        (**self).get_utxo(outpoint)
    }
}

/// Resolves from `primary` first, then from `fallback`
pub struct FallbackView<A, B> {
    pub primary: A,
    pub fallback: B,
}

impl<A: UtxoView, B: UtxoView> UtxoView for FallbackView<A, B> {
    fn get_utxo(&self, outpoint: &OutPoint) -> Option<&UTXO> {
        self.primary.get_utxo(outpoint).or_else(|| self.fallback.get_utxo(outpoint))
    }
}

/// Outputs a transaction creates, keyed by outpoint
pub fn transaction_outputs(tx: &Transaction, height: Natural) -> impl Iterator<Item = (OutPoint, UTXO)> + '_ {
    let txid = calculate_tx_id(tx);
    let coinbase = is_coinbase(tx);
    tx.outputs.iter().enumerate().map(move |(i, output)| {
        (
            OutPoint { hash: txid, index: i as u32 },
            UTXO {
                value: output.value,
                script_pubkey: output.script_pubkey.clone(),
                height,
                is_coinbase: coinbase,
            },
        )
    })
}

/// Copy-on-write overlay over a base view
pub struct UtxoCache<'a, V: UtxoView + ?Sized> {
    base: &'a V,
    added: HashMap<OutPoint, UTXO>,
    spent: HashSet<OutPoint>,
}

impl<'a, V: UtxoView + ?Sized> UtxoCache<'a, V> {
    pub fn new(base: &'a V) -> Self {
        UtxoCache { base, added: HashMap::new(), spent: HashSet::new() }
    }

    /// Spend the inputs of `tx` and add its outputs at `height`
    pub fn apply_transaction(&mut self, tx: &Transaction, height: Natural) {
        if !is_coinbase(tx) {
            for input in &tx.inputs {
                if self.added.remove(&input.prevout).is_none() {
                    self.spent.insert(input.prevout);
                }
            }
        }
        for (outpoint, utxo) in transaction_outputs(tx, height) {
            self.spent.remove(&outpoint);
            self.added.insert(outpoint, utxo);
        }
    }

    /// Detach the pending changes, releasing the borrow of the base view
    pub fn into_changes(self) -> UtxoChanges {
        UtxoChanges { added: self.added, spent: self.spent }
    }

    /// Write the overlay's changes into a set other than the base
    pub fn flush_into(self, target: &mut UtxoSet) {
        self.into_changes().apply_to(target);
    }

    pub fn pending_additions(&self) -> usize {
        self.added.len()
    }
}

/// Spends and additions taken out of a `UtxoCache`
#[derive(Debug, Clone, Default)]
pub struct UtxoChanges {
    added: HashMap<OutPoint, UTXO>,
    spent: HashSet<OutPoint>,
}

impl UtxoChanges {
    pub fn apply_to(self, target: &mut UtxoSet) {
        for outpoint in self.spent {
            target.remove(&outpoint);
        }
        target.extend(self.added);
    }
}

impl<'a, V: UtxoView + ?Sized> UtxoView for UtxoCache<'a, V> {
    fn get_utxo(&self, outpoint: &OutPoint) -> Option<&UTXO> {
        if let Some(utxo) = self.added.get(outpoint) {
            return Some(utxo);
        }
        if self.spent.contains(outpoint) {
            return None;
        }
        self.base.get_utxo(outpoint)
    }
}
