//! In-memory active chain
//!
//! Tracks headers from genesis to tip and the UTXO set at the tip. Blocks are
//! only ever appended to the current tip.

use std::sync::Arc;

use log::{debug, info};

use crate::types::*;
use crate::constants::MAX_FUTURE_BLOCK_TIME;
use crate::error::Result;
use crate::block::{apply_transaction, connect_block};
use crate::identity::block_hash;
use crate::mempool::TxMemPool;
use crate::params::ChainParams;
use crate::pow::{get_next_work_required, median_time_past};
use crate::script::ScriptVerifier;
use crate::transaction::is_final_tx;

#[derive(Debug, Clone)]
pub struct ChainState {
    params: Arc<ChainParams>,
    headers: Vec<BlockHeader>,
    hashes: Vec<Hash>,
    utxo_set: UtxoSet,
}

impl ChainState {
    /// Chain containing only the genesis block
    pub fn new(params: Arc<ChainParams>) -> Result<Self> {
        Self::with_utxo_set(params, UtxoSet::new())
    }

    /// Genesis chain whose UTXO set also holds `utxo_set`
    pub fn with_utxo_set(params: Arc<ChainParams>, utxo_set: UtxoSet) -> Result<Self> {
        let genesis = params.genesis();
        let mut utxo_set = utxo_set;
        for tx in genesis.transactions() {
            utxo_set = apply_transaction(tx, utxo_set, 0);
        }
        Ok(ChainState {
            headers: vec![genesis.header.clone()],
            hashes: vec![params.genesis_hash()],
            utxo_set,
            params,
        })
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn shared_params(&self) -> Arc<ChainParams> {
        Arc::clone(&self.params)
    }

    /// Height of the tip; genesis is 0
    pub fn height(&self) -> Natural {
        (self.headers.len() - 1) as Natural
    }

    pub fn tip(&self) -> &BlockHeader {
        &self.headers[self.headers.len() - 1]
    }

    pub fn tip_hash(&self) -> Hash {
        self.hashes[self.hashes.len() - 1]
    }

    /// Active headers, genesis first
    pub fn headers(&self) -> &[BlockHeader] {
        &self.headers
    }

    pub fn utxo_set(&self) -> &UtxoSet {
        &self.utxo_set
    }

    pub fn median_time_past(&self) -> u32 {
        median_time_past(&self.headers)
    }

    /// Compact target the next block must carry
    pub fn next_work_required(&self) -> u32 {
        get_next_work_required(&self.headers, &self.params)
    }

    /// AcceptBlock: contextual checks followed by ConnectBlock
    ///
    /// 1. b.prev = tip, header variant matches the chain
    /// 2. b.bits = GetNextWorkRequired(chain)
    /// 3. MTP(chain) < b.time ≤ now + 2h
    /// 4. Every transaction is final at (height, b.time)
    /// 5. ConnectBlock with proof checks; on success the tip advances
    pub fn accept_block(&mut self, block: &Block, now: u32, verifier: &dyn ScriptVerifier) -> Result<ValidationResult> {
        let header = &block.header;
        let height = self.height() + 1;

        if header.prev_block_hash != self.tip_hash() {
            return Ok(ValidationResult::Invalid("prev-blk-not-tip".to_string()));
        }
        if header.variant() != self.params.header_variant {
            return Ok(ValidationResult::Invalid("bad-header-variant".to_string()));
        }
        if header.bits != self.next_work_required() {
            return Ok(ValidationResult::Invalid("bad-diffbits".to_string()));
        }
        if header.timestamp <= self.median_time_past() {
            return Ok(ValidationResult::Invalid("time-too-old".to_string()));
        }
        if header.timestamp > now.saturating_add(MAX_FUTURE_BLOCK_TIME) {
            return Ok(ValidationResult::Invalid("time-too-new".to_string()));
        }
        if !block.transactions().iter().all(|tx| is_final_tx(tx, height, header.timestamp)) {
            return Ok(ValidationResult::Invalid("bad-txns-nonfinal".to_string()));
        }

        let (result, changes) = {
            let (result, cache) = connect_block(block, &self.utxo_set, height, &self.params, verifier, true)?;
            (result, cache.into_changes())
        };
        if !result.is_valid() {
            debug!("block at height {} rejected: {:?}", height, result);
            return Ok(result);
        }

        changes.apply_to(&mut self.utxo_set);
        self.headers.push(header.clone());
        self.hashes.push(block_hash(header));
        info!("new tip at height {} ({} transactions)", height, block.transactions().len());
        Ok(ValidationResult::Valid)
    }
}

/// Chain and pool behind the single node-wide lock
#[derive(Debug, Clone)]
pub struct NodeState {
    pub chain: ChainState,
    pub mempool: TxMemPool,
}

impl NodeState {
    pub fn new(chain: ChainState) -> Self {
        NodeState { chain, mempool: TxMemPool::new() }
    }

    /// Accept a block and drop what it confirmed (or conflicts with) from the pool
    pub fn process_block(&mut self, block: &Block, now: u32, verifier: &dyn ScriptVerifier) -> Result<ValidationResult> {
        let result = self.chain.accept_block(block, now, verifier)?;
        if result.is_valid() {
            self.mempool.remove_for_block(block.transactions());
        }
        Ok(result)
    }
}
