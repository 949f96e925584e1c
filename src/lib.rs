//! # PoK-Consensus
//!
//! Consensus rules and block production for a chain whose proof of work is
//! bound to the block's own transaction data.
//!
//! A header's work hash comes from a chained multi-hash whose primitive order
//! depends on the data being hashed. Before the work hash is taken, a proof of
//! knowledge (PoK) is derived from the serialized bytes of one pseudo-randomly
//! chosen transaction, so a miner has to hold the whole block.
//!
//! ## Layout
//!
//! - `hash`, `merkle`: chained multi-hash and the transaction merkle tree
//! - `pok`, `identity`, `pow`: commitment derivation, header hashes, targets
//! - `transaction`, `block`, `chain`: validation and the active chain
//! - `mempool`, `mining`, `miner`: pool, template assembly, worker threads
//!
//! ## Usage
//!
//! ```rust
//! use pok_consensus::PokConsensus;
//! use pok_consensus::types::*;
//!
//! let consensus = PokConsensus::regtest();
//! let transaction = Transaction {
//!     version: 1,
//!     inputs: vec![TransactionInput {
//!         prevout: OutPoint { hash: [1; 32], index: 0 },
//!         script_sig: vec![0x51],
//!         sequence: 0xffffffff,
//!     }],
//!     outputs: vec![TransactionOutput {
//!         value: 1000,
//!         script_pubkey: vec![0x51],
//!     }],
//!     lock_time: 0,
//! };
//! let result = consensus.validate_transaction(&transaction).unwrap();
//! assert_eq!(result, ValidationResult::Valid);
//! ```

pub mod types;
pub mod constants;
pub mod error;
pub mod serialize;
pub mod compress;
pub mod hash;
pub mod merkle;
pub mod pok;
pub mod identity;
pub mod pow;
pub mod params;
pub mod economic;
pub mod transaction;
pub mod script;
pub mod utxo;
pub mod mempool;
pub mod block;
pub mod chain;
pub mod config;
pub mod mining;
pub mod miner;

use std::sync::Arc;

// Re-export commonly used types
pub use types::*;
pub use constants::*;
pub use error::{BlockError, ConsensusError, PowError, Result};
pub use chain::{ChainState, NodeState};
pub use config::MiningConfig;
pub use mempool::{MempoolResult, TxMemPool};
pub use mining::BlockTemplate;
pub use params::{ChainParams, Network};

use hash::Hash512;
use script::StructuralVerifier;
use utxo::UtxoView;

/// Chain-parameterized entry point to validation and assembly
///
/// # Examples
///
/// ```
/// use pok_consensus::{PokConsensus, Network, MAX_SUBSIDY};
///
/// let consensus = PokConsensus::for_network(Network::Regtest);
/// assert_eq!(consensus.get_block_subsidy(1), MAX_SUBSIDY);
/// assert!(consensus.get_block_subsidy(151) < MAX_SUBSIDY);
/// assert_eq!(consensus.get_block_subsidy(301), 0);
/// ```
#[derive(Debug, Clone)]
pub struct PokConsensus {
    params: Arc<ChainParams>,
}

impl Default for PokConsensus {
    fn default() -> Self {
        Self::new(ChainParams::main())
    }
}

impl PokConsensus {
    pub fn new(params: ChainParams) -> Self {
        PokConsensus { params: Arc::new(params) }
    }

    pub fn for_network(network: Network) -> Self {
        Self::new(ChainParams::for_network(network))
    }

    pub fn regtest() -> Self {
        Self::new(ChainParams::regtest())
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    /// Chain holding only this network's genesis block
    pub fn new_chain(&self) -> Result<ChainState> {
        ChainState::new(Arc::clone(&self.params))
    }

    /// ChainedMultiHash of a byte string
    ///
    /// ```
    /// use pok_consensus::PokConsensus;
    ///
    /// let consensus = PokConsensus::regtest();
    /// let a = consensus.chained_hash(b"block data");
    /// let b = consensus.chained_hash(b"block data");
    /// assert_eq!(a, b);
    /// assert_ne!(a.trim256(), consensus.chained_hash(b"other data").trim256());
    /// ```
    pub fn chained_hash(&self, data: &[u8]) -> Hash512 {
        hash::chained_hash(data)
    }

    /// Merkle root of a transaction list; all zeros when empty
    ///
    /// ```
    /// use pok_consensus::PokConsensus;
    ///
    /// let consensus = PokConsensus::regtest();
    /// assert_eq!(consensus.merkle_root(&[]), [0u8; 32]);
    /// ```
    pub fn merkle_root(&self, transactions: &[Transaction]) -> Hash {
        merkle::calculate_merkle_root(transactions)
    }

    /// Commitment a header must carry for its transactions
    pub fn derive_pok(&self, header: &BlockHeader, transactions: &[Transaction]) -> Result<u32> {
        pok::derive_pok(header, transactions, self.params.pok_mask, None)
    }

    /// Validate a transaction according to context-free rules
    pub fn validate_transaction(&self, tx: &Transaction) -> Result<ValidationResult> {
        transaction::check_transaction(tx)
    }

    /// Validate transaction inputs against a UTXO set
    ///
    /// # Examples
    ///
    /// ```
    /// use pok_consensus::PokConsensus;
    /// use pok_consensus::types::*;
    ///
    /// let consensus = PokConsensus::regtest();
    /// let mut utxo_set = UtxoSet::new();
    /// utxo_set.insert(
    ///     OutPoint { hash: [1; 32], index: 0 },
    ///     UTXO { value: 1_000_000_000, script_pubkey: vec![], height: 0, is_coinbase: false },
    /// );
    ///
    /// let tx = Transaction {
    ///     version: 1,
    ///     inputs: vec![TransactionInput {
    ///         prevout: OutPoint { hash: [1; 32], index: 0 },
    ///         script_sig: vec![],
    ///         sequence: 0xffffffff,
    ///     }],
    ///     outputs: vec![TransactionOutput { value: 900_000_000, script_pubkey: vec![] }],
    ///     lock_time: 0,
    /// };
    ///
    /// let (result, fee) = consensus.validate_tx_inputs(&tx, &utxo_set, 1).unwrap();
    /// assert_eq!(result, ValidationResult::Valid);
    /// assert_eq!(fee, 100_000_000);
    /// ```
    pub fn validate_tx_inputs<V: UtxoView + ?Sized>(
        &self,
        tx: &Transaction,
        view: &V,
        height: Natural,
    ) -> Result<(ValidationResult, Integer)> {
        transaction::check_tx_inputs(tx, view, height, self.params.coinbase_maturity)
    }

    /// Signature, PoK and work checks for a block
    pub fn check_block(&self, block: &Block) -> std::result::Result<(), BlockError> {
        block::check_block(block, &self.params, None)
    }

    /// Validate a complete block and return the UTXO set it produces
    ///
    /// Scripts are checked structurally; use `block::connect_block` to plug in
    /// a different verifier.
    pub fn validate_block(
        &self,
        block: &Block,
        utxo_set: UtxoSet,
        height: Natural,
    ) -> Result<(ValidationResult, UtxoSet)> {
        let (result, changes) = {
            let (result, cache) = block::connect_block(block, &utxo_set, height, &self.params, &StructuralVerifier, true)?;
            (result, cache.into_changes())
        };
        let mut utxo_set = utxo_set;
        if result.is_valid() {
            changes.apply_to(&mut utxo_set);
        }
        Ok((result, utxo_set))
    }

    pub fn check_proof_of_work(&self, header: &BlockHeader, pok: u32) -> std::result::Result<(), PowError> {
        pow::check_proof_of_work(header, pok, &self.params)
    }

    pub fn get_block_subsidy(&self, height: Natural) -> Integer {
        economic::get_block_subsidy(height, &self.params)
    }

    /// Subsidy plus fees; blocks without a proof of knowledge earn a reduced subsidy
    pub fn get_block_value(&self, height: Natural, fees: Integer, use_pok: bool) -> Integer {
        economic::get_block_value(height, fees, use_pok, &self.params)
    }

    pub fn total_supply(&self, height: Natural) -> Integer {
        economic::total_supply(height, &self.params)
    }

    /// Compact target for the block after `chain` (genesis first)
    pub fn get_next_work_required(&self, chain: &[BlockHeader]) -> u32 {
        pow::get_next_work_required(chain, &self.params)
    }

    /// Admit a transaction to the pool against the chain's UTXO set
    pub fn accept_to_memory_pool(
        &self,
        pool: &mut TxMemPool,
        tx: Transaction,
        chain: &ChainState,
        now: u64,
    ) -> Result<MempoolResult> {
        mempool::accept_to_memory_pool(pool, tx, chain.utxo_set(), chain.height(), now, &StructuralVerifier)
    }

    /// Build a block template on top of `chain`
    ///
    /// # Examples
    ///
    /// ```
    /// use pok_consensus::{MiningConfig, PokConsensus, TxMemPool};
    ///
    /// let consensus = PokConsensus::regtest();
    /// let chain = consensus.new_chain().unwrap();
    /// let pool = TxMemPool::new();
    /// let now = chain.tip().timestamp + 600;
    ///
    /// let template = consensus
    ///     .create_new_block(&chain, &pool, &MiningConfig::default(), &[0x51], now)
    ///     .unwrap();
    /// assert_eq!(template.block.transactions().len(), 1);
    /// assert_eq!(template.block.header.prev_block_hash, chain.tip_hash());
    /// ```
    pub fn create_new_block(
        &self,
        chain: &ChainState,
        pool: &TxMemPool,
        config: &MiningConfig,
        script_pubkey: &[u8],
        now: u32,
    ) -> Result<BlockTemplate> {
        mining::BlockAssembler::new(config, &StructuralVerifier).create_new_block(chain, pool, script_pubkey, now)
    }
}
