//! Core chain types for consensus validation and block assembly

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::merkle::MerkleTree;

/// Hash type: 256-bit hash
pub type Hash = [u8; 32];

/// Byte string type
pub type ByteString = Vec<u8>;

/// Natural number type
pub type Natural = u64;

/// Integer type
pub type Integer = i64;

/// OutPoint: 𝒪 = ℍ × ℕ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub hash: Hash,
    pub index: u32,
}

impl OutPoint {
    /// The outpoint referenced by coinbase inputs
    pub fn null() -> Self {
        OutPoint { hash: [0u8; 32], index: u32::MAX }
    }

    pub fn is_null(&self) -> bool {
        self.hash == [0u8; 32] && self.index == u32::MAX
    }
}

/// Transaction Input: ℐ = 𝒪 × 𝕊 × ℕ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub prevout: OutPoint,
    pub script_sig: ByteString,
    pub sequence: u32,
}

/// Transaction Output: 𝒯 = ℤ × 𝕊
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub value: Integer,
    pub script_pubkey: ByteString,
}

/// Transaction: 𝒯𝒳 = ℕ × ℐ* × 𝒯* × ℕ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub lock_time: u32,
}

/// Which header shape a chain uses. Fixed per chain configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderVariant {
    /// 80-byte header sealed by a 32-bit nonce
    Nonce,
    /// 140-byte header sealed by a compact ECDSA signature
    Signature,
}

/// The field that closes a header: either a search nonce or a header signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderSeal {
    Nonce(u32),
    Signature { r: Hash, s: Hash },
}

impl HeaderSeal {
    pub fn variant(&self) -> HeaderVariant {
        match self {
            HeaderSeal::Nonce(_) => HeaderVariant::Nonce,
            HeaderSeal::Signature { .. } => HeaderVariant::Signature,
        }
    }

    /// An unsolved seal of the given shape
    pub fn empty(variant: HeaderVariant) -> Self {
        match variant {
            HeaderVariant::Nonce => HeaderSeal::Nonce(0),
            HeaderVariant::Signature => HeaderSeal::Signature { r: [0u8; 32], s: [0u8; 32] },
        }
    }
}

/// Block Header: ℋ = ℤ × ℍ × ℍ × ℕ × ℕ × (ℕ | 𝕊𝕚𝕘)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_block_hash: Hash,
    pub merkle_root: Hash,
    pub timestamp: u32,
    pub bits: u32,
    pub seal: HeaderSeal,
}

impl BlockHeader {
    pub fn variant(&self) -> HeaderVariant {
        self.seal.variant()
    }

    /// Nonce value, zero for signature-sealed headers
    pub fn nonce(&self) -> u32 {
        match self.seal {
            HeaderSeal::Nonce(nonce) => nonce,
            HeaderSeal::Signature { .. } => 0,
        }
    }
}

/// Block: ℬ = ℋ × 𝒯𝒳*
///
/// The transaction list is only reachable through accessors so the cached
/// merkle tree can be dropped whenever the list changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    transactions: Vec<Transaction>,
    #[serde(skip)]
    merkle_cache: Option<MerkleTree>,
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        Block { header, transactions, merkle_cache: None }
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Mutable access to the transaction list; invalidates the merkle cache.
    pub fn transactions_mut(&mut self) -> &mut Vec<Transaction> {
        self.merkle_cache = None;
        &mut self.transactions
    }

    pub fn into_parts(self) -> (BlockHeader, Vec<Transaction>) {
        (self.header, self.transactions)
    }

    /// Merkle tree over the current transactions, built on first use.
    pub fn merkle_tree(&mut self) -> &MerkleTree {
        let transactions = &self.transactions;
        self.merkle_cache.get_or_insert_with(|| MerkleTree::build(transactions))
    }

    /// Rebuild the merkle tree and store its root in the header.
    pub fn update_merkle_root(&mut self) -> Hash {
        let root = self.merkle_tree().root();
        self.header.merkle_root = root;
        root
    }

    pub fn has_cached_merkle_tree(&self) -> bool {
        self.merkle_cache.is_some()
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header && self.transactions == other.transactions
    }
}

impl Eq for Block {}

/// UTXO: 𝒰 = ℤ × 𝕊 × ℕ × 𝔹
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UTXO {
    pub value: Integer,
    pub script_pubkey: ByteString,
    pub height: Natural,
    pub is_coinbase: bool,
}

/// UTXO Set: 𝒰𝒮 = 𝒪 → 𝒰
pub type UtxoSet = HashMap<OutPoint, UTXO>;

/// Validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid(String),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }
}
