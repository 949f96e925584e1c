//! Proof of knowledge: a commitment sampled from the block's own transactions
//!
//! The header (minus the commitment itself) is run through the chained hash.
//! Three words of that digest pick a transaction, a byte offset inside its
//! serialization, and an XOR pad for the 4-byte window found there.

use std::collections::HashMap;

use crate::constants::POK_FLAG;
use crate::error::{Result, ConsensusError};
use crate::hash::{chained_hash, Hash512};
use crate::serialize::{serialize_header_with_version, serialize_transaction};
use crate::types::*;

/// Serialized transactions keyed by (merkle root, index).
///
/// Lets a nonce search recompute the commitment without re-encoding the
/// sampled transaction each attempt. Entries for a previous merkle root are
/// dropped once a new root is seen.
#[derive(Debug, Default)]
pub struct SerializedTxCache {
    entries: HashMap<(Hash, usize), Vec<u8>>,
    current_root: Option<Hash>,
}

impl SerializedTxCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.current_root = None;
    }

    pub fn get_or_serialize(&mut self, merkle_root: Hash, index: usize, tx: &Transaction) -> &[u8] {
        if self.current_root != Some(merkle_root) {
            self.entries.retain(|(root, _), _| *root == merkle_root);
            self.current_root = Some(merkle_root);
        }
        self.entries
            .entry((merkle_root, index))
            .or_insert_with(|| serialize_transaction(tx))
    }
}

/// True when the commitment must be derived from transaction data.
///
/// Signature-sealed headers always commit to data; nonce headers opt in
/// through the version flag.
pub fn is_pok_block(header: &BlockHeader) -> bool {
    match header.seal {
        HeaderSeal::Nonce(_) => header.version & POK_FLAG != 0,
        HeaderSeal::Signature { .. } => true,
    }
}

/// Set or clear the data-derived flag on a nonce header
pub fn set_pok_flag(header: &mut BlockHeader, enabled: bool) {
    if enabled {
        header.version |= POK_FLAG;
    } else {
        header.version &= !POK_FLAG;
    }
}

/// Commitment currently stored in a nonce header's version field
pub fn embedded_pok(header: &BlockHeader, mask: u32) -> u32 {
    header.version & mask
}

/// Store a commitment in a nonce header's version field
pub fn embed_pok(header: &mut BlockHeader, pok: u32, mask: u32) {
    header.version = (header.version & !mask) | (pok & mask);
}

/// Header bytes hashed to obtain the chooser digest.
///
/// Nonce headers: full 80 bytes with the commitment bits cleared.
/// Signature headers: the 76 unsigned bytes.
pub fn pok_preimage(header: &BlockHeader, mask: u32) -> Vec<u8> {
    match header.seal {
        HeaderSeal::Nonce(_) => serialize_header_with_version(header, header.version & !mask, true),
        HeaderSeal::Signature { .. } => serialize_header_with_version(header, header.version, false),
    }
}

pub fn pok_chooser(header: &BlockHeader, mask: u32) -> Hash512 {
    chained_hash(&pok_preimage(header, mask))
}

fn fold_window(data: &[u8], offset_word: u32, pad: u32, mask: u32) -> Result<u32> {
    if data.len() < 4 {
        return Err(ConsensusError::Serialization(format!(
            "sampled transaction is only {} bytes", data.len()
        )));
    }
    let offset = (offset_word % (data.len() as u32 - 3)) as usize;
    let mut window = [0u8; 4];
    window.copy_from_slice(&data[offset..offset + 4]);
    Ok((u32::from_le_bytes(window) ^ pad) & mask)
}

/// DerivePoK: ℋ × 𝒯𝒳* → 𝔹³²
///
/// For header h (commitment bits ignored) and transactions txs:
/// 1. Let c = ChainedHash(preimage(h)), r₁, r₂, r₃ = c.word(0), c.word(1), c.word(2)
/// 2. If h is not a PoK block: return r₁ & mask
/// 3. Let d = serialize(txs[r₁ mod |txs|])
/// 4. Let o = r₂ mod (|d| − 3)
/// 5. Return (LE32(d[o..o+4]) ⊕ r₃) & mask
///
/// An empty transaction list is an error; callers treat it as a failed proof.
pub fn derive_pok(
    header: &BlockHeader,
    transactions: &[Transaction],
    mask: u32,
    cache: Option<&mut SerializedTxCache>,
) -> Result<u32> {
    let chooser = pok_chooser(header, mask);
    let selector = chooser.word(0);

    if !is_pok_block(header) {
        return Ok(selector & mask);
    }

    if transactions.is_empty() {
        return Err(ConsensusError::EmptyTransactionList);
    }

    let offset_word = chooser.word(1);
    let pad = chooser.word(2);
    let index = (selector % transactions.len() as u32) as usize;

    match cache {
        Some(cache) => {
            let data = cache.get_or_serialize(header.merkle_root, index, &transactions[index]);
            fold_window(data, offset_word, pad, mask)
        }
        None => fold_window(&serialize_transaction(&transactions[index]), offset_word, pad, mask),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::POK_DATA_MASK;
    use crate::merkle::calculate_merkle_root;

    fn sample_transactions() -> Vec<Transaction> {
        (0..5u8)
            .map(|i| Transaction {
                version: 1,
                inputs: vec![TransactionInput {
                    prevout: OutPoint { hash: [i; 32], index: i as u32 },
                    script_sig: vec![i; 40],
                    sequence: 0xffffffff,
                }],
                outputs: vec![TransactionOutput { value: 1000 * i as i64, script_pubkey: vec![0x51] }],
                lock_time: 0,
            })
            .collect()
    }

    fn sample_header(txs: &[Transaction]) -> BlockHeader {
        BlockHeader {
            version: 2 | POK_FLAG,
            prev_block_hash: [0xab; 32],
            merkle_root: calculate_merkle_root(txs),
            timestamp: 1_425_097_800,
            bits: 0x207fffff,
            seal: HeaderSeal::Nonce(77),
        }
    }

    #[test]
    fn test_derive_is_deterministic() {
        let txs = sample_transactions();
        let header = sample_header(&txs);
        let a = derive_pok(&header, &txs, POK_DATA_MASK, None).unwrap();
        let b = derive_pok(&header, &txs, POK_DATA_MASK, None).unwrap();
        assert_eq!(a, b);
        assert_eq!(a & !POK_DATA_MASK, 0);
    }

    #[test]
    fn test_embedded_bits_do_not_affect_derivation() {
        let txs = sample_transactions();
        let mut header = sample_header(&txs);
        let before = derive_pok(&header, &txs, POK_DATA_MASK, None).unwrap();
        embed_pok(&mut header, 0xdead_0000, POK_DATA_MASK);
        assert_eq!(embedded_pok(&header, POK_DATA_MASK), 0xdead_0000);
        assert_eq!(derive_pok(&header, &txs, POK_DATA_MASK, None).unwrap(), before);
    }

    #[test]
    fn test_cache_does_not_change_result() {
        let txs = sample_transactions();
        let mut header = sample_header(&txs);
        let mut cache = SerializedTxCache::new();
        for nonce in 0..50 {
            header.seal = HeaderSeal::Nonce(nonce);
            let cached = derive_pok(&header, &txs, POK_DATA_MASK, Some(&mut cache)).unwrap();
            let fresh = derive_pok(&header, &txs, POK_DATA_MASK, None).unwrap();
            assert_eq!(cached, fresh);
        }
        assert!(cache.len() <= txs.len());
    }

    #[test]
    fn test_cache_drops_stale_roots() {
        let txs = sample_transactions();
        let mut cache = SerializedTxCache::new();
        cache.get_or_serialize([1; 32], 0, &txs[0]);
        cache.get_or_serialize([1; 32], 1, &txs[1]);
        assert_eq!(cache.len(), 2);
        cache.get_or_serialize([2; 32], 0, &txs[0]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_non_pok_block_uses_selector_only() {
        let txs = sample_transactions();
        let mut header = sample_header(&txs);
        set_pok_flag(&mut header, false);
        let expected = pok_chooser(&header, POK_DATA_MASK).word(0) & POK_DATA_MASK;
        assert_eq!(derive_pok(&header, &txs, POK_DATA_MASK, None).unwrap(), expected);
        // without the flag an empty list is fine
        assert_eq!(derive_pok(&header, &[], POK_DATA_MASK, None).unwrap(), expected);
    }

    #[test]
    fn test_empty_transaction_list_is_error() {
        let header = sample_header(&[]);
        let result = derive_pok(&header, &[], POK_DATA_MASK, None);
        assert!(matches!(result, Err(ConsensusError::EmptyTransactionList)));
    }

    #[test]
    fn test_derivation_samples_selected_transaction() {
        let txs = sample_transactions();
        let header = sample_header(&txs);
        let chooser = pok_chooser(&header, POK_DATA_MASK);
        let index = (chooser.word(0) % txs.len() as u32) as usize;
        let data = serialize_transaction(&txs[index]);
        let offset = (chooser.word(1) % (data.len() as u32 - 3)) as usize;
        let window = u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]]);
        let expected = (window ^ chooser.word(2)) & POK_DATA_MASK;
        assert_eq!(derive_pok(&header, &txs, POK_DATA_MASK, None).unwrap(), expected);
    }

    #[test]
    fn test_signature_header_always_pok() {
        let txs = sample_transactions();
        let mut header = sample_header(&txs);
        header.seal = HeaderSeal::Signature { r: [1; 32], s: [2; 32] };
        assert!(is_pok_block(&header));
        let a = derive_pok(&header, &txs, u32::MAX, None).unwrap();
        header.seal = HeaderSeal::Signature { r: [3; 32], s: [4; 32] };
        // the signature is outside the preimage
        assert_eq!(derive_pok(&header, &txs, u32::MAX, None).unwrap(), a);
    }
}
