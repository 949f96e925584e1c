//! Property tests for hashing, merkle branches, commitments and economics

use proptest::prelude::*;

use pok_consensus::*;
use pok_consensus::compress::{compress_amount, decompress_amount};
use pok_consensus::economic::{get_block_subsidy, total_supply};
use pok_consensus::hash::{chained_hash, chained_hash_parts, permutation_index};
use pok_consensus::merkle::MerkleTree;
use pok_consensus::pok::{derive_pok, embed_pok, embedded_pok, set_pok_flag, SerializedTxCache};
use pok_consensus::serialize::{serialize_transaction, transaction_size};

fn arb_transaction() -> impl Strategy<Value = Transaction> {
    (
        any::<[u8; 32]>(),
        any::<u32>(),
        prop::collection::vec(any::<u8>(), 0..80),
        0..MAX_MONEY,
        prop::collection::vec(any::<u8>(), 0..40),
        any::<u32>(),
    )
        .prop_map(|(hash, index, script_sig, value, script_pubkey, lock_time)| Transaction {
            version: 1,
            inputs: vec![TransactionInput { prevout: OutPoint { hash, index }, script_sig, sequence: SEQUENCE_FINAL }],
            outputs: vec![TransactionOutput { value, script_pubkey }],
            lock_time,
        })
}

fn header_for(transactions: &[Transaction], nonce: u32, timestamp: u32) -> BlockHeader {
    let mut header = BlockHeader {
        version: BLOCK_VERSION,
        prev_block_hash: [7; 32],
        merkle_root: MerkleTree::build(transactions).root(),
        timestamp,
        bits: 0x207fffff,
        seal: HeaderSeal::Nonce(nonce),
    };
    set_pok_flag(&mut header, true);
    header
}

proptest! {
    #[test]
    fn prop_chained_hash_matches_split_input(data in prop::collection::vec(any::<u8>(), 0..256), split in 0usize..256) {
        let split = split.min(data.len());
        let whole = chained_hash(&data);
        let parts = chained_hash_parts(&[&data[..split], &data[split..]]);
        prop_assert_eq!(whole, parts);
        prop_assert!(permutation_index(&[&data]) < 24);
    }

    #[test]
    fn prop_merkle_branches_lead_to_root(leaves in prop::collection::vec(any::<[u8; 32]>(), 1..40)) {
        let tree = MerkleTree::from_leaves(leaves.clone());
        for (i, leaf) in leaves.iter().enumerate() {
            let branch = tree.branch(i).unwrap();
            prop_assert_eq!(MerkleTree::verify(*leaf, &branch, i), tree.root());
        }
        prop_assert!(tree.branch(leaves.len()).is_none());
    }

    #[test]
    fn prop_pok_ignores_embedded_bits(
        transactions in prop::collection::vec(arb_transaction(), 1..8),
        nonce in any::<u32>(),
        junk in any::<u32>(),
    ) {
        let mut header = header_for(&transactions, nonce, 1_500_000_000);
        let pok = derive_pok(&header, &transactions, POK_DATA_MASK, None).unwrap();
        prop_assert_eq!(pok & !POK_DATA_MASK, 0);

        embed_pok(&mut header, junk, POK_DATA_MASK);
        prop_assert_eq!(embedded_pok(&header, POK_DATA_MASK), junk & POK_DATA_MASK);
        prop_assert_eq!(derive_pok(&header, &transactions, POK_DATA_MASK, None).unwrap(), pok);
    }

    #[test]
    fn prop_cached_pok_matches_uncached(
        transactions in prop::collection::vec(arb_transaction(), 1..8),
        nonces in prop::collection::vec(any::<u32>(), 1..10),
    ) {
        let mut cache = SerializedTxCache::new();
        for nonce in nonces {
            let header = header_for(&transactions, nonce, 1_500_000_000);
            let cached = derive_pok(&header, &transactions, POK_DATA_MASK, Some(&mut cache)).unwrap();
            let direct = derive_pok(&header, &transactions, POK_DATA_MASK, None).unwrap();
            prop_assert_eq!(cached, direct);
        }
    }

    #[test]
    fn prop_amount_compression_is_lossless(amount in 0u64..=MAX_MONEY as u64) {
        prop_assert_eq!(decompress_amount(compress_amount(amount)), amount);
    }

    #[test]
    fn prop_transaction_size_matches_encoding(tx in arb_transaction()) {
        prop_assert_eq!(transaction_size(&tx), serialize_transaction(&tx).len());
    }

    #[test]
    fn prop_subsidy_follows_schedule(height in 1u64..2_000_000) {
        let params = ChainParams::main();
        let now = get_block_subsidy(height, &params);
        prop_assert!((0..=MAX_SUBSIDY).contains(&now));
        prop_assert!(get_block_subsidy(height + 1, &params) <= now);
        if height <= params.last_max_subsidy_block {
            prop_assert_eq!(now, MAX_SUBSIDY);
        } else if height <= params.last_decreasing_subsidy_block {
            prop_assert!(now > 0 && now < MAX_SUBSIDY);
        } else {
            prop_assert_eq!(now, 0);
        }
        prop_assert!(total_supply(height, &params) <= MAX_MONEY);
    }
}

#[test]
fn test_subsidy_boundary_heights() {
    for params in [ChainParams::main(), ChainParams::regtest()] {
        let last_max = params.last_max_subsidy_block;
        let last_decreasing = params.last_decreasing_subsidy_block;
        assert_eq!(get_block_subsidy(0, &params), 0);
        assert_eq!(get_block_subsidy(last_max, &params), MAX_SUBSIDY);
        assert!(get_block_subsidy(last_max + 1, &params) < MAX_SUBSIDY);
        assert!(get_block_subsidy(last_decreasing, &params) > 0);
        assert_eq!(get_block_subsidy(last_decreasing + 1, &params), 0);
        assert_eq!(total_supply(last_decreasing + 1, &params), total_supply(last_decreasing, &params));
    }
}
