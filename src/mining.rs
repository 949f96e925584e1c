//! Block template assembly and the proof search
//!
//! Assembly walks the pool once to collect candidates, then greedily selects
//! from a heap that starts in priority order and flips to fee-rate order for
//! the rest of the build. Candidates whose inputs are still pool outputs wait
//! in an arena until every parent has been selected.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use log::{debug, error, info, warn};
use secp256k1::SecretKey;

use crate::types::*;
use crate::constants::*;
use crate::error::{ConsensusError, Result};
use crate::block::{check_block, connect_block};
use crate::chain::{ChainState, NodeState};
use crate::config::MiningConfig;
use crate::economic::get_block_value;
use crate::identity::{block_hash, pow_hash, sign_header};
use crate::mempool::TxMemPool;
use crate::params::ChainParams;
use crate::pok::{derive_pok, embed_pok, set_pok_flag, SerializedTxCache};
use crate::pow::{target_from_bits, update_time, U256};
use crate::script::{push_script_num, ScriptVerifier, OP_0, SCRIPT_VERIFY_P2SH};
use crate::transaction::{
    allow_free, check_tx_inputs, compute_priority, fee_per_kb, is_coinbase, is_final_tx,
    legacy_sigop_count, p2sh_sigops, value_out,
};
use crate::utxo::{UtxoCache, UtxoView};

/// Assembled block plus per-transaction fee and sigop figures.
///
/// Index 0 is the coinbase; its fee entry is the negated total of all fees.
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    pub block: Block,
    pub tx_fees: Vec<Integer>,
    pub tx_sigops: Vec<usize>,
}

impl BlockTemplate {
    pub fn total_fees(&self) -> Integer {
        -self.tx_fees.first().copied().unwrap_or(0)
    }
}

/// Pool transaction under consideration, with figures fixed at collection time
struct Candidate<'p> {
    tx: &'p Transaction,
    txid: Hash,
    size: usize,
    priority: f64,
    fee_per_kb: f64,
    /// Pool parents not yet selected
    depends_on: HashSet<Hash>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortOrder {
    Priority,
    FeeRate,
}

struct QueueEntry {
    priority: f64,
    fee_per_kb: f64,
    txid: Hash,
    index: usize,
    order: SortOrder,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        let by_priority = self.priority.total_cmp(&other.priority);
        let by_fee = self.fee_per_kb.total_cmp(&other.fee_per_kb);
        let ranked = match self.order {
            SortOrder::Priority => by_priority.then(by_fee),
            SortOrder::FeeRate => by_fee.then(by_priority),
        };
        // lower txid pops first among exact ties
        ranked.then_with(|| other.txid.cmp(&self.txid))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

/// Max-heap whose ordering can be switched once, from priority to fee rate
struct CandidateQueue {
    heap: BinaryHeap<QueueEntry>,
    order: SortOrder,
}

impl CandidateQueue {
    fn new(order: SortOrder) -> Self {
        CandidateQueue { heap: BinaryHeap::new(), order }
    }

    fn push(&mut self, candidate: &Candidate<'_>, index: usize) {
        self.heap.push(QueueEntry {
            priority: candidate.priority,
            fee_per_kb: candidate.fee_per_kb,
            txid: candidate.txid,
            index,
            order: self.order,
        });
    }

    fn pop(&mut self) -> Option<QueueEntry> {
        self.heap.pop()
    }

    fn sorted_by_fee(&self) -> bool {
        self.order == SortOrder::FeeRate
    }

    /// Re-heap every queued entry under fee-rate ordering
    fn switch_to_fee_order(&mut self) {
        if self.sorted_by_fee() {
            return;
        }
        self.order = SortOrder::FeeRate;
        let entries = std::mem::take(&mut self.heap).into_vec();
        self.heap = entries
            .into_iter()
            .map(|entry| QueueEntry { order: SortOrder::FeeRate, ..entry })
            .collect();
    }
}

/// Candidates plus the index from parent txid to waiting children
struct CandidatePool<'p> {
    candidates: Vec<Candidate<'p>>,
    dependers: HashMap<Hash, Vec<usize>>,
    ready: Vec<usize>,
}

/// CreateNewBlock: 𝒰𝒮 × 𝒯𝒳* → ℬ
pub struct BlockAssembler<'a> {
    config: &'a MiningConfig,
    verifier: &'a dyn ScriptVerifier,
}

impl<'a> BlockAssembler<'a> {
    pub fn new(config: &'a MiningConfig, verifier: &'a dyn ScriptVerifier) -> Self {
        BlockAssembler { config, verifier }
    }

    /// Build a template on top of the chain tip paying `script_pubkey`.
    ///
    /// 1. Collect final, non-coinbase pool transactions with priority and fee rate
    /// 2. Select greedily under the size and sigop ceilings
    /// 3. Coinbase value = GetBlockValue(height, fees); fill the header
    /// 4. ConnectBlock the result; failure is a `TemplateAssembly` error
    pub fn create_new_block(
        &self,
        chain: &ChainState,
        pool: &TxMemPool,
        script_pubkey: &[u8],
        now: u32,
    ) -> Result<BlockTemplate> {
        let params = chain.params();
        let height = chain.height() + 1;

        let max_size = self
            .config
            .block_max_size
            .min(params.max_block_size.saturating_sub(1000))
            .max(1000);
        let priority_size = self.config.block_priority_size.min(max_size);
        let min_size = self.config.block_min_size.min(max_size);

        let mut candidates = self.collect_candidates(chain, pool, now);

        let coinbase = Transaction {
            version: TX_VERSION,
            inputs: vec![TransactionInput {
                prevout: OutPoint::null(),
                script_sig: vec![OP_0, OP_0],
                sequence: SEQUENCE_FINAL,
            }],
            outputs: vec![TransactionOutput { value: 0, script_pubkey: script_pubkey.to_vec() }],
            lock_time: 0,
        };
        let mut transactions = vec![coinbase];
        let mut tx_fees: Vec<Integer> = vec![-1];
        let mut tx_sigops: Vec<usize> = vec![0];

        let mut view = UtxoCache::new(chain.utxo_set());
        let mut block_size = COINBASE_RESERVED_SIZE;
        let mut block_sigops = COINBASE_RESERVED_SIGOPS;
        let mut fees: Integer = 0;

        let mut queue = CandidateQueue::new(if priority_size == 0 { SortOrder::FeeRate } else { SortOrder::Priority });
        for &index in &candidates.ready {
            queue.push(&candidates.candidates[index], index);
        }

        while let Some(entry) = queue.pop() {
            let tx = candidates.candidates[entry.index].tx;
            let size = candidates.candidates[entry.index].size;

            if block_size + size >= max_size {
                continue;
            }

            let mut sigops = legacy_sigop_count(tx);
            if block_sigops + sigops >= params.max_block_sigops {
                continue;
            }

            // free transactions only fill the block up to the minimum size
            if queue.sorted_by_fee()
                && entry.fee_per_kb < self.config.min_relay_tx_fee as f64
                && block_size + size >= min_size
            {
                continue;
            }

            if !queue.sorted_by_fee() && (block_size + size >= priority_size || !allow_free(entry.priority)) {
                debug!("switching to fee ordering at block size {}", block_size);
                queue.switch_to_fee_order();
            }

            let fee = match check_tx_inputs(tx, &view, height, params.coinbase_maturity)? {
                (ValidationResult::Valid, fee) => fee,
                _ => continue,
            };

            sigops += p2sh_sigops(tx, &view);
            if block_sigops + sigops >= params.max_block_sigops {
                continue;
            }

            let scripts_ok = tx.inputs.iter().enumerate().all(|(i, input)| {
                view.get_utxo(&input.prevout)
                    .map(|utxo| self.verifier.verify_input(tx, i, &utxo.script_pubkey, SCRIPT_VERIFY_P2SH))
                    .unwrap_or(false)
            });
            if !scripts_ok {
                continue;
            }

            view.apply_transaction(tx, height);

            transactions.push(tx.clone());
            tx_fees.push(fee);
            tx_sigops.push(sigops);
            block_size += size;
            block_sigops += sigops;
            fees += fee;

            if self.config.print_priority {
                info!(
                    "priority {:.1} feeperkb {:.1} txid {}",
                    entry.priority, entry.fee_per_kb, display_hash(&entry.txid)
                );
            }

            if let Some(children) = candidates.dependers.get(&entry.txid) {
                for &child in children {
                    let candidate = &mut candidates.candidates[child];
                    if candidate.depends_on.remove(&entry.txid) && candidate.depends_on.is_empty() {
                        queue.push(candidate, child);
                    }
                }
            }
        }

        info!(
            "CreateNewBlock(): height {}, {} transactions, total size {}, fees {}",
            height,
            transactions.len(),
            block_size,
            fees
        );

        // signature headers always carry a commitment
        let use_pok = self.config.use_pok || params.header_variant == HeaderVariant::Signature;
        transactions[0].outputs[0].value = get_block_value(height, fees, use_pok, params);
        tx_fees[0] = -fees;
        tx_sigops[0] = legacy_sigop_count(&transactions[0]);

        let mut header = BlockHeader {
            version: BLOCK_VERSION,
            prev_block_hash: chain.tip_hash(),
            merkle_root: [0u8; 32],
            timestamp: 0,
            bits: 0,
            seal: HeaderSeal::empty(params.header_variant),
        };
        if header.variant() == HeaderVariant::Nonce {
            set_pok_flag(&mut header, use_pok);
        }
        update_time(&mut header, chain.headers(), now);
        header.bits = chain.next_work_required();

        let mut block = Block::new(header, transactions);
        block.update_merkle_root();

        let (result, _) = connect_block(&block, chain.utxo_set(), height, params, self.verifier, false)?;
        if let ValidationResult::Invalid(reason) = result {
            error!("assembled block failed self-validation: {}", reason);
            return Err(ConsensusError::TemplateAssembly(reason));
        }

        Ok(BlockTemplate { block, tx_fees, tx_sigops })
    }

    fn collect_candidates<'p>(&self, chain: &ChainState, pool: &'p TxMemPool, now: u32) -> CandidatePool<'p> {
        let tip_height = chain.height();
        let mut candidates = Vec::new();
        let mut dependers: HashMap<Hash, Vec<usize>> = HashMap::new();
        let mut ready = Vec::new();

        'entries: for entry in pool.iter() {
            let tx = &entry.tx;
            if is_coinbase(tx) || !is_final_tx(tx, tip_height + 1, now) {
                continue;
            }

            let mut depends_on = HashSet::new();
            let mut total_in: Integer = 0;
            let mut input_priority = 0.0f64;

            for input in &tx.inputs {
                if let Some(utxo) = chain.utxo_set().get_utxo(&input.prevout) {
                    total_in += utxo.value;
                    let confirmations = (tip_height + 1).saturating_sub(utxo.height);
                    input_priority += utxo.value as f64 * confirmations as f64;
                    continue;
                }

                let parent_output = pool
                    .get(&input.prevout.hash)
                    .and_then(|parent| parent.tx.outputs.get(input.prevout.index as usize));
                match parent_output {
                    Some(output) => {
                        total_in += output.value;
                        depends_on.insert(input.prevout.hash);
                    }
                    None => {
                        warn!("mempool transaction {} missing input", display_hash(&entry.txid));
                        continue 'entries;
                    }
                }
            }

            let priority = compute_priority(tx, input_priority, entry.size);
            let fee = total_in - value_out(tx).unwrap_or(total_in);
            let fee_rate = fee_per_kb(fee, entry.size);

            let index = candidates.len();
            if depends_on.is_empty() {
                ready.push(index);
            } else {
                for parent in &depends_on {
                    dependers.entry(*parent).or_default().push(index);
                }
            }
            candidates.push(Candidate {
                tx,
                txid: entry.txid,
                size: entry.size,
                priority,
                fee_per_kb: fee_rate,
                depends_on,
            });
        }

        CandidatePool { candidates, dependers, ready }
    }
}

/// Per-worker extra-nonce counter; restarts whenever the previous block changes
#[derive(Debug, Default, Clone)]
pub struct ExtraNonce {
    prev_block_hash: Option<Hash>,
    value: u32,
}

impl ExtraNonce {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> u32 {
        self.value
    }
}

/// IncrementExtraNonce: coinbase scriptSig = ⟨height⟩ ⟨extra nonce⟩, merkle root rebuilt
pub fn increment_extra_nonce(block: &mut Block, height: Natural, extra_nonce: &mut ExtraNonce) -> Result<()> {
    if extra_nonce.prev_block_hash != Some(block.header.prev_block_hash) {
        extra_nonce.value = 0;
        extra_nonce.prev_block_hash = Some(block.header.prev_block_hash);
    }
    extra_nonce.value = extra_nonce.value.wrapping_add(1);

    let mut script_sig = Vec::new();
    push_script_num(&mut script_sig, height as i64);
    push_script_num(&mut script_sig, extra_nonce.value as i64);
    if !(MIN_COINBASE_SCRIPT_SIZE..=MAX_COINBASE_SCRIPT_SIZE).contains(&script_sig.len()) {
        return Err(ConsensusError::TemplateAssembly(format!(
            "coinbase scriptSig of {} bytes", script_sig.len()
        )));
    }

    let coinbase_input = block
        .transactions_mut()
        .first_mut()
        .and_then(|tx| tx.inputs.first_mut())
        .ok_or_else(|| ConsensusError::TemplateAssembly("block has no coinbase".to_string()))?;
    coinbase_input.script_sig = script_sig;

    block.update_merkle_root();
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanResult {
    pub found: bool,
    /// Attempts made, including the successful one
    pub hashes: u32,
}

/// Proof search state owned by one worker
pub struct HashScanner {
    cache: SerializedTxCache,
    signing_key: Option<SecretKey>,
    entropy: u64,
}

impl HashScanner {
    pub fn new(signing_key: Option<SecretKey>) -> Self {
        HashScanner { cache: SerializedTxCache::new(), signing_key, entropy: 0 }
    }

    /// ScanHash: try up to `max_tries` candidates.
    ///
    /// Nonce headers advance the nonce and re-embed the recomputed commitment
    /// each attempt. Signature headers re-sign with fresh entropy; their
    /// commitment is fixed for the template.
    pub fn scan_hash(&mut self, block: &mut Block, max_tries: u32, params: &ChainParams) -> Result<ScanResult> {
        let bits = block.header.bits;
        let target = target_from_bits(bits, &params.pow_limit)
            .ok_or_else(|| ConsensusError::InvalidProofOfWork(format!("nBits {:08x} out of range", bits)))?;

        match block.header.variant() {
            HeaderVariant::Nonce => self.scan_nonce(block, max_tries, params.pok_mask, &target),
            HeaderVariant::Signature => self.scan_signature(block, max_tries, params.pok_mask, &target),
        }
    }

    fn scan_nonce(&mut self, block: &mut Block, max_tries: u32, mask: u32, target: &U256) -> Result<ScanResult> {
        for attempt in 0..max_tries {
            block.header.seal = HeaderSeal::Nonce(block.header.nonce().wrapping_add(1));
            let pok = derive_pok(&block.header, block.transactions(), mask, Some(&mut self.cache))?;
            embed_pok(&mut block.header, pok, mask);
            if U256::from_le_bytes(&pow_hash(&block.header, pok)) <= *target {
                return Ok(ScanResult { found: true, hashes: attempt + 1 });
            }
        }
        Ok(ScanResult { found: false, hashes: max_tries })
    }

    fn scan_signature(&mut self, block: &mut Block, max_tries: u32, mask: u32, target: &U256) -> Result<ScanResult> {
        let key = self
            .signing_key
            .ok_or_else(|| ConsensusError::Configuration("signature-sealed chain needs a signing key".to_string()))?;
        let pok = derive_pok(&block.header, block.transactions(), mask, Some(&mut self.cache))?;

        for attempt in 0..max_tries {
            self.entropy = self.entropy.wrapping_add(1);
            let mut entropy = [0u8; 32];
            entropy[..8].copy_from_slice(&self.entropy.to_le_bytes());
            sign_header(&mut block.header, &key, Some(&entropy))?;
            if U256::from_le_bytes(&pow_hash(&block.header, pok)) <= *target {
                return Ok(ScanResult { found: true, hashes: attempt + 1 });
            }
        }
        Ok(ScanResult { found: false, hashes: max_tries })
    }
}

/// CheckWork: verify a solved block and submit it to the node.
///
/// The caller holds the node lock. Blocks failing their own proofs or built on
/// a tip that has since moved are rejected without touching the chain.
pub fn check_work(block: &Block, node: &mut NodeState, verifier: &dyn ScriptVerifier, now: u32) -> Result<ValidationResult> {
    let params = node.chain.shared_params();
    if let Err(err) = check_block(block, &params, None) {
        warn!("solved block rejected by its own proof check: {}", err);
        return Ok(ValidationResult::Invalid(err.reason().to_string()));
    }

    let hash = block_hash(&block.header);
    info!("proof of work found\n  hash: {}\n  bits: {:08x}", display_hash(&hash), block.header.bits);
    if let Some(coinbase) = block.transactions().first() {
        info!("generated {}", format_money(value_out(coinbase).unwrap_or(0)));
    }

    if block.header.prev_block_hash != node.chain.tip_hash() {
        warn!("generated block is stale");
        return Ok(ValidationResult::Invalid("stale".to_string()));
    }

    let result = node.process_block(block, now, verifier)?;
    if let ValidationResult::Invalid(reason) = &result {
        warn!("generated block not accepted: {}", reason);
    }
    Ok(result)
}

/// Big-endian hex, the conventional display order for hashes
pub fn display_hash(hash: &Hash) -> String {
    let mut reversed = *hash;
    reversed.reverse();
    hex::encode(reversed)
}

fn format_money(value: Integer) -> String {
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    format!("{}{}.{:05}", sign, abs / COIN as u64, abs % COIN as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::economic::get_block_subsidy;
    use crate::mempool::MempoolEntry;
    use crate::script::StructuralVerifier;
    use crate::transaction::calculate_tx_id;

    fn funded_chain(values: &[Integer]) -> (ChainState, Vec<OutPoint>) {
        let mut utxos = UtxoSet::new();
        let outpoints: Vec<OutPoint> = (0..values.len())
            .map(|i| OutPoint { hash: [i as u8 + 1; 32], index: 0 })
            .collect();
        for (outpoint, value) in outpoints.iter().zip(values) {
            utxos.insert(*outpoint, UTXO { value: *value, script_pubkey: vec![0x51], height: 0, is_coinbase: false });
        }
        let chain = ChainState::with_utxo_set(Arc::new(ChainParams::regtest()), utxos).unwrap();
        (chain, outpoints)
    }

    fn spend(prevout: OutPoint, value: Integer) -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TransactionInput { prevout, script_sig: vec![0x51], sequence: SEQUENCE_FINAL }],
            outputs: vec![TransactionOutput { value, script_pubkey: vec![0x51] }],
            lock_time: 0,
        }
    }

    fn add(pool: &mut TxMemPool, tx: &Transaction, fee: Integer) {
        pool.add_unchecked(MempoolEntry::new(tx.clone(), fee, 0, 0.0, 0));
    }

    fn now(chain: &ChainState) -> u32 {
        chain.tip().timestamp + 600
    }

    #[test]
    fn test_empty_pool_template() {
        let (chain, _) = funded_chain(&[]);
        let config = MiningConfig::default();
        let assembler = BlockAssembler::new(&config, &StructuralVerifier);
        let template = assembler.create_new_block(&chain, &TxMemPool::new(), &[0x51], now(&chain)).unwrap();

        let block = &template.block;
        assert_eq!(block.transactions().len(), 1);
        assert_eq!(block.transactions()[0].inputs[0].script_sig, vec![OP_0, OP_0]);
        assert_eq!(block.transactions()[0].outputs[0].value, get_block_subsidy(1, chain.params()));
        assert_eq!(block.header.prev_block_hash, chain.tip_hash());
        assert_eq!(block.header.bits, chain.next_work_required());
        assert!(block.header.timestamp > chain.median_time_past());
        assert_eq!(template.total_fees(), 0);
        assert_eq!(template.tx_fees.len(), 1);
    }

    #[test]
    fn test_fee_ordering_and_coinbase_value() {
        let (chain, outpoints) = funded_chain(&[COIN, COIN, COIN]);
        let mut pool = TxMemPool::new();
        let fees = [10_000, 30_000, 20_000];
        let txs: Vec<Transaction> = outpoints.iter().zip(fees).map(|(o, fee)| spend(*o, COIN - fee)).collect();
        for (tx, fee) in txs.iter().zip(fees) {
            add(&mut pool, tx, fee);
        }

        let mut config = MiningConfig::default();
        config.block_priority_size = 0;
        let assembler = BlockAssembler::new(&config, &StructuralVerifier);
        let template = assembler.create_new_block(&chain, &pool, &[0x51], now(&chain)).unwrap();

        let ids: Vec<Hash> = template.block.transactions()[1..].iter().map(calculate_tx_id).collect();
        assert_eq!(ids, vec![calculate_tx_id(&txs[1]), calculate_tx_id(&txs[2]), calculate_tx_id(&txs[0])]);
        assert_eq!(&template.tx_fees[1..], &[30_000i64, 20_000, 10_000][..]);
        assert_eq!(template.total_fees(), 60_000);
        assert_eq!(
            template.block.transactions()[0].outputs[0].value,
            get_block_subsidy(1, chain.params()) + 60_000
        );
    }

    #[test]
    fn test_orphan_waits_for_parent() {
        let (chain, outpoints) = funded_chain(&[10 * COIN]);
        let parent = spend(outpoints[0], 10 * COIN - 1000);
        let child = spend(OutPoint { hash: calculate_tx_id(&parent), index: 0 }, 10 * COIN - 500_000);
        let mut pool = TxMemPool::new();
        add(&mut pool, &parent, 1000);
        add(&mut pool, &child, 499_000);

        let mut config = MiningConfig::default();
        config.block_priority_size = 0;
        let assembler = BlockAssembler::new(&config, &StructuralVerifier);
        let template = assembler.create_new_block(&chain, &pool, &[0x51], now(&chain)).unwrap();

        // child pays far more but cannot precede its parent
        let txs = template.block.transactions();
        assert_eq!(txs.len(), 3);
        assert_eq!(txs[1], parent);
        assert_eq!(txs[2], child);
    }

    #[test]
    fn test_orphan_never_selected_without_parent() {
        let (chain, outpoints) = funded_chain(&[10 * COIN]);
        let mut parent = spend(outpoints[0], 10 * COIN - 1000);
        parent.lock_time = 50;
        parent.inputs[0].sequence = 0;
        let child = spend(OutPoint { hash: calculate_tx_id(&parent), index: 0 }, 10 * COIN - 500_000);
        let mut pool = TxMemPool::new();
        add(&mut pool, &parent, 1000);
        add(&mut pool, &child, 499_000);

        let config = MiningConfig::default();
        let assembler = BlockAssembler::new(&config, &StructuralVerifier);
        let template = assembler.create_new_block(&chain, &pool, &[0x51], now(&chain)).unwrap();
        assert_eq!(template.block.transactions().len(), 1);
    }

    #[test]
    fn test_free_transactions_skipped_in_fee_order() {
        let (chain, outpoints) = funded_chain(&[COIN, COIN]);
        let free = spend(outpoints[0], COIN);
        let paying = spend(outpoints[1], COIN - 5000);
        let mut pool = TxMemPool::new();
        add(&mut pool, &free, 0);
        add(&mut pool, &paying, 5000);

        let mut config = MiningConfig::default();
        config.block_priority_size = 0;
        let assembler = BlockAssembler::new(&config, &StructuralVerifier);
        let template = assembler.create_new_block(&chain, &pool, &[0x51], now(&chain)).unwrap();
        assert_eq!(template.block.transactions().len(), 2);
        assert_eq!(template.block.transactions()[1], paying);

        // a minimum block size lets free transactions in
        config.block_min_size = 10_000;
        let assembler = BlockAssembler::new(&config, &StructuralVerifier);
        let template = assembler.create_new_block(&chain, &pool, &[0x51], now(&chain)).unwrap();
        assert_eq!(template.block.transactions().len(), 3);
    }

    #[test]
    fn test_high_priority_free_transaction_selected() {
        let (chain, outpoints) = funded_chain(&[1000 * COIN]);
        let free = spend(outpoints[0], 1000 * COIN);
        let mut pool = TxMemPool::new();
        add(&mut pool, &free, 0);

        let config = MiningConfig::default();
        let assembler = BlockAssembler::new(&config, &StructuralVerifier);
        let template = assembler.create_new_block(&chain, &pool, &[0x51], now(&chain)).unwrap();
        assert_eq!(template.block.transactions().len(), 2);
        assert_eq!(template.total_fees(), 0);
    }

    #[test]
    fn test_block_size_ceiling() {
        let values = vec![COIN; 40];
        let (chain, outpoints) = funded_chain(&values);
        let mut pool = TxMemPool::new();
        for outpoint in &outpoints {
            let mut tx = spend(*outpoint, COIN - 10_000);
            tx.outputs[0].script_pubkey = vec![0x51; 200];
            add(&mut pool, &tx, 10_000);
        }

        let mut config = MiningConfig::default();
        config.block_max_size = 3000;
        config.block_priority_size = 0;
        let assembler = BlockAssembler::new(&config, &StructuralVerifier);
        let template = assembler.create_new_block(&chain, &pool, &[0x51], now(&chain)).unwrap();

        let size = crate::serialize::block_size(&template.block);
        assert!(size < 3000);
        assert!(template.block.transactions().len() > 1);
        assert!(template.block.transactions().len() < 41);
    }

    #[test]
    fn test_immature_coinbase_spend_skipped() {
        let mut utxos = UtxoSet::new();
        let outpoint = OutPoint { hash: [5; 32], index: 0 };
        utxos.insert(outpoint, UTXO { value: COIN, script_pubkey: vec![0x51], height: 0, is_coinbase: true });
        let chain = ChainState::with_utxo_set(Arc::new(ChainParams::regtest()), utxos).unwrap();
        let mut pool = TxMemPool::new();
        add(&mut pool, &spend(outpoint, COIN - 10_000), 10_000);

        let config = MiningConfig::default();
        let assembler = BlockAssembler::new(&config, &StructuralVerifier);
        let template = assembler.create_new_block(&chain, &pool, &[0x51], now(&chain)).unwrap();
        assert_eq!(template.block.transactions().len(), 1);
    }

    #[test]
    fn test_pok_flag_follows_config() {
        let (chain, _) = funded_chain(&[]);
        let mut config = MiningConfig::default();
        let assembler = BlockAssembler::new(&config, &StructuralVerifier);
        let template = assembler.create_new_block(&chain, &TxMemPool::new(), &[], now(&chain)).unwrap();
        assert!(crate::pok::is_pok_block(&template.block.header));

        config.use_pok = false;
        let assembler = BlockAssembler::new(&config, &StructuralVerifier);
        let template = assembler.create_new_block(&chain, &TxMemPool::new(), &[], now(&chain)).unwrap();
        assert!(!crate::pok::is_pok_block(&template.block.header));
    }

    #[test]
    fn test_increment_extra_nonce() {
        let (chain, _) = funded_chain(&[]);
        let config = MiningConfig::default();
        let assembler = BlockAssembler::new(&config, &StructuralVerifier);
        let mut block = assembler.create_new_block(&chain, &TxMemPool::new(), &[], now(&chain)).unwrap().block;

        let mut extra_nonce = ExtraNonce::new();
        increment_extra_nonce(&mut block, 1, &mut extra_nonce).unwrap();
        assert_eq!(extra_nonce.value(), 1);
        assert_eq!(block.transactions()[0].inputs[0].script_sig, vec![0x01, 0x01, 0x01, 0x01]);
        assert_eq!(block.header.merkle_root, crate::merkle::calculate_merkle_root(block.transactions()));

        increment_extra_nonce(&mut block, 1, &mut extra_nonce).unwrap();
        assert_eq!(extra_nonce.value(), 2);

        block.header.prev_block_hash = [1; 32];
        increment_extra_nonce(&mut block, 1, &mut extra_nonce).unwrap();
        assert_eq!(extra_nonce.value(), 1);
    }

    #[test]
    fn test_scan_and_check_work() {
        let (chain, _) = funded_chain(&[]);
        let mut node = NodeState::new(chain);
        let config = MiningConfig::default();
        let assembler = BlockAssembler::new(&config, &StructuralVerifier);
        let time = now(&node.chain);
        let mut block = assembler.create_new_block(&node.chain, &node.mempool, &[0x51], time).unwrap().block;
        increment_extra_nonce(&mut block, 1, &mut ExtraNonce::new()).unwrap();

        let mut scanner = HashScanner::new(None);
        let params = node.chain.shared_params();
        let mut found = false;
        for _ in 0..100 {
            if scanner.scan_hash(&mut block, 64, &params).unwrap().found {
                found = true;
                break;
            }
        }
        assert!(found);

        let stale = {
            let mut b = block.clone();
            b.header.prev_block_hash = [3; 32];
            b
        };
        assert!(!check_work(&stale, &mut node, &StructuralVerifier, time).unwrap().is_valid());

        assert_eq!(check_work(&block, &mut node, &StructuralVerifier, time).unwrap(), ValidationResult::Valid);
        assert_eq!(node.chain.height(), 1);

        // same block again is now stale
        assert_eq!(
            check_work(&block, &mut node, &StructuralVerifier, time).unwrap(),
            ValidationResult::Invalid("stale".to_string())
        );
    }

    #[test]
    fn test_scan_signature_requires_key() {
        let params = ChainParams::regtest().with_signature_headers();
        let chain = ChainState::new(Arc::new(params.clone())).unwrap();
        let config = MiningConfig::default();
        let assembler = BlockAssembler::new(&config, &StructuralVerifier);
        let mut block = assembler.create_new_block(&chain, &TxMemPool::new(), &[], now(&chain)).unwrap().block;
        let mut scanner = HashScanner::new(None);
        assert!(matches!(scanner.scan_hash(&mut block, 1, &params), Err(ConsensusError::Configuration(_))));
    }

    #[test]
    fn test_display_helpers() {
        let mut hash = [0u8; 32];
        hash[31] = 0xab;
        assert!(display_hash(&hash).starts_with("ab"));
        assert_eq!(format_money(150_000), "1.50000");
        assert_eq!(format_money(-1), "-0.00001");
    }
}
