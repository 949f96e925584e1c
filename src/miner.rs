//! Mining worker threads
//!
//! Each worker owns its template, extra nonce and serialized-transaction
//! cache. The node lock is only taken to build a template, to poll for a new
//! tip or pool change, and to submit a solved block.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context};
use log::{error, info, warn};
use secp256k1::{PublicKey, Secp256k1};

use crate::chain::NodeState;
use crate::config::MiningConfig;
use crate::mining::{check_work, increment_extra_nonce, BlockAssembler, ExtraNonce, HashScanner};
use crate::pow::update_time;
use crate::script::{pay_to_pubkey_script, ScriptVerifier};

/// Nonce value past which a template is rebuilt rather than wrapped
const NONCE_REBUILD_THRESHOLD: u32 = 0xffff_0000;

/// Minimum spacing between hash-rate log lines
const HASH_METER_LOG_INTERVAL: Duration = Duration::from_secs(30 * 60);

pub fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().min(u32::MAX as u64) as u32)
        .unwrap_or(0)
}

#[derive(Debug)]
struct HashMeter {
    window_start: Instant,
    window_hashes: u64,
    rate: f64,
    last_log: Option<Instant>,
}

impl HashMeter {
    fn new() -> Self {
        HashMeter { window_start: Instant::now(), window_hashes: 0, rate: 0.0, last_log: None }
    }

    fn add(&mut self, hashes: u64, interval: Duration) {
        self.window_hashes += hashes;
        let elapsed = self.window_start.elapsed();
        if elapsed < interval {
            return;
        }
        self.rate = self.window_hashes as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
        self.window_hashes = 0;
        self.window_start = Instant::now();

        if self.last_log.map_or(true, |at| at.elapsed() >= HASH_METER_LOG_INTERVAL) {
            self.last_log = Some(Instant::now());
            info!("hashmeter {:.1} khash/s", self.rate / 1000.0);
        }
    }
}

/// Counters exposed to operator tooling
#[derive(Debug)]
pub struct MinerStats {
    hashes: AtomicU64,
    blocks_found: AtomicU64,
    blocks_rejected: AtomicU64,
    meter: Mutex<HashMeter>,
}

impl MinerStats {
    fn new() -> Self {
        MinerStats {
            hashes: AtomicU64::new(0),
            blocks_found: AtomicU64::new(0),
            blocks_rejected: AtomicU64::new(0),
            meter: Mutex::new(HashMeter::new()),
        }
    }

    pub fn hashes(&self) -> u64 {
        self.hashes.load(Ordering::Relaxed)
    }

    pub fn blocks_found(&self) -> u64 {
        self.blocks_found.load(Ordering::Relaxed)
    }

    pub fn blocks_rejected(&self) -> u64 {
        self.blocks_rejected.load(Ordering::Relaxed)
    }

    /// Rate over the last completed meter window
    pub fn hashes_per_sec(&self) -> f64 {
        self.meter.lock().map(|meter| meter.rate).unwrap_or(0.0)
    }

    fn record_hashes(&self, hashes: u32, interval: Duration) {
        self.hashes.fetch_add(hashes as u64, Ordering::Relaxed);
        if let Ok(mut meter) = self.meter.lock() {
            meter.add(hashes as u64, interval);
        }
    }
}

/// Running set of mining threads; dropping it stops them
pub struct Miner {
    stop: Arc<AtomicBool>,
    stats: Arc<MinerStats>,
    handles: Vec<JoinHandle<()>>,
}

impl Miner {
    pub fn start(
        node: Arc<Mutex<NodeState>>,
        config: MiningConfig,
        verifier: Arc<dyn ScriptVerifier>,
    ) -> anyhow::Result<Miner> {
        // surface key and script errors before any thread starts
        config.secret_key()?;
        config.payout_script_bytes()?;

        let stop = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(MinerStats::new());
        let config = Arc::new(config);
        let threads = config.worker_threads();
        let mut miner = Miner { stop, stats, handles: Vec::with_capacity(threads) };

        for id in 0..threads {
            let worker = Worker {
                id,
                node: Arc::clone(&node),
                config: Arc::clone(&config),
                verifier: Arc::clone(&verifier),
                stop: Arc::clone(&miner.stop),
                stats: Arc::clone(&miner.stats),
            };
            let handle = thread::Builder::new()
                .name(format!("miner-{}", id))
                .spawn(move || {
                    info!("miner thread {} started", worker.id);
                    if let Err(err) = worker.run() {
                        error!("miner thread {} stopped: {:#}", worker.id, err);
                    }
                    info!("miner thread {} exiting", worker.id);
                })
                .with_context(|| format!("could not spawn miner thread {}", id))?;
            miner.handles.push(handle);
        }

        info!("started {} miner threads", threads);
        Ok(miner)
    }

    pub fn stats(&self) -> Arc<MinerStats> {
        Arc::clone(&self.stats)
    }

    pub fn is_running(&self) -> bool {
        !self.stop.load(Ordering::SeqCst) && self.handles.iter().any(|h| !h.is_finished())
    }

    /// Signal every worker and wait for it to exit
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("miner thread panicked");
            }
        }
    }
}

impl Drop for Miner {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    id: usize,
    node: Arc<Mutex<NodeState>>,
    config: Arc<MiningConfig>,
    verifier: Arc<dyn ScriptVerifier>,
    stop: Arc<AtomicBool>,
    stats: Arc<MinerStats>,
}

impl Worker {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn lock_node(&self) -> anyhow::Result<std::sync::MutexGuard<'_, NodeState>> {
        self.node.lock().map_err(|_| anyhow!("node lock poisoned"))
    }

    fn payout_script(&self) -> anyhow::Result<Vec<u8>> {
        if let Some(key) = self.config.secret_key()? {
            let pubkey = PublicKey::from_secret_key(&Secp256k1::signing_only(), &key);
            return Ok(pay_to_pubkey_script(&pubkey.serialize()));
        }
        Ok(self.config.payout_script_bytes()?.unwrap_or_default())
    }

    fn run(&self) -> anyhow::Result<()> {
        let script_pubkey = self.payout_script()?;
        let mut scanner = HashScanner::new(self.config.secret_key()?);
        let mut extra_nonce = ExtraNonce::new();
        let meter_interval = Duration::from_millis(self.config.hash_meter_interval_ms);
        let rebuild_interval = Duration::from_secs(self.config.rebuild_interval_secs);

        while !self.stopped() {
            let (mut block, height, params, tip_hash, pool_version) = {
                let node = self.lock_node()?;
                let assembler = BlockAssembler::new(&self.config, &*self.verifier);
                let template = assembler
                    .create_new_block(&node.chain, &node.mempool, &script_pubkey, unix_now())
                    .context("could not build block template")?;
                (
                    template.block,
                    node.chain.height() + 1,
                    node.chain.shared_params(),
                    node.chain.tip_hash(),
                    node.mempool.transactions_updated(),
                )
            };
            increment_extra_nonce(&mut block, height, &mut extra_nonce)?;
            let built_at = Instant::now();

            loop {
                if self.stopped() {
                    return Ok(());
                }

                let scan = scanner.scan_hash(&mut block, self.config.hashes_per_scan, &params)?;
                self.stats.record_hashes(scan.hashes, meter_interval);

                if scan.found {
                    let mut node = self.lock_node()?;
                    let result = check_work(&block, &mut node, &*self.verifier, unix_now())?;
                    if result.is_valid() {
                        self.stats.blocks_found.fetch_add(1, Ordering::Relaxed);
                    } else {
                        self.stats.blocks_rejected.fetch_add(1, Ordering::Relaxed);
                    }
                    break;
                }

                let node = self.lock_node()?;
                if node.chain.tip_hash() != tip_hash {
                    break;
                }
                if node.mempool.transactions_updated() != pool_version && built_at.elapsed() >= rebuild_interval {
                    break;
                }
                if block.header.nonce() >= NONCE_REBUILD_THRESHOLD {
                    break;
                }
                update_time(&mut block.header, node.chain.headers(), unix_now());
            }
        }
        Ok(())
    }
}
