//! Mining and block-assembly policy
//!
//! Every field has a default so a partial JSON document is a valid config.

use std::path::Path;

use secp256k1::SecretKey;
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{ConsensusError, Result};
use crate::types::Integer;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    /// Largest block the assembler will build
    pub block_max_size: usize,
    /// Free transactions are still taken until the block reaches this size
    pub block_min_size: usize,
    /// Space filled by priority before switching to fee ordering
    pub block_priority_size: usize,
    /// Fee rate (base units per 1000 bytes) below which a transaction is free
    pub min_relay_tx_fee: Integer,
    /// Log priority and fee rate of each selected transaction
    pub print_priority: bool,
    /// Mark assembled nonce headers as data-derived PoK blocks
    pub use_pok: bool,
    /// Worker threads; 0 means one per available core
    pub threads: usize,
    /// Minimum seconds between rebuilds triggered by pool changes
    pub rebuild_interval_secs: u64,
    /// Attempts per scan before checking for a stale template
    pub hashes_per_scan: u32,
    pub hash_meter_interval_ms: u64,
    /// Hex secret key; required for signature-sealed chains, also pays the coinbase
    pub signing_key: Option<String>,
    /// Hex coinbase scriptPubKey used when no signing key is set
    pub payout_script: Option<String>,
}

impl Default for MiningConfig {
    fn default() -> Self {
        MiningConfig {
            block_max_size: DEFAULT_BLOCK_MAX_SIZE,
            block_min_size: DEFAULT_BLOCK_MIN_SIZE,
            block_priority_size: DEFAULT_BLOCK_PRIORITY_SIZE,
            min_relay_tx_fee: MIN_RELAY_TX_FEE,
            print_priority: false,
            use_pok: true,
            threads: 0,
            rebuild_interval_secs: 10,
            hashes_per_scan: 1000,
            hash_meter_interval_ms: 4000,
            signing_key: None,
            payout_script: None,
        }
    }
}

impl MiningConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ConsensusError::Configuration(e.to_string()))
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConsensusError::Configuration(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&contents)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| ConsensusError::Configuration(e.to_string()))
    }

    /// Worker count with 0 resolved to the number of cores (at least 1)
    pub fn worker_threads(&self) -> usize {
        if self.threads > 0 {
            return self.threads;
        }
        std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    }

    pub fn secret_key(&self) -> Result<Option<SecretKey>> {
        let hex_key = match &self.signing_key {
            Some(key) => key,
            None => return Ok(None),
        };
        let bytes = hex::decode(hex_key.trim()).map_err(|e| ConsensusError::Configuration(format!("signing_key: {}", e)))?;
        SecretKey::from_slice(&bytes)
            .map(Some)
            .map_err(|e| ConsensusError::Configuration(format!("signing_key: {}", e)))
    }

    pub fn payout_script_bytes(&self) -> Result<Option<Vec<u8>>> {
        match &self.payout_script {
            Some(script) => hex::decode(script.trim())
                .map(Some)
                .map_err(|e| ConsensusError::Configuration(format!("payout_script: {}", e))),
            None => Ok(None),
        }
    }
}
