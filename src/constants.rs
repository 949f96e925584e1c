//! Consensus and policy constants

/// Base units per coin
pub const COIN: i64 = 100_000;

/// Base units per cent
pub const CENT: i64 = 1_000;

/// Maximum money supply in base units, premine included
pub const MAX_MONEY: i64 = 10_000_000_000 * COIN;

/// Largest per-block subsidy; paid until the chain's last max-subsidy block
pub const MAX_SUBSIDY: i64 = 10_000 * COIN;

/// Percentage of the subsidy paid to blocks without a proof of knowledge
pub const NON_POK_SUBSIDY_PERCENT: i64 = 90;

/// Genesis coinbase outputs and the value locked in each
pub const GENESIS_OUTPUT_COUNT: usize = 90;
pub const GENESIS_OUTPUT_VALUE: i64 = 5_000_000 * COIN;

/// Maximum serialized block size in bytes
pub const MAX_BLOCK_SIZE: usize = 1_000_000;

/// Maximum signature operations per block
pub const MAX_BLOCK_SIGOPS: usize = MAX_BLOCK_SIZE / 50;

/// Default ceiling on the size of assembled blocks
pub const DEFAULT_BLOCK_MAX_SIZE: usize = 750_000;

/// Default budget of block space reserved for high-priority transactions
pub const DEFAULT_BLOCK_PRIORITY_SIZE: usize = 50_000;

/// Default size below which free transactions are still accepted
pub const DEFAULT_BLOCK_MIN_SIZE: usize = 0;

/// Minimum relay fee per 1000 bytes
pub const MIN_RELAY_TX_FEE: i64 = 10;

/// Maximum serialized transaction size
pub const MAX_TX_SIZE: usize = MAX_BLOCK_SIZE;

/// Maximum script length
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Maximum push size inside a script
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;

/// Coinbase scriptSig length bounds
pub const MIN_COINBASE_SCRIPT_SIZE: usize = 2;
pub const MAX_COINBASE_SCRIPT_SIZE: usize = 100;

/// Maximum number of (null) inputs a coinbase may carry
pub const MAX_COINBASE_INPUTS: usize = 25;

/// Blocks before coinbase outputs may be spent
pub const COINBASE_MATURITY: u64 = 100;

/// Lock time threshold: values below are block heights, above are unix times
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Sequence number for final inputs
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// Version bits carrying the proof-of-knowledge commitment in nonce headers
pub const POK_DATA_MASK: u32 = 0xffff_0000;

/// Version bit marking a block whose commitment is derived from transaction data
pub const POK_FLAG: u32 = 0x0000_0100;

/// Current block header version (without PoK bits)
pub const BLOCK_VERSION: u32 = 2;

/// Current transaction version
pub const TX_VERSION: u32 = 1;

/// Number of blocks used for the median time past
pub const MEDIAN_TIME_SPAN: usize = 11;

/// How far ahead of network time a block timestamp may be
pub const MAX_FUTURE_BLOCK_TIME: u32 = 2 * 60 * 60;

/// Starting size and sigop allowance reserved for the coinbase during assembly
pub const COINBASE_RESERVED_SIZE: usize = 1_000;
pub const COINBASE_RESERVED_SIGOPS: usize = 100;

/// Per-input scriptSig allowance discounted when computing priority
pub const PRIORITY_INPUT_OVERHEAD: usize = 41;
pub const PRIORITY_SCRIPT_SIG_ALLOWANCE: usize = 110;

/// Priority above which a transaction may be mined without fee
pub const FREE_PRIORITY_THRESHOLD: f64 = (COIN as f64) * 144.0 / 250.0;
