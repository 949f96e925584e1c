//! Per-network chain parameters
//!
//! Built once at startup and shared by reference; nothing here is mutated
//! after construction.

use serde::{Deserialize, Serialize};

use crate::types::*;
use crate::constants::*;
use crate::identity::block_hash;
use crate::merkle::calculate_merkle_root;
use crate::pok::{derive_pok, embed_pok, set_pok_flag};
use crate::pow::U256;
use crate::script::{push_data, push_int, push_script_num, OP_CHECKLOCKTIMEVERIFY, OP_EQUAL, OP_HASH160};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Main,
    Test,
    Regtest,
}

const GENESIS_MESSAGE: &[u8] = b"The Times 27/Feb/2015 Spock actor Leonard Nimoy dies aged 83. \\\\//_";

/// Genesis premine: (years locked, P2SH script hash) per coinbase output
const GENESIS_PAYOUTS: [(i64, [u8; 20]); GENESIS_OUTPUT_COUNT] = [
    (0, hash160("da3fea3a64eea0574ed66529a7a6ff6c7874a7a3")),
    (0, hash160("4ab6f5fd56eb731e3bcdd8dac9425df9e8b9faab")),
    (0, hash160("21f34867d4980a6e6af7b036ad079598dca81c29")),
    (0, hash160("534a5ace951fb2a070030fbd2a06eab96b224e28")),
    (0, hash160("24f416d527b3d4a39d7cb1e1d83c310eb8f576ba")),
    (0, hash160("ce519691bd7bcb592ee8b0d93aa5a96acd425e74")),
    (0, hash160("6e04fecf244f0fb34e6ca74f81ae0ae51836910e")),
    (0, hash160("3e7563d71532c1300e44135a5debe473214174cd")),
    (0, hash160("22d310cbb24491f5d0fcbec3f44195737acc8d62")),
    (0, hash160("5a0abe050b1d59a0043e37ec1dfd232ad0645790")),
    (0, hash160("3b95ca8ecf71eed291678b26aae8808afc895d4d")),
    (0, hash160("a32b476d35670461504b1cb40377fadf6671632a")),
    (0, hash160("fb5dd45884298c2f22ad9af59206c88d3f5055c8")),
    (0, hash160("ac1c4e518133f2235b44a4299f007f843dffec16")),
    (0, hash160("007da34bb38387c91429ab2800895740081f77cb")),
    (0, hash160("919b7e3aa625d1986b6b4c83614de578a2686171")),
    (0, hash160("a8c7fe8cb2dc0e42a8e4f367bf5ce7c76af1e7f0")),
    (0, hash160("e979ca5952dd2d393f48ff034d3e6659539da25f")),
    (0, hash160("5d095df9efd0ccd88a023bcba1f29ed05ec3cf87")),
    (0, hash160("fa26a7db318bf77a6ef367fbba8d9445de404e0a")),
    (0, hash160("87deca17e1a32d9f94cb334ab78b20106f7de0f1")),
    (0, hash160("12bdf80fdd217062403408b1bdddb18847f2a0b6")),
    (0, hash160("91709dbd34e912c6b1fb2c36db8b08bbef862ff0")),
    (0, hash160("a165334f0a8db36609de29783123e57655244b3b")),
    (0, hash160("dbc150fab7c2cc9afb03b84a6be1246fea2951f8")),
    (0, hash160("ae5df9a8f256ee52886b1cabf421e96d76f87e62")),
    (0, hash160("7c0f10a29b33353968d18649e33698d7905d259e")),
    (0, hash160("4bd6c51f4852e04f39478dcda32575ca65319ee3")),
    (0, hash160("6d47d036108d961d7f406bb6b04cd8bb5704a20b")),
    (0, hash160("05c73b92da9a7cecdb3faeaf211ab9191a39407a")),
    (0, hash160("12197b4b504d14ecbd65eea52f16de5db9d56c51")),
    (0, hash160("74245399e24a94fd480f10de4d96ce6e15a04276")),
    (0, hash160("3c95f77c8c0369cd8ffeff9e387b2dda84f7a73b")),
    (0, hash160("c4bc9cf596a338e41850cc040e9f461eed746fe0")),
    (0, hash160("fe90295b9619ad1cdcb1b0b70700abfde92943c4")),
    (0, hash160("e40ef4bec3c7c22e26ab4e293cd9c1e76468cb44")),
    (0, hash160("a7e5bc5ca0d3a782caa4e8a1c5eccd67309d0f16")),
    (0, hash160("3eb549a64c9d894989f25081cbeb7cf809dcbd30")),
    (0, hash160("ceeab52b623544fc2f27ef180c88068a8d503796")),
    (0, hash160("7be344ed8b68e0a13b9f1164ca0c9db50057f4c7")),
    (0, hash160("14acff4287059b8c547b6bbb49458c6d1d577e8c")),
    (0, hash160("efbd574253b64703270449a0302a06e40c118abd")),
    (0, hash160("79bb4091dd6879df0ba492f268bcba086b316dd2")),
    (0, hash160("96e1f73282f87a4065f577c0e7c00df5e9e4ef65")),
    (0, hash160("c4e5922f0abd253d8b14a573c5284f19ebcaabaf")),
    (0, hash160("5baa75da77f4f1140b296e51bda96b597d7fc6be")),
    (0, hash160("d32d9281dfbbef3ba052a5409c0b84eda64077b0")),
    (0, hash160("08802fd3e05e55a13d4008f9061bcb2aa4f3677a")),
    (0, hash160("265a7428508ba3a861220737038d240539b72995")),
    (0, hash160("faa259cd2cada0187deb904c95063f0f077e7d25")),
    (0, hash160("ff4a33698f6f549d4d340655865c79c52d4a2cc2")),
    (0, hash160("870fa70d6e7c60df69c402bde450d6aa40275026")),
    (0, hash160("42e2bdeba00356442562600299dfe13f47359e6b")),
    (0, hash160("09a62ecd7d65193dc5ffe17480d51ba25b557a3c")),
    (0, hash160("48050f29b42d6167ac8146734d96c4e0a388a8ab")),
    (0, hash160("ef179cf6a62f6cfc8a5d428bf03534f65b121920")),
    (0, hash160("56dc5decec2ea2cb10862babab61e79058f523ef")),
    (0, hash160("4e3db41e93fc2b43e6231d2128e4753b4cab528d")),
    (0, hash160("729ab83d2275946dd32861c8cc9547b7ee4e42cd")),
    (0, hash160("e33c26a52e43c9ab73315daf220b6cb0572d29bf")),
    (0, hash160("a2ff3f65bec27aee54d3d30027114ad7be020747")),
    (0, hash160("4e632c8ba99a4f84cd50073e91ddb0f9f5aaeea6")),
    (0, hash160("c552654ce54d4d9579299b34d93accb76e3d1991")),
    (0, hash160("2efaed0e80b9b566bc2d3b255a7d05375cc1c670")),
    (0, hash160("624ae1942913c16fb3e1009a69d6445a4356331b")),
    (0, hash160("7ebda584319a4598f4b1bf5ada8866b5ab4a3822")),
    (0, hash160("45dca6ee404f2067d195df535d4d4958aa38d024")),
    (0, hash160("34a3fa5738d0bd8afc65aa1009fd8d18fd46e874")),
    (0, hash160("bcfaddf54ceb565809e1b617b6e6d9f49f5e2f3b")),
    (0, hash160("269957be2d7164d808760efbccb6cca806e3601b")),
    (1, hash160("df8934cac9f50aca1383069a85e7dc1b97cf4bfa")),
    (1, hash160("ee7a965b8710906da31db9b03900416d68c99af4")),
    (1, hash160("9788c8d6ba76ddb8ae4d354b7b5fe390a923b98c")),
    (1, hash160("0a568d39c7b3c7f439e563ca6415d72ad7782124")),
    (1, hash160("85898b7dae8f7be10f04d38d990e8ad2155f867a")),
    (2, hash160("c92297b5759d3108579ce9ca0e488000b08c0ed6")),
    (2, hash160("247fce461aa05e754c6028ce482bdfad37abdcd4")),
    (2, hash160("c19c7ad91e65e41a3aae384dbc01fa44d4d87ab6")),
    (2, hash160("a4f0c847934b1dbcee451327e82df7d58f98284d")),
    (2, hash160("502e8799a4e7d8079c395fec454ebde6d827131c")),
    (3, hash160("4b617725bccc1d5af81e7a6c3e62583518cb36cc")),
    (3, hash160("fe40d3c4082030164f239832336e46c43d391f06")),
    (3, hash160("e078aab6c661dc0fc9f09cb4e0def11244711cd4")),
    (3, hash160("af8b21a19c5d93e02b41c8a1b61bb09656f75b25")),
    (3, hash160("fcdd823ebd0174aa6cf66106b82e378aaeb1c8e3")),
    (4, hash160("656a286a77395ccae2ab69bf6541d8194f5f60ad")),
    (4, hash160("9afdfd32396e64808ec1c181fad25df28e5582e9")),
    (4, hash160("1a2666b75add11454f13cb2dee30539d62720958")),
    (4, hash160("ac26ad5958a6ea7049fd4de43815fc4111cacd72")),
    (4, hash160("8acf46b0457528891a7defcf0b6b517a3bce23ac")),
];

const MINUTES_PER_YEAR: i64 = 365 * 24 * 60;

const fn hex_nibble(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        _ => panic!("invalid hex digit"),
    }
}

const fn hash160(hex: &str) -> [u8; 20] {
    let bytes = hex.as_bytes();
    assert!(bytes.len() == 40);
    let mut out = [0u8; 20];
    let mut i = 0;
    while i < 20 {
        out[i] = hex_nibble(bytes[2 * i]) << 4 | hex_nibble(bytes[2 * i + 1]);
        i += 1;
    }
    out
}

#[derive(Debug, Clone)]
pub struct ChainParams {
    pub network: Network,
    pub message_start: [u8; 4],
    pub default_port: u16,
    pub rpc_port: u16,
    pub pubkey_address_prefix: u8,
    pub script_address_prefix: u8,
    pub secret_key_prefix: u8,
    pub ext_public_key_prefix: [u8; 4],
    pub ext_secret_key_prefix: [u8; 4],
    pub dns_seeds: Vec<(String, String)>,
    pub data_dir: String,

    /// Header shape used by every block of this chain
    pub header_variant: HeaderVariant,
    /// Bits of the commitment that are kept (embedded in the version for nonce headers)
    pub pok_mask: u32,

    pub pow_limit: U256,
    pub max_block_size: usize,
    pub max_block_sigops: usize,
    pub target_timespan: u32,
    pub target_spacing: u32,
    pub no_retargeting: bool,

    /// Last height paying MAX_SUBSIDY
    pub last_max_subsidy_block: Natural,
    /// Last height paying any subsidy; the reward decreases linearly up to it
    pub last_decreasing_subsidy_block: Natural,
    pub coinbase_maturity: Natural,

    genesis: Block,
    genesis_hash: Hash,
}

impl ChainParams {
    pub fn main() -> Self {
        let mut params = ChainParams {
            network: Network::Main,
            message_start: [0x9e, 0xee, 0x83, 0x2b],
            default_port: 10333,
            rpc_port: 10332,
            pubkey_address_prefix: 80,
            script_address_prefix: 5,
            secret_key_prefix: 208,
            ext_public_key_prefix: [0x04, 0x88, 0xb2, 0x1e],
            ext_secret_key_prefix: [0x04, 0x88, 0xad, 0xe4],
            dns_seeds: vec![("ziftrcoin.com".to_string(), "seed.ziftrcoin.com".to_string())],
            data_dir: String::new(),
            header_variant: HeaderVariant::Nonce,
            pok_mask: POK_DATA_MASK,
            pow_limit: U256::max_value().shr(25),
            max_block_size: MAX_BLOCK_SIZE,
            max_block_sigops: MAX_BLOCK_SIGOPS,
            target_timespan: 14 * 24 * 60 * 60,
            target_spacing: 10 * 60,
            no_retargeting: false,
            last_max_subsidy_block: 500_000,
            last_decreasing_subsidy_block: 1_410_000,
            coinbase_maturity: COINBASE_MATURITY,
            genesis: Block::new(empty_header(HeaderVariant::Nonce), Vec::new()),
            genesis_hash: [0u8; 32],
        };
        params.rebuild_genesis(1_425_097_800, 12_963_623);
        params
    }

    pub fn testnet() -> Self {
        let mut params = ChainParams::main();
        params.network = Network::Test;
        params.message_start = [0x8b, 0x11, 0x09, 0x06];
        params.default_port = 11333;
        params.rpc_port = 11332;
        params.pubkey_address_prefix = 111;
        params.script_address_prefix = 196;
        params.secret_key_prefix = 239;
        params.ext_public_key_prefix = [0x04, 0x35, 0x87, 0xcf];
        params.ext_secret_key_prefix = [0x04, 0x35, 0x83, 0x94];
        params.dns_seeds = vec![("ziftrcoin.com".to_string(), "testnet-seed1.ziftrcoin.com".to_string())];
        params.data_dir = "testnet".to_string();
        params.rebuild_genesis(1_425_097_801, 27_099_750);
        params
    }

    pub fn regtest() -> Self {
        let mut params = ChainParams::testnet();
        params.network = Network::Regtest;
        params.message_start = [0xda, 0xfb, 0xb5, 0xad];
        params.default_port = 12333;
        params.data_dir = "regtest".to_string();
        params.pow_limit = U256::max_value().shr(1);
        params.no_retargeting = true;
        params.last_max_subsidy_block = 150;
        params.last_decreasing_subsidy_block = 300;
        params.dns_seeds.clear();
        params.rebuild_genesis(1_425_097_802, 2);
        params
    }

    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Main => ChainParams::main(),
            Network::Test => ChainParams::testnet(),
            Network::Regtest => ChainParams::regtest(),
        }
    }

    /// Same network with signature-sealed headers and a full-width commitment
    pub fn with_signature_headers(mut self) -> Self {
        self.header_variant = HeaderVariant::Signature;
        self.pok_mask = u32::MAX;
        let (time, nonce) = (self.genesis.header.timestamp, 0);
        self.rebuild_genesis(time, nonce);
        self
    }

    pub fn genesis(&self) -> &Block {
        &self.genesis
    }

    pub fn genesis_hash(&self) -> Hash {
        self.genesis_hash
    }

    /// Blocks between difficulty adjustments
    pub fn difficulty_adjustment_interval(&self) -> u64 {
        (self.target_timespan / self.target_spacing) as u64
    }

    fn rebuild_genesis(&mut self, timestamp: u32, nonce: u32) {
        let mut script_sig = Vec::new();
        push_int(&mut script_sig, 0);
        push_data(&mut script_sig, GENESIS_MESSAGE);

        let outputs = GENESIS_PAYOUTS
            .iter()
            .map(|(years, script_hash)| {
                let mut script_pubkey = Vec::with_capacity(28);
                if *years > 0 {
                    push_script_num(&mut script_pubkey, years * MINUTES_PER_YEAR);
                    script_pubkey.push(OP_CHECKLOCKTIMEVERIFY);
                }
                script_pubkey.push(OP_HASH160);
                push_data(&mut script_pubkey, script_hash);
                script_pubkey.push(OP_EQUAL);
                TransactionOutput { value: GENESIS_OUTPUT_VALUE, script_pubkey }
            })
            .collect();

        let coinbase = Transaction {
            version: TX_VERSION,
            inputs: vec![TransactionInput { prevout: OutPoint::null(), script_sig, sequence: SEQUENCE_FINAL }],
            outputs,
            lock_time: 0,
        };

        let transactions = vec![coinbase];
        let mut header = empty_header(self.header_variant);
        header.version = 1;
        header.merkle_root = calculate_merkle_root(&transactions);
        header.timestamp = timestamp;
        header.bits = self.pow_limit.to_compact();
        if let HeaderSeal::Nonce(_) = header.seal {
            header.seal = HeaderSeal::Nonce(nonce);
            set_pok_flag(&mut header, true);
            let pok = derive_pok(&header, &transactions, self.pok_mask, None).unwrap_or_default();
            embed_pok(&mut header, pok, self.pok_mask);
        }

        self.genesis_hash = block_hash(&header);
        self.genesis = Block::new(header, transactions);
    }
}

fn empty_header(variant: HeaderVariant) -> BlockHeader {
    BlockHeader {
        version: BLOCK_VERSION,
        prev_block_hash: [0u8; 32],
        merkle_root: [0u8; 32],
        timestamp: 0,
        bits: 0,
        seal: HeaderSeal::empty(variant),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mining::display_hash;
    use crate::pok::{embedded_pok, is_pok_block};
    use crate::pow::check_proof_of_work;
    use crate::serialize::serialize_transaction;

    #[test]
    fn test_networks_are_distinct() {
        let main = ChainParams::main();
        let test = ChainParams::testnet();
        let regtest = ChainParams::regtest();
        assert_ne!(main.message_start, test.message_start);
        assert_ne!(test.message_start, regtest.message_start);
        assert_eq!(main.default_port, 10333);
        assert_eq!(test.default_port, 11333);
        assert_eq!(regtest.default_port, 12333);
        assert_eq!(main.pubkey_address_prefix, 80);
        assert_eq!(test.pubkey_address_prefix, 111);
        assert!(regtest.dns_seeds.is_empty());
    }

    #[test]
    fn test_pow_limits() {
        assert_eq!(ChainParams::main().pow_limit.to_compact(), 0x1d7fffff);
        assert_eq!(ChainParams::regtest().pow_limit.to_compact(), 0x207fffff);
        assert!(ChainParams::regtest().no_retargeting);
    }

    #[test]
    fn test_genesis_is_consistent() {
        let params = ChainParams::regtest();
        let genesis = params.genesis();
        assert_eq!(genesis.transactions().len(), 1);
        assert_eq!(genesis.header.merkle_root, calculate_merkle_root(genesis.transactions()));
        assert_eq!(params.genesis_hash(), block_hash(&genesis.header));
        assert!(is_pok_block(&genesis.header));
        let derived = derive_pok(&genesis.header, genesis.transactions(), params.pok_mask, None).unwrap();
        assert_eq!(embedded_pok(&genesis.header, params.pok_mask), derived);
    }

    #[test]
    fn test_genesis_premine_known_answer() {
        for params in [ChainParams::main(), ChainParams::testnet(), ChainParams::regtest()] {
            let genesis = params.genesis();
            let coinbase = &genesis.transactions()[0];
            assert_eq!(serialize_transaction(coinbase).len(), 3100);
            assert_eq!(coinbase.inputs[0].script_sig.len(), 69);
            assert_eq!(coinbase.outputs.len(), GENESIS_OUTPUT_COUNT);
            assert!(coinbase.outputs.iter().all(|o| o.value == GENESIS_OUTPUT_VALUE));
            assert_eq!(
                display_hash(&genesis.header.merkle_root),
                "942ff871843e5a6bfe0c5ba40ef15e0d1fca258493acac1ef512ab368ec71371"
            );
            assert_eq!(genesis.header.prev_block_hash, [0u8; 32]);
            assert_eq!(genesis.header.bits, params.pow_limit.to_compact());
        }

        let main_params = ChainParams::main();
        let coinbase = &main_params.genesis().transactions()[0];
        assert_eq!(coinbase.outputs[0].script_pubkey, {
            let mut script = vec![OP_HASH160, 20];
            script.extend_from_slice(&hash160("da3fea3a64eea0574ed66529a7a6ff6c7874a7a3"));
            script.push(OP_EQUAL);
            script
        });
        // one year: <525600> OP_CHECKLOCKTIMEVERIFY OP_HASH160 <hash> OP_EQUAL
        assert_eq!(&coinbase.outputs[70].script_pubkey[..6], &[0x03, 0x20, 0x05, 0x08, OP_CHECKLOCKTIMEVERIFY, OP_HASH160]);
    }

    #[test]
    fn test_genesis_headers_per_network() {
        let main = ChainParams::main();
        assert_eq!(main.genesis().header.timestamp, 1_425_097_800);
        assert_eq!(main.genesis().header.seal, HeaderSeal::Nonce(12_963_623));
        let test = ChainParams::testnet();
        assert_eq!(test.genesis().header.timestamp, 1_425_097_801);
        assert_eq!(test.genesis().header.seal, HeaderSeal::Nonce(27_099_750));

        let regtest = ChainParams::regtest();
        let header = &regtest.genesis().header;
        assert_eq!(header.timestamp, 1_425_097_802);
        assert_eq!(header.seal, HeaderSeal::Nonce(2));
        assert_eq!(header.version, 0x758f_0101);
        assert_eq!(
            display_hash(&regtest.genesis_hash()),
            "775b558fdc3260a7599fe32c438a51ea27611e92d246091f9d48ac9314eb1663"
        );
        assert!(check_proof_of_work(header, embedded_pok(header, regtest.pok_mask), &regtest).is_ok());
    }

    #[test]
    fn test_genesis_differs_per_network() {
        assert_ne!(ChainParams::main().genesis_hash(), ChainParams::testnet().genesis_hash());
        assert_ne!(ChainParams::testnet().genesis_hash(), ChainParams::regtest().genesis_hash());
    }

    #[test]
    fn test_signature_variant() {
        let params = ChainParams::regtest().with_signature_headers();
        assert_eq!(params.header_variant, HeaderVariant::Signature);
        assert_eq!(params.pok_mask, u32::MAX);
        assert_eq!(params.genesis().header.variant(), HeaderVariant::Signature);
    }

    #[test]
    fn test_for_network() {
        assert_eq!(ChainParams::for_network(Network::Regtest).network, Network::Regtest);
        assert_eq!(ChainParams::main().difficulty_adjustment_interval(), 2016);
    }
}
