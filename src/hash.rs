//! Hash functions: the chained multi-algorithm block hash and double SHA-256
//!
//! The chained hash runs BLAKE-512, Grøstl-512, JH-512 and Skein-512 exactly
//! once each, in one of the 24 possible orders. The order is picked by the
//! first little-endian word of a Keccak-512 digest of the message, so it is a
//! deterministic function of the input.

use bitcoin_hashes::{sha256d, Hash as BitcoinHash, HashEngine};
use blake_hash::Blake512;
use digest::Digest;
use digest09::Digest as Digest09;
use groestl::Groestl512;
use jh::Jh512;
use ripemd::Ripemd160;
use sha2::Sha256;
use sha3::Keccak512;
use skein::Skein512;

use crate::types::Hash;

/// 512-bit digest produced by the chained hash
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Hash512(pub [u8; 64]);

impl Hash512 {
    /// Little-endian 32-bit word at word offset `i` (0..16)
    pub fn word(&self, i: usize) -> u32 {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.0[i * 4..i * 4 + 4]);
        u32::from_le_bytes(buf)
    }

    /// Low 256 bits, as used for header identity and target comparison
    pub fn trim256(&self) -> Hash {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.0[..32]);
        out
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl std::fmt::Debug for Hash512 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash512(")?;
        for byte in self.0.iter().rev() {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}

/// The four interchangeable stages of the chained hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashPrimitive {
    Blake,
    Groestl,
    Jh,
    Skein,
}

use HashPrimitive::{Blake as B, Groestl as G, Jh as J, Skein as S};

/// All orderings of the four primitives, in lexicographic order
pub const PERMUTATIONS: [[HashPrimitive; 4]; 24] = [
    [B, G, J, S], [B, G, S, J], [B, J, G, S], [B, J, S, G], [B, S, G, J], [B, S, J, G],
    [G, B, J, S], [G, B, S, J], [G, J, B, S], [G, J, S, B], [G, S, B, J], [G, S, J, B],
    [J, B, G, S], [J, B, S, G], [J, G, B, S], [J, G, S, B], [J, S, B, G], [J, S, G, B],
    [S, B, G, J], [S, B, J, G], [S, G, B, J], [S, G, J, B], [S, J, B, G], [S, J, G, B],
];

fn digest_parts<D: Digest>(parts: &[&[u8]]) -> [u8; 64] {
    let mut hasher = D::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 64];
    out.copy_from_slice(&hasher.finalize());
    out
}

fn blake512_parts(parts: &[&[u8]]) -> [u8; 64] {
    let mut hasher = <Blake512 as Digest09>::new();
    for part in parts {
        Digest09::update(&mut hasher, part);
    }
    let mut out = [0u8; 64];
    out.copy_from_slice(&Digest09::finalize(hasher));
    out
}

impl HashPrimitive {
    /// Hash the concatenation of `parts` with this primitive
    pub fn digest_parts(&self, parts: &[&[u8]]) -> [u8; 64] {
        match self {
            HashPrimitive::Blake => blake512_parts(parts),
            HashPrimitive::Groestl => digest_parts::<Groestl512>(parts),
            HashPrimitive::Jh => digest_parts::<Jh512>(parts),
            HashPrimitive::Skein => digest_parts::<Skein512<digest::consts::U64>>(parts),
        }
    }
}

/// Index into [`PERMUTATIONS`] selected for this message
pub fn permutation_index(parts: &[&[u8]]) -> usize {
    let selector = Hash512(digest_parts::<Keccak512>(parts));
    (selector.word(0) % PERMUTATIONS.len() as u32) as usize
}

/// ChainedHash: 𝕊* → 𝔹⁵¹²
///
/// Hashes the concatenation of `parts` without materializing it:
/// 1. order = PERMUTATIONS[LE32(Keccak512(m)) mod 24]
/// 2. h₁ = order[0](m)
/// 3. hᵢ = order[i-1](hᵢ₋₁) for i ∈ {2, 3, 4}
/// 4. Return h₄
pub fn chained_hash_parts(parts: &[&[u8]]) -> Hash512 {
    let order = &PERMUTATIONS[permutation_index(parts)];
    let mut state = order[0].digest_parts(parts);
    for primitive in &order[1..] {
        state = primitive.digest_parts(&[&state[..]]);
    }
    Hash512(state)
}

pub fn chained_hash(data: &[u8]) -> Hash512 {
    chained_hash_parts(&[data])
}

pub fn chained_hash2(a: &[u8], b: &[u8]) -> Hash512 {
    chained_hash_parts(&[a, b])
}

pub fn chained_hash3(a: &[u8], b: &[u8], c: &[u8]) -> Hash512 {
    chained_hash_parts(&[a, b, c])
}

/// Double SHA-256 over the concatenation of `parts`
pub fn hash256_parts(parts: &[&[u8]]) -> Hash {
    let mut engine = sha256d::Hash::engine();
    for part in parts {
        engine.input(part);
    }
    sha256d::Hash::from_engine(engine).into_inner()
}

/// Double SHA-256, the identity hash for transactions and merkle nodes
pub fn hash256(data: &[u8]) -> Hash {
    sha256d::Hash::hash(data).into_inner()
}

pub fn hash256_2(a: &[u8], b: &[u8]) -> Hash {
    hash256_parts(&[a, b])
}

pub fn hash256_3(a: &[u8], b: &[u8], c: &[u8]) -> Hash {
    hash256_parts(&[a, b, c])
}

/// RIPEMD-160 of SHA-256, used for script hashes
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let mut out = [0u8; 20];
    out.copy_from_slice(&Ripemd160::digest(sha));
    out
}
