//! Block identity: header hashes, proof-of-work hashes, and header signatures

use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, SecretKey};

use crate::types::*;
use crate::error::{Result, ConsensusError};
use crate::hash::{chained_hash, chained_hash2, hash256};
use crate::serialize::{serialize_header, serialize_header_with_version};
use crate::script::pay_to_pubkey_key;

/// HeaderHash: ℋ × 𝔹 → ℍ
///
/// Nonce headers hash all 80 bytes through the chained hash. Signature
/// headers use double SHA-256 so the pre-signature hash (the signing message)
/// can be taken with `include_signature = false`.
pub fn header_hash(header: &BlockHeader, include_signature: bool) -> Hash {
    match header.seal {
        HeaderSeal::Nonce(_) => chained_hash(&serialize_header(header)).trim256(),
        HeaderSeal::Signature { .. } => {
            hash256(&serialize_header_with_version(header, header.version, include_signature))
        }
    }
}

/// Identity of a block as referenced by its successor
pub fn block_hash(header: &BlockHeader) -> Hash {
    header_hash(header, true)
}

/// Value compared against the target.
///
/// Nonce headers: the chained header hash (the commitment sits in the
/// version bits). Signature headers: the chained hash of the signed header
/// followed by the commitment, little-endian.
pub fn pow_hash(header: &BlockHeader, pok: u32) -> Hash {
    match header.seal {
        HeaderSeal::Nonce(_) => header_hash(header, true),
        HeaderSeal::Signature { .. } => {
            chained_hash2(&serialize_header(header), &pok.to_le_bytes()).trim256()
        }
    }
}

/// Message signed by the block producer
pub fn signing_message(header: &BlockHeader) -> Result<Message> {
    Message::from_digest_slice(&header_hash(header, false))
        .map_err(|e| ConsensusError::InvalidSignature(e.to_string()))
}

/// Sign a signature-variant header in place.
///
/// `extra_entropy` varies the signature for a fixed header, which is how the
/// signature-variant search produces new candidates.
pub fn sign_header(header: &mut BlockHeader, secret_key: &SecretKey, extra_entropy: Option<&[u8; 32]>) -> Result<()> {
    if header.variant() != HeaderVariant::Signature {
        return Err(ConsensusError::InvalidSignature("nonce headers are not signed".to_string()));
    }
    let secp = Secp256k1::signing_only();
    let message = signing_message(header)?;
    let signature = match extra_entropy {
        Some(entropy) => secp.sign_ecdsa_with_noncedata(&message, secret_key, entropy),
        None => secp.sign_ecdsa(&message, secret_key),
    };
    let compact = signature.serialize_compact();
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&compact[..32]);
    s.copy_from_slice(&compact[32..]);
    header.seal = HeaderSeal::Signature { r, s };
    Ok(())
}

/// Check a header's R‖S signature against `pubkey`
pub fn verify_header_signature(header: &BlockHeader, pubkey: &PublicKey) -> bool {
    let (r, s) = match header.seal {
        HeaderSeal::Signature { r, s } => (r, s),
        HeaderSeal::Nonce(_) => return false,
    };
    let mut compact = [0u8; 64];
    compact[..32].copy_from_slice(&r);
    compact[32..].copy_from_slice(&s);
    let signature = match Signature::from_compact(&compact) {
        Ok(sig) => sig,
        Err(_) => return false,
    };
    let message = match signing_message(header) {
        Ok(msg) => msg,
        Err(_) => return false,
    };
    Secp256k1::verification_only()
        .verify_ecdsa(&message, &signature, pubkey)
        .is_ok()
}

/// Key a signature-variant block must be signed with: the pay-to-pubkey key
/// of the coinbase's first output.
pub fn header_signing_key(coinbase: &Transaction) -> Option<PublicKey> {
    let output = coinbase.outputs.first()?;
    let key = pay_to_pubkey_key(&output.script_pubkey)?;
    PublicKey::from_slice(key).ok()
}
