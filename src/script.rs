//! Script handling needed by validation and assembly
//!
//! Scripts are opaque to consensus here except for what block rules need:
//! opcode iteration, signature-operation counting (including the redeem
//! scripts of pay-to-script-hash spends), a few standard templates, and the
//! `ScriptVerifier` seam behind which signature checking lives.

use crate::types::*;
use crate::constants::MAX_SCRIPT_ELEMENT_SIZE;
use crate::hash::hash160;

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1NEGATE: u8 = 0x4f;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;
pub const OP_NOP: u8 = 0x61;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKSIGVERIFY: u8 = 0xad;
pub const OP_CHECKMULTISIG: u8 = 0xae;
pub const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;
pub const OP_CHECKLOCKTIMEVERIFY: u8 = 0xbb;

/// Sigops charged for a bare CHECKMULTISIG when the key count is unknown
pub const MAX_PUBKEYS_PER_MULTISIG: usize = 20;

/// One parsed script element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptOp<'a> {
    pub opcode: u8,
    pub data: Option<&'a [u8]>,
}

/// Iterator over script operations; yields `Err(())` once on a truncated push.
pub struct ScriptOps<'a> {
    script: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> ScriptOps<'a> {
    pub fn new(script: &'a [u8]) -> Self {
        ScriptOps { script, pos: 0, failed: false }
    }

    fn read_len(&mut self, width: usize) -> Option<usize> {
        let bytes = self.script.get(self.pos..self.pos + width)?;
        self.pos += width;
        let mut buf = [0u8; 4];
        buf[..width].copy_from_slice(bytes);
        Some(u32::from_le_bytes(buf) as usize)
    }
}

impl<'a> Iterator for ScriptOps<'a> {
    type Item = std::result::Result<ScriptOp<'a>, ()>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.script.len() {
            return None;
        }
        let opcode = self.script[self.pos];
        self.pos += 1;

        let len = match opcode {
            0x01..=0x4b => Some(opcode as usize),
            OP_PUSHDATA1 => self.read_len(1),
            OP_PUSHDATA2 => self.read_len(2),
            OP_PUSHDATA4 => self.read_len(4),
            _ => return Some(Ok(ScriptOp { opcode, data: None })),
        };

        let script = self.script;
        let start = self.pos;
        match len.and_then(|n| script.get(start..start.checked_add(n)?)) {
            Some(data) => {
                self.pos += data.len();
                Some(Ok(ScriptOp { opcode, data: Some(data) }))
            }
            None => {
                self.failed = true;
                Some(Err(()))
            }
        }
    }
}

fn decode_small_int(opcode: u8) -> Option<usize> {
    match opcode {
        OP_0 => Some(0),
        OP_1..=OP_16 => Some((opcode - OP_1 + 1) as usize),
        _ => None,
    }
}

/// GetSigOpCount: 𝕊 × 𝔹 → ℕ
///
/// CHECKSIG counts 1. CHECKMULTISIG counts 20, or the preceding OP_N key
/// count when `accurate` is set. Counting stops at a malformed push.
pub fn count_sigops(script: &[u8], accurate: bool) -> usize {
    let mut count = 0;
    let mut last_opcode: Option<u8> = None;
    for op in ScriptOps::new(script) {
        let op = match op {
            Ok(op) => op,
            Err(()) => break,
        };
        match op.opcode {
            OP_CHECKSIG | OP_CHECKSIGVERIFY => count += 1,
            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                count += match last_opcode.and_then(decode_small_int) {
                    Some(n) if accurate && n >= 1 => n,
                    _ => MAX_PUBKEYS_PER_MULTISIG,
                };
            }
            _ => {}
        }
        last_opcode = Some(op.opcode);
    }
    count
}

/// True for scripts made only of push operations
pub fn is_push_only(script: &[u8]) -> bool {
    ScriptOps::new(script).all(|op| matches!(op, Ok(op) if op.opcode <= OP_16))
}

/// OP_HASH160 <20 bytes> OP_EQUAL
pub fn is_pay_to_script_hash(script: &[u8]) -> bool {
    script.len() == 23 && script[0] == OP_HASH160 && script[1] == 0x14 && script[22] == OP_EQUAL
}

/// Last data push of a push-only scriptSig: the serialized redeem script
pub fn redeem_script(script_sig: &[u8]) -> Option<&[u8]> {
    let mut last = None;
    for op in ScriptOps::new(script_sig) {
        let op = op.ok()?;
        if op.opcode > OP_16 {
            return None;
        }
        last = Some(op.data.unwrap_or(&[]));
    }
    last
}

/// Sigops inside the redeem script when `script_pubkey` is pay-to-script-hash
pub fn p2sh_sigop_count(script_pubkey: &[u8], script_sig: &[u8]) -> usize {
    if !is_pay_to_script_hash(script_pubkey) {
        return 0;
    }
    redeem_script(script_sig)
        .map(|redeem| count_sigops(redeem, true))
        .unwrap_or(0)
}

/// Append a data push using the smallest push opcode
pub fn push_data(script: &mut ByteString, data: &[u8]) {
    match data.len() {
        n if n < OP_PUSHDATA1 as usize => script.push(n as u8),
        n if n <= 0xff => {
            script.push(OP_PUSHDATA1);
            script.push(n as u8);
        }
        n if n <= 0xffff => {
            script.push(OP_PUSHDATA2);
            script.extend_from_slice(&(n as u16).to_le_bytes());
        }
        n => {
            script.push(OP_PUSHDATA4);
            script.extend_from_slice(&(n as u32).to_le_bytes());
        }
    }
    script.extend_from_slice(data);
}

/// Minimal little-endian sign-magnitude encoding of a script number
pub fn encode_script_num(value: i64) -> Vec<u8> {
    if value == 0 {
        return Vec::new();
    }
    let negative = value < 0;
    let mut abs = value.unsigned_abs();
    let mut out = Vec::new();
    while abs > 0 {
        out.push((abs & 0xff) as u8);
        abs >>= 8;
    }
    if out.last().map_or(false, |b| b & 0x80 != 0) {
        out.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        if let Some(last) = out.last_mut() {
            *last |= 0x80;
        }
    }
    out
}

/// Push an integer: OP_1NEGATE / OP_1..OP_16 where possible, data otherwise
pub fn push_int(script: &mut ByteString, value: i64) {
    match value {
        -1 => script.push(OP_1NEGATE),
        1..=16 => script.push(OP_1 + (value as u8) - 1),
        _ => push_data(script, &encode_script_num(value)),
    }
}

/// Push an integer always as serialized number bytes
pub fn push_script_num(script: &mut ByteString, value: i64) {
    push_data(script, &encode_script_num(value));
}

/// <pubkey> OP_CHECKSIG
pub fn pay_to_pubkey_script(pubkey: &[u8]) -> ByteString {
    let mut script = Vec::with_capacity(pubkey.len() + 2);
    push_data(&mut script, pubkey);
    script.push(OP_CHECKSIG);
    script
}

/// Key of a compressed pay-to-pubkey script
pub fn pay_to_pubkey_key(script: &[u8]) -> Option<&[u8]> {
    if script.len() == 35 && script[0] == 33 && script[34] == OP_CHECKSIG {
        Some(&script[1..34])
    } else {
        None
    }
}

/// OP_HASH160 <hash160(redeem)> OP_EQUAL
pub fn pay_to_script_hash_script(redeem: &[u8]) -> ByteString {
    let mut script = vec![OP_HASH160];
    push_data(&mut script, &hash160(redeem));
    script.push(OP_EQUAL);
    script
}

/// Input script verification capability.
///
/// Signature semantics live behind this trait; block validation and
/// assembly only decide which (scriptSig, scriptPubKey) pairs to check.
pub trait ScriptVerifier: Send + Sync {
    fn verify_input(
        &self,
        tx: &Transaction,
        input_index: usize,
        script_pubkey: &[u8],
        flags: u32,
    ) -> bool;
}

/// Verification flag enabling pay-to-script-hash evaluation
pub const SCRIPT_VERIFY_P2SH: u32 = 1 << 0;

/// Structural verifier: enforces scriptSig sanity and the P2SH redeem-script
/// commitment, and accepts any other spend.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralVerifier;

impl ScriptVerifier for StructuralVerifier {
    fn verify_input(
        &self,
        tx: &Transaction,
        input_index: usize,
        script_pubkey: &[u8],
        flags: u32,
    ) -> bool {
        let script_sig = match tx.inputs.get(input_index) {
            Some(input) => &input.script_sig,
            None => return false,
        };
        if ScriptOps::new(script_sig).any(|op| op.is_err()) {
            return false;
        }
        if flags & SCRIPT_VERIFY_P2SH != 0 && is_pay_to_script_hash(script_pubkey) {
            return match redeem_script(script_sig) {
                Some(redeem) if redeem.len() <= MAX_SCRIPT_ELEMENT_SIZE => {
                    hash160(redeem)[..] == script_pubkey[2..22]
                }
                _ => false,
            };
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iterate_pushes() {
        let script = [OP_0, 0x02, 0xaa, 0xbb, OP_PUSHDATA1, 0x01, 0xcc, OP_CHECKSIG];
        let ops: Vec<_> = ScriptOps::new(&script).map(|op| op.unwrap()).collect();
        assert_eq!(ops.len(), 4);
        assert_eq!(ops[1].data, Some(&[0xaa, 0xbb][..]));
        assert_eq!(ops[2].data, Some(&[0xcc][..]));
        assert_eq!(ops[3].opcode, OP_CHECKSIG);
    }

    #[test]
    fn test_truncated_push() {
        let script = [0x05, 0x01];
        let ops: Vec<_> = ScriptOps::new(&script).collect();
        assert_eq!(ops, vec![Err(())]);
    }

    #[test]
    fn test_legacy_sigop_count() {
        // OP_0 OP_0 OP_0 OP_NOP OP_CHECKMULTISIG OP_1
        let script = [OP_0, OP_0, OP_0, OP_NOP, OP_CHECKMULTISIG, OP_1];
        assert_eq!(count_sigops(&script, false), 20);
        assert_eq!(count_sigops(&[OP_DUP, OP_HASH160, OP_CHECKSIG], false), 1);
    }

    #[test]
    fn test_accurate_multisig_count() {
        let script = [OP_1, 0x21, OP_1 + 1, OP_CHECKMULTISIG];
        // truncated push ends counting before the CHECKMULTISIG
        assert_eq!(count_sigops(&script, true), 0);
        let script = [OP_1 + 2, OP_CHECKMULTISIG];
        assert_eq!(count_sigops(&script, true), 3);
        assert_eq!(count_sigops(&script, false), 20);
    }

    #[test]
    fn test_p2sh_sigops() {
        let redeem = [OP_1 + 1, OP_CHECKMULTISIG];
        let script_pubkey = pay_to_script_hash_script(&redeem);
        assert!(is_pay_to_script_hash(&script_pubkey));
        let mut script_sig = vec![OP_0];
        push_data(&mut script_sig, &redeem);
        assert_eq!(p2sh_sigop_count(&script_pubkey, &script_sig), 2);
        assert_eq!(p2sh_sigop_count(&[OP_1], &script_sig), 0);
    }

    #[test]
    fn test_push_int_encodings() {
        let mut script = Vec::new();
        push_int(&mut script, 0);
        push_int(&mut script, 5);
        push_int(&mut script, 128);
        push_int(&mut script, -1);
        assert_eq!(script, vec![0x00, 0x55, 0x02, 0x80, 0x00, OP_1NEGATE]);
        assert_eq!(encode_script_num(-255), vec![0xff, 0x80]);
        let mut num = Vec::new();
        push_script_num(&mut num, 1);
        assert_eq!(num, vec![0x01, 0x01]);
    }

    #[test]
    fn test_pay_to_pubkey_roundtrip() {
        let key = [0x02; 33];
        let script = pay_to_pubkey_script(&key);
        assert_eq!(pay_to_pubkey_key(&script), Some(&key[..]));
        assert_eq!(pay_to_pubkey_key(&script[1..]), None);
    }

    #[test]
    fn test_structural_verifier_p2sh_commitment() {
        let redeem = [OP_1];
        let script_pubkey = pay_to_script_hash_script(&redeem);
        let mut good = Vec::new();
        push_data(&mut good, &redeem);
        let tx = |script_sig: Vec<u8>| Transaction {
            version: 1,
            inputs: vec![TransactionInput { prevout: OutPoint { hash: [1; 32], index: 0 }, script_sig, sequence: 0 }],
            outputs: vec![],
            lock_time: 0,
        };
        let verifier = StructuralVerifier;
        assert!(verifier.verify_input(&tx(good), 0, &script_pubkey, SCRIPT_VERIFY_P2SH));
        assert!(!verifier.verify_input(&tx(vec![0x01, OP_1 + 1]), 0, &script_pubkey, SCRIPT_VERIFY_P2SH));
        assert!(!verifier.verify_input(&tx(vec![OP_CHECKSIG]), 0, &script_pubkey, SCRIPT_VERIFY_P2SH));
        assert!(verifier.verify_input(&tx(vec![OP_CHECKSIG]), 0, &script_pubkey, 0));
        assert!(!verifier.verify_input(&tx(vec![0x05]), 0, &[OP_1], 0));
    }
}
