//! Proof of work: compact targets, header work checks, and retargeting

use crate::types::*;
use crate::constants::*;
use crate::error::PowError;
use crate::identity::pow_hash;
use crate::params::ChainParams;

/// 256-bit unsigned integer for target arithmetic, little-endian 64-bit limbs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct U256([u64; 4]);

impl U256 {
    pub const fn zero() -> Self {
        U256([0; 4])
    }

    pub const fn max_value() -> Self {
        U256([u64::MAX; 4])
    }

    pub fn from_u64(value: u64) -> Self {
        U256([value, 0, 0, 0])
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&x| x == 0)
    }

    pub fn low_u64(&self) -> u64 {
        self.0[0]
    }

    /// Number of significant bits
    pub fn bits(&self) -> u32 {
        for i in (0..4).rev() {
            if self.0[i] != 0 {
                return 64 * i as u32 + (64 - self.0[i].leading_zeros());
            }
        }
        0
    }

    pub fn shl(&self, shift: u32) -> Self {
        if shift >= 256 {
            return U256::zero();
        }
        let mut result = U256::zero();
        let word_shift = (shift / 64) as usize;
        let bit_shift = shift % 64;
        for i in 0..4 - word_shift {
            result.0[i + word_shift] |= self.0[i] << bit_shift;
            if bit_shift > 0 && i + word_shift + 1 < 4 {
                result.0[i + word_shift + 1] |= self.0[i] >> (64 - bit_shift);
            }
        }
        result
    }

    pub fn shr(&self, shift: u32) -> Self {
        if shift >= 256 {
            return U256::zero();
        }
        let mut result = U256::zero();
        let word_shift = (shift / 64) as usize;
        let bit_shift = shift % 64;
        for i in word_shift..4 {
            result.0[i - word_shift] |= self.0[i] >> bit_shift;
            if bit_shift > 0 && i > word_shift {
                result.0[i - word_shift - 1] |= self.0[i] << (64 - bit_shift);
            }
        }
        result
    }

    /// Multiply by a 64-bit factor; `None` on overflow
    pub fn checked_mul_u64(&self, factor: u64) -> Option<Self> {
        let mut result = U256::zero();
        let mut carry: u128 = 0;
        for i in 0..4 {
            let product = self.0[i] as u128 * factor as u128 + carry;
            result.0[i] = product as u64;
            carry = product >> 64;
        }
        if carry != 0 {
            None
        } else {
            Some(result)
        }
    }

    /// Divide by a non-zero 64-bit divisor
    pub fn div_u64(&self, divisor: u64) -> Self {
        let mut result = U256::zero();
        let mut remainder: u128 = 0;
        for i in (0..4).rev() {
            let current = (remainder << 64) | self.0[i] as u128;
            result.0[i] = (current / divisor as u128) as u64;
            remainder = current % divisor as u128;
        }
        result
    }

    pub fn to_le_bytes(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        for (i, word) in self.0.iter().enumerate() {
            bytes[i * 8..(i + 1) * 8].copy_from_slice(&word.to_le_bytes());
        }
        bytes
    }

    /// Interpret a 256-bit hash as a little-endian integer
    pub fn from_le_bytes(bytes: &[u8; 32]) -> Self {
        let mut words = [0u64; 4];
        for (i, word) in words.iter_mut().enumerate() {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[i * 8..(i + 1) * 8]);
            *word = u64::from_le_bytes(buf);
        }
        U256(words)
    }

    /// SetCompact: decode a compact target.
    ///
    /// Returns (value, negative, overflow) where `negative` reflects the sign
    /// bit of a non-zero mantissa.
    pub fn from_compact(bits: u32) -> (Self, bool, bool) {
        let size = bits >> 24;
        let mut word = bits & 0x007f_ffff;
        let value = if size <= 3 {
            word >>= 8 * (3 - size);
            U256::from_u64(word as u64)
        } else {
            U256::from_u64(word as u64).shl(8 * (size - 3))
        };
        let negative = word != 0 && (bits & 0x0080_0000) != 0;
        let overflow = word != 0
            && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32));
        (value, negative, overflow)
    }

    /// GetCompact: encode as a compact target
    pub fn to_compact(&self) -> u32 {
        let mut size = (self.bits() + 7) / 8;
        let mut compact = if size <= 3 {
            (self.low_u64() << (8 * (3 - size))) as u32
        } else {
            self.shr(8 * (size - 3)).low_u64() as u32
        };
        if compact & 0x0080_0000 != 0 {
            compact >>= 8;
            size += 1;
        }
        compact | (size << 24)
    }
}

impl PartialOrd for U256 {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for U256 {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        for (a, b) in self.0.iter().rev().zip(other.0.iter().rev()) {
            match a.cmp(b) {
                std::cmp::Ordering::Equal => continue,
                other => return other,
            }
        }
        std::cmp::Ordering::Equal
    }
}

/// Decode `bits` into a usable target, or `None` if it is not in (0, limit].
pub fn target_from_bits(bits: u32, pow_limit: &U256) -> Option<U256> {
    let (target, negative, overflow) = U256::from_compact(bits);
    if negative || overflow || target.is_zero() || target > *pow_limit {
        return None;
    }
    Some(target)
}

/// Test a proof-of-work hash against a compact target
pub fn hash_meets_target(hash: &Hash, bits: u32, pow_limit: &U256) -> std::result::Result<(), PowError> {
    let target = target_from_bits(bits, pow_limit).ok_or(PowError::BelowMinimumWork)?;
    if U256::from_le_bytes(hash) > target {
        return Err(PowError::ExceedsTarget);
    }
    Ok(())
}

/// CheckProofOfWork: ℋ × 𝔹³² → {ok, BelowMinimumWork, ExceedsTarget}
///
/// For header h with proof-of-knowledge value pok:
/// 1. Let T = SetCompact(h.bits)
/// 2. If T ≤ 0 ∨ T > powLimit: return BelowMinimumWork
/// 3. If PowHash(h, pok) > T: return ExceedsTarget
/// 4. Return ok
///
/// `pok` only enters the hash for signature headers; nonce headers carry it
/// in their version field.
pub fn check_proof_of_work(
    header: &BlockHeader,
    pok: u32,
    params: &ChainParams,
) -> std::result::Result<(), PowError> {
    let target = target_from_bits(header.bits, &params.pow_limit).ok_or(PowError::BelowMinimumWork)?;
    if U256::from_le_bytes(&pow_hash(header, pok)) > target {
        return Err(PowError::ExceedsTarget);
    }
    Ok(())
}

/// GetNextWorkRequired: ℋ* → ℕ
///
/// For the active chain headers (genesis first) extended by one block:
/// 1. If there is no tip: return powLimit
/// 2. If the new height is not a multiple of the interval: return tip.bits
/// 3. Let actual = tip.time − first.time over the last interval, clamped to
///    [timespan/4, timespan×4]
/// 4. Return min(SetCompact(tip.bits) × actual / timespan, powLimit)
pub fn get_next_work_required(chain: &[BlockHeader], params: &ChainParams) -> u32 {
    let limit_bits = params.pow_limit.to_compact();
    let tip = match chain.last() {
        Some(tip) => tip,
        None => return limit_bits,
    };

    let next_height = chain.len() as u64;
    let interval = params.difficulty_adjustment_interval();
    if params.no_retargeting || next_height % interval != 0 {
        return tip.bits;
    }

    let first = &chain[chain.len().saturating_sub(interval as usize)];
    let timespan = params.target_timespan as i64;
    let actual = (tip.timestamp as i64 - first.timestamp as i64).clamp(timespan / 4, timespan * 4);

    let (current, _, _) = U256::from_compact(tip.bits);
    let adjusted = current
        .checked_mul_u64(actual as u64)
        .map(|v| v.div_u64(timespan as u64))
        .unwrap_or_else(U256::max_value);
    if adjusted > params.pow_limit {
        limit_bits
    } else {
        adjusted.to_compact()
    }
}

/// Median of the last (up to) eleven block timestamps
pub fn median_time_past(chain: &[BlockHeader]) -> u32 {
    let start = chain.len().saturating_sub(MEDIAN_TIME_SPAN);
    let mut times: Vec<u32> = chain[start..].iter().map(|h| h.timestamp).collect();
    if times.is_empty() {
        return 0;
    }
    times.sort_unstable();
    times[times.len() / 2]
}

/// UpdateTime: timestamp = max(MTP + 1, now)
pub fn update_time(header: &mut BlockHeader, chain: &[BlockHeader], now: u32) {
    header.timestamp = now.max(median_time_past(chain).saturating_add(1));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_with(bits: u32, timestamp: u32) -> BlockHeader {
        BlockHeader {
            version: 2,
            prev_block_hash: [0; 32],
            merkle_root: [0; 32],
            timestamp,
            bits,
            seal: HeaderSeal::Nonce(0),
        }
    }

    #[test]
    fn test_compact_roundtrip_known_targets() {
        for bits in [0x1d00ffffu32, 0x1b0404cb, 0x207fffff, 0x1d7fffff, 0x03123456] {
            let (value, negative, overflow) = U256::from_compact(bits);
            assert!(!negative && !overflow);
            assert_eq!(value.to_compact(), bits);
        }
    }

    #[test]
    fn test_compact_negative_and_overflow() {
        let (_, negative, _) = U256::from_compact(0x04923456);
        assert!(negative);
        let (_, _, overflow) = U256::from_compact(0xff123456);
        assert!(overflow);
        let (zero, negative, overflow) = U256::from_compact(0x01003456);
        assert!(zero.is_zero() && !negative && !overflow);
    }

    #[test]
    fn test_pow_limits_encode() {
        assert_eq!(U256::max_value().shr(25).to_compact(), 0x1d7fffff);
        assert_eq!(U256::max_value().shr(1).to_compact(), 0x207fffff);
    }

    #[test]
    fn test_target_outside_range() {
        let limit = U256::max_value().shr(25);
        assert!(target_from_bits(0x1d7fffff, &limit).is_some());
        assert!(target_from_bits(0x1e00ffff, &limit).is_none());
        assert!(target_from_bits(0, &limit).is_none());
        assert!(target_from_bits(0x04923456, &limit).is_none());
    }

    #[test]
    fn test_hash_meets_target() {
        let limit = U256::max_value().shr(1);
        let mut hash = [0u8; 32];
        assert_eq!(hash_meets_target(&hash, 0x207fffff, &limit), Ok(()));
        hash[31] = 0x80;
        assert_eq!(hash_meets_target(&hash, 0x207fffff, &limit), Err(PowError::ExceedsTarget));
        assert_eq!(hash_meets_target(&hash, 0x2100ffff, &limit), Err(PowError::BelowMinimumWork));
    }

    #[test]
    fn test_check_proof_of_work_rejects_easy_bits() {
        let params = ChainParams::main();
        let header = header_with(0x207fffff, 1_425_097_800);
        assert_eq!(check_proof_of_work(&header, 0, &params), Err(PowError::BelowMinimumWork));
    }

    #[test]
    fn test_u256_shifts() {
        let value = U256::from_u64(0x1234_5678_9abc_def0);
        assert_eq!(value.shl(0), value);
        assert_eq!(value.shl(64).shr(64), value);
        assert_eq!(value.shl(100).shr(100), value);
        assert_eq!(value.shr(4).low_u64(), 0x0123_4567_89ab_cdef);
        assert!(value.shl(300).is_zero());
        assert!(value.shr(300).is_zero());
    }

    #[test]
    fn test_u256_mul_div() {
        let value = U256::from_u64(u64::MAX);
        let doubled = value.checked_mul_u64(2).unwrap();
        assert_eq!(doubled.bits(), 65);
        assert_eq!(doubled.div_u64(2), value);
        assert!(U256::max_value().checked_mul_u64(2).is_none());
    }

    #[test]
    fn test_u256_ordering_and_bytes() {
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        let high = U256::from_le_bytes(&bytes);
        assert!(high > U256::from_u64(u64::MAX));
        assert_eq!(high.to_le_bytes(), bytes);
    }

    #[test]
    fn test_next_work_off_interval_keeps_bits() {
        let params = ChainParams::main();
        let chain = vec![header_with(0x1d00ffff, 1000), header_with(0x1c0fffff, 2000)];
        assert_eq!(get_next_work_required(&chain, &params), 0x1c0fffff);
        assert_eq!(get_next_work_required(&[], &params), params.pow_limit.to_compact());
    }

    #[test]
    fn test_next_work_clamps_fast_blocks() {
        let params = ChainParams::main();
        let interval = params.difficulty_adjustment_interval() as usize;
        let chain: Vec<BlockHeader> = (0..interval)
            .map(|i| header_with(0x1c0fffff, 1_000_000 + i as u32))
            .collect();
        let next = get_next_work_required(&chain, &params);
        let (old, _, _) = U256::from_compact(0x1c0fffff);
        // at most a 4x difficulty increase
        assert_eq!(next, old.div_u64(4).to_compact());
    }

    #[test]
    fn test_next_work_slow_blocks_capped_at_limit() {
        let params = ChainParams::main();
        let interval = params.difficulty_adjustment_interval() as usize;
        let bits = params.pow_limit.to_compact();
        let chain: Vec<BlockHeader> = (0..interval)
            .map(|i| header_with(bits, 1_000_000 + (i as u32) * 10_000))
            .collect();
        assert_eq!(get_next_work_required(&chain, &params), bits);
    }

    #[test]
    fn test_regtest_never_retargets() {
        let params = ChainParams::regtest();
        let interval = params.difficulty_adjustment_interval() as usize;
        let chain: Vec<BlockHeader> = (0..interval).map(|i| header_with(0x207fffff, i as u32)).collect();
        assert_eq!(get_next_work_required(&chain, &params), 0x207fffff);
    }

    #[test]
    fn test_median_time_past_and_update_time() {
        let chain: Vec<BlockHeader> = [5u32, 1, 9, 3, 7].iter().map(|&t| header_with(0x207fffff, t)).collect();
        assert_eq!(median_time_past(&chain), 5);
        let mut header = header_with(0x207fffff, 0);
        update_time(&mut header, &chain, 2);
        assert_eq!(header.timestamp, 6);
        update_time(&mut header, &chain, 100);
        assert_eq!(header.timestamp, 100);
    }
}
