//! Output amount compression and the MSB base-128 VARINT used to store it
//!
//! Amounts are dominated by trailing decimal zeros. An amount n = d·10^e
//! (d without trailing zeros, e ≤ 9) is mapped to a small integer:
//! - 0 → 0
//! - e < 9, last digit d∈[1,9], rest n': 1 + 10·(9·n' + d − 1) + e
//! - e = 9, rest n': 1 + 10·(n' − 1) + 9

use crate::serialize::Reader;
use crate::error::{Result, ConsensusError};

/// CompressAmount: ℕ → ℕ
pub fn compress_amount(mut n: u64) -> u64 {
    if n == 0 {
        return 0;
    }
    let mut e = 0u64;
    while n % 10 == 0 && e < 9 {
        n /= 10;
        e += 1;
    }
    if e < 9 {
        let d = n % 10;
        debug_assert!((1..=9).contains(&d));
        n /= 10;
        1 + (n * 9 + d - 1) * 10 + e
    } else {
        1 + (n - 1) * 10 + 9
    }
}

/// DecompressAmount: ℕ → ℕ, the inverse of [`compress_amount`]
pub fn decompress_amount(mut x: u64) -> u64 {
    if x == 0 {
        return 0;
    }
    x -= 1;
    let mut e = x % 10;
    x /= 10;
    let mut n = if e < 9 {
        let d = (x % 9) + 1;
        x /= 9;
        x.wrapping_mul(10).wrapping_add(d)
    } else {
        x.wrapping_add(1)
    };
    while e > 0 {
        n = n.wrapping_mul(10);
        e -= 1;
    }
    n
}

/// Append n as an MSB base-128 VARINT.
///
/// Each continuation step subtracts one so every value has exactly one
/// encoding.
pub fn write_varint(out: &mut Vec<u8>, mut n: u64) {
    let mut tmp = [0u8; 10];
    let mut len = 0usize;
    loop {
        tmp[len] = (n & 0x7f) as u8 | if len > 0 { 0x80 } else { 0x00 };
        if n <= 0x7f {
            break;
        }
        n = (n >> 7) - 1;
        len += 1;
    }
    out.extend(tmp[..=len].iter().rev());
}

pub fn read_varint(reader: &mut Reader<'_>) -> Result<u64> {
    let mut n: u64 = 0;
    loop {
        let byte = reader.read_u8()?;
        if n > (u64::MAX >> 7) {
            return Err(ConsensusError::Serialization("varint overflow".to_string()));
        }
        n = (n << 7) | (byte & 0x7f) as u64;
        if byte & 0x80 != 0 {
            n = n.checked_add(1)
                .ok_or_else(|| ConsensusError::Serialization("varint overflow".to_string()))?;
        } else {
            return Ok(n);
        }
    }
}

/// Compressed amount as stored alongside unspent outputs
pub fn write_compressed_amount(out: &mut Vec<u8>, amount: u64) {
    write_varint(out, compress_amount(amount));
}

pub fn read_compressed_amount(reader: &mut Reader<'_>) -> Result<u64> {
    Ok(decompress_amount(read_varint(reader)?))
}
