//! Consensus wire encoding
//!
//! Field order and width here are part of the hash identity of every object:
//! integers are little-endian, lengths use CompactSize, hashes are raw bytes.

use crate::types::*;
use crate::error::{Result, ConsensusError};

/// Size of a nonce-sealed header on the wire
pub const NONCE_HEADER_SIZE: usize = 80;

/// Size of a signature-sealed header on the wire
pub const SIGNATURE_HEADER_SIZE: usize = 140;

/// Size of the unsealed header fields (version..bits)
pub const UNSEALED_HEADER_SIZE: usize = 76;

/// Write a CompactSize length prefix
pub fn write_compact_size(out: &mut Vec<u8>, n: u64) {
    if n < 0xfd {
        out.push(n as u8);
    } else if n <= 0xffff {
        out.push(0xfd);
        out.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n <= 0xffff_ffff {
        out.push(0xfe);
        out.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        out.push(0xff);
        out.extend_from_slice(&n.to_le_bytes());
    }
}

/// Encoded length of a CompactSize value
pub fn compact_size_len(n: u64) -> usize {
    match n {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// Cursor over a byte slice used by the decoders
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(ConsensusError::Serialization(format!(
                "unexpected end of data: wanted {} bytes at offset {}, {} left",
                n, self.pos, self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        buf.copy_from_slice(self.read_bytes(2)?);
        Ok(u16::from_le_bytes(buf))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.read_bytes(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.read_bytes(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_hash(&mut self) -> Result<Hash> {
        let mut hash = [0u8; 32];
        hash.copy_from_slice(self.read_bytes(32)?);
        Ok(hash)
    }

    /// Read a CompactSize, rejecting non-canonical encodings
    pub fn read_compact_size(&mut self) -> Result<u64> {
        let first = self.read_u8()?;
        let (value, min) = match first {
            0xfd => (self.read_u16()? as u64, 0xfd),
            0xfe => (self.read_u32()? as u64, 0x1_0000),
            0xff => (self.read_u64()?, 0x1_0000_0000),
            n => return Ok(n as u64),
        };
        if value < min {
            return Err(ConsensusError::Serialization("non-canonical compact size".to_string()));
        }
        Ok(value)
    }

    fn read_len(&mut self) -> Result<usize> {
        let len = self.read_compact_size()?;
        if len > crate::constants::MAX_BLOCK_SIZE as u64 {
            return Err(ConsensusError::Serialization(format!("length {} too large", len)));
        }
        Ok(len as usize)
    }

    fn read_var_bytes(&mut self) -> Result<ByteString> {
        let len = self.read_len()?;
        Ok(self.read_bytes(len)?.to_vec())
    }
}

fn write_var_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_compact_size(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

/// Append the canonical encoding of a transaction to `out`
pub fn serialize_transaction_into(tx: &Transaction, out: &mut Vec<u8>) {
    out.extend_from_slice(&tx.version.to_le_bytes());
    write_compact_size(out, tx.inputs.len() as u64);
    for input in &tx.inputs {
        out.extend_from_slice(&input.prevout.hash);
        out.extend_from_slice(&input.prevout.index.to_le_bytes());
        write_var_bytes(out, &input.script_sig);
        out.extend_from_slice(&input.sequence.to_le_bytes());
    }
    write_compact_size(out, tx.outputs.len() as u64);
    for output in &tx.outputs {
        out.extend_from_slice(&output.value.to_le_bytes());
        write_var_bytes(out, &output.script_pubkey);
    }
    out.extend_from_slice(&tx.lock_time.to_le_bytes());
}

/// Canonical transaction encoding
pub fn serialize_transaction(tx: &Transaction) -> Vec<u8> {
    let mut out = Vec::with_capacity(transaction_size(tx));
    serialize_transaction_into(tx, &mut out);
    out
}

/// Serialized transaction size, computed without encoding
pub fn transaction_size(tx: &Transaction) -> usize {
    let inputs: usize = tx.inputs.iter()
        .map(|i| 32 + 4 + compact_size_len(i.script_sig.len() as u64) + i.script_sig.len() + 4)
        .sum();
    let outputs: usize = tx.outputs.iter()
        .map(|o| 8 + compact_size_len(o.script_pubkey.len() as u64) + o.script_pubkey.len())
        .sum();
    4 + compact_size_len(tx.inputs.len() as u64)
        + inputs
        + compact_size_len(tx.outputs.len() as u64)
        + outputs
        + 4
}

fn read_transaction(reader: &mut Reader<'_>) -> Result<Transaction> {
    let version = reader.read_u32()?;
    let input_count = reader.read_len()?;
    let mut inputs = Vec::with_capacity(input_count.min(1024));
    for _ in 0..input_count {
        let hash = reader.read_hash()?;
        let index = reader.read_u32()?;
        let script_sig = reader.read_var_bytes()?;
        let sequence = reader.read_u32()?;
        inputs.push(TransactionInput { prevout: OutPoint { hash, index }, script_sig, sequence });
    }
    let output_count = reader.read_len()?;
    let mut outputs = Vec::with_capacity(output_count.min(1024));
    for _ in 0..output_count {
        let value = reader.read_u64()? as i64;
        let script_pubkey = reader.read_var_bytes()?;
        outputs.push(TransactionOutput { value, script_pubkey });
    }
    let lock_time = reader.read_u32()?;
    Ok(Transaction { version, inputs, outputs, lock_time })
}

/// Decode a single transaction, rejecting trailing bytes
pub fn deserialize_transaction(bytes: &[u8]) -> Result<Transaction> {
    let mut reader = Reader::new(bytes);
    let tx = read_transaction(&mut reader)?;
    if reader.remaining() != 0 {
        return Err(ConsensusError::Serialization(format!(
            "{} trailing bytes after transaction", reader.remaining()
        )));
    }
    Ok(tx)
}

fn write_unsealed_fields(header: &BlockHeader, version: u32, out: &mut Vec<u8>) {
    out.extend_from_slice(&version.to_le_bytes());
    out.extend_from_slice(&header.prev_block_hash);
    out.extend_from_slice(&header.merkle_root);
    out.extend_from_slice(&header.timestamp.to_le_bytes());
    out.extend_from_slice(&header.bits.to_le_bytes());
}

/// Header encoding with an overridden version field.
///
/// Nonce headers: version | prev | merkle | time | bits | nonce.
/// Signature headers: sigR | sigS | version | prev | merkle | time | bits,
/// with the signature omitted when `include_seal` is false.
pub fn serialize_header_with_version(header: &BlockHeader, version: u32, include_seal: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(SIGNATURE_HEADER_SIZE);
    match header.seal {
        HeaderSeal::Nonce(nonce) => {
            write_unsealed_fields(header, version, &mut out);
            if include_seal {
                out.extend_from_slice(&nonce.to_le_bytes());
            }
        }
        HeaderSeal::Signature { r, s } => {
            if include_seal {
                out.extend_from_slice(&r);
                out.extend_from_slice(&s);
            }
            write_unsealed_fields(header, version, &mut out);
        }
    }
    out
}

/// Full wire encoding of a header
pub fn serialize_header(header: &BlockHeader) -> Vec<u8> {
    serialize_header_with_version(header, header.version, true)
}

fn read_header(reader: &mut Reader<'_>, variant: HeaderVariant) -> Result<BlockHeader> {
    let sig = match variant {
        HeaderVariant::Signature => Some((reader.read_hash()?, reader.read_hash()?)),
        HeaderVariant::Nonce => None,
    };
    let version = reader.read_u32()?;
    let prev_block_hash = reader.read_hash()?;
    let merkle_root = reader.read_hash()?;
    let timestamp = reader.read_u32()?;
    let bits = reader.read_u32()?;
    let seal = match sig {
        Some((r, s)) => HeaderSeal::Signature { r, s },
        None => HeaderSeal::Nonce(reader.read_u32()?),
    };
    Ok(BlockHeader { version, prev_block_hash, merkle_root, timestamp, bits, seal })
}

/// Decode a header of the given shape
pub fn deserialize_header(bytes: &[u8], variant: HeaderVariant) -> Result<BlockHeader> {
    let mut reader = Reader::new(bytes);
    let header = read_header(&mut reader, variant)?;
    if reader.remaining() != 0 {
        return Err(ConsensusError::Serialization("trailing bytes after header".to_string()));
    }
    Ok(header)
}

/// Full block encoding: header, transaction count, transactions
pub fn serialize_block(block: &Block) -> Vec<u8> {
    let mut out = serialize_header(&block.header);
    write_compact_size(&mut out, block.transactions().len() as u64);
    for tx in block.transactions() {
        serialize_transaction_into(tx, &mut out);
    }
    out
}

/// Serialized block size, computed without encoding
pub fn block_size(block: &Block) -> usize {
    let header = match block.header.variant() {
        HeaderVariant::Nonce => NONCE_HEADER_SIZE,
        HeaderVariant::Signature => SIGNATURE_HEADER_SIZE,
    };
    header
        + compact_size_len(block.transactions().len() as u64)
        + block.transactions().iter().map(transaction_size).sum::<usize>()
}

pub fn deserialize_block(bytes: &[u8], variant: HeaderVariant) -> Result<Block> {
    let mut reader = Reader::new(bytes);
    let header = read_header(&mut reader, variant)?;
    let count = reader.read_len()?;
    let mut transactions = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        transactions.push(read_transaction(&mut reader)?);
    }
    if reader.remaining() != 0 {
        return Err(ConsensusError::Serialization("trailing bytes after block".to_string()));
    }
    Ok(Block::new(header, transactions))
}
