//! Per-table bloom filter over user keys.
//!
//! Double hashing with two xxhash64 seeds: bit_i = (h1 + i*h2) mod nbits.
//! Encoding: [k u32][nbits u32][bits...]. An empty payload means "no filter".

use anyhow::Result;
use byteorder::{ByteOrder, LittleEndian};

use crate::error::LsmError;

const SEED_1: u64 = 0;
const SEED_2: u64 = 0x9E37_79B9_7F4A_7C15;

#[inline]
fn xxh64(data: &[u8], seed: u64) -> u64 {
    use std::hash::Hasher;
    let mut h = twox_hash::XxHash64::with_seed(seed);
    h.write(data);
    h.finish()
}

#[inline]
fn set_bit(bytes: &mut [u8], bit: usize) {
    bytes[bit / 8] |= 1u8 << (bit % 8);
}

#[inline]
fn get_bit(bytes: &[u8], bit: usize) -> bool {
    (bytes[bit / 8] & (1u8 << (bit % 8))) != 0
}

/// Collects key hashes while a table is written.
#[derive(Debug, Default)]
pub(crate) struct BloomBuilder {
    hashes: Vec<(u64, u64)>,
}

impl BloomBuilder {
    pub(crate) fn add(&mut self, user_key: &[u8]) {
        self.hashes.push((xxh64(user_key, SEED_1), xxh64(user_key, SEED_2) | 1));
    }

    pub(crate) fn finish(self, bits_per_key: usize) -> Vec<u8> {
        if bits_per_key == 0 || self.hashes.is_empty() {
            return Vec::new();
        }
        let nbits = (self.hashes.len() * bits_per_key).max(64);
        let nbits = nbits.div_ceil(8) * 8;
        // k ≈ bits_per_key * ln2
        let k = ((bits_per_key as f64) * 0.69).round().clamp(1.0, 30.0) as u32;

        let mut out = vec![0u8; 8 + nbits / 8];
        LittleEndian::write_u32(&mut out[0..4], k);
        LittleEndian::write_u32(&mut out[4..8], nbits as u32);
        let bits = &mut out[8..];
        for (h1, h2) in self.hashes {
            for i in 0..k as u64 {
                let bit = h1.wrapping_add(i.wrapping_mul(h2)) % nbits as u64;
                set_bit(bits, bit as usize);
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
pub(crate) struct BloomFilter {
    k: u32,
    nbits: u64,
    bits: Vec<u8>,
}

impl BloomFilter {
    /// None for an empty (disabled) filter.
    pub(crate) fn decode(raw: &[u8]) -> Result<Option<Self>> {
        if raw.is_empty() {
            return Ok(None);
        }
        if raw.len() < 8 {
            return Err(LsmError::Corruption(format!("bloom block has {} B", raw.len())).into());
        }
        let k = LittleEndian::read_u32(&raw[0..4]);
        let nbits = LittleEndian::read_u32(&raw[4..8]) as u64;
        let bits = raw[8..].to_vec();
        if nbits == 0 || (bits.len() as u64) * 8 < nbits {
            return Err(LsmError::Corruption(format!("bloom nbits={} with {} B", nbits, bits.len())).into());
        }
        Ok(Some(Self { k, nbits, bits }))
    }

    /// False means the key is definitely absent.
    pub(crate) fn may_contain(&self, user_key: &[u8]) -> bool {
        let h1 = xxh64(user_key, SEED_1);
        let h2 = xxh64(user_key, SEED_2) | 1;
        (0..self.k as u64).all(|i| {
            let bit = h1.wrapping_add(i.wrapping_mul(h2)) % self.nbits;
            get_bit(&self.bits, bit as usize)
        })
    }
}
