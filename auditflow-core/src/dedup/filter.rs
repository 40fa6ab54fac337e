//! Membership filters for the deduplicator
//!
//! ## Algorithm
//!
//! The Bloom filter derives its `k` probe positions from one SHA-256 digest
//! using double hashing: `index_i = (h1 + i * h2) mod m`, where `h1` and `h2`
//! are the first two little-endian words of the digest. `h2` is forced odd so
//! the probe sequence never collapses onto a single bit.
//!
//! False-positive probability after `n` insertions is approximately
//! `(1 - e^(-kn/m))^k`.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::config::DeduplicatorConfig;

/// Set-membership test and insert over raw bytes.
pub trait MembershipFilter: Send {
    /// Whether `item` may have been inserted. Never false for an inserted item.
    fn contains(&self, item: &[u8]) -> bool;
    fn insert(&mut self, item: &[u8]);
}

/// Fixed-size Bloom filter
#[derive(Debug, Clone)]
pub struct BloomFilter {
    words: Vec<u64>,
    num_bits: usize,
    num_hashes: u32,
    inserted: usize,
}

impl BloomFilter {
    /// Create a filter of `num_bits` bits probed `num_hashes` times per item
    pub fn new(num_bits: usize, num_hashes: u32) -> Self {
        let num_bits = num_bits.max(1);
        Self {
            words: vec![0; (num_bits + 63) / 64],
            num_bits,
            num_hashes: num_hashes.max(1),
            inserted: 0,
        }
    }

    pub fn from_config(config: &DeduplicatorConfig) -> Self {
        Self::new(config.bits, config.hashes)
    }

    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Items inserted so far
    pub fn len(&self) -> usize {
        self.inserted
    }

    pub fn is_empty(&self) -> bool {
        self.inserted == 0
    }

    /// Expected false-positive probability at the current fill
    pub fn estimated_false_positive_rate(&self) -> f64 {
        let k = self.num_hashes as f64;
        let n = self.inserted as f64;
        let m = self.num_bits as f64;
        (1.0 - (-k * n / m).exp()).powf(k)
    }

    fn probes(&self, item: &[u8]) -> impl Iterator<Item = usize> {
        let digest = Sha256::digest(item);
        let mut lo = [0u8; 8];
        let mut hi = [0u8; 8];
        lo.copy_from_slice(&digest[..8]);
        hi.copy_from_slice(&digest[8..16]);

        let h1 = u64::from_le_bytes(lo);
        let h2 = u64::from_le_bytes(hi) | 1;
        let m = self.num_bits as u64;

        (0..self.num_hashes as u64).map(move |i| (h1.wrapping_add(i.wrapping_mul(h2)) % m) as usize)
    }

    fn bit(&self, idx: usize) -> bool {
        self.words[idx / 64] & (1u64 << (idx % 64)) != 0
    }
}

impl MembershipFilter for BloomFilter {
    fn contains(&self, item: &[u8]) -> bool {
        self.probes(item).all(|idx| self.bit(idx))
    }

    fn insert(&mut self, item: &[u8]) {
        let probes: Vec<usize> = self.probes(item).collect();
        for idx in probes {
            self.words[idx / 64] |= 1u64 << (idx % 64);
        }
        self.inserted += 1;
    }
}

/// Exact set, for small deployments where memory is not a concern
#[derive(Debug, Clone, Default)]
pub struct ExactFilter {
    seen: HashSet<Vec<u8>>,
}

impl MembershipFilter for ExactFilter {
    fn contains(&self, item: &[u8]) -> bool {
        self.seen.contains(item)
    }

    fn insert(&mut self, item: &[u8]) {
        self.seen.insert(item.to_vec());
    }
}
