//! Probabilistic seen-set for coin ids.
//!
//! A plain Bloom filter: add-only within the validation window, false
//! positives possible, false negatives never. Positions come from murmur3
//! double hashing, h(i) = h1 + i·h2.

use std::f64::consts::LN_2;
use std::io::Cursor;

use bitvec::prelude::*;
use serde::{Deserialize, Serialize};

/// Space-efficient membership filter over inserted byte strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BloomFilter {
    #[serde(with = "bitvec_serde")]
    bits: BitVec<u8, Lsb0>,
    /// Number of hash functions.
    k: usize,
    /// Size in bits.
    m: usize,
    /// Number of insertions performed.
    n: usize,
}

// BitVec travels as (base64 raw bytes, bit length); a large filter as a
// JSON integer array would be several times its in-memory size.
mod bitvec_serde {
    use base64::Engine as _;
    use bitvec::prelude::*;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        bits: &BitVec<u8, Lsb0>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bits.as_raw_slice());
        (encoded, bits.len()).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BitVec<u8, Lsb0>, D::Error> {
        let (encoded, len): (String, usize) = Deserialize::deserialize(deserializer)?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)?;
        let mut bits = BitVec::<u8, Lsb0>::from_vec(bytes);
        bits.truncate(len);
        Ok(bits)
    }
}

impl BloomFilter {
    /// Create a filter with an explicit size in bits and hash count.
    pub fn new(m: usize, k: usize) -> Self {
        Self {
            bits: bitvec![u8, Lsb0; 0; m.max(1)],
            k: k.max(1),
            m: m.max(1),
            n: 0,
        }
    }

    /// Create a filter sized for `capacity` elements under `hashes` hash
    /// functions, choosing the bit count that minimizes the false-positive
    /// rate at capacity (m = n·k / ln 2).
    pub fn for_capacity(capacity: usize, hashes: usize) -> Self {
        let m = ((capacity.max(1) as f64 * hashes.max(1) as f64) / LN_2).ceil() as usize;
        Self::new(m, hashes)
    }

    /// Insert an element. Afterwards `contains` is guaranteed to return
    /// true for it.
    pub fn insert(&mut self, element: &[u8]) {
        for pos in self.positions(element) {
            self.bits.set(pos, true);
        }
        self.n += 1;
    }

    /// Test membership. `false` means definitely absent; `true` means
    /// present or a false positive.
    pub fn contains(&self, element: &[u8]) -> bool {
        self.positions(element).into_iter().all(|pos| self.bits[pos])
    }

    fn positions(&self, element: &[u8]) -> Vec<usize> {
        let h1 = murmur64(element, 0);
        let h2 = murmur64(element, 1);
        (0..self.k)
            .map(|i| (h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.m as u64) as usize)
            .collect()
    }

    /// Current false-positive probability: (1 − e^(−kn/m))^k.
    pub fn false_positive_rate(&self) -> f64 {
        let exponent = -(self.k as f64) * (self.n as f64) / (self.m as f64);
        (1.0 - exponent.exp()).powi(self.k as i32)
    }

    pub fn size_bits(&self) -> usize {
        self.m
    }

    pub fn hash_count(&self) -> usize {
        self.k
    }

    pub fn insertions(&self) -> usize {
        self.n
    }
}

fn murmur64(element: &[u8], seed: u32) -> u64 {
    murmur3::murmur3_x64_128(&mut Cursor::new(element), seed).unwrap_or(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_after_insert() {
        let mut filter = BloomFilter::new(4096, 7);
        filter.insert(b"coin-1");
        assert!(filter.contains(b"coin-1"));
    }

    #[test]
    fn no_false_negatives_bulk() {
        let mut filter = BloomFilter::for_capacity(1000, 7);
        let ids: Vec<String> = (0..1000).map(|i| format!("coin-{i}")).collect();
        for id in &ids {
            filter.insert(id.as_bytes());
        }
        for id in &ids {
            assert!(filter.contains(id.as_bytes()), "false negative for {id}");
        }
    }

    #[test]
    fn absent_elements_mostly_rejected() {
        let mut filter = BloomFilter::for_capacity(500, 10);
        for i in 0..500 {
            filter.insert(format!("present-{i}").as_bytes());
        }
        let false_positives = (0..10_000)
            .filter(|i| filter.contains(format!("absent-{i}").as_bytes()))
            .count();
        // k=10 at capacity gives ~0.1% FPR; allow generous slack.
        assert!(false_positives < 100, "too many false positives: {false_positives}");
    }

    #[test]
    fn for_capacity_sizes_by_formula() {
        let filter = BloomFilter::for_capacity(1000, 15);
        // m = 1000 * 15 / ln 2 ≈ 21640
        assert!(filter.size_bits() >= 21_600 && filter.size_bits() <= 21_700);
        assert_eq!(filter.hash_count(), 15);
    }

    #[test]
    fn fpr_at_capacity_is_below_target() {
        let mut filter = BloomFilter::for_capacity(1000, 15);
        for i in 0..1000 {
            filter.insert(format!("coin-{i}").as_bytes());
        }
        // 15 hashes at the optimal size gives 2^-15 ≈ 3e-5 < 0.01%.
        assert!(filter.false_positive_rate() < 0.0001);
    }

    #[test]
    fn serde_round_trip_preserves_membership() {
        let mut filter = BloomFilter::new(4096, 7);
        filter.insert(b"coin-a");
        filter.insert(b"coin-b");

        let json = serde_json::to_string(&filter).unwrap();
        let restored: BloomFilter = serde_json::from_str(&json).unwrap();

        assert!(restored.contains(b"coin-a"));
        assert!(restored.contains(b"coin-b"));
        assert_eq!(restored.size_bits(), filter.size_bits());
        assert_eq!(restored.insertions(), filter.insertions());
    }
}
