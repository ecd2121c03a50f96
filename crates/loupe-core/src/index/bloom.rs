//! Bloom pre-filter for exact name lookups.
//!
//! Uses double hashing derived from two independent ahash computations.
//! Only the negative answer is authoritative: a hit is always verified
//! against the name trie.

use ahash::RandomState;
use std::hash::{BuildHasher, Hasher};

/// A space-efficient probabilistic set over indexed filenames.
///
/// Used to reject exact-name queries for names that were never indexed
/// before touching the trie.
#[derive(Clone, Debug)]
pub struct BloomFilter {
    /// Bit array stored as u64 words for efficient access
    bits: Vec<u64>,
    /// Number of bits in the filter
    num_bits: usize,
    /// Number of hash functions to use
    num_hashes: u8,
    /// Elements inserted so far
    element_count: u64,
}

impl BloomFilter {
    /// Create a new filter sized for the expected number of elements and
    /// desired false positive rate.
    ///
    /// # Arguments
    /// * `expected_elements` - Expected number of unique names
    /// * `false_positive_rate` - Desired false positive rate (e.g., 0.01)
    pub fn new(expected_elements: usize, false_positive_rate: f64) -> Self {
        // Optimal bits: m = -n * ln(p) / (ln(2)^2)
        let n = expected_elements.max(1) as f64;
        let p = false_positive_rate.clamp(0.0001, 0.5);
        let ln2_sq = std::f64::consts::LN_2 * std::f64::consts::LN_2;

        let num_bits = ((-n * p.ln()) / ln2_sq).ceil() as usize;
        let num_bits = num_bits.max(64);

        // Round up to a whole number of words
        let num_words = (num_bits + 63) / 64;
        let num_bits = num_words * 64;

        // Optimal hash count: k = (m/n) * ln(2)
        let num_hashes = ((num_bits as f64 / n) * std::f64::consts::LN_2).round() as u8;
        let num_hashes = num_hashes.clamp(1, 16);

        Self {
            bits: vec![0u64; num_words],
            num_bits,
            num_hashes,
            element_count: 0,
        }
    }

    /// Insert a name into the filter.
    #[inline]
    pub fn insert(&mut self, name: &str) {
        let (h1, h2) = self.hash_pair(name);

        for i in 0..self.num_hashes as u64 {
            // Double hashing: h(i) = h1 + i*h2
            let hash = h1.wrapping_add(i.wrapping_mul(h2));
            let bit_index = (hash as usize) % self.num_bits;
            self.bits[bit_index / 64] |= 1u64 << (bit_index % 64);
        }
        self.element_count += 1;
    }

    /// Check if a name might be in the set.
    /// Returns false if definitely not present, true if possibly present.
    #[inline]
    pub fn might_contain(&self, name: &str) -> bool {
        let (h1, h2) = self.hash_pair(name);

        for i in 0..self.num_hashes as u64 {
            let hash = h1.wrapping_add(i.wrapping_mul(h2));
            let bit_index = (hash as usize) % self.num_bits;
            if (self.bits[bit_index / 64] & (1u64 << (bit_index % 64))) == 0 {
                return false;
            }
        }
        true
    }

    /// Compute two hash values for double hashing.
    ///
    /// Two independently seeded hashers are required: reusing a hasher
    /// after finish() corrupts the distribution and raises the false
    /// positive rate.
    #[inline]
    fn hash_pair(&self, name: &str) -> (u64, u64) {
        let mut hasher1 = RandomState::with_seeds(0, 0, 0, 0).build_hasher();
        hasher1.write(name.as_bytes());
        let h1 = hasher1.finish();

        let mut hasher2 = RandomState::with_seeds(
            0x517cc1b727220a95,
            0x9e3779b97f4a7c15,
            0xbf58476d1ce4e5b9,
            0x94d049bb133111eb,
        )
        .build_hasher();
        hasher2.write(name.as_bytes());
        let h2 = hasher2.finish();

        (h1, h2)
    }

    /// Elements inserted so far. Removals are not supported, so this only
    /// grows until `clear`.
    pub fn element_count(&self) -> u64 {
        self.element_count
    }

    /// Reset to an empty filter of the same size.
    pub fn clear(&mut self) {
        self.bits.iter_mut().for_each(|w| *w = 0);
        self.element_count = 0;
    }

    /// Approximate memory usage in bytes.
    pub fn memory_usage(&self) -> usize {
        self.bits.len() * 8 + std::mem::size_of::<Self>()
    }
}

impl Default for BloomFilter {
    fn default() -> Self {
        // Sized for a typical desktop index with 1% FPR
        Self::new(1_000_000, 0.01)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bloom_filter_basic() {
        let mut bf = BloomFilter::new(1000, 0.01);

        for i in 0..100 {
            bf.insert(&format!("file_{}.txt", i));
        }

        for i in 0..100 {
            assert!(
                bf.might_contain(&format!("file_{}.txt", i)),
                "inserted name {} should be found",
                i
            );
        }

        let mut false_positives = 0;
        for i in 1000..2000 {
            if bf.might_contain(&format!("absent_{}.bin", i)) {
                false_positives += 1;
            }
        }
        assert!(
            false_positives < 50,
            "too many false positives: {}",
            false_positives
        );
    }

    #[test]
    fn test_clear() {
        let mut bf = BloomFilter::new(100, 0.01);
        bf.insert("hello.txt");
        assert!(bf.might_contain("hello.txt"));
        assert_eq!(bf.element_count(), 1);

        bf.clear();
        assert!(!bf.might_contain("hello.txt"));
        assert_eq!(bf.element_count(), 0);
    }

    #[test]
    fn test_hash_pair_independence() {
        let bf = BloomFilter::new(1000, 0.01);

        let mut same_count = 0;
        for i in 0..1000 {
            let name = format!("name-{}", i);
            let (h1, h2) = bf.hash_pair(&name);
            if h1 == h2 {
                same_count += 1;
            }
        }
        assert_eq!(
            same_count, 0,
            "h1 and h2 are not independent: {} collisions",
            same_count
        );
    }

    #[test]
    fn test_false_positive_rate_in_range() {
        let expected_fpr = 0.01;
        let num_elements = 10_000;

        let mut bf = BloomFilter::new(num_elements, expected_fpr);
        for i in 0..num_elements {
            bf.insert(&format!("doc-{}", i));
        }

        let mut false_positives = 0;
        let probes = 50_000;
        for i in 0..probes {
            if bf.might_contain(&format!("other-{}", i)) {
                false_positives += 1;
            }
        }

        let actual = false_positives as f64 / probes as f64;
        assert!(
            actual <= expected_fpr * 3.0,
            "false positive rate too high: {:.2}%",
            actual * 100.0
        );
    }
}
