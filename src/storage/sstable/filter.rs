//! Bloom filter over the user keys of one table.
//!
//! Encoding: `[bit array][k: u8]`. Probe positions use double hashing over
//! the two halves of an xxh3-128 hash: `h_i = h1 + i * h2 (mod bits)`.

use xxhash_rust::xxh3::xxh3_128;

/// Collects key hashes while a table is being built.
pub struct BloomFilterBuilder {
    bits_per_key: usize,
    hashes: Vec<(u64, u64)>,
}

impl BloomFilterBuilder {
    pub fn new(bits_per_key: usize) -> Self {
        Self {
            bits_per_key,
            hashes: Vec::new(),
        }
    }

    pub fn add_key(&mut self, user_key: &[u8]) {
        let hash = hash_key(user_key);
        // Consecutive versions of one user key hash identically.
        if self.hashes.last() != Some(&hash) {
            self.hashes.push(hash);
        }
    }

    pub fn num_keys(&self) -> usize {
        self.hashes.len()
    }

    pub fn finish(&self) -> Vec<u8> {
        // ln(2) * bits/key minimises the false-positive rate
        let k = ((self.bits_per_key as f64 * 0.69) as usize).clamp(1, 30);
        let bits = (self.hashes.len() * self.bits_per_key).max(64);
        let bytes = bits.div_ceil(8);
        let bits = (bytes * 8) as u64;

        let mut filter = vec![0u8; bytes + 1];
        for &(h1, h2) in &self.hashes {
            for i in 0..k as u64 {
                let pos = h1.wrapping_add(i.wrapping_mul(h2)) % bits;
                filter[(pos / 8) as usize] |= 1 << (pos % 8);
            }
        }
        filter[bytes] = k as u8;
        filter
    }
}

/// False means the key is definitely absent.
pub fn bloom_may_contain(filter: &[u8], user_key: &[u8]) -> bool {
    if filter.len() < 2 {
        return true;
    }
    let k = filter[filter.len() - 1] as u64;
    if k == 0 || k > 30 {
        // Unknown encoding; never rule a key out.
        return true;
    }
    let bits = ((filter.len() - 1) * 8) as u64;
    let (h1, h2) = hash_key(user_key);
    (0..k).all(|i| {
        let pos = h1.wrapping_add(i.wrapping_mul(h2)) % bits;
        filter[(pos / 8) as usize] & (1 << (pos % 8)) != 0
    })
}

fn hash_key(key: &[u8]) -> (u64, u64) {
    let hash = xxh3_128(key);
    (hash as u64, (hash >> 64) as u64)
}
