// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bloom filter for crawl URL deduplication.
//!
//! Double hashing over SHA-256: the digest's first two 8-byte words
//! seed `h1 + i·h2` for the k probe positions. Sized from the expected
//! item count and target false-positive rate; per-batch lifecycle
//! (created on start, dropped on cancel/cleanup).

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

pub struct BloomFilter {
    bits: Vec<u64>,
    m_bits: u64,
    k: u32,
    inserted: u64,
}

impl BloomFilter {
    /// Size for `expected_items` at `fp_rate` (standard m/k formulas).
    pub fn new(expected_items: u64, fp_rate: f64) -> Self {
        let n = expected_items.max(1) as f64;
        let p = fp_rate.clamp(1e-9, 0.5);
        let m = (-(n * p.ln()) / (std::f64::consts::LN_2 * std::f64::consts::LN_2)).ceil();
        let m_bits = (m as u64).max(64);
        let k = ((m / n) * std::f64::consts::LN_2).round().max(1.0) as u32;
        Self { bits: vec![0u64; m_bits.div_ceil(64) as usize], m_bits, k, inserted: 0 }
    }

    fn probes(&self, item: &str) -> impl Iterator<Item = u64> + '_ {
        let digest = Sha256::digest(item.as_bytes());
        let h1 = u64::from_le_bytes([
            digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
        ]);
        let h2 = u64::from_le_bytes([
            digest[8], digest[9], digest[10], digest[11], digest[12], digest[13], digest[14],
            digest[15],
        ]) | 1; // odd step so probes cover the space
        let m = self.m_bits;
        (0..self.k as u64).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % m)
    }

    pub fn contains(&self, item: &str) -> bool {
        self.probes(item).all(|bit| self.bits[(bit / 64) as usize] & (1 << (bit % 64)) != 0)
    }

    /// Insert; returns `true` if the item was (probably) new.
    pub fn insert(&mut self, item: &str) -> bool {
        let mut new = false;
        let positions: Vec<u64> = self.probes(item).collect();
        for bit in positions {
            let word = (bit / 64) as usize;
            let mask = 1u64 << (bit % 64);
            if self.bits[word] & mask == 0 {
                self.bits[word] |= mask;
                new = true;
            }
        }
        if new {
            self.inserted += 1;
        }
        new
    }

    pub fn inserted(&self) -> u64 {
        self.inserted
    }
}

/// Per-project dedup filters with batch lifecycle.
pub struct DedupFilters {
    filters: Mutex<HashMap<String, BloomFilter>>,
    expected_items: u64,
    fp_rate: f64,
}

impl DedupFilters {
    pub fn new(expected_items: u64, fp_rate: f64) -> Self {
        Self { filters: Mutex::new(HashMap::new()), expected_items, fp_rate }
    }

    /// Check-and-add in one step. Returns `true` when the URL is new to
    /// the project (and is now recorded).
    pub fn check_and_add(&self, project_id: &str, url: &str) -> bool {
        let mut filters = self.filters.lock();
        let filter = filters
            .entry(project_id.to_string())
            .or_insert_with(|| BloomFilter::new(self.expected_items, self.fp_rate));
        filter.insert(url)
    }

    pub fn contains(&self, project_id: &str, url: &str) -> bool {
        self.filters.lock().get(project_id).map(|f| f.contains(url)).unwrap_or(false)
    }

    /// Drop a project's filter (batch cancel / cleanup).
    pub fn clear(&self, project_id: &str) {
        self.filters.lock().remove(project_id);
    }

    pub fn inserted(&self, project_id: &str) -> u64 {
        self.filters.lock().get(project_id).map(|f| f.inserted()).unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "bloom_tests.rs"]
mod tests;
