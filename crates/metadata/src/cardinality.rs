//! Approximate distinct-user counting.
//!
//! A HyperLogLog sketch with 256 registers (precision 8). Standard error
//! is 1.04/sqrt(256) ~= 6.5%, which is plenty for an "affected users"
//! badge. Linear counting takes over at small cardinalities where raw HLL
//! is biased. The sketch hashes with SHA-256 so estimates are stable
//! across worker processes and hosts.

use sha2::{Digest, Sha256};

/// Register count exponent (p). 2^8 = 256 registers, one byte each.
const PRECISION: u32 = 8;
const REGISTERS: usize = 1 << PRECISION;

/// HyperLogLog sketch over user identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSketch {
    registers: [u8; REGISTERS],
}

impl Default for UserSketch {
    fn default() -> Self {
        Self::new()
    }
}

impl UserSketch {
    pub fn new() -> Self {
        Self {
            registers: [0; REGISTERS],
        }
    }

    /// Deserialize a sketch from its register bytes. Blobs of the wrong
    /// length (schema drift, corruption) fall back to an empty sketch
    /// rather than failing ingestion.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut sketch = Self::new();
        if bytes.len() == REGISTERS {
            sketch.registers.copy_from_slice(bytes);
        }
        sketch
    }

    /// Serialize the register array.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.registers.to_vec()
    }

    /// Record one user identifier.
    pub fn insert(&mut self, user_id: &str) {
        let digest = Sha256::digest(user_id.as_bytes());
        let hash = u64::from_be_bytes(digest[..8].try_into().unwrap());

        let index = (hash >> (64 - PRECISION)) as usize;
        let remainder = hash << PRECISION;
        // Rank: position of the leftmost set bit in the remaining 56 bits.
        let rank = (remainder.leading_zeros() + 1).min(64 - PRECISION + 1) as u8;

        if rank > self.registers[index] {
            self.registers[index] = rank;
        }
    }

    /// Merge another sketch into this one (register-wise max).
    pub fn merge(&mut self, other: &UserSketch) {
        for (a, b) in self.registers.iter_mut().zip(other.registers.iter()) {
            if *b > *a {
                *a = *b;
            }
        }
    }

    /// Estimate the number of distinct identifiers inserted.
    pub fn estimate(&self) -> u64 {
        let m = REGISTERS as f64;
        // Bias correction constant for m >= 128.
        let alpha = 0.7213 / (1.0 + 1.079 / m);

        let sum: f64 = self
            .registers
            .iter()
            .map(|&r| 2f64.powi(-(r as i32)))
            .sum();
        let raw = alpha * m * m / sum;

        let zeros = self.registers.iter().filter(|&&r| r == 0).count();
        if raw <= 2.5 * m && zeros > 0 {
            // Small-range correction: linear counting.
            (m * (m / zeros as f64).ln()).round() as u64
        } else {
            raw.round() as u64
        }
    }

    pub fn is_empty(&self) -> bool {
        self.registers.iter().all(|&r| r == 0)
    }
}
