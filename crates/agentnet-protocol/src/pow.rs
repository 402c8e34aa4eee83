//! SHA-256 proof-of-work puzzle.
//!
//! The relay issues a `(challenge, difficulty)` pair to rate-limit
//! expensive operations (handshake, room creation). A proof is a decimal
//! nonce string such that SHA-256(challenge ∥ proof) starts with
//! `difficulty` zero bits, counting from the most significant bit of
//! byte 0. Binding the challenge into the hash input ties each proof to
//! the challenge it was solved for.

use sha2::{Digest, Sha256};

/// Find the smallest decimal nonce whose proof satisfies `difficulty`.
/// Deterministic for identical inputs. Runs until it succeeds; the search
/// space is unbounded so there is no failure case.
pub fn solve(challenge: &str, difficulty: u32) -> String {
    let mut nonce: u64 = 0;
    loop {
        let proof = nonce.to_string();
        if verify(challenge, &proof, difficulty) {
            return proof;
        }
        nonce += 1;
    }
}

/// Check that SHA-256(challenge ∥ proof) has `difficulty` leading zero bits.
pub fn verify(challenge: &str, proof: &str, difficulty: u32) -> bool {
    let mut hasher = Sha256::new();
    hasher.update(challenge.as_bytes());
    hasher.update(proof.as_bytes());
    let hash = hasher.finalize();

    for bit in 0..difficulty as usize {
        let byte_idx = bit / 8;
        let bit_idx = 7 - (bit % 8);
        match hash.get(byte_idx) {
            Some(b) if b & (1 << bit_idx) != 0 => return false,
            Some(_) => {}
            // Difficulty beyond 256 bits can never be satisfied.
            None => return false,
        }
    }
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
