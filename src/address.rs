//! Deterministic custodial addresses
//!
//! A reserves address is a pure function of its seed: `R` followed by the hex of the first
//! 20 bytes of `sha256(seed)`. Nobody holds a key for it, so only the engines move funds out.

use sha2::{Digest, Sha256};

const RESERVES_PREFIX: &str = "R";
const RESERVES_DIGEST_BYTES: usize = 20;

pub fn reserves_address(seed: &str) -> String {
    let digest = Sha256::digest(seed.as_bytes());
    format!(
        "{}{}",
        RESERVES_PREFIX,
        hex::encode(&digest[..RESERVES_DIGEST_BYTES])
    )
}

/// Bonding curves: seeded by both token ids
pub fn pump_reserves_address(tick0_id: &str, tick1_id: &str) -> String {
    reserves_address(&format!("{}{}", tick0_id, tick1_id))
}

pub fn stake_reserves_address(tick: &str) -> String {
    reserves_address(&format!("{}--STAKE", tick))
}

pub fn box_reserves_address(tick0: &str) -> String {
    reserves_address(&format!("{}--BOX", tick0))
}

/// Hex sha256, used to derive pair ids that no chain transaction produced
pub fn derived_id(seed: &str) -> String {
    hex::encode(Sha256::digest(seed.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserves_address_is_deterministic() {
        let a = reserves_address("pair");
        assert_eq!(a, reserves_address("pair"));
        assert_ne!(a, reserves_address("pair2"));
        assert_eq!(a.len(), 1 + RESERVES_DIGEST_BYTES * 2);
        assert!(a.starts_with('R'));
    }

    #[test]
    fn test_seed_shapes_do_not_collide() {
        assert_ne!(stake_reserves_address("DOGI"), reserves_address("DOGI"));
        assert_ne!(box_reserves_address("DOGI"), stake_reserves_address("DOGI"));
        assert_eq!(pump_reserves_address("ab", "cd"), reserves_address("abcd"));
    }

    #[test]
    fn test_derived_id_is_64_hex_chars() {
        let id = derived_id("graduate");
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
