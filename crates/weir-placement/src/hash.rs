//! Seeded hashing of keys and ring addresses.
//!
//! `hash(data, seed)` is the first 8 bytes (little endian) of
//! `blake3(seed_le ++ data)`. Keys and server names hash their UTF-8 bytes;
//! ring addresses hash their `u64` little-endian bytes.

/// Hash arbitrary bytes under `seed`.
pub fn seeded_hash(data: &[u8], seed: u64) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&seed.to_le_bytes());
    hasher.update(data);
    let hash = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

/// Position of a string key in a ring of `modulus` addresses.
///
/// `modulus` must be non-zero.
pub fn key_position(key: &str, seed: u64, modulus: u64) -> u64 {
    seeded_hash(key.as_bytes(), seed) % modulus
}

/// Re-hash an existing ring address into a ring of `modulus` addresses.
///
/// `modulus` must be non-zero.
pub fn rehash_address(address: u64, seed: u64, modulus: u64) -> u64 {
    seeded_hash(&address.to_le_bytes(), seed) % modulus
}
