use cairn_types::primitives::Hash;

/// Compute the BLAKE3 hash of the given data.
pub fn blake3_hash(data: &[u8]) -> Hash {
    *blake3::hash(data).as_bytes()
}

/// Compute a BLAKE3 hash with domain separation.
/// The context string ensures different uses of hashing produce different outputs.
pub fn blake3_hash_domain(context: &str, data: &[u8]) -> Hash {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(data);
    *hasher.finalize().as_bytes()
}

/// Derive key material using BLAKE3 KDF.
pub fn blake3_kdf(context: &str, key_material: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(key_material);
    *hasher.finalize().as_bytes()
}

/// Hash multiple pieces of data together under a domain context.
pub fn blake3_hash_multi(context: &str, parts: &[&[u8]]) -> Hash {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blake3_hash_deterministic() {
        let data = b"hello cairn";
        assert_eq!(blake3_hash(data), blake3_hash(data));
    }

    #[test]
    fn test_blake3_hash_different_inputs() {
        assert_ne!(blake3_hash(b"hello"), blake3_hash(b"world"));
    }

    #[test]
    fn test_blake3_domain_separation() {
        let data = b"same data";
        let h1 = blake3_hash_domain("context-a", data);
        let h2 = blake3_hash_domain("context-b", data);
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_blake3_kdf() {
        let key = blake3_kdf("cairn-test", b"key material");
        // Deterministic
        assert_eq!(key, blake3_kdf("cairn-test", b"key material"));
        assert_ne!(key, blake3_kdf("cairn-test", b"other material"));
    }

    #[test]
    fn test_blake3_hash_multi_matches_concatenation() {
        let h = blake3_hash_multi("ctx", &[b"hello", b" ", b"world"]);
        assert_eq!(h, blake3_hash_domain("ctx", b"hello world"));
    }
}
