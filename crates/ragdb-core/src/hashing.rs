//! Content addressing.
//!
//! A chunk's identity is a pure function of its bytes, so re-ingesting the
//! same text overwrites the same vector point.

use twox_hash::xxh3;

use crate::types::ContentId;

/// `2^63 - 1`. Ids are reduced modulo this value, so every id lies in `[0, 2^63 - 1)`.
pub const ID_MODULUS: u128 = (1u128 << 63) - 1;

/// Dimension of [`pseudo_embedding`].
pub const PSEUDO_EMBEDDING_DIM: usize = 16;

/// Stable 128-bit XXH3 hash of the content bytes.
pub fn content_hash(content: &str) -> u128 {
    xxh3::hash128(content.as_bytes())
}

pub fn content_id(content: &str) -> ContentId {
    // Always < 2^63 - 1, so the narrowing is lossless.
    (content_hash(content) % ID_MODULUS) as ContentId
}

/// Deterministic stand-in vector used when no embedding provider is reachable:
/// each byte of the content hash scaled into `[0, 1]`.
///
/// Keeps ingestion and vector search functional; carries no semantics.
pub fn pseudo_embedding(content: &str) -> Vec<f32> {
    content_hash(content).to_be_bytes().iter().map(|&b| f32::from(b) / 255.0).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_stable_and_in_range() {
        for text in ["", "CRISPR gene editing trial results", "Quarterly budget meeting notes", "ü∂ƒ"] {
            let a = content_id(text);
            let b = content_id(text);
            assert_eq!(a, b);
            assert!(u128::from(a) < ID_MODULUS);
        }
    }

    #[test]
    fn different_content_gets_different_ids() {
        assert_ne!(content_id("alpha"), content_id("alpha "));
    }

    #[test]
    fn pseudo_embedding_is_unit_interval() {
        let v = pseudo_embedding("anything at all");
        assert_eq!(v.len(), PSEUDO_EMBEDDING_DIM);
        assert!(v.iter().all(|x| (0.0..=1.0).contains(x)));
        assert_eq!(v, pseudo_embedding("anything at all"));
    }
}
