//! # Payload Fingerprinting
//!
//! Equality between consecutive poll results is decided by hashing a
//! canonical serialization of the payload. The payloads are operational
//! reporting data, not security-sensitive, so a fast non-cryptographic
//! digest (CRC32) is sufficient; hash collisions are an accepted trade-off.

use serde_json::Value;

/// Computes the content fingerprint of a JSON payload.
///
/// `serde_json` keeps object members in a sorted map, so two structurally
/// equal values serialize to identical bytes regardless of how they were
/// built. Serializing an in-memory `Value` cannot fail.
pub fn fingerprint(payload: &Value) -> u64 {
    let bytes = serde_json::to_vec(payload).unwrap_or_default();
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&bytes);
    hasher.finalize() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn equal_payloads_share_a_fingerprint() {
        let a = json!({"count": 3, "status": "open"});
        let b = json!({"status": "open", "count": 3});
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn changed_payloads_differ() {
        let a = json!({"count": 3});
        let b = json!({"count": 4});
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn nested_structure_matters() {
        let a = json!({"rows": [{"id": 1}, {"id": 2}]});
        let b = json!({"rows": [{"id": 2}, {"id": 1}]});
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }
}
