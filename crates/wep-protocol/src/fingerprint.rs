//! Response fingerprinting
//!
//! A fingerprint is a short stable digest of the bytes that classified a
//! device. Identical dongles running identical firmware produce identical
//! banners and therefore share a fingerprint; distinct responses differ.

/// Compute the 8-hex-character fingerprint of a response
///
/// FNV-1a over the raw bytes. The digest is stable across runs and
/// platforms; it is an identifier, not a cryptographic hash.
pub fn fingerprint(response: &[u8]) -> String {
    const FNV_OFFSET: u32 = 0x811c_9dc5;
    const FNV_PRIME: u32 = 0x0100_0193;

    let mut hash = FNV_OFFSET;
    for &byte in response {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    format!("{:08x}", hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = fingerprint(b"ZIGBEE COORDINATOR v3.2");
        let b = fingerprint(b"ZIGBEE COORDINATOR v3.2");
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_responses_differ() {
        assert_ne!(fingerprint(b"BLE_READY"), fingerprint(b"ZIGBEE_READY"));
    }

    proptest! {
        #[test]
        fn prop_fingerprint_is_eight_lower_hex(data: Vec<u8>) {
            let fp = fingerprint(&data);
            prop_assert_eq!(fp.len(), 8);
            prop_assert!(fp.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }
}
