//! Stable record ids for backfilled images.

/// Derive the numeric record id for an image file name.
///
/// The id is the first 32 bits (8 hex characters) of the BLAKE3 digest of
/// the file name, read big-endian as a non-negative integer. Truncating to
/// 32 bits keeps ids compact, but collisions become plausible once the
/// corpus reaches tens of thousands of distinct names; widen the prefix if
/// that ever matters.
pub fn record_id(filename: &str) -> i64 {
    let digest = blake3::hash(filename.as_bytes());
    let bytes = digest.as_bytes();
    i64::from(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_is_deterministic() {
        assert_eq!(record_id("a.png"), record_id("a.png"));
    }

    #[test]
    fn test_record_id_differs_across_names() {
        assert_ne!(record_id("a.png"), record_id("b.png"));
    }

    #[test]
    fn test_record_id_fits_in_32_bits() {
        for name in ["a.png", "b.jpg", "photo-2024.jpeg", ""] {
            let id = record_id(name);
            assert!(id >= 0, "id for {name:?} was negative: {id}");
            assert!(id <= i64::from(u32::MAX));
        }
    }

    #[test]
    fn test_record_id_matches_digest_hex_prefix() {
        let name = "worksheet.png";
        let hex = blake3::hash(name.as_bytes()).to_hex();
        let expected = i64::from_str_radix(&hex[..8], 16).unwrap();
        assert_eq!(record_id(name), expected);
    }
}
