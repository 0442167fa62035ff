use sha2::{Digest, Sha256};

/// Hex SHA-256 of `data`
pub fn calculate_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Constant-shape comparison of two hex digests, ignoring case
pub fn digests_match(expected: &str, actual: &str) -> bool {
    expected.len() == actual.len()
        && expected
            .bytes()
            .zip(actual.bytes())
            .fold(true, |eq, (a, b)| eq & a.eq_ignore_ascii_case(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_hash() {
        // SHA-256 for "hello world"
        assert_eq!(
            calculate_hash(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_digests_match() {
        let h = calculate_hash(b"");
        assert!(digests_match(&h, &h.to_uppercase()));
        assert!(!digests_match(&h, &calculate_hash(b"x")));
        assert!(!digests_match(&h, &h[..10]));
    }
}
