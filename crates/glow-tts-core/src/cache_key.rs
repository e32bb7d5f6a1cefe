//! Content-addressed cache keys: `sha256(text ‖ voice ‖ speed)`.

use sha2::{Digest, Sha256};

/// Computes the hex-encoded cache key for a unit of synthesized speech.
///
/// Changing the voice or speed must change the key, since the resulting
/// audio differs even for identical text.
pub fn compute_key(text: &str, voice: &str, speed: f64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update([0u8]);
    hasher.update(voice.as_bytes());
    hasher.update([0u8]);
    hasher.update(speed.to_bits().to_le_bytes());
    let digest = hasher.finalize();
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_produce_same_key() {
        let a = compute_key("hello world", "en-us", 1.0);
        let b = compute_key("hello world", "en-us", 1.0);
        assert_eq!(a, b);
    }

    #[test]
    fn different_voice_changes_key() {
        let a = compute_key("hello world", "en-us", 1.0);
        let b = compute_key("hello world", "en-gb", 1.0);
        assert_ne!(a, b);
    }

    #[test]
    fn different_speed_changes_key() {
        let a = compute_key("hello world", "en-us", 1.0);
        let b = compute_key("hello world", "en-us", 1.25);
        assert_ne!(a, b);
    }

    #[test]
    fn key_is_hex_sha256_length() {
        let key = compute_key("x", "en-us", 1.0);
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn separator_byte_prevents_field_concatenation_collisions() {
        // Without the 0-byte separator "ab" + "c" would hash identically to "a" + "bc".
        let a = compute_key("ab", "c", 1.0);
        let b = compute_key("a", "bc", 1.0);
        assert_ne!(a, b);
    }
}
