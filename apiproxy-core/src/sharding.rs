//! Integer and hash primitives for the sharding plane.
//!
//! Entity identities are 64-bit signed integers that appear in URL paths as
//! unsigned decimal strings, and in the environment as decimal or `0x`-hex
//! strings. Sharding keys are 32-bit values derived from one or two ids with
//! MD5, so that the key distribution is uniform no matter how the ids were
//! allocated.

use md5::{Digest, Md5};

/// Parses a 64-bit id per the id grammar.
///
/// Accepted forms:
/// - decimal with an optional sign (`"123"`, `"-5"`, `"+7"`),
/// - `0x`-prefixed unsigned hexadecimal (`"0xffff"`).
///
/// Unsigned values above `i64::MAX` are reinterpreted as negatives via
/// two's complement, so `"18446744073709551615"` parses to `-1`, while
/// `"18446744073709551616"` is out of range and rejected.
pub fn parse_i64(s: &str) -> Option<i64> {
    if let Some(digits) = s.strip_prefix("0x") {
        return u64::from_str_radix(digits, 16).ok().map(u2i);
    }
    if s.starts_with('-') {
        return s.parse::<i64>().ok();
    }
    s.parse::<u64>().ok().map(u2i)
}

/// Reinterprets a signed id as its two's-complement unsigned form.
///
/// Used to render ids as URL path segments, which are always non-negative
/// decimal strings.
pub fn i2u(i: i64) -> u64 {
    i as u64
}

/// The inverse of [`i2u`].
pub fn u2i(u: u64) -> i64 {
    u as i64
}

/// Computes the 32-bit sharding key for one or two entity ids.
///
/// The ids are serialized as 8 bytes each, big-endian, two's complement,
/// concatenated and fed to MD5; the key is the first 4 digest bytes read as
/// a big-endian unsigned integer. This is the only sharding function in the
/// system and its output is part of the deployment contract: every proxy
/// and every backend must agree on it bit-exactly.
pub fn shard_key(a: i64, b: Option<i64>) -> u32 {
    let mut hasher = Md5::new();
    hasher.update(a.to_be_bytes());
    if let Some(b) = b {
        hasher.update(b.to_be_bytes());
    }
    let digest = hasher.finalize();
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_key_reference_values() {
        assert_eq!(shard_key(123, None), 0xFC1063E1);
        assert_eq!(shard_key(0, None), 0x7DEA362B);
        assert_eq!(shard_key(-1, None), 0xC2CB56F4);
        assert_eq!(shard_key(1, Some(2)), 0xF014C44F);
    }

    #[test]
    fn test_shard_key_is_deterministic() {
        for a in [i64::MIN, -1, 0, 1, 12345, i64::MAX] {
            assert_eq!(shard_key(a, None), shard_key(a, None));
            assert_eq!(shard_key(a, Some(a)), shard_key(a, Some(a)));
        }
    }

    #[test]
    fn test_one_and_two_id_keys_differ() {
        // Appending a second id changes the hashed buffer.
        assert_ne!(shard_key(1, None), shard_key(1, Some(2)));
        assert_ne!(shard_key(1, Some(2)), shard_key(2, Some(1)));
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_i64("0"), Some(0));
        assert_eq!(parse_i64("-1"), Some(-1));
        assert_eq!(parse_i64("+42"), Some(42));
        assert_eq!(parse_i64("9223372036854775807"), Some(i64::MAX));
        assert_eq!(parse_i64("9223372036854775808"), Some(i64::MIN));
        assert_eq!(parse_i64("18446744073709551615"), Some(-1));
        assert_eq!(parse_i64("18446744073709551616"), None);
        assert_eq!(parse_i64("-9223372036854775808"), Some(i64::MIN));
        assert_eq!(parse_i64("-9223372036854775809"), None);
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_i64("0x0"), Some(0));
        assert_eq!(parse_i64("0x7b"), Some(123));
        assert_eq!(parse_i64("0xffffffffffffffff"), Some(-1));
        assert_eq!(parse_i64("0x10000000000000000"), None);
        assert_eq!(parse_i64("-0x7b"), None);
    }

    #[test]
    fn test_parse_garbage() {
        assert_eq!(parse_i64(""), None);
        assert_eq!(parse_i64("0x"), None);
        assert_eq!(parse_i64("12a"), None);
        assert_eq!(parse_i64(" 12"), None);
    }

    #[test]
    fn test_twos_complement_round_trip() {
        for i in [i64::MIN, -2, -1, 0, 1, i64::MAX] {
            assert_eq!(u2i(i2u(i)), i);
        }
        for u in [0u64, 1, u64::MAX / 2, u64::MAX - 1, u64::MAX] {
            assert_eq!(i2u(u2i(u)), u);
        }
    }

    #[test]
    fn test_decimal_round_trip() {
        for i in [i64::MIN, -1, 0, 12345, i64::MAX] {
            assert_eq!(parse_i64(&i.to_string()), Some(i));
            assert_eq!(parse_i64(&i2u(i).to_string()), Some(i));
        }
    }
}
