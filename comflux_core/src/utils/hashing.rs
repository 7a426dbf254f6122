//! Utility functions for getting hashes
use std::format;
use std::hash::{DefaultHasher, Hash, Hasher};

pub(crate) fn calculate_hash<T: Hash>(t: &T) -> u64 {
    let mut s = DefaultHasher::new();
    t.hash(&mut s);
    s.finish()
}

pub(crate) fn hash_as_hex_string<T: Hash>(t: &T) -> String {
    format!("{:x}", calculate_hash(t))
}

/// Feed a float into a hasher by its bit pattern
///
/// `-0.0` and `0.0` are folded together so that a bound reset to zero hashes the same
/// as one that started there.
pub(crate) fn hash_f64<H: Hasher>(value: f64, state: &mut H) {
    let value = if value == 0.0 { 0.0f64 } else { value };
    value.to_bits().hash(state);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_hash_is_stable() {
        assert_eq!(hash_as_hex_string(&"EX_glc"), hash_as_hex_string(&"EX_glc"));
        assert_ne!(hash_as_hex_string(&"EX_glc"), hash_as_hex_string(&"EX_ac"));
    }

    #[test]
    fn signed_zero_hashes_equal() {
        let mut a = DefaultHasher::new();
        let mut b = DefaultHasher::new();
        hash_f64(0.0, &mut a);
        hash_f64(-0.0, &mut b);
        assert_eq!(a.finish(), b.finish());
    }
}
