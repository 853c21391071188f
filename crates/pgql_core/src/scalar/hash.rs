use ahash::RandomState;

use super::ScalarValue;

/// State used for all hashing of grouping keys.
///
/// Fixed seeds so that every worker produces the same hash for the same
/// value.
pub const HASH_RANDOM_STATE: RandomState = RandomState::with_seeds(0, 0, 0, 0);

/// Hash value used for nulls.
pub const NULL_HASH: u64 = 0xA21258D088C87A13;

/// Hash value to use when not provided with any grouping keys.
///
/// Non-zero for debuggability.
pub const NO_GROUPS_HASH_VALUE: u64 = 49820;

/// Hash a single scalar value.
pub fn hash_scalar(value: &ScalarValue) -> u64 {
    match value {
        ScalarValue::Null => NULL_HASH,
        ScalarValue::Boolean(v) => HASH_RANDOM_STATE.hash_one(v),
        ScalarValue::Int64(v) => HASH_RANDOM_STATE.hash_one(v),
        ScalarValue::Float64(v) => HASH_RANDOM_STATE.hash_one(v.to_bits()),
        ScalarValue::Utf8(v) => HASH_RANDOM_STATE.hash_one(v.as_str()),
    }
}

/// Combine two hashes into a single value.
///
/// Mixing adapted from boost:
/// <https://github.com/boostorg/container_hash/blob/b8179488b20eb1373bdbf5c7fcca963f072512df/include/boost/container_hash/detail/hash_mix.hpp#L67>
///
/// `v1` is mixed before `v2` is added, so `(a, b)` and `(b, a)` hash
/// differently.
pub const fn combine_hashes(v1: u64, v2: u64) -> u64 {
    const fn mix(mut x: u64) -> u64 {
        const M: u64 = 0xE9846AF9B1A615D;
        x ^= x.wrapping_shr(32);
        x = x.wrapping_mul(M);
        x ^= x.wrapping_shr(32);
        x = x.wrapping_mul(M);
        x ^= x.wrapping_shr(28);
        x
    }

    mix(mix(v1).wrapping_add(0x9E3779B9).wrapping_add(v2))
}
