//! Deterministic hashing of user identifiers into `[0, 1)`.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a.
pub(crate) fn fnv1a_32(input: &str) -> u32 {
    input.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Hash `value` with `seed` into a float in `[0, 1)`.
///
/// Version 1 hashes `value + seed` and keeps three decimal places. Version 2 hashes `seed + value`,
/// then hashes the decimal representation of that result again and keeps four decimal places,
/// which gives a better distribution for similar seeds. Any other version returns `None` and the
/// user must be treated as not included.
pub fn hash(seed: &str, value: &str, version: i64) -> Option<f64> {
    match version {
        1 => {
            let n = fnv1a_32(&format!("{value}{seed}"));
            Some(f64::from(n % 1000) / 1000.0)
        }
        2 => {
            let first = fnv1a_32(&format!("{seed}{value}"));
            let n = fnv1a_32(&first.to_string());
            Some(f64::from(n % 10000) / 10000.0)
        }
        _ => None,
    }
}
