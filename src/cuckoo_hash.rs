//! Multiply-shift hash functions mapping a key digest to a table index.

use core::hash::{BuildHasher, Hash};
use rand::RngCore;

/// Floor of the base-2 logarithm; `log2(0)` is defined as `0`.
#[inline]
pub fn log2(n: usize) -> u32 {
    if n == 0 {
        0
    } else {
        n.ilog2()
    }
}

/// 32-bit digest of `key` under `build_hasher`, the input to every
/// [`CuckooHash`]. The 64-bit hasher output is folded by xoring its halves.
#[inline]
pub fn digest_of<Q, S>(build_hasher: &S, key: &Q) -> u32
where
    Q: ?Sized + Hash,
    S: BuildHasher,
{
    let h = build_hasher.hash_one(key);
    (h ^ (h >> 32)) as u32
}

/// One hash function bound to one table: two random coefficients and the
/// number of index bits derived from the table size.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CuckooHash {
    coefficient_high: u32,
    coefficient_low: u32,
    bit_width: u32,
}

impl CuckooHash {
    pub fn new(coefficient_high: u32, coefficient_low: u32, table_size: usize) -> Self {
        Self {
            coefficient_high,
            coefficient_low,
            bit_width: log2(table_size).min(u32::BITS),
        }
    }

    /// Two independently seeded functions for tables of `table_size` slots.
    pub fn pair<R: RngCore + ?Sized>(rng: &mut R, table_size: usize) -> [CuckooHash; 2] {
        [
            CuckooHash::new(rng.next_u32(), rng.next_u32(), table_size),
            CuckooHash::new(rng.next_u32(), rng.next_u32(), table_size),
        ]
    }

    pub fn bit_width(&self) -> u32 {
        self.bit_width
    }

    /// Index in `[0, 2^bit_width)`, which never exceeds the table size the
    /// function was built for (or is `0` for an empty table).
    #[inline]
    pub fn index(&self, digest: u32) -> usize {
        if self.bit_width == 0 {
            return 0;
        }
        let high = digest >> 16;
        let low = digest & 0xFFFF;
        let mixed = high
            .wrapping_mul(self.coefficient_high)
            .wrapping_add(low.wrapping_mul(self.coefficient_low));
        (mixed >> (u32::BITS - self.bit_width)) as usize
    }
}
