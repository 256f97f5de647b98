//! Fast thread-local pseudo-random number generation.
//!
//! A lightweight, lock-free source of pseudo-random numbers for the
//! scheduler's exploration draws. The generator is a **thread-local
//! xorshift64\*** seeded with a fixed non-zero constant, so each thread's
//! sequence is deterministic across runs unless thread creation order
//! changes.
//!
//! Not cryptographically secure; output quality is sufficient for
//! ε-exploration and randomized tie-breaking, nothing more.

use std::cell::Cell;
use std::thread_local;

thread_local! {static TL_RNG: Cell<u64> = const { Cell::new(0x9E37_79B9_7F4A_7C15) };}

/// Returns a fast, thread-local pseudo-random `u64`.
#[inline]
pub fn tl_rand_u64() -> u64 {
    TL_RNG.with(|c| {
        let mut x = c.get();
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        c.set(x);
        x.wrapping_mul(0x2545F4914F6CDD1D)
    })
}

/// Returns a pseudo-random `f64` uniformly distributed in `[0, 1)`.
#[inline]
pub fn tl_rand_unit() -> f64 {
    // Use the top 53 bits; the mantissa of an f64 holds exactly 53.
    (tl_rand_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
}

/// Returns a pseudo-random index in `[0, bound)`. `bound` must be nonzero.
#[inline]
pub fn tl_rand_index(bound: usize) -> usize {
    debug_assert!(bound > 0);
    (tl_rand_u64() % bound as u64) as usize
}
