// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

const GOLDEN_GAMMA: u64 = 0x9e3779b97f4a7c15;

/// Derives an independent, stable seed for `stream` from `base_seed`.
///
/// Each parallel unit of work (a k-means restart, for example) gets its own
/// seed so results do not depend on scheduling order.
pub fn derive_seed(base_seed: u64, stream: u64) -> u64 {
    let mut z = base_seed
        .wrapping_add(GOLDEN_GAMMA)
        .wrapping_add(stream.wrapping_mul(GOLDEN_GAMMA));
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}
