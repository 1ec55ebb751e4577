use rand::{RngCore, SeedableRng};

/// Mulberry32: a small 32-bit generator with repeatable output per seed.
/// Question generation must be replayable from a stored seed, so the
/// generator is fixed here rather than borrowed from `rand`'s default
/// engines (which do not promise cross-version stream stability).
#[derive(Debug, Clone)]
pub struct Mulberry32 {
    state: u32,
}

impl Mulberry32 {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_add(0x6D2B_79F5);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        t ^ (t >> 14)
    }

    /// Uniform float in [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 / 16_777_216.0
    }

    /// Uniform pick in [lo, hi] (inclusive). `lo > hi` is treated as the
    /// single value `lo`.
    pub fn pick_in(&mut self, lo: u32, hi: u32) -> u32 {
        if hi <= lo {
            return lo;
        }
        let span = hi - lo + 1;
        lo + (self.next_f32() * span as f32) as u32
    }
}

impl RngCore for Mulberry32 {
    fn next_u32(&mut self) -> u32 {
        Mulberry32::next_u32(self)
    }

    fn next_u64(&mut self) -> u64 {
        let hi = Mulberry32::next_u32(self) as u64;
        let lo = Mulberry32::next_u32(self) as u64;
        (hi << 32) | lo
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let word = Mulberry32::next_u32(self).to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl SeedableRng for Mulberry32 {
    type Seed = [u8; 4];

    fn from_seed(seed: Self::Seed) -> Self {
        Self::new(u32::from_le_bytes(seed))
    }
}

/// Derive a nested seed so independent question instances drawn from one
/// top-level seed do not correlate.
pub fn derive_seed(seed: u32, offset: u32) -> u32 {
    seed.wrapping_mul(1000).wrapping_add(offset)
}

/// FNV-1a over the input string, for seeds derived from names and keys
/// (league bots, session signatures).
pub fn hash_seed(s: &str) -> u32 {
    let mut hash: u32 = 2_166_136_261;
    for byte in s.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16_777_619);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;

    mod mulberry_tests {
        use super::*;

        #[test]
        fn same_seed_same_stream() {
            let mut a = Mulberry32::new(12345);
            let mut b = Mulberry32::new(12345);
            for _ in 0..100 {
                assert_eq!(a.next_u32(), b.next_u32());
            }
        }

        #[test]
        fn different_seeds_diverge() {
            let mut a = Mulberry32::new(1);
            let mut b = Mulberry32::new(2);
            let a_vals: Vec<u32> = (0..8).map(|_| a.next_u32()).collect();
            let b_vals: Vec<u32> = (0..8).map(|_| b.next_u32()).collect();
            assert_ne!(a_vals, b_vals);
        }

        #[test]
        fn floats_stay_in_unit_interval() {
            let mut rng = Mulberry32::new(99);
            for _ in 0..1000 {
                let f = rng.next_f32();
                assert!((0.0..1.0).contains(&f), "out of range: {}", f);
            }
        }

        #[test]
        fn pick_in_respects_bounds() {
            let mut rng = Mulberry32::new(7);
            for _ in 0..500 {
                let v = rng.pick_in(3, 9);
                assert!((3..=9).contains(&v));
            }
        }

        #[test]
        fn pick_in_degenerate_range() {
            let mut rng = Mulberry32::new(7);
            assert_eq!(rng.pick_in(5, 5), 5);
            assert_eq!(rng.pick_in(9, 3), 9);
        }

        #[test]
        fn shuffle_is_deterministic() {
            let mut a = Mulberry32::new(42);
            let mut b = Mulberry32::new(42);
            let mut xs: Vec<u8> = (0..10).collect();
            let mut ys = xs.clone();
            xs.shuffle(&mut a);
            ys.shuffle(&mut b);
            assert_eq!(xs, ys);
        }

        #[test]
        fn seedable_roundtrip() {
            let mut a = Mulberry32::from_seed(77u32.to_le_bytes());
            let mut b = Mulberry32::new(77);
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    mod seed_derivation_tests {
        use super::*;

        #[test]
        fn derived_seeds_differ_per_offset() {
            assert_ne!(derive_seed(1, 0), derive_seed(1, 1));
            assert_ne!(derive_seed(1, 1), derive_seed(2, 1));
        }

        #[test]
        fn derive_seed_wraps_instead_of_panicking() {
            let _ = derive_seed(u32::MAX, u32::MAX);
        }

        #[test]
        fn hash_seed_stable_and_distinct() {
            assert_eq!(hash_seed("alpha"), hash_seed("alpha"));
            assert_ne!(hash_seed("alpha"), hash_seed("beta"));
            assert_ne!(hash_seed(""), hash_seed("a"));
        }
    }
}
