use core::hash::{BuildHasher, Hasher};

const FNV_OFFSET_BASIS: u32 = 2166136261;
const FNV_PRIME: u32 = 16777619;

/// 32-bit FNV-1a as computed by fastText.
///
/// Each byte is sign-extended before it is mixed in, so bytes above 0x7f hash
/// differently from a textbook FNV-1a. Subword buckets depend on this.
pub struct FastTextHasher {
    h: u32,
}

impl FastTextHasher {
    #[inline(always)]
    fn add(&mut self, b: u8) {
        self.h ^= b as i8 as i32 as u32;
        self.h = self.h.wrapping_mul(FNV_PRIME);
    }
}

impl Default for FastTextHasher {
    fn default() -> Self {
        Self {
            h: FNV_OFFSET_BASIS,
        }
    }
}

impl Hasher for FastTextHasher {
    #[inline(always)]
    fn finish(&self) -> u64 {
        u64::from(self.h)
    }

    #[inline(always)]
    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.add(b);
        }
    }

    #[inline(always)]
    fn write_u8(&mut self, i: u8) {
        self.add(i);
    }
}

#[derive(Clone, Copy, Default)]
pub struct FastTextHasherBuilder;

impl BuildHasher for FastTextHasherBuilder {
    type Hasher = FastTextHasher;

    #[inline(always)]
    fn build_hasher(&self) -> Self::Hasher {
        FastTextHasher::default()
    }
}

/// Hashes a token or character n-gram.
#[inline]
pub fn hash_bytes(bytes: &[u8]) -> u32 {
    let mut hasher = FastTextHasher::default();
    hasher.write(bytes);
    hasher.h
}

/// Natural logarithm with the small offset used for every reported log-probability.
#[inline(always)]
pub fn std_log(x: f32) -> f32 {
    (x + 1e-5).ln()
}
