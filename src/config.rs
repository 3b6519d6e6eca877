use std::{env, str::FromStr};

use crate::{
    block::{CHUNK_SIZE, DSIZE, MIN_BLOCK_SIZE},
    utils::checked_align,
};

/// Default upper bound for heaps backed by [`crate::SystemMemory`].
pub const MAX_HEAP: usize = 20 * (1 << 20);

/// Largest chunk size that is still a multiple of the alignment unit.
const MAX_CHUNK_SIZE: usize = usize::MAX & !(DSIZE - 1);

/// Where the search for a free block starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FitPolicy {
    /// Resume from the block the previous placement left the cursor on and
    /// wrap around the list once.
    #[default]
    NextFit,
    /// Always scan from the head of the free list.
    FirstFit,
}

impl FromStr for FitPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "next" | "next-fit" | "nextfit" => Ok(Self::NextFit),
            "first" | "first-fit" | "firstfit" => Ok(Self::FirstFit),
            other => Err(format!("unknown fit policy `{other}`")),
        }
    }
}

/// Allocator tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    chunk_size: usize,
    /// Size of the reservation made by [`crate::SystemMemory`]. Ignored by
    /// other memory sources.
    pub max_heap: usize,
    pub fit_policy: FitPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            max_heap: MAX_HEAP,
            fit_policy: FitPolicy::NextFit,
        }
    }
}

impl Config {
    /// Minimum number of bytes the heap grows by when no free block fits.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Rounded up to the alignment unit, never below the minimum block size.
    /// Sizes too close to `usize::MAX` to be rounded up saturate.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size =
            checked_align(chunk_size.max(MIN_BLOCK_SIZE), DSIZE).unwrap_or(MAX_CHUNK_SIZE);
        self
    }

    pub fn with_max_heap(mut self, max_heap: usize) -> Self {
        self.max_heap = max_heap;
        self
    }

    pub fn with_fit_policy(mut self, fit_policy: FitPolicy) -> Self {
        self.fit_policy = fit_policy;
        self
    }

    /// Defaults overridden by `TAGALLOC_CHUNK_SIZE`, `TAGALLOC_MAX_HEAP` and
    /// `TAGALLOC_FIT`. Values that do not parse are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(chunk_size) = var::<usize>("TAGALLOC_CHUNK_SIZE") {
            config = config.with_chunk_size(chunk_size);
        }
        if let Some(max_heap) = var::<usize>("TAGALLOC_MAX_HEAP") {
            config = config.with_max_heap(max_heap);
        }
        if let Some(fit_policy) = var::<FitPolicy>("TAGALLOC_FIT") {
            config = config.with_fit_policy(fit_policy);
        }

        config
    }
}

fn var<T: FromStr>(name: &str) -> Option<T> {
    let value = env::var(name).ok()?;

    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            log::warn!("ignoring {name}={value:?}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::align;

    #[test]
    fn defaults() {
        let config = Config::default();

        assert_eq!(config.chunk_size(), 4096);
        assert_eq!(config.max_heap, 20 * 1024 * 1024);
        assert_eq!(config.fit_policy, FitPolicy::NextFit);
    }

    #[test]
    fn chunk_size_is_normalised() {
        assert_eq!(Config::default().with_chunk_size(1).chunk_size(), MIN_BLOCK_SIZE);
        assert_eq!(Config::default().with_chunk_size(1000).chunk_size(), align(1000, DSIZE));
        assert_eq!(Config::default().with_chunk_size(8192).chunk_size(), 8192);
    }

    #[test]
    fn huge_chunk_size_saturates() {
        let chunk_size = Config::default().with_chunk_size(usize::MAX).chunk_size();

        assert_eq!(chunk_size, MAX_CHUNK_SIZE);
        assert_eq!(chunk_size % DSIZE, 0);
        assert_eq!(
            Config::default().with_chunk_size(usize::MAX - DSIZE).chunk_size(),
            MAX_CHUNK_SIZE
        );
    }

    #[test]
    fn fit_policy_parses() {
        assert_eq!("next".parse(), Ok(FitPolicy::NextFit));
        assert_eq!(" First-Fit ".parse(), Ok(FitPolicy::FirstFit));
        assert!("best".parse::<FitPolicy>().is_err());
    }

    #[test]
    fn env_overrides() {
        // Only this test touches these variables.
        unsafe {
            env::set_var("TAGALLOC_CHUNK_SIZE", "100");
            env::set_var("TAGALLOC_MAX_HEAP", "not a number");
            env::set_var("TAGALLOC_FIT", "first");
        }

        let config = Config::from_env();

        unsafe {
            env::remove_var("TAGALLOC_CHUNK_SIZE");
            env::remove_var("TAGALLOC_MAX_HEAP");
            env::remove_var("TAGALLOC_FIT");
        }

        assert_eq!(config.chunk_size(), align(100, DSIZE));
        assert_eq!(config.max_heap, MAX_HEAP);
        assert_eq!(config.fit_policy, FitPolicy::FirstFit);

        unsafe { env::set_var("TAGALLOC_CHUNK_SIZE", usize::MAX.to_string()) };
        let config = Config::from_env();
        unsafe { env::remove_var("TAGALLOC_CHUNK_SIZE") };

        assert_eq!(config.chunk_size(), MAX_CHUNK_SIZE);
    }
}
