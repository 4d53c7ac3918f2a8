//! TTL cache for the system settings row
//!
//! Owned by the [`PolicyGate`](super::PolicyGate) instead of being a global, so
//! the admin write path can invalidate it synchronously. The cache is per
//! process: other instances only see a change once their own TTL lapses.
//!
//! Every invalidation bumps a generation. A reader that loaded the row under
//! an older generation may not store it, so a load racing an admin write can
//! never put the pre-write row back.

use cached::{Cached, TimedCache};
use std::sync::Mutex;

use super::SystemSettings;

/// Default TTL in seconds
pub const TTL_SECONDS: u64 = 5;

struct Inner {
    entry: TimedCache<(), SystemSettings>,
    generation: u64,
}

pub struct SettingsCache {
    inner: Mutex<Inner>,
}

impl SettingsCache {
    /// A TTL of zero disables caching
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entry: TimedCache::with_lifespan(ttl_secs),
                generation: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn get(&self) -> Option<SystemSettings> {
        self.lock().entry.cache_get(&()).cloned()
    }

    /// Take before reading the store; hand back to [`put_if_current`](Self::put_if_current)
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Store a row loaded under `generation`. Returns false, storing nothing,
    /// if the cache was invalidated since.
    pub fn put_if_current(&self, settings: SystemSettings, generation: u64) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            return false;
        }
        inner.entry.cache_set((), settings);
        true
    }

    pub fn invalidate(&self) {
        let mut inner = self.lock();
        inner.generation = inner.generation.wrapping_add(1);
        inner.entry.cache_clear();
        tracing::debug!(generation = inner.generation, "[cache] System settings invalidated");
    }
}

impl Default for SettingsCache {
    fn default() -> Self {
        Self::new(TTL_SECONDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_invalidate() {
        let cache = SettingsCache::default();
        assert!(cache.get().is_none());

        let settings = SystemSettings {
            transactions_blocked: true,
            ..SystemSettings::default()
        };
        assert!(cache.put_if_current(settings.clone(), cache.generation()));
        assert_eq!(cache.get(), Some(settings));

        cache.invalidate();
        assert!(cache.get().is_none());
    }

    #[test]
    fn test_load_from_before_invalidate_is_dropped() {
        let cache = SettingsCache::default();
        let seen = cache.generation();

        cache.invalidate();
        assert!(!cache.put_if_current(SystemSettings::default(), seen));
        assert!(cache.get().is_none());

        assert!(cache.put_if_current(SystemSettings::default(), cache.generation()));
        assert!(cache.get().is_some());
    }

    #[test]
    fn test_zero_ttl_never_hits() {
        let cache = SettingsCache::new(0);
        cache.put_if_current(SystemSettings::default(), cache.generation());
        assert!(cache.get().is_none());
    }
}
