//! Particle index → last-known face.
//!
//! Hints only: a stale entry costs a fallback search, never a wrong answer,
//! because every hit is re-validated against the query point.

use dashmap::DashMap;

/// Concurrent table of face hints keyed by particle index.
///
/// Sharded, so worker threads querying different particles rarely contend,
/// and an update from one thread never invalidates another thread's read.
#[derive(Debug, Default)]
pub struct ParticleLocator {
    faces: DashMap<usize, u32>,
}

impl ParticleLocator {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last face recorded for `particle`.
    #[inline]
    #[must_use]
    pub fn hint(&self, particle: usize) -> Option<usize> {
        self.faces.get(&particle).map(|f| *f as usize)
    }

    /// Record `face` as the current face of `particle`.
    #[allow(clippy::cast_possible_truncation)]
    // Truncation: face indices are u32 like vertex indices
    pub fn record(&self, particle: usize, face: usize) {
        self.faces.insert(particle, face as u32);
    }

    /// Forget `particle`; its next query searches from scratch.
    pub fn invalidate(&self, particle: usize) {
        self.faces.remove(&particle);
    }

    /// Number of particles with a hint.
    #[must_use]
    pub fn len(&self) -> usize {
        self.faces.len()
    }

    /// Whether no particle has a hint.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_invalidate() {
        let locator = ParticleLocator::new();
        assert_eq!(locator.hint(3), None);

        locator.record(3, 17);
        locator.record(3, 18);
        assert_eq!(locator.hint(3), Some(18));
        assert_eq!(locator.len(), 1);

        locator.invalidate(3);
        assert_eq!(locator.hint(3), None);
        assert!(locator.is_empty());

        // Unknown particle is a no-op
        locator.invalidate(99);
    }

    #[test]
    fn concurrent_writers_keep_their_own_entries() {
        let locator = ParticleLocator::new();
        std::thread::scope(|s| {
            for t in 0..4usize {
                let locator = &locator;
                s.spawn(move || {
                    for i in 0..500 {
                        let particle = t * 1000 + i;
                        locator.record(particle, i % 20);
                        assert_eq!(locator.hint(particle), Some(i % 20));
                    }
                });
            }
        });
        assert_eq!(locator.len(), 2000);
        assert_eq!(locator.hint(2_499), Some(499 % 20));
    }
}
