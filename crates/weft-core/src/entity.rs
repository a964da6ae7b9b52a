use std::sync::atomic::{AtomicU32, Ordering};

/// Stable numeric identity of a rendered element. Zero means "no identity".
///
/// An entity is unique within the union of the current and the immediately
/// prior render generation; the display side addresses elements by it.
pub type Entity = u32;

/// Upper bound on entity values live in one generation.
///
/// Handler storage is sized per entity, so unbounded growth here always
/// signals a caller bug rather than a big view.
pub const ENTITY_LIMIT: Entity = 10_240;

/// Issues entities for the generation being built.
///
/// Values advance by 2 from the seed, so a counter seeded with the
/// generation's parity (0 or 1) can never collide with the one that produced
/// the previous generation.
#[derive(Debug, Default)]
pub struct Counter(AtomicU32);

impl Counter {
    pub const fn new() -> Self {
        Counter(AtomicU32::new(0))
    }

    /// Returns the smallest unused entity for the active generation.
    pub fn mint(&self) -> Entity {
        let nt = self.0.fetch_add(2, Ordering::Relaxed).wrapping_add(2);
        assert!(nt >= 2, "entity counter overflow");
        nt
    }

    /// Restarts the counter on the given generation parity.
    pub fn reseed(&self, parity: u32) {
        self.0.store(parity & 1, Ordering::Relaxed);
    }
}
