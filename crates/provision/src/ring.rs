//! Round-robin zone assignment.

/// Cycles deterministically through a fixed list of zone names.
///
/// Owned by the coordinator's sequential dispatch loop for a single
/// project; never shared with the concurrent creation tasks.
#[derive(Debug)]
pub struct ZoneRing {
    zones: Vec<String>,
    cursor: usize,
}

impl ZoneRing {
    /// Build a ring over `zones`. Returns `None` when the list is empty,
    /// since there is no fallback zone.
    #[must_use]
    pub fn new(zones: Vec<String>) -> Option<Self> {
        if zones.is_empty() {
            None
        } else {
            Some(Self { zones, cursor: 0 })
        }
    }

    /// Next zone in supplied order, wrapping to the first element after
    /// the last.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> &str {
        let index = self.cursor;
        self.cursor = (index + 1) % self.zones.len();
        &self.zones[index]
    }
}
