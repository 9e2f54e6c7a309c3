//! Generation-stamped visited set for graph traversal.
//!
//! Each slot stores the generation in which it was last marked; `clear()` bumps
//! the generation instead of zeroing the slots, so a reused set costs nothing to reset.

/// Visited marks indexed by internal node ID.
///
/// A `u16` generation means the backing array is only zeroed once every 65534 clears.
#[derive(Debug)]
pub struct VisitedSet {
    marks: Vec<u16>,
    generation: u16,
}

impl VisitedSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            marks: vec![0u16; capacity],
            generation: 1,
        }
    }

    /// Forget every mark.
    pub fn clear(&mut self) {
        if self.generation == u16::MAX {
            self.marks.fill(0);
            self.generation = 1;
        } else {
            self.generation += 1;
        }
    }

    /// Grow to cover node IDs below `cap`. Never shrinks.
    pub fn ensure_capacity(&mut self, cap: usize) {
        if cap > self.marks.len() {
            self.marks.resize(cap, 0);
        }
    }

    /// Marks `id`; returns `true` if it was not already marked this generation.
    #[inline]
    pub fn insert(&mut self, id: u32) -> bool {
        let slot = &mut self.marks[id as usize];
        if *slot == self.generation {
            false
        } else {
            *slot = self.generation;
            true
        }
    }

    #[inline]
    pub fn contains(&self, id: u32) -> bool {
        self.marks
            .get(id as usize)
            .is_some_and(|&g| g == self.generation)
    }
}

impl Default for VisitedSet {
    fn default() -> Self {
        Self::new(0)
    }
}
