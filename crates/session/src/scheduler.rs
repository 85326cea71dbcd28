use std::time::{Duration, Instant};

/// Debounces snapshot writes: every mutation pushes the deadline back by `delay`.
#[derive(Debug, Clone)]
pub struct PersistScheduler {
    delay: Duration,
    dirty: bool,
    deadline: Option<Instant>,
}

impl PersistScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            dirty: false,
            deadline: None,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Records a mutation at `now`, replacing any earlier deadline.
    pub fn mark_dirty(&mut self, now: Instant) {
        self.dirty = true;
        self.deadline = Some(now + self.delay);
    }

    pub fn due(&self, now: Instant) -> bool {
        self.dirty && self.deadline.map_or(true, |deadline| now >= deadline)
    }

    /// Clears the pending write once it has been flushed.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
        self.deadline = None;
    }
}
