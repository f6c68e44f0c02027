use std::fmt;

/// Locator of one row of a [`StateTable`](super::StateTable).
///
/// Owns no data. The index stays usable for as long as the writer has not
/// advanced a full buffer length past it.
#[derive(Debug, Clone, Copy)]
pub struct StateIndex {
    position: usize,
    ticks: u64,
    length: usize,
}

impl StateIndex {
    pub(crate) fn new(position: usize, ticks: u64, length: usize) -> Self {
        Self {
            position,
            ticks,
            length,
        }
    }

    /// Row of the circular buffer
    pub fn position(&self) -> usize {
        self.position
    }

    /// Tick at which the row was written
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Buffer length of the table the index was taken from
    pub fn length(&self) -> usize {
        self.length
    }

    /// True while `now - ticks < length`
    pub fn is_valid_at(&self, now: u64) -> bool {
        now >= self.ticks && now - self.ticks < self.length as u64
    }
}

impl PartialEq for StateIndex {
    fn eq(&self, other: &Self) -> bool {
        self.ticks == other.ticks && self.position == other.position
    }
}

impl Eq for StateIndex {}

impl fmt::Display for StateIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tick {} @ row {}/{}", self.ticks, self.position, self.length)
    }
}
