//! Generation counter for advisory cancellation of stale renders.
//!
//! The consumer owns the only [`GenerationCounter`] and advances it for every
//! new render request. Workers hold a [`Ticket`] and stop at their next
//! checkpoint once the counter has moved past the generation they captured.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub u64);

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Single-writer counter. Not `Clone`: only the owner can advance it.
#[derive(Debug, Default)]
pub struct GenerationCounter {
    value: Arc<AtomicU64>,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new generation and return it.
    pub fn advance(&mut self) -> Generation {
        Generation(self.value.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub fn current(&self) -> Generation {
        Generation(self.value.load(Ordering::Acquire))
    }

    pub fn reader(&self) -> GenerationReader {
        GenerationReader {
            value: Arc::clone(&self.value),
        }
    }

    /// Ticket for the current generation.
    pub fn ticket(&self) -> Ticket {
        Ticket {
            generation: self.current(),
            reader: self.reader(),
        }
    }
}

/// Read-only view of a [`GenerationCounter`].
#[derive(Debug, Clone)]
pub struct GenerationReader {
    value: Arc<AtomicU64>,
}

impl GenerationReader {
    pub fn current(&self) -> Generation {
        Generation(self.value.load(Ordering::Acquire))
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.current() == generation
    }
}

/// A generation captured at dispatch time.
#[derive(Debug, Clone)]
pub struct Ticket {
    generation: Generation,
    reader: GenerationReader,
}

impl Ticket {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// No newer request has been made since this ticket was issued.
    pub fn is_current(&self) -> bool {
        self.reader.is_current(self.generation)
    }
}
