//! Termination Tracker
//!
//! - [`TerminationTracker`]: global end-of-stream count against the expected
//!   number of input connections, decides when the event loop drains
//! - [`ClassTermination`]: internal/external counters of the two-class
//!   variant, decides when each class's downstream marker fires

/// Global end-of-stream counter
#[derive(Debug, Clone)]
pub struct TerminationTracker {
    expected: usize,
    neos: usize,
}

impl TerminationTracker {
    pub fn new(expected: usize) -> Self {
        Self { expected, neos: 0 }
    }

    /// Count one end-of-stream marker
    ///
    /// Returns true once the expected count is reached.
    pub fn register(&mut self) -> bool {
        self.neos += 1;
        self.is_complete()
    }

    pub fn is_complete(&self) -> bool {
        self.neos >= self.expected
    }

    pub fn received(&self) -> usize {
        self.neos
    }

    pub fn expected(&self) -> usize {
        self.expected
    }
}

/// Which class just finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassTerminated {
    Internal,
    External,
}

/// Per-class termination counting
///
/// Class totals are the number of connections ever classified as that class,
/// a retired connection stays counted. Each class fires at most once.
#[derive(Debug, Clone, Default)]
pub struct ClassTermination {
    internal_connections: usize,
    external_connections: usize,
    internal_eos: usize,
    external_eos: usize,
    internal_fired: bool,
    external_fired: bool,
}

impl ClassTermination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a handshake classification
    pub fn classified(&mut self, internal: bool) {
        if internal {
            self.internal_connections += 1;
        } else {
            self.external_connections += 1;
        }
    }

    /// Record an end-of-stream marker from a connection of the given class
    pub fn end_of_stream(&mut self, internal: bool) -> Option<ClassTerminated> {
        if internal {
            self.internal_eos += 1;
            if !self.internal_fired && self.internal_eos >= self.internal_connections {
                self.internal_fired = true;
                return Some(ClassTerminated::Internal);
            }
        } else {
            self.external_eos += 1;
            if !self.external_fired && self.external_eos >= self.external_connections {
                self.external_fired = true;
                return Some(ClassTerminated::External);
            }
        }
        None
    }

    pub fn internal_connections(&self) -> usize {
        self.internal_connections
    }

    pub fn external_connections(&self) -> usize {
        self.external_connections
    }
}
