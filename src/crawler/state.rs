//! Crawl lifecycle state.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a crawl. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum CrawlState {
    /// Built, seeds not yet submitted.
    Idle = 0,
    /// Workers active, depth ceiling not yet hit.
    Running = 1,
    /// Depth ceiling hit; no further descendants are admitted while the
    /// frontier drains.
    Draining = 2,
    /// Frontier exhausted or crawl cancelled. Terminal.
    Stopped = 3,
}

impl CrawlState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Draining,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Atomic, monotonic holder of a [`CrawlState`].
#[derive(Debug, Default)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn get(&self) -> CrawlState {
        CrawlState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves to `next` if it is later than the current state. Returns `true`
    /// if this call made the transition.
    pub(crate) fn advance(&self, next: CrawlState) -> bool {
        let previous = self.0.fetch_max(next as u8, Ordering::AcqRel);
        previous < next as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_idle() {
        assert_eq!(StateCell::default().get(), CrawlState::Idle);
    }

    #[test]
    fn test_advance_is_monotonic() {
        let state = StateCell::default();
        assert!(state.advance(CrawlState::Running));
        assert!(state.advance(CrawlState::Draining));
        assert!(!state.advance(CrawlState::Running));
        assert_eq!(state.get(), CrawlState::Draining);
        assert!(state.advance(CrawlState::Stopped));
        assert!(!state.advance(CrawlState::Stopped));
        assert_eq!(state.get(), CrawlState::Stopped);
    }

    #[test]
    fn test_running_may_skip_to_stopped() {
        let state = StateCell::default();
        state.advance(CrawlState::Running);
        assert!(state.advance(CrawlState::Stopped));
        assert!(!state.advance(CrawlState::Draining));
    }

    #[test]
    fn test_display() {
        assert_eq!(CrawlState::Draining.to_string(), "draining");
    }
}
