/// Crawl session lifecycle
///
/// This module defines the phases a crawl session moves through.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current phase of a crawl session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlPhase {
    /// The frontier is being populated from the seed or a checkpoint
    Seeding,

    /// Workers are popping, fetching and parsing entries
    Draining,

    /// A stop was requested; unfinished entries were checkpointed for resume
    Stopped,

    /// The frontier is empty and every entry reached a final state
    Done,
}

impl CrawlPhase {
    /// Returns true if no further work happens in this session
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Done)
    }

    /// Returns true if moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: CrawlPhase) -> bool {
        matches!(
            (self, next),
            (Self::Seeding, Self::Draining)
                | (Self::Draining, Self::Done)
                | (Self::Draining, Self::Stopped)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seeding => "seeding",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
