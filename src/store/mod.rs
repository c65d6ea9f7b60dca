//! Persisted Stores
//!
//! The global leaderboard and the tag registry. Both are plain owned
//! objects; the server wraps them in [`Stores`] and hands that to the
//! connection handlers, which take the lock for the length of one request.

pub mod leaderboard;
pub mod tags;

use std::path::PathBuf;

use thiserror::Error;
use tokio::sync::Mutex;

pub use leaderboard::{Leaderboard, MAX_LEADERBOARD_ENTRIES};
pub use tags::{Registration, TagEntry, TagRegistry, MAX_TAGS};

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// File access failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON did not parse.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Schema version not understood.
    #[error("unsupported store version {0}")]
    Version(u32),

    /// Legacy binary file unreadable.
    #[error("legacy format: {0}")]
    Legacy(&'static str),

    /// Capacity reached.
    #[error("store full")]
    Full,

    /// No such key.
    #[error("not found")]
    NotFound,
}

/// Both stores, each behind its own lock.
#[derive(Debug, Default)]
pub struct Stores {
    /// Global leaderboard.
    pub leaderboard: Mutex<Leaderboard>,
    /// Tag registry.
    pub tags: Mutex<TagRegistry>,
}

impl Stores {
    /// Wrap already loaded stores.
    pub fn new(leaderboard: Leaderboard, tags: TagRegistry) -> Self {
        Self { leaderboard: Mutex::new(leaderboard), tags: Mutex::new(tags) }
    }

    /// Load both stores from disk.
    pub fn load(leaderboard: impl Into<PathBuf>, tags: impl Into<PathBuf>) -> Self {
        Self::new(Leaderboard::load(leaderboard), TagRegistry::load(tags))
    }
}
