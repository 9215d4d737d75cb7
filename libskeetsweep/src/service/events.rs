//! Progress events for fetch, analysis and deletion
//!
//! The library reports progress through [`ProgressObserver`]. [`EventBus`]
//! is the observer the service uses: it fans events out over a
//! `tokio::sync::broadcast` channel, so a slow progress bar drops old
//! events instead of stalling deletions.
//!
//! # Example
//!
//! ```no_run
//! use libskeetsweep::service::events::{Event, EventBus};
//!
//! # async fn example() {
//! let event_bus = EventBus::new(100);
//! let mut receiver = event_bus.subscribe();
//!
//! event_bus.emit(Event::DeletionProgress {
//!     completed: 200,
//!     total: 450,
//!     percent: 44,
//! });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {:?}", event);
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::Collection;

/// Event receiver type alias
pub type EventReceiver = broadcast::Receiver<Event>;

/// Event bus for distributing progress events
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// `capacity` events are buffered per subscriber; a subscriber that
    /// falls further behind sees `RecvError::Lagged`.
    ///
    /// ```
    /// use libskeetsweep::service::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events emitted after this call
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Never blocks. Events are dropped when nobody is listening.
    pub fn emit(&self, event: Event) {
        // send() only fails when there are no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Events emitted during a sweep
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A page of a collection was fetched
    FetchProgress {
        collection: Collection,
        /// Items fetched so far, across all pages
        fetched: usize,
    },

    /// Classification finished
    AnalysisCompleted {
        collection: Collection,
        total: usize,
        to_delete: usize,
    },

    /// Deletion advanced
    DeletionProgress {
        completed: usize,
        total: usize,
        /// Whole-number percentage of `total`
        percent: u8,
    },

    /// A record (or a whole batch) could not be deleted
    DeletionFailed {
        uri: String,
        error: String,
    },

    /// The deletion run finished
    SweepCompleted {
        collection: Collection,
        succeeded: usize,
        failed: usize,
    },
}

/// Receives progress callbacks from the fetcher and the deleter
///
/// Every method has a no-op default so observers only implement what they
/// display.
pub trait ProgressObserver: Send + Sync {
    /// Called after each page with the running item count
    fn fetched(&self, _collection: Collection, _count: usize) {}

    /// Called after each item (single mode) or batch (batch mode)
    fn deleted(&self, _completed: usize, _total: usize) {}

    /// Called for every record that could not be deleted
    fn delete_failed(&self, _uri: &str, _error: &str) {}
}

/// Observer that ignores all progress
impl ProgressObserver for () {}

/// Whole-number share of `completed` in `total`, capped at 100
pub fn percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (completed.min(total) * 100 / total) as u8
}

impl ProgressObserver for EventBus {
    fn fetched(&self, collection: Collection, count: usize) {
        self.emit(Event::FetchProgress {
            collection,
            fetched: count,
        });
    }

    fn deleted(&self, completed: usize, total: usize) {
        self.emit(Event::DeletionProgress {
            completed,
            total,
            percent: percent(completed, total),
        });
    }

    fn delete_failed(&self, uri: &str, error: &str) {
        self.emit(Event::DeletionFailed {
            uri: uri.to_string(),
            error: error.to_string(),
        });
    }
}
