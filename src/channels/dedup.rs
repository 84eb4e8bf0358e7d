//! Suppression of repeated notifications
//!
//! The backend may broadcast the same order event more than once. Each event
//! is keyed by `event-order_id-arrival_id`; a key already seen is dropped.
//! The seen set is wiped every `window`, so a long-running channel does not
//! grow without bound.

use super::NotificationEvent;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub struct DedupFilter {
    window: Duration,
    seen: HashSet<String>,
    cleared_at: Instant,
}

impl DedupFilter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashSet::new(),
            cleared_at: Instant::now(),
        }
    }

    /// Whether the event should be delivered
    pub fn admit(&mut self, event: &NotificationEvent) -> bool {
        let now = Instant::now();
        if now.duration_since(self.cleared_at) >= self.window {
            self.seen.clear();
            self.cleared_at = now;
        }

        match event.dedup_key() {
            Some(key) => self.seen.insert(key),
            None => true,
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
