use std::time::{Duration, Instant};

/// Tracks the pacing state of one host within a crawl job
///
/// Slots are handed out in reservation order, each at least the configured
/// interval after the previous one. A reservation is never refused.
#[derive(Debug, Clone, Default)]
pub struct HostState {
    /// Number of request slots granted to this host
    pub request_count: u32,

    /// Earliest instant the next request to this host may start
    pub next_slot: Option<Instant>,
}

impl HostState {
    /// Creates a new HostState with no history
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the next request slot for this host
    ///
    /// # Arguments
    ///
    /// * `now` - The current time instant
    /// * `interval` - Minimum spacing between two requests to this host
    ///
    /// # Returns
    ///
    /// The instant at which the caller may issue its request. This is `now`
    /// when the host is idle.
    pub fn reserve(&mut self, now: Instant, interval: Duration) -> Instant {
        let slot = match self.next_slot {
            Some(next) if next > now => next,
            _ => now,
        };

        self.next_slot = Some(slot + interval);
        self.request_count += 1;
        slot
    }
}
