//! Per-page render generations.
//!
//! Only the most recent render request for a page may commit its result.
//! Issuing a new request for a page cancels the token of the previous one, and
//! a completion is accepted only if its ticket still carries the latest
//! generation for that page. Completions can therefore arrive in any order.

use crate::cancel::CancellationToken;
use std::collections::HashMap;

/// Handle for one render request.
#[derive(Debug, Clone)]
pub struct RenderTicket {
    pub page: u32,
    pub generation: u64,
    token: CancellationToken,
}

impl RenderTicket {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Debug)]
struct InFlight {
    generation: u64,
    token: CancellationToken,
}

#[derive(Debug, Default)]
pub struct RenderTracker {
    next_generation: u64,
    in_flight: HashMap<u32, InFlight>,
}

impl RenderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new request for `page`, superseding any request in flight.
    pub fn begin(&mut self, page: u32) -> RenderTicket {
        self.next_generation += 1;
        let generation = self.next_generation;
        let token = CancellationToken::new();

        let previous =
            self.in_flight.insert(page, InFlight { generation, token: token.clone() });
        if let Some(previous) = previous {
            previous.token.cancel();
        }

        RenderTicket { page, generation, token }
    }

    /// Whether `ticket` is still the newest, uncancelled request for its page.
    pub fn is_current(&self, ticket: &RenderTicket) -> bool {
        !ticket.is_cancelled()
            && self
                .in_flight
                .get(&ticket.page)
                .is_some_and(|entry| entry.generation == ticket.generation)
    }

    /// Settles a ticket. Returns `true` when the caller may commit its result.
    pub fn finish(&mut self, ticket: &RenderTicket) -> bool {
        if !self.is_current(ticket) {
            return false;
        }

        self.in_flight.remove(&ticket.page);
        true
    }

    pub fn cancel_page(&mut self, page: u32) -> bool {
        match self.in_flight.remove(&page) {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels the requests in flight for every page `keep` rejects. Returns
    /// how many were cancelled.
    pub fn retain_pages(&mut self, mut keep: impl FnMut(u32) -> bool) -> usize {
        let mut cancelled = 0;
        self.in_flight.retain(|page, entry| {
            if keep(*page) {
                return true;
            }
            entry.token.cancel();
            cancelled += 1;
            false
        });
        cancelled
    }

    /// Cancels everything in flight. Returns how many requests were cancelled.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.in_flight.len();
        for (_, entry) in self.in_flight.drain() {
            entry.token.cancel();
        }
        count
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}
