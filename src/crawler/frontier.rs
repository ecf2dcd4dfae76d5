//! Per-job crawl frontier
//!
//! The frontier owns a job's pending tasks, its visited set and its
//! discovery counter. Admission (dedup, depth, scope and cap checks plus
//! marking the URL visited) happens under one lock, so two workers can never
//! both admit the same link.
//!
//! Tasks are kept in one queue per depth and the shallowest non-empty queue
//! is always served first, which gives breadth-first discovery. The frontier
//! is exhausted once it is empty and no claimed task is still being worked.

use crate::url::{canonicalize, CrawlScope};
use std::collections::{HashSet, VecDeque};
use std::ops::Deref;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::trace;
use url::Url;

/// A URL waiting to be visited, with its link distance from the seed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTask {
    pub url: Url,
    pub depth: u32,
}

/// Outcome of offering a URL to the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Queued and marked visited
    Admitted,
    /// Already admitted earlier in this job
    Duplicate,
    /// Deeper than the job's maximum depth
    TooDeep,
    /// Host is outside the job's scope
    OutOfScope,
    /// The job's page cap is used up
    CapReached,
    /// Not a crawlable http(s) URL
    Invalid,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }
}

#[derive(Debug, Default)]
struct FrontierState {
    /// Pending tasks, indexed by depth
    levels: Vec<VecDeque<CrawlTask>>,
    queued: usize,
    visited: HashSet<String>,
    /// Slots held by queued, in-flight or persisted tasks
    admitted: usize,
    in_flight: usize,
    exhausted: bool,
}

impl FrontierState {
    fn pop_shallowest(&mut self) -> Option<CrawlTask> {
        let task = self
            .levels
            .iter_mut()
            .find(|level| !level.is_empty())
            .and_then(VecDeque::pop_front)?;
        self.queued -= 1;
        Some(task)
    }

    fn is_idle(&self) -> bool {
        self.queued == 0 && self.in_flight == 0
    }
}

/// Bounded, deduplicating work queue of one crawl job
pub struct Frontier {
    scope: CrawlScope,
    max_depth: u32,
    max_pages: usize,
    state: Mutex<FrontierState>,
    changed: Notify,
}

impl Frontier {
    /// Creates an empty frontier
    ///
    /// # Arguments
    ///
    /// * `scope` - Hosts this job may visit
    /// * `max_depth` - Deepest admissible task (seed is 0)
    /// * `max_pages` - Maximum number of tasks holding a slot at once
    pub fn new(scope: CrawlScope, max_depth: u32, max_pages: usize) -> Self {
        Self {
            scope,
            max_depth,
            max_pages,
            state: Mutex::new(FrontierState::default()),
            changed: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FrontierState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Offers a URL discovered at `depth`
    ///
    /// The URL is canonicalized first; dedup is on the canonical form. On
    /// admission the URL is marked visited immediately, before any fetch.
    pub fn push(&self, url: &Url, depth: u32) -> Admission {
        if depth > self.max_depth {
            return Admission::TooDeep;
        }

        let Ok(url) = canonicalize(url.clone()) else {
            return Admission::Invalid;
        };

        if !self.scope.contains(&url) {
            return Admission::OutOfScope;
        }

        let admission = {
            let mut state = self.lock();

            if state.visited.contains(url.as_str()) {
                Admission::Duplicate
            } else if state.admitted >= self.max_pages {
                Admission::CapReached
            } else {
                state.visited.insert(url.as_str().to_string());
                state.admitted += 1;

                let level = depth as usize;
                if state.levels.len() <= level {
                    state.levels.resize_with(level + 1, VecDeque::new);
                }
                state.levels[level].push_back(CrawlTask {
                    url: url.clone(),
                    depth,
                });
                state.queued += 1;
                Admission::Admitted
            }
        };

        trace!("push {} (depth {}): {:?}", url, depth, admission);

        if admission.is_admitted() {
            self.changed.notify_waiters();
        }
        admission
    }

    /// Takes the shallowest pending task, waiting while other workers may
    /// still produce more
    ///
    /// Returns None once the frontier is exhausted. The returned guard keeps
    /// the task counted as in flight until it is dropped.
    pub async fn pop(&self) -> Option<Claimed<'_>> {
        loop {
            let notified = {
                let mut state = self.lock();

                if state.exhausted {
                    return None;
                }

                if let Some(task) = state.pop_shallowest() {
                    state.in_flight += 1;
                    return Some(Claimed {
                        frontier: self,
                        task,
                    });
                }

                if state.in_flight == 0 {
                    state.exhausted = true;
                    drop(state);
                    self.changed.notify_waiters();
                    return None;
                }

                // Registered before the lock is released, so a wake-up sent
                // after our check cannot be missed.
                self.changed.notified()
            };

            notified.await;
        }
    }

    fn finish(&self) {
        {
            let mut state = self.lock();
            state.in_flight -= 1;
            if state.is_idle() {
                state.exhausted = true;
            }
        }

        self.changed.notify_waiters();
    }

    /// Gives back the slot of a task that ended without a persisted page
    pub fn release_slot(&self) {
        let mut state = self.lock();
        state.admitted = state.admitted.saturating_sub(1);
    }

    /// Slots currently held by queued, in-flight or persisted tasks
    #[cfg(test)]
    fn admitted(&self) -> usize {
        self.lock().admitted
    }

    /// Number of distinct URLs admitted over the job's lifetime
    pub fn visited_count(&self) -> usize {
        self.lock().visited.len()
    }

    #[cfg(test)]
    fn is_exhausted(&self) -> bool {
        self.lock().exhausted
    }

    pub fn scope(&self) -> &CrawlScope {
        &self.scope
    }
}

/// A task taken from the frontier and still in flight
///
/// Dropping the guard marks the task finished, on every exit path of the
/// worker that holds it.
pub struct Claimed<'a> {
    frontier: &'a Frontier,
    task: CrawlTask,
}

impl Deref for Claimed<'_> {
    type Target = CrawlTask;

    fn deref(&self) -> &CrawlTask {
        &self.task
    }
}

impl Drop for Claimed<'_> {
    fn drop(&mut self) {
        self.frontier.finish();
    }
}
