//! In-memory deduplicating, delay-aware, rate-limited work queue.
//!
//! All state (ready queue, dirty set, processing set, delayed entries and
//! the rate limiter) sits behind one `parking_lot::Mutex`. Two condition
//! variables hang off it: one wakes consumers blocked in [`WorkQueue::get`],
//! the other wakes the delay thread when an earlier fire time is scheduled.
//!
//! Invariant: an item is in `queue` iff it is in `dirty` and not in
//! `processing`. An item re-added while being processed stays only in
//! `dirty` and moves to `queue` on [`WorkQueue::done`].

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::debug;

use crate::core::EngineError;
use crate::infra::queue::rate_limiter::RateLimiter;

/// Longest delay honored by [`WorkQueue::add_after`]. Longer delays are
/// clamped to it.
pub const MAX_SCHEDULE_DELAY: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Fire time for an entry added at `now` with `delay`, clamped so that it
/// never overflows `Instant`.
fn ready_at(now: Instant, delay: Duration) -> Instant {
    let delay = delay.min(MAX_SCHEDULE_DELAY);
    now.checked_add(delay)
        .or_else(|| now.checked_add(delay / 2))
        .unwrap_or(now)
}

/// Bound for items that can be queued.
pub trait QueueItem: Eq + Hash + Clone + Send + 'static {}

impl<T> QueueItem for T where T: Eq + Hash + Clone + Send + 'static {}

/// Entry waiting for its fire time. Ordered by fire time, then insertion order.
struct Delayed<T> {
    ready_at: Instant,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Delayed<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ready_at == other.ready_at && self.seq == other.seq
    }
}

impl<T> Eq for Delayed<T> {}

impl<T> PartialOrd for Delayed<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Delayed<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ready_at
            .cmp(&other.ready_at)
            .then(self.seq.cmp(&other.seq))
    }
}

struct State<T> {
    queue: VecDeque<T>,
    dirty: HashSet<T>,
    processing: HashSet<T>,
    /// Min-heap of delayed entries. May hold stale entries superseded by an
    /// earlier fire time; `waiting_for` is authoritative.
    waiting: BinaryHeap<Reverse<Delayed<T>>>,
    waiting_for: HashMap<T, Instant>,
    next_seq: u64,
    limiter: Box<dyn RateLimiter<T>>,
    shutting_down: bool,
}

impl<T: QueueItem> State<T> {
    /// Returns true if the item became ready for a consumer.
    fn insert(&mut self, item: T) -> bool {
        if self.shutting_down || self.dirty.contains(&item) {
            return false;
        }
        self.dirty.insert(item.clone());
        if self.processing.contains(&item) {
            return false;
        }
        self.queue.push_back(item);
        true
    }

    /// Returns true if the delay thread must recompute its deadline.
    fn schedule(&mut self, item: T, ready_at: Instant) -> bool {
        if self.waiting_for.get(&item).is_some_and(|at| *at <= ready_at) {
            return false;
        }
        self.waiting_for.insert(item.clone(), ready_at);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.waiting.push(Reverse(Delayed { ready_at, seq, item }));
        true
    }

    /// Move every due entry into the ready queue. Returns how many became ready.
    fn fire_due(&mut self, now: Instant) -> usize {
        let mut fired = 0;
        while self
            .waiting
            .peek()
            .is_some_and(|Reverse(head)| head.ready_at <= now)
        {
            let Some(Reverse(entry)) = self.waiting.pop() else {
                break;
            };
            if self.waiting_for.get(&entry.item) != Some(&entry.ready_at) {
                continue;
            }
            self.waiting_for.remove(&entry.item);
            if self.insert(entry.item) {
                fired += 1;
            }
        }
        fired
    }

    fn next_ready_at(&self) -> Option<Instant> {
        self.waiting.peek().map(|Reverse(head)| head.ready_at)
    }
}

struct Shared<T> {
    state: Mutex<State<T>>,
    /// Signaled when an item enters `queue` or on shutdown.
    ready: Condvar,
    /// Signaled when an earlier delayed entry is scheduled or on shutdown.
    timer: Condvar,
}

impl<T: QueueItem> Shared<T> {
    fn notify_ready(&self, count: usize) {
        match count {
            0 => {}
            1 => {
                self.ready.notify_one();
            }
            _ => {
                self.ready.notify_all();
            }
        }
    }

    fn add_after_locked(&self, state: &mut MutexGuard<'_, State<T>>, item: T, delay: Duration) {
        if state.shutting_down {
            return;
        }
        if delay.is_zero() {
            if state.insert(item) {
                self.ready.notify_one();
            }
            return;
        }
        let ready_at = ready_at(Instant::now(), delay);
        if state.schedule(item, ready_at) {
            self.timer.notify_one();
        }
    }

    /// Body of the delay thread. Exits once the queue shuts down.
    fn run_delay_loop(&self) {
        let mut state = self.state.lock();
        while !state.shutting_down {
            let fired = state.fire_due(Instant::now());
            self.notify_ready(fired);
            match state.next_ready_at() {
                Some(at) => {
                    self.timer.wait_until(&mut state, at);
                }
                None => self.timer.wait(&mut state),
            }
        }
    }
}

/// Deduplicating work queue with delayed and rate-limited insertion.
///
/// At most one occurrence of an item is queued or in flight at any time.
/// Consumers pair every [`get`](Self::get) with a [`done`](Self::done).
pub struct WorkQueue<T: QueueItem> {
    name: String,
    shared: Arc<Shared<T>>,
}

impl<T: QueueItem> WorkQueue<T> {
    /// Create a queue and start its delay thread (`<name>-delay`).
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Spawn` if the delay thread cannot be started.
    pub fn new(
        name: impl Into<String>,
        limiter: impl RateLimiter<T> + 'static,
    ) -> Result<Self, EngineError> {
        let name = name.into();
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                waiting: BinaryHeap::new(),
                waiting_for: HashMap::new(),
                next_seq: 0,
                limiter: Box::new(limiter),
                shutting_down: false,
            }),
            ready: Condvar::new(),
            timer: Condvar::new(),
        });

        let thread_name = format!("{name}-delay");
        let delay_shared = Arc::clone(&shared);
        thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || delay_shared.run_delay_loop())
            .map_err(|source| EngineError::Spawn {
                name: thread_name,
                source,
            })?;

        debug!(queue = %name, "work queue started");
        Ok(Self { name, shared })
    }

    /// Queue name, used in thread names and logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mark `item` as needing processing. No-op if it is already pending
    /// or the queue is shutting down.
    pub fn add(&self, item: T) {
        let mut state = self.shared.state.lock();
        if state.insert(item) {
            self.shared.ready.notify_one();
        }
    }

    /// Add `item` once `delay` has elapsed. A zero delay adds immediately.
    ///
    /// If the item is already scheduled to fire earlier, this call is dropped;
    /// if it is scheduled later, the earlier time wins.
    pub fn add_after(&self, item: T, delay: Duration) {
        let mut state = self.shared.state.lock();
        self.shared.add_after_locked(&mut state, item, delay);
    }

    /// Add `item` after the delay its failure history calls for, and record
    /// one more failure.
    pub fn add_rate_limited(&self, item: T) {
        let mut state = self.shared.state.lock();
        if state.shutting_down {
            return;
        }
        let delay = state.limiter.when(&item);
        self.shared.add_after_locked(&mut state, item, delay);
    }

    /// Block until an item is ready, then check it out for processing.
    ///
    /// Returns `None` once the queue has shut down and drained.
    pub fn get(&self) -> Option<T> {
        let mut state = self.shared.state.lock();
        while state.queue.is_empty() && !state.shutting_down {
            self.shared.ready.wait(&mut state);
        }
        let item = state.queue.pop_front()?;
        state.processing.insert(item.clone());
        state.dirty.remove(&item);
        Some(item)
    }

    /// Finish processing `item`. If it was re-added meanwhile it is queued again.
    pub fn done(&self, item: &T) {
        let mut state = self.shared.state.lock();
        state.processing.remove(item);
        if state.dirty.contains(item) {
            state.queue.push_back(item.clone());
            self.shared.ready.notify_one();
        }
    }

    /// Reset the failure history of `item`.
    pub fn forget(&self, item: &T) {
        self.shared.state.lock().limiter.forget(item);
    }

    /// Failures recorded for `item` since it was last forgotten.
    #[must_use]
    pub fn num_requeues(&self, item: &T) -> u32 {
        self.shared.state.lock().limiter.num_requeues(item)
    }

    /// Stop accepting items. Blocked consumers drain what is left, then
    /// receive `None`. Delayed entries are discarded.
    pub fn shut_down(&self) {
        let mut state = self.shared.state.lock();
        if state.shutting_down {
            return;
        }
        state.shutting_down = true;
        state.waiting.clear();
        state.waiting_for.clear();
        drop(state);
        self.shared.ready.notify_all();
        self.shared.timer.notify_all();
        debug!(queue = %self.name, "work queue shutting down");
    }

    /// Whether [`shut_down`](Self::shut_down) has been called.
    #[must_use]
    pub fn shutting_down(&self) -> bool {
        self.shared.state.lock().shutting_down
    }

    /// Number of items ready for a consumer. Excludes in-flight and delayed items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Whether no item is ready for a consumer.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of items currently checked out by consumers.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.shared.state.lock().processing.len()
    }
}

impl<T: QueueItem> Drop for WorkQueue<T> {
    fn drop(&mut self) {
        self.shut_down();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::queue::rate_limiter::ItemExponentialFailureRateLimiter;

    fn queue() -> WorkQueue<String> {
        WorkQueue::new(
            "test",
            ItemExponentialFailureRateLimiter::new(
                Duration::from_millis(1),
                Duration::from_millis(50),
            ),
        )
        .unwrap()
    }

    #[test]
    fn test_add_dedups_while_queued() {
        let q = queue();
        q.add("ns/a".to_string());
        q.add("ns/a".to_string());
        assert_eq!(q.len(), 1);
        assert_eq!(q.get().as_deref(), Some("ns/a"));
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn test_fifo_between_distinct_items() {
        let q = queue();
        for key in ["a", "b", "c"] {
            q.add(key.to_string());
        }
        let drained: Vec<_> = (0..3).filter_map(|_| q.get()).collect();
        assert_eq!(drained, ["a", "b", "c"]);
    }

    #[test]
    fn test_readd_during_processing_requeues_once_on_done() {
        let q = queue();
        q.add("a".to_string());
        let item = q.get().unwrap();

        q.add("a".to_string());
        q.add("a".to_string());
        assert_eq!(q.len(), 0, "in-flight item must not be queued twice");

        q.done(&item);
        assert_eq!(q.len(), 1);
        let again = q.get().unwrap();
        q.done(&again);
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn test_zero_delay_is_immediate() {
        let q = queue();
        q.add_after("c".to_string(), Duration::ZERO);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_delay_lower_bound() {
        let q = queue();
        let start = Instant::now();
        q.add_after("d".to_string(), Duration::from_millis(50));
        assert_eq!(q.len(), 0);
        assert_eq!(q.get().as_deref(), Some("d"));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_earliest_schedule_wins() {
        let q = queue();
        q.add_after("e".to_string(), Duration::from_secs(60));
        q.add_after("e".to_string(), Duration::from_millis(10));
        q.add_after("e".to_string(), Duration::from_secs(30));
        assert_eq!(q.get().as_deref(), Some("e"));
        let state = q.shared.state.lock();
        assert!(state.waiting_for.is_empty());
        assert!(state.queue.is_empty());
    }

    #[test]
    fn test_unbounded_delay_is_clamped() {
        let q = queue();
        q.add_after("far".to_string(), Duration::MAX);
        assert_eq!(q.len(), 0);
        let state = q.shared.state.lock();
        let at = state.waiting_for.get("far").copied().unwrap();
        assert!(at <= Instant::now() + MAX_SCHEDULE_DELAY);
    }

    #[test]
    fn test_backoff_at_uncapped_limit_does_not_panic() {
        let q = WorkQueue::new(
            "uncapped",
            ItemExponentialFailureRateLimiter::new(
                Duration::from_millis(5),
                Duration::from_secs(u64::MAX),
            ),
        )
        .unwrap();
        for _ in 0..40 {
            q.add_rate_limited("slow".to_string());
        }
        assert_eq!(q.num_requeues(&"slow".to_string()), 40);
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn test_forget_resets_backoff() {
        let q = queue();
        q.add_rate_limited("f".to_string());
        q.add_rate_limited("f".to_string());
        assert_eq!(q.num_requeues(&"f".to_string()), 2);
        q.forget(&"f".to_string());
        assert_eq!(q.num_requeues(&"f".to_string()), 0);
    }

    #[test]
    fn test_shutdown_drains_then_reports_none() {
        let q = queue();
        q.add("a".to_string());
        q.add("b".to_string());
        q.shut_down();
        assert!(q.shutting_down());
        q.add("c".to_string());
        q.add_after("d".to_string(), Duration::from_millis(1));
        q.add_rate_limited("e".to_string());
        assert_eq!(q.get().as_deref(), Some("a"));
        assert_eq!(q.get().as_deref(), Some("b"));
        assert_eq!(q.get(), None);
    }

    #[test]
    fn test_shutdown_wakes_blocked_consumer() {
        let q = Arc::new(queue());
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.get())
        };
        thread::sleep(Duration::from_millis(20));
        q.shut_down();
        assert_eq!(consumer.join().unwrap(), None);
    }
}
