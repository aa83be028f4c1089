//! Futex-style wait/notify on 32-bit words of a shared buffer.
//!
//! Waiters are parked in a fixed table of buckets, hashed by byte address.
//! Each bucket is a `Mutex`-protected FIFO queue plus a `Condvar`. `wait`
//! compares the word against the expected value while holding the bucket
//! lock, so a `notify` issued after a store to the word can never slip in
//! between the comparison and the park.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

const BUCKET_COUNT: usize = 64;

/// Result of a futex wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The caller blocked and was woken by a notify.
    Woken,
    /// The word did not hold the expected value; the caller never blocked.
    NotEqual,
    /// The timeout elapsed before a notify arrived.
    TimedOut,
}

impl WaitOutcome {
    /// Numeric status: `0` woken, `1` not-equal, `-1` timed out.
    pub fn code(self) -> i32 {
        match self {
            Self::Woken => 0,
            Self::NotEqual => 1,
            Self::TimedOut => -1,
        }
    }
}

struct Waiter {
    addr: usize,
    ticket: u64,
    woken: bool,
}

#[derive(Default)]
struct WaitQueue {
    waiters: Vec<Waiter>,
    next_ticket: u64,
}

impl WaitQueue {
    fn take(&mut self, ticket: u64) -> Option<Waiter> {
        let pos = self.waiters.iter().position(|w| w.ticket == ticket)?;
        Some(self.waiters.remove(pos))
    }

    fn is_woken(&self, ticket: u64) -> bool {
        self.waiters
            .iter()
            .any(|w| w.ticket == ticket && w.woken)
    }
}

#[derive(Default)]
struct Bucket {
    queue: Mutex<WaitQueue>,
    wakeup: Condvar,
}

impl Bucket {
    fn lock(&self) -> MutexGuard<'_, WaitQueue> {
        // A panic while holding the lock cannot leave the queue torn: every
        // mutation is a single push/remove/flag write.
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Parking table for threads blocked on words of one buffer.
pub(crate) struct WaitTable {
    buckets: Box<[Bucket]>,
}

impl WaitTable {
    pub(crate) fn new() -> Self {
        Self {
            buckets: (0..BUCKET_COUNT).map(|_| Bucket::default()).collect(),
        }
    }

    fn bucket(&self, addr: usize) -> &Bucket {
        &self.buckets[(addr >> 2) % BUCKET_COUNT]
    }

    /// Block until `word` (at absolute byte `addr`) is notified, unless it
    /// no longer holds `expected` or `timeout` elapses first.
    pub(crate) fn wait(
        &self,
        addr: usize,
        word: &AtomicU32,
        expected: u32,
        timeout: Option<Duration>,
    ) -> WaitOutcome {
        let bucket = self.bucket(addr);
        let mut queue = bucket.lock();
        if word.load(Ordering::SeqCst) != expected {
            return WaitOutcome::NotEqual;
        }

        let ticket = queue.next_ticket;
        queue.next_ticket += 1;
        queue.waiters.push(Waiter {
            addr,
            ticket,
            woken: false,
        });

        // An unrepresentable deadline is as good as no deadline.
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        loop {
            if queue.is_woken(ticket) {
                queue.take(ticket);
                return WaitOutcome::Woken;
            }
            match deadline {
                None => {
                    queue = bucket
                        .wakeup
                        .wait(queue)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        queue.take(ticket);
                        return WaitOutcome::TimedOut;
                    }
                    let (guard, _) = bucket
                        .wakeup
                        .wait_timeout(queue, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    queue = guard;
                }
            }
        }
    }

    /// Wake up to `count` waiters (all if `None`) parked on `addr`, oldest
    /// first. Returns the number woken.
    pub(crate) fn notify(&self, addr: usize, count: Option<u32>) -> u32 {
        let limit = count.unwrap_or(u32::MAX);
        let bucket = self.bucket(addr);
        let mut queue = bucket.lock();
        let mut woken = 0u32;
        for waiter in queue
            .waiters
            .iter_mut()
            .filter(|w| w.addr == addr && !w.woken)
        {
            if woken == limit {
                break;
            }
            waiter.woken = true;
            woken += 1;
        }
        drop(queue);
        if woken > 0 {
            // Buckets are shared by unrelated addresses; the ticket check
            // in `wait` sends the others back to sleep.
            bucket.wakeup.notify_all();
        }
        log::trace!("futex notify at byte {addr}: woke {woken}");
        woken
    }

    /// Number of threads currently parked on `addr`.
    pub(crate) fn waiter_count(&self, addr: usize) -> usize {
        self.bucket(addr)
            .lock()
            .waiters
            .iter()
            .filter(|w| w.addr == addr && !w.woken)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn outcome_codes() {
        assert_eq!(WaitOutcome::Woken.code(), 0);
        assert_eq!(WaitOutcome::NotEqual.code(), 1);
        assert_eq!(WaitOutcome::TimedOut.code(), -1);
    }

    #[test]
    fn wait_returns_not_equal_without_blocking() {
        let table = WaitTable::new();
        let word = AtomicU32::new(5);
        let outcome = table.wait(0, &word, 4, None);
        assert_eq!(outcome, WaitOutcome::NotEqual);
        assert_eq!(table.waiter_count(0), 0);
    }

    #[test]
    fn wait_times_out() {
        let table = WaitTable::new();
        let word = AtomicU32::new(0);
        let outcome = table.wait(0, &word, 0, Some(Duration::from_millis(10)));
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert_eq!(table.waiter_count(0), 0, "timed-out waiter must be removed");
    }

    #[test]
    fn notify_without_waiters_wakes_nobody() {
        let table = WaitTable::new();
        assert_eq!(table.notify(16, None), 0);
    }

    #[test]
    fn notify_wakes_parked_thread() {
        let table = Arc::new(WaitTable::new());
        let word = Arc::new(AtomicU32::new(0));

        let waiter = {
            let table = Arc::clone(&table);
            let word = Arc::clone(&word);
            thread::spawn(move || table.wait(4, &word, 0, Some(Duration::from_secs(10))))
        };

        while table.waiter_count(4) == 0 {
            thread::yield_now();
        }
        word.store(1, Ordering::SeqCst);
        assert_eq!(table.notify(4, Some(1)), 1);
        assert_eq!(waiter.join().unwrap(), WaitOutcome::Woken);
    }

    #[test]
    fn notify_only_touches_its_address() {
        let table = Arc::new(WaitTable::new());
        let word = Arc::new(AtomicU32::new(0));
        // Same bucket (addr >> 2 collides modulo BUCKET_COUNT), different word.
        let other = 4 + BUCKET_COUNT * 4;

        let waiter = {
            let table = Arc::clone(&table);
            let word = Arc::clone(&word);
            thread::spawn(move || table.wait(4, &word, 0, Some(Duration::from_millis(200))))
        };
        while table.waiter_count(4) == 0 {
            thread::yield_now();
        }
        assert_eq!(table.notify(other, None), 0);
        assert_eq!(waiter.join().unwrap(), WaitOutcome::TimedOut);
    }
}
