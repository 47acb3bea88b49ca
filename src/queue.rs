// canconsole/src/queue.rs
//
// Implements the bounded ingress queue between the bus reader and the
// dispatch loop.
//
// This file is part of the Rust 'canconsole' application.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! The ingress queue.
//!
//! A FIFO with a fixed capacity, shared by exactly one producer (the
//! ingress bridge) and one consumer (the dispatch loop). Every operation
//! is a short critical section under a single mutex; nothing blocks while
//! holding it and `push` never waits for room.
//!
//! When the queue is full the [`OverflowPolicy`] decides which frame is
//! lost:
//!
//! ```text
//! DropOldest:  [a b c d] + e  ->  [b c d e]   (a is evicted)
//! DropNewest:  [a b c d] + e  ->  [a b c d]   (e is rejected)
//! ```
//!
//! Either way the surviving frames keep their order and every loss is
//! counted in [`IngressQueue::dropped`].

use std::{
    collections::VecDeque,
    fmt,
    str::FromStr,
    sync::{Mutex, MutexGuard, PoisonError},
};

/// What to do with a push into a full queue.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverflowPolicy {
    /// Evict the oldest queued item to make room for the new one.
    #[default]
    DropOldest,
    /// Discard the incoming item and keep the queue as it is.
    DropNewest,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drop-oldest" => Ok(OverflowPolicy::DropOldest),
            "drop-newest" => Ok(OverflowPolicy::DropNewest),
            _ => Err(format!("unknown overflow policy '{}'", s)),
        }
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OverflowPolicy::DropOldest => f.write_str("drop-oldest"),
            OverflowPolicy::DropNewest => f.write_str("drop-newest"),
        }
    }
}

/// The result of a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pushed<T> {
    /// The item was queued and nothing was lost.
    Queued,
    /// The item was queued; the oldest item was evicted to make room.
    Evicted(T),
    /// The queue was full and the item was discarded.
    Rejected(T),
}

impl<T> Pushed<T> {
    /// Whether the push cost an item.
    pub fn is_loss(&self) -> bool {
        !matches!(self, Pushed::Queued)
    }
}

struct Inner<T> {
    buf: VecDeque<T>,
    dropped: u64,
}

/// A bounded, thread-safe FIFO for a single producer and single consumer.
pub struct IngressQueue<T> {
    inner: Mutex<Inner<T>>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl<T> IngressQueue<T> {
    /// Creates a queue holding at most `capacity` items (at least one).
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                buf: VecDeque::with_capacity(capacity),
                dropped: 0,
            }),
            capacity,
            policy,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        // The critical sections can't leave the queue half-updated
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The maximum number of queued items
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The overflow policy
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Adds an item to the back of the queue, applying the overflow policy
    /// if it is full. Never blocks waiting for room.
    pub fn push(&self, item: T) -> Pushed<T> {
        let mut inner = self.lock();

        if inner.buf.len() < self.capacity {
            inner.buf.push_back(item);
            return Pushed::Queued;
        }

        inner.dropped += 1;
        match self.policy {
            OverflowPolicy::DropOldest => {
                let old = inner.buf.pop_front();
                inner.buf.push_back(item);
                match old {
                    Some(old) => Pushed::Evicted(old),
                    None => Pushed::Queued,
                }
            }
            OverflowPolicy::DropNewest => Pushed::Rejected(item),
        }
    }

    /// Removes the item at the front of the queue, if any.
    pub fn pop(&self) -> Option<T> {
        self.lock().buf.pop_front()
    }

    /// Removes every queued item, oldest first.
    pub fn drain(&self) -> Vec<T> {
        let mut inner = self.lock();
        inner.buf.drain(..).collect()
    }

    /// The number of queued items
    pub fn len(&self) -> usize {
        self.lock().buf.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.lock().buf.is_empty()
    }

    /// The total number of items lost to the overflow policy.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }
}

impl<T> fmt::Debug for IngressQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("IngressQueue")
            .field("len", &inner.buf.len())
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .field("dropped", &inner.dropped)
            .finish()
    }
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::{sync::Arc, thread};

    #[test]
    fn test_fifo() {
        let q = IngressQueue::new(4, OverflowPolicy::DropOldest);
        assert!(q.is_empty());

        for i in 0..3 {
            assert_eq!(Pushed::Queued, q.push(i));
        }
        assert_eq!(3, q.len());
        assert_eq!(Some(0), q.pop());
        assert_eq!(vec![1, 2], q.drain());
        assert!(q.is_empty());
        assert_eq!(None, q.pop());
        assert_eq!(0, q.dropped());
    }

    #[test]
    fn test_drop_oldest() {
        let q = IngressQueue::new(3, OverflowPolicy::DropOldest);
        for i in 0..3 {
            q.push(i);
        }
        assert_eq!(Pushed::Evicted(0), q.push(3));
        assert_eq!(Pushed::Evicted(1), q.push(4));
        assert_eq!(vec![2, 3, 4], q.drain());
        assert_eq!(2, q.dropped());
    }

    #[test]
    fn test_drop_newest() {
        let q = IngressQueue::new(3, OverflowPolicy::DropNewest);
        for i in 0..3 {
            q.push(i);
        }
        assert_eq!(Pushed::Rejected(3), q.push(3));
        assert!(q.push(4).is_loss());
        assert_eq!(vec![0, 1, 2], q.drain());
        assert_eq!(2, q.dropped());
    }

    #[test]
    fn test_zero_capacity_is_one() {
        let q = IngressQueue::new(0, OverflowPolicy::DropOldest);
        assert_eq!(1, q.capacity());
        q.push('a');
        q.push('b');
        assert_eq!(vec!['b'], q.drain());
    }

    #[test]
    fn test_producer_consumer_threads() {
        const N: usize = 10_000;
        let q = Arc::new(IngressQueue::new(N, OverflowPolicy::DropNewest));

        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                for i in 0..N {
                    q.push(i);
                }
            })
        };

        let mut seen = Vec::with_capacity(N);
        while seen.len() < N {
            seen.extend(q.drain());
            thread::yield_now();
        }
        producer.join().unwrap();

        assert_eq!((0..N).collect::<Vec<_>>(), seen);
        assert_eq!(0, q.dropped());
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!(Ok(OverflowPolicy::DropOldest), "drop-oldest".parse());
        assert_eq!(Ok(OverflowPolicy::DropNewest), "drop-newest".parse());
        assert!("block".parse::<OverflowPolicy>().is_err());
    }

    proptest! {
        #[test]
        fn bounded_and_ordered(cap in 1usize..16, n in 0usize..64, oldest in any::<bool>()) {
            let policy = if oldest { OverflowPolicy::DropOldest } else { OverflowPolicy::DropNewest };
            let q = IngressQueue::new(cap, policy);
            for i in 0..n {
                q.push(i);
                prop_assert!(q.len() <= cap);
            }

            let kept = q.drain();
            let lost = n.saturating_sub(cap);
            let expected: Vec<usize> = if oldest {
                (lost..n).collect()
            } else {
                (0..n.min(cap)).collect()
            };
            prop_assert_eq!(expected, kept);
            prop_assert_eq!(lost as u64, q.dropped());
        }
    }
}
