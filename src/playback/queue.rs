//! Bounded blocking queue of time-tagged samples
//!
//! This is the sole hand-off point between network-paced chunk arrival and
//! device-paced audio consumption. Head and tail cursors wrap modulo twice
//! the buffer length, so "empty" and "full" are distinguishable without a
//! separate element counter.

use parking_lot::{Condvar, Mutex};

use crate::playback::StereoSample;

/// A stereo sample tagged with its absolute playback time in nanoseconds,
/// in the coordinator's clock frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimedSample {
    pub sample: StereoSample,
    pub time: i64,
}

/// Fixed-capacity circular buffer shared by one producer (the chunk reader)
/// and one consumer (the streamer). All blocking goes through a single
/// monitor; every successful add or remove broadcasts, and waiters re-check
/// their predicate.
pub struct TimedSampleQueue {
    state: Mutex<State>,
    cond: Condvar,
}

struct State {
    buffer: Vec<TimedSample>,
    head: usize,
    tail: usize,
}

impl State {
    fn cap(&self) -> usize {
        self.buffer.len()
    }

    fn inc(&self, cursor: usize) -> usize {
        (cursor + 1) % (2 * self.cap())
    }

    fn full(&self) -> bool {
        (self.tail + self.cap()) % (2 * self.cap()) == self.head
    }

    fn empty(&self) -> bool {
        self.head == self.tail
    }

    fn len(&self) -> usize {
        if self.tail <= self.head {
            self.head - self.tail
        } else {
            self.head + 2 * self.cap() - self.tail
        }
    }
}

impl TimedSampleQueue {
    /// Create a queue holding up to `capacity` samples. Capacity must be
    /// non-zero and is fixed for the queue's lifetime.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");
        Self {
            state: Mutex::new(State {
                buffer: vec![
                    TimedSample {
                        sample: StereoSample::gap(),
                        time: 0,
                    };
                    capacity
                ],
                head: 0,
                tail: 0,
            }),
            cond: Condvar::new(),
        }
    }

    /// Insert at the write cursor, blocking while the queue is full
    pub fn add(&self, sample: StereoSample, time: i64) {
        let mut state = self.state.lock();
        while state.full() {
            self.cond.wait(&mut state);
        }
        let index = state.head % state.cap();
        state.buffer[index] = TimedSample { sample, time };
        state.head = state.inc(state.head);
        drop(state);
        self.cond.notify_all();
    }

    /// Pop from the read cursor, blocking while the queue is empty
    pub fn remove(&self) -> (StereoSample, i64) {
        let mut state = self.state.lock();
        while state.empty() {
            self.cond.wait(&mut state);
        }
        let index = state.tail % state.cap();
        let entry = state.buffer[index];
        state.tail = state.inc(state.tail);
        drop(state);
        self.cond.notify_all();
        (entry.sample, entry.time)
    }

    /// Return the next element to be removed without consuming it,
    /// blocking while the queue is empty
    pub fn peek(&self) -> (StereoSample, i64) {
        let mut state = self.state.lock();
        while state.empty() {
            self.cond.wait(&mut state);
        }
        let entry = state.buffer[state.tail % state.cap()];
        (entry.sample, entry.time)
    }

    /// Number of unread elements currently buffered
    pub fn len(&self) -> usize {
        self.state.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().empty()
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().cap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    const TEST_QUEUE_SIZE: usize = 16;

    fn new_test_queue() -> TimedSampleQueue {
        TimedSampleQueue::new(TEST_QUEUE_SIZE)
    }

    fn sample(v: f64) -> StereoSample {
        StereoSample { left: v, right: v }
    }

    #[test]
    fn fifo() {
        let q = new_test_queue();
        for i in 0..TEST_QUEUE_SIZE {
            q.add(sample(i as f64), i as i64);
        }
        for i in 0..TEST_QUEUE_SIZE {
            let (s, t) = q.remove();
            assert_eq!(s.left, i as f64);
            assert_eq!(s.right, i as f64);
            assert_eq!(t, i as i64);
        }
    }

    #[test]
    fn peek_does_not_consume() {
        let q = new_test_queue();
        q.add(sample(1.0), 1);
        q.add(sample(2.0), 2);

        let (s, t) = q.peek();
        assert_eq!(s.left, 1.0);
        assert_eq!(t, 1);

        let (s2, t2) = q.peek();
        assert_eq!(s2.left, s.left);
        assert_eq!(t2, t);

        assert_eq!(q.len(), 2);
    }

    #[test]
    fn capacity_is_fixed() {
        for cap in 1..TEST_QUEUE_SIZE {
            assert_eq!(TimedSampleQueue::new(cap).capacity(), cap);
        }
    }

    #[test]
    fn len_tracks_adds_and_removes_across_wraparound() {
        let q = new_test_queue();
        assert_eq!(q.len(), 0);

        for i in 0..TEST_QUEUE_SIZE {
            q.add(sample(i as f64), i as i64);
            assert_eq!(q.len(), i + 1);
        }
        for i in 0..TEST_QUEUE_SIZE {
            q.remove();
            assert_eq!(q.len(), TEST_QUEUE_SIZE - i - 1);
        }

        // half-full queue cycled many times keeps a stable length
        let q = new_test_queue();
        for i in 0..TEST_QUEUE_SIZE / 2 {
            q.add(sample(i as f64), i as i64);
        }
        for i in 0..2 * TEST_QUEUE_SIZE {
            q.add(sample(i as f64), i as i64);
            q.remove();
            assert_eq!(q.len(), TEST_QUEUE_SIZE / 2);
        }
    }

    #[test]
    fn full_and_empty_invariants() {
        let q = new_test_queue();
        assert!(q.state.lock().empty());
        assert!(!q.state.lock().full());

        for i in 0..TEST_QUEUE_SIZE {
            assert!(!q.state.lock().full());
            q.add(sample(i as f64), i as i64);
            assert!(!q.state.lock().empty());
        }
        assert!(q.state.lock().full());

        for _ in 0..TEST_QUEUE_SIZE {
            q.remove();
            assert!(!q.state.lock().full());
        }
        assert!(q.state.lock().empty());
    }

    #[test]
    fn add_blocks_while_full() {
        let q = Arc::new(TimedSampleQueue::new(2));
        q.add(sample(0.0), 0);
        q.add(sample(1.0), 1);

        let done = Arc::new(AtomicBool::new(false));
        let handle = {
            let q = q.clone();
            let done = done.clone();
            thread::spawn(move || {
                q.add(sample(2.0), 2);
                done.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!done.load(Ordering::SeqCst), "add returned on a full queue");

        q.remove();
        handle.join().unwrap();
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn concurrent_producer_consumer_preserves_order() {
        for producer_first in [true, false] {
            let q = Arc::new(new_test_queue());
            let total = 4 * TEST_QUEUE_SIZE;

            let producer = {
                let q = q.clone();
                thread::spawn(move || {
                    for i in 0..total {
                        q.add(sample(i as f64), i as i64);
                    }
                })
            };
            if producer_first {
                thread::sleep(Duration::from_millis(10));
            }
            let consumer = {
                let q = q.clone();
                thread::spawn(move || {
                    for i in 0..total {
                        let (s, t) = q.remove();
                        assert_eq!(s.left, i as f64);
                        assert_eq!(t, i as i64);
                    }
                })
            };

            producer.join().unwrap();
            consumer.join().unwrap();
            assert!(q.is_empty());
        }
    }

    proptest! {
        #[test]
        fn removes_yield_adds_in_order(values in proptest::collection::vec((-1.0f64..1.0, -1.0f64..1.0, 0i64..1_000_000), 1..64)) {
            let q = TimedSampleQueue::new(values.len());
            for (l, r, t) in &values {
                q.add(StereoSample { left: *l, right: *r }, *t);
            }
            for (l, r, t) in &values {
                let (s, time) = q.remove();
                prop_assert_eq!(s.left, *l);
                prop_assert_eq!(s.right, *r);
                prop_assert_eq!(time, *t);
            }
        }
    }
}
