//! # Priority Inbox
//!
//! Every actor owns one [`Inbox`]. Producers push from any task; the actor's
//! drain loop is the only consumer and suspends in [`Inbox::pop`] while the inbox
//! is empty.
//!
//! The heap is ordered by job priority (lowest value first). Jobs with equal
//! priority leave in the order they arrived: each entry carries a monotonic
//! sequence number that breaks ties.

use crate::job::Job;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use tokio::sync::Notify;

struct Queued {
    seq: u64,
    job: Job,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    // BinaryHeap is a max-heap: the "greatest" entry is the lowest priority value,
    // then the oldest sequence number.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .job
            .cmp(&self.job)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct Queue {
    heap: BinaryHeap<Queued>,
    next_seq: u64,
}

struct Shared {
    queue: Mutex<Queue>,
    notify: Notify,
}

/// Unbounded, thread-safe priority queue of jobs. Cheap to clone; clones share the queue.
#[derive(Clone)]
pub struct Inbox {
    shared: Arc<Shared>,
}

impl Inbox {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(Queue::default()),
                notify: Notify::new(),
            }),
        }
    }

    /// Adds a job. Never waits for anything but the queue lock.
    pub fn push(&self, job: Job) {
        {
            // Sequence numbers are taken under the lock so ties follow heap insertion order.
            let mut queue = self.shared.queue.lock();
            let seq = queue.next_seq;
            queue.next_seq += 1;
            queue.heap.push(Queued { seq, job });
        }
        self.shared.notify.notify_one();
    }

    /// Removes the most urgent job, if any.
    pub fn try_pop(&self) -> Option<Job> {
        self.shared.queue.lock().heap.pop().map(|queued| queued.job)
    }

    /// Removes the most urgent job, waiting until one is available.
    ///
    /// Cancel-safe: dropping the future never loses a job.
    pub async fn pop(&self) -> Job {
        loop {
            if let Some(job) = self.try_pop() {
                return job;
            }
            // A push that races between try_pop and here leaves a permit behind,
            // so this wakes immediately.
            self.shared.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.shared.queue.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Inbox {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Inbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inbox").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn job(producer: &str, priority: i32) -> Job {
        Job::new("read", producer).with_priority(priority)
    }

    #[test]
    fn lower_priority_value_pops_first() {
        let inbox = Inbox::new();
        inbox.push(job("late", 5));
        inbox.push(job("early", 1));

        assert_eq!(inbox.try_pop().unwrap().producer(), "early");
        assert_eq!(inbox.try_pop().unwrap().producer(), "late");
        assert!(inbox.try_pop().is_none());
    }

    #[test]
    fn pop_order_is_sorted_by_priority() {
        let inbox = Inbox::new();
        let priorities = [4, 9, -2, 4, 0, 7, 1, 1, 3, 12, -2, 5];
        for (i, p) in priorities.iter().enumerate() {
            inbox.push(job(&format!("p{i}"), *p));
        }

        let mut popped = Vec::new();
        while let Some(job) = inbox.try_pop() {
            popped.push(job.priority());
        }

        let mut expected = priorities.to_vec();
        expected.sort();
        assert_eq!(popped, expected);
    }

    #[test]
    fn equal_priorities_are_fifo() {
        let inbox = Inbox::new();
        for name in ["a", "b", "c", "d"] {
            inbox.push(job(name, 3));
        }
        let order: Vec<String> = std::iter::from_fn(|| inbox.try_pop())
            .map(|job| job.producer().to_string())
            .collect();
        assert_eq!(order, ["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn pop_waits_for_a_push() {
        let inbox = Inbox::new();
        let consumer = inbox.clone();
        let waiter = tokio::spawn(async move { consumer.pop().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        inbox.push(job("late", 1));
        let got = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("pop never woke up")
            .unwrap();
        assert_eq!(got.producer(), "late");
        assert!(inbox.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_producers_lose_nothing() {
        let inbox = Inbox::new();
        let mut handles = vec![];
        for t in 0..8 {
            let inbox = inbox.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    inbox.push(job(&format!("{t}-{i}"), i % 5));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(inbox.len(), 400);
        let mut last = i32::MIN;
        while let Some(job) = inbox.try_pop() {
            assert!(job.priority() >= last);
            last = job.priority();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn equal_priorities_stay_fifo_under_contention() {
        let inbox = Inbox::new();
        let mut handles = vec![];
        for t in 0..4 {
            let inbox = inbox.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..200 {
                    inbox.push(job(&format!("{t}:{i}"), 1));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut last = [-1i64; 4];
        while let Some(job) = inbox.try_pop() {
            let (t, i) = job.producer().split_once(':').unwrap();
            let (t, i): (usize, i64) = (t.parse().unwrap(), i.parse().unwrap());
            assert!(i > last[t], "producer {t} popped {i} after {}", last[t]);
            last[t] = i;
        }
        assert_eq!(last, [199; 4]);
    }
}
