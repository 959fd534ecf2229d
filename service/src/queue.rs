use std::collections::BinaryHeap;
use std::sync::Mutex;

use domain::model::entity::job::{Job, JobPriority};

/// Jobs waiting for dispatch, ordered by priority tier, FIFO within a tier.
/// Push and pop can race between the reconciliation step and direct enqueue
/// calls, so the state lives behind one lock.
#[derive(Default)]
pub struct JobQueue {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    heap: BinaryHeap<Entry>,
    seq: u64,
}

struct Entry {
    priority: JobPriority,
    seq: u64,
    job: Job,
}

impl Entry {
    fn key(&self) -> (JobPriority, std::cmp::Reverse<u64>) {
        (self.priority, std::cmp::Reverse(self.seq))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key().cmp(&other.key())
    }
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, job: Job) {
        let mut inner = self.inner.lock().expect("job queue lock poisoned");
        let seq = inner.seq;
        inner.seq += 1;
        inner.heap.push(Entry {
            priority: job.priority,
            seq,
            job,
        });
    }

    /// Removes and returns the highest-priority waiting job.
    pub fn pop(&self) -> Option<Job> {
        let mut inner = self.inner.lock().expect("job queue lock poisoned");
        inner.heap.pop().map(|entry| entry.job)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("job queue lock poisoned").heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: i64, priority: JobPriority) -> Job {
        Job {
            id,
            priority,
            ..Default::default()
        }
    }

    #[test]
    fn pops_highest_priority_first() {
        let queue = JobQueue::new();
        queue.push(job(1, JobPriority::Low));
        queue.push(job(2, JobPriority::High));
        queue.push(job(3, JobPriority::Low));

        assert_eq!(queue.pop().unwrap().id, 2);
        assert_eq!(queue.pop().unwrap().id, 1);
        assert_eq!(queue.pop().unwrap().id, 3);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn fifo_within_a_tier() {
        let queue = JobQueue::new();
        for id in 1..=4 {
            queue.push(job(id, JobPriority::Medium));
        }
        let order: Vec<i64> = std::iter::from_fn(|| queue.pop()).map(|j| j.id).collect();
        assert_eq!(order, [1, 2, 3, 4]);
    }

    #[test]
    fn len_tracks_depth() {
        let queue = JobQueue::new();
        assert!(queue.is_empty());
        queue.push(job(1, JobPriority::Low));
        queue.push(job(2, JobPriority::High));
        assert_eq!(queue.len(), 2);
        queue.pop();
        assert_eq!(queue.len(), 1);
    }
}
