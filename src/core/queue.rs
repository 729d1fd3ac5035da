//! Queue disciplines for pending pool jobs.
//!
//! A [`QueueStrategy`] names one of four disciplines and builds the matching
//! channel pair. FIFO disciplines ride on `crossbeam-channel`; the priority
//! discipline is a condvar-guarded binary heap ordered by [`Priority`] with
//! FIFO tie-breaking inside each class.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::core::error::PoolError;

/// Priority attached to a submitted job.
///
/// Consumed by [`QueueStrategy::Priority`] queues; FIFO disciplines ignore it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Runs after everything else.
    Low,
    /// Default class for plain submissions.
    #[default]
    Normal,
    /// Preempts the default class.
    High,
    /// Runs before all other classes.
    Critical,
}

impl Priority {
    pub(crate) const fn value(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Normal => 1,
            Self::High => 2,
            Self::Critical => 3,
        }
    }
}

/// A unit of work accepted by a pool.
pub(crate) struct Job {
    pub run: Box<dyn FnOnce() + Send + 'static>,
    pub priority: Priority,
    pub seq: u64,
}

/// Queue discipline selection for a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStrategy {
    /// Linked FIFO queue, bounded when a capacity is given.
    Blocking,
    /// Array-backed FIFO queue; a capacity is mandatory.
    Static,
    /// Zero-capacity rendezvous; a job is accepted only while a worker waits.
    Synchronous,
    /// Unbounded queue ordered by job priority, FIFO within equal priority.
    Priority,
}

impl QueueStrategy {
    /// Strategy name as it appears in configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blocking => "blocking",
            Self::Static => "static",
            Self::Synchronous => "synchronous",
            Self::Priority => "priority",
        }
    }

    /// Check a configured capacity against this discipline.
    ///
    /// # Errors
    /// Returns a message when the combination is unsupported: `Static`
    /// requires a capacity, `Synchronous` and `Priority` reject one, and a
    /// capacity of zero is never valid.
    pub fn check_capacity(self, capacity: Option<usize>) -> Result<(), String> {
        match (self, capacity) {
            (Self::Static, None) => {
                Err(format!("queue mode `{}` requires a capacity", self.as_str()))
            }
            (Self::Synchronous | Self::Priority, Some(_)) => Err(format!(
                "queue mode `{}` does not accept a capacity",
                self.as_str()
            )),
            (_, Some(0)) => Err("queue capacity must be greater than 0".to_owned()),
            _ => Ok(()),
        }
    }

    /// Build a queue with no capacity bound.
    ///
    /// # Errors
    /// `Configuration` for `Static`, which requires a capacity.
    pub fn create(self) -> Result<JobQueue, PoolError> {
        self.build(None)
    }

    /// Build a queue bounded to `capacity`.
    ///
    /// # Errors
    /// `Configuration` for `Synchronous` and `Priority`, which reject a
    /// capacity, and for a capacity of zero.
    pub fn create_bounded(self, capacity: usize) -> Result<JobQueue, PoolError> {
        self.build(Some(capacity))
    }

    pub(crate) fn build(self, capacity: Option<usize>) -> Result<JobQueue, PoolError> {
        self.check_capacity(capacity).map_err(PoolError::Configuration)?;
        let queue = match self {
            Self::Priority => JobQueue::priority(),
            Self::Synchronous => JobQueue::channel(bounded(0)),
            Self::Blocking => match capacity {
                Some(cap) => JobQueue::channel(bounded(cap)),
                None => JobQueue::channel(unbounded()),
            },
            Self::Static => {
                // capacity presence checked above
                let cap = capacity.ok_or_else(|| {
                    PoolError::Configuration("queue mode `static` requires a capacity".to_owned())
                })?;
                JobQueue::channel(bounded(cap))
            }
        };
        Ok(queue)
    }
}

/// A built queue: one submit side and one worker side.
pub struct JobQueue {
    pub(crate) sender: JobSender,
    pub(crate) receiver: JobReceiver,
}

impl JobQueue {
    fn channel((tx, rx): (Sender<Job>, Receiver<Job>)) -> Self {
        Self {
            sender: JobSender::Channel(tx),
            receiver: JobReceiver::Channel(rx),
        }
    }

    fn priority() -> Self {
        let heap = Arc::new(PriorityChannel::new());
        Self {
            sender: JobSender::Priority(Arc::clone(&heap)),
            receiver: JobReceiver::Priority(heap),
        }
    }

    /// Jobs currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// True when no jobs are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Why a non-blocking push was refused.
pub(crate) enum PushError {
    /// The queue is at capacity; the job is handed back.
    Full(Job),
    /// The queue was closed; the job is handed back.
    Closed(#[allow(dead_code)] Job),
}

impl fmt::Debug for PushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Full(_) => "Full",
            Self::Closed(_) => "Closed",
        };
        f.debug_tuple(name).finish()
    }
}

/// Why a bounded pop returned no job.
pub(crate) enum PollError {
    Timeout,
    Closed,
}

#[derive(Clone)]
pub(crate) enum JobSender {
    Channel(Sender<Job>),
    Priority(Arc<PriorityChannel>),
}

impl JobSender {
    pub fn try_push(&self, job: Job) -> Result<(), PushError> {
        match self {
            Self::Channel(tx) => tx.try_send(job).map_err(|err| match err {
                TrySendError::Full(job) => PushError::Full(job),
                TrySendError::Disconnected(job) => PushError::Closed(job),
            }),
            Self::Priority(heap) => heap.push(job),
        }
    }

    /// Stop accepting jobs. Channel senders close by being dropped.
    pub fn close(&self) {
        if let Self::Priority(heap) = self {
            heap.close();
        }
    }
}

#[derive(Clone)]
pub(crate) enum JobReceiver {
    Channel(Receiver<Job>),
    Priority(Arc<PriorityChannel>),
}

impl JobReceiver {
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Job, PollError> {
        match self {
            Self::Channel(rx) => rx.recv_timeout(timeout).map_err(|err| match err {
                RecvTimeoutError::Timeout => PollError::Timeout,
                RecvTimeoutError::Disconnected => PollError::Closed,
            }),
            Self::Priority(heap) => heap.pop_timeout(timeout),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Channel(rx) => rx.len(),
            Self::Priority(heap) => heap.len(),
        }
    }
}

/// Heap entry ordered by priority, then submission order within a class.
struct QueuedJob {
    job: Job,
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedJob {}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> Ordering {
        // max-heap: higher priority first, then lower seq (earlier) first
        self.job
            .priority
            .value()
            .cmp(&other.job.priority.value())
            .then_with(|| other.job.seq.cmp(&self.job.seq))
    }
}

struct PriorityState {
    heap: BinaryHeap<QueuedJob>,
    closed: bool,
}

/// Condvar-guarded priority heap with channel-like close semantics.
///
/// Jobs pushed before `close` remain poppable afterwards; `pop_timeout`
/// reports closed only once the heap is drained.
pub(crate) struct PriorityChannel {
    state: Mutex<PriorityState>,
    available: Condvar,
}

impl PriorityChannel {
    fn new() -> Self {
        Self {
            state: Mutex::new(PriorityState {
                heap: BinaryHeap::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    fn push(&self, job: Job) -> Result<(), PushError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(PushError::Closed(job));
        }
        state.heap.push(QueuedJob { job });
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    fn pop_timeout(&self, timeout: Duration) -> Result<Job, PollError> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();
        loop {
            if let Some(entry) = state.heap.pop() {
                return Ok(entry.job);
            }
            if state.closed {
                return Err(PollError::Closed);
            }
            match deadline {
                Some(deadline) => {
                    if self.available.wait_until(&mut state, deadline).timed_out() {
                        return match state.heap.pop() {
                            Some(entry) => Ok(entry.job),
                            None if state.closed => Err(PollError::Closed),
                            None => Err(PollError::Timeout),
                        };
                    }
                }
                None => self.available.wait(&mut state),
            }
        }
    }

    fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        drop(state);
        self.available.notify_all();
    }

    fn len(&self) -> usize {
        self.state.lock().heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn job(priority: Priority, seq: u64) -> Job {
        Job {
            run: Box::new(|| {}),
            priority,
            seq,
        }
    }

    #[test]
    fn capacity_matrix() {
        assert!(QueueStrategy::Blocking.create().is_ok());
        assert!(QueueStrategy::Blocking.create_bounded(4).is_ok());
        assert!(QueueStrategy::Static.create_bounded(4).is_ok());
        assert!(QueueStrategy::Synchronous.create().is_ok());
        assert!(QueueStrategy::Priority.create().is_ok());

        assert!(matches!(
            QueueStrategy::Static.create(),
            Err(PoolError::Configuration(_))
        ));
        assert!(matches!(
            QueueStrategy::Synchronous.create_bounded(1),
            Err(PoolError::Configuration(_))
        ));
        assert!(matches!(
            QueueStrategy::Priority.create_bounded(1),
            Err(PoolError::Configuration(_))
        ));
        assert!(matches!(
            QueueStrategy::Blocking.create_bounded(0),
            Err(PoolError::Configuration(_))
        ));
    }

    #[test]
    fn static_queue_rejects_beyond_capacity() {
        let queue = QueueStrategy::Static.create_bounded(2).unwrap();
        assert!(queue.sender.try_push(job(Priority::Normal, 0)).is_ok());
        assert!(queue.sender.try_push(job(Priority::Normal, 1)).is_ok());
        assert!(matches!(
            queue.sender.try_push(job(Priority::Normal, 2)),
            Err(PushError::Full(_))
        ));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn synchronous_queue_requires_waiting_receiver() {
        let queue = QueueStrategy::Synchronous.create().unwrap();
        assert!(matches!(
            queue.sender.try_push(job(Priority::Normal, 0)),
            Err(PushError::Full(_))
        ));

        let receiver = queue.receiver.clone();
        let taker = thread::spawn(move || receiver.recv_timeout(Duration::from_secs(2)));

        // the push lands once the taker blocks in recv
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut handed_over = false;
        let mut seq = 0;
        while Instant::now() < deadline {
            match queue.sender.try_push(job(Priority::Normal, seq)) {
                Ok(()) => {
                    handed_over = true;
                    break;
                }
                Err(PushError::Full(_)) => {
                    seq += 1;
                    thread::sleep(Duration::from_millis(5));
                }
                Err(PushError::Closed(_)) => panic!("queue closed unexpectedly"),
            }
        }
        assert!(handed_over);
        assert!(taker.join().unwrap().is_ok());
    }

    #[test]
    fn priority_orders_by_class_then_fifo() {
        let queue = QueueStrategy::Priority.create().unwrap();
        queue.sender.try_push(job(Priority::Low, 0)).unwrap();
        queue.sender.try_push(job(Priority::Critical, 1)).unwrap();
        queue.sender.try_push(job(Priority::Normal, 2)).unwrap();
        queue.sender.try_push(job(Priority::Critical, 3)).unwrap();

        let pop = |queue: &JobQueue| {
            queue
                .receiver
                .recv_timeout(Duration::from_millis(100))
                .map(|job| (job.priority, job.seq))
                .map_err(|_| ())
                .unwrap()
        };
        assert_eq!(pop(&queue), (Priority::Critical, 1));
        assert_eq!(pop(&queue), (Priority::Critical, 3));
        assert_eq!(pop(&queue), (Priority::Normal, 2));
        assert_eq!(pop(&queue), (Priority::Low, 0));
        assert!(queue.is_empty());
    }

    #[test]
    fn closed_priority_queue_drains_then_reports_closed() {
        let queue = QueueStrategy::Priority.create().unwrap();
        queue.sender.try_push(job(Priority::Normal, 0)).unwrap();
        queue.sender.close();

        assert!(matches!(
            queue.sender.try_push(job(Priority::Normal, 1)),
            Err(PushError::Closed(_))
        ));
        assert!(queue
            .receiver
            .recv_timeout(Duration::from_millis(50))
            .is_ok());
        assert!(matches!(
            queue.receiver.recv_timeout(Duration::from_millis(50)),
            Err(PollError::Closed)
        ));
    }

    #[test]
    fn strategy_names_round_trip_through_serde() {
        let json = serde_json::to_string(&QueueStrategy::Synchronous).unwrap();
        assert_eq!(json, "\"synchronous\"");
        let back: QueueStrategy = serde_json::from_str("\"priority\"").unwrap();
        assert_eq!(back, QueueStrategy::Priority);
        assert_eq!(QueueStrategy::Blocking.as_str(), "blocking");
    }
}
