//! Deferred execution. Every reaction a promise dispatches goes through a
//! [`Scheduler`], so user callbacks never run inside the call that attached
//! or settled them.
//!
//! [`MicrotaskQueue`] is the bundled implementation: a channel-backed FIFO
//! whose senders can be cloned into any number of promises while the single
//! receiver is drained by whoever owns the queue.
use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc::{channel, Receiver, Sender, TryRecvError},
        Arc,
    },
};

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send>;

/// The host capability "run this later, after the current synchronous
/// execution completes". Implementations must run tasks in the order they
/// were scheduled.
///
/// Promises call [`schedule`](Schedule::schedule) while holding their own
/// lock, so an implementation must only enqueue the task. Running it inline
/// deadlocks as soon as the task touches the same promise.
pub trait Schedule: Send + Sync {
    fn schedule(&self, task: Task);
}

/// Cloneable handle to a [`Schedule`] implementation.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<dyn Schedule>,
}

impl Scheduler {
    pub fn new<S: Schedule + 'static>(schedule: S) -> Self {
        Scheduler {
            inner: Arc::new(schedule),
        }
    }

    pub fn schedule(&self, task: Task) {
        self.inner.schedule(task)
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Scheduler(..)")
    }
}

/// Tuning for [`MicrotaskQueue`].
#[derive(Debug, Clone, Default)]
pub struct QueueConfig {
    /// Upper bound on tasks run by one [`MicrotaskQueue::run_turn`].
    /// `None` drains until the queue is empty.
    pub max_tasks_per_turn: Option<usize>,
}

/// A single-consumer FIFO of deferred tasks.
///
/// # Examples
///
/// ```
/// use promise_plus::{MicrotaskQueue, Promise};
///
/// let queue = MicrotaskQueue::new();
/// let doubled = Promise::resolved(&queue.scheduler(), 21).map(|v| v * 2);
/// assert!(doubled.outcome().is_none());
/// queue.run_until_stalled();
/// assert_eq!(doubled.outcome().and_then(|o| o.value()), Some(42));
/// ```
#[derive(Debug)]
pub struct MicrotaskQueue {
    sender: Sender<Task>,
    receiver: Receiver<Task>,
    queued: Arc<AtomicUsize>,
    config: QueueConfig,
}

struct ChannelSchedule {
    sender: Sender<Task>,
    queued: Arc<AtomicUsize>,
}

impl Schedule for ChannelSchedule {
    fn schedule(&self, task: Task) {
        // Counted before sending so a concurrent drain cannot underflow it.
        self.queued.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(task).is_err() {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            tracing::warn!("microtask queue dropped, discarding scheduled task");
        }
    }
}

impl MicrotaskQueue {
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    pub fn with_config(config: QueueConfig) -> Self {
        let (sender, receiver) = channel();
        MicrotaskQueue {
            sender,
            receiver,
            queued: Arc::new(AtomicUsize::new(0)),
            config,
        }
    }

    /// A handle that enqueues onto this queue.
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(ChannelSchedule {
            sender: self.sender.clone(),
            queued: self.queued.clone(),
        })
    }

    /// Runs queued tasks, including ones scheduled while running, until the
    /// queue is empty or the per-turn budget is spent. Returns how many ran.
    pub fn run_turn(&self) -> usize {
        let budget = self.config.max_tasks_per_turn.unwrap_or(usize::MAX);
        let mut ran = 0;
        while ran < budget {
            match self.receiver.try_recv() {
                Ok(task) => {
                    self.queued.fetch_sub(1, Ordering::SeqCst);
                    task();
                    ran += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        tracing::trace!(ran, "microtask turn finished");
        ran
    }

    /// Runs turns until no task is left.
    pub fn run_until_stalled(&self) -> usize {
        let mut total = 0;
        loop {
            let ran = self.run_turn();
            if ran == 0 {
                return total;
            }
            total += ran;
        }
    }

    /// Number of tasks waiting to run.
    pub fn len(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MicrotaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
