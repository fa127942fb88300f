// src/sync.rs
// Per-window mutual exclusion with priority queues and bounded acquisition waits

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::timing::{OperationKind, TimingOptimizer};
use crate::types::Window;

pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_millis(3000);
const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Both windows must have been quiet for this long before a fast
/// back-to-back switch is allowed.
const FAST_SWITCH_BUFFER: Duration = Duration::from_millis(200);

/// One requested action against a window. Retried up to `max_retries` by
/// [`WindowSynchronizer::acquire_with_retries`], then dropped.
#[derive(Debug, Clone)]
pub struct SyncOperation {
    pub kind: OperationKind,
    pub window: Window,
    pub priority: u8,
    pub estimated_duration: Duration,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl SyncOperation {
    pub fn new(kind: OperationKind, window: Window, priority: u8) -> SyncOperation {
        SyncOperation {
            kind,
            window,
            priority,
            estimated_duration: Duration::from_millis(500),
            retry_count: 0,
            max_retries: 2,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Ticket {
    id: u64,
    priority: u8,
}

#[derive(Default)]
struct WindowSlot {
    busy: bool,
    /// Waiting tickets, highest priority first, FIFO within a priority.
    queue: Vec<Ticket>,
    last_release: Option<Instant>,
}

impl WindowSlot {
    fn enqueue(&mut self, ticket: Ticket) {
        self.queue.push(ticket);
        // Stable sort keeps FIFO order among equal priorities.
        self.queue.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    fn remove(&mut self, id: u64) {
        self.queue.retain(|t| t.id != id);
    }

    fn is_next(&self, id: u64) -> bool {
        self.queue.first().map(|t| t.id == id).unwrap_or(false)
    }
}

struct SlotPair {
    left: WindowSlot,
    right: WindowSlot,
}

impl SlotPair {
    fn slot(&mut self, window: Window) -> &mut WindowSlot {
        match window {
            Window::Left => &mut self.left,
            Window::Right => &mut self.right,
        }
    }
}

/// Serializes access to each game window. The two windows are independent:
/// operations on different windows may run in parallel, operations on the
/// same window never overlap.
pub struct WindowSynchronizer {
    slots: Mutex<SlotPair>,
    optimizer: Arc<TimingOptimizer>,
    acquire_timeout: Duration,
    next_ticket: AtomicU64,
}

impl WindowSynchronizer {
    pub fn new(optimizer: Arc<TimingOptimizer>) -> WindowSynchronizer {
        WindowSynchronizer::with_timeout(optimizer, DEFAULT_ACQUIRE_TIMEOUT)
    }

    pub fn with_timeout(
        optimizer: Arc<TimingOptimizer>,
        acquire_timeout: Duration,
    ) -> WindowSynchronizer {
        WindowSynchronizer {
            slots: Mutex::new(SlotPair {
                left: WindowSlot::default(),
                right: WindowSlot::default(),
            }),
            optimizer,
            acquire_timeout,
            next_ticket: AtomicU64::new(1),
        }
    }

    /// Try to take exclusive hold of a window. Blocks up to the configured
    /// timeout, polling availability; an unavailable window queues the
    /// request behind higher-priority waiters. Returns `false` on timeout,
    /// never errors.
    pub async fn acquire(&self, window: Window, operation: &SyncOperation) -> bool {
        let ticket = Ticket {
            id: self.next_ticket.fetch_add(1, Ordering::Relaxed),
            priority: operation.priority,
        };
        let started = Instant::now();

        {
            let mut slots = self.slots.lock().unwrap();
            let slot = slots.slot(window);
            slot.enqueue(ticket);
        }

        loop {
            {
                let mut slots = self.slots.lock().unwrap();
                let slot = slots.slot(window);
                if !slot.busy && slot.is_next(ticket.id) {
                    slot.busy = true;
                    slot.remove(ticket.id);
                    drop(slots);
                    self.optimizer.record_metric(
                        operation.kind,
                        started.elapsed().as_millis() as u64,
                        true,
                    );
                    return true;
                }
            }

            if started.elapsed() >= self.acquire_timeout {
                let mut slots = self.slots.lock().unwrap();
                slots.slot(window).remove(ticket.id);
                drop(slots);
                debug!(%window, kind = ?operation.kind, "window acquisition timed out");
                self.optimizer.record_metric(
                    operation.kind,
                    started.elapsed().as_millis() as u64,
                    false,
                );
                return false;
            }

            sleep(ACQUIRE_POLL_INTERVAL).await;
        }
    }

    /// Acquire with the operation's own retry budget. Each failed attempt
    /// bumps `retry_count`; an exhausted operation is dropped.
    pub async fn acquire_with_retries(&self, operation: &mut SyncOperation) -> bool {
        loop {
            if self.acquire(operation.window, operation).await {
                return true;
            }
            operation.retry_count += 1;
            if operation.retry_count > operation.max_retries {
                debug!(
                    window = %operation.window,
                    kind = ?operation.kind,
                    retries = operation.retry_count,
                    "operation dropped after exhausting retries"
                );
                return false;
            }
        }
    }

    /// Release a previously acquired window. The next queued waiter (if
    /// any) will pick the window up on its next poll.
    pub fn release(&self, window: Window, operation: &SyncOperation, success: bool) {
        let mut slots = self.slots.lock().unwrap();
        let slot = slots.slot(window);
        slot.busy = false;
        slot.last_release = Some(Instant::now());
        let waiters = slot.queue.len();
        drop(slots);
        debug!(%window, kind = ?operation.kind, success, waiters, "window released");
    }

    /// True only when both windows are free, both queues are drained, and
    /// the buffer interval since the last release has passed. Used to avoid
    /// thrashing when both windows are acted on back to back.
    pub fn is_ready_for_fast_switch(&self) -> bool {
        let mut slots = self.slots.lock().unwrap();
        for window in Window::ALL {
            let slot = slots.slot(window);
            if slot.busy || !slot.queue.is_empty() {
                return false;
            }
            if let Some(released) = slot.last_release {
                if released.elapsed() < FAST_SWITCH_BUFFER {
                    return false;
                }
            }
        }
        true
    }

    pub fn is_busy(&self, window: Window) -> bool {
        self.slots.lock().unwrap().slot(window).busy
    }
}
