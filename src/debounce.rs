use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

type Callback = Arc<dyn Fn() + Send + Sync>;

struct Pending {
    generation: u64,
    deadline: Instant,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Slot {
    generation: u64,
    pending: Option<Pending>,
    closed: bool,
}

/// Runs a callback once a burst of signals has been quiet for `delay`.
///
/// Every [`signal`](Debouncer::signal) pushes the deadline out again, so
/// the callback fires exactly once per burst. Signals may come from any
/// thread; the callback runs on the runtime the debouncer was built with.
pub struct Debouncer {
    delay: Duration,
    runtime: Handle,
    callback: Callback,
    slot: Arc<Mutex<Slot>>,
}

impl Debouncer {
    pub fn new<F>(runtime: Handle, delay: Duration, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            delay,
            runtime,
            callback: Arc::new(callback),
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    /// Arms the timer, or pushes its deadline back if it is already armed.
    pub fn signal(&self) {
        let mut slot = self.slot.lock();
        if slot.closed {
            return;
        }
        if let Some(pending) = slot.pending.take() {
            pending.task.abort();
        }

        slot.generation += 1;
        let generation = slot.generation;
        // Watcher callbacks arrive off-runtime; read the runtime's clock.
        let _context = self.runtime.enter();
        let deadline = Instant::now() + self.delay;
        let callback = self.callback.clone();
        let shared = self.slot.clone();

        let task = self.runtime.spawn(async move {
            sleep_until(deadline).await;
            {
                let mut slot = shared.lock();
                if slot.generation != generation || slot.closed {
                    return;
                }
                slot.pending = None;
            }
            callback();
        });

        slot.pending = Some(Pending {
            generation,
            deadline,
            task,
        });
    }

    pub fn is_armed(&self) -> bool {
        self.slot.lock().pending.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.slot.lock().pending.as_ref().map(|p| p.deadline)
    }

    /// Disarms and ignores every later signal.
    pub fn close(&self) {
        let mut slot = self.slot.lock();
        slot.closed = true;
        if let Some(pending) = slot.pending.take() {
            pending.task.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.close();
    }
}
