/// Blocking work queue for directory tasks.
///
/// Semantics the scanner depends on:
///
/// - `pop` blocks while the queue is empty or execution is suspended.
/// - When every worker is blocked in `pop` and the queue is empty, the
///   scan is over: `pop` returns `None` for all workers and they exit.
/// - `cancel` wakes everything; blocked poppers and pause points observe
///   it immediately. The first reason wins and is what
///   `await_completion` reports.
/// - `suspend`/`resume`/`cancel` are idempotent and safe to call from any
///   thread.
///
/// Long-running tasks (the duplicate hasher) call [`PausePoint::pause_point`]
/// between I/O chunks so suspension takes effect inside a task, not just
/// between tasks.
use super::progress::CancelReason;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// A cooperative pause/cancel checkpoint.
pub trait PausePoint: Send + Sync {
    /// Block while suspended; fail fast when cancelled.
    fn pause_point(&self) -> Result<(), CancelReason>;
}

/// Checkpoint that never pauses — for callers running outside a scan.
pub struct NoPause;

impl PausePoint for NoPause {
    fn pause_point(&self) -> Result<(), CancelReason> {
        Ok(())
    }
}

struct State<T> {
    queue: VecDeque<T>,
    workers: usize,
    waiting: usize,
    started: bool,
    suspended: bool,
    finished: bool,
    cancelled: bool,
    reason: Option<CancelReason>,
}

pub struct TaskQueue<T> {
    state: Mutex<State<T>>,
    /// Signalled on push, resume, cancel and finish — wakes blocked `pop`s.
    pushed: Condvar,
    /// Signalled on resume and cancel — wakes blocked pause points.
    resumed: Condvar,
}

impl<T: Send> TaskQueue<T> {
    pub fn new(workers: usize) -> Self {
        Self {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                workers: workers.max(1),
                waiting: 0,
                started: false,
                suspended: false,
                finished: false,
                cancelled: false,
                reason: None,
            }),
            pushed: Condvar::new(),
            resumed: Condvar::new(),
        }
    }

    pub fn push(&self, item: T) {
        let mut state = self.state.lock();
        state.started = true;
        state.queue.push_back(item);
        self.pushed.notify_one();
    }

    /// Dequeue the next task, blocking while empty or suspended.
    ///
    /// Returns `None` when the scan is over: either cancelled, or all
    /// workers idle with nothing queued.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        state.waiting += 1;
        loop {
            if state.cancelled || state.finished {
                // Leave `waiting` incremented: this worker is exiting and
                // must keep counting as idle for the others.
                self.pushed.notify_all();
                return None;
            }
            if !state.suspended {
                if let Some(item) = state.queue.pop_front() {
                    state.waiting -= 1;
                    return Some(item);
                }
                if state.started && state.waiting == state.workers {
                    // Everyone is here and there is nothing left to do.
                    state.finished = true;
                    self.pushed.notify_all();
                    return None;
                }
            }
            self.pushed.wait(&mut state);
        }
    }

    /// Block new pops. Running tasks keep going until their next
    /// checkpoint. Idempotent.
    pub fn suspend(&self) {
        let mut state = self.state.lock();
        state.suspended = true;
    }

    /// Unblock pops and pause points. Idempotent.
    pub fn resume(&self) {
        let mut state = self.state.lock();
        state.suspended = false;
        self.pushed.notify_all();
        self.resumed.notify_all();
    }

    /// Stop the scan: drain the queue, wake all blocked threads. The first
    /// recorded reason wins. Idempotent.
    pub fn cancel(&self, reason: CancelReason) {
        let mut state = self.state.lock();
        if !state.cancelled {
            state.cancelled = true;
            state.reason = Some(reason);
            state.queue.clear();
        }
        self.pushed.notify_all();
        self.resumed.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    pub fn is_suspended(&self) -> bool {
        self.state.lock().suspended
    }

    /// The reason recorded by the first `cancel` call, if any.
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        self.state.lock().reason
    }
}

impl<T: Send> PausePoint for TaskQueue<T> {
    fn pause_point(&self) -> Result<(), CancelReason> {
        let mut state = self.state.lock();
        while state.suspended && !state.cancelled {
            self.resumed.wait(&mut state);
        }
        if state.cancelled {
            return Err(state.reason.unwrap_or(CancelReason::UserRequest));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    /// Workers must all exit once the queue drains and everyone idles.
    #[test]
    fn exits_when_all_workers_idle() {
        let queue = Arc::new(TaskQueue::new(4));
        for i in 0..100 {
            queue.push(i);
        }

        let processed = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let q = queue.clone();
            let p = processed.clone();
            handles.push(thread::spawn(move || {
                while q.pop().is_some() {
                    p.fetch_add(1, Ordering::Relaxed);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(processed.load(Ordering::Relaxed), 100);
    }

    /// Tasks pushed by workers mid-run keep the scan alive.
    #[test]
    fn worker_pushed_tasks_are_processed() {
        let queue = Arc::new(TaskQueue::new(2));
        queue.push(3u32);

        let processed = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..2 {
            let q = queue.clone();
            let p = processed.clone();
            handles.push(thread::spawn(move || {
                while let Some(n) = q.pop() {
                    p.fetch_add(1, Ordering::Relaxed);
                    if n > 0 {
                        q.push(n - 1);
                        q.push(n - 1);
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        // A full binary recursion from 3: 2^4 - 1 nodes.
        assert_eq!(processed.load(Ordering::Relaxed), 15);
    }

    #[test]
    fn suspend_blocks_pop_until_resume() {
        let queue = Arc::new(TaskQueue::new(1));
        queue.suspend();
        queue.push(1u32);

        let q = queue.clone();
        let popped = Arc::new(AtomicUsize::new(0));
        let p = popped.clone();
        let handle = thread::spawn(move || {
            while q.pop().is_some() {
                p.fetch_add(1, Ordering::Relaxed);
            }
        });

        thread::sleep(Duration::from_millis(50));
        assert_eq!(popped.load(Ordering::Relaxed), 0, "pop must block while suspended");

        queue.resume();
        handle.join().unwrap();
        assert_eq!(popped.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn cancel_wakes_blocked_workers() {
        // Declare 3 workers but only run 2, so the all-idle exit can never
        // trigger and the poppers genuinely block until cancelled.
        let queue: Arc<TaskQueue<u32>> = Arc::new(TaskQueue::new(3));
        queue.push(0);
        let _ = queue.pop();

        let mut handles = Vec::new();
        for _ in 0..2 {
            let q = queue.clone();
            handles.push(thread::spawn(move || q.pop()));
        }
        thread::sleep(Duration::from_millis(20));
        queue.cancel(CancelReason::UserRequest);
        for h in handles {
            assert!(h.join().unwrap().is_none());
        }
        assert_eq!(queue.cancel_reason(), Some(CancelReason::UserRequest));
    }

    /// The first cancel reason is the one reported.
    #[test]
    fn first_cancel_reason_wins() {
        let queue: Arc<TaskQueue<u32>> = Arc::new(TaskQueue::new(1));
        queue.cancel(CancelReason::InvariantViolation);
        queue.cancel(CancelReason::UserRequest);
        assert_eq!(
            queue.cancel_reason(),
            Some(CancelReason::InvariantViolation)
        );
    }

    #[test]
    fn pause_point_blocks_and_observes_cancel() {
        let queue: Arc<TaskQueue<u32>> = Arc::new(TaskQueue::new(1));
        assert!(queue.pause_point().is_ok());

        queue.suspend();
        let q = queue.clone();
        let handle = thread::spawn(move || q.pause_point());
        thread::sleep(Duration::from_millis(20));
        queue.cancel(CancelReason::Shutdown);
        assert_eq!(handle.join().unwrap(), Err(CancelReason::Shutdown));
    }
}
