//! Scheduler tasks: shell commands and phase barriers.

use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::time::Duration;

use crate::process::Process;

/// Widest worker title the status overlay reserves space for.
pub const MAX_TITLE: usize = 32;

pub const BARRIER_TITLE: &str = "-- BARRIER --";

/// How often a worker parked on a barrier rechecks the arrival counter.
const BARRIER_DELAY: Duration = Duration::from_millis(10);

/// One entry in the execution queue.
pub enum Task {
    Command(Command),
    Barrier(Barrier),
}

impl Task {
    pub fn title(&self) -> &str {
        match self {
            Task::Command(command) => &command.title,
            Task::Barrier(_) => BARRIER_TITLE,
        }
    }

    /// Run the task on the calling worker thread.  False means the worker
    /// must stop (failed command); barriers always succeed.
    pub fn execute(&self) -> bool {
        match self {
            Task::Command(command) => command.execute(),
            Task::Barrier(barrier) => barrier.execute(),
        }
    }

    pub fn as_command(&self) -> Option<&Command> {
        match self {
            Task::Command(command) => Some(command),
            Task::Barrier(_) => None,
        }
    }

    pub fn as_barrier(&self) -> Option<&Barrier> {
        match self {
            Task::Barrier(barrier) => Some(barrier),
            Task::Command(_) => None,
        }
    }
}

/// A shell command with a display title.
pub struct Command {
    title: String,
    cmdline: String,
    fail_if_non_zero: bool,
    process: Process,
    /// Exit status; not valid until execute() has run.
    return_value: AtomicI32,
}

impl Command {
    pub fn new(title: &str, cmdline: String, fail_if_non_zero: bool) -> Self {
        let mut title = title.to_string();
        if title.len() >= MAX_TITLE {
            title.truncate(MAX_TITLE - 1);
        }
        Command {
            title,
            cmdline,
            fail_if_non_zero,
            process: Process::new(),
            return_value: AtomicI32::new(-1),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn process(&self) -> &Process {
        &self.process
    }

    pub fn return_value(&self) -> i32 {
        self.return_value.load(Ordering::SeqCst)
    }

    fn execute(&self) -> bool {
        match self.process.exec(&self.cmdline) {
            Ok(code) => {
                self.return_value.store(code, Ordering::SeqCst);
                !self.fail_if_non_zero || code == 0
            }
            Err(_) => false,
        }
    }

    pub fn kill(&self) {
        self.process.kill();
    }
}

/// A synchronization point: every worker must arrive before any of them may
/// move past it.  The target is fixed to the worker-set size at creation.
pub struct Barrier {
    target: usize,
    counter: AtomicUsize,
}

impl Barrier {
    pub fn new(target: usize) -> Self {
        Barrier {
            target,
            counter: AtomicUsize::new(0),
        }
    }

    fn execute(&self) -> bool {
        self.counter.fetch_add(1, Ordering::SeqCst);
        // Synchronization is the scheduler's problem; we only wait.
        while self.counter.load(Ordering::SeqCst) < self.target {
            std::thread::sleep(BARRIER_DELAY);
        }
        true
    }

    /// Release every waiter without requiring arrivals.  Used when the
    /// scheduler is draining the queue.
    pub fn skip(&self) {
        self.counter.store(self.target, Ordering::SeqCst);
    }

    /// True once all workers have arrived (or the barrier was skipped).
    pub fn is_done(&self) -> bool {
        self.counter.load(Ordering::SeqCst) >= self.target
    }
}
