//! The task scheduler: an ordered execution queue dispatched across N
//! worker threads, with barriers gating phase transitions, two-phase
//! cancellation, and a live status overlay.
//!
//! Workers pull nothing themselves; the scheduler thread observes each
//! worker's status flag every tick and hands out the next queued task.
//! A worker advertising WAIT_TASK gets `tasks[next_task]` written into its
//! slot under the worker mutex, then its status is set to WORKING and it is
//! woken.  A null assignment tells the worker to exit.  All terminal output
//! happens on the scheduler thread; command output is captured by Process
//! and printed here between assignments or after a failure.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::signal;
use crate::task::{Barrier, Command, Task, BARRIER_TITLE, MAX_TITLE};
use crate::terminal::{Buffering, Level, Terminal};

/// Dispatch loop tick.
const SCHEDULER_DELAY: Duration = Duration::from_millis(80);

/// Reserved title width of one worker slot; `[x] ` plus title.
const MIN_SLOT_WIDTH: usize = 4 + MAX_TITLE;

const SPINNER: [char; 4] = ['-', '\\', '|', '/'];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WorkerStatus {
    WaitTask,
    Working,
    Fail,
    Stopped,
}

impl WorkerStatus {
    fn from_u8(value: u8) -> WorkerStatus {
        match value {
            0 => WorkerStatus::WaitTask,
            1 => WorkerStatus::Working,
            2 => WorkerStatus::Fail,
            _ => WorkerStatus::Stopped,
        }
    }
}

/// Shared state of one worker thread.  The mutex protects only the task
/// slot; the status flag is independently atomic.
struct Worker {
    slot: Mutex<Option<Arc<Task>>>,
    cond: Condvar,
    status: AtomicU8,
}

impl Worker {
    fn new() -> Self {
        Worker {
            slot: Mutex::new(None),
            cond: Condvar::new(),
            status: AtomicU8::new(WorkerStatus::WaitTask as u8),
        }
    }

    fn status(&self) -> WorkerStatus {
        WorkerStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    fn set_status(&self, status: WorkerStatus) {
        self.status.store(status as u8, Ordering::SeqCst);
    }
}

/// Worker thread body: advertise WAIT_TASK, sleep until the scheduler
/// assigns something, run it, repeat.  A null task ends the loop; a failed
/// task parks the worker in FAIL.
fn worker_routine(worker: Arc<Worker>) {
    loop {
        let task = {
            let mut slot = worker.slot.lock().unwrap();
            worker.set_status(WorkerStatus::WaitTask);
            while worker.status() == WorkerStatus::WaitTask {
                slot = worker.cond.wait(slot).unwrap();
            }
            slot.clone()
        };

        let task = match task {
            Some(task) => task,
            None => break,
        };

        if !task.execute() {
            worker.set_status(WorkerStatus::Fail);
            return;
        }
    }

    worker.set_status(WorkerStatus::Stopped);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SchedulerStatus {
    Idle,
    Running,
    Stopping,
    Killing,
}

/// How a dispatch run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed,
    Interrupted,
}

/// The append seam handed to build producers.
pub trait TaskList {
    fn add_command(&mut self, title: &str, cmdline: String, fail_if_non_zero: bool);
    fn add_barrier(&mut self);
    fn task_count(&self) -> usize;
}

pub struct Scheduler<'a> {
    terminal: &'a Terminal,
    tasks: Vec<Arc<Task>>,
    next_task: usize,
    workers: Vec<Arc<Worker>>,
    status: SchedulerStatus,
    spinner_tick: usize,
    /// Rows of status overlay currently painted above the cursor.
    top_offset: usize,
}

impl<'a> Scheduler<'a> {
    pub fn new(terminal: &'a Terminal, n_workers: usize) -> Self {
        let n_workers = n_workers.max(1);
        Scheduler {
            terminal,
            tasks: Vec::new(),
            next_task: 0,
            workers: (0..n_workers).map(|_| Arc::new(Worker::new())).collect(),
            status: SchedulerStatus::Idle,
            spinner_tick: 0,
            top_offset: 0,
        }
    }

    fn check_running(&self) -> bool {
        let running = self.status == SchedulerStatus::Running;
        if running {
            self.terminal
                .log(Level::Warning, "Scheduler is running!\n");
        }
        running
    }

    /// Drain the queue: no further dispatch, barriers get skipped by the
    /// dispatch loop, in-flight commands finish.
    pub fn stop(&mut self) {
        self.status = SchedulerStatus::Stopping;
        self.next_task = self.tasks.len();
    }

    /// stop(), then SIGKILL whatever is in flight.
    pub fn kill(&mut self) {
        self.stop();
        self.status = SchedulerStatus::Killing;
    }

    /// Run the queue to completion.  Blocks until every worker has stopped.
    pub fn start(&mut self) -> Outcome {
        if self.tasks.is_empty() {
            self.terminal
                .log(Level::Warning, "Scheduler task list is empty! Abort start.\n");
            return Outcome::Success;
        }

        signal::install();

        let threads: Vec<_> = self
            .workers
            .iter()
            .map(|worker| {
                let worker = worker.clone();
                std::thread::spawn(move || worker_routine(worker))
            })
            .collect();

        self.terminal.show_cursor(false);
        // Build each repaint in full before it hits the tty; update_status
        // flushes once per tick, which keeps the overlay from flickering.
        self.terminal.set_buffering(Buffering::Full);
        self.status = SchedulerStatus::Running;

        loop {
            std::thread::sleep(SCHEDULER_DELAY);

            match signal::interrupt_level() {
                2 if self.status != SchedulerStatus::Killing => self.kill(),
                1 if self.status == SchedulerStatus::Running => self.stop(),
                _ => {}
            }

            let mut stopped = 0;
            for i in 0..self.workers.len() {
                let worker = self.workers[i].clone();
                match worker.status() {
                    WorkerStatus::Working => {
                        if self.status != SchedulerStatus::Running {
                            let slot = worker.slot.lock().unwrap();
                            if let Some(barrier) =
                                slot.as_ref().and_then(|task| task.as_barrier())
                            {
                                barrier.skip();
                            }
                        }
                        if self.status == SchedulerStatus::Killing {
                            self.kill_worker_task(&worker);
                        }
                    }
                    WorkerStatus::WaitTask => self.give_worker_task(&worker),
                    WorkerStatus::Fail => {
                        if self.status != SchedulerStatus::Stopping {
                            self.stop();
                        }
                        stopped += 1;
                    }
                    WorkerStatus::Stopped => stopped += 1,
                }
            }

            if stopped == self.workers.len() {
                break;
            }

            self.update_status();
        }

        // Show failed workers' captured output; everyone else is done.
        let mut any_failed = false;
        for i in 0..self.workers.len() {
            let worker = self.workers[i].clone();
            if worker.status() == WorkerStatus::Fail {
                any_failed = true;
                self.show_command_status(&worker);
            } else {
                worker.set_status(WorkerStatus::Stopped);
            }
        }

        self.update_status();

        for thread in threads {
            let _ = thread.join();
        }

        let interrupted = signal::interrupt_level() > 0;

        self.status = SchedulerStatus::Idle;
        self.update_status();

        self.tasks.clear();
        self.next_task = 0;
        for worker in &self.workers {
            *worker.slot.lock().unwrap() = None;
            worker.set_status(WorkerStatus::WaitTask);
        }
        self.top_offset = 0;

        self.terminal.set_buffering(Buffering::Line);
        self.terminal.show_cursor(true);

        if any_failed {
            Outcome::Failed
        } else if interrupted {
            Outcome::Interrupted
        } else {
            Outcome::Success
        }
    }

    fn kill_worker_task(&self, worker: &Worker) {
        let slot = worker.slot.lock().unwrap();
        if let Some(command) = slot.as_ref().and_then(|task| task.as_command()) {
            command.kill();
        }
        worker.set_status(WorkerStatus::Fail);
    }

    fn give_worker_task(&mut self, worker: &Arc<Worker>) {
        if self.next_task == self.tasks.len() {
            // Nothing left; a null assignment terminates the worker.
            let mut slot = worker.slot.lock().unwrap();
            *slot = None;
            worker.set_status(WorkerStatus::Working);
            worker.cond.notify_one();
            return;
        }

        let task = self.tasks[self.next_task].clone();

        // Flush the previous command's captured output before reusing the
        // slot, so it lands in the scrollback above the overlay.
        self.show_command_status(worker);

        {
            let mut slot = worker.slot.lock().unwrap();
            *slot = Some(task.clone());
            worker.set_status(WorkerStatus::Working);
            worker.cond.notify_one();
        }

        match task.as_barrier() {
            // A barrier stays current until every worker has arrived.
            Some(barrier) => {
                if barrier.is_done() {
                    self.next_task += 1;
                }
            }
            None => self.next_task += 1,
        }
    }

    /// Print a finished command's captured stdout/stderr above the status
    /// overlay, prefixed with the task title, preserving scrollback.
    fn show_command_status(&mut self, worker: &Worker) {
        let (title, out, err) = {
            let slot = worker.slot.lock().unwrap();
            let command = match slot.as_ref().and_then(|task| task.as_command()) {
                Some(command) => command,
                None => return,
            };
            (
                command.title().to_string(),
                command.process().out_buffer(),
                command.process().err_buffer(),
            )
        };

        if out.is_empty() && err.is_empty() {
            return;
        }

        let terminal = self.terminal;
        terminal.move_up(self.top_offset);
        terminal.move_left(terminal.columns());
        terminal.clear_down();
        terminal.flush();

        let (_, old_y) = terminal.cursor_position();

        if !out.is_empty() {
            terminal.log(Level::Info, &format!("{} | {}", title, out));
            if !out.ends_with('\n') {
                terminal.write("\n");
            }
        }
        if !err.is_empty() {
            terminal.log(Level::Error, &format!("{} | {}", title, err));
            if !err.ends_with('\n') {
                terminal.write("\n");
            }
        }
        terminal.flush();

        let (_, mut new_y) = terminal.cursor_position();
        if new_y == old_y {
            // Same line, so not a full line of output.
            new_y += 1;
        }

        let offset = new_y.saturating_sub(old_y);
        self.top_offset = self.top_offset.saturating_sub(offset);
        terminal.move_down(self.top_offset);

        self.update_status();
    }

    /// Repaint the worker overlay and the trailing status line.
    fn update_status(&mut self) {
        self.spinner_tick += 1;

        let terminal = self.terminal;
        terminal.update_size();

        let n_workers = self.workers.len();
        let columns = terminal.columns();
        let per_line = (columns / MIN_SLOT_WIDTH).max(1);
        let worker_lines =
            n_workers / per_line + if n_workers % per_line != 0 { 1 } else { 0 } + 1;
        let extra = columns.saturating_sub(per_line * MIN_SLOT_WIDTH) / per_line;
        let title_width = MAX_TITLE + extra;

        if worker_lines > self.top_offset {
            // Add lines to fit the overlay.
            for _ in 0..(worker_lines - self.top_offset) {
                terminal.log(Level::Info, "\n");
            }
            self.top_offset = worker_lines;
        }

        terminal.move_up(self.top_offset);
        terminal.move_left(columns);

        let mut in_line = 0;
        for worker in &self.workers {
            let slot = worker.slot.lock().unwrap();
            let title = slot.as_ref().map(|task| task.title()).unwrap_or("");
            terminal.log(
                Level::Info,
                &format!(
                    "[{}] {:<width$}",
                    self.spinner_char(worker),
                    title,
                    width = title_width
                ),
            );
            drop(slot);

            in_line += 1;
            if in_line == per_line {
                in_line = 0;
                terminal.log(Level::Info, "\n\r");
            }
        }
        if in_line != 0 {
            terminal.log(Level::Info, "\n\r");
        }

        match self.status {
            SchedulerStatus::Idle => {
                terminal.clear_down();
                terminal.log(Level::Info, "Ready.\n\r");
            }
            SchedulerStatus::Running => {
                terminal.log(
                    Level::Info,
                    &format!("[{:3}/{:<3}]\n\r", self.next_task, self.tasks.len()),
                );
            }
            SchedulerStatus::Stopping => {
                terminal.log(Level::Info, "Stopping workers...\n\r");
            }
            SchedulerStatus::Killing => {
                terminal.log(Level::Info, "Fatal: killing unfinished tasks!\n\r");
            }
        }

        terminal.flush();
    }

    fn spinner_char(&self, worker: &Worker) -> char {
        match worker.status() {
            WorkerStatus::WaitTask => '*',
            WorkerStatus::Working => SPINNER[self.spinner_tick % SPINNER.len()],
            WorkerStatus::Fail => 'X',
            WorkerStatus::Stopped => '=',
        }
    }
}

impl TaskList for Scheduler<'_> {
    fn add_command(&mut self, title: &str, cmdline: String, fail_if_non_zero: bool) {
        if self.check_running() {
            return;
        }
        self.terminal
            .log(Level::Detail, &format!("{}:\n\t{}\n", title, cmdline));
        self.tasks
            .push(Arc::new(Task::Command(Command::new(title, cmdline, fail_if_non_zero))));
    }

    fn add_barrier(&mut self) {
        if self.check_running() {
            return;
        }
        self.terminal
            .log(Level::Detail, &format!("{}\n", BARRIER_TITLE));
        self.tasks
            .push(Arc::new(Task::Barrier(Barrier::new(self.workers.len()))));
    }

    fn task_count(&self) -> usize {
        self.tasks.len()
    }
}
