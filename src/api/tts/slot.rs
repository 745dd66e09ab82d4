//! Single-instance worker slot.
//!
//! A slot owns one long-lived thread per pipeline stage. The thread parks on
//! the slot's condvar until `ensure_running` flips the status to `Running`,
//! drains its queue once ("a run"), then reports `Stopped` and parks again.
//! A run never waits for work to show up; it ends as soon as its queue is
//! empty or blocked, and only another `ensure_running` starts the next one.

use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};

use super::types::WorkerStatus;

struct SlotState {
    status: WorkerStatus,
    /// Set when `ensure_running` lands while a run is in progress
    rerun: bool,
    shutdown: bool,
    runs: u64,
}

pub struct WorkerSlot {
    name: &'static str,
    state: Mutex<SlotState>,
    signal: Condvar,
}

impl WorkerSlot {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(SlotState {
                status: WorkerStatus::NotStarted,
                rerun: false,
                shutdown: false,
                runs: 0,
            }),
            signal: Condvar::new(),
        }
    }

    pub fn status(&self) -> WorkerStatus {
        self.state.lock().status
    }

    /// Number of runs started so far.
    pub fn runs(&self) -> u64 {
        self.state.lock().runs
    }

    /// Start a run unless one is in progress. Returns true if a run was started.
    pub fn ensure_running(&self) -> bool {
        let mut state = self.state.lock();
        if state.shutdown {
            return false;
        }
        if state.status == WorkerStatus::Running {
            state.rerun = true;
            return false;
        }
        state.status = WorkerStatus::Running;
        state.runs += 1;
        self.signal.notify_one();
        tracing::trace!(worker = self.name, run = state.runs, "worker started");
        true
    }

    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown = true;
        self.signal.notify_all();
    }

    /// Blocks until a run is requested. Returns false on shutdown.
    fn wait_for_run(&self) -> bool {
        let mut state = self.state.lock();
        while state.status != WorkerStatus::Running && !state.shutdown {
            self.signal.wait(&mut state);
        }
        !state.shutdown
    }

    /// Ends a run. Returns true if a request arrived mid-run and the worker
    /// should look at its queue once more.
    fn finish_run(&self) -> bool {
        let mut state = self.state.lock();
        if state.rerun && !state.shutdown {
            state.rerun = false;
            return true;
        }
        state.rerun = false;
        state.status = WorkerStatus::Stopped;
        tracing::trace!(worker = self.name, "worker stopped");
        false
    }

    /// Thread body: serve runs until shutdown. A panicking run counts as a
    /// stopped worker and leaves the slot restartable.
    pub fn serve<F: FnMut()>(&self, mut run: F) {
        while self.wait_for_run() {
            loop {
                if panic::catch_unwind(AssertUnwindSafe(&mut run)).is_err() {
                    tracing::error!(worker = self.name, "worker run panicked");
                }
                if !self.finish_run() {
                    break;
                }
            }
        }
        let mut state = self.state.lock();
        state.status = WorkerStatus::Stopped;
    }
}
