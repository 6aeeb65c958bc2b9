// schedule.rs: deferred tasks, drained by the manager's clock

use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deferred {
    /// Show a label that was positioned while hidden.
    RevealLabel(String),
    RetryPointLabels,
    RetryMarkerLabels,
    ResumeAutoRotate,
}

#[derive(Debug, Default)]
pub struct Timeline {
    entries: Vec<(Instant, Deferred)>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due: Instant, task: Deferred) {
        self.entries.push((due, task));
    }

    /// Schedules `task` unless an equal task is already waiting.
    pub fn schedule_once(&mut self, due: Instant, task: Deferred) -> bool {
        if self.is_pending(&task) {
            return false;
        }
        self.schedule(due, task);
        true
    }

    /// Replaces any pending equal task, so only the latest call fires.
    pub fn debounce(&mut self, due: Instant, task: Deferred) {
        self.cancel(&task);
        self.schedule(due, task);
    }

    pub fn cancel(&mut self, task: &Deferred) {
        self.entries.retain(|(_, t)| t != task);
    }

    pub fn cancel_where(&mut self, pred: impl Fn(&Deferred) -> bool) {
        self.entries.retain(|(_, t)| !pred(t));
    }

    pub fn is_pending(&self, task: &Deferred) -> bool {
        self.entries.iter().any(|(_, t)| t == task)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes and returns the tasks due at `now`, earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<Deferred> {
        let mut due = Vec::new();
        let mut i = 0;
        while i < self.entries.len() {
            if self.entries[i].0 <= now {
                due.push(self.entries.remove(i));
            } else {
                i += 1;
            }
        }
        due.sort_by_key(|(at, _)| *at);
        due.into_iter().map(|(_, task)| task).collect()
    }
}
