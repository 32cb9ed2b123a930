use super::types::SubTask;

use std::collections::VecDeque;

/// Pending sub-tasks awaiting an available worker.
///
/// FIFO, single-owner (only the broker loop touches it). Requeued tasks go
/// to the front so work interrupted by a worker death is retried before new
/// fan-out.
#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: VecDeque<SubTask>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            tasks: VecDeque::new(),
        }
    }

    pub fn push(&mut self, task: SubTask) {
        self.tasks.push_back(task);
    }

    /// Puts a task back after its worker died mid-flight.
    pub fn requeue(&mut self, task: SubTask) {
        self.tasks.push_front(task);
    }

    pub fn pop(&mut self) -> Option<SubTask> {
        self.tasks.pop_front()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
