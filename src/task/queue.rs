//! Per-agent pending-task collection with priority insertion and
//! dependency gating.
//!
//! # Invariants
//! - Queue order is priority-major, insertion-order-minor: a submitted task
//!   is placed before the first queued task of *strictly* lower priority,
//!   so equal-priority tasks keep arrival order.
//! - A task whose dependencies have no successful result is rejected at
//!   submission. The result history is append-only, so a dependency that
//!   is satisfied at submission stays satisfied; `next_ready` does not
//!   re-check.

use std::collections::{HashSet, VecDeque};

use tracing::debug;

use super::{Task, TaskId};

/// Submission failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("task {task} depends on {dependency}, which has no successful result yet")]
    DependencyUnsatisfied { task: TaskId, dependency: TaskId },
}

/// Ordered collection of pending tasks, owned by a single agent.
#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: VecDeque<Task>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a task, placing it according to its priority.
    ///
    /// `completed` is the set of task ids with a successful result recorded
    /// by the owning agent; every declared dependency must be in it.
    ///
    /// # Errors
    /// `SubmitError::DependencyUnsatisfied` naming the first missing
    /// dependency. The caller may resubmit once that task has succeeded.
    pub fn submit(&mut self, task: Task, completed: &HashSet<TaskId>) -> Result<(), SubmitError> {
        if let Some(missing) = task
            .dependencies()
            .iter()
            .find(|dep| !completed.contains(dep))
        {
            return Err(SubmitError::DependencyUnsatisfied {
                task: task.id(),
                dependency: *missing,
            });
        }

        let position = self
            .tasks
            .iter()
            .position(|queued| queued.priority() < task.priority())
            .unwrap_or(self.tasks.len());

        debug!(
            task = %task.id(),
            priority = %task.priority(),
            position,
            "task admitted to queue"
        );
        self.tasks.insert(position, task);
        Ok(())
    }

    /// Remove and return the highest-priority queued task.
    ///
    /// Dependencies were validated at submission; no readiness check
    /// happens here.
    pub fn next_ready(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Drop all pending tasks, returning how many were removed.
    pub fn clear(&mut self) -> usize {
        let cleared = self.tasks.len();
        self.tasks.clear();
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskPriority;

    fn task(label: &str, priority: TaskPriority) -> Task {
        Task::new("test", serde_json::json!({ "label": label })).with_priority(priority)
    }

    fn label(task: &Task) -> String {
        task.payload()["label"].as_str().unwrap_or_default().to_string()
    }

    #[test]
    fn dequeues_by_priority_then_arrival() {
        let mut queue = TaskQueue::new();
        let none = HashSet::new();

        queue.submit(task("a", TaskPriority::Low), &none).unwrap();
        queue.submit(task("b", TaskPriority::High), &none).unwrap();
        queue.submit(task("c", TaskPriority::Medium), &none).unwrap();

        let order: Vec<String> = std::iter::from_fn(|| queue.next_ready())
            .map(|t| label(&t))
            .collect();
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[test]
    fn equal_priority_keeps_arrival_order() {
        let mut queue = TaskQueue::new();
        let none = HashSet::new();

        for name in ["first", "second", "third"] {
            queue.submit(task(name, TaskPriority::Medium), &none).unwrap();
        }

        let order: Vec<String> = std::iter::from_fn(|| queue.next_ready())
            .map(|t| label(&t))
            .collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }

    #[test]
    fn critical_preempts_queue_head() {
        let mut queue = TaskQueue::new();
        let none = HashSet::new();

        queue.submit(task("high", TaskPriority::High), &none).unwrap();
        queue.submit(task("critical", TaskPriority::Critical), &none).unwrap();

        assert_eq!(label(&queue.next_ready().unwrap()), "critical");
        assert_eq!(label(&queue.next_ready().unwrap()), "high");
    }

    #[test]
    fn rejects_unsatisfied_dependency() {
        let mut queue = TaskQueue::new();
        let dependency = TaskId::new();
        let gated = Task::new("test", serde_json::Value::Null)
            .with_dependencies(vec![dependency]);
        let gated_id = gated.id();

        let err = queue.submit(gated, &HashSet::new()).unwrap_err();
        assert_eq!(
            err,
            SubmitError::DependencyUnsatisfied {
                task: gated_id,
                dependency,
            }
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn accepts_once_dependency_succeeded() {
        let mut queue = TaskQueue::new();
        let dependency = TaskId::new();
        let gated = Task::new("test", serde_json::Value::Null)
            .with_dependencies(vec![dependency]);

        let mut completed = HashSet::new();
        completed.insert(dependency);
        assert!(queue.submit(gated, &completed).is_ok());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn dependency_not_rechecked_at_dequeue() {
        // Dependencies are checked at submission only: once admitted, a task
        // is dequeued regardless of what the completed set looks like later.
        let mut queue = TaskQueue::new();
        let dependency = TaskId::new();
        let mut completed = HashSet::new();
        completed.insert(dependency);

        let gated = Task::new("test", serde_json::Value::Null)
            .with_dependencies(vec![dependency]);
        queue.submit(gated, &completed).unwrap();

        completed.clear();
        assert!(queue.next_ready().is_some());
    }

    #[test]
    fn next_ready_on_empty_queue() {
        let mut queue = TaskQueue::new();
        assert!(queue.next_ready().is_none());
    }

    #[test]
    fn clear_reports_dropped_count() {
        let mut queue = TaskQueue::new();
        let none = HashSet::new();
        queue.submit(task("a", TaskPriority::Low), &none).unwrap();
        queue.submit(task("b", TaskPriority::High), &none).unwrap();

        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
    }
}
