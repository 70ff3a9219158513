//! The agent: one task queue, one processing loop, one result history.
//!
//! # Invariants
//! - `current_task.is_some()` if and only if the state is `Working`.
//! - At most one task executes per agent at any instant; the processing
//!   loop claims work only from a state that allows it.
//! - Every dequeued task produces exactly one `TaskResult`, whatever the
//!   worker does (return, fail, or panic).

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::types::CompletedSet;
use super::{AgentId, AgentState, AgentStats, AgentStatus, Worker};
use crate::task::{Task, TaskId, TaskQueue, TaskResult};

/// Estimate returned before any history exists.
const DEFAULT_ESTIMATE: Duration = Duration::from_secs(60);

/// A worker unit owning a private queue of prioritized tasks.
///
/// Cheap to clone; clones share the same queue, history, and state.
#[derive(Clone)]
pub struct Agent {
    id: AgentId,
    agent_type: String,
    worker: Arc<dyn Worker>,
    core: Arc<Mutex<AgentCore>>,
}

struct AgentCore {
    state: AgentState,
    current_task: Option<TaskId>,
    queue: TaskQueue,
    history: Vec<TaskResult>,
    completed: CompletedSet,
    stats: AgentStats,
    pause_requested: bool,
}

impl Agent {
    /// Create an agent of the given type around a worker.
    pub fn new(agent_type: impl Into<String>, worker: Arc<dyn Worker>) -> Self {
        let agent = Self {
            id: AgentId::new(),
            agent_type: agent_type.into(),
            worker,
            core: Arc::new(Mutex::new(AgentCore {
                state: AgentState::Idle,
                current_task: None,
                queue: TaskQueue::new(),
                history: Vec::new(),
                completed: CompletedSet::new(),
                stats: AgentStats::default(),
                pause_requested: false,
            })),
        };
        info!(agent = %agent.id, agent_type = %agent.agent_type, "agent initialized");
        agent
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn agent_type(&self) -> &str {
        &self.agent_type
    }

    /// Whether this agent's worker implements the given task type.
    pub fn can_handle(&self, task_type: &str) -> bool {
        self.worker
            .capabilities()
            .iter()
            .any(|capability| capability == task_type)
    }

    /// Submit a task to this agent's queue.
    ///
    /// Returns `true` if the task was admitted. Admission fails when a
    /// declared dependency has no successful result yet; the caller may
    /// resubmit after the dependency completes. If the agent is idle the
    /// processing loop is started in the background - the caller is never
    /// blocked by execution.
    pub async fn add_task(&self, task: Task) -> bool {
        let task_id = task.id();
        let mut core = self.core.lock().await;
        let core = &mut *core;

        if let Err(error) = core.queue.submit(task, &core.completed) {
            warn!(agent = %self.id, task = %task_id, %error, "task rejected");
            return false;
        }
        info!(
            agent = %self.id,
            task = %task_id,
            queue_len = core.queue.len(),
            "task queued"
        );

        if core.state.can_start_work() && core.current_task.is_none() {
            let agent = self.clone();
            tokio::spawn(async move { agent.run().await });
        }
        true
    }

    /// Drive the queue until it drains or the agent is paused.
    async fn run(&self) {
        while self.process_next().await {}
    }

    /// Process the next ready task, if the agent may start work.
    ///
    /// No-op (returns `false`) unless the agent is idle with an empty
    /// execution slot. Returns `true` when a task was processed and more
    /// queued work may follow.
    pub async fn process_next(&self) -> bool {
        let task = {
            let mut core = self.core.lock().await;
            if !core.state.can_start_work() || core.current_task.is_some() {
                return false;
            }
            let Some(task) = core.queue.next_ready() else {
                return false;
            };
            core.state = AgentState::Working;
            core.current_task = Some(task.id());
            task
        };

        info!(agent = %self.id, task = %task.id(), "processing task");
        let started = tokio::time::Instant::now();
        let outcome = AssertUnwindSafe(self.worker.process(&task))
            .catch_unwind()
            .await;
        let elapsed = started.elapsed();

        let mut panicked = false;
        let result = match outcome {
            Ok(Ok(work)) => {
                let result = TaskResult::success(task.id(), self.id, work.output)
                    .with_processing_time(elapsed);
                match work.quality_score {
                    Some(score) => result.with_quality_score(score),
                    None => result,
                }
            }
            Ok(Err(error)) => {
                warn!(agent = %self.id, task = %task.id(), %error, "task failed");
                TaskResult::failure(task.id(), self.id, error.to_string())
                    .with_processing_time(elapsed)
            }
            Err(payload) => {
                panicked = true;
                let message = panic_message(payload);
                error!(agent = %self.id, task = %task.id(), message = %message, "worker panicked");
                TaskResult::failure(task.id(), self.id, format!("worker panicked: {message}"))
                    .with_processing_time(elapsed)
            }
        };

        let mut core = self.core.lock().await;
        let core = &mut *core;
        if result.success {
            core.completed.insert(task.id());
        }
        debug!(
            agent = %self.id,
            task = %task.id(),
            success = result.success,
            elapsed_ms = elapsed.as_millis() as u64,
            "task finished"
        );
        core.history.push(result);
        core.stats = AgentStats::from_history(&core.history);
        core.current_task = None;
        core.state = if panicked {
            AgentState::Error
        } else if core.pause_requested {
            core.pause_requested = false;
            info!(agent = %self.id, "agent paused");
            AgentState::Paused
        } else {
            AgentState::Idle
        };

        core.state.can_start_work() && !core.queue.is_empty()
    }

    /// Request a pause.
    ///
    /// Only meaningful while working. Takes effect when the in-flight task
    /// completes, so the current-task invariant holds at every instant;
    /// queued tasks stay queued.
    pub async fn pause(&self) {
        let mut core = self.core.lock().await;
        if core.state == AgentState::Working {
            core.pause_requested = true;
            info!(agent = %self.id, "pause requested");
        }
    }

    /// Resume a paused agent and restart the loop if work is queued.
    pub async fn resume(&self) {
        let mut core = self.core.lock().await;
        if core.state != AgentState::Paused {
            return;
        }
        core.state = AgentState::Idle;
        info!(agent = %self.id, "agent resumed");
        if !core.queue.is_empty() {
            let agent = self.clone();
            tokio::spawn(async move { agent.run().await });
        }
    }

    /// Estimated processing time for a task of the given priority:
    /// historical mean scaled per priority, or a fixed default with no
    /// history.
    pub async fn estimate_processing_time(&self, task: &Task) -> Duration {
        let core = self.core.lock().await;
        match core.stats.average_processing_time {
            Some(mean) => Duration::from_secs_f64(
                mean.as_secs_f64() * task.priority().duration_multiplier(),
            ),
            None => DEFAULT_ESTIMATE,
        }
    }

    /// Read-only snapshot of state, current task, queue length, and
    /// statistics.
    pub async fn status(&self) -> AgentStatus {
        let core = self.core.lock().await;
        AgentStatus {
            agent_id: self.id,
            agent_type: self.agent_type.clone(),
            state: core.state,
            current_task: core.current_task,
            queue_len: core.queue.len(),
            capabilities: self.worker.capabilities().to_vec(),
            stats: core.stats,
        }
    }

    /// The result recorded for a task, if it has finished.
    pub async fn result(&self, task_id: TaskId) -> Option<TaskResult> {
        let core = self.core.lock().await;
        core.history.iter().find(|r| r.task_id == task_id).cloned()
    }

    /// The most recent results, newest last.
    pub async fn recent_results(&self, limit: usize) -> Vec<TaskResult> {
        let core = self.core.lock().await;
        let skip = core.history.len().saturating_sub(limit);
        core.history[skip..].to_vec()
    }

    /// Drop all pending tasks, returning how many were removed. The
    /// in-flight task, if any, is unaffected.
    pub async fn clear_queue(&self) -> usize {
        let mut core = self.core.lock().await;
        let cleared = core.queue.clear();
        info!(agent = %self.id, cleared, "queue cleared");
        cleared
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{WorkOutput, WorkerError};
    use crate::task::TaskPriority;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    /// Worker that records the order it processes labels in, optionally
    /// gated on a semaphore so tests control when work proceeds.
    struct RecordingWorker {
        capabilities: Vec<String>,
        order: std::sync::Mutex<Vec<String>>,
        gate: Option<Arc<Semaphore>>,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl RecordingWorker {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                capabilities: vec!["test".to_string()],
                order: std::sync::Mutex::new(Vec::new()),
                gate: None,
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            })
        }

        fn gated(gate: Arc<Semaphore>) -> Arc<Self> {
            Arc::new(Self {
                capabilities: vec!["test".to_string()],
                order: std::sync::Mutex::new(Vec::new()),
                gate: Some(gate),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            })
        }

        fn order(&self) -> Vec<String> {
            self.order.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Worker for RecordingWorker {
        fn capabilities(&self) -> &[String] {
            &self.capabilities
        }

        async fn process(&self, task: &Task) -> Result<WorkOutput, WorkerError> {
            let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);

            if let Some(gate) = &self.gate {
                let permit = gate.acquire().await.expect("gate closed");
                permit.forget();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;

            let label = task.payload()["label"].as_str().unwrap_or("?").to_string();
            self.order.lock().unwrap().push(label);

            if task.payload()["fail"].as_bool().unwrap_or(false) {
                self.active.fetch_sub(1, Ordering::SeqCst);
                return Err(WorkerError::ExecutionFailed("scripted failure".into()));
            }
            if task.payload()["panic"].as_bool().unwrap_or(false) {
                self.active.fetch_sub(1, Ordering::SeqCst);
                panic!("scripted panic");
            }

            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(WorkOutput::new(task.payload().clone()).with_quality(0.9))
        }
    }

    fn task(label: &str) -> Task {
        Task::new("test", serde_json::json!({ "label": label }))
    }

    async fn wait_for_completed(agent: &Agent, count: u64) {
        for _ in 0..10_000 {
            if agent.status().await.stats.total_completed >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("timed out waiting for {count} completed tasks");
    }

    async fn wait_for_state(agent: &Agent, state: AgentState) {
        for _ in 0..10_000 {
            if agent.status().await.state == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("timed out waiting for state {state}");
    }

    #[tokio::test(start_paused = true)]
    async fn add_task_processes_in_background() {
        let worker = RecordingWorker::new();
        let agent = Agent::new("test", worker.clone());

        assert!(agent.add_task(task("only")).await);
        wait_for_completed(&agent, 1).await;

        let status = agent.status().await;
        assert_eq!(status.state, AgentState::Idle);
        assert!(status.current_task.is_none());
        assert_eq!(status.queue_len, 0);
        assert_eq!(worker.order(), vec!["only"]);
    }

    #[tokio::test(start_paused = true)]
    async fn single_flight_under_concurrent_submission() {
        let worker = RecordingWorker::new();
        let agent = Agent::new("test", worker.clone());

        let mut handles = Vec::new();
        for i in 0..4 {
            let agent = agent.clone();
            handles.push(tokio::spawn(async move {
                agent.add_task(task(&format!("t{i}"))).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        wait_for_completed(&agent, 4).await;
        assert_eq!(worker.peak.load(Ordering::SeqCst), 1);
        assert_eq!(agent.status().await.queue_len, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn queued_tasks_run_in_priority_order() {
        let gate = Arc::new(Semaphore::new(0));
        let worker = RecordingWorker::gated(gate.clone());
        let agent = Agent::new("test", worker.clone());

        // The first task blocks on the gate while the rest queue up.
        agent.add_task(task("blocker")).await;
        agent
            .add_task(task("low").with_priority(TaskPriority::Low))
            .await;
        agent
            .add_task(task("high").with_priority(TaskPriority::High))
            .await;
        agent
            .add_task(task("medium").with_priority(TaskPriority::Medium))
            .await;

        gate.add_permits(4);
        wait_for_completed(&agent, 4).await;

        // The blocker may have been claimed before or after the others were
        // queued; among the still-queued tasks priority order always wins.
        let order = worker.order();
        let position = |label: &str| order.iter().position(|l| l == label).unwrap();
        assert!(position("high") < position("medium"));
        assert!(position("medium") < position("low"));
    }

    #[tokio::test(start_paused = true)]
    async fn dependency_gating_through_the_agent() {
        let worker = RecordingWorker::new();
        let agent = Agent::new("test", worker.clone());

        let prerequisite = task("prerequisite");
        let prerequisite_id = prerequisite.id();
        let gated = || {
            Task::new("test", serde_json::json!({ "label": "gated" }))
                .with_dependencies(vec![prerequisite_id])
        };

        // Rejected before any result for the dependency exists.
        assert!(!agent.add_task(gated()).await);

        agent.add_task(prerequisite).await;
        wait_for_completed(&agent, 1).await;

        // Accepted once the dependency has a successful result.
        assert!(agent.add_task(gated()).await);
        wait_for_completed(&agent, 2).await;
        assert_eq!(worker.order(), vec!["prerequisite", "gated"]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_dependency_does_not_satisfy_gating() {
        let worker = RecordingWorker::new();
        let agent = Agent::new("test", worker);

        let failing = Task::new("test", serde_json::json!({ "label": "dep", "fail": true }));
        let failing_id = failing.id();
        agent.add_task(failing).await;
        wait_for_completed(&agent, 1).await;

        let gated = Task::new("test", serde_json::Value::Null)
            .with_dependencies(vec![failing_id]);
        assert!(!agent.add_task(gated).await);
    }

    #[tokio::test(start_paused = true)]
    async fn worker_error_becomes_failed_result_and_loop_continues() {
        let worker = RecordingWorker::new();
        let agent = Agent::new("test", worker.clone());

        let failing = Task::new("test", serde_json::json!({ "label": "bad", "fail": true }));
        let failing_id = failing.id();
        agent.add_task(failing).await;
        agent.add_task(task("good")).await;
        wait_for_completed(&agent, 2).await;

        let failed = agent.result(failing_id).await.unwrap();
        assert!(!failed.success);
        assert!(failed.error_message.unwrap().contains("scripted failure"));

        let status = agent.status().await;
        assert_eq!(status.state, AgentState::Idle);
        assert_eq!(status.stats.success_rate, 0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn worker_panic_is_contained() {
        let worker = RecordingWorker::new();
        let agent = Agent::new("test", worker.clone());

        let exploding = Task::new("test", serde_json::json!({ "label": "boom", "panic": true }));
        let exploding_id = exploding.id();
        agent.add_task(exploding).await;
        wait_for_completed(&agent, 1).await;

        let result = agent.result(exploding_id).await.unwrap();
        assert!(!result.success);
        assert!(result.error_message.unwrap().contains("scripted panic"));
        assert_eq!(agent.status().await.state, AgentState::Error);

        // The error state never blocks new work.
        agent.add_task(task("after")).await;
        wait_for_completed(&agent, 2).await;
        assert_eq!(agent.status().await.state, AgentState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_applies_after_current_task_and_resume_restarts() {
        let gate = Arc::new(Semaphore::new(0));
        let worker = RecordingWorker::gated(gate.clone());
        let agent = Agent::new("test", worker.clone());

        agent.add_task(task("first")).await;
        agent.add_task(task("second")).await;
        wait_for_state(&agent, AgentState::Working).await;

        agent.pause().await;
        // Still working: the pause lands when the in-flight task ends.
        assert_eq!(agent.status().await.state, AgentState::Working);

        gate.add_permits(1);
        wait_for_state(&agent, AgentState::Paused).await;

        let status = agent.status().await;
        assert!(status.current_task.is_none());
        assert_eq!(status.queue_len, 1);
        assert_eq!(status.stats.total_completed, 1);

        gate.add_permits(1);
        agent.resume().await;
        wait_for_completed(&agent, 2).await;
        assert_eq!(worker.order(), vec!["first", "second"]);
    }

    #[tokio::test(start_paused = true)]
    async fn estimates_scale_history_mean_by_priority() {
        let worker = RecordingWorker::new();
        let agent = Agent::new("test", worker);

        // No history yet: fixed default.
        let fresh = task("a").with_priority(TaskPriority::Critical);
        assert_eq!(
            agent.estimate_processing_time(&fresh).await,
            Duration::from_secs(60)
        );

        agent.add_task(task("warmup")).await;
        wait_for_completed(&agent, 1).await;

        // The worker sleeps 10ms per task under a paused clock.
        let mean = Duration::from_millis(10).as_secs_f64();
        for (priority, multiplier) in [
            (TaskPriority::Low, 0.8),
            (TaskPriority::Medium, 1.0),
            (TaskPriority::High, 1.3),
            (TaskPriority::Critical, 1.5),
        ] {
            let estimate = agent
                .estimate_processing_time(&task("probe").with_priority(priority))
                .await;
            assert!(
                (estimate.as_secs_f64() - mean * multiplier).abs() < 1e-6,
                "priority {priority}: {estimate:?}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn recent_results_and_clear_queue() {
        let gate = Arc::new(Semaphore::new(0));
        let worker = RecordingWorker::gated(gate.clone());
        let agent = Agent::new("test", worker);

        agent.add_task(task("running")).await;
        agent.add_task(task("queued-1")).await;
        agent.add_task(task("queued-2")).await;
        wait_for_state(&agent, AgentState::Working).await;

        // Clearing drops only queued tasks, not the in-flight one.
        assert_eq!(agent.clear_queue().await, 2);

        gate.add_permits(1);
        wait_for_completed(&agent, 1).await;

        let recent = agent.recent_results(10).await;
        assert_eq!(recent.len(), 1);
        assert!(recent[0].success);
    }

    #[tokio::test]
    async fn capability_routing() {
        let worker = RecordingWorker::new();
        let agent = Agent::new("test", worker);
        assert!(agent.can_handle("test"));
        assert!(!agent.can_handle("render"));
    }
}
