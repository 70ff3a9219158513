//! Agent pool: registry keyed by agent identity and type.
//!
//! Registration happens at startup and lookups dominate afterwards, so a
//! single read-write guard over the registry is enough; per-agent state
//! stays behind each agent's own lock.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

use super::{Agent, AgentId, AgentState};

/// Registry of agents, shared across the process.
#[derive(Clone, Default)]
pub struct AgentPool {
    inner: Arc<RwLock<PoolInner>>,
}

#[derive(Default)]
struct PoolInner {
    agents: HashMap<AgentId, Agent>,
    by_type: HashMap<String, Vec<AgentId>>,
}

/// Aggregate state counts across all registered agents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub idle: usize,
    pub working: usize,
    pub paused: usize,
    pub error: usize,
}

/// Per-type aggregate.
#[derive(Debug, Clone, Serialize)]
pub struct TypeStatus {
    pub count: usize,
    pub idle: usize,
    pub working: usize,
    pub average_queue_len: f64,
}

/// Read-only projection over the whole pool.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub total_agents: usize,
    pub agent_types: HashMap<String, TypeStatus>,
    pub overall: StateCounts,
}

impl AgentPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent under its identity and type.
    pub async fn register(&self, agent: Agent) {
        let mut inner = self.inner.write().await;
        let id = agent.id();
        let agent_type = agent.agent_type().to_string();
        inner
            .by_type
            .entry(agent_type.clone())
            .or_default()
            .push(id);
        inner.agents.insert(id, agent);
        info!(agent = %id, agent_type = %agent_type, "agent registered in pool");
    }

    /// Look up an agent by identity.
    pub async fn agent(&self, id: AgentId) -> Option<Agent> {
        let inner = self.inner.read().await;
        inner.agents.get(&id).cloned()
    }

    /// All agents of a type, in registration order.
    pub async fn agents_by_type(&self, agent_type: &str) -> Vec<Agent> {
        let inner = self.inner.read().await;
        inner
            .by_type
            .get(agent_type)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.agents.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Pick an agent of the given type for new work.
    ///
    /// Prefers an idle agent with no current task; otherwise the one with
    /// the shortest queue. `None` when no agent of that type is
    /// registered.
    pub async fn available_agent(&self, agent_type: &str) -> Option<Agent> {
        let agents = self.agents_by_type(agent_type).await;
        if agents.is_empty() {
            return None;
        }

        let mut shortest: Option<(usize, Agent)> = None;
        for agent in agents {
            let status = agent.status().await;
            if status.state == AgentState::Idle && status.current_task.is_none() {
                return Some(agent);
            }
            let replace = match &shortest {
                Some((queue_len, _)) => status.queue_len < *queue_len,
                None => true,
            };
            if replace {
                shortest = Some((status.queue_len, agent));
            }
        }
        shortest.map(|(_, agent)| agent)
    }

    /// Number of registered agents.
    pub async fn len(&self) -> usize {
        self.inner.read().await.agents.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.agents.is_empty()
    }

    /// Aggregate per-type and overall state counts.
    ///
    /// A pure read-only projection: it takes the registry read guard to
    /// walk a stable agent list and each agent's own lock only to
    /// snapshot it.
    pub async fn status(&self) -> PoolStatus {
        let agents_by_type: Vec<(String, Vec<Agent>)> = {
            let inner = self.inner.read().await;
            inner
                .by_type
                .iter()
                .map(|(agent_type, ids)| {
                    (
                        agent_type.clone(),
                        ids.iter()
                            .filter_map(|id| inner.agents.get(id).cloned())
                            .collect(),
                    )
                })
                .collect()
        };

        let mut overall = StateCounts::default();
        let mut agent_types = HashMap::new();
        let mut total_agents = 0;

        for (agent_type, agents) in agents_by_type {
            let mut type_status = TypeStatus {
                count: agents.len(),
                idle: 0,
                working: 0,
                average_queue_len: 0.0,
            };
            let mut queued = 0usize;

            for agent in &agents {
                let status = agent.status().await;
                queued += status.queue_len;
                match status.state {
                    AgentState::Idle => {
                        type_status.idle += 1;
                        overall.idle += 1;
                    }
                    AgentState::Working => {
                        type_status.working += 1;
                        overall.working += 1;
                    }
                    AgentState::Paused => overall.paused += 1,
                    AgentState::Error => overall.error += 1,
                }
            }

            if !agents.is_empty() {
                type_status.average_queue_len = queued as f64 / agents.len() as f64;
            }
            total_agents += agents.len();
            agent_types.insert(agent_type, type_status);
        }

        PoolStatus {
            total_agents,
            agent_types,
            overall,
        }
    }
}
