//! Agent State Store
//!
//! Single publication point for the values other components read: resource
//! usage, the current throttling level, the last recorded error and the
//! readiness flags reported by external collaborators.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

use crate::agent::throttle::ThrottleLevel;

/// Maximum number of level transitions kept in memory
const MAX_TRANSITIONS: usize = 100;

/// Readiness of services the agent depends on but does not run itself.
/// `None` means nobody has reported yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readiness {
    pub aws_ready: Option<bool>,
    pub vector_ready: Option<bool>,
    pub redis_ready: Option<bool>,
    pub pipeline_ok: Option<bool>,
    pub docker_healthy: Option<bool>,
}

/// Collaborator whose readiness can be published
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    SearchBackend,
    LogShipper,
    Queue,
    Pipeline,
    ContainerStack,
}

/// Immutable copy of the published state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub cpu_usage: f64,
    pub ram_usage: f64,
    pub throttling_level: ThrottleLevel,
    pub last_error: String,
    #[serde(flatten)]
    pub readiness: Readiness,
    pub hostname: String,
    pub updated_at: Option<DateTime<Utc>>,
}

/// One field update. Each variant is applied as a single assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum StateUpdate {
    CpuUsage(f64),
    RamUsage(f64),
    ThrottlingLevel(ThrottleLevel),
    LastError(String),
    Ready(Collaborator, bool),
}

/// Recorded change of the throttling level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelTransition {
    pub from: ThrottleLevel,
    pub to: ThrottleLevel,
    pub cpu_usage: f64,
    pub ram_usage: f64,
    pub timestamp: DateTime<Utc>,
}

struct StateInner {
    snapshot: StatusSnapshot,
    transitions: VecDeque<LevelTransition>,
}

/// Thread-safe state store. Clones share the same underlying state.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<RwLock<StateInner>>,
}

impl StateStore {
    /// Create a store with zeroed usage and no readiness reports
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StateInner {
                snapshot: StatusSnapshot {
                    cpu_usage: 0.0,
                    ram_usage: 0.0,
                    throttling_level: ThrottleLevel::None,
                    last_error: String::new(),
                    readiness: Readiness::default(),
                    hostname: hostname.into(),
                    updated_at: None,
                },
                transitions: VecDeque::new(),
            })),
        }
    }

    /// Apply a batch of field updates
    pub fn publish<I>(&self, updates: I)
    where
        I: IntoIterator<Item = StateUpdate>,
    {
        let mut inner = self.inner.write();
        for update in updates {
            inner.apply(update);
        }
        inner.snapshot.updated_at = Some(Utc::now());
    }

    /// Owned copy of the current state
    pub fn snapshot(&self) -> StatusSnapshot {
        self.inner.read().snapshot.clone()
    }

    /// Current throttling level
    pub fn throttling_level(&self) -> ThrottleLevel {
        self.inner.read().snapshot.throttling_level
    }

    /// Most recent level transitions, newest first
    pub fn recent_transitions(&self, count: usize) -> Vec<LevelTransition> {
        let inner = self.inner.read();
        inner.transitions.iter().rev().take(count).cloned().collect()
    }
}

impl StateInner {
    fn apply(&mut self, update: StateUpdate) {
        let snapshot = &mut self.snapshot;
        match update {
            StateUpdate::CpuUsage(value) => snapshot.cpu_usage = value,
            StateUpdate::RamUsage(value) => snapshot.ram_usage = value,
            StateUpdate::ThrottlingLevel(level) => {
                if level != snapshot.throttling_level {
                    self.transitions.push_back(LevelTransition {
                        from: snapshot.throttling_level,
                        to: level,
                        cpu_usage: snapshot.cpu_usage,
                        ram_usage: snapshot.ram_usage,
                        timestamp: Utc::now(),
                    });
                    if self.transitions.len() > MAX_TRANSITIONS {
                        self.transitions.pop_front();
                    }
                }
                snapshot.throttling_level = level;
            }
            StateUpdate::LastError(message) => snapshot.last_error = message,
            StateUpdate::Ready(collaborator, ready) => {
                let readiness = &mut snapshot.readiness;
                let slot = match collaborator {
                    Collaborator::SearchBackend => &mut readiness.aws_ready,
                    Collaborator::LogShipper => &mut readiness.vector_ready,
                    Collaborator::Queue => &mut readiness.redis_ready,
                    Collaborator::Pipeline => &mut readiness.pipeline_ok,
                    Collaborator::ContainerStack => &mut readiness.docker_healthy,
                };
                *slot = Some(ready);
            }
        }
    }
}
