//! Swarm task pool.

use chorus_wire::{elapsed, Millis, NodeId, TaskCategory};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Assigned,
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Task ids are only unique per requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskKey {
    pub requester: NodeId,
    pub id: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmTask {
    pub key: TaskKey,
    pub category: TaskCategory,
    pub priority: u8,
    pub assignee: Option<NodeId>,
    pub status: TaskStatus,
    pub created_at: Millis,
    /// Allowed running time from `created_at`.
    pub timeout_ms: Millis,
    /// Percent, 0..=100.
    pub progress: u8,
}

impl SwarmTask {
    pub fn is_live(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn is_overdue(&self, now: Millis) -> bool {
        elapsed(now, self.created_at) > self.timeout_ms
    }

    /// Move to `to`, enforcing pending → assigned → active → terminal.
    /// Skipping forward is allowed, going back is not.
    fn transition(&mut self, to: TaskStatus) -> Result<()> {
        let allowed = match (self.status, to) {
            (from, _) if from.is_terminal() => false,
            (_, TaskStatus::Failed | TaskStatus::Cancelled | TaskStatus::Completed) => true,
            (TaskStatus::Pending, TaskStatus::Assigned | TaskStatus::Active) => true,
            (TaskStatus::Assigned, TaskStatus::Active) => true,
            _ => false,
        };
        if !allowed {
            return Err(Error::InvalidTransition {
                id: self.key.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

/// Bounded pool of local and remote tasks.
#[derive(Debug, Clone)]
pub struct TaskPool {
    tasks: Vec<SwarmTask>,
    capacity: usize,
    next_id: u16,
    default_timeout: Millis,
}

impl TaskPool {
    pub fn new(capacity: usize, default_timeout: Millis) -> Self {
        Self {
            tasks: Vec::with_capacity(capacity),
            capacity,
            next_id: 1,
            default_timeout,
        }
    }

    pub fn get(&self, key: &TaskKey) -> Option<&SwarmTask> {
        self.tasks.iter().find(|t| t.key == *key)
    }

    fn get_mut(&mut self, key: &TaskKey) -> Result<&mut SwarmTask> {
        self.tasks
            .iter_mut()
            .find(|t| t.key == *key)
            .ok_or(Error::UnknownTask {
                requester: key.requester,
                id: key.id,
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &SwarmTask> {
        self.tasks.iter()
    }

    pub fn live(&self) -> impl Iterator<Item = &SwarmTask> {
        self.tasks.iter().filter(|t| t.is_live())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn allocate_id(&mut self) -> u16 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        if self.next_id == 0 {
            self.next_id = 1;
        }
        id
    }

    /// Make room for one more task, recycling the oldest finished one.
    fn reserve(&mut self, now: Millis) -> Result<()> {
        if self.tasks.len() < self.capacity {
            return Ok(());
        }
        let oldest = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.status.is_terminal())
            .max_by_key(|(_, t)| elapsed(now, t.created_at))
            .map(|(i, _)| i);
        match oldest {
            Some(index) => {
                let recycled = self.tasks.swap_remove(index);
                debug!(task = recycled.key.id, "recycled finished task");
                Ok(())
            }
            None => {
                warn!(capacity = self.capacity, "task pool full of live tasks");
                Err(Error::CapacityExceeded {
                    what: "task pool",
                    capacity: self.capacity,
                })
            }
        }
    }

    /// Create a local task with the default deadline.
    pub fn create(
        &mut self,
        requester: NodeId,
        category: TaskCategory,
        priority: u8,
        now: Millis,
    ) -> Result<TaskKey> {
        let timeout = self.default_timeout;
        self.create_with_timeout(requester, category, priority, timeout, now)
    }

    pub fn create_with_timeout(
        &mut self,
        requester: NodeId,
        category: TaskCategory,
        priority: u8,
        timeout_ms: Millis,
        now: Millis,
    ) -> Result<TaskKey> {
        self.reserve(now)?;
        let key = TaskKey {
            requester,
            id: self.allocate_id(),
        };
        self.tasks.push(SwarmTask {
            key,
            category,
            priority: priority.clamp(MIN_PRIORITY, MAX_PRIORITY),
            assignee: None,
            status: TaskStatus::Pending,
            created_at: now,
            timeout_ms,
            progress: 0,
        });
        debug!(task = key.id, ?category, priority, "task created");
        Ok(key)
    }

    /// Track a task announced by another node. Re-announcements update the
    /// assignee of a live task.
    pub fn track_remote(
        &mut self,
        key: TaskKey,
        category: TaskCategory,
        priority: u8,
        assignee: NodeId,
        timeout_ms: Millis,
        now: Millis,
    ) -> Result<()> {
        let assignee = (!assignee.is_none()).then_some(assignee);
        if let Ok(task) = self.get_mut(&key) {
            if task.is_live() && assignee.is_some() {
                task.assignee = assignee;
                if task.status == TaskStatus::Pending {
                    task.status = TaskStatus::Assigned;
                }
            }
            return Ok(());
        }
        self.reserve(now)?;
        self.tasks.push(SwarmTask {
            key,
            category,
            priority: priority.clamp(MIN_PRIORITY, MAX_PRIORITY),
            assignee,
            status: if assignee.is_some() {
                TaskStatus::Assigned
            } else {
                TaskStatus::Pending
            },
            created_at: now,
            timeout_ms,
            progress: 0,
        });
        Ok(())
    }

    pub fn assign(&mut self, key: &TaskKey, assignee: NodeId) -> Result<()> {
        let task = self.get_mut(key)?;
        task.transition(TaskStatus::Assigned)?;
        task.assignee = Some(assignee);
        Ok(())
    }

    pub fn start(&mut self, key: &TaskKey) -> Result<()> {
        self.get_mut(key)?.transition(TaskStatus::Active)
    }

    /// Record progress. Reaching 100% completes the task.
    pub fn report_progress(&mut self, key: &TaskKey, progress: u8) -> Result<TaskStatus> {
        let task = self.get_mut(key)?;
        if task.status.is_terminal() {
            return Ok(task.status);
        }
        task.progress = progress.min(100);
        if task.progress == 100 {
            task.transition(TaskStatus::Completed)?;
            debug!(task = key.id, "task completed");
        } else if task.status != TaskStatus::Active {
            task.transition(TaskStatus::Active)?;
        }
        Ok(task.status)
    }

    pub fn fail(&mut self, key: &TaskKey) -> Result<()> {
        self.get_mut(key)?.transition(TaskStatus::Failed)
    }

    pub fn cancel(&mut self, key: &TaskKey) -> Result<()> {
        self.get_mut(key)?.transition(TaskStatus::Cancelled)
    }

    /// Force-fail every live task past its deadline.
    pub fn sweep(&mut self, now: Millis) -> Vec<TaskKey> {
        let mut failed = Vec::new();
        for task in self.tasks.iter_mut().filter(|t| t.is_live() && t.is_overdue(now)) {
            task.status = TaskStatus::Failed;
            warn!(task = task.key.id, requester = %task.key.requester, "task deadline passed");
            failed.push(task.key);
        }
        failed
    }
}
