//! Pending task queue.
//!
//! # Responsibility
//! - Keep the ordered list of pending tasks and its persisted snapshot.
//! - Route completions through the progression engine before removal.
//! - Merge mentor-suggested titles in one batch.
//!
//! # Invariants
//! - After every public call returns, the in-memory sequence equals the
//!   persisted `tasks_v1` snapshot. A failed write rolls memory back.
//! - A completion awards XP before removing the task, so a crash between the
//!   two can only duplicate an award, never lose a completion.
//! - Every mutation, and every completion attempt, bumps the generation;
//!   tickets from an earlier generation are refused.

use crate::model::identity::AuthenticatedUser;
use crate::model::task::{normalize_title, now_epoch_ms, Task};
use crate::repo::local_repo::{LocalState, LocalStore, StoreError};
use crate::service::progression_service::{
    ProgressionEngine, ProgressionError, XpAward, TASK_COMPLETION_XP,
};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum TaskError {
    /// Title was empty after trimming.
    EmptyTitle,
    IndexOutOfRange { index: usize, len: usize },
    /// Ticket was already used or belongs to an outdated view of the queue.
    CompletionAlreadyHandled,
    Store(StoreError),
    Progression(ProgressionError),
}

impl Display for TaskError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "task title cannot be empty"),
            Self::IndexOutOfRange { index, len } => {
                write!(f, "task index {index} out of range for queue of {len}")
            }
            Self::CompletionAlreadyHandled => {
                write!(f, "task completion already handled for this view")
            }
            Self::Store(err) => write!(f, "{err}"),
            Self::Progression(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TaskError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Progression(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for TaskError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<ProgressionError> for TaskError {
    fn from(value: ProgressionError) -> Self {
        Self::Progression(value)
    }
}

/// Handle for completing the task rendered at `index`.
///
/// Obtained per render; consumed by `TaskQueue::complete_ticket`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionTicket {
    index: usize,
    generation: u64,
}

impl CompletionTicket {
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Outcome of one completed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCompletion {
    pub task: Task,
    pub award: XpAward,
}

/// Ordered pending tasks backed by the local store.
pub struct TaskQueue<'a> {
    local: LocalState<'a>,
    progression: &'a ProgressionEngine<'a>,
    tasks: Vec<Task>,
    generation: u64,
}

impl<'a> TaskQueue<'a> {
    /// Loads the persisted snapshot.
    pub fn load(
        local: &'a dyn LocalStore,
        progression: &'a ProgressionEngine<'a>,
    ) -> Result<Self, TaskError> {
        let local = LocalState::new(local);
        let tasks = local.tasks()?;
        Ok(Self {
            local,
            progression,
            tasks,
            generation: 0,
        })
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Replaces the in-memory sequence with the persisted snapshot.
    pub fn reload(&mut self) -> Result<(), TaskError> {
        self.tasks = self.local.tasks()?;
        self.generation += 1;
        Ok(())
    }

    /// Appends one task created now.
    pub fn add(&mut self, title: &str) -> Result<&Task, TaskError> {
        let task = Task::new(title, now_epoch_ms()).ok_or(TaskError::EmptyTitle)?;
        self.tasks.push(task);
        if let Err(err) = self.local.save_tasks(&self.tasks) {
            self.tasks.pop();
            return Err(err.into());
        }
        self.generation += 1;
        info!("event=task_add module=tasks status=ok len={}", self.tasks.len());

        let last = self.tasks.len() - 1;
        Ok(&self.tasks[last])
    }

    /// Appends one task per non-blank title, persisting once.
    ///
    /// Returns how many tasks were appended.
    pub fn merge_suggested<I, S>(&mut self, titles: I) -> Result<usize, TaskError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let created_at = now_epoch_ms();
        let before = self.tasks.len();
        self.tasks.extend(titles.into_iter().filter_map(|title| {
            normalize_title(title.as_ref()).map(|title| Task { title, created_at })
        }));

        let added = self.tasks.len() - before;
        if added == 0 {
            return Ok(0);
        }
        if let Err(err) = self.local.save_tasks(&self.tasks) {
            self.tasks.truncate(before);
            return Err(err.into());
        }
        self.generation += 1;
        info!("event=task_merge module=tasks status=ok added={added}");
        Ok(added)
    }

    /// Issues a completion ticket for the task currently at `index`.
    pub fn completion_ticket(&self, index: usize) -> Result<CompletionTicket, TaskError> {
        self.check_index(index)?;
        Ok(CompletionTicket {
            index,
            generation: self.generation,
        })
    }

    /// Completes the task at `index` right away.
    pub fn complete(
        &mut self,
        index: usize,
        identity: Option<&AuthenticatedUser>,
    ) -> Result<TaskCompletion, TaskError> {
        let ticket = self.completion_ticket(index)?;
        self.complete_ticket(ticket, identity)
    }

    /// Completes the task a ticket points at.
    ///
    /// All outstanding tickets are invalidated before the award runs, so a
    /// repeated invocation from the same render awards nothing. After a
    /// failed award the caller must request a fresh ticket.
    pub fn complete_ticket(
        &mut self,
        ticket: CompletionTicket,
        identity: Option<&AuthenticatedUser>,
    ) -> Result<TaskCompletion, TaskError> {
        if ticket.generation != self.generation {
            warn!(
                "event=task_complete module=tasks status=rejected reason=stale_ticket index={}",
                ticket.index
            );
            return Err(TaskError::CompletionAlreadyHandled);
        }
        self.generation += 1;
        self.check_index(ticket.index)?;

        let award = self.progression.award_xp(TASK_COMPLETION_XP, identity)?;

        let task = self.tasks.remove(ticket.index);
        if let Err(err) = self.local.save_tasks(&self.tasks) {
            self.tasks.insert(ticket.index, task);
            return Err(err.into());
        }
        info!(
            "event=task_complete module=tasks status=ok index={} xp={} len={}",
            ticket.index,
            award.xp,
            self.tasks.len()
        );
        Ok(TaskCompletion { task, award })
    }

    fn check_index(&self, index: usize) -> Result<(), TaskError> {
        if index >= self.tasks.len() {
            return Err(TaskError::IndexOutOfRange {
                index,
                len: self.tasks.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{TaskError, TaskQueue};
    use crate::db::open_db_in_memory;
    use crate::repo::local_repo::{LocalState, SqliteLocalStore};
    use crate::repo::profile_repo::SqliteProfileStore;
    use crate::service::progression_service::ProgressionEngine;

    #[test]
    fn add_rejects_blank_titles_without_persisting() {
        let conn = open_db_in_memory().expect("in-memory db");
        let local = SqliteLocalStore::new(&conn);
        let remote = SqliteProfileStore::new(&conn);
        let engine = ProgressionEngine::new(&local, &remote);
        let mut queue = TaskQueue::load(&local, &engine).expect("load queue");

        let err = queue.add("   ").expect_err("blank title");
        assert!(matches!(err, TaskError::EmptyTitle));
        assert!(queue.is_empty());
        assert!(LocalState::new(&local).tasks().expect("snapshot").is_empty());
    }

    #[test]
    fn out_of_range_completion_awards_nothing() {
        let conn = open_db_in_memory().expect("in-memory db");
        let local = SqliteLocalStore::new(&conn);
        let remote = SqliteProfileStore::new(&conn);
        let engine = ProgressionEngine::new(&local, &remote);
        let mut queue = TaskQueue::load(&local, &engine).expect("load queue");
        queue.add("only").expect("add");

        let err = queue.complete(3, None).expect_err("index out of range");
        assert!(matches!(
            err,
            TaskError::IndexOutOfRange { index: 3, len: 1 }
        ));
        assert_eq!(LocalState::new(&local).xp().expect("xp"), 0);
    }

    #[test]
    fn merge_skips_blank_suggestions() {
        let conn = open_db_in_memory().expect("in-memory db");
        let local = SqliteLocalStore::new(&conn);
        let remote = SqliteProfileStore::new(&conn);
        let engine = ProgressionEngine::new(&local, &remote);
        let mut queue = TaskQueue::load(&local, &engine).expect("load queue");

        let added = queue.merge_suggested(["x", "  ", "y"]).expect("merge");
        assert_eq!(added, 2);
        let titles: Vec<&str> = queue.tasks().iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["x", "y"]);
    }
}
