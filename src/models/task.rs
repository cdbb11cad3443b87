use std::fmt;
use std::str::FromStr;

use crate::models::message::{Notification, Response};
use crate::models::status::EntryId;

pub type TaskId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Open,
    Active,
    Unknown,
    Good,
    Bad,
    Warn,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::Active => "active",
            TaskStatus::Unknown => "unknown",
            TaskStatus::Good => "good",
            TaskStatus::Bad => "bad",
            TaskStatus::Warn => "warn",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(TaskStatus::Open),
            "active" => Ok(TaskStatus::Active),
            "unknown" => Ok(TaskStatus::Unknown),
            "good" => Ok(TaskStatus::Good),
            "bad" => Ok(TaskStatus::Bad),
            "warn" => Ok(TaskStatus::Warn),
            other => Err(format!("unknown task status '{}'", other)),
        }
    }
}

/// What an evaluator wants to happen to the current task.
///
/// `NoChange` means "not resolved yet": neither the displayed status nor the
/// batch progression is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    NoChange,
    Set(TaskStatus),
}

impl From<TaskStatus> for StatusChange {
    fn from(status: TaskStatus) -> Self {
        StatusChange::Set(status)
    }
}

/// Run and result-evaluation phases of a task.
///
/// A handler that does not override `run` degrades to `unknown`, one that
/// does not override `evaluate` never resolves through responses.
pub trait TaskHandler {
    fn run(&mut self, _id: TaskId) -> StatusChange {
        StatusChange::Set(TaskStatus::Unknown)
    }

    fn evaluate(&mut self, _response: &Response) -> StatusChange {
        StatusChange::NoChange
    }
}

pub trait NotificationHandler {
    fn notify(&mut self, notification: &Notification) -> StatusChange;
}

/// Closure based `TaskHandler`.
pub struct FnTask<R, E> {
    run: R,
    evaluate: E,
}

impl<R, E> FnTask<R, E>
where
    R: FnMut(TaskId) -> StatusChange,
    E: FnMut(&Response) -> StatusChange,
{
    pub fn new(run: R, evaluate: E) -> Self {
        Self { run, evaluate }
    }
}

impl<R, E> TaskHandler for FnTask<R, E>
where
    R: FnMut(TaskId) -> StatusChange,
    E: FnMut(&Response) -> StatusChange,
{
    fn run(&mut self, id: TaskId) -> StatusChange {
        (self.run)(id)
    }

    fn evaluate(&mut self, response: &Response) -> StatusChange {
        (self.evaluate)(response)
    }
}

pub struct FnNotifier<N>(pub N);

impl<N> NotificationHandler for FnNotifier<N>
where
    N: FnMut(&Notification) -> StatusChange,
{
    fn notify(&mut self, notification: &Notification) -> StatusChange {
        (self.0)(notification)
    }
}

pub struct Task {
    pub id: TaskId,
    pub label: String,
    pub entry: EntryId,
    pub status: TaskStatus,
    pub can_fail: bool,
    pub last_message: Option<String>,
    pub(crate) handler: Box<dyn TaskHandler>,
    pub(crate) notifier: Option<Box<dyn NotificationHandler>>,
}

impl Task {
    pub fn new(
        id: TaskId,
        label: String,
        entry: EntryId,
        handler: Box<dyn TaskHandler>,
        notifier: Option<Box<dyn NotificationHandler>>,
    ) -> Self {
        Self {
            id,
            label,
            entry,
            status: TaskStatus::Open,
            can_fail: false,
            last_message: None,
            handler,
            notifier,
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("status", &self.status)
            .field("can_fail", &self.can_fail)
            .field("has_notifier", &self.notifier.is_some())
            .finish()
    }
}
