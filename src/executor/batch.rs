use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use log::{Level, Log, Metadata, Record};

use crate::models::message::{Notification, Response, ServerMessage};
use crate::models::status::StatusDisplay;
use crate::models::task::{NotificationHandler, StatusChange, Task, TaskHandler, TaskId, TaskStatus};

const LOG_TARGET: &str = "batchrun::executor";

pub type FinishCallback = Box<dyn FnMut(&[TaskId], &[TaskId])>;

/// Forwards to whatever logger is installed globally.
pub struct GlobalLog;

impl Log for GlobalLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        log::logger().enabled(metadata)
    }

    fn log(&self, record: &Record) {
        log::logger().log(record)
    }

    fn flush(&self) {
        log::logger().flush()
    }
}

pub struct TaskOptions {
    pub label: String,
    pub handler: Box<dyn TaskHandler>,
    pub notifier: Option<Box<dyn NotificationHandler>>,
    pub can_fail: bool,
}

impl TaskOptions {
    pub fn new(label: impl Into<String>, handler: impl TaskHandler + 'static) -> Self {
        Self {
            label: label.into(),
            handler: Box::new(handler),
            notifier: None,
            can_fail: false,
        }
    }

    pub fn notifier(mut self, notifier: impl NotificationHandler + 'static) -> Self {
        self.notifier = Some(Box::new(notifier));
        self
    }

    pub fn can_fail(mut self, can_fail: bool) -> Self {
        self.can_fail = can_fail;
        self
    }
}

/// Runs tasks strictly one after another in the order they were added.
///
/// A task finishes when an evaluator reports `good` (or `bad` for tasks that
/// may fail). A `bad` status halts the batch with the failed task left
/// current until someone calls `execute_tasks` or `reset`.
pub struct BatchExecutor<D: StatusDisplay> {
    queue: VecDeque<Task>,
    current: Option<Task>,
    finished: Vec<Task>,
    next_id: TaskId,
    listen_signature: Option<String>,
    connected: bool,
    halted: bool,
    display: D,
    log: Arc<dyn Log>,
    on_finish: Option<FinishCallback>,
}

impl<D: StatusDisplay> BatchExecutor<D> {
    pub fn new(display: D) -> Self {
        Self::with_logger(display, Arc::new(GlobalLog))
    }

    pub fn with_logger(display: D, log: Arc<dyn Log>) -> Self {
        BatchExecutor {
            queue: VecDeque::new(),
            current: None,
            finished: Vec::new(),
            next_id: 1,
            listen_signature: None,
            connected: true,
            halted: false,
            display,
            log,
            on_finish: None,
        }
    }

    pub fn add_task(
        &mut self,
        label: &str,
        handler: impl TaskHandler + 'static,
        notifier: Option<Box<dyn NotificationHandler>>,
    ) -> TaskId {
        let mut options = TaskOptions::new(label, handler);
        options.notifier = notifier;
        self.add_task_with(options)
    }

    pub fn add_task_with(&mut self, options: TaskOptions) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;

        let entry = self.display.add_entry(&options.label, TaskStatus::Open);
        let mut task = Task::new(id, options.label, entry, options.handler, options.notifier);
        task.can_fail = options.can_fail;
        self.queue.push_back(task);

        self.emit(Level::Info, format_args!("Task '{}' created.", id));
        id
    }

    pub fn set_listen_signature(&mut self, signature: &str) {
        self.listen_signature = Some(signature.to_string());
    }

    pub fn listen_signature(&self) -> Option<&str> {
        self.listen_signature.as_deref()
    }

    pub fn set_on_finish(&mut self, callback: impl FnMut(&[TaskId], &[TaskId]) + 'static) {
        self.on_finish = Some(Box::new(callback));
    }

    /// Drops all tasks that have not been started yet.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Forgets the whole batch, including the display. Ids keep counting.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.current = None;
        self.halted = false;
        self.finished.clear();
        self.display.clear();
    }

    pub fn execute_tasks(&mut self) {
        while let Some(task) = self.queue.pop_front() {
            self.emit(Level::Info, format_args!("Starting task '{}'.", task.id));
            self.halted = false;
            let current = self.current.insert(task);
            let change = current.handler.run(current.id);

            if !self.apply(change, false) {
                return;
            }
        }
    }

    pub fn on_execution_finished(&mut self, response: &Response) {
        let Some(current_id) = self.current.as_ref().map(|task| task.id) else {
            return;
        };

        if response.task_id() != Some(current_id) {
            self.emit(
                Level::Error,
                format_args!("Unexpected response {:?} for current task '{}'.", response.passthrough, current_id),
            );
            return;
        }

        let change = match self.current.as_mut() {
            Some(current) => current.handler.evaluate(response),
            None => return,
        };
        self.update_state(change, false);
    }

    pub fn on_notification(&mut self, notification: &Notification) {
        let Some(current) = self.current.as_mut() else {
            return;
        };

        if let Some(message) = notification.message() {
            current.last_message = Some(message.to_string());
        }
        let change = match current.notifier.as_mut() {
            Some(notifier) => notifier.notify(notification),
            None => StatusChange::NoChange,
        };
        self.update_state(change, false);
    }

    pub fn on_connection_lost(&mut self) {
        if !self.connected {
            return;
        }

        self.connected = false;
        self.update_state(StatusChange::Set(TaskStatus::Warn), false);
        self.emit(Level::Warn, format_args!("Connection to server lost. Batch execution stalled."));
    }

    /// The completion of the current task may have been lost while
    /// disconnected, so it is counted as finished.
    pub fn on_reconnect(&mut self) {
        if self.connected {
            self.emit(Level::Error, format_args!("Unexpected reconnect while still connected."));
            return;
        }

        self.connected = true;
        self.update_state(StatusChange::Set(TaskStatus::Warn), true);
        self.emit(Level::Info, format_args!("Connection to server established. Batch execution continued."));
    }

    pub fn on_message(&mut self, message: &ServerMessage) {
        match message {
            ServerMessage::Response(response) => {
                if self.listen_signature.as_deref() == Some(response.signature.as_str()) {
                    self.on_execution_finished(response);
                } else {
                    self.emit(Level::Trace, format_args!("Ignoring response '{}'.", response.signature));
                }
            }
            ServerMessage::Notification(notification) => self.on_notification(notification),
            ServerMessage::ConnectionLost => self.on_connection_lost(),
            ServerMessage::Reconnected => self.on_reconnect(),
        }
    }

    pub fn current(&self) -> Option<&Task> {
        self.current.as_ref()
    }

    pub fn queued(&self) -> impl Iterator<Item = &Task> {
        self.queue.iter()
    }

    pub fn finished(&self) -> &[Task] {
        &self.finished
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.current
            .iter()
            .chain(self.queue.iter())
            .chain(self.finished.iter())
            .find(|task| task.id == id)
    }

    pub fn is_halted(&self) -> bool {
        self.halted && self.current.is_some()
    }

    /// Nothing is running that could still make progress on its own.
    pub fn is_idle(&self) -> bool {
        self.current.is_none() || self.is_halted()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    fn update_state(&mut self, change: StatusChange, force_next: bool) {
        if self.apply(change, force_next) {
            self.execute_tasks();
        }
    }

    /// Writes the new status of the current task. Returns true when the
    /// task is done and the next one may start.
    fn apply(&mut self, change: StatusChange, force_next: bool) -> bool {
        let StatusChange::Set(status) = change else {
            return false;
        };
        let Some(current) = self.current.as_mut() else {
            return false;
        };

        current.status = status;
        self.display.set_status(current.entry, status);

        let id = current.id;
        let can_fail = current.can_fail;
        if status == TaskStatus::Bad && !can_fail {
            self.halted = true;
            self.emit(
                Level::Warn,
                format_args!("Task '{}' returned status \"bad\". Batch execution will be stopped.", id),
            );
            let open: Vec<TaskId> = std::iter::once(id).chain(self.queue.iter().map(|t| t.id)).collect();
            self.notify_finish(&open);
        }

        let done = status == TaskStatus::Good || (status == TaskStatus::Bad && can_fail) || force_next;
        if !done {
            return false;
        }

        self.halted = false;
        if let Some(task) = self.current.take() {
            self.emit(Level::Info, format_args!("Task '{}' finished with status {}.", task.id, task.status));
            self.finished.push(task);
        }
        if self.queue.is_empty() {
            self.notify_finish(&[]);
        }
        true
    }

    fn notify_finish(&mut self, open: &[TaskId]) {
        if let Some(callback) = self.on_finish.as_mut() {
            let finished: Vec<TaskId> = self.finished.iter().map(|t| t.id).collect();
            callback(open, &finished);
        }
    }

    fn emit(&self, level: Level, args: fmt::Arguments<'_>) {
        let record = Record::builder()
            .args(args)
            .level(level)
            .target(LOG_TARGET)
            .module_path_static(Some(module_path!()))
            .file_static(Some(file!()))
            .build();
        if self.log.enabled(record.metadata()) {
            self.log.log(&record);
        }
    }
}
