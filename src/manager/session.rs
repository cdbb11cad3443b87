use std::{cell::RefCell, io, rc::Rc};

use crossbeam_channel::Sender;
use log::{error, info};
use serde_json::{json, Value};

use crate::config::Config;
use crate::error::Result;
use crate::executor::batch::{BatchExecutor, TaskOptions};
use crate::manager::dispatcher::Dispatcher;
use crate::models::message::{Notification, Request, Response, TASK_ID_KEY};
use crate::models::status::ConsoleStatus;
use crate::models::task::{FnNotifier, FnTask, StatusChange, Task, TaskId, TaskStatus};
use crate::worker::backend::{message_channel, spawn_backend, BackendHandle, RUN_SHELL};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub open: Vec<TaskId>,
    pub finished: Vec<TaskId>,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> bool {
        self.open.is_empty()
    }
}

pub struct Session {
    config: Config,
    executor: BatchExecutor<ConsoleStatus>,
    dispatcher: Dispatcher,
    backend: BackendHandle,
    outcome: Rc<RefCell<Option<BatchOutcome>>>,
}

impl Session {
    pub fn new(config: Config) -> Self {
        let (sender, receiver) = message_channel();
        let backend = spawn_backend(&config, sender);

        let outcome = Rc::new(RefCell::new(None));
        let mut executor = BatchExecutor::new(ConsoleStatus::new());
        executor.set_listen_signature(&config.listen_signature);
        let report = Rc::clone(&outcome);
        executor.set_on_finish(move |open, finished| {
            *report.borrow_mut() = Some(BatchOutcome {
                open: open.to_vec(),
                finished: finished.to_vec(),
            });
        });

        Session {
            config,
            executor,
            dispatcher: Dispatcher::new(receiver),
            backend,
            outcome,
        }
    }

    pub fn add_shell_task(&mut self, command: String, can_fail: bool) -> TaskId {
        let requests = self.backend.request_sender();
        let signature = self.config.listen_signature.clone();
        let label = command.clone();

        let handler = FnTask::new(
            move |id| issue_shell_request(&requests, &signature, &command, id),
            |response: &Response| match response.payload.get("ok").and_then(Value::as_bool) {
                Some(true) => StatusChange::Set(TaskStatus::Good),
                _ => StatusChange::Set(TaskStatus::Bad),
            },
        );
        let notifier = FnNotifier(|notification: &Notification| {
            if let Some(line) = notification.message() {
                println!("\r    {}", line);
            }
            StatusChange::NoChange
        });

        self.executor
            .add_task_with(TaskOptions::new(label, handler).notifier(notifier).can_fail(can_fail))
    }

    /// Runs (or resumes) the batch until it drains or halts. `abort_requested`
    /// is polled between messages; when it returns true the running child is
    /// terminated.
    pub fn run(&mut self, mut abort_requested: impl FnMut() -> io::Result<bool>) -> Result<BatchOutcome> {
        *self.outcome.borrow_mut() = None;
        if self.executor.is_idle() {
            self.executor.execute_tasks();
        }

        loop {
            if let Some(outcome) = self.outcome.borrow_mut().take() {
                return Ok(outcome);
            }
            if self.executor.is_idle() {
                return Ok(self.snapshot());
            }
            if abort_requested()? && self.backend.abort() {
                info!("Abort requested for task '{}'.", self.current_id().unwrap_or_default());
            }
            self.dispatcher.pump(&mut self.executor, self.config.poll_interval)?;
        }
    }

    pub fn connection_lost(&mut self) -> Result<()> {
        self.backend.simulate_connection_loss()?;
        self.dispatcher.drain(&mut self.executor)?;
        Ok(())
    }

    pub fn reconnected(&mut self) -> Result<()> {
        self.backend.simulate_reconnect()?;
        self.dispatcher.drain(&mut self.executor)?;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.executor.clear();
    }

    pub fn reset(&mut self) {
        self.executor.reset();
    }

    pub fn get_task_status(&self, id: TaskId) -> Option<TaskStatus> {
        self.executor.task(id).map(|task| task.status)
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.executor.task(id)
    }

    pub fn get_all_tasks(&self) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self
            .executor
            .finished()
            .iter()
            .chain(self.executor.current())
            .chain(self.executor.queued())
            .collect();
        tasks.sort_by_key(|task| task.id);
        tasks
    }

    pub fn is_connected(&self) -> bool {
        self.executor.is_connected()
    }

    fn current_id(&self) -> Option<TaskId> {
        self.executor.current().map(|task| task.id)
    }

    fn snapshot(&self) -> BatchOutcome {
        BatchOutcome {
            open: self.executor.current().into_iter().chain(self.executor.queued()).map(|t| t.id).collect(),
            finished: self.executor.finished().iter().map(|t| t.id).collect(),
        }
    }
}

fn issue_shell_request(requests: &Sender<Request>, signature: &str, command: &str, id: TaskId) -> StatusChange {
    let request = Request {
        function: RUN_SHELL.to_string(),
        signature: signature.to_string(),
        args: json!({ "command": command }),
        pass: json!({ TASK_ID_KEY: id }),
    };
    match requests.send(request) {
        Ok(()) => StatusChange::Set(TaskStatus::Active),
        Err(e) => {
            error!("Failed to send request for task '{}': {}", id, e);
            StatusChange::Set(TaskStatus::Bad)
        }
    }
}
