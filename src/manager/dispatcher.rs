use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use crate::error::{Result, SessionError};
use crate::executor::batch::BatchExecutor;
use crate::models::message::ServerMessage;
use crate::models::status::StatusDisplay;

/// Hands messages coming from the backend to the executor.
pub struct Dispatcher {
    receiver: Receiver<ServerMessage>,
}

impl Dispatcher {
    pub fn new(receiver: Receiver<ServerMessage>) -> Self {
        Dispatcher { receiver }
    }

    /// Delivers at most one message, waiting up to `timeout` for it.
    pub fn pump<D: StatusDisplay>(&self, executor: &mut BatchExecutor<D>, timeout: Duration) -> Result<bool> {
        match self.receiver.recv_timeout(timeout) {
            Ok(message) => {
                executor.on_message(&message);
                Ok(true)
            }
            Err(RecvTimeoutError::Timeout) => Ok(false),
            Err(RecvTimeoutError::Disconnected) => Err(SessionError::Disconnected),
        }
    }

    pub fn drain<D: StatusDisplay>(&self, executor: &mut BatchExecutor<D>) -> Result<usize> {
        let mut delivered = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(message) => {
                    executor.on_message(&message);
                    delivered += 1;
                }
                Err(TryRecvError::Empty) => return Ok(delivered),
                Err(TryRecvError::Disconnected) => return Err(SessionError::Disconnected),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::{Notification, Response};
    use crate::models::status::StatusList;
    use crate::models::task::{FnTask, StatusChange, TaskHandler, TaskStatus};
    use crossbeam_channel::unbounded;
    use serde_json::{json, Value};

    fn waiting_task() -> impl TaskHandler {
        FnTask::new(
            |_| StatusChange::Set(TaskStatus::Active),
            |response: &Response| {
                if response.payload["ok"] == Value::Bool(true) {
                    StatusChange::Set(TaskStatus::Good)
                } else {
                    StatusChange::Set(TaskStatus::Bad)
                }
            },
        )
    }

    #[test]
    fn drain_routes_every_pending_message() {
        let (sender, receiver) = unbounded();
        let dispatcher = Dispatcher::new(receiver);
        let mut executor = BatchExecutor::new(StatusList::new());
        executor.set_listen_signature("Done");
        executor.add_task("a", waiting_task(), None);
        executor.add_task("b", waiting_task(), None);
        executor.execute_tasks();

        sender
            .send(ServerMessage::Notification(Notification::new("", "Out", json!({ "message": "working" }))))
            .unwrap();
        sender
            .send(ServerMessage::Response(Response::new("", "Done", json!({ "ok": true }), json!({ "webuitaskid": 1 }))))
            .unwrap();

        assert_eq!(dispatcher.drain(&mut executor).unwrap(), 2);
        assert_eq!(executor.finished()[0].last_message.as_deref(), Some("working"));
        assert_eq!(executor.current().map(|t| t.id), Some(2));
        assert_eq!(dispatcher.drain(&mut executor).unwrap(), 0);
    }

    #[test]
    fn pump_times_out_then_reports_disconnect() {
        let (sender, receiver) = unbounded();
        let dispatcher = Dispatcher::new(receiver);
        let mut executor = BatchExecutor::new(StatusList::new());

        assert!(!dispatcher.pump(&mut executor, Duration::from_millis(1)).unwrap());
        drop(sender);
        assert!(matches!(
            dispatcher.pump(&mut executor, Duration::from_millis(1)),
            Err(SessionError::Disconnected)
        ));
    }
}
