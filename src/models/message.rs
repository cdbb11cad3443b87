use serde_json::Value;

use super::task::TaskId;

/// Passthrough key carrying the id of the task a request was issued for.
pub const TASK_ID_KEY: &str = "webuitaskid";

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub function: String,
    pub signature: String,
    pub args: Value,
    pub pass: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub routing: String,
    pub signature: String,
    pub payload: Value,
    pub passthrough: Value,
}

impl Response {
    pub fn new(routing: &str, signature: &str, payload: Value, passthrough: Value) -> Self {
        Self {
            routing: routing.to_string(),
            signature: signature.to_string(),
            payload,
            passthrough,
        }
    }

    pub fn task_id(&self) -> Option<TaskId> {
        self.passthrough.get(TASK_ID_KEY).and_then(Value::as_u64)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub routing: String,
    pub signature: String,
    pub rawdata: Value,
}

impl Notification {
    pub fn new(routing: &str, signature: &str, rawdata: Value) -> Self {
        Self {
            routing: routing.to_string(),
            signature: signature.to_string(),
            rawdata,
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.rawdata.get("message").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Response(Response),
    Notification(Notification),
    ConnectionLost,
    Reconnected,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_id_is_read_from_passthrough() {
        let response = Response::new("", "Done", json!({}), json!({ "webuitaskid": 4 }));
        assert_eq!(response.task_id(), Some(4));

        let response = Response::new("", "Done", json!({}), json!({ "webuitaskid": "4" }));
        assert_eq!(response.task_id(), None);

        let response = Response::new("", "Done", json!({}), Value::Null);
        assert_eq!(response.task_id(), None);
    }

    #[test]
    fn notification_message_must_be_text() {
        assert_eq!(Notification::new("", "", json!({ "message": "copied" })).message(), Some("copied"));
        assert_eq!(Notification::new("", "", json!({ "message": 1 })).message(), None);
    }
}
