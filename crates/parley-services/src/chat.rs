//! The chat service — the application behind the encrypted channel.
//! A single process-global in-memory log, append-only, snapshotted whole
//! on every read.

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// A stored chat message. Serializes exactly as the inner `ReadRequest`
/// reply's array elements: `{"author": "...", "content": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub author: String,
    pub content: String,
}

/// The inner application protocol carried inside encrypted frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatRequest {
    Write { content: String },
    Read,
}

impl ChatRequest {
    /// Render the inner `WriteRequest{id:1,content}` frame a client sends.
    pub fn write_json(content: &str) -> String {
        serde_json::json!({ "id": 1, "content": content }).to_string()
    }

    /// Render the inner `ReadRequest{id:2}` frame a client sends.
    pub fn read_json() -> String {
        serde_json::json!({ "id": 2 }).to_string()
    }

    /// Parse an inner JSON request. `serde`'s adjacently/internally tagged
    /// enums expect the tag to be a string, but the wire value is numeric
    /// (`{"id":1,...}` / `{"id":2}`), so dispatch is hand-rolled over a raw
    /// `Value` exactly as `parley_core::wire` does for the outer frames.
    pub fn parse(content: &str) -> Option<ChatRequest> {
        let value: serde_json::Value = serde_json::from_str(content).ok()?;
        let obj = value.as_object()?;
        match obj.get("id").and_then(serde_json::Value::as_u64)? {
            1 => {
                let write: WriteRequestBody = serde_json::from_value(value).ok()?;
                Some(ChatRequest::Write { content: write.content })
            }
            2 => {
                let _: ReadRequestBody = serde_json::from_value(value).ok()?;
                Some(ChatRequest::Read)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WriteRequestBody {
    id: u32,
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReadRequestBody {
    id: u32,
}

/// Append-only in-memory chat log. Guarded by a single `tokio::sync::Mutex`:
/// one writer at a time, readers see a consistent snapshot.
#[derive(Clone, Default)]
pub struct ChatLog {
    messages: std::sync::Arc<Mutex<Vec<Message>>>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(&self, author: &str, content: &str) {
        let mut guard = self.messages.lock().await;
        guard.push(Message { author: author.to_string(), content: content.to_string() });
    }

    pub async fn snapshot(&self) -> Vec<Message> {
        self.messages.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_write_request() {
        let req = ChatRequest::parse(r#"{"id":1,"content":"hello"}"#).unwrap();
        assert_eq!(req, ChatRequest::Write { content: "hello".to_string() });
    }

    #[test]
    fn parse_read_request() {
        let req = ChatRequest::parse(r#"{"id":2}"#).unwrap();
        assert_eq!(req, ChatRequest::Read);
    }

    #[test]
    fn parse_rejects_extra_fields() {
        assert!(ChatRequest::parse(r#"{"id":2,"extra":true}"#).is_none());
    }

    #[test]
    fn parse_rejects_unknown_id() {
        assert!(ChatRequest::parse(r#"{"id":99}"#).is_none());
    }

    #[tokio::test]
    async fn append_then_snapshot_preserves_order() {
        let log = ChatLog::new();
        log.append("alice", "hello").await;
        log.append("bob", "hi").await;
        let snapshot = log.snapshot().await;
        assert_eq!(
            snapshot,
            vec![
                Message { author: "alice".into(), content: "hello".into() },
                Message { author: "bob".into(), content: "hi".into() },
            ]
        );
    }
}
