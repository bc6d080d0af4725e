//! Scripted transport for tests.
//!
//! [`MockTransport`] answers each request with the next queued reply, in
//! order, and records every request so tests can assert on what was sent.
//!
//! ```rust,ignore
//! use comic_poster::testing::MockTransport;
//! use serde_json::json;
//!
//! let transport = MockTransport::new()
//!     .with_json(json!({ "num": 3000 }))
//!     .with_json(json!({ "img": "https://example.com/comics/42.png" }))
//!     .with_bytes(b"png".to_vec());
//!
//! // ... run code against &transport ...
//!
//! assert_eq!(transport.calls()[0].url(), "https://xkcd.com/info.0.json");
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::errors::{AppError, AppResult};
use crate::transport::{Query, Transport};

/// A queued answer.
#[derive(Debug, Clone)]
pub enum Reply {
    Json(Value),
    Bytes(Vec<u8>),
    /// Fail the request with this HTTP status.
    Status(u16),
}

/// A request the mock received.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    GetJson {
        url: String,
        query: Vec<(String, String)>,
    },
    PostJson {
        url: String,
        query: Vec<(String, String)>,
    },
    GetBytes {
        url: String,
    },
    Upload {
        url: String,
        field: String,
        file_name: String,
        /// File contents at the time of the upload.
        bytes: Vec<u8>,
    },
}

impl RecordedCall {
    pub fn url(&self) -> &str {
        match self {
            Self::GetJson { url, .. }
            | Self::PostJson { url, .. }
            | Self::GetBytes { url }
            | Self::Upload { url, .. } => url,
        }
    }

    /// Value of query parameter `key`, if this call had one.
    pub fn param(&self, key: &str) -> Option<&str> {
        match self {
            Self::GetJson { query, .. } | Self::PostJson { query, .. } => query
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct MockTransport {
    replies: RefCell<VecDeque<Reply>>,
    calls: RefCell<Vec<RecordedCall>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_json(self, value: Value) -> Self {
        self.push(Reply::Json(value))
    }

    pub fn with_bytes(self, bytes: Vec<u8>) -> Self {
        self.push(Reply::Bytes(bytes))
    }

    pub fn with_status(self, status: u16) -> Self {
        self.push(Reply::Status(status))
    }

    fn push(self, reply: Reply) -> Self {
        self.replies.borrow_mut().push_back(reply);
        self
    }

    /// Every request received so far, oldest first.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.borrow().clone()
    }

    /// Number of queued replies nobody asked for.
    pub fn unused_replies(&self) -> usize {
        self.replies.borrow().len()
    }

    fn next_reply(&self, call: RecordedCall) -> AppResult<Reply> {
        let url = call.url().to_string();
        self.calls.borrow_mut().push(call);
        match self.replies.borrow_mut().pop_front() {
            Some(Reply::Status(status)) => Err(AppError::Status {
                url,
                status,
                body: String::new(),
            }),
            Some(reply) => Ok(reply),
            None => panic!("MockTransport: no reply queued for {}", url),
        }
    }

    fn next_json(&self, call: RecordedCall) -> AppResult<Value> {
        match self.next_reply(call)? {
            Reply::Json(value) => Ok(value),
            other => panic!("MockTransport: expected a JSON reply, got {:?}", other),
        }
    }
}

fn owned(query: &Query) -> Vec<(String, String)> {
    query
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

impl Transport for MockTransport {
    fn get_json(&self, url: &str, query: &Query) -> AppResult<Value> {
        self.next_json(RecordedCall::GetJson {
            url: url.to_string(),
            query: owned(query),
        })
    }

    fn post_json(&self, url: &str, query: &Query) -> AppResult<Value> {
        self.next_json(RecordedCall::PostJson {
            url: url.to_string(),
            query: owned(query),
        })
    }

    fn get_bytes(&self, url: &str) -> AppResult<Vec<u8>> {
        let call = RecordedCall::GetBytes {
            url: url.to_string(),
        };
        match self.next_reply(call)? {
            Reply::Bytes(bytes) => Ok(bytes),
            other => panic!("MockTransport: expected a bytes reply, got {:?}", other),
        }
    }

    fn upload_file(&self, url: &str, field: &str, path: &Path) -> AppResult<Value> {
        let bytes = fs::read(path).map_err(|e| AppError::filesystem(path, e))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.next_json(RecordedCall::Upload {
            url: url.to_string(),
            field: field.to_string(),
            file_name,
            bytes,
        })
    }
}
