//! Frames exchanged between the pool and the program a worker runs.
//!
//! Every frame is a single line of JSON. The pool writes [`Request`]s and the
//! program answers each one with exactly one [`Reply`] carrying the same
//! sequence number.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::WorkerId;

/// One argument bundle dispatched to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
  pub worker_id: WorkerId,
  // Per-worker dispatch counter, echoed back in the reply.
  pub sequence: u64,
  pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reply {
  Result { sequence: u64, data: Value },
  Error { sequence: u64, message: String },
}

impl Reply {
  pub fn sequence(&self) -> u64 {
    match self {
      Reply::Result { sequence, .. } | Reply::Error { sequence, .. } => *sequence,
    }
  }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
  #[error("malformed frame: {0}")]
  Malformed(#[from] serde_json::Error),
}

pub fn encode<T: Serialize>(frame: &T) -> Result<String, ProtocolError> {
  Ok(serde_json::to_string(frame)?)
}

pub fn decode<T: DeserializeOwned>(line: &str) -> Result<T, ProtocolError> {
  Ok(serde_json::from_str(line)?)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_reply_is_tagged_by_kind() {
    let reply = Reply::Error {
      sequence: 7,
      message: "boom".to_string(),
    };
    let line = encode(&reply).unwrap();
    assert_eq!(
      serde_json::from_str::<Value>(&line).unwrap(),
      json!({ "kind": "error", "sequence": 7, "message": "boom" })
    );
    assert_eq!(reply.sequence(), 7);
  }

  #[test]
  fn test_request_frame_is_a_single_line() {
    let request = Request {
      worker_id: WorkerId::new(),
      sequence: 1,
      args: vec![json!("multi\nline"), json!({ "nested": [1, 2, 3] })],
    };
    let line = encode(&request).unwrap();
    assert!(!line.contains('\n'));
    assert_eq!(decode::<Request>(&line).unwrap(), request);
  }

  #[test]
  fn test_decode_rejects_garbage() {
    let error = decode::<Reply>("{\"kind\":\"nope\"}").unwrap_err();
    assert!(error.to_string().starts_with("malformed frame"));
  }
}
