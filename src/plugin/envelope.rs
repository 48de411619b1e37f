//! Wire schema for host <-> plugin messages.
//!
//! Version 1 of the schema. Every envelope is a JSON object:
//!
//! | direction | shape |
//! |-----------|-------|
//! | host -> plugin | `{"type":"focus"}` / `{"type":"unfocus"}` |
//! | host -> plugin | `{"type":"compilationData","value":<result or null>}` |
//! | host -> plugin | `{"type":"compilationFinished","value":{"success","data","source"}}` |
//! | plugin -> host | `{"type":<operation>,"arguments":[...],"id":<any>,"key":<namespace>}` |
//! | host -> plugin | `{"id":<echoed>,"type":<operation>,"error":<string or null>,"result":<any>}` |
//!
//! Envelopes are built fresh for every send and serialized to text at the transport edge.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plugin::permission::Operation;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope {
    Notification(Notification),
    Response(Response),
}

/// Host-originated lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Notification {
    Focus,
    Unfocus,
    CompilationData { value: Option<Value> },
    CompilationFinished { value: CompilationReport },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilationReport {
    pub success: bool,
    pub data: Value,
    pub source: Value,
}

/// Reply to an [`InboundRequest`], correlated by the echoed `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: Value,
    #[serde(rename = "type")]
    pub operation: Operation,
    pub error: Option<String>,
    pub result: Value,
}

/// A plugin's call request as it arrives on the wire.
///
/// `kind` stays a raw string so names outside the allow-list can be recognised and dropped
/// instead of failing the whole parse.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub key: String,
}

impl InboundRequest {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

impl Envelope {
    pub fn focus() -> Self {
        Envelope::Notification(Notification::Focus)
    }

    pub fn unfocus() -> Self {
        Envelope::Notification(Notification::Unfocus)
    }

    pub fn compilation_data(value: Option<Value>) -> Self {
        Envelope::Notification(Notification::CompilationData { value })
    }

    pub fn compilation_finished(report: CompilationReport) -> Self {
        Envelope::Notification(Notification::CompilationFinished { value: report })
    }

    pub fn response(id: Value, operation: Operation, outcome: Result<Value, String>) -> Self {
        let (error, result) = match outcome {
            Ok(result) => (None, result),
            Err(err) => (Some(err), Value::Null),
        };
        Envelope::Response(Response {
            id,
            operation,
            error,
            result,
        })
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Notification(Notification::Focus) => "focus",
            Envelope::Notification(Notification::Unfocus) => "unfocus",
            Envelope::Notification(Notification::CompilationData { .. }) => "compilationData",
            Envelope::Notification(Notification::CompilationFinished { .. }) => {
                "compilationFinished"
            }
            Envelope::Response(response) => response.operation.name(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
