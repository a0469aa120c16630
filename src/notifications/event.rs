//! Events published on the notifications bus.

use serde::Serialize;

use crate::action::Params;

/// Name of the event published before an action runs.
pub const REQUEST_START: &str = "request.start";
/// Name of the event published once a response (or failure) is known.
pub const REQUEST_FINISH: &str = "request.finish";
/// Name of the event published when a request fails with an error.
pub const REQUEST_ERROR: &str = "request.error";

/// Unit of [`RequestPayload::elapsed`].
pub const ELAPSED_UNIT: &str = "µs";

/// Request-boundary attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestPayload {
    pub verb: String,
    pub path: String,
    /// Response status; `None` on `request.start`.
    pub status: Option<u16>,
    /// Time since the request started, in [`RequestPayload::elapsed_unit`].
    pub elapsed: u64,
    pub elapsed_unit: &'static str,
    pub remote_address: Option<String>,
    pub params: Params,
    pub error: Option<String>,
}

/// Event data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Request(RequestPayload),
    Custom(serde_json::Value),
    Empty,
}

/// One published event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub name: String,
    pub payload: Payload,
}

impl Event {
    pub fn new(name: impl Into<String>, payload: Payload) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// The request attributes, for `request.*` events.
    pub fn request(&self) -> Option<&RequestPayload> {
        match &self.payload {
            Payload::Request(payload) => Some(payload),
            _ => None,
        }
    }
}
