//! Exchange protocol messages.

use crate::delta::Delta;
use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};

/// A synchronization request from one peer to the other.
///
/// Each request both pushes (`delta`) and pulls (the response carries the
/// receiver's own delta back) in a single round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRequest {
    /// Caller identity, unique per client store.
    pub identity: String,
    /// Target data-set name.
    pub dataset: String,
    /// The caller's local delta. Absent when the caller has nothing to
    /// push.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<Delta>,
    /// When set, the receiver answers with a full snapshot instead of an
    /// incremental delta (cold bootstrap).
    #[serde(default)]
    pub request_all: bool,
}

impl ExchangeRequest {
    /// Creates a request with no payload.
    pub fn new(identity: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            dataset: dataset.into(),
            delta: None,
            request_all: false,
        }
    }

    /// Attaches the caller's delta.
    pub fn with_delta(mut self, delta: Delta) -> Self {
        self.delta = Some(delta);
        self
    }

    /// Requests a full snapshot from the receiver.
    pub fn with_request_all(mut self) -> Self {
        self.request_all = true;
        self
    }

    /// Validates required fields.
    ///
    /// Runs before any store access so malformed requests fail fast.
    pub fn validate(&self) -> ProtocolResult<()> {
        if self.identity.is_empty() {
            return Err(ProtocolError::MissingField("identity"));
        }
        if self.dataset.is_empty() {
            return Err(ProtocolError::MissingField("dataset"));
        }
        Ok(())
    }

    /// Encodes to JSON bytes.
    pub fn to_json(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Error payload carried by a failed exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable failure description.
    pub message: String,
}

/// The receiver's answer to an exchange request.
///
/// Success carries the receiver's own delta back to the caller; failure
/// carries an error payload. Lower-level errors are wrapped into the
/// payload at the exchange boundary rather than crossing the transport
/// unstructured.
///
/// Unknown fields are rejected so that a payload which is not this
/// envelope can be recognized and fed through the raw-delta fallback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExchangeResponse {
    /// The receiver's delta since the caller's last checkpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tables: Option<Delta>,
    /// Failure description, when the exchange could not be served.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl ExchangeResponse {
    /// Creates a successful response.
    pub fn success(delta: Delta) -> Self {
        Self {
            tables: Some(delta),
            error: None,
        }
    }

    /// Creates a failed response.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            tables: None,
            error: Some(ErrorBody {
                message: message.into(),
            }),
        }
    }

    /// Returns true when the exchange succeeded.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Consumes the response, yielding the receiver's delta.
    pub fn into_delta(self) -> Delta {
        self.tables.unwrap_or_default()
    }

    /// Encodes to JSON bytes.
    pub fn to_json(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
