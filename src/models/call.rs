use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::DispatchError;

pub type CallId = u64;
pub type TransactionId = u64;

pub type CallResult = Result<Value, DispatchError>;

/// What a caller asks for: `service.method(params)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallDescriptor {
    pub service: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl CallDescriptor {
    pub fn new(service: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            params,
        }
    }

    /// Parses `service.method`, splitting on the last dot.
    pub fn parse(route: &str, params: Value) -> Option<Self> {
        let (service, method) = route.trim().rsplit_once('.')?;
        if service.is_empty() || method.is_empty() {
            return None;
        }
        Some(Self::new(service, method, params))
    }

    pub fn route_key(&self) -> String {
        format!("{}.{}", self.service, self.method)
    }
}

/// One caller's in-flight request, owned by the dispatch worker.
#[derive(Debug)]
pub struct PendingCall {
    pub id: CallId,
    pub service: String,
    pub method: String,
    pub params: Value,
    pub url: String,
    pub transaction_id: TransactionId,
    responder: oneshot::Sender<CallResult>,
}

impl PendingCall {
    pub fn new(
        id: CallId,
        descriptor: CallDescriptor,
        url: String,
        responder: oneshot::Sender<CallResult>,
    ) -> Self {
        Self {
            id,
            service: descriptor.service,
            method: descriptor.method,
            params: descriptor.params,
            url,
            transaction_id: 0,
            responder,
        }
    }

    pub fn is_flushed(&self) -> bool {
        self.transaction_id != 0
    }

    pub fn to_request_entry(&self) -> BatchRequestEntry {
        BatchRequestEntry {
            id: self.id,
            service: self.service.clone(),
            method: self.method.clone(),
            params: self.params.clone(),
        }
    }

    /// Returns false when the caller already stopped listening.
    pub fn reject(self, error: DispatchError) -> bool {
        self.responder.send(Err(error)).is_ok()
    }

    pub fn complete(self, result: CallResult) -> bool {
        self.responder.send(result).is_ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchRequestEntry {
    pub id: CallId,
    pub service: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_code(code: i64, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
            data: None,
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// `{id, value}` or `{id, error}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchResponseEntry {
    pub id: CallId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
}

impl BatchResponseEntry {
    pub fn value(id: CallId, value: Value) -> Self {
        Self {
            id,
            value: Some(value),
            error: None,
        }
    }

    pub fn error(id: CallId, error: RemoteError) -> Self {
        Self {
            id,
            value: None,
            error: Some(error),
        }
    }

    /// An error entry wins over a value; a bare `{id}` resolves to `null`.
    pub fn into_result(self) -> CallResult {
        match (self.error, self.value) {
            (Some(error), _) => Err(DispatchError::Remote {
                call_id: self.id,
                error,
            }),
            (None, value) => Ok(value.unwrap_or(Value::Null)),
        }
    }
}
