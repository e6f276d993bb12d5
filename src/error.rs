//! Client error types.
//!
//! Failures fall into three disjoint categories plus two local failures that
//! happen before anything is sent:
//! - [`ClientError::Transport`]: the HTTP exchange itself failed
//! - [`ClientError::Protocol`]: the exchange completed but broke the protocol contract
//! - [`ClientError::Remote`]: the server answered with a JSON-RPC error object
//! - [`ClientError::NoSession`]: a session-bound helper ran before `initialize`
//! - [`ClientError::Encode`]: request params could not be serialized; nothing was sent

use crate::mcp::RequestId;
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{method}: transport error: {source}")]
    Transport {
        method: String,
        #[source]
        source: TransportError,
    },

    #[error("{method}: protocol error: {source}")]
    Protocol {
        method: String,
        #[source]
        source: ProtocolError,
    },

    #[error("{method}: server returned error {code}: {message}")]
    Remote {
        method: String,
        code: i32,
        message: String,
        data: Option<Value>,
        /// Set when the error object arrived with a non-2xx status
        status: Option<StatusCode>,
    },

    #[error("{method}: no active session, initialize first")]
    NoSession { method: String },

    #[error("{method}: failed to encode params: {source}")]
    Encode {
        method: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("initialize response carried no session id")]
    MissingSessionId,

    #[error("empty response body")]
    EmptyResponse,

    #[error("unparseable response: {source}; body: {body}")]
    Unparseable {
        body: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("body is not a JSON-RPC response: {body}")]
    NotAResponse { body: String },

    #[error("response id {actual} does not match request id {expected}")]
    IdMismatch {
        expected: RequestId,
        actual: RequestId,
    },

    #[error("response has neither result nor error")]
    MissingResult,

    #[error("result does not have the expected shape: {source}")]
    InvalidResult {
        #[source]
        source: serde_json::Error,
    },
}

impl ClientError {
    pub(crate) fn transport(method: &str, source: impl Into<TransportError>) -> Self {
        ClientError::Transport {
            method: method.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn protocol(method: &str, source: ProtocolError) -> Self {
        ClientError::Protocol {
            method: method.to_string(),
            source,
        }
    }

    /// Method the failed exchange was attempting
    pub fn method(&self) -> &str {
        match self {
            ClientError::Transport { method, .. }
            | ClientError::Protocol { method, .. }
            | ClientError::Remote { method, .. }
            | ClientError::NoSession { method }
            | ClientError::Encode { method, .. } => method,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport { .. })
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, ClientError::Protocol { .. })
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, ClientError::Remote { .. })
    }

    /// HTTP status of the failed exchange, when one completed
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Transport {
                source: TransportError::Status { status, .. },
                ..
            } => Some(*status),
            ClientError::Remote { status, .. } => *status,
            _ => None,
        }
    }

    /// True when the server refused the session we sent (HTTP 404), with or
    /// without a JSON-RPC error body. The caller should run `initialize` again.
    pub fn is_session_rejected(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_method() {
        let err = ClientError::Remote {
            method: "tools/call".into(),
            code: -32601,
            message: "Method not found".into(),
            data: None,
            status: None,
        };
        assert_eq!(
            err.to_string(),
            "tools/call: server returned error -32601: Method not found"
        );
        assert_eq!(err.method(), "tools/call");
    }

    #[test]
    fn unparseable_keeps_raw_body() {
        let source = serde_json::from_str::<Value>("<html>").unwrap_err();
        let err = ClientError::protocol(
            "tools/list",
            ProtocolError::Unparseable {
                body: "<html>".into(),
                source,
            },
        );
        assert!(err.is_protocol());
        assert!(err.to_string().contains("body: <html>"));
    }

    #[test]
    fn session_rejection_is_404_only() {
        let rejected = ClientError::transport(
            "tools/list",
            TransportError::Status {
                status: StatusCode::NOT_FOUND,
                body: String::new(),
            },
        );
        let other = ClientError::transport(
            "tools/list",
            TransportError::Status {
                status: StatusCode::BAD_GATEWAY,
                body: String::new(),
            },
        );
        assert!(rejected.is_session_rejected());
        assert!(rejected.is_transport());
        assert!(!other.is_session_rejected());
    }

    #[test]
    fn session_rejection_with_rpc_body() {
        let rejected = ClientError::Remote {
            method: "tools/list".into(),
            code: -32001,
            message: "Session not found".into(),
            data: None,
            status: Some(StatusCode::NOT_FOUND),
        };
        let plain = ClientError::Remote {
            method: "tools/list".into(),
            code: -32001,
            message: "Session not found".into(),
            data: None,
            status: None,
        };
        assert!(rejected.is_remote());
        assert!(rejected.is_session_rejected());
        assert!(!plain.is_session_rejected());
    }

    #[test]
    fn categories_do_not_overlap() {
        let err = ClientError::protocol("initialize", ProtocolError::MissingSessionId);
        assert!(err.is_protocol());
        assert!(!err.is_transport());
        assert!(!err.is_remote());
        assert!(!err.is_session_rejected());
    }

    #[test]
    fn encode_failure_is_its_own_category() {
        let source = serde_json::to_value(std::collections::BTreeMap::from([((1, 2), 3)]))
            .unwrap_err();
        let err = ClientError::Encode {
            method: "tools/call".into(),
            source,
        };
        assert_eq!(err.method(), "tools/call");
        assert!(!err.is_transport());
        assert!(!err.is_protocol());
        assert!(!err.is_remote());
    }
}
