//! Session-bound JSON-RPC client over streamable HTTP.

use crate::config::ClientConfig;
use crate::error::{ClientError, ProtocolError, TransportError};
use crate::framing;
use crate::mcp::{
    CallToolParams, CallToolResult, ClientInfo, GetPromptParams, GetPromptResult,
    InitializeParams, InitializeResult, ListPromptsResult, ListResourcesResult, ListToolsResult,
    Notification, PROTOCOL_VERSION_HEADER, Prompt, ReadResourceParams, ReadResourceResult,
    Request, RequestId, Resource, Response, RpcError, SESSION_HEADER, Tool,
};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};
use url::Url;

/// Correlation id reserved for the `initialize` request
pub const INITIALIZE_ID: i64 = 1;

/// Server-issued session identifier. Replaced, never edited.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Session(String);

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What came back from one POST, before any JSON-RPC interpretation
struct Exchange {
    status: StatusCode,
    session_id: Option<String>,
    body: String,
}

/// Client for one MCP endpoint.
///
/// Requests are strictly sequential: one POST, one answer. The session is
/// created by [`initialize`](Self::initialize) and read by everything after it.
pub struct ProtocolClient {
    http: reqwest::Client,
    endpoint: Url,
    protocol_version: String,
    client_info: ClientInfo,
    session: Option<Session>,
    server: Option<InitializeResult>,
    next_id: i64,
}

impl ProtocolClient {
    pub fn new(config: ClientConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            http,
            endpoint: config.endpoint,
            protocol_version: config.protocol_version,
            client_info: config.client_info,
            session: None,
            server: None,
            next_id: INITIALIZE_ID + 1,
        })
    }

    /// Resume a session obtained elsewhere instead of initializing
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Server's answer to the last successful `initialize`
    pub fn server(&self) -> Option<&InitializeResult> {
        self.server.as_ref()
    }

    /// Open a new session: `initialize`, then `notifications/initialized`.
    pub async fn connect(&mut self) -> Result<Session, ClientError> {
        let client_info = self.client_info.clone();
        let session = self.initialize(&client_info).await?;

        // A handshake that never completed leaves no usable session
        if let Err(e) = self.notify_initialized(&session).await {
            warn!(session = %session, error = %e, "Initialized notification failed, dropping session");
            self.session = None;
            self.server = None;
            return Err(e);
        }
        Ok(session)
    }

    /// Perform the handshake and store the session the server issues.
    ///
    /// Any session already held is dropped first, so a failure here leaves
    /// the client with no session at all.
    pub async fn initialize(&mut self, client_info: &ClientInfo) -> Result<Session, ClientError> {
        const METHOD: &str = "initialize";

        if let Some(old) = self.session.take() {
            info!(session = %old, "Discarding session for re-initialization");
        }
        self.server = None;

        let params = InitializeParams {
            protocol_version: self.protocol_version.clone(),
            capabilities: Default::default(),
            client_info: client_info.clone(),
        };
        let request = Request::new(INITIALIZE_ID, METHOD, Some(encode_params(METHOD, params)?));

        let exchange = self.post(METHOD, &request, None).await?;
        check_status(METHOD, &exchange)?;

        let session = exchange
            .session_id
            .as_deref()
            .map(Session::new)
            .ok_or_else(|| ClientError::protocol(METHOD, ProtocolError::MissingSessionId))?;

        let result = decode_response(METHOD, &request.id, &exchange.body)?;
        let result: InitializeResult = serde_json::from_value(result).map_err(|source| {
            ClientError::protocol(METHOD, ProtocolError::InvalidResult { source })
        })?;

        if result.protocol_version != self.protocol_version {
            debug!(
                requested = %self.protocol_version,
                negotiated = %result.protocol_version,
                "Server chose a different protocol version"
            );
        }
        info!(
            session = %session,
            server = %result.server_info.name,
            version = %result.server_info.version,
            protocol = %result.protocol_version,
            "Session initialized"
        );

        self.server = Some(result);
        self.session = Some(session.clone());
        Ok(session)
    }

    /// Tell the server the handshake is complete
    pub async fn notify_initialized(&self, session: &Session) -> Result<(), ClientError> {
        self.notify(session, "notifications/initialized", None)
            .await
    }

    /// Send a one-way notification.
    ///
    /// Whatever body comes back is logged and otherwise ignored; only a failed
    /// exchange or a non-2xx status is an error.
    pub async fn notify(
        &self,
        session: &Session,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), ClientError> {
        let notification = Notification::new(method, params);
        let exchange = self.post(method, &notification, Some(session)).await?;

        if !exchange.status.is_success() {
            warn!(method, status = %exchange.status, "Notification rejected");
            return Err(ClientError::transport(
                method,
                TransportError::Status {
                    status: exchange.status,
                    body: exchange.body,
                },
            ));
        }

        if !exchange.body.trim().is_empty() {
            debug!(method, body = %exchange.body, "Ignoring notification response body");
        }
        debug!(method, "Sent notification");
        Ok(())
    }

    /// Send one request on `session` and return its result payload.
    ///
    /// The caller picks the correlation id; a response carrying a different
    /// id is rejected as a protocol error.
    pub async fn call(
        &self,
        session: &Session,
        method: &str,
        params: Option<Value>,
        id: RequestId,
    ) -> Result<Value, ClientError> {
        let request = Request::new(id, method, params);
        debug!(method, id = %request.id, "Sending request");

        let exchange = self.post(method, &request, Some(session)).await?;
        check_status(method, &exchange)?;
        decode_response(method, &request.id, &exchange.body)
    }

    /// Call on the held session with the next free id
    pub async fn request_value(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, ClientError> {
        let id = RequestId::Number(self.next_id);
        let session = self.session.as_ref().ok_or_else(|| ClientError::NoSession {
            method: method.to_string(),
        })?;
        self.next_id += 1;

        let result = self.call(session, method, params, id).await;
        if let Err(e) = &result
            && e.is_session_rejected()
        {
            warn!(method, session = %session, "Server rejected session; re-initialize to continue");
        }
        result
    }

    /// Typed form of [`request_value`](Self::request_value)
    pub async fn request<T: DeserializeOwned>(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> Result<T, ClientError> {
        let value = self.request_value(method, params).await?;
        serde_json::from_value(value)
            .map_err(|source| ClientError::protocol(method, ProtocolError::InvalidResult { source }))
    }

    pub async fn ping(&mut self) -> Result<(), ClientError> {
        self.request_value("ping", None).await.map(|_| ())
    }

    pub async fn list_tools(&mut self) -> Result<Vec<Tool>, ClientError> {
        let result: ListToolsResult = self.request("tools/list", None).await?;
        Ok(result.tools)
    }

    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: Value,
    ) -> Result<CallToolResult, ClientError> {
        const METHOD: &str = "tools/call";
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        self.request(METHOD, Some(encode_params(METHOD, params)?))
            .await
    }

    pub async fn list_resources(&mut self) -> Result<Vec<Resource>, ClientError> {
        let result: ListResourcesResult = self.request("resources/list", None).await?;
        Ok(result.resources)
    }

    pub async fn read_resource(&mut self, uri: &str) -> Result<ReadResourceResult, ClientError> {
        const METHOD: &str = "resources/read";
        let params = ReadResourceParams {
            uri: uri.to_string(),
        };
        self.request(METHOD, Some(encode_params(METHOD, params)?))
            .await
    }

    pub async fn list_prompts(&mut self) -> Result<Vec<Prompt>, ClientError> {
        let result: ListPromptsResult = self.request("prompts/list", None).await?;
        Ok(result.prompts)
    }

    pub async fn get_prompt(
        &mut self,
        name: &str,
        arguments: HashMap<String, String>,
    ) -> Result<GetPromptResult, ClientError> {
        const METHOD: &str = "prompts/get";
        let params = GetPromptParams {
            name: name.to_string(),
            arguments,
        };
        self.request(METHOD, Some(encode_params(METHOD, params)?))
            .await
    }

    /// POST one message and collect status, session header and body
    async fn post<B: Serialize>(
        &self,
        method: &str,
        message: &B,
        session: Option<&Session>,
    ) -> Result<Exchange, ClientError> {
        let mut req = self
            .http
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json, text/event-stream")
            .json(message);

        if let Some(session) = session {
            req = req.header(SESSION_HEADER, session.as_str());
        }
        if let Some(server) = &self.server {
            req = req.header(PROTOCOL_VERSION_HEADER, &server.protocol_version);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ClientError::transport(method, e))?;

        let status = resp.status();
        let session_id = session_id_from_headers(resp.headers());
        let body = resp
            .text()
            .await
            .map_err(|e| ClientError::transport(method, e))?;

        debug!(method, %status, bytes = body.len(), "Received response");
        Ok(Exchange {
            status,
            session_id,
            body,
        })
    }
}

/// Session id from response headers, trimmed. Empty counts as absent.
///
/// `HeaderMap` normalizes names, so the lookup ignores case.
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn encode_params<T: Serialize>(method: &str, params: T) -> Result<Value, ClientError> {
    serde_json::to_value(params).map_err(|source| ClientError::Encode {
        method: method.to_string(),
        source,
    })
}

fn remote(method: &str, error: RpcError, status: Option<StatusCode>) -> ClientError {
    ClientError::Remote {
        method: method.to_string(),
        code: error.code,
        message: error.message,
        data: error.data,
        status,
    }
}

/// Non-2xx is a transport failure unless the body is a JSON-RPC error
fn check_status(method: &str, exchange: &Exchange) -> Result<(), ClientError> {
    if exchange.status.is_success() {
        return Ok(());
    }

    match read_response(&exchange.body) {
        Ok(Response {
            error: Some(error), ..
        }) => return Err(remote(method, error, Some(exchange.status))),
        Ok(_) => debug!(method, status = %exchange.status, "Error status with a non-error JSON-RPC body"),
        Err(e) => debug!(method, status = %exchange.status, error = %e, "Error status body is not JSON-RPC"),
    }

    warn!(method, status = %exchange.status, "Request failed");
    Err(ClientError::transport(
        method,
        TransportError::Status {
            status: exchange.status,
            body: exchange.body.clone(),
        },
    ))
}

/// Find the JSON-RPC response in a (possibly framed) body
fn read_response(body: &str) -> Result<Response, ProtocolError> {
    let docs = framing::unframe(body);
    if docs.is_empty() {
        return Err(ProtocolError::EmptyResponse);
    }

    for doc in &docs {
        let value: Value = serde_json::from_str(doc).map_err(|source| ProtocolError::Unparseable {
            body: body.to_string(),
            source,
        })?;

        // Server-initiated requests and notifications can share the stream
        if let Some(method) = value.get("method").and_then(Value::as_str) {
            debug!(method, "Skipping server-initiated message");
            continue;
        }

        return serde_json::from_value(value).map_err(|_| ProtocolError::NotAResponse {
            body: doc.clone(),
        });
    }

    Err(ProtocolError::NotAResponse {
        body: body.to_string(),
    })
}

/// Turn a response body into the result for request `id`
fn decode_response(method: &str, id: &RequestId, body: &str) -> Result<Value, ClientError> {
    let response = read_response(body).map_err(|e| ClientError::protocol(method, e))?;

    if let Some(actual) = &response.id
        && actual != id
    {
        return Err(ClientError::protocol(
            method,
            ProtocolError::IdMismatch {
                expected: id.clone(),
                actual: actual.clone(),
            },
        ));
    }

    if let Some(error) = response.error {
        return Err(remote(method, error, None));
    }

    response
        .result
        .ok_or_else(|| ClientError::protocol(method, ProtocolError::MissingResult))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderName, HeaderValue};
    use serde_json::json;

    fn headers(name: &str, value: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
        map
    }

    #[test]
    fn session_header_any_case_trimmed() {
        assert_eq!(
            session_id_from_headers(&headers("Mcp-Session-Id", "  abc-123\t")),
            Some("abc-123".to_string())
        );
        assert_eq!(
            session_id_from_headers(&headers("MCP-SESSION-ID", "xyz")),
            Some("xyz".to_string())
        );
    }

    #[test]
    fn session_header_empty_or_missing() {
        assert_eq!(session_id_from_headers(&headers("mcp-session-id", "")), None);
        assert_eq!(session_id_from_headers(&headers("mcp-session-id", "   ")), None);
        assert_eq!(session_id_from_headers(&headers("x-other", "abc")), None);
    }

    #[test]
    fn decodes_result() {
        let body = r#"{"jsonrpc":"2.0","id":5,"result":{"content":[{"type":"text","text":"8"}]}}"#;
        let result = decode_response("tools/call", &RequestId::Number(5), body).unwrap();
        assert_eq!(result["content"][0]["text"], "8");
    }

    #[test]
    fn decodes_framed_result() {
        let body = "data: {\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{\"tools\":[]}}\n";
        let result = decode_response("tools/list", &RequestId::Number(2), body).unwrap();
        assert_eq!(result, json!({"tools": []}));
    }

    #[test]
    fn error_object_is_remote() {
        let body = r#"{"jsonrpc":"2.0","id":3,"error":{"code":-32602,"message":"Invalid params","data":{"field":"a"}}}"#;
        let err = decode_response("tools/call", &RequestId::Number(3), body).unwrap_err();
        match err {
            ClientError::Remote {
                method,
                code,
                message,
                data,
                status,
            } => {
                assert_eq!(method, "tools/call");
                assert_eq!(status, None);
                assert_eq!(code, -32602);
                assert_eq!(message, "Invalid params");
                assert_eq!(data, Some(json!({"field": "a"})));
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[test]
    fn error_with_null_id_is_still_remote() {
        let body = r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"Parse error"}}"#;
        let err = decode_response("tools/list", &RequestId::Number(4), body).unwrap_err();
        assert!(err.is_remote());
    }

    #[test]
    fn mismatched_id_is_protocol_error() {
        let body = r#"{"jsonrpc":"2.0","id":99,"result":{}}"#;
        let err = decode_response("tools/list", &RequestId::Number(4), body).unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol {
                source: ProtocolError::IdMismatch { .. },
                ..
            }
        ));
    }

    #[test]
    fn string_id_must_match_exactly() {
        let body = r#"{"jsonrpc":"2.0","id":"4","result":{}}"#;
        let err = decode_response("ping", &RequestId::Number(4), body).unwrap_err();
        assert!(err.is_protocol());

        let ok = decode_response("ping", &RequestId::from("4"), body).unwrap();
        assert_eq!(ok, json!({}));
    }

    #[test]
    fn garbage_is_unparseable_with_body() {
        let err = decode_response("tools/list", &RequestId::Number(2), "<html>oops</html>")
            .unwrap_err();
        match err {
            ClientError::Protocol {
                source: ProtocolError::Unparseable { body, .. },
                ..
            } => assert_eq!(body, "<html>oops</html>"),
            other => panic!("expected unparseable, got {other:?}"),
        }
    }

    #[test]
    fn empty_body_is_protocol_error() {
        let err = decode_response("tools/list", &RequestId::Number(2), "").unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol {
                source: ProtocolError::EmptyResponse,
                ..
            }
        ));
    }

    #[test]
    fn neither_result_nor_error() {
        let err = decode_response("ping", &RequestId::Number(2), r#"{"jsonrpc":"2.0","id":2}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol {
                source: ProtocolError::MissingResult,
                ..
            }
        ));
    }

    #[test]
    fn non_object_is_not_a_response() {
        let err = decode_response("ping", &RequestId::Number(2), "[1,2,3]").unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol {
                source: ProtocolError::NotAResponse { .. },
                ..
            }
        ));
    }

    #[test]
    fn skips_server_messages_in_stream() {
        let body = concat!(
            "event: message\n",
            "data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\",\"params\":{\"progress\":1}}\n",
            "\n",
            "event: message\n",
            "data: {\"jsonrpc\":\"2.0\",\"id\":7,\"result\":{\"ok\":true}}\n",
            "\n",
        );
        let result = decode_response("tools/call", &RequestId::Number(7), body).unwrap();
        assert_eq!(result, json!({"ok": true}));
    }

    #[test]
    fn non_success_status_without_rpc_body_is_transport() {
        let exchange = Exchange {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            session_id: None,
            body: "upstream exploded".into(),
        };
        let err = check_status("tools/list", &exchange).unwrap_err();
        assert!(err.is_transport());
        assert!(err.to_string().contains("upstream exploded"));
    }

    #[test]
    fn non_success_status_with_rpc_error_is_remote() {
        let exchange = Exchange {
            status: StatusCode::BAD_REQUEST,
            session_id: None,
            body: r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32000,"message":"Bad Request: No valid session ID provided"}}"#.into(),
        };
        let err = check_status("tools/list", &exchange).unwrap_err();
        match err {
            ClientError::Remote {
                code,
                message,
                status,
                ..
            } => {
                assert_eq!(status, Some(StatusCode::BAD_REQUEST));
                assert_eq!(code, -32000);
                assert!(message.contains("session"));
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_session_is_rejection() {
        let exchange = Exchange {
            status: StatusCode::NOT_FOUND,
            session_id: None,
            body: String::new(),
        };
        let err = check_status("tools/list", &exchange).unwrap_err();
        assert!(err.is_session_rejected());
    }

    #[test]
    fn unknown_session_with_rpc_body_is_remote_and_rejection() {
        let exchange = Exchange {
            status: StatusCode::NOT_FOUND,
            session_id: None,
            body: r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32001,"message":"Session not found"}}"#.into(),
        };
        let err = check_status("tools/list", &exchange).unwrap_err();
        assert!(err.is_remote());
        assert!(err.is_session_rejected());
    }

    #[test]
    fn unserializable_params_fail_before_sending() {
        let params = std::collections::BTreeMap::from([((1, 2), "x")]);
        let err = encode_params("tools/call", params).unwrap_err();
        assert!(matches!(err, ClientError::Encode { .. }));
        assert_eq!(err.method(), "tools/call");
    }
}
