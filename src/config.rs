//! Client configuration.

use crate::mcp::{ClientInfo, PROTOCOL_VERSION};
use std::time::Duration;
use url::Url;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8000/mcp";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Everything a [`ProtocolClient`](crate::client::ProtocolClient) needs
/// before it can talk to a server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: Url,
    pub timeout: Duration,
    pub protocol_version: String,
    pub client_info: ClientInfo,
}

impl ClientConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            protocol_version: PROTOCOL_VERSION.to_string(),
            client_info: ClientInfo::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_client_info(mut self, client_info: ClientInfo) -> Self {
        self.client_info = client_info;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ClientConfig::new(DEFAULT_ENDPOINT.parse().unwrap());
        assert_eq!(cfg.endpoint.as_str(), "http://127.0.0.1:8000/mcp");
        assert_eq!(cfg.timeout, Duration::from_secs(30));
        assert_eq!(cfg.protocol_version, PROTOCOL_VERSION);
        assert_eq!(cfg.client_info.name, "mcp-probe");
    }

    #[test]
    fn builder_overrides() {
        let info = ClientInfo {
            name: "tester".into(),
            version: "9.9.9".into(),
        };
        let cfg = ClientConfig::new(DEFAULT_ENDPOINT.parse().unwrap())
            .with_timeout(Duration::from_millis(250))
            .with_client_info(info.clone());
        assert_eq!(cfg.timeout, Duration::from_millis(250));
        assert_eq!(cfg.client_info, info);
    }
}
