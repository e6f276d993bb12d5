//! Session-aware client for MCP servers reached over streamable HTTP.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod framing;
pub mod mcp;
pub mod shell;

pub use client::{ProtocolClient, Session};
pub use config::ClientConfig;
pub use error::{ClientError, ProtocolError, TransportError};
