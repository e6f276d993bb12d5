//! Command-line interface for mcp-probe.

use crate::client::{ProtocolClient, Session};
use crate::config::{ClientConfig, DEFAULT_ENDPOINT, DEFAULT_TIMEOUT_SECS};
use crate::mcp::ClientInfo;
use crate::shell::{self, Command};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::time::Duration;
use tracing::info;
use url::Url;

#[derive(Parser)]
#[command(name = "mcp-probe")]
#[command(about = "Open an MCP session over streamable HTTP, list capabilities and call tools")]
#[command(version)]
pub struct Cli {
    /// MCP endpoint URL
    #[arg(long, env = "MCP_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: Url,

    /// Request timeout in seconds
    #[arg(long, env = "MCP_TIMEOUT", default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// Reuse an existing session instead of initializing a new one
    #[arg(long, env = "MCP_SESSION_ID")]
    session: Option<String>,

    /// Client name sent during initialize
    #[arg(long, default_value = env!("CARGO_PKG_NAME"))]
    client_name: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a session and print its id and the server info
    Init,

    /// Ping the server
    Ping,

    /// List tools
    Tools,

    /// List resources
    Resources,

    /// List prompts
    Prompts,

    /// Call a tool
    Call {
        /// Tool name
        name: String,
        /// Tool arguments as a JSON object
        #[arg(default_value = "{}", value_parser = parse_json_object)]
        arguments: Value,
    },

    /// Read a resource
    Read {
        /// Resource URI
        uri: String,
    },

    /// Render a prompt
    Prompt {
        /// Prompt name
        name: String,
        /// Prompt arguments (KEY=VALUE)
        #[arg(short, long, value_parser = parse_key_value)]
        arg: Vec<(String, String)>,
    },

    /// Send an arbitrary request
    Raw {
        /// JSON-RPC method
        method: String,
        /// Params as JSON
        #[arg(value_parser = parse_json)]
        params: Option<Value>,
    },

    /// Interactive shell
    Shell,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("Invalid KEY=VALUE format: {}", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn parse_json(s: &str) -> Result<Value, String> {
    serde_json::from_str(s).map_err(|e| format!("Invalid JSON: {}", e))
}

fn parse_json_object(s: &str) -> Result<Value, String> {
    let value = parse_json(s)?;
    if !value.is_object() {
        return Err("Expected a JSON object".to_string());
    }
    Ok(value)
}

impl Commands {
    fn into_command(self) -> Option<Command> {
        Some(match self {
            Commands::Init => Command::Init,
            Commands::Ping => Command::Ping,
            Commands::Tools => Command::Tools,
            Commands::Resources => Command::Resources,
            Commands::Prompts => Command::Prompts,
            Commands::Call { name, arguments } => Command::Call { name, arguments },
            Commands::Read { uri } => Command::Read { uri },
            Commands::Prompt { name, arg } => Command::Prompt {
                name,
                arguments: arg.into_iter().collect(),
            },
            Commands::Raw { method, params } => Command::Raw { method, params },
            Commands::Shell => return None,
        })
    }
}

impl Cli {
    fn config(&self) -> ClientConfig {
        ClientConfig::new(self.endpoint.clone())
            .with_timeout(Duration::from_secs(self.timeout))
            .with_client_info(ClientInfo {
                name: self.client_name.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            })
    }

    pub async fn run(self) -> Result<()> {
        let mut client = ProtocolClient::new(self.config()).context("Failed to build HTTP client")?;

        if let Some(id) = self.session {
            info!(session = %id, "Reusing session");
            client = client.with_session(Session::new(id));
        }

        let Some(command) = self.command.into_command() else {
            if client.session().is_none() {
                client
                    .connect()
                    .await
                    .with_context(|| format!("Failed to open session at {}", client.endpoint()))?;
            }
            return shell::run(&mut client).await;
        };

        // `init` opens its own session; everything else needs one first
        if command != Command::Init && client.session().is_none() {
            client
                .connect()
                .await
                .with_context(|| format!("Failed to open session at {}", client.endpoint()))?;
        }

        let output = shell::execute(&mut client, command).await?;
        println!("{}", shell::render(&output)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_key_value_valid() {
        let result = parse_key_value("KEY=VALUE").unwrap();
        assert_eq!(result, ("KEY".to_string(), "VALUE".to_string()));
    }

    #[test]
    fn parse_key_value_with_equals_in_value() {
        let result = parse_key_value("KEY=VAL=UE").unwrap();
        assert_eq!(result, ("KEY".to_string(), "VAL=UE".to_string()));
    }

    #[test]
    fn parse_key_value_missing_equals() {
        assert!(parse_key_value("KEYVALUE").is_err());
    }

    #[test]
    fn parse_json_object_rejects_arrays() {
        assert!(parse_json_object("[1]").is_err());
        assert_eq!(parse_json_object(r#"{"a":5}"#).unwrap(), json!({"a": 5}));
    }

    #[test]
    fn call_subcommand() {
        let cli = Cli::try_parse_from([
            "mcp-probe",
            "--endpoint",
            "http://localhost:9000/mcp",
            "call",
            "sum",
            r#"{"a":5,"b":3}"#,
        ])
        .unwrap();
        assert_eq!(cli.endpoint.as_str(), "http://localhost:9000/mcp");
        assert_eq!(
            cli.command.into_command(),
            Some(Command::Call {
                name: "sum".into(),
                arguments: json!({"a": 5, "b": 3}),
            })
        );
    }

    #[test]
    fn call_defaults_to_empty_arguments() {
        let cli = Cli::try_parse_from(["mcp-probe", "call", "now"]).unwrap();
        assert_eq!(
            cli.command.into_command(),
            Some(Command::Call {
                name: "now".into(),
                arguments: json!({}),
            })
        );
    }

    #[test]
    fn prompt_args_collect() {
        let cli =
            Cli::try_parse_from(["mcp-probe", "prompt", "greet", "-a", "name=World"]).unwrap();
        let Some(Command::Prompt { name, arguments }) = cli.command.into_command() else {
            panic!("expected prompt command");
        };
        assert_eq!(name, "greet");
        assert_eq!(arguments.get("name").map(String::as_str), Some("World"));
    }

    #[test]
    fn shell_is_not_a_single_command() {
        let cli = Cli::try_parse_from(["mcp-probe", "shell"]).unwrap();
        assert!(cli.command.into_command().is_none());
    }

    #[test]
    fn config_from_flags() {
        let cli = Cli::try_parse_from([
            "mcp-probe",
            "--timeout",
            "5",
            "--client-name",
            "probe-test",
            "tools",
        ])
        .unwrap();
        let cfg = cli.config();
        assert_eq!(cfg.timeout, Duration::from_secs(5));
        assert_eq!(cfg.client_info.name, "probe-test");
    }

    #[test]
    fn rejects_bad_endpoint() {
        assert!(Cli::try_parse_from(["mcp-probe", "--endpoint", "not a url", "tools"]).is_err());
    }
}
