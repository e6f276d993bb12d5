//! Command dispatch shared by the one-shot subcommands and the interactive shell.

use crate::client::ProtocolClient;
use crate::error::ClientError;
use anyhow::{Context, Result, bail};
use serde_json::{Value, json};
use std::collections::HashMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// One thing the user asked for
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Init,
    Session,
    Ping,
    Tools,
    Resources,
    Prompts,
    Call { name: String, arguments: Value },
    Read { uri: String },
    Prompt {
        name: String,
        arguments: HashMap<String, String>,
    },
    Raw { method: String, params: Option<Value> },
    Help,
    Quit,
}

/// What a command produced
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Json(Value),
    Text(String),
    Quit,
}

struct Entry {
    name: &'static str,
    usage: &'static str,
    build: fn(&str) -> Result<Command>,
}

const COMMANDS: &[Entry] = &[
    Entry {
        name: "init",
        usage: "init                      open a new session",
        build: |_| Ok(Command::Init),
    },
    Entry {
        name: "session",
        usage: "session                   show the active session id",
        build: |_| Ok(Command::Session),
    },
    Entry {
        name: "ping",
        usage: "ping                      check the server is alive",
        build: |_| Ok(Command::Ping),
    },
    Entry {
        name: "tools",
        usage: "tools                     list tools",
        build: |_| Ok(Command::Tools),
    },
    Entry {
        name: "resources",
        usage: "resources                 list resources",
        build: |_| Ok(Command::Resources),
    },
    Entry {
        name: "prompts",
        usage: "prompts                   list prompts",
        build: |_| Ok(Command::Prompts),
    },
    Entry {
        name: "call",
        usage: "call <tool> [json]        call a tool, e.g. call sum {\"a\":5,\"b\":3}",
        build: build_call,
    },
    Entry {
        name: "read",
        usage: "read <uri>                read a resource",
        build: build_read,
    },
    Entry {
        name: "prompt",
        usage: "prompt <name> [json]      render a prompt with string arguments",
        build: build_prompt,
    },
    Entry {
        name: "raw",
        usage: "raw <method> [json]       send any request",
        build: build_raw,
    },
    Entry {
        name: "help",
        usage: "help                      show this list",
        build: |_| Ok(Command::Help),
    },
    Entry {
        name: "quit",
        usage: "quit                      leave the shell",
        build: |_| Ok(Command::Quit),
    },
];

/// Parse one input line. Blank lines and `#` comments yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (word, rest) = split_word(line);
    let word = match word {
        "exit" => "quit",
        "?" => "help",
        w => w,
    };

    let entry = COMMANDS
        .iter()
        .find(|e| e.name == word)
        .with_context(|| format!("Unknown command '{}'. Type 'help' for a list.", word))?;

    (entry.build)(rest).map(Some)
}

pub fn help() -> String {
    let mut out = String::from("Commands:\n");
    for entry in COMMANDS {
        out.push_str("  ");
        out.push_str(entry.usage);
        out.push('\n');
    }
    out
}

fn split_word(s: &str) -> (&str, &str) {
    match s.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (s, ""),
    }
}

fn parse_json(s: &str) -> Result<Option<Value>> {
    if s.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(s)
        .map(Some)
        .with_context(|| format!("Invalid JSON: {}", s))
}

fn required<'a>(value: &'a str, what: &str) -> Result<&'a str> {
    if value.is_empty() {
        bail!("Missing {}", what);
    }
    Ok(value)
}

fn build_call(rest: &str) -> Result<Command> {
    let (name, args) = split_word(rest);
    let name = required(name, "tool name")?;
    let arguments = parse_json(args)?.unwrap_or_else(|| json!({}));
    if !arguments.is_object() {
        bail!("Tool arguments must be a JSON object");
    }
    Ok(Command::Call {
        name: name.to_string(),
        arguments,
    })
}

fn build_read(rest: &str) -> Result<Command> {
    Ok(Command::Read {
        uri: required(rest, "resource URI")?.to_string(),
    })
}

fn build_prompt(rest: &str) -> Result<Command> {
    let (name, args) = split_word(rest);
    let name = required(name, "prompt name")?;
    let arguments = match parse_json(args)? {
        Some(v) => serde_json::from_value(v)
            .context("Prompt arguments must be an object of strings")?,
        None => HashMap::new(),
    };
    Ok(Command::Prompt {
        name: name.to_string(),
        arguments,
    })
}

fn build_raw(rest: &str) -> Result<Command> {
    let (method, params) = split_word(rest);
    Ok(Command::Raw {
        method: required(method, "method")?.to_string(),
        params: parse_json(params)?,
    })
}

/// Run one command against the client
pub async fn execute(client: &mut ProtocolClient, command: Command) -> Result<Output> {
    let output = match command {
        Command::Init => {
            let session = client.connect().await?;
            Output::Json(json!({
                "session": session.as_str(),
                "server": client.server(),
            }))
        }
        Command::Session => Output::Text(match client.session() {
            Some(session) => session.to_string(),
            None => "no active session".to_string(),
        }),
        Command::Ping => {
            client.ping().await?;
            Output::Text("pong".to_string())
        }
        Command::Tools => Output::Json(serde_json::to_value(client.list_tools().await?)?),
        Command::Resources => Output::Json(serde_json::to_value(client.list_resources().await?)?),
        Command::Prompts => Output::Json(serde_json::to_value(client.list_prompts().await?)?),
        Command::Call { name, arguments } => {
            Output::Json(serde_json::to_value(client.call_tool(&name, arguments).await?)?)
        }
        Command::Read { uri } => {
            Output::Json(serde_json::to_value(client.read_resource(&uri).await?)?)
        }
        Command::Prompt { name, arguments } => {
            Output::Json(serde_json::to_value(client.get_prompt(&name, arguments).await?)?)
        }
        Command::Raw { method, params } => Output::Json(client.request_value(&method, params).await?),
        Command::Help => Output::Text(help()),
        Command::Quit => Output::Quit,
    };
    Ok(output)
}

pub fn render(output: &Output) -> Result<String> {
    Ok(match output {
        Output::Json(v) => serde_json::to_string_pretty(v)?,
        Output::Text(s) => s.trim_end().to_string(),
        Output::Quit => String::new(),
    })
}

fn describe_error(err: &anyhow::Error) -> String {
    match err.downcast_ref::<ClientError>() {
        Some(e) if e.is_session_rejected() => {
            format!("error: {:#}\nhint: the server dropped the session, run 'init'", err)
        }
        Some(ClientError::NoSession { .. }) => {
            format!("error: {:#}\nhint: run 'init' first", err)
        }
        _ => format!("error: {:#}", err),
    }
}

/// Read commands from stdin until EOF or `quit`
pub async fn run(client: &mut ProtocolClient) -> Result<()> {
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();

    stdout.write_all(help().as_bytes()).await?;

    loop {
        stdout.write_all(b"mcp> ").await?;
        stdout.flush().await?;

        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }

        let command = match parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("{}", describe_error(&e));
                continue;
            }
        };

        match execute(client, command).await {
            Ok(Output::Quit) => break,
            Ok(output) => {
                let mut text = render(&output)?;
                text.push('\n');
                stdout.write_all(text.as_bytes()).await?;
            }
            Err(e) => eprintln!("{}", describe_error(&e)),
        }
    }

    Ok(())
}
