//! Tor control-port client
//!
//! Speaks just enough of the line-based control protocol to authenticate
//! and ask for a fresh circuit: PROTOCOLINFO, AUTHENTICATE, SIGNAL, QUIT.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use whosurf_core::ControlEndpoint;

/// Errors from the control channel
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Control connection closed")]
    Closed,

    #[error("No answer from control port within {0:?}")]
    Timeout(Duration),

    #[error("Malformed reply line: {0:?}")]
    Malformed(String),

    #[error("Command rejected ({code}): {message}")]
    Rejected { code: u16, message: String },

    #[error("No usable authentication method (offered: {0})")]
    NoUsableAuthMethod(String),

    #[error("Failed to read auth cookie {path}: {source}")]
    Cookie {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Signals understood by the control port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Switch to clean circuits for new connections
    NewNym,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::NewNym => "NEWNYM",
        }
    }
}

/// An open control session.
///
/// `close` must be safe to call after a failed `authenticate` or `signal`.
#[async_trait]
pub trait CircuitController: Send {
    async fn authenticate(&mut self) -> Result<(), ControlError>;

    async fn signal(&mut self, signal: Signal) -> Result<(), ControlError>;

    async fn close(&mut self) -> Result<(), ControlError>;
}

/// One reply from the control port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    pub fn is_ok(&self) -> bool {
        self.code == 250
    }

    fn message(&self) -> String {
        self.lines.join(" ")
    }
}

/// Authentication details advertised by PROTOCOLINFO
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthInfo {
    pub methods: Vec<String>,
    pub cookie_file: Option<PathBuf>,
}

impl AuthInfo {
    fn offers(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m == method)
    }
}

/// Credential chosen for AUTHENTICATE
#[derive(Debug, Clone, PartialEq, Eq)]
enum AuthMethod {
    Null,
    Password(String),
    Cookie(PathBuf),
}

/// Client for a local Tor control port
#[derive(Debug)]
pub struct TorController {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    password: Option<String>,
    timeout: Duration,
    closed: bool,
}

impl TorController {
    /// Open a TCP connection to the control listener.
    ///
    /// The endpoint's timeout bounds the connect and every later command.
    pub async fn connect(endpoint: &ControlEndpoint) -> Result<Self, ControlError> {
        debug!("Connecting to control port {}", endpoint.addr());

        let limit = endpoint.timeout();
        let stream = timeout(limit, TcpStream::connect(endpoint.addr()))
            .await
            .map_err(|_| ControlError::Timeout(limit))??;
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            password: endpoint.password().map(str::to_string),
            timeout: limit,
            closed: false,
        })
    }

    /// Ask which authentication methods the control port accepts
    pub async fn protocol_info(&mut self) -> Result<AuthInfo, ControlError> {
        let reply = self.command("PROTOCOLINFO 1").await?;
        Ok(parse_protocol_info(&reply.lines))
    }

    /// Send a command and require a 250 reply
    pub async fn command(&mut self, command: &str) -> Result<Reply, ControlError> {
        let reply = self.send(command).await?;
        if !reply.is_ok() {
            return Err(ControlError::Rejected {
                code: reply.code,
                message: reply.message(),
            });
        }
        Ok(reply)
    }

    async fn send(&mut self, command: &str) -> Result<Reply, ControlError> {
        if self.closed {
            return Err(ControlError::Closed);
        }
        let limit = self.timeout;
        timeout(limit, self.round_trip(command))
            .await
            .map_err(|_| ControlError::Timeout(limit))?
    }

    async fn round_trip(&mut self, command: &str) -> Result<Reply, ControlError> {
        self.writer
            .write_all(format!("{}\r\n", command).as_bytes())
            .await?;
        self.writer.flush().await?;
        self.read_reply().await
    }

    async fn read_line(&mut self) -> Result<String, ControlError> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Err(ControlError::Closed);
        }
        Ok(line.trim_end_matches(|c| c == '\r' || c == '\n').to_string())
    }

    async fn read_reply(&mut self) -> Result<Reply, ControlError> {
        let mut lines = Vec::new();

        loop {
            let line = self.read_line().await?;
            let (code, separator, text) = split_reply_line(&line)?;
            lines.push(text.to_string());

            match separator {
                ' ' => return Ok(Reply { code, lines }),
                '-' => {}
                '+' => loop {
                    let data = self.read_line().await?;
                    if data == "." {
                        break;
                    }
                    lines.push(data);
                },
                _ => return Err(ControlError::Malformed(line)),
            }
        }
    }
}

#[async_trait]
impl CircuitController for TorController {
    async fn authenticate(&mut self) -> Result<(), ControlError> {
        let info = self.protocol_info().await?;
        let method = choose_auth_method(&info, self.password.as_deref())?;

        let command = match method {
            AuthMethod::Null => {
                debug!("Authenticating without credentials");
                "AUTHENTICATE".to_string()
            }
            AuthMethod::Password(password) => {
                debug!("Authenticating with control password");
                format!("AUTHENTICATE {}", quote(&password))
            }
            AuthMethod::Cookie(path) => {
                debug!("Authenticating with cookie {}", path.display());
                let cookie = tokio::fs::read(&path)
                    .await
                    .map_err(|source| ControlError::Cookie {
                        path: path.clone(),
                        source,
                    })?;
                format!("AUTHENTICATE {}", hex::encode_upper(cookie))
            }
        };

        self.command(&command).await?;
        Ok(())
    }

    async fn signal(&mut self, signal: Signal) -> Result<(), ControlError> {
        self.command(&format!("SIGNAL {}", signal.as_str())).await?;
        debug!("Signal {} accepted", signal.as_str());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ControlError> {
        if self.closed {
            return Ok(());
        }

        // Tor answers QUIT with "250 closing connection"; a dead or silent socket is fine too.
        if let Err(e) = self.send("QUIT").await {
            debug!("QUIT not acknowledged: {}", e);
        }
        self.closed = true;
        if let Err(e) = self.writer.shutdown().await {
            debug!("Control socket shutdown: {}", e);
        }
        Ok(())
    }
}

impl Drop for TorController {
    fn drop(&mut self) {
        if !self.closed {
            warn!("Control session dropped without close");
        }
    }
}

fn split_reply_line(line: &str) -> Result<(u16, char, &str), ControlError> {
    let malformed = || ControlError::Malformed(line.to_string());

    let code = line
        .get(..3)
        .and_then(|c| c.parse::<u16>().ok())
        .ok_or_else(malformed)?;
    let separator = line.get(3..4).and_then(|s| s.chars().next()).ok_or_else(malformed)?;
    let text = line.get(4..).unwrap_or_default();

    Ok((code, separator, text))
}

/// Pull `METHODS=` and `COOKIEFILE=` out of a PROTOCOLINFO reply
fn parse_protocol_info(lines: &[String]) -> AuthInfo {
    let mut info = AuthInfo::default();

    for line in lines {
        let Some(rest) = line.strip_prefix("AUTH ") else {
            continue;
        };

        if let Some(methods) = rest.strip_prefix("METHODS=") {
            let methods = methods.split_whitespace().next().unwrap_or_default();
            info.methods = methods
                .split(',')
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(idx) = rest.find("COOKIEFILE=\"") {
            let quoted = &rest[idx + "COOKIEFILE=\"".len()..];
            info.cookie_file = Some(PathBuf::from(unquote(quoted)));
        }
    }

    info
}

fn choose_auth_method(info: &AuthInfo, password: Option<&str>) -> Result<AuthMethod, ControlError> {
    if info.offers("NULL") {
        return Ok(AuthMethod::Null);
    }
    if let (true, Some(password)) = (info.offers("HASHEDPASSWORD"), password) {
        return Ok(AuthMethod::Password(password.to_string()));
    }
    if let (true, Some(path)) = (info.offers("COOKIE"), &info.cookie_file) {
        return Ok(AuthMethod::Cookie(path.clone()));
    }
    Err(ControlError::NoUsableAuthMethod(info.methods.join(",")))
}

/// Read a quoted string body up to the closing quote, resolving escapes
fn unquote(s: &str) -> String {
    let mut out = String::new();
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => break,
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

fn quote(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}
