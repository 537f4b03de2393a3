//! Minimal STOMP 1.2 frame codec for text WebSocket messages.

use std::{fmt, str::FromStr};

use thiserror::Error;

/// Errors raised while decoding a STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StompError {
    /// The frame has no command line.
    #[error("frame has no command")]
    MissingCommand,
    /// The command line is not a STOMP command.
    #[error("unknown STOMP command `{0}`")]
    UnknownCommand(String),
    /// A header line has no `:` separator.
    #[error("malformed header line `{0}`")]
    MalformedHeader(String),
    /// A header value uses an escape sequence STOMP does not define.
    #[error("invalid escape sequence in header `{0}`")]
    InvalidEscape(String),
}

/// STOMP commands used by the session protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StompCommand {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl StompCommand {
    fn as_str(self) -> &'static str {
        match self {
            StompCommand::Connect => "CONNECT",
            StompCommand::Stomp => "STOMP",
            StompCommand::Connected => "CONNECTED",
            StompCommand::Send => "SEND",
            StompCommand::Subscribe => "SUBSCRIBE",
            StompCommand::Unsubscribe => "UNSUBSCRIBE",
            StompCommand::Disconnect => "DISCONNECT",
            StompCommand::Message => "MESSAGE",
            StompCommand::Receipt => "RECEIPT",
            StompCommand::Error => "ERROR",
        }
    }

    /// CONNECT and CONNECTED frames carry raw header values.
    fn escapes_headers(self) -> bool {
        !matches!(self, StompCommand::Connect | StompCommand::Connected)
    }
}

impl fmt::Display for StompCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StompCommand {
    type Err = StompError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "CONNECT" => StompCommand::Connect,
            "STOMP" => StompCommand::Stomp,
            "CONNECTED" => StompCommand::Connected,
            "SEND" => StompCommand::Send,
            "SUBSCRIBE" => StompCommand::Subscribe,
            "UNSUBSCRIBE" => StompCommand::Unsubscribe,
            "DISCONNECT" => StompCommand::Disconnect,
            "MESSAGE" => StompCommand::Message,
            "RECEIPT" => StompCommand::Receipt,
            "ERROR" => StompCommand::Error,
            other => return Err(StompError::UnknownCommand(other.to_string())),
        })
    }
}

/// One STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    pub command: StompCommand,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl StompFrame {
    /// Frame without headers or body.
    pub fn new(command: StompCommand) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Append a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body.
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// CONNECT frame for STOMP 1.2 with the given heart-beat interval in milliseconds.
    pub fn connect(host: &str, heartbeat_ms: u64) -> Self {
        StompFrame::new(StompCommand::Connect)
            .header("accept-version", "1.2,1.1")
            .header("host", host)
            .header("heart-beat", format!("{heartbeat_ms},{heartbeat_ms}"))
    }

    /// SUBSCRIBE frame.
    pub fn subscribe(id: &str, destination: &str) -> Self {
        StompFrame::new(StompCommand::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    /// UNSUBSCRIBE frame.
    pub fn unsubscribe(id: &str) -> Self {
        StompFrame::new(StompCommand::Unsubscribe).header("id", id)
    }

    /// SEND frame carrying a JSON body.
    pub fn send_json(destination: &str, body: String) -> Self {
        StompFrame::new(StompCommand::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .body(body)
    }

    /// First value of header `name`; STOMP says repeated headers keep the first.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Serialise to the wire format, NUL terminator included.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

/// Decode every frame in one WebSocket text message.
///
/// Heart-beats (bare end-of-line characters) produce no frame.
pub fn decode_frames(text: &str) -> Result<Vec<StompFrame>, StompError> {
    text.split('\0')
        .map(|chunk| chunk.trim_start_matches(['\r', '\n']))
        .filter(|chunk| !chunk.is_empty())
        .map(decode_frame)
        .collect()
}

fn decode_frame(chunk: &str) -> Result<StompFrame, StompError> {
    let (head, body) = match chunk.find("\n\n") {
        Some(index) => (&chunk[..index], &chunk[index + 2..]),
        None => match chunk.find("\r\n\r\n") {
            Some(index) => (&chunk[..index], &chunk[index + 4..]),
            None => (chunk, ""),
        },
    };

    let mut lines = head.lines();
    let command_line = lines
        .next()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .ok_or(StompError::MissingCommand)?;
    let command: StompCommand = command_line.parse()?;
    let escape = command.escapes_headers();

    let mut headers = Vec::new();
    for line in lines {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| StompError::MalformedHeader(line.to_string()))?;
        if escape {
            headers.push((unescape_header(name)?, unescape_header(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    Ok(StompFrame {
        command,
        headers,
        body: body.to_string(),
    })
}

fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(value: &str) -> Result<String, StompError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(StompError::InvalidEscape(value.to_string())),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_send_frame_with_nul_terminator() {
        let frame = StompFrame::send_json("/app/session/ABC/join", r#"{"a":1}"#.into());
        assert_eq!(
            frame.encode(),
            "SEND\ndestination:/app/session/ABC/join\ncontent-type:application/json\n\n{\"a\":1}\0"
        );
    }

    #[test]
    fn decodes_message_frame() {
        let text = "MESSAGE\nsubscription:sub-0\ndestination:/topic/x\nmessage-id:1\n\n{\"data\":[]}\0";
        let frames = decode_frames(text).unwrap();
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.command, StompCommand::Message);
        assert_eq!(frame.header_value("subscription"), Some("sub-0"));
        assert_eq!(frame.body, "{\"data\":[]}");
    }

    #[test]
    fn heartbeats_produce_no_frames() {
        assert!(decode_frames("\n").unwrap().is_empty());
        assert!(decode_frames("\r\n\r\n").unwrap().is_empty());
    }

    #[test]
    fn header_escapes_survive_encoding() {
        let frame = StompFrame::new(StompCommand::Send).header("note", "a:b\nc\\d");
        let decoded = decode_frames(&frame.encode()).unwrap();
        assert_eq!(decoded[0].header_value("note"), Some("a:b\nc\\d"));
    }

    #[test]
    fn connected_frame_headers_are_not_unescaped() {
        let frames = decode_frames("CONNECTED\nversion:1.2\nserver:x\\y\n\n\0").unwrap();
        assert_eq!(frames[0].header_value("server"), Some("x\\y"));
    }

    #[test]
    fn first_repeated_header_wins() {
        let frames = decode_frames("MESSAGE\nfoo:1\nfoo:2\n\n\0").unwrap();
        assert_eq!(frames[0].header_value("foo"), Some("1"));
    }

    #[test]
    fn rejects_unknown_command_and_bad_headers() {
        assert_eq!(
            decode_frames("HELLO\n\n\0"),
            Err(StompError::UnknownCommand("HELLO".into()))
        );
        assert!(matches!(
            decode_frames("MESSAGE\nno-separator\n\n\0"),
            Err(StompError::MalformedHeader(_))
        ));
    }
}
