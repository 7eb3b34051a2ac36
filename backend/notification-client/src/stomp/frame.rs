use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StompError {
    #[error("empty frame")]
    Empty,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("malformed header line: {0}")]
    MalformedHeader(String),
    #[error("invalid escape sequence in header: {0}")]
    InvalidEscape(String),
    #[error("missing end of headers")]
    UnterminatedHeaders,
    #[error("invalid content-length: {0}")]
    InvalidContentLength(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Disconnect => "DISCONNECT",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    /// CONNECT and CONNECTED headers are never escaped
    fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl FromStr for Command {
    type Err = StompError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            // STOMP is accepted as an alias of CONNECT
            "CONNECT" | "STOMP" => Ok(Command::Connect),
            "CONNECTED" => Ok(Command::Connected),
            "SEND" => Ok(Command::Send),
            "SUBSCRIBE" => Ok(Command::Subscribe),
            "UNSUBSCRIBE" => Ok(Command::Unsubscribe),
            "DISCONNECT" => Ok(Command::Disconnect),
            "MESSAGE" => Ok(Command::Message),
            "RECEIPT" => Ok(Command::Receipt),
            "ERROR" => Ok(Command::Error),
            other => Err(StompError::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame
///
/// Headers keep their wire order; on repeated keys the first one wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Result of decoding one WebSocket payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOrHeartbeat {
    Frame(Frame),
    Heartbeat,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// CONNECT frame for the given virtual host
    pub fn connect(host: &str, authorization: Option<&str>) -> Self {
        let mut frame = Frame::new(Command::Connect)
            .header("accept-version", "1.2,1.1")
            .header("host", host)
            .header("heart-beat", "0,0");
        if let Some(token) = authorization {
            frame = frame.header("Authorization", format!("Bearer {token}"));
        }
        frame
    }

    pub fn subscribe(id: &str, destination: &str, receipt: &str) -> Self {
        Frame::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
            .header("receipt", receipt)
    }

    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(Command::Unsubscribe).header("id", id)
    }

    pub fn disconnect() -> Self {
        Frame::new(Command::Disconnect)
    }

    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (key, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(key));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(key);
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

    pub fn decode(input: &str) -> Result<FrameOrHeartbeat, StompError> {
        let trimmed = input.trim_start_matches(['\r', '\n']);
        if trimmed.is_empty() || trimmed == "\0" {
            return Ok(FrameOrHeartbeat::Heartbeat);
        }

        let (command_line, rest) = split_line(trimmed).ok_or(StompError::UnterminatedHeaders)?;
        if command_line.is_empty() {
            return Err(StompError::Empty);
        }
        let command: Command = command_line.parse()?;
        let escape = command.escapes_headers();

        let mut headers = Vec::new();
        let mut remaining = rest;
        loop {
            let (line, next) = split_line(remaining).ok_or(StompError::UnterminatedHeaders)?;
            remaining = next;
            if line.is_empty() {
                break;
            }
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| StompError::MalformedHeader(line.to_string()))?;
            let (key, value) = if escape {
                (unescape_header(key)?, unescape_header(value)?)
            } else {
                (key.to_string(), value.to_string())
            };
            headers.push((key, value));
        }

        let content_length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .map(|(_, v)| {
                v.trim()
                    .parse::<usize>()
                    .map_err(|_| StompError::InvalidContentLength(v.clone()))
            })
            .transpose()?;

        let body = match content_length {
            Some(len) if len <= remaining.len() && remaining.is_char_boundary(len) => {
                remaining[..len].to_string()
            }
            Some(_) => return Err(StompError::InvalidContentLength(remaining.len().to_string())),
            None => match remaining.find('\0') {
                Some(end) => remaining[..end].to_string(),
                None => remaining.to_string(),
            },
        };

        Ok(FrameOrHeartbeat::Frame(Frame {
            command,
            headers,
            body,
        }))
    }
}

/// Split off one line, accepting both `\n` and `\r\n`
fn split_line(input: &str) -> Option<(&str, &str)> {
    let idx = input.find('\n')?;
    let line = input[..idx].strip_suffix('\r').unwrap_or(&input[..idx]);
    Some((line, &input[idx + 1..]))
}

fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
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
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
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

    fn decode_frame(input: &str) -> Frame {
        match Frame::decode(input).unwrap() {
            FrameOrHeartbeat::Frame(frame) => frame,
            FrameOrHeartbeat::Heartbeat => panic!("expected a frame"),
        }
    }

    #[test]
    fn test_decode_message_frame() {
        let raw = "MESSAGE\ndestination:/topic/notifications/7\nsubscription:sub-0\nmessage-id:1\n\n{\"id\":1}\0";
        let frame = decode_frame(raw);
        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.get_header("destination"), Some("/topic/notifications/7"));
        assert_eq!(frame.body, "{\"id\":1}");
    }

    #[test]
    fn test_heartbeat_payloads() {
        assert_eq!(Frame::decode("\n").unwrap(), FrameOrHeartbeat::Heartbeat);
        assert_eq!(Frame::decode("\r\n").unwrap(), FrameOrHeartbeat::Heartbeat);
        assert_eq!(Frame::decode("").unwrap(), FrameOrHeartbeat::Heartbeat);
    }

    #[test]
    fn test_leading_heartbeats_before_frame() {
        let frame = decode_frame("\n\nRECEIPT\nreceipt-id:r-1\n\n\0");
        assert_eq!(frame.command, Command::Receipt);
        assert_eq!(frame.get_header("receipt-id"), Some("r-1"));
    }

    #[test]
    fn test_crlf_line_endings() {
        let frame = decode_frame("CONNECTED\r\nversion:1.2\r\n\r\n\0");
        assert_eq!(frame.command, Command::Connected);
        assert_eq!(frame.get_header("version"), Some("1.2"));
    }

    #[test]
    fn test_header_escaping_round_trip() {
        let frame = Frame::new(Command::Send)
            .header("destination", "/queue/a:b")
            .header("note", "line1\nline2\\end")
            .body("hi");
        let encoded = frame.encode();
        assert!(encoded.contains("destination:/queue/a\\cb\n"));
        assert_eq!(decode_frame(&encoded), frame);
    }

    #[test]
    fn test_connect_headers_not_escaped() {
        let encoded = Frame::connect("hr.example.com", Some("abc:def")).encode();
        assert!(encoded.starts_with("CONNECT\n"));
        assert!(encoded.contains("Authorization:Bearer abc:def\n"));
        assert!(encoded.ends_with("\n\n\0"));
    }

    #[test]
    fn test_content_length_body() {
        let frame = decode_frame("MESSAGE\ncontent-length:5\n\nab\0cd\0");
        assert_eq!(frame.body, "ab\0cd");
    }

    #[test]
    fn test_content_length_past_end_rejected() {
        let result = Frame::decode("MESSAGE\ncontent-length:50\n\nshort\0");
        assert!(matches!(result, Err(StompError::InvalidContentLength(_))));
    }

    #[test]
    fn test_unknown_command_rejected() {
        let result = Frame::decode("HELLO\n\n\0");
        assert_eq!(result, Err(StompError::UnknownCommand("HELLO".to_string())));
    }

    #[test]
    fn test_missing_header_terminator_rejected() {
        assert_eq!(
            Frame::decode("MESSAGE\ndestination:/x"),
            Err(StompError::UnterminatedHeaders)
        );
    }

    #[test]
    fn test_malformed_header_rejected() {
        let result = Frame::decode("MESSAGE\nnocolon\n\n\0");
        assert!(matches!(result, Err(StompError::MalformedHeader(_))));
    }

    #[test]
    fn test_bad_escape_rejected() {
        let result = Frame::decode("MESSAGE\nkey:bad\\x\n\n\0");
        assert!(matches!(result, Err(StompError::InvalidEscape(_))));
    }

    #[test]
    fn test_first_repeated_header_wins() {
        let frame = decode_frame("MESSAGE\nfoo:1\nfoo:2\n\n\0");
        assert_eq!(frame.get_header("foo"), Some("1"));
    }
}
