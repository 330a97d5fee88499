//! Fixed-size message record exchanged with clients.
//!
//! Layout (360 bytes): little-endian `i32` origin id, then `command` (50),
//! `username` (50) and `payload` (256), each NUL-padded UTF-8.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::DispatchError;
use crate::util::types::ClientPid;

/// Bytes reserved for the command tag.
pub const COMMAND_LEN: usize = 50;
/// Bytes reserved for the username.
pub const USERNAME_LEN: usize = 50;
/// Bytes reserved for the free-text payload.
pub const PAYLOAD_LEN: usize = 256;
/// Total encoded size of one record.
pub const RECORD_LEN: usize = 4 + COMMAND_LEN + USERNAME_LEN + PAYLOAD_LEN;

/// Commands a client may send to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientCommand {
    /// Open a session.
    Login,
    /// Request a service (`<hour> <place> <km>`).
    Schedule,
    /// List own pending and running services.
    Query,
    /// Cancel a service by id (`0` = all own services).
    Cancel,
    /// Answer a renegotiation offer (`<id> <y|n>`).
    Decision,
    /// Close the session.
    Logout,
}

impl ClientCommand {
    /// Wire tag.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Schedule => "agendar",
            Self::Query => "consultar",
            Self::Cancel => "cancelar",
            Self::Decision => "decisao",
            Self::Logout => "terminar",
        }
    }

    /// Parse a wire tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "login" => Self::Login,
            "agendar" => Self::Schedule,
            "consultar" => Self::Query,
            "cancelar" => Self::Cancel,
            "decisao" => Self::Decision,
            "terminar" => Self::Logout,
            _ => return None,
        })
    }
}

/// Message kinds the controller (or a worker) sends to a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyKind {
    /// Login accepted.
    LoginOk,
    /// Request failed; payload explains why.
    Error,
    /// Session closed; the client should terminate.
    ExitOk,
    /// Vehicle status notice from a worker.
    Status,
    /// General information.
    Info,
    /// One item of a query result.
    Answer,
    /// A pending service was cancelled.
    Cancelled,
    /// Trip ended (completed or preempted).
    TripEnd,
}

impl ReplyKind {
    /// Wire tag.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::LoginOk => "login_ok",
            Self::Error => "erro",
            Self::ExitOk => "exit_ok",
            Self::Status => "status",
            Self::Info => "info",
            Self::Answer => "resposta",
            Self::Cancelled => "cancelar",
            Self::TripEnd => "fim",
        }
    }
}

/// One record on a client channel, in either direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Sender process id (client pid, or the controller's own pid on replies).
    pub origin_id: ClientPid,
    /// Command or reply tag.
    pub command: String,
    /// Sender's login name; empty on replies.
    pub username: String,
    /// Free text.
    pub payload: String,
}

impl Message {
    /// Build a client request.
    #[must_use]
    pub fn request(
        origin_id: ClientPid,
        command: ClientCommand,
        username: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            origin_id,
            command: command.tag().to_string(),
            username: username.into(),
            payload: payload.into(),
        }
    }

    /// Build a controller-to-client message.
    #[must_use]
    pub fn reply(kind: ReplyKind, payload: impl Into<String>) -> Self {
        Self {
            origin_id: controller_pid(),
            command: kind.tag().to_string(),
            username: String::new(),
            payload: payload.into(),
        }
    }

    /// Build an `erro` reply from an error.
    #[must_use]
    pub fn error(err: &DispatchError) -> Self {
        Self::reply(ReplyKind::Error, err.to_string())
    }

    /// Whether this message carries the given reply kind.
    #[must_use]
    pub fn is(&self, kind: ReplyKind) -> bool {
        self.command == kind.tag()
    }

    /// Encode into a fixed-size record, truncating over-long fields.
    #[must_use]
    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut record = [0_u8; RECORD_LEN];
        record[..4].copy_from_slice(&self.origin_id.to_le_bytes());
        let mut offset = 4;
        for (field, len) in [
            (&self.command, COMMAND_LEN),
            (&self.username, USERNAME_LEN),
            (&self.payload, PAYLOAD_LEN),
        ] {
            let bytes = truncate_utf8(field, len - 1).as_bytes();
            record[offset..offset + bytes.len()].copy_from_slice(bytes);
            offset += len;
        }
        record
    }

    /// Decode a record produced by [`encode`](Self::encode).
    ///
    /// # Errors
    ///
    /// Returns `SyntaxError` if `bytes` is shorter than [`RECORD_LEN`].
    pub fn decode(bytes: &[u8]) -> Result<Self, DispatchError> {
        if bytes.len() < RECORD_LEN {
            return Err(DispatchError::SyntaxError(format!(
                "short record: {} of {RECORD_LEN} bytes",
                bytes.len()
            )));
        }
        let mut pid = [0_u8; 4];
        pid.copy_from_slice(&bytes[..4]);
        let command_end = 4 + COMMAND_LEN;
        let username_end = command_end + USERNAME_LEN;
        Ok(Self {
            origin_id: i32::from_le_bytes(pid),
            command: read_field(&bytes[4..command_end]),
            username: read_field(&bytes[command_end..username_end]),
            payload: read_field(&bytes[username_end..RECORD_LEN]),
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.command, self.payload)
    }
}

fn controller_pid() -> ClientPid {
    ClientPid::try_from(std::process::id()).unwrap_or(ClientPid::MAX)
}

fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn read_field(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_layout() {
        let msg = Message::request(4242, ClientCommand::Schedule, "ana", "10 porto 3");
        let record = msg.encode();
        assert_eq!(record.len(), 360);
        assert_eq!(&record[..4], &4242_i32.to_le_bytes());
        assert_eq!(&record[4..11], b"agendar");
        assert_eq!(record[11], 0);
        assert_eq!(&record[54..57], b"ana");
        assert_eq!(&record[104..114], b"10 porto 3");

        assert_eq!(Message::decode(&record).unwrap(), msg);
    }

    #[test]
    fn test_overlong_payload_truncated_on_char_boundary() {
        let long = "é".repeat(200);
        let msg = Message::request(1, ClientCommand::Query, "ana", long);
        let decoded = Message::decode(&msg.encode()).unwrap();
        assert_eq!(decoded.payload.len(), 254);
        assert!(decoded.payload.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_short_record_rejected() {
        let err = Message::decode(&[0_u8; 12]).unwrap_err();
        assert!(matches!(err, DispatchError::SyntaxError(_)));
    }

    #[test]
    fn test_command_tags() {
        for cmd in [
            ClientCommand::Login,
            ClientCommand::Schedule,
            ClientCommand::Query,
            ClientCommand::Cancel,
            ClientCommand::Decision,
            ClientCommand::Logout,
        ] {
            assert_eq!(ClientCommand::from_tag(cmd.tag()), Some(cmd));
        }
        assert_eq!(ClientCommand::from_tag("voar"), None);
        assert_eq!(ReplyKind::Answer.tag(), "resposta");
    }
}
