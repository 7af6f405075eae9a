use std::fmt::{Display, Formatter, Debug};

use crate::gateway::common::{Error, Result};

/// Special values sent in place of a protocol version during startup.
pub const PROTOCOL_VERSION_3_0: i32 = 196608; // 3.0 << 16
pub const SSL_REQUEST_CODE: i32 = 80877103;
pub const GSSENC_REQUEST_CODE: i32 = 80877104;
pub const CANCEL_REQUEST_CODE: i32 = 80877102;

pub const SSL_ALLOWED: u8 = b'S';
pub const SSL_NOT_ALLOWED: u8 = b'N';

/// A Postgres wire protocol message type tag byte.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Tag(u8);

impl Tag {
    pub const UNTAGGED: Tag = Tag(0);
    // Frontend
    pub const BIND: Tag = Tag::new_unchecked(b'B');
    pub const CLOSE: Tag = Tag::new_unchecked(b'C');
    pub const COPY_FAIL: Tag = Tag::new_unchecked(b'f');
    pub const DESCRIBE: Tag = Tag::new_unchecked(b'D');
    pub const EXECUTE: Tag = Tag::new_unchecked(b'E');
    pub const FLUSH: Tag = Tag::new_unchecked(b'H');
    pub const FUNCTION_CALL: Tag = Tag::new_unchecked(b'F');
    pub const PARSE: Tag = Tag::new_unchecked(b'P');
    pub const PASSWORD_MESSAGE: Tag = Tag::new_unchecked(b'p'); // also SASL response
    pub const QUERY: Tag = Tag::new_unchecked(b'Q');
    pub const SYNC: Tag = Tag::new_unchecked(b'S');
    pub const TERMINATE: Tag = Tag::new_unchecked(b'X');
    // Frontend + Backend
    pub const COPY_DATA: Tag = Tag::new_unchecked(b'd');
    pub const COPY_DONE: Tag = Tag::new_unchecked(b'c');
    // Backend
    pub const AUTHENTICATION: Tag = Tag::new_unchecked(b'R');
    pub const BACKEND_KEY_DATA: Tag = Tag::new_unchecked(b'K');
    pub const BIND_COMPLETE: Tag = Tag::new_unchecked(b'2');
    pub const CLOSE_COMPLETE: Tag = Tag::new_unchecked(b'3');
    pub const COMMAND_COMPLETE: Tag = Tag::new_unchecked(b'C');
    pub const COPY_IN_RESPONSE: Tag = Tag::new_unchecked(b'G');
    pub const COPY_OUT_RESPONSE: Tag = Tag::new_unchecked(b'H');
    pub const COPY_BOTH_RESPONSE: Tag = Tag::new_unchecked(b'W');
    pub const DATA_ROW: Tag = Tag::new_unchecked(b'D');
    pub const EMPTY_QUERY: Tag = Tag::new_unchecked(b'I');
    pub const FUNCTION_CALL_RESPONSE: Tag = Tag::new_unchecked(b'V');
    pub const NEGOTIATE_PROTOCOL_VERSION: Tag = Tag::new_unchecked(b'v');
    pub const NO_DATA: Tag = Tag::new_unchecked(b'n');
    pub const PARAMETER_DESCRIPTION: Tag = Tag::new_unchecked(b't');
    pub const PARSE_COMPLETE: Tag = Tag::new_unchecked(b'1');
    pub const PORTAL_SUSPENDED: Tag = Tag::new_unchecked(b's');
    pub const READY_FOR_QUERY: Tag = Tag::new_unchecked(b'Z');
    pub const ROW_DESCRIPTION: Tag = Tag::new_unchecked(b'T');
    pub const ERROR_RESPONSE: Tag = Tag::new_unchecked(b'E');
    pub const PARAMETER_STATUS: Tag = Tag::new_unchecked(b'S');
    pub const NOTICE_RESPONSE: Tag = Tag::new_unchecked(b'N');
    pub const NOTIFICATION_RESPONSE: Tag = Tag::new_unchecked(b'A');

    pub fn new(b: u8) -> Result<Self> {
        match b {
            b'B' | b'C' | b'f' | b'D' | b'E' | b'H' | b'F' | b'P' | b'p' | b'Q' | b'S' | b'X' |
            b'd' | b'c' | b'R' | b'K' | b'2' | b'3' | b'G' | b'W' | b'I' | b'V' | b'v' | b'n' |
            b't' | b'1' | b's' | b'Z' | b'T' | b'N' | b'A' => Ok(Tag(b)),
            _ => Err(Error::protocol_error(format!("unknown message tag '{}'", b as char))),
        }
    }

    pub const fn new_unchecked(b: u8) -> Self {
        Tag(b)
    }

    pub fn as_u8(&self) -> u8 {
        self.0
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self.0 {
            0 => "Untagged",
            b'B' => "Bind",
            b'C' => "Close/CommandComplete",
            b'f' => "CopyFail",
            b'D' => "Describe/DataRow",
            b'E' => "Execute/ErrorResponse",
            b'H' => "Flush/CopyOutResponse",
            b'F' => "FunctionCall",
            b'P' => "Parse",
            b'p' => "PasswordMessage",
            b'Q' => "Query",
            b'S' => "Sync/ParameterStatus",
            b'X' => "Terminate",
            b'd' => "CopyData",
            b'c' => "CopyDone",
            b'R' => "Authentication",
            b'K' => "BackendKeyData",
            b'2' => "BindComplete",
            b'3' => "CloseComplete",
            b'G' => "CopyInResponse",
            b'W' => "CopyBothResponse",
            b'I' => "EmptyQueryResponse",
            b'V' => "FunctionCallResponse",
            b'v' => "NegotiateProtocolVersion",
            b'n' => "NoData",
            b't' => "ParameterDescription",
            b'1' => "ParseComplete",
            b's' => "PortalSuspended",
            b'Z' => "ReadyForQuery",
            b'T' => "RowDescription",
            b'N' => "NoticeResponse",
            b'A' => "NotificationResponse",
            _ => return write!(f, "Unknown('{}')", self.0 as char),
        };
        f.write_str(name)
    }
}

impl Debug for Tag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}
