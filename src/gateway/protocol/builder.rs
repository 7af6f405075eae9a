use std::fmt;
use std::fmt::{Display, Formatter};

use bytes::{BytesMut, BufMut};
use strum::EnumString;

use crate::gateway::common::Error;
use crate::gateway::protocol::tag::Tag;
use crate::gateway::protocol::message::{Messages, MIN_MESSAGE_LEN};

#[derive(EnumString, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Debug)]
#[strum(serialize_all = "UPPERCASE")]
#[repr(u8)]
pub enum ErrorSeverity {
    Log,
    Info,
    Debug,
    Notice,
    Warning,
    Error,
    Fatal,
    Panic,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match *self {
            ErrorSeverity::Panic => "PANIC",
            ErrorSeverity::Fatal => "FATAL",
            ErrorSeverity::Error => "ERROR",
            ErrorSeverity::Warning => "WARNING",
            ErrorSeverity::Notice => "NOTICE",
            ErrorSeverity::Debug => "DEBUG",
            ErrorSeverity::Info => "INFO",
            ErrorSeverity::Log => "LOG",
        }
    }
}

impl Display for ErrorSeverity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for ErrorSeverity {
    fn default() -> Self {
        ErrorSeverity::Error
    }
}

/// Single-byte field identifiers used inside ErrorResponse/NoticeResponse bodies.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct ErrorFieldTag(u8);

impl ErrorFieldTag {
    pub const NULL_TERMINATOR: ErrorFieldTag = ErrorFieldTag(0);
    pub const SEVERITY: ErrorFieldTag = ErrorFieldTag(b'S');
    pub const SEVERITY_NONLOCALIZED: ErrorFieldTag = ErrorFieldTag(b'V');
    pub const CODE: ErrorFieldTag = ErrorFieldTag(b'C');
    pub const MESSAGE: ErrorFieldTag = ErrorFieldTag(b'M');
    pub const DETAIL: ErrorFieldTag = ErrorFieldTag(b'D');
    pub const HINT: ErrorFieldTag = ErrorFieldTag(b'H');
    pub const POSITION: ErrorFieldTag = ErrorFieldTag(b'P');
    pub const WHERE: ErrorFieldTag = ErrorFieldTag(b'W');
    pub const SCHEMA_NAME: ErrorFieldTag = ErrorFieldTag(b's');
    pub const TABLE_NAME: ErrorFieldTag = ErrorFieldTag(b't');
    pub const COLUMN_NAME: ErrorFieldTag = ErrorFieldTag(b'c');
    pub const ROUTINE: ErrorFieldTag = ErrorFieldTag(b'R');

    pub fn as_u8(&self) -> u8 {
        self.0
    }
}

/// Builds a single Postgres wire protocol message. Call `add_new` to start a
/// further message in the same buffer (back-patches the previous message's
/// length word), and `finish` to freeze and take ownership of the buffer.
pub struct MessageBuilder {
    data: BytesMut,
    start: usize,
}

impl MessageBuilder {
    pub fn new(tag: Tag) -> Self {
        let mut builder = MessageBuilder { data: BytesMut::with_capacity(256), start: 0 };
        builder.add_new(tag);
        builder
    }

    pub fn bytes_mut(&mut self) -> &mut BytesMut {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn finish(mut self) -> Messages {
        self.complete_message();
        Messages::new(std::mem::take(&mut self.data).freeze())
    }

    pub fn add_new(&mut self, tag: Tag) {
        let len = self.len();
        if len != 0 {
            self.complete_message();
            self.start = len;
        }
        if tag != Tag::UNTAGGED {
            self.data.put_u8(tag.as_u8());
        }
        self.data.put_i32(0);
    }

    fn complete_message(&mut self) {
        let len = self.len();
        assert!(len - self.start >= MIN_MESSAGE_LEN as usize, "message too short");
        let tagged = self.data[self.start] != Tag::UNTAGGED.as_u8();
        let len_pos = if tagged { self.start + 1 } else { self.start };
        let body_len = if tagged { len - self.start - 1 } else { len - self.start };
        unsafe {
            (&mut bytes_to_slice_mut_init(&mut self.data)[len_pos..len_pos + 4])
                .copy_from_slice(&(body_len as i32).to_be_bytes());
        }
    }

    pub fn write_byte(&mut self, b: u8) {
        self.data.put_u8(b);
    }

    pub fn write_str(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
        self.write_byte(0);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn write_i16(&mut self, i: i16) {
        self.data.put_i16(i);
    }

    pub fn write_i32(&mut self, i: i32) {
        self.data.put_i32(i);
    }

    pub fn write_params<'a, I: IntoIterator<Item = (&'a str, &'a str)>>(&mut self, params: I) {
        for (k, v) in params {
            self.write_str(k);
            self.write_str(v);
        }
    }
}

/// Safe because the bytes we overwrite here were already initialized by
/// earlier `put_*` calls on the same buffer.
unsafe fn bytes_to_slice_mut_init(buf: &mut BytesMut) -> &mut [u8] {
    std::slice::from_raw_parts_mut(buf.as_mut_ptr(), buf.len())
}

/// Builds an ErrorResponse (or NoticeResponse, for Warning and below) message.
pub struct MessageErrorBuilder(MessageBuilder);

impl MessageErrorBuilder {
    pub fn new(severity: ErrorSeverity, code: &str, msg: &str) -> Self {
        let tag = if severity <= ErrorSeverity::Warning { Tag::NOTICE_RESPONSE } else { Tag::ERROR_RESPONSE };
        let mut builder = MessageErrorBuilder(MessageBuilder::new(tag));
        builder
            .write_field(ErrorFieldTag::SEVERITY, severity.as_str())
            .write_field(ErrorFieldTag::SEVERITY_NONLOCALIZED, severity.as_str())
            .write_field(ErrorFieldTag::CODE, code)
            .write_field(ErrorFieldTag::MESSAGE, msg);
        builder
    }

    pub fn write_field(&mut self, field: ErrorFieldTag, s: &str) -> &mut Self {
        self.0.write_byte(field.as_u8());
        self.0.write_str(s);
        self
    }

    pub fn finish(mut self) -> Messages {
        self.0.write_byte(ErrorFieldTag::NULL_TERMINATOR.as_u8());
        self.0.finish()
    }
}

pub fn protocol_error_to_messages(err: &Error) -> Messages {
    MessageErrorBuilder::new(ErrorSeverity::Error, err.sqlstate(), &err.to_string()).finish()
}
