use std::fmt::{self, Display, Debug, Formatter, Write as _};
use std::num::NonZeroU32;
use std::convert::TryInto;

use bytes::{Bytes, BytesMut, Buf};

use crate::gateway::common::{Error, Result, unsplit_bytes};
use crate::gateway::protocol::tag::Tag;
use crate::gateway::protocol::reader::MessageReader;
use crate::gateway::protocol::builder::MessageErrorBuilder;
use crate::gateway::protocol::ErrorSeverity;

pub const MIN_MESSAGE_LEN: u32 = 5;

/// The 1-byte tag + 4-byte big-endian length word that begins every message
/// except the very first one on a connection (the untagged startup packet).
pub struct Header {
    pub tag: Tag,
    pub length: NonZeroU32,
}

impl Header {
    pub fn parse(bytes: &[u8]) -> Result<Option<Header>> {
        if (bytes.len() as u32) < MIN_MESSAGE_LEN {
            return Ok(None);
        }
        let tag = Tag::new(bytes[0])?;
        let len = u32::from_be_bytes(bytes[1..5].try_into().unwrap());
        Ok(Some(Header {
            tag,
            length: NonZeroU32::new(len)
                .ok_or_else(|| Error::protocol_error("message length cannot be 0"))?,
        }))
    }

    /// Total size of the frame in bytes, including the tag byte (length
    /// itself does not count the tag, matching the wire protocol).
    pub fn frame_len(&self) -> u32 {
        self.length.get() + 1
    }
}

/// A single framed protocol message, borrowed from a `Messages` buffer.
pub struct Message<'a> {
    data: &'a [u8], // the full frame: tag + length + body
    start: usize,   // offset of this frame within the owning Messages buffer
}

impl<'a> Message<'a> {
    pub(crate) fn new(data: &'a [u8], start: usize) -> Self {
        Message { data, start }
    }

    pub fn tag(&self) -> Tag {
        Tag::new_unchecked(self.data[0])
    }

    /// Length of this message's frame in bytes, including the tag byte.
    pub fn len(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Offset within the frame where the body starts (just past tag + length word).
    pub fn body_start(&self) -> u32 {
        if self.data[0] == Tag::UNTAGGED.as_u8() { 4 } else { 5 }
    }

    pub fn as_slice(&self) -> &'a [u8] {
        self.data
    }

    /// Offset of this message within the Messages buffer it was read from.
    pub fn offset(&self) -> usize {
        self.start
    }

    pub fn reader(&self) -> MessageReader<'a> {
        MessageReader::new(self.data)
    }
}

impl<'a> Display for Message<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}b)", self.tag(), self.len())
    }
}

impl<'a> Debug for Message<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// One or more complete protocol messages, back to back in a single `Bytes`
/// buffer. Cloning is zero-copy (reference counted).
#[derive(Clone)]
pub struct Messages(Bytes);

impl Messages {
    pub fn new(buf: Bytes) -> Self {
        Messages(buf)
    }

    pub fn new_error(code: &str, msg: &str) -> Self {
        MessageErrorBuilder::new(ErrorSeverity::Error, code, msg).finish()
    }

    pub fn new_warning(code: &str, msg: &str) -> Self {
        MessageErrorBuilder::new(ErrorSeverity::Warning, code, msg).finish()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> u32 {
        self.0.len() as u32
    }

    pub fn as_slice(&self) -> &[u8] {
        self.0.chunk()
    }

    pub fn bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn count(&self) -> usize {
        let mut count = 0;
        let mut pos = 0usize;
        while pos < self.0.len() {
            match Header::parse(&self.0[pos..]) {
                Ok(Some(hdr)) => {
                    count += 1;
                    pos += hdr.frame_len() as usize;
                }
                _ => break,
            }
        }
        count
    }

    pub fn iter(&self) -> MessageIter {
        MessageIter { data: &self.0, pos: 0 }
    }

    pub fn first(&self) -> Option<Message> {
        self.iter().next()
    }

    pub fn split_to(&mut self, offset: usize) -> Self {
        Self::new(self.0.split_to(offset))
    }

    /// Merges `other` into `self` if they came from the same underlying
    /// allocation and are contiguous. See `unsplit_bytes` for the safety
    /// requirement this relies on.
    pub unsafe fn unsplit(self, other: Self) -> (Option<Self>, Option<Self>) {
        let (a, b) = unsplit_bytes(self.0, other.0);
        (a.map(Self::new), b.map(Self::new))
    }
}

impl Default for Messages {
    fn default() -> Self {
        Self(Bytes::new())
    }
}

impl Display for Messages {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("Messages{")?;
        for (i, msg) in self.iter().enumerate() {
            if i != 0 {
                f.write_str(", ")?;
            }
            Display::fmt(&msg, f)?;
        }
        f.write_char('}')
    }
}

impl Debug for Messages {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

pub struct MessageIter<'a> {
    data: &'a Bytes,
    pos: usize,
}

impl<'a> Iterator for MessageIter<'a> {
    type Item = Message<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len() {
            return None;
        }
        let slice = &self.data.chunk()[self.pos..];
        match Header::parse(slice) {
            Ok(Some(hdr)) => {
                let start = self.pos;
                let end = hdr.frame_len() as usize;
                self.pos += end;
                Some(Message::new(&slice[..end], start))
            }
            _ => None,
        }
    }
}

/// Accumulates bytes read off a socket and splits off the longest available
/// prefix of complete frames, leaving any trailing partial frame buffered
/// for the next read. One `Messages` batch can (and usually does) contain
/// several frontend messages sent back to back by a pipelining client.
pub struct FrameReader {
    data: BytesMut,
}

impl FrameReader {
    pub fn new(capacity: usize) -> Self {
        Self { data: BytesMut::with_capacity(capacity) }
    }

    pub fn bytes_mut(&mut self) -> &mut BytesMut {
        &mut self.data
    }

    /// Returns the next batch of complete messages, or None if the buffer
    /// doesn't yet contain one full frame. Grows the buffer's reserved
    /// capacity to fit the next message if we can tell how large it'll be.
    pub fn next_batch(&mut self, max_frame_size: u32) -> Option<Result<Messages>> {
        let mut pos = 0usize;
        loop {
            match Header::parse(&self.data[pos..]) {
                Err(e) => return Some(Err(e)),
                Ok(None) => break,
                Ok(Some(hdr)) => {
                    if hdr.frame_len() > max_frame_size {
                        return Some(Err(Error::protocol_error(format!(
                            "message of {} bytes exceeds max_frame_size {}",
                            hdr.frame_len(),
                            max_frame_size
                        ))));
                    }
                    let frame_len = hdr.frame_len() as usize;
                    if pos + frame_len > self.data.len() {
                        self.data.reserve((pos + frame_len) - self.data.len());
                        break;
                    }
                    pos += frame_len;
                }
            }
        }
        if pos == 0 {
            None
        } else {
            Some(Ok(Messages::new(self.data.split_to(pos).freeze())))
        }
    }
}
