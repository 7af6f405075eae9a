use std::convert::TryInto;

use crate::gateway::common::{Error, Result};

/// A cursor for reading the body of a Postgres wire protocol message
/// sequentially. Reads past the end don't panic — they set a sticky error
/// flag so callers can do several reads and check once at the end.
pub struct MessageReader<'a> {
    data: &'a [u8], // the full frame, including tag + length word
    pos: u32,
    read_past_end: bool,
}

impl<'a> MessageReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let pos = if data.get(0) == Some(&0) { 4 } else { 5 };
        MessageReader { data, pos: pos.min(data.len() as u32), read_past_end: false }
    }

    pub fn new_at(data: &'a [u8], pos: u32) -> Self {
        MessageReader { data, pos, read_past_end: false }
    }

    pub fn len(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn error(&self) -> Result<()> {
        if self.read_past_end {
            Err(Error::protocol_error("attempted to read past end of message"))
        } else {
            Ok(())
        }
    }

    pub fn has_error(&self) -> bool {
        self.read_past_end
    }

    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.pos as usize).copied()
    }

    pub fn read_byte(&mut self) -> u8 {
        let pos = self.pos;
        if pos + 1 > self.len() {
            self.read_past_end = true;
            return 0;
        }
        self.pos += 1;
        self.data[pos as usize]
    }

    pub fn read_i16(&mut self) -> i16 {
        let pos = self.pos;
        let new_pos = pos + 2;
        if new_pos > self.len() {
            self.read_past_end = true;
            return 0;
        }
        let bytes = &self.data[pos as usize..new_pos as usize];
        self.pos = new_pos;
        i16::from_be_bytes(bytes.try_into().unwrap())
    }

    pub fn read_i32(&mut self) -> i32 {
        let pos = self.pos;
        let new_pos = pos + 4;
        if new_pos > self.len() {
            self.read_past_end = true;
            return 0;
        }
        let bytes = &self.data[pos as usize..new_pos as usize];
        self.pos = new_pos;
        i32::from_be_bytes(bytes.try_into().unwrap())
    }

    pub fn read_str(&mut self) -> Result<&'a str> {
        let bytes = self.read_null_terminated_bytes()?;
        std::str::from_utf8(bytes).map_err(Error::from)
    }

    pub fn read_null_terminated_bytes(&mut self) -> Result<&'a [u8]> {
        let pos = self.pos as usize;
        let bytes = &self.data[pos..];
        if let Some(i) = memchr::memchr(0, bytes) {
            self.pos = pos as u32 + i as u32 + 1;
            Ok(&bytes[..i])
        } else {
            self.read_past_end = true;
            Err(self.error().unwrap_err())
        }
    }

    pub fn read_bytes(&mut self, len: u32) -> Result<&'a [u8]> {
        let pos = self.pos;
        let new_pos = pos + len;
        self.seek(new_pos)?;
        Ok(&self.data[pos as usize..new_pos as usize])
    }

    pub fn read_to_end(&mut self) -> &'a [u8] {
        let end = self.len();
        let pos = self.pos;
        self.pos = end;
        &self.data[pos as usize..end as usize]
    }

    pub fn seek(&mut self, pos: u32) -> Result<u32> {
        if pos > self.len() {
            self.read_past_end = true;
            return Err(self.error().unwrap_err());
        }
        Ok(std::mem::replace(&mut self.pos, pos))
    }

    pub fn tell(&self) -> u32 {
        self.pos
    }

    pub fn advance(&mut self, bytes: u32) -> Result<u32> {
        self.seek(self.tell() + bytes)
    }
}
