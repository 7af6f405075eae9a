//! Postgres built-in type OIDs the gateway reports in RowDescription /
//! ParameterDescription messages, and the text/binary encoders for the
//! handful of types cheap enough to support in binary format. Everything
//! else (numeric, date/time, uuid, json, vector) is always sent as text —
//! every wire-protocol client implements the text decode path, so this
//! never blocks compatibility, it just forgoes the smaller binary payload.

use bytes::{BufMut, BytesMut};

pub const BOOL: i32 = 16;
pub const BYTEA: i32 = 17;
pub const INT8: i32 = 20;
pub const INT2: i32 = 21;
pub const INT4: i32 = 23;
pub const TEXT: i32 = 25;
pub const JSON: i32 = 114;
pub const FLOAT4: i32 = 700;
pub const FLOAT8: i32 = 701;
pub const VARCHAR: i32 = 1043;
pub const DATE: i32 = 1082;
pub const TIME: i32 = 1083;
pub const TIMESTAMP: i32 = 1114;
pub const TIMESTAMPTZ: i32 = 1184;
pub const NUMERIC: i32 = 1700;
pub const UUID: i32 = 2950;
pub const JSONB: i32 = 3802;

/// typlen values from pg_type, as reported in RowDescription. Negative
/// means variable length (-1 plain varlena, -2 null-terminated cstring).
pub fn type_len(oid: i32) -> i16 {
    match oid {
        BOOL => 1,
        INT2 => 2,
        INT4 | DATE | FLOAT4 => 4,
        INT8 | FLOAT8 | TIME | TIMESTAMP | TIMESTAMPTZ => 8,
        UUID => 16,
        _ => -1,
    }
}

/// A value fetched from IRIS, already coerced to the representation needed
/// to write into a DataRow column. `Vector` carries its pgvector text
/// rendering (`[1,2,3]`) separately since IRIS has no native vector type
/// and the translator layer is what recognizes vector columns.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    Text(String),
    Bytea(Vec<u8>),
}

impl Value {
    /// Encodes this value the way it'll appear as a DataRow column: a
    /// 4-byte length prefix (-1 for NULL) followed by the payload, written
    /// by the caller. This returns just the payload, or None for NULL.
    pub fn encode(&self, oid: i32, binary: bool) -> Option<Vec<u8>> {
        match self {
            Value::Null => None,
            _ if binary => self.encode_binary(oid),
            _ => Some(self.encode_text().into_bytes()),
        }
    }

    fn encode_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => if *b { "t".to_string() } else { "f".to_string() },
            Value::Int2(v) => v.to_string(),
            Value::Int4(v) => v.to_string(),
            Value::Int8(v) => v.to_string(),
            Value::Float4(v) => v.to_string(),
            Value::Float8(v) => v.to_string(),
            Value::Text(s) => s.clone(),
            Value::Bytea(b) => format!("\\x{}", hex_encode(b)),
        }
    }

    /// Decodes one `Bind` parameter value. `None` means the frontend sent
    /// a `-1` length (SQL NULL). `oid` is the type the client declared for
    /// this parameter in `Parse` (0 means unspecified, in which case the
    /// raw bytes are passed through as text — IRIS's own SQL layer does
    /// the final type coercion when the statement executes).
    pub fn decode(data: Option<&[u8]>, oid: i32, binary: bool) -> Self {
        let bytes = match data {
            Some(b) => b,
            None => return Value::Null,
        };
        if binary {
            if let Some(v) = Self::decode_binary(bytes, oid) {
                return v;
            }
            return Value::Bytea(bytes.to_vec());
        }
        let text = String::from_utf8_lossy(bytes).into_owned();
        match oid {
            BOOL => Value::Bool(text == "t" || text == "true"),
            INT2 => text.parse().map(Value::Int2).unwrap_or(Value::Text(text)),
            INT4 => text.parse().map(Value::Int4).unwrap_or(Value::Text(text)),
            INT8 => text.parse().map(Value::Int8).unwrap_or(Value::Text(text)),
            FLOAT4 => text.parse().map(Value::Float4).unwrap_or(Value::Text(text)),
            FLOAT8 => text.parse().map(Value::Float8).unwrap_or(Value::Text(text)),
            BYTEA => Value::Bytea(text.strip_prefix("\\x").map(hex_decode).unwrap_or_default()),
            _ => Value::Text(text),
        }
    }

    fn decode_binary(bytes: &[u8], oid: i32) -> Option<Self> {
        use bytes::Buf;
        let mut b = bytes;
        match oid {
            BOOL if b.len() == 1 => Some(Value::Bool(b.get_u8() != 0)),
            INT2 if b.len() == 2 => Some(Value::Int2(b.get_i16())),
            INT4 if b.len() == 4 => Some(Value::Int4(b.get_i32())),
            INT8 if b.len() == 8 => Some(Value::Int8(b.get_i64())),
            FLOAT4 if b.len() == 4 => Some(Value::Float4(b.get_f32())),
            FLOAT8 if b.len() == 8 => Some(Value::Float8(b.get_f64())),
            TEXT | VARCHAR => std::str::from_utf8(bytes).ok().map(|s| Value::Text(s.to_string())),
            _ => None,
        }
    }

    fn encode_binary(&self, oid: i32) -> Option<Vec<u8>> {
        let mut buf = BytesMut::new();
        match (self, oid) {
            (Value::Bool(b), BOOL) => buf.put_u8(if *b { 1 } else { 0 }),
            (Value::Int2(v), INT2) => buf.put_i16(*v),
            (Value::Int4(v), INT4) => buf.put_i32(*v),
            (Value::Int8(v), INT8) => buf.put_i64(*v),
            (Value::Float4(v), FLOAT4) => buf.put_f32(*v),
            (Value::Float8(v), FLOAT8) => buf.put_f64(*v),
            _ => return Some(self.encode_text().into_bytes()),
        }
        Some(buf.to_vec())
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{:02x}", b);
    }
    s
}

fn hex_decode(hex: &str) -> Vec<u8> {
    (0..hex.len() / 2)
        .filter_map(|i| u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_text_round_trips_through_tf() {
        assert_eq!(Value::Bool(true).encode_text(), "t");
        assert_eq!(Value::Bool(false).encode_text(), "f");
    }

    #[test]
    fn int4_binary_is_big_endian() {
        let encoded = Value::Int4(1).encode(INT4, true).unwrap();
        assert_eq!(encoded, vec![0, 0, 0, 1]);
    }

    #[test]
    fn unsupported_binary_combo_falls_back_to_text() {
        let encoded = Value::Text("hi".into()).encode(TEXT, true).unwrap();
        assert_eq!(encoded, b"hi");
    }

    #[test]
    fn decode_null_is_none_length() {
        assert!(matches!(Value::decode(None, INT4, false), Value::Null));
    }

    #[test]
    fn decode_text_int4_parses() {
        assert!(matches!(Value::decode(Some(b"42"), INT4, false), Value::Int4(42)));
    }

    #[test]
    fn decode_unspecified_oid_is_text() {
        let v = Value::decode(Some(b"hello"), 0, false);
        assert!(matches!(v, Value::Text(s) if s == "hello"));
    }

    #[test]
    fn decode_binary_int4_round_trips() {
        let encoded = Value::Int4(7).encode(INT4, true).unwrap();
        assert!(matches!(Value::decode(Some(&encoded), INT4, true), Value::Int4(7)));
    }
}
