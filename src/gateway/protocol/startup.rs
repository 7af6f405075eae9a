use bytes::Bytes;

use strum::Display;

use crate::gateway::common::{Error, Result};

/// Known Postgres authentication request/response subtypes (the integer
/// sent as the body of an `AuthenticationXXX` backend message).
#[derive(Display, Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub enum AuthType {
    Ok = 0,
    ClearText = 3,
    MD5 = 5,
    SASL = 10,
    SASLContinue = 11,
    SASLFinal = 12,
}

impl AuthType {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }
}

impl Default for AuthType {
    fn default() -> Self {
        AuthType::Ok
    }
}

/// The key/value parameters sent in a frontend StartupMessage (user,
/// database, application_name, ...), parsed eagerly since the startup
/// packet is small and only seen once per connection.
#[derive(Clone, Default)]
pub struct StartupParams {
    params: Vec<(String, String)>,
}

impl StartupParams {
    pub fn new() -> Self {
        Self { params: Vec::new() }
    }

    pub fn insert(&mut self, k: impl Into<String>, v: impl Into<String>) {
        self.params.push((k.into(), v.into()));
    }

    pub fn get(&self, k: &str) -> Option<&str> {
        self.params.iter().find(|(key, _)| key == k).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn user(&self) -> Option<&str> {
        self.get("user")
    }

    pub fn database(&self) -> &str {
        self.get("database").unwrap_or_else(|| self.user().unwrap_or(""))
    }

    /// Parses the body of a `StartupMessage` that follows the protocol
    /// version word: a run of null-terminated `key\0value\0` pairs, ended
    /// by a final lone `\0`.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let mut params = StartupParams::new();
        let mut pos = 0usize;
        loop {
            if pos >= body.len() {
                return Err(Error::protocol_error("truncated StartupMessage"));
            }
            if body[pos] == 0 {
                break;
            }
            let (key, next) = read_cstr(body, pos)?;
            let (value, next) = read_cstr(body, next)?;
            params.insert(key, value);
            pos = next;
        }
        Ok(params)
    }
}

fn read_cstr(body: &[u8], start: usize) -> Result<(String, usize)> {
    let end = memchr::memchr(0, &body[start..])
        .ok_or_else(|| Error::protocol_error("unterminated string in StartupMessage"))?;
    let s = std::str::from_utf8(&body[start..start + end])
        .map_err(|_| Error::protocol_error("StartupMessage parameter is not valid UTF-8"))?
        .to_string();
    Ok((s, start + end + 1))
}

/// Key/value pairs sent to the client as ParameterStatus messages after
/// authentication (server_version, client_encoding, TimeZone, ...). Stored
/// as a flat Bytes buffer of null-terminated "k\0v\0" pairs so it can be
/// cheaply cloned and shared between sessions that negotiate the same values.
#[derive(Clone, Default)]
pub struct ServerParams {
    params: Vec<(Bytes, Bytes)>,
}

impl ServerParams {
    pub fn new() -> Self {
        Self { params: Vec::new() }
    }

    pub fn add(&mut self, k: &str, v: &str) {
        self.params.push((Bytes::copy_from_slice(k.as_bytes()), Bytes::copy_from_slice(v.as_bytes())));
    }

    pub fn get(&self, k: &str) -> Option<&str> {
        self.params.iter().find(|(key, _)| key.as_ref() == k.as_bytes())
            .and_then(|(_, v)| std::str::from_utf8(v).ok())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().filter_map(|(k, v)| {
            Some((std::str::from_utf8(k).ok()?, std::str::from_utf8(v).ok()?))
        })
    }
}

/// The default set of ParameterStatus values the gateway reports to
/// clients once authenticated, mimicking what a real Postgres server sends
/// so drivers (psycopg2, libpq, asyncpg) don't bail out on missing params.
pub fn default_server_params(server_version: &str) -> ServerParams {
    let mut params = ServerParams::new();
    params.add("server_version", server_version);
    params.add("server_encoding", "UTF8");
    params.add("client_encoding", "UTF8");
    params.add("DateStyle", "ISO, MDY");
    params.add("IntervalStyle", "postgres");
    params.add("TimeZone", "UTC");
    params.add("integer_datetimes", "on");
    params.add("standard_conforming_strings", "on");
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_value_pairs_until_trailing_nul() {
        let mut body = Vec::new();
        body.extend_from_slice(b"user\0alice\0database\0mydb\0\0");
        let params = StartupParams::parse(&body).unwrap();
        assert_eq!(params.user(), Some("alice"));
        assert_eq!(params.database(), "mydb");
    }

    #[test]
    fn missing_trailing_nul_is_an_error() {
        let body = b"user\0alice\0";
        assert!(StartupParams::parse(body).is_err());
    }
}
