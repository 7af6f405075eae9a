//! Per-connection driver: startup negotiation, SCRAM/trust authentication,
//! then the main simple/extended-query dispatch loop. A self-contained
//! per-task loop reading framed [`Messages`] batches off its own socket.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use rand::Rng;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::gateway::common::{Error, Result};
use crate::gateway::config::Settings;
use crate::gateway::iris::{AuthStrategy, ConnectionPool};
use crate::gateway::protocol::types::Value;
use crate::gateway::protocol::{
    default_server_params, protocol_error_to_messages, AuthType, FrameReader, Header, Message, MessageBuilder,
    Messages, ScramServer, StartupParams, Tag, CANCEL_REQUEST_CODE, GSSENC_REQUEST_CODE, MECHANISM,
    PROTOCOL_VERSION_3_0, SSL_NOT_ALLOWED, SSL_REQUEST_CODE,
};
use crate::gateway::session::{Close, CloseKind, CopySpec, Describe, DescribeKind, Session};
use crate::gateway::sql::TranslationCache;

use super::registry::CancelRegistry;

/// Reads complete frames off a socket one at a time, re-filling the
/// underlying [`FrameReader`] only when the last batch has been fully
/// consumed. A pipelining client can put several messages in one read, so
/// a batch is buffered and drained message-by-message rather than
/// re-reading the socket per message.
struct MessageSource {
    frames: FrameReader,
    pending: Messages,
    max_frame_size: u32,
}

impl MessageSource {
    fn new(max_frame_size: u32) -> Self {
        Self { frames: FrameReader::new(8192), pending: Messages::default(), max_frame_size }
    }

    /// Returns the next framed message, reading from `stream` as needed.
    /// `None` means the peer closed the connection cleanly.
    async fn next(&mut self, stream: &mut TcpStream) -> Result<Option<Messages>> {
        loop {
            if let Some(msg) = self.pop_pending()? {
                return Ok(Some(msg));
            }
            let mut buf = [0u8; 8192];
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                return Ok(None);
            }
            self.frames.bytes_mut().extend_from_slice(&buf[..n]);
            if let Some(batch) = self.frames.next_batch(self.max_frame_size) {
                self.pending = batch?;
            }
        }
    }

    fn pop_pending(&mut self) -> Result<Option<Messages>> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        let header = Header::parse(self.pending.as_slice())?
            .ok_or_else(|| Error::protocol_error("incomplete frame in message batch"))?;
        let frame_len = header.frame_len() as usize;
        Ok(Some(self.pending.split_to(frame_len)))
    }
}

async fn send(stream: &mut TcpStream, messages: Messages) -> Result<()> {
    stream.write_all(messages.as_slice()).await?;
    Ok(())
}

/// Reads the untagged packet that opens every Postgres connection: a
/// 4-byte length word (counting itself) followed by a 4-byte code (either
/// the protocol version or one of the special request codes) and the rest
/// of the body.
async fn read_startup_frame(stream: &mut TcpStream, max_frame_size: u32) -> Result<(i32, Bytes)> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len < 8 || len > max_frame_size {
        return Err(Error::protocol_error(format!("invalid startup packet length {}", len)));
    }
    let mut rest = BytesMut::zeroed(len as usize - 4);
    stream.read_exact(&mut rest).await?;
    let code = i32::from_be_bytes(rest[..4].try_into().unwrap());
    Ok((code, rest.freeze().split_off(4)))
}

/// Handles `SSLRequest`/`GSSENCRequest` (always declined, since TLS
/// termination is expected to sit in front of the gateway) and
/// `CancelRequest`, looping until the real `StartupMessage` arrives.
/// Returns `None` if the connection was a cancel request, which closes
/// without ever reaching the query-dispatch loop.
async fn negotiate_startup(
    stream: &mut TcpStream,
    max_frame_size: u32,
    registry: &CancelRegistry,
) -> Result<Option<StartupParams>> {
    loop {
        let (code, body) = read_startup_frame(stream, max_frame_size).await?;
        match code {
            SSL_REQUEST_CODE | GSSENC_REQUEST_CODE => {
                stream.write_all(&[SSL_NOT_ALLOWED]).await?;
            }
            CANCEL_REQUEST_CODE => {
                if body.len() < 8 {
                    return Err(Error::protocol_error("truncated CancelRequest"));
                }
                let process_id = u32::from_be_bytes(body[0..4].try_into().unwrap());
                let secret_key = u32::from_be_bytes(body[4..8].try_into().unwrap());
                registry.cancel(process_id, secret_key);
                return Ok(None);
            }
            PROTOCOL_VERSION_3_0 => {
                return Ok(Some(StartupParams::parse(&body)?));
            }
            other => {
                return Err(Error::protocol_error(format!("unsupported startup code {}", other)));
            }
        }
    }
}

async fn read_password_message(stream: &mut TcpStream, max_frame_size: u32) -> Result<Messages> {
    let mut frames = FrameReader::new(4096);
    loop {
        if let Some(batch) = frames.next_batch(max_frame_size) {
            let batch = batch?;
            let msg = batch.first().ok_or_else(|| Error::protocol_error("empty PasswordMessage batch"))?;
            if msg.tag() != Tag::PASSWORD_MESSAGE {
                return Err(Error::protocol_error(format!("expected PasswordMessage, got {}", msg.tag())));
            }
            return Ok(batch);
        }
        let mut buf = [0u8; 4096];
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(Error::closed());
        }
        frames.bytes_mut().extend_from_slice(&buf[..n]);
    }
}

/// Drives SCRAM-SHA-256 (§A.2) if `auth.scram_enabled`, otherwise trusts
/// any presented user when `auth.trust_enabled` — the same two knobs
/// `AuthStrategy` documents itself as serving for both the gateway's own
/// pooled connections and client-facing verification.
async fn authenticate(stream: &mut TcpStream, settings: &Settings, auth: &dyn AuthStrategy, user: &str) -> Result<()> {
    if settings.auth.trust_enabled && !settings.auth.scram_enabled {
        let mut mb = MessageBuilder::new(Tag::AUTHENTICATION);
        mb.write_i32(AuthType::Ok.as_i32());
        send(stream, mb.finish()).await?;
        return Ok(());
    }

    let password = auth.credential_lookup(user)?;
    let mut scram = ScramServer::new(&password);

    let mut mb = MessageBuilder::new(Tag::AUTHENTICATION);
    mb.write_i32(AuthType::SASL.as_i32());
    mb.write_str(MECHANISM);
    mb.write_byte(0); // terminates the list of offered mechanisms
    send(stream, mb.finish()).await?;

    let initial = read_password_message(stream, settings.limits.max_frame_size).await?;
    let first_msg = initial.first().ok_or_else(|| Error::protocol_error("empty SASL initial response"))?;
    let mut r = first_msg.reader();
    let _mechanism = r.read_str()?;
    let response_len = r.read_i32();
    if response_len < 0 {
        return Err(Error::protocol_error("missing SASL initial response"));
    }
    let client_first_bytes = r.read_bytes(response_len as u32)?;
    let client_first = std::str::from_utf8(client_first_bytes).map_err(Error::from)?;

    let server_first = scram.client_first(client_first)?;
    let mut mb = MessageBuilder::new(Tag::AUTHENTICATION);
    mb.write_i32(AuthType::SASLContinue.as_i32());
    mb.write_bytes(server_first.as_bytes());
    send(stream, mb.finish()).await?;

    let final_msg_batch = read_password_message(stream, settings.limits.max_frame_size).await?;
    let final_msg = final_msg_batch.first().ok_or_else(|| Error::protocol_error("empty SASL final response"))?;
    let mut r = final_msg.reader();
    let client_final_bytes = r.read_to_end();
    let client_final = std::str::from_utf8(client_final_bytes).map_err(Error::from)?;

    let server_final = scram.client_final(client_final)?;
    let mut mb = MessageBuilder::new(Tag::AUTHENTICATION);
    mb.write_i32(AuthType::SASLFinal.as_i32());
    mb.write_bytes(server_final.as_bytes());
    send(stream, mb.finish()).await?;

    Ok(())
}

/// Batches `AuthenticationOk` + the default `ParameterStatus` set +
/// `BackendKeyData` + `ReadyForQuery` into one send, mirroring the
/// teacher's `client_complete_startup`.
fn complete_startup_messages(process_id: u32, secret_key: u32) -> Messages {
    let params = default_server_params("13.0 (iris-pgwire)");
    let mut mb = MessageBuilder::new(Tag::AUTHENTICATION);
    mb.write_i32(AuthType::Ok.as_i32());

    for (key, value) in params.iter() {
        mb.add_new(Tag::PARAMETER_STATUS);
        mb.write_str(key);
        mb.write_str(value);
    }

    mb.add_new(Tag::BACKEND_KEY_DATA);
    mb.write_i32(process_id as i32);
    mb.write_i32(secret_key as i32);

    mb.add_new(Tag::READY_FOR_QUERY);
    mb.write_byte(b'I');
    mb.finish()
}

/// Runs one accepted connection end to end: startup negotiation,
/// authentication, then the simple/extended-query dispatch loop until the
/// client disconnects or sends `Terminate`.
pub async fn handle(
    mut stream: TcpStream,
    settings: &'static Settings,
    pool: Arc<ConnectionPool>,
    cache: Arc<TranslationCache>,
    auth: Arc<dyn AuthStrategy>,
    registry: Arc<CancelRegistry>,
) -> Result<()> {
    let max_frame_size = settings.limits.max_frame_size;

    let params = match negotiate_startup(&mut stream, max_frame_size, &registry).await? {
        Some(params) => params,
        None => return Ok(()), // CancelRequest: nothing more to do on this socket.
    };
    let user = params.user().ok_or_else(|| Error::protocol_error("StartupMessage missing user"))?.to_string();
    let database = params.database().to_string();

    authenticate(&mut stream, settings, auth.as_ref(), &user).await?;

    let process_id: u32 = rand::thread_rng().gen();
    let secret_key: u32 = rand::thread_rng().gen();
    send(&mut stream, complete_startup_messages(process_id, secret_key)).await?;

    let mut session = Session::new(pool, cache, user, database, process_id, secret_key);
    let (cancel_tx, mut cancel_rx) = mpsc::unbounded_channel();
    registry.register(process_id, secret_key, cancel_tx);

    let mut source = MessageSource::new(max_frame_size);
    let result = dispatch_loop(&mut session, &mut source, &mut stream, &mut cancel_rx).await;
    registry.unregister(process_id, secret_key);
    result
}

async fn dispatch_loop(
    session: &mut Session,
    source: &mut MessageSource,
    stream: &mut TcpStream,
    cancel_rx: &mut mpsc::UnboundedReceiver<()>,
) -> Result<()> {
    loop {
        while cancel_rx.try_recv().is_ok() {
            session.request_cancel();
        }

        let msg = match source.next(stream).await? {
            Some(msg) => msg,
            None => return Ok(()),
        };
        let first = msg.first().ok_or_else(|| Error::protocol_error("empty message frame"))?;
        let tag = first.tag();

        let response = match tag {
            Tag::QUERY => {
                let mut r = first.reader();
                let sql = r.read_str()?.to_string();
                if is_copy_statement(&sql) {
                    handle_copy(session, &sql, source, stream).await?
                } else {
                    session.simple_query(&sql).await?
                }
            }
            Tag::PARSE => {
                let mut r = first.reader();
                let name = r.read_str()?.to_string();
                let sql = r.read_str()?.to_string();
                let n_params = r.read_i16();
                let mut oids = Vec::with_capacity(n_params.max(0) as usize);
                for _ in 0..n_params {
                    oids.push(r.read_i32());
                }
                match session.parse(&name, &sql, oids) {
                    Ok(m) => m,
                    Err(e) => protocol_error_to_messages(&e),
                }
            }
            Tag::BIND => match parse_bind(session, &first) {
                Ok((portal, stmt, params, formats)) => match session.bind(&portal, &stmt, params, formats) {
                    Ok(m) => m,
                    Err(e) => protocol_error_to_messages(&e),
                },
                Err(e) => protocol_error_to_messages(&e),
            },
            Tag::DESCRIBE => {
                let mut r = first.reader();
                let kind_byte = r.read_byte();
                let name = r.read_str()?.to_string();
                let kind = if kind_byte == b'S' { DescribeKind::Statement } else { DescribeKind::Portal };
                match session.describe(Describe { kind, name }).await {
                    Ok(m) => m,
                    Err(e) => protocol_error_to_messages(&e),
                }
            }
            Tag::EXECUTE => {
                let mut r = first.reader();
                let name = r.read_str()?.to_string();
                let max_rows = r.read_i32();
                session.execute(&name, max_rows).await?
            }
            Tag::CLOSE => {
                let mut r = first.reader();
                let kind_byte = r.read_byte();
                let name = r.read_str()?.to_string();
                let kind = if kind_byte == b'S' { CloseKind::Statement } else { CloseKind::Portal };
                session.close(Close { kind, name })
            }
            Tag::SYNC => session.sync(),
            Tag::FLUSH => Messages::default(),
            Tag::TERMINATE => return Ok(()),
            other => {
                return Err(Error::protocol_error(format!("unexpected message {} outside COPY", other)));
            }
        };
        send(stream, response).await?;
    }
}

fn is_copy_statement(sql: &str) -> bool {
    sql.trim_start().get(..4).map(|s| s.eq_ignore_ascii_case("COPY")).unwrap_or(false)
}

/// Parses a `Bind` message body: portal name, statement name, parameter
/// format codes, parameter values (decoded against the statement's
/// `Parse`-declared OIDs), and the requested result format codes.
fn parse_bind(session: &Session, msg: &Message) -> Result<(String, String, Vec<Value>, Vec<bool>)> {
    let mut r = msg.reader();
    let portal_name = r.read_str()?.to_string();
    let statement_name = r.read_str()?.to_string();
    let oids = session.param_oids(&statement_name)?;

    let n_format_codes = r.read_i16();
    let mut format_codes = Vec::with_capacity(n_format_codes.max(0) as usize);
    for _ in 0..n_format_codes {
        format_codes.push(r.read_i16() == 1);
    }

    let n_params = r.read_i16();
    let mut params = Vec::with_capacity(n_params.max(0) as usize);
    for i in 0..n_params as usize {
        let len = r.read_i32();
        let data = if len < 0 { None } else { Some(r.read_bytes(len as u32)?) };
        let binary = match format_codes.len() {
            0 => false,
            1 => format_codes[0],
            _ => format_codes.get(i).copied().unwrap_or(false),
        };
        let oid = oids.get(i).copied().unwrap_or(0);
        params.push(Value::decode(data, oid, binary));
    }

    let n_result_formats = r.read_i16();
    let mut result_formats = Vec::with_capacity(n_result_formats.max(0) as usize);
    for _ in 0..n_result_formats {
        result_formats.push(r.read_i16() == 1);
    }
    r.error()?;

    Ok((portal_name, statement_name, params, result_formats))
}

/// Drives one `COPY` statement to completion, either direction. Grounded
/// on the wire semantics documented in `gateway::iris::copy`: for `TO
/// STDOUT` the backend itself sends `CopyDone` once every row is
/// streamed; for `FROM STDIN` the client sends `CopyDone` (or aborts with
/// `CopyFail`).
async fn handle_copy(session: &mut Session, sql: &str, source: &mut MessageSource, stream: &mut TcpStream) -> Result<Messages> {
    let spec = match CopySpec::parse(sql) {
        Ok(spec) => spec,
        Err(e) => return Ok(concat_messages(protocol_error_to_messages(&e), session.ready_for_query())),
    };

    let body = if spec.to_stdout {
        match handle_copy_out(session, &spec, stream).await {
            Ok(m) => m,
            Err(e) => protocol_error_to_messages(&e),
        }
    } else {
        match handle_copy_in(session, &spec, source, stream).await {
            Ok(m) => m,
            Err(e) => protocol_error_to_messages(&e),
        }
    };
    Ok(concat_messages(body, session.ready_for_query()))
}

async fn handle_copy_out(session: &mut Session, spec: &CopySpec, stream: &mut TcpStream) -> Result<Messages> {
    let (response, mut out_stream) = session.copy_out(spec).await?;
    send(stream, response).await?;
    while let Some(chunk) = out_stream.next_chunk(64 * 1024) {
        let mut mb = MessageBuilder::new(Tag::COPY_DATA);
        mb.write_bytes(&chunk);
        send(stream, mb.finish()).await?;
    }
    let mut mb = MessageBuilder::new(Tag::COPY_DONE);
    mb.add_new(Tag::COMMAND_COMPLETE);
    mb.write_str(&format!("COPY {}", out_stream.row_count()));
    Ok(mb.finish())
}

async fn handle_copy_in(session: &mut Session, spec: &CopySpec, source: &mut MessageSource, stream: &mut TcpStream) -> Result<Messages> {
    let begin_response = session.begin_copy_in(spec)?;
    send(stream, begin_response).await?;

    let mut data = Vec::new();
    loop {
        let frame = source.next(stream).await?.ok_or_else(Error::closed)?;
        let msg = frame.first().ok_or_else(|| Error::protocol_error("empty frame during COPY"))?;
        match msg.tag() {
            Tag::COPY_DATA => {
                let mut r = msg.reader();
                data.extend_from_slice(r.read_to_end());
            }
            Tag::COPY_DONE => break,
            Tag::COPY_FAIL => {
                let mut r = msg.reader();
                let reason = r.read_str().unwrap_or("client aborted COPY").to_string();
                return Ok(session.copy_cancelled(&reason));
            }
            other => return Err(Error::protocol_error(format!("unexpected {} during COPY FROM STDIN", other))),
        }
    }
    session.finish_copy_in(spec, &data).await
}

fn concat_messages(a: Messages, b: Messages) -> Messages {
    let mut buf = BytesMut::new();
    buf.extend_from_slice(a.as_slice());
    buf.extend_from_slice(b.as_slice());
    Messages::new(buf.freeze())
}
