//! `COPY ... FROM/TO STDIN`, driven by `gateway::server::connection` since
//! the exchange spans several `CopyData` frames instead of the usual
//! one-message-one-response shape the simple/extended handlers use.
//! Grounded on `iris::copy::{CopyInSink, CopyOutStream}`.

use regex::Regex;

use crate::gateway::common::{Error, Result};
use crate::gateway::iris::{CopyFormat, CopyInSink, CopyOutStream, ExecOutcome};
use crate::gateway::protocol::{protocol_error_to_messages, MessageBuilder, Messages, Tag};
use crate::gateway::sql::QueryType;

use super::Session;

/// A `COPY table [(col, ...)] FROM|TO STDIN|STDOUT [WITH (...)]` statement,
/// parsed just enough to drive either direction against IRIS. Copying the
/// result of an arbitrary query (`COPY (SELECT ...) TO STDOUT`) isn't
/// supported; only the plain table form is.
pub struct CopySpec {
    pub table: String,
    pub columns: Vec<String>,
    pub format: CopyFormat,
    pub has_header: bool,
    pub to_stdout: bool,
}

const DEFAULT_BATCH_ROWS: usize = 1000;

impl CopySpec {
    pub fn parse(sql: &str) -> Result<Self> {
        let re = Regex::new(
            r"(?is)^\s*COPY\s+([A-Za-z_][\w.\x22]*)\s*(?:\(([^)]*)\))?\s+(FROM|TO)\s+(STDIN|STDOUT)\s*(?:WITH\s*\(([^)]*)\))?\s*;?\s*$",
        )
        .unwrap();
        let caps = re
            .captures(sql)
            .ok_or_else(|| Error::protocol_error("unsupported COPY statement shape"))?;
        let table = caps[1].to_string();
        let columns = caps
            .get(2)
            .map(|m| m.as_str().split(',').map(|c| c.trim().to_string()).collect())
            .unwrap_or_default();
        let direction = caps[3].to_ascii_uppercase();
        let target = caps[4].to_ascii_uppercase();
        if (direction == "FROM" && target != "STDIN") || (direction == "TO" && target != "STDOUT") {
            return Err(Error::protocol_error("COPY FROM must use STDIN and COPY TO must use STDOUT"));
        }
        let options = caps.get(5).map(|m| m.as_str()).unwrap_or("");
        let format = parse_format_option(options)?;
        let has_header = options.to_ascii_uppercase().contains("HEADER");
        Ok(Self { table, columns, format, has_header, to_stdout: direction == "TO" })
    }
}

fn parse_format_option(options: &str) -> Result<CopyFormat> {
    let upper = options.to_ascii_uppercase();
    if let Some(pos) = upper.find("FORMAT") {
        let name: String = options[pos + "FORMAT".len()..]
            .trim_start_matches([' ', '\t'])
            .chars()
            .take_while(|c| c.is_alphanumeric())
            .collect();
        if !name.is_empty() {
            return CopyFormat::parse(&name);
        }
    }
    if upper.contains("CSV") {
        return CopyFormat::parse("CSV");
    }
    Ok(CopyFormat::Text)
}

impl Session {
    /// Admits a `COPY ... FROM STDIN` statement and, once accepted, builds
    /// the `CopyInResponse` that tells the client we're ready for `CopyData`
    /// frames. Admission runs up front so a statement rejected outright
    /// (e.g. inside a failed transaction) never makes it into copy mode —
    /// the insert itself only runs once `CopyDone` arrives, see
    /// [`Session::finish_copy_in`].
    pub fn begin_copy_in(&mut self, spec: &CopySpec) -> Result<Messages> {
        if let Err(e) = self.admit(QueryType::Copy) {
            self.fail();
            return Err(e);
        }
        let mut mb = MessageBuilder::new(Tag::COPY_IN_RESPONSE);
        mb.write_byte(if spec.format == CopyFormat::Binary { 1 } else { 0 });
        mb.write_i16(spec.columns.len() as i16);
        for _ in &spec.columns {
            mb.write_i16(0);
        }
        Ok(mb.finish())
    }

    /// Runs a buffered `COPY ... FROM STDIN` once `CopyDone` has been
    /// received and the connection handler has the whole payload in hand.
    /// A `CopyInSink` borrows the leased backend for its lifetime, which
    /// can't be held across the `await` points between successive
    /// `CopyData` reads, so the connection handler buffers the raw bytes
    /// and this runs the insert in one pass instead of streaming it
    /// incrementally across frames. Assumes [`Session::begin_copy_in`]
    /// already admitted the statement.
    pub async fn finish_copy_in(&mut self, spec: &CopySpec, data: &[u8]) -> Result<Messages> {
        let result = self.run_copy_in(spec, data).await;
        match result {
            Ok(messages) => {
                self.advance(QueryType::Copy);
                self.release_lease_if_idle();
                Ok(messages)
            }
            Err(e) => {
                self.fail();
                self.mark_lease_unhealthy();
                self.release_lease_if_idle();
                Err(e)
            }
        }
    }

    /// `CopyFail`: the client aborted the transfer before `CopyDone`.
    /// Treated like any other failed statement for transaction bookkeeping
    /// (`admit` already ran when the `COPY` statement was first dispatched).
    pub fn copy_cancelled(&mut self, reason: &str) -> Messages {
        self.fail();
        self.mark_lease_unhealthy();
        self.release_lease_if_idle();
        protocol_error_to_messages(&Error::protocol_error(format!("COPY failed: {}", reason)))
    }

    async fn run_copy_in(&mut self, spec: &CopySpec, data: &[u8]) -> Result<Messages> {
        let lease = self.ensure_lease().await?;
        let backend = lease.backend();
        let mut sink =
            CopyInSink::new(backend, spec.table.clone(), spec.columns.clone(), spec.format, spec.has_header, DEFAULT_BATCH_ROWS);
        sink.write(data)?;
        let rows_copied = sink.finish()?;
        let mut mb = MessageBuilder::new(Tag::COMMAND_COMPLETE);
        mb.write_str(&format!("COPY {}", rows_copied));
        Ok(mb.finish())
    }

    /// Runs a `COPY ... TO STDOUT`: IRIS always returns a full result set
    /// from `exec` (no server-side cursor), so the fetch happens here and
    /// the returned [`CopyOutStream`] just paginates the already-fetched
    /// rows for the connection handler to drain as `CopyData` chunks.
    pub async fn copy_out(&mut self, spec: &CopySpec) -> Result<(Messages, CopyOutStream)> {
        if let Err(e) = self.admit(QueryType::Copy) {
            self.fail();
            return Err(e);
        }
        let result = self.run_copy_out(spec).await;
        match result {
            Ok(outcome) => {
                self.advance(QueryType::Copy);
                self.release_lease_if_idle();
                Ok(outcome)
            }
            Err(e) => {
                self.fail();
                self.mark_lease_unhealthy();
                self.release_lease_if_idle();
                Err(e)
            }
        }
    }

    async fn run_copy_out(&mut self, spec: &CopySpec) -> Result<(Messages, CopyOutStream)> {
        let column_list = if spec.columns.is_empty() { "*".to_string() } else { spec.columns.join(", ") };
        let sql = format!("SELECT {} FROM {}", column_list, spec.table);

        let lease = self.ensure_lease().await?;
        let outcome = lease.backend().exec(&sql)?;
        let (columns, rows) = match outcome {
            ExecOutcome::Rows { columns, rows } => (columns, rows),
            ExecOutcome::Affected(_) => (Vec::new(), Vec::new()),
        };
        let names: Vec<String> =
            if spec.columns.is_empty() { columns.iter().map(|c| c.name.clone()).collect() } else { spec.columns.clone() };

        let mut mb = MessageBuilder::new(Tag::COPY_OUT_RESPONSE);
        mb.write_byte(if spec.format == CopyFormat::Binary { 1 } else { 0 });
        mb.write_i16(names.len() as i16);
        for _ in &names {
            mb.write_i16(0);
        }
        let stream = CopyOutStream::new(names, rows, spec.format, spec.has_header);
        Ok((mb.finish(), stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_copy_from_stdin_with_columns_and_format() {
        let spec = CopySpec::parse("COPY orders (id, total) FROM STDIN WITH (FORMAT csv, HEADER)").unwrap();
        assert_eq!(spec.table, "orders");
        assert_eq!(spec.columns, vec!["id", "total"]);
        assert_eq!(spec.format, CopyFormat::Csv);
        assert!(spec.has_header);
        assert!(!spec.to_stdout);
    }

    #[test]
    fn parses_copy_to_stdout() {
        let spec = CopySpec::parse("COPY orders TO STDOUT").unwrap();
        assert!(spec.to_stdout);
        assert!(spec.columns.is_empty());
        assert_eq!(spec.format, CopyFormat::Text);
    }

    #[test]
    fn rejects_mismatched_direction_and_target() {
        assert!(CopySpec::parse("COPY orders FROM STDOUT").is_err());
    }

    #[test]
    fn rejects_query_form() {
        assert!(CopySpec::parse("COPY (SELECT 1) TO STDOUT").is_err());
    }
}
