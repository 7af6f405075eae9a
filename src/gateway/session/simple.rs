//! The simple query protocol (`Query` message, tag `'Q'`): translate,
//! execute (or synthesize a catalog result), and build the
//! RowDescription/DataRow/CommandComplete/ReadyForQuery response as one
//! message batch, executing against a leased
//! [`crate::gateway::iris::IrisBackend`].

use bytes::BytesMut;

use crate::gateway::common::Result;
use crate::gateway::iris::{self, ExecOutcome, Probe, Rows};
use crate::gateway::protocol::types::{self, Value};
use crate::gateway::protocol::{
    protocol_error_to_messages, write_row_description_body, ColumnDescription, MessageBuilder, Messages, Tag,
};
use crate::gateway::sql::QueryType;

use super::Session;

impl Session {
    /// Handles one `Query` message, returning the full batch of messages
    /// to send back (possibly an ErrorResponse, always ending in
    /// ReadyForQuery).
    pub async fn simple_query(&mut self, sql: &str) -> Result<Messages> {
        if sql.trim().is_empty() {
            let empty = MessageBuilder::new(Tag::EMPTY_QUERY).finish();
            return Ok(concat(vec![empty, self.ready_for_query()]));
        }

        let translated = self.translate(sql);
        let query_type = translated.query_type;

        if let Err(e) = self.admit(query_type) {
            self.fail();
            return Ok(concat(vec![protocol_error_to_messages(&e), self.ready_for_query()]));
        }

        let body = match self.execute_translated(&translated.sql, query_type).await {
            Ok(messages) => {
                self.advance(query_type);
                self.release_lease_if_idle();
                messages
            }
            Err(e) => {
                self.fail();
                self.mark_lease_unhealthy();
                self.release_lease_if_idle();
                protocol_error_to_messages(&e)
            }
        };
        Ok(concat(vec![body, self.ready_for_query()]))
    }

    /// Runs one already-translated statement and builds its
    /// RowDescription/DataRow/CommandComplete messages (without the
    /// trailing ReadyForQuery, which the caller always appends).
    async fn execute_translated(&mut self, sql: &str, query_type: QueryType) -> Result<Messages> {
        if let Some(probe) = iris::detect_catalog_probe(sql) {
            if let Some(rows) = self.synthesize(probe).await? {
                return Ok(render_synthesized(rows));
            }
        }

        let lease = self.ensure_lease().await?;
        let outcome = lease.backend().exec(sql)?;
        Ok(render_outcome(outcome, query_type))
    }

    /// Intercepts the three catalog relations the backend layer actually
    /// synthesizes (`pg_namespace`/`pg_class`/`pg_attribute`); every other
    /// probed relation (`pg_type`, `pg_index`, `pg_proc`,
    /// `pg_description`, and bare `information_schema` queries) falls
    /// through to direct execution against IRIS.
    async fn synthesize(&mut self, probe: Probe) -> Result<Option<iris::SynthesizedRows>> {
        if !matches!(probe, Probe::PgNamespace | Probe::PgClass | Probe::PgAttribute) {
            return Ok(None);
        }
        let lease = self.ensure_lease().await?;
        let backend = lease.backend();
        let rows = match probe {
            Probe::PgNamespace => iris::synthesize_pg_namespace(backend)?,
            Probe::PgClass => iris::synthesize_pg_class(backend)?,
            Probe::PgAttribute => iris::synthesize_pg_attribute(backend)?,
            _ => unreachable!(),
        };
        Ok(Some(rows))
    }
}

fn concat(parts: Vec<Messages>) -> Messages {
    let mut buf = BytesMut::new();
    for part in parts {
        buf.extend_from_slice(part.as_slice());
    }
    Messages::new(buf.freeze())
}

fn render_outcome(outcome: ExecOutcome, query_type: QueryType) -> Messages {
    let mut rows = Rows::from_outcome(outcome);
    if rows.columns.is_empty() {
        // Affected-rows-only outcome (INSERT/UPDATE/DELETE/DDL): no
        // RowDescription, just CommandComplete.
        let affected = rows.affected();
        let mut mb = MessageBuilder::new(Tag::COMMAND_COMPLETE);
        mb.write_str(&command_tag(query_type, affected));
        return mb.finish();
    }

    let columns: Vec<ColumnDescription> = rows
        .columns
        .iter()
        .map(|c| {
            let (oid, typmod) = iris::map_iris_type(&c.iris_type, None, None, None);
            let mut desc = ColumnDescription::new(c.name.clone(), oid);
            desc.type_mod = typmod;
            desc
        })
        .collect();

    let mut mb = MessageBuilder::new(Tag::ROW_DESCRIPTION);
    write_row_description_body(&mut mb, &columns);
    let mut count = 0i64;
    while rows.next() {
        write_data_row(&mut mb, rows.row(), &columns);
        count += 1;
    }
    mb.add_new(Tag::COMMAND_COMPLETE);
    mb.write_str(&command_tag(query_type, count));
    mb.finish()
}

fn render_synthesized(rows: iris::SynthesizedRows) -> Messages {
    let columns: Vec<ColumnDescription> = rows
        .columns
        .iter()
        .map(|name| {
            let oid = match name.as_str() {
                "oid" | "relnamespace" | "atttypid" | "attnum" | "atttypmod" | "attrelid" => types::INT4,
                "attnotnull" => types::BOOL,
                _ => types::TEXT,
            };
            ColumnDescription::new(name.clone(), oid)
        })
        .collect();

    let mut mb = MessageBuilder::new(Tag::ROW_DESCRIPTION);
    write_row_description_body(&mut mb, &columns);
    let count = rows.rows.len() as i64;
    for row in &rows.rows {
        write_data_row(&mut mb, row, &columns);
    }
    mb.add_new(Tag::COMMAND_COMPLETE);
    mb.write_str(&format!("SELECT {}", count));
    mb.finish()
}

fn write_data_row(mb: &mut MessageBuilder, row: &[Value], columns: &[ColumnDescription]) {
    mb.add_new(Tag::DATA_ROW);
    mb.write_i16(row.len() as i16);
    for (value, col) in row.iter().zip(columns.iter()) {
        match value.encode(col.type_oid, col.binary) {
            Some(bytes) => {
                mb.write_i32(bytes.len() as i32);
                mb.write_bytes(&bytes);
            }
            None => mb.write_i32(-1),
        }
    }
}

fn command_tag(query_type: QueryType, affected: i64) -> String {
    match query_type {
        QueryType::Select | QueryType::SelectInto | QueryType::SelectWithLocking | QueryType::Values => {
            format!("SELECT {}", affected.max(0))
        }
        QueryType::Insert | QueryType::InsertReturning => format!("INSERT 0 {}", affected.max(0)),
        QueryType::Update | QueryType::UpdateReturning => format!("UPDATE {}", affected.max(0)),
        QueryType::Delete | QueryType::DeleteReturning => format!("DELETE {}", affected.max(0)),
        QueryType::Begin => "BEGIN".to_string(),
        QueryType::Commit => "COMMIT".to_string(),
        QueryType::Rollback | QueryType::RollbackSavepoint => "ROLLBACK".to_string(),
        _ => "OK".to_string(),
    }
}
