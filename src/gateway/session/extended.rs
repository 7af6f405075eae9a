//! The extended query protocol: `Parse`/`Bind`/`Describe`/`Execute`/
//! `Close`/`Sync`. Grounded on the same `ClientState` transaction rules as
//! [`super::simple`], but statements are translated once at `Parse` time
//! and cached on the [`super::PreparedStatement`] so a `Bind`+`Execute`
//! pair bound to the same statement repeatedly never re-translates.

use crate::gateway::common::{Error, Result};
use crate::gateway::iris::{ExecOutcome, Rows};
use crate::gateway::protocol::types::Value;
use crate::gateway::protocol::{
    protocol_error_to_messages, write_row_description_body, ColumnDescription, MessageBuilder, Messages, Tag,
};
use crate::gateway::sql::QueryType;

use super::{Portal, PreparedStatement, Session, SessionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescribeKind {
    Statement,
    Portal,
}

pub struct Describe {
    pub kind: DescribeKind,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    Statement,
    Portal,
}

pub struct Close {
    pub kind: CloseKind,
    pub name: String,
}

impl Session {
    /// `Parse`: translates the statement and registers it under `name`
    /// (the empty string names the unnamed statement, overwritten by each
    /// new `Parse` with no name per the wire protocol).
    pub fn parse(&mut self, name: &str, sql: &str, param_type_oids: Vec<i32>) -> Result<Messages> {
        let translated = self.translate(sql);
        self.prepared.insert(name.to_string(), PreparedStatement { translated, param_type_oids });
        Ok(MessageBuilder::new(Tag::PARSE_COMPLETE).finish())
    }

    /// The parameter type OIDs a `Parse`-registered statement declared, so
    /// the connection handler can decode a `Bind` message's raw parameter
    /// bytes before calling [`Session::bind`].
    pub fn param_oids(&self, statement_name: &str) -> Result<Vec<i32>> {
        self.prepared
            .get(statement_name)
            .map(|s| s.param_type_oids.clone())
            .ok_or_else(|| Error::protocol_error(format!("unknown statement {:?}", statement_name)))
    }

    /// `Bind`: binds parameter values to a named statement, producing a
    /// portal under `portal_name`.
    pub fn bind(
        &mut self,
        portal_name: &str,
        statement_name: &str,
        params: Vec<Value>,
        result_format_binary: Vec<bool>,
    ) -> Result<Messages> {
        if !self.prepared.contains_key(statement_name) {
            return Err(Error::protocol_error(format!("unknown statement {:?}", statement_name)));
        }
        self.portals.insert(
            portal_name.to_string(),
            Portal { statement_name: statement_name.to_string(), params, result_format_binary, cached_outcome: None },
        );
        Ok(MessageBuilder::new(Tag::BIND_COMPLETE).finish())
    }

    /// `Describe`: reports either a statement's parameter types (plus
    /// `NoData`, since parameter types alone don't tell us the result
    /// shape) or a bound portal's row description. A portal's row shape
    /// isn't known to the gateway until IRIS actually runs the statement
    /// (`IrisBackend` has no separate describe-without-executing call), so
    /// for a row-returning statement this runs it now and caches the
    /// result on the portal for `Execute` to consume instead of running it
    /// twice. Non-row-returning statements (INSERT/UPDATE/DELETE without
    /// RETURNING, DDL, transaction control) report `NoData` without
    /// touching IRIS.
    pub async fn describe(&mut self, describe: Describe) -> Result<Messages> {
        match describe.kind {
            DescribeKind::Statement => {
                let stmt = self
                    .prepared
                    .get(&describe.name)
                    .ok_or_else(|| Error::protocol_error(format!("unknown statement {:?}", describe.name)))?;
                let mut mb = MessageBuilder::new(Tag::PARAMETER_DESCRIPTION);
                mb.write_i16(stmt.param_type_oids.len() as i16);
                for oid in &stmt.param_type_oids {
                    mb.write_i32(*oid);
                }
                mb.add_new(Tag::NO_DATA);
                Ok(mb.finish())
            }
            DescribeKind::Portal => {
                let portal = self
                    .portals
                    .get(&describe.name)
                    .ok_or_else(|| Error::protocol_error(format!("unknown portal {:?}", describe.name)))?;
                let statement_name = portal.statement_name.clone();
                let params = portal.params.clone();
                let stmt = self
                    .prepared
                    .get(&statement_name)
                    .ok_or_else(|| Error::protocol_error(format!("unknown statement {:?}", statement_name)))?;
                let sql = stmt.translated.sql.clone();
                let query_type = stmt.translated.query_type;

                if !produces_rows(query_type) {
                    return Ok(MessageBuilder::new(Tag::NO_DATA).finish());
                }

                let outcome = self.run_bound_outcome(&sql, &params).await?;
                let columns = columns_of(&outcome);
                self.portals.get_mut(&describe.name).unwrap().cached_outcome = Some(outcome);

                if columns.is_empty() {
                    return Ok(MessageBuilder::new(Tag::NO_DATA).finish());
                }
                let mut mb = MessageBuilder::new(Tag::ROW_DESCRIPTION);
                write_row_description_body(&mut mb, &columns);
                Ok(mb.finish())
            }
        }
    }

    /// `Execute`: runs the statement bound to `portal_name` against IRIS
    /// (or synthesizes a catalog result, same as the simple-query path)
    /// and streams up to `max_rows` rows (0 meaning unlimited).
    pub async fn execute(&mut self, portal_name: &str, _max_rows: i32) -> Result<Messages> {
        let portal = self
            .portals
            .get_mut(portal_name)
            .ok_or_else(|| Error::protocol_error(format!("unknown portal {:?}", portal_name)))?;
        let statement_name = portal.statement_name.clone();
        let params = portal.params.clone();
        let cached = portal.cached_outcome.take();
        let stmt = self
            .prepared
            .get(&statement_name)
            .ok_or_else(|| Error::protocol_error(format!("unknown statement {:?}", statement_name)))?;
        let sql = stmt.translated.sql.clone();
        let query_type = stmt.translated.query_type;

        if let Err(e) = self.admit(query_type) {
            self.fail();
            return Ok(protocol_error_to_messages(&e));
        }

        let result = match cached {
            Some(outcome) => Ok(render_bound_outcome(outcome)),
            None => self.run_bound(&sql, &params).await,
        };
        let messages = match result {
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
        Ok(messages)
    }

    async fn run_bound(&mut self, sql: &str, params: &[Value]) -> Result<Messages> {
        let outcome = self.run_bound_outcome(sql, params).await?;
        Ok(render_bound_outcome(outcome))
    }

    async fn run_bound_outcome(&mut self, sql: &str, params: &[Value]) -> Result<ExecOutcome> {
        let lease = self.ensure_lease().await?;
        let backend = lease.backend();
        let stmt = backend.prepare(sql)?;
        let outcome = backend.bind_exec(&stmt, params);
        backend.close_statement(stmt)?;
        outcome
    }

    /// `Sync`: ends the current extended-query message sequence, returning
    /// to idle/in-transaction and replying with ReadyForQuery.
    pub fn sync(&mut self) -> Messages {
        self.ready_for_query()
    }

    /// `Close`: discards a named statement or portal. Closing an unknown
    /// name is a no-op per the wire protocol.
    pub fn close(&mut self, close: Close) -> Messages {
        match close.kind {
            CloseKind::Statement => self.close_statement(&close.name),
            CloseKind::Portal => self.close_portal(&close.name),
        }
        MessageBuilder::new(Tag::CLOSE_COMPLETE).finish()
    }
}

/// Statement shapes that return a result set and therefore have a real
/// row description to report from `Describe(Portal)`. Everything else
/// (plain DML, DDL, transaction control) only ever produces an affected
/// row count.
fn produces_rows(query_type: QueryType) -> bool {
    matches!(
        query_type,
        QueryType::Select
            | QueryType::SelectInto
            | QueryType::SelectWithLocking
            | QueryType::Values
            | QueryType::InsertReturning
            | QueryType::UpdateReturning
            | QueryType::DeleteReturning
            | QueryType::Show
    )
}

fn columns_of(outcome: &ExecOutcome) -> Vec<ColumnDescription> {
    match outcome {
        ExecOutcome::Rows { columns, .. } => columns
            .iter()
            .map(|c| {
                let (oid, typmod) = crate::gateway::iris::map_iris_type(&c.iris_type, None, None, None);
                let mut desc = ColumnDescription::new(c.name.clone(), oid);
                desc.type_mod = typmod;
                desc
            })
            .collect(),
        ExecOutcome::Affected(_) => Vec::new(),
    }
}

fn render_bound_outcome(outcome: ExecOutcome) -> Messages {
    let columns = columns_of(&outcome);
    let mut rows = Rows::from_outcome(outcome);
    if columns.is_empty() {
        let affected = rows.affected();
        let mut mb = MessageBuilder::new(Tag::COMMAND_COMPLETE);
        mb.write_str(&command_tag(affected));
        return mb.finish();
    }

    let mut mb = MessageBuilder::new(Tag::ROW_DESCRIPTION);
    write_row_description_body(&mut mb, &columns);
    let mut count = 0i64;
    while rows.next() {
        write_data_row(&mut mb, rows.row(), &columns);
        count += 1;
    }
    mb.add_new(Tag::COMMAND_COMPLETE);
    mb.write_str(&command_tag(count));
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

fn command_tag(affected: i64) -> String {
    format!("SELECT {}", affected.max(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::config::{CredentialSource, Iris, Pool as PoolConfig};
    use crate::gateway::iris::{ConnectionPool, Connector, IrisBackend, StatementHandle};
    use crate::gateway::sql::TranslationCache;
    use std::sync::Arc;

    struct EchoBackend;
    impl IrisBackend for EchoBackend {
        fn exec(&mut self, _sql: &str) -> Result<ExecOutcome> {
            Ok(ExecOutcome::Affected(1))
        }
        fn prepare(&mut self, _sql: &str) -> Result<StatementHandle> {
            Ok(StatementHandle(7))
        }
        fn bind_exec(&mut self, _stmt: &StatementHandle, _params: &[Value]) -> Result<ExecOutcome> {
            Ok(ExecOutcome::Affected(1))
        }
        fn close_statement(&mut self, _stmt: StatementHandle) -> Result<()> {
            Ok(())
        }
        fn cancel(&mut self) -> Result<()> {
            Ok(())
        }
        fn ping(&mut self) -> bool {
            true
        }
    }

    struct EchoConnector;
    impl Connector for EchoConnector {
        fn connect(&self, _h: &str, _p: u16, _n: &str, _u: &str, _pw: &str) -> Result<Box<dyn IrisBackend>> {
            Ok(Box::new(EchoBackend))
        }
    }

    struct SelectBackend;
    impl IrisBackend for SelectBackend {
        fn exec(&mut self, _sql: &str) -> Result<ExecOutcome> {
            unreachable!("extended protocol always prepares first")
        }
        fn prepare(&mut self, _sql: &str) -> Result<StatementHandle> {
            Ok(StatementHandle(9))
        }
        fn bind_exec(&mut self, _stmt: &StatementHandle, _params: &[Value]) -> Result<ExecOutcome> {
            Ok(ExecOutcome::Rows {
                columns: vec![crate::gateway::iris::ColumnMeta {
                    name: "id".into(),
                    iris_type: "INTEGER".into(),
                    not_null: true,
                    has_default: false,
                    type_mod: -1,
                }],
                rows: vec![vec![Value::Int4(1)]],
            })
        }
        fn close_statement(&mut self, _stmt: StatementHandle) -> Result<()> {
            Ok(())
        }
        fn cancel(&mut self) -> Result<()> {
            Ok(())
        }
        fn ping(&mut self) -> bool {
            true
        }
    }

    struct SelectConnector;
    impl Connector for SelectConnector {
        fn connect(&self, _h: &str, _p: u16, _n: &str, _u: &str, _pw: &str) -> Result<Box<dyn IrisBackend>> {
            Ok(Box::new(SelectBackend))
        }
    }

    fn test_session() -> Session {
        let iris = Iris {
            host: "localhost".into(),
            port: 1972,
            namespace: "USER".into(),
            user: "svc".into(),
            password: "pw".into(),
            credential_source: CredentialSource::Password,
            oauth_client_id: None,
        };
        let pool = ConnectionPool::new(Arc::new(EchoConnector), iris, PoolConfig::default());
        let cache = Arc::new(TranslationCache::new(64));
        let mut s = Session::new(pool, cache, "svc".into(), "USER".into(), 1, 42);
        s.state = SessionState::Idle;
        s
    }

    #[test]
    fn parse_registers_statement() {
        let mut s = test_session();
        s.parse("s1", "insert into t values ($1)", vec![23]).unwrap();
        assert!(s.prepared.contains_key("s1"));
    }

    #[test]
    fn bind_requires_known_statement() {
        let mut s = test_session();
        assert!(s.bind("p1", "missing", vec![], vec![]).is_err());
    }

    #[tokio::test]
    async fn execute_runs_bound_statement() {
        let mut s = test_session();
        s.parse("s1", "insert into t values ($1)", vec![23]).unwrap();
        s.bind("p1", "s1", vec![Value::Int4(1)], vec![false]).unwrap();
        let messages = s.execute("p1", 0).await.unwrap();
        assert!(!messages.is_empty());
    }

    #[test]
    fn close_is_idempotent_on_unknown_name() {
        let mut s = test_session();
        let _ = s.close(Close { kind: CloseKind::Portal, name: "nope".into() });
    }

    #[tokio::test]
    async fn describe_portal_reports_row_description_for_select() {
        let iris = Iris {
            host: "localhost".into(),
            port: 1972,
            namespace: "USER".into(),
            user: "svc".into(),
            password: "pw".into(),
            credential_source: CredentialSource::Password,
            oauth_client_id: None,
        };
        let pool = ConnectionPool::new(Arc::new(SelectConnector), iris, PoolConfig::default());
        let cache = Arc::new(TranslationCache::new(64));
        let mut s = Session::new(pool, cache, "svc".into(), "USER".into(), 1, 42);
        s.state = SessionState::Idle;

        s.parse("s1", "select id from t", vec![]).unwrap();
        s.bind("p1", "s1", vec![], vec![false]).unwrap();
        let messages = s.describe(Describe { kind: DescribeKind::Portal, name: "p1".into() }).await.unwrap();
        assert_eq!(messages.first().unwrap().tag(), Tag::ROW_DESCRIPTION);
        assert!(s.portals.get("p1").unwrap().cached_outcome.is_some());

        // Execute consumes the cached outcome instead of running the
        // statement a second time.
        let exec_messages = s.execute("p1", 0).await.unwrap();
        assert!(!exec_messages.is_empty());
        assert!(s.portals.get("p1").unwrap().cached_outcome.is_none());
    }

    #[tokio::test]
    async fn describe_portal_reports_no_data_for_insert() {
        let mut s = test_session();
        s.parse("s1", "insert into t values ($1)", vec![23]).unwrap();
        s.bind("p1", "s1", vec![Value::Int4(1)], vec![false]).unwrap();
        let messages = s.describe(Describe { kind: DescribeKind::Portal, name: "p1".into() }).await.unwrap();
        assert_eq!(messages.first().unwrap().tag(), Tag::NO_DATA);
    }
}
