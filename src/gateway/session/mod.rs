//! Client-facing protocol state machine. One [`Session`] exists per
//! accepted connection: it owns that connection's prepared-statement and
//! portal maps, tracks transaction state across simple- and
//! extended-query messages, and drives a leased backend connection from
//! the [`crate::gateway::iris::ConnectionPool`], leasing per statement
//! batch and returning the lease as soon as a transaction ends rather
//! than pinning one backend connection for the client's whole lifetime.

mod copy;
mod extended;
mod simple;

use std::collections::HashMap;
use std::sync::Arc;

use crate::gateway::common::{Error, Result};
use crate::gateway::iris::{ConnectionPool, Lease};
use crate::gateway::protocol::types::Value;
use crate::gateway::protocol::Messages;
use crate::gateway::sql::{QueryType, Translated, TranslationCache, Translator};

pub use copy::CopySpec;
pub use extended::{Close, CloseKind, Describe, DescribeKind};

/// Where this connection is in the startup/auth/query lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Startup,
    Authenticating,
    Idle,
    InTransaction,
    FailedTransaction,
    CopyIn,
    CopyOut,
    Terminating,
}

/// A statement registered by `Parse`, holding the already-translated SQL
/// so repeated `Bind`/`Execute` pairs never re-translate it.
pub struct PreparedStatement {
    pub translated: Translated,
    pub param_type_oids: Vec<i32>,
}

/// A portal bound by `Bind`, ready for `Execute`. `cached_outcome` holds a
/// result already fetched by a `Describe` that had to run the statement to
/// learn its row shape (see [`extended::describe`]), so `Execute` doesn't
/// run it twice.
pub struct Portal {
    pub statement_name: String,
    pub params: Vec<Value>,
    pub result_format_binary: Vec<bool>,
    pub cached_outcome: Option<crate::gateway::iris::ExecOutcome>,
}

pub struct Session {
    pub state: SessionState,
    pub user: String,
    pub database: String,
    pub process_id: u32,
    pub secret_key: u32,
    pool: Arc<ConnectionPool>,
    cache: Arc<TranslationCache>,
    translator: Translator,
    lease: Option<Lease>,
    prepared: HashMap<String, PreparedStatement>,
    portals: HashMap<String, Portal>,
}

impl Session {
    pub fn new(
        pool: Arc<ConnectionPool>,
        cache: Arc<TranslationCache>,
        user: String,
        database: String,
        process_id: u32,
        secret_key: u32,
    ) -> Self {
        Self {
            state: SessionState::Startup,
            user,
            database,
            process_id,
            secret_key,
            pool,
            cache,
            translator: Translator::new(),
            lease: None,
            prepared: HashMap::new(),
            portals: HashMap::new(),
        }
    }

    fn translate(&self, sql: &str) -> Translated {
        self.cache.get_or_translate(sql, &self.translator)
    }

    /// Leases a backend connection if this session doesn't already hold
    /// one. A lease is held for the duration of an open transaction and
    /// released as soon as it ends; outside a transaction it's leased per
    /// statement and released immediately after.
    async fn ensure_lease(&mut self) -> Result<&mut Lease> {
        if self.lease.is_none() {
            self.lease = Some(self.pool.acquire().await?);
        }
        Ok(self.lease.as_mut().unwrap())
    }

    /// Releases the held lease back to the pool, if any. Called once a
    /// transaction commits, rolls back, or a standalone statement outside
    /// a transaction block finishes.
    fn release_lease_if_idle(&mut self) {
        if !matches!(self.state, SessionState::InTransaction | SessionState::CopyIn | SessionState::CopyOut) {
            self.lease = None;
        }
    }

    fn mark_lease_unhealthy(&mut self) {
        if let Some(lease) = self.lease.as_mut() {
            lease.mark_unhealthy();
        }
    }

    /// Applies the transaction bookkeeping done before dispatching a
    /// statement: `BEGIN` opens a transaction, `COMMIT`/`ROLLBACK` close
    /// one, and once a transaction
    /// has failed only `ROLLBACK` (or `ROLLBACK TO SAVEPOINT`) is allowed
    /// through — anything else is rejected without ever reaching IRIS.
    fn admit(&mut self, query_type: QueryType) -> Result<()> {
        match self.state {
            SessionState::FailedTransaction => {
                if matches!(query_type, QueryType::Rollback | QueryType::RollbackSavepoint) {
                    Ok(())
                } else {
                    Err(Error::protocol_error(
                        "current transaction is aborted, commands ignored until end of transaction block",
                    ))
                }
            }
            SessionState::Idle | SessionState::InTransaction => Ok(()),
            other => Err(Error::protocol_error(format!("statement not allowed in state {:?}", other))),
        }
    }

    /// Updates `state` after a statement completed successfully against
    /// IRIS, based on its transaction-control classification.
    fn advance(&mut self, query_type: QueryType) {
        match query_type {
            QueryType::Begin => self.state = SessionState::InTransaction,
            QueryType::Commit | QueryType::Rollback => {
                self.state = SessionState::Idle;
                self.release_lease_if_idle();
            }
            _ if self.state == SessionState::Idle => {
                // Implicit single-statement transaction: nothing to carry forward.
            }
            _ => {}
        }
    }

    fn fail(&mut self) {
        if self.state == SessionState::InTransaction {
            self.state = SessionState::FailedTransaction;
        }
    }

    /// Builds a `ReadyForQuery` message reflecting the current transaction
    /// status byte (`'T'`/`'E'`/`'I'`). Every top-level response to a
    /// frontend `Query` message ends with one of these.
    pub fn ready_for_query(&self) -> Messages {
        use crate::gateway::protocol::{MessageBuilder, Tag};
        let status = match self.state {
            SessionState::InTransaction => b'T',
            SessionState::FailedTransaction => b'E',
            _ => b'I',
        };
        let mut mb = MessageBuilder::new(Tag::READY_FOR_QUERY);
        mb.write_byte(status);
        mb.finish()
    }

    pub fn close_portal(&mut self, name: &str) {
        self.portals.remove(name);
    }

    pub fn close_statement(&mut self, name: &str) {
        self.prepared.remove(name);
    }

    /// Best-effort cancellation of whatever statement is currently leasing
    /// a backend connection, requested via a `CancelRequest` on a separate
    /// connection matching this session's `(process_id, secret_key)`. Since
    /// statement execution runs synchronously on this session's task (see
    /// `gateway::server::connection`), this can only interrupt IRIS-side
    /// work still in flight when the backend driver itself supports
    /// out-of-band cancellation; `IrisBackend::cancel` documents this as
    /// allowed to be a no-op.
    pub fn request_cancel(&mut self) {
        if let Some(lease) = self.lease.as_mut() {
            let _ = lease.backend().cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::config::{CredentialSource, Iris, Pool as PoolConfig};
    use crate::gateway::iris::{Connector, ExecOutcome, IrisBackend, StatementHandle};

    struct NoopBackend;
    impl IrisBackend for NoopBackend {
        fn exec(&mut self, _sql: &str) -> Result<ExecOutcome> {
            Ok(ExecOutcome::Affected(0))
        }
        fn prepare(&mut self, _sql: &str) -> Result<StatementHandle> {
            Ok(StatementHandle(1))
        }
        fn bind_exec(&mut self, _stmt: &StatementHandle, _params: &[Value]) -> Result<ExecOutcome> {
            Ok(ExecOutcome::Affected(0))
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

    struct NoopConnector;
    impl Connector for NoopConnector {
        fn connect(&self, _h: &str, _p: u16, _n: &str, _u: &str, _pw: &str) -> Result<Box<dyn IrisBackend>> {
            Ok(Box::new(NoopBackend))
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
        let pool = ConnectionPool::new(Arc::new(NoopConnector), iris, PoolConfig::default());
        let cache = Arc::new(TranslationCache::new(64));
        let mut s = Session::new(pool, cache, "svc".into(), "USER".into(), 1, 42);
        s.state = SessionState::Idle;
        s
    }

    #[test]
    fn begin_transitions_to_in_transaction() {
        let mut s = test_session();
        assert!(s.admit(QueryType::Begin).is_ok());
        s.advance(QueryType::Begin);
        assert_eq!(s.state, SessionState::InTransaction);
    }

    #[test]
    fn failed_transaction_only_admits_rollback() {
        let mut s = test_session();
        s.state = SessionState::FailedTransaction;
        assert!(s.admit(QueryType::Select).is_err());
        assert!(s.admit(QueryType::Rollback).is_ok());
    }

    #[test]
    fn commit_returns_to_idle() {
        let mut s = test_session();
        s.state = SessionState::InTransaction;
        s.advance(QueryType::Commit);
        assert_eq!(s.state, SessionState::Idle);
    }

    #[test]
    fn failing_statement_inside_transaction_marks_it_failed() {
        let mut s = test_session();
        s.state = SessionState::InTransaction;
        s.fail();
        assert_eq!(s.state, SessionState::FailedTransaction);
    }
}
