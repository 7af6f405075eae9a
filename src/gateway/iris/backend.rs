//! The blocking interface the gateway needs from whatever concrete IRIS
//! binding a deployment uses (the embedded %Net.Remote API or a native
//! ODBC/JDBC-style driver). Like the credential backends in [`super::auth`],
//! this is treated as an external collaborator: the gateway only needs the
//! shape of the interface, not a concrete driver implementation.

use crate::gateway::common::Result;
use crate::gateway::protocol::types::Value;

/// One IRIS result column's metadata, as reported by the driver.
#[derive(Debug, Clone)]
pub struct ColumnMeta {
    pub name: String,
    pub iris_type: String,
    pub not_null: bool,
    pub has_default: bool,
    pub type_mod: i32,
}

/// The outcome of `exec`/`bind_exec`: either a row-returning result (SELECT)
/// or an affected-row count (INSERT/UPDATE/DELETE/DDL).
pub enum ExecOutcome {
    Rows { columns: Vec<ColumnMeta>, rows: Vec<Vec<Value>> },
    Affected(i64),
}

/// An opaque prepared statement handle, specific to the concrete driver.
pub struct StatementHandle(pub u64);

/// Blocking API to one IRIS session. Implementations wrap whatever native
/// driver handle the deployment uses; every method may block on network or
/// embedded-engine I/O, so the pool always calls these through
/// `tokio::task::spawn_blocking`.
pub trait IrisBackend: Send {
    fn exec(&mut self, sql: &str) -> Result<ExecOutcome>;
    fn prepare(&mut self, sql: &str) -> Result<StatementHandle>;
    fn bind_exec(&mut self, stmt: &StatementHandle, params: &[Value]) -> Result<ExecOutcome>;
    fn close_statement(&mut self, stmt: StatementHandle) -> Result<()>;
    /// Best-effort query cancellation; a no-op is an acceptable implementation.
    fn cancel(&mut self) -> Result<()>;
    /// True if the connection is still usable; used by the pool's health check.
    fn ping(&mut self) -> bool;
}

/// Connects to IRIS and returns a boxed backend. The concrete driver used
/// here is a deployment-time choice (embedded vs. native) external to the
/// gateway, matching spec's "implementer abstracts over whichever of the
/// concrete IRIS bindings the deployment offers".
pub trait Connector: Send + Sync {
    fn connect(&self, host: &str, port: u16, namespace: &str, user: &str, password: &str)
        -> Result<Box<dyn IrisBackend>>;
}
