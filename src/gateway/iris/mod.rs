//! The backend executor: pooled IRIS connections, catalog synthesis,
//! row-stream and COPY interfaces, and the credential backends used for
//! both the gateway's own connections and client SCRAM verification.

mod auth;
mod backend;
mod catalog;
mod copy;
mod pool;
mod rows;

pub use auth::{from_config, AuthStrategy, OAuthAuth, WalletAuth};
pub use backend::{ColumnMeta, Connector, ExecOutcome, IrisBackend, StatementHandle};
pub use catalog::{detect as detect_catalog_probe, map_iris_type, synthesize_pg_attribute, synthesize_pg_class, synthesize_pg_namespace, synthetic_oid, Probe, SynthesizedRows};
pub use copy::{CopyFormat, CopyInSink, CopyOutStream};
pub use pool::{ConnectionPool, Lease};
pub use rows::Rows;
