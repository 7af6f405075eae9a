//! The IRIS PostgreSQL-wire gateway: accepts Postgres wire protocol
//! connections, translates client SQL to IRIS SQL, and proxies results
//! back over the same connection.

pub mod common;
pub mod config;
pub mod iris;
pub mod protocol;
pub mod server;
pub mod session;
pub mod sql;
