//! Synthesizes PostgreSQL catalog result sets (`pg_class`, `pg_namespace`,
//! `pg_attribute`, `pg_type`, ...) from IRIS's `INFORMATION_SCHEMA`, since
//! IRIS has no compatible system catalog of its own. OIDs are deterministic
//! hashes of `(schema, name)` rather than IRIS-assigned IDs, so the same
//! object gets the same OID on every probe within a session.

use fnv::FnvHasher;
use std::hash::{Hash, Hasher};

use crate::gateway::common::Result;
use crate::gateway::protocol::types::{self, Value};

use super::backend::IrisBackend;

/// Synthetic OIDs start above the real low-numbered system OID range so
/// they never collide with genuine PostgreSQL catalog entries a client
/// might have cached (e.g. from `pg_type` for built-in types).
const SYNTHETIC_OID_BASE: u32 = 50_000;

/// A stable OID for `(schema, name)`, reproducible across probes in the
/// same session (and across sessions, since the hash is pure).
pub fn synthetic_oid(schema: &str, name: &str) -> i32 {
    let mut hasher = FnvHasher::default();
    schema.hash(&mut hasher);
    0u8.hash(&mut hasher); // separator so ("ab","c") != ("a","bc")
    name.hash(&mut hasher);
    let h = hasher.finish() as u32;
    (SYNTHETIC_OID_BASE.wrapping_add(h % (i32::MAX as u32 - SYNTHETIC_OID_BASE))) as i32
}

/// Which closed-set catalog relation or function a statement references,
/// as classified by the translator before execution.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Probe {
    PgClass,
    PgNamespace,
    PgAttribute,
    PgType,
    PgIndex,
    PgProc,
    PgDescription,
    InformationSchema,
}

const PROBE_TABLES: &[(&str, Probe)] = &[
    ("PG_CLASS", Probe::PgClass),
    ("PG_NAMESPACE", Probe::PgNamespace),
    ("PG_ATTRIBUTE", Probe::PgAttribute),
    ("PG_TYPE", Probe::PgType),
    ("PG_INDEX", Probe::PgIndex),
    ("PG_PROC", Probe::PgProc),
    ("PG_DESCRIPTION", Probe::PgDescription),
    ("INFORMATION_SCHEMA.", Probe::InformationSchema),
];

/// Detects whether an already-normalized (uppercased) statement references
/// one of the closed set of catalog relations. Statements not on this list
/// fall through to direct execution against IRIS.
pub fn detect(normalized_sql: &str) -> Option<Probe> {
    PROBE_TABLES.iter().find(|(needle, _)| normalized_sql.contains(needle)).map(|(_, probe)| *probe)
}

/// Maps an IRIS column type name (as reported by `INFORMATION_SCHEMA.COLUMNS.DATA_TYPE`)
/// to a PostgreSQL type OID and typmod, per the gateway's type table.
pub fn map_iris_type(iris_type: &str, length: Option<i32>, precision: Option<i32>, scale: Option<i32>) -> (i32, i32) {
    match iris_type.to_ascii_uppercase().as_str() {
        "INTEGER" | "INT" => (types::INT4, -1),
        "BIGINT" => (types::INT8, -1),
        "SMALLINT" | "TINYINT" => (types::INT2, -1),
        "VARCHAR" | "VARCHAR2" => (types::VARCHAR, length.map(|l| l + 4).unwrap_or(-1)),
        "CHAR" => (1042, length.map(|l| l + 4).unwrap_or(-1)),
        "NUMERIC" | "DECIMAL" => {
            let typmod = match (precision, scale) {
                (Some(p), Some(s)) => ((p << 16) | s) + 4,
                _ => -1,
            };
            (types::NUMERIC, typmod)
        }
        "DOUBLE" | "FLOAT" => (types::FLOAT8, -1),
        "REAL" => (types::FLOAT4, -1),
        "DATE" => (types::DATE, -1),
        "TIME" => (types::TIME, -1),
        "TIMESTAMP" => (types::TIMESTAMP, -1),
        "BIT" | "BOOLEAN" => (types::BOOL, -1),
        "LONGVARCHAR" | "TEXT" => (types::TEXT, -1),
        "VARBINARY" | "BLOB" | "LONGVARBINARY" => (types::BYTEA, -1),
        "VECTOR" => (crate::gateway::config::config().vector.oid, -1),
        _ => (types::TEXT, -1),
    }
}

/// One synthesized catalog row, paired with its column names so the
/// session layer can build a matching RowDescription.
pub struct SynthesizedRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Builds the `pg_namespace` result set from IRIS's schema list.
pub fn synthesize_pg_namespace(backend: &mut dyn IrisBackend) -> Result<SynthesizedRows> {
    let outcome = backend.exec("SELECT SCHEMA_NAME FROM INFORMATION_SCHEMA.SCHEMATA")?;
    let mut rows = Vec::new();
    if let super::backend::ExecOutcome::Rows { rows: raw, .. } = outcome {
        for row in raw {
            if let Some(Value::Text(schema)) = row.into_iter().next() {
                let oid = synthetic_oid(&schema, "");
                rows.push(vec![Value::Int4(oid), Value::Text(schema)]);
            }
        }
    }
    Ok(SynthesizedRows { columns: vec!["oid".into(), "nspname".into()], rows })
}

/// Builds the `pg_class` result set (tables only, `relkind = 'r'`) from
/// IRIS's table list.
pub fn synthesize_pg_class(backend: &mut dyn IrisBackend) -> Result<SynthesizedRows> {
    let outcome = backend.exec(
        "SELECT TABLE_SCHEMA, TABLE_NAME FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_TYPE = 'BASE TABLE'",
    )?;
    let mut rows = Vec::new();
    if let super::backend::ExecOutcome::Rows { rows: raw, .. } = outcome {
        for row in raw {
            let mut it = row.into_iter();
            if let (Some(Value::Text(schema)), Some(Value::Text(name))) = (it.next(), it.next()) {
                let oid = synthetic_oid(&schema, &name);
                let ns_oid = synthetic_oid(&schema, "");
                rows.push(vec![
                    Value::Int4(oid),
                    Value::Text(name),
                    Value::Int4(ns_oid),
                    Value::Text("r".to_string()),
                ]);
            }
        }
    }
    Ok(SynthesizedRows { columns: vec!["oid".into(), "relname".into(), "relnamespace".into(), "relkind".into()], rows })
}

/// Builds the `pg_attribute` result set from IRIS's column list.
pub fn synthesize_pg_attribute(backend: &mut dyn IrisBackend) -> Result<SynthesizedRows> {
    let outcome = backend.exec(
        "SELECT TABLE_SCHEMA, TABLE_NAME, COLUMN_NAME, ORDINAL_POSITION, DATA_TYPE, \
         CHARACTER_MAXIMUM_LENGTH, NUMERIC_PRECISION, NUMERIC_SCALE, IS_NULLABLE \
         FROM INFORMATION_SCHEMA.COLUMNS",
    )?;
    let mut rows = Vec::new();
    if let super::backend::ExecOutcome::Rows { rows: raw, .. } = outcome {
        for row in raw {
            let mut it = row.into_iter();
            let schema = it.next();
            let table = it.next();
            let column = it.next();
            let attnum = it.next();
            let data_type = it.next();
            let length = it.next();
            let precision = it.next();
            let scale = it.next();
            let nullable = it.next();
            if let (Some(Value::Text(schema)), Some(Value::Text(table)), Some(Value::Text(column))) =
                (schema, table, column)
            {
                let table_oid = synthetic_oid(&schema, &table);
                let iris_type = match data_type {
                    Some(Value::Text(t)) => t,
                    _ => "TEXT".to_string(),
                };
                let length = as_opt_i32(length);
                let precision = as_opt_i32(precision);
                let scale = as_opt_i32(scale);
                let (type_oid, typmod) = map_iris_type(&iris_type, length, precision, scale);
                let not_null = matches!(nullable, Some(Value::Text(ref s)) if s.eq_ignore_ascii_case("NO"));
                rows.push(vec![
                    Value::Int4(table_oid),
                    Value::Text(column),
                    Value::Int4(type_oid),
                    as_value(attnum),
                    Value::Int4(typmod),
                    Value::Bool(not_null),
                ]);
            }
        }
    }
    Ok(SynthesizedRows {
        columns: vec![
            "attrelid".into(),
            "attname".into(),
            "atttypid".into(),
            "attnum".into(),
            "atttypmod".into(),
            "attnotnull".into(),
        ],
        rows,
    })
}

fn as_opt_i32(v: Option<Value>) -> Option<i32> {
    match v {
        Some(Value::Int4(i)) => Some(i),
        Some(Value::Int8(i)) => Some(i as i32),
        Some(Value::Text(s)) => s.parse().ok(),
        _ => None,
    }
}

fn as_value(v: Option<Value>) -> Value {
    v.unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_oid_is_deterministic() {
        assert_eq!(synthetic_oid("SQLUser", "Foo"), synthetic_oid("SQLUser", "Foo"));
    }

    #[test]
    fn synthetic_oid_distinguishes_schema_boundary() {
        assert_ne!(synthetic_oid("ab", "c"), synthetic_oid("a", "bc"));
    }

    #[test]
    fn synthetic_oid_is_above_system_range() {
        assert!(synthetic_oid("SQLUser", "Foo") as u32 >= SYNTHETIC_OID_BASE);
    }

    #[test]
    fn detects_pg_class_probe() {
        assert_eq!(detect("SELECT * FROM PG_CLASS"), Some(Probe::PgClass));
    }

    #[test]
    fn detects_information_schema_probe() {
        assert_eq!(detect("SELECT * FROM INFORMATION_SCHEMA.TABLES"), Some(Probe::InformationSchema));
    }

    #[test]
    fn non_catalog_statement_is_not_detected() {
        assert_eq!(detect("SELECT * FROM ORDERS"), None);
    }

    #[test]
    fn maps_varchar_typmod() {
        let (oid, typmod) = map_iris_type("VARCHAR", Some(50), None, None);
        assert_eq!(oid, types::VARCHAR);
        assert_eq!(typmod, 54);
    }
}
