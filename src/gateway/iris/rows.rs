//! Row-stream and affected-row interfaces handed to the session layer,
//! iterating the `Value` rows an [`IrisBackend`] already decoded rather
//! than raw DataRow/CommandComplete wire messages.

use crate::gateway::common::{Error, Result};
use crate::gateway::protocol::types::Value;

use super::backend::{ColumnMeta, ExecOutcome};

const FIELD_INDEX_OUT_OF_RANGE: &str = "field index out of range";

/// A materialized or streamed IRIS result set. Backends that can't stream
/// incrementally just hand back all rows at once; `next()` still drains
/// them one at a time so session code doesn't need to know the difference.
pub struct Rows {
    pub columns: Vec<ColumnMeta>,
    remaining: std::vec::IntoIter<Vec<Value>>,
    cur: Vec<Value>,
    affected: i64,
}

impl Rows {
    pub fn from_outcome(outcome: ExecOutcome) -> Self {
        match outcome {
            ExecOutcome::Rows { columns, rows } => Self {
                columns,
                remaining: rows.into_iter(),
                cur: Vec::new(),
                affected: -1,
            },
            ExecOutcome::Affected(n) => Self {
                columns: Vec::new(),
                remaining: Vec::new().into_iter(),
                cur: Vec::new(),
                affected: n,
            },
        }
    }

    /// Advances to the next row. Returns `false` once exhausted, at which
    /// point `affected()` reports the final row count (for a SELECT this
    /// is the number of rows streamed).
    pub fn next(&mut self) -> bool {
        match self.remaining.next() {
            Some(row) => {
                if self.affected < 0 {
                    self.affected = 0;
                }
                self.affected += 1;
                self.cur = row;
                true
            }
            None => false,
        }
    }

    /// Panics if `next()` has not yet returned `false` (mirrors the
    /// teacher's `Rows::affected` contract).
    pub fn affected(&self) -> i64 {
        assert!(self.affected >= 0, "affected() called before exhausting the result set");
        self.affected
    }

    pub fn get(&self, i: usize) -> Result<&Value> {
        self.cur.get(i).ok_or_else(|| Error::new(FIELD_INDEX_OUT_OF_RANGE))
    }

    pub fn row(&self) -> &[Value] {
        &self.cur
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iterates_rows_and_reports_affected() {
        let outcome = ExecOutcome::Rows {
            columns: vec![ColumnMeta { name: "id".into(), iris_type: "INTEGER".into(), not_null: true, has_default: false, type_mod: -1 }],
            rows: vec![vec![Value::Int4(1)], vec![Value::Int4(2)]],
        };
        let mut rows = Rows::from_outcome(outcome);
        assert!(rows.next());
        assert!(matches!(rows.get(0).unwrap(), Value::Int4(1)));
        assert!(rows.next());
        assert!(!rows.next());
        assert_eq!(rows.affected(), 2);
    }

    #[test]
    fn affected_only_result_has_no_rows() {
        let mut rows = Rows::from_outcome(ExecOutcome::Affected(5));
        assert!(!rows.next());
        assert_eq!(rows.affected(), 5);
    }
}
