//! Static in-memory source: one table, a fixed set of rows. The
//! simplest complete backend, and the fixture behind most of the
//! engine's own tests.

use std::sync::Arc;

use crate::error::Result;
use crate::row::columns_from;
use crate::row::Row;
use crate::source::DataSource;
use crate::source::RowIter;
use crate::source::Scanner;
use crate::source::SourceConn;
use crate::sql::eval::eval_predicate;
use crate::sql::node::Node;
use crate::value::Value;
use crate::value_err;

pub struct MemSource {
    table: String,
    rows: Arc<Vec<Row>>,
}

impl MemSource {
    pub fn new<S: Into<String>>(
        table: impl Into<String>,
        columns: Vec<S>,
        values: Vec<Vec<Value>>,
    ) -> Result<MemSource> {
        let columns = columns_from(columns);
        let rows = values
            .into_iter()
            .map(|row| Row::new(Arc::clone(&columns), row))
            .collect::<Result<Vec<_>>>()?;
        Ok(MemSource { table: table.into(), rows: Arc::new(rows) })
    }

    /// Three-user `users` table shared across the test suite.
    pub fn sample() -> MemSource {
        MemSource::new(
            "users",
            vec!["id", "name", "age", "active"],
            vec![
                vec![1i64.into(), "alice".into(), 32i64.into(), true.into()],
                vec![2i64.into(), "bob".into(), 21i64.into(), true.into()],
                vec![3i64.into(), "carol".into(), 17i64.into(), false.into()],
            ],
        )
        .unwrap()
    }

    /// `orders` table joining onto [`MemSource::sample`] by `user_id`.
    /// One order references no user, so inner joins drop it.
    pub fn sample_orders() -> MemSource {
        MemSource::new(
            "orders",
            vec!["id", "user_id", "total"],
            vec![
                vec![1i64.into(), 1i64.into(), 9.5f64.into()],
                vec![2i64.into(), 1i64.into(), 3.5f64.into()],
                vec![3i64.into(), 2i64.into(), 12.25f64.into()],
                vec![4i64.into(), 9i64.into(), 1.5f64.into()],
            ],
        )
        .unwrap()
    }
}

fn scan_rows(rows: &Arc<Vec<Row>>, filter: Option<&Node>) -> Result<RowIter> {
    let rows = Arc::clone(rows);
    let filter = filter.cloned();
    let iter = (0..rows.len()).filter_map(move |i| {
        let row = rows[i].clone();
        match &filter {
            None => Some(Ok(row)),
            Some(expr) => match eval_predicate(expr, &row) {
                Ok(true) => Some(Ok(row)),
                Ok(false) => None,
                Err(err) => Some(Err(err)),
            },
        }
    });
    Ok(Box::new(iter))
}

impl DataSource for MemSource {
    fn tables(&self) -> Vec<String> {
        vec![self.table.clone()]
    }

    fn open(&self, conn_info: &str) -> Result<Box<dyn SourceConn>> {
        if !conn_info.eq_ignore_ascii_case(&self.table) {
            return Err(value_err!("unknown table {}", conn_info));
        }
        Ok(Box::new(MemConn { rows: Arc::clone(&self.rows) }))
    }

    fn as_scanner(&self) -> Option<&dyn Scanner> {
        Some(self)
    }
}

impl Scanner for MemSource {
    fn create_iterator(&self, filter: Option<&Node>) -> Result<RowIter> {
        scan_rows(&self.rows, filter)
    }
}

pub struct MemConn {
    rows: Arc<Vec<Row>>,
}

impl SourceConn for MemConn {
    fn as_scanner(&self) -> Option<&dyn Scanner> {
        Some(self)
    }
}

impl Scanner for MemConn {
    fn create_iterator(&self, filter: Option<&Node>) -> Result<RowIter> {
        scan_rows(&self.rows, filter)
    }
}
