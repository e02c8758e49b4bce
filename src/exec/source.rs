//! Producing stages: `Source` streams one table, `SourceJoin` streams
//! the hash-joined rows of exactly two.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::exec::Task;
use crate::exec::TaskContext;
use crate::plan_err;
use crate::row::Row;
use crate::source::stream;
use crate::source::Scanner;
use crate::source::SourceConn;
use crate::sql::eval::eval;
use crate::sql::node::Node;
use crate::sql::stmt::SqlSource;
use crate::value::Value;

/// Streams one table through the backend's scanner, pre-filtered by
/// whatever the rewrite offered the backend.
pub struct Source {
    from: SqlSource,
    conn: Box<dyn SourceConn>,
}

impl Source {
    pub fn new(from: SqlSource, conn: Box<dyn SourceConn>) -> Source {
        Source { from, conn }
    }
}

#[async_trait]
impl Task for Source {
    fn name(&self) -> &'static str {
        "Source"
    }

    fn describe(&self) -> String {
        match &self.from.filter {
            Some(filter) => format!("Source({}, filter: {})", self.from, filter),
            None => format!("Source({})", self.from),
        }
    }

    async fn run(
        self: Box<Self>,
        ctx: TaskContext,
        _input: Option<mpsc::Receiver<Row>>,
        out: mpsc::Sender<Row>,
    ) -> Result<()> {
        let iter =
            scanner(self.conn.as_ref(), &self.from)?.create_iterator(self.from.filter.as_ref())?;
        stream::drive_iter(iter, out, ctx.token).await;
        Ok(())
    }
}

fn scanner<'a>(conn: &'a dyn SourceConn, from: &SqlSource) -> Result<&'a dyn Scanner> {
    conn.as_scanner()
        .ok_or_else(|| plan_err!("source {} must implement scan", from.alias_or_name()))
}

/// Hash equality join over exactly two sources. The fold side is
/// buffered into a hash table keyed by its join-key values; the other
/// side probes and emits one merged row per match. Rows with any NULL
/// key never match.
pub struct SourceJoin {
    left: SqlSource,
    right: SqlSource,
    left_conn: Box<dyn SourceConn>,
    right_conn: Box<dyn SourceConn>,
}

impl SourceJoin {
    pub fn new(
        left: SqlSource,
        left_conn: Box<dyn SourceConn>,
        right: SqlSource,
        right_conn: Box<dyn SourceConn>,
    ) -> SourceJoin {
        SourceJoin { left, right, left_conn, right_conn }
    }
}

#[async_trait]
impl Task for SourceJoin {
    fn name(&self) -> &'static str {
        "SourceJoin"
    }

    fn describe(&self) -> String {
        let keys = |side: &SqlSource| {
            side.join_nodes.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(",")
        };
        format!(
            "SourceJoin({}, {}, keys: {} = {})",
            self.left,
            self.right,
            keys(&self.left),
            keys(&self.right)
        )
    }

    async fn run(
        self: Box<Self>,
        ctx: TaskContext,
        _input: Option<mpsc::Receiver<Row>>,
        out: mpsc::Sender<Row>,
    ) -> Result<()> {
        let mut left_rx = scanner(self.left_conn.as_ref(), &self.left)?
            .row_channel(self.left.filter.as_ref(), ctx.token.clone())?;
        let mut right_rx = scanner(self.right_conn.as_ref(), &self.right)?
            .row_channel(self.right.filter.as_ref(), ctx.token.clone())?;

        // Build phase: buffer the fold side keyed by its join values.
        let mut table: HashMap<Vec<Value>, Vec<Row>> = HashMap::new();
        while let Some(row) = left_rx.recv().await {
            if let Some(key) = join_key(&self.left.join_nodes, &row)? {
                table.entry(key).or_default().push(row);
            }
        }

        // Probe phase: stream the other side against the table.
        let mut merger = Merger::new(&self.left, &self.right);
        while let Some(row) = right_rx.recv().await {
            let key = match join_key(&self.right.join_nodes, &row)? {
                Some(key) => key,
                None => continue,
            };
            if let Some(matches) = table.get(&key) {
                for build in matches {
                    let merged = merger.merge(build, &row)?;
                    if out.send(merged).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }
}

/// Evaluates the side's join-key nodes against the row. `None` means
/// at least one key was NULL and the row joins with nothing.
fn join_key(nodes: &[Node], row: &Row) -> Result<Option<Vec<Value>>> {
    let mut key = Vec::with_capacity(nodes.len());
    for node in nodes {
        let value = eval(node, row)?;
        if value.is_null() {
            return Ok(None);
        }
        key.push(value);
    }
    Ok(Some(key))
}

/// Merges matched build/probe rows under one layout with
/// alias-qualified column names, built once and shared by every
/// emitted row.
struct Merger {
    left_alias: String,
    right_alias: String,
    columns: Option<crate::row::Columns>,
}

impl Merger {
    fn new(left: &SqlSource, right: &SqlSource) -> Merger {
        Merger {
            left_alias: left.alias_or_name().to_string(),
            right_alias: right.alias_or_name().to_string(),
            columns: None,
        }
    }

    fn merge(&mut self, left: &Row, right: &Row) -> Result<Row> {
        let columns = match &self.columns {
            Some(columns) => columns.clone(),
            None => {
                let qualify = |alias: &str, row: &Row| {
                    row.columns()
                        .iter()
                        .map(|c| {
                            if c.contains('.') {
                                c.clone()
                            } else {
                                format!("{}.{}", alias, c)
                            }
                        })
                        .collect::<Vec<_>>()
                };
                let mut names = qualify(&self.left_alias, left);
                names.extend(qualify(&self.right_alias, right));
                let columns = crate::row::Columns::new(names);
                self.columns = Some(columns.clone());
                columns
            }
        };
        let mut values = left.values.clone();
        values.extend(right.values.iter().cloned());
        Row::new(columns, values)
    }
}
