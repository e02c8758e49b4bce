use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::exec::{Task, TaskContext};
use crate::internal_err;
use crate::row::{Columns, Row};
use crate::sql::eval::eval;
use crate::sql::stmt::{Column, SqlSelect};
use crate::value::Value;

/// Reshapes each row to the selected column list, evaluating
/// expressions and applying output aliases. `SELECT *` passes rows
/// through with their source layout.
pub struct Projection {
    star: bool,
    columns: Vec<Column>,
}

impl Projection {
    pub fn from_select(stmt: &SqlSelect) -> Projection {
        Projection { star: stmt.star, columns: stmt.columns.clone() }
    }

    fn layout(&self) -> Columns {
        let names: Vec<String> = self.columns.iter().map(|c| c.as_name()).collect();
        Arc::new(names)
    }

    fn project(&self, columns: &Columns, row: &Row) -> Result<Row> {
        let mut values = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let value = match &column.expr {
                Some(expr) => eval(expr, row)?,
                None => row.get(&column.source_field).cloned().unwrap_or(Value::Null),
            };
            values.push(value);
        }
        Row::new(Arc::clone(columns), values)
    }
}

#[async_trait]
impl Task for Projection {
    fn name(&self) -> &'static str {
        "Projection"
    }

    fn describe(&self) -> String {
        if self.star {
            return "Projection(*)".to_string();
        }
        let columns: Vec<String> = self.columns.iter().map(|c| c.to_string()).collect();
        format!("Projection({})", columns.join(", "))
    }

    async fn run(
        self: Box<Self>,
        _ctx: TaskContext,
        input: Option<mpsc::Receiver<Row>>,
        out: mpsc::Sender<Row>,
    ) -> Result<()> {
        let mut input =
            input.ok_or_else(|| internal_err!("Projection requires an input stream"))?;
        if self.star {
            while let Some(row) = input.recv().await {
                if out.send(row).await.is_err() {
                    return Ok(());
                }
            }
            return Ok(());
        }
        let columns = self.layout();
        while let Some(row) = input.recv().await {
            let projected = self.project(&columns, &row)?;
            if out.send(projected).await.is_err() {
                return Ok(());
            }
        }
        Ok(())
    }
}
