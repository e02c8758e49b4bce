use async_trait::async_trait;
use log::warn;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::exec::{Task, TaskContext};
use crate::internal_err;
use crate::row::Row;
use crate::sql::eval::eval_predicate;
use crate::sql::node::Node;

/// Drops rows whose predicate does not evaluate to TRUE.
///
/// NULL predicates drop the row, matching SQL WHERE semantics. A row
/// that fails to evaluate at all is logged and dropped rather than
/// failing the whole job, so one malformed row cannot sink a stream.
pub struct Filter {
    expr: Node,
}

impl Filter {
    pub fn new(expr: Node) -> Self {
        Filter { expr }
    }
}

#[async_trait]
impl Task for Filter {
    fn name(&self) -> &'static str {
        "Filter"
    }

    fn describe(&self) -> String {
        format!("Filter({})", self.expr)
    }

    async fn run(
        self: Box<Self>,
        _ctx: TaskContext,
        input: Option<mpsc::Receiver<Row>>,
        out: mpsc::Sender<Row>,
    ) -> Result<()> {
        let mut input = input.ok_or_else(|| internal_err!("Filter requires an input stream"))?;
        while let Some(row) = input.recv().await {
            match eval_predicate(&self.expr, &row) {
                Ok(true) => {
                    if out.send(row).await.is_err() {
                        return Ok(());
                    }
                }
                Ok(false) => continue,
                Err(err) => {
                    warn!("filter dropped row: {}", err);
                    continue;
                }
            }
        }
        Ok(())
    }
}
