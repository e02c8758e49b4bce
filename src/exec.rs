use async_trait::async_trait;
use futures::future::join_all;
use log::debug;
use log::error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::Result;
use crate::exec::builder::JobBuilder;
use crate::row::Row;
use crate::source::registry::RuntimeConfig;
use crate::source::stream;
use crate::sql::stmt::Statement;

/// Everything a stage can see of the query it belongs to: an id for
/// log correlation and the token that aborts the whole pipeline.
#[derive(Clone)]
pub struct TaskContext {
    pub query_id: Uuid,
    pub token: CancellationToken,
}

impl TaskContext {
    pub fn new() -> TaskContext {
        TaskContext { query_id: Uuid::new_v4(), token: CancellationToken::new() }
    }
}

impl Default for TaskContext {
    fn default() -> Self {
        TaskContext::new()
    }
}

/// One stage of a query pipeline. A task owns its work exclusively:
/// `run` consumes it, pulls from `input` (absent for producing stages)
/// and pushes to `out`. Dropping `out` is how a stage announces it is
/// done; a send failure means the consumer is gone and is a clean stop,
/// not an error.
#[async_trait]
pub trait Task: Send {
    fn name(&self) -> &'static str;

    /// One-line rendering for plan output and logs.
    fn describe(&self) -> String {
        self.name().to_string()
    }

    async fn run(
        self: Box<Self>,
        ctx: TaskContext,
        input: Option<mpsc::Receiver<Row>>,
        out: mpsc::Sender<Row>,
    ) -> Result<()>;
}

impl std::fmt::Debug for dyn Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Task({})", self.describe())
    }
}

/// Ordered pipeline stages. Insertion order is execution order; rows
/// flow from the first task to the last with no implicit fan-out.
pub type Tasks = Vec<Box<dyn Task>>;

/// Builds the task pipeline for a statement against the given runtime.
pub fn build_job(conf: RuntimeConfig, stmt: &Statement) -> Result<Job> {
    let mut builder = JobBuilder::new(conf);
    let tasks = builder.build(stmt)?;
    Ok(Job::new(tasks))
}

/// A planned query ready to run: the stages plus a fresh context.
pub struct Job {
    ctx: TaskContext,
    tasks: Tasks,
}

impl Job {
    pub fn new(tasks: Tasks) -> Job {
        Job { ctx: TaskContext::new(), tasks }
    }

    pub fn context(&self) -> &TaskContext {
        &self.ctx
    }

    /// Renders the pipeline one stage per line, in execution order.
    pub fn describe(&self) -> String {
        self.tasks.iter().map(|t| t.describe()).collect::<Vec<_>>().join("\n")
    }

    /// Wires stage N's output to stage N+1's input with fresh bounded
    /// queues and spawns every stage. A failing stage is logged and
    /// its queue closes, so downstream stages drain and finish instead
    /// of blocking; the error itself surfaces through the handle.
    pub fn run(self) -> JobHandle {
        let Job { ctx, tasks } = self;
        let token = ctx.token.clone();
        let query_id = ctx.query_id;

        let mut handles = Vec::with_capacity(tasks.len());
        let mut input: Option<mpsc::Receiver<Row>> = None;
        for task in tasks {
            let (tx, rx) = stream::row_channel();
            let stage_input = input.take();
            let ctx = ctx.clone();
            handles.push(tokio::spawn(async move {
                let name = task.name();
                debug!("query {} stage {} started", ctx.query_id, name);
                let query_id = ctx.query_id;
                match task.run(ctx, stage_input, tx).await {
                    Ok(()) => Ok(()),
                    Err(err) => {
                        error!("query {} stage {} failed: {}", query_id, name, err);
                        Err(err)
                    }
                }
            }));
            input = Some(rx);
        }

        // A job with no stages produces an already-closed stream.
        let rx = input.unwrap_or_else(|| {
            let (_, rx) = stream::row_channel();
            rx
        });
        JobHandle { query_id, token, rx, handles }
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Job({})", self.tasks.iter().map(|t| t.name()).collect::<Vec<_>>().join(", "))
    }
}

/// Caller's grip on a running pipeline: the final row queue, the
/// cancellation switch, and the stage handles for error reporting.
pub struct JobHandle {
    query_id: Uuid,
    token: CancellationToken,
    rx: mpsc::Receiver<Row>,
    handles: Vec<JoinHandle<Result<()>>>,
}

impl JobHandle {
    pub fn query_id(&self) -> Uuid {
        self.query_id
    }

    pub async fn recv(&mut self) -> Option<Row> {
        self.rx.recv().await
    }

    /// Fires the query's token. Every producer observes it at its next
    /// await point; queues close behind them.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Drains the pipeline to completion, then surfaces the first
    /// stage error if any stage failed.
    pub async fn collect(mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.rx.recv().await {
            rows.push(row);
        }
        Self::join_stages(self.handles).await?;
        Ok(rows)
    }

    /// Stops consuming and waits for every stage to settle. Dropping
    /// the final receiver first lets producers observe the closed
    /// queue instead of blocking on a full one.
    pub async fn wait(self) -> Result<()> {
        drop(self.rx);
        Self::join_stages(self.handles).await
    }

    /// The final queue as a `Stream`. Stages keep running detached;
    /// dropping the stream closes the queue and they stop on their
    /// next send.
    pub fn into_stream(self) -> ReceiverStream<Row> {
        ReceiverStream::new(self.rx)
    }

    async fn join_stages(handles: Vec<JoinHandle<Result<()>>>) -> Result<()> {
        for result in join_all(handles).await {
            result??;
        }
        Ok(())
    }
}

pub mod builder;
pub mod filter;
pub mod projection;
pub mod source;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::exec::filter::Filter;
    use crate::exec::projection::Projection;
    use crate::exec::source::Source;
    use crate::internal_err;
    use crate::source::mem::MemSource;
    use crate::source::registry::SourceRegistry;
    use crate::sql::node::tests::binary;
    use crate::sql::node::tests::ident;
    use crate::sql::node::tests::number;
    use crate::sql::stmt::Column;
    use crate::sql::stmt::SqlSelect;
    use crate::sql::stmt::SqlSource;
    use crate::sql::token::TokenType;
    use crate::value::Value;

    fn runtime() -> RuntimeConfig {
        let registry = SourceRegistry::new();
        registry.register("userdb", Arc::new(MemSource::sample()));
        RuntimeConfig::new(Arc::new(registry))
    }

    fn source_task(conf: &RuntimeConfig, table: &str) -> Source {
        let conn = conf.conn(table).expect("table registered");
        Source::new(SqlSource::table(0, table), conn)
    }

    #[tokio::test]
    async fn test_job_runs_pipeline_in_order() -> Result<()> {
        let conf = runtime();
        let mut stmt = SqlSelect::new(0);
        stmt.columns = vec![Column::from_expr(0, ident("name"))];

        let tasks: Tasks = vec![
            Box::new(source_task(&conf, "users")),
            Box::new(Filter::new(binary(TokenType::GtEq, ident("age"), number("21")))),
            Box::new(Projection::from_select(&stmt)),
        ];
        let rows = Job::new(tasks).run().collect().await?;

        assert_eq!(2, rows.len());
        assert_eq!(Some(&Value::from("alice")), rows[0].get("name"));
        assert_eq!(Some(&Value::from("bob")), rows[1].get("name"));
        // Projection narrowed the layout to the selected column.
        assert_eq!(1, rows[0].values.len());
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_closes_pipeline() -> Result<()> {
        let conf = runtime();
        let tasks: Tasks = vec![Box::new(source_task(&conf, "users"))];
        let mut handle = Job::new(tasks).run();

        handle.cancel();
        // The queue must close; receiving whatever was in flight and
        // then None means no stage deadlocked.
        while handle.recv().await.is_some() {}
        Ok(())
    }

    #[tokio::test]
    async fn test_stage_error_surfaces_from_collect() {
        struct FailTask {}

        #[async_trait]
        impl Task for FailTask {
            fn name(&self) -> &'static str {
                "Fail"
            }

            async fn run(
                self: Box<Self>,
                _ctx: TaskContext,
                _input: Option<mpsc::Receiver<Row>>,
                _out: mpsc::Sender<Row>,
            ) -> Result<()> {
                Err(internal_err!("stage blew up"))
            }
        }

        let tasks: Tasks = vec![Box::new(FailTask {})];
        let err = Job::new(tasks).run().collect().await.unwrap_err();
        assert_eq!("stage blew up", err.to_string());
    }

    #[tokio::test]
    async fn test_empty_job_yields_closed_stream() {
        let mut handle = Job::new(Vec::new()).run();
        assert!(handle.recv().await.is_none());
    }
}
