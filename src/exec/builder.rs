use log::warn;

use crate::error::Result;
use crate::exec::filter::Filter;
use crate::exec::projection::Projection;
use crate::exec::source::Source;
use crate::exec::source::SourceJoin;
use crate::exec::Tasks;
use crate::plan_err;
use crate::source::registry::RuntimeConfig;
use crate::source::SourceConn;
use crate::sql::stmt::PreparedStatement;
use crate::sql::stmt::SqlDelete;
use crate::sql::stmt::SqlDescribe;
use crate::sql::stmt::SqlInsert;
use crate::sql::stmt::SqlSelect;
use crate::sql::stmt::SqlShow;
use crate::sql::stmt::SqlSource;
use crate::sql::stmt::SqlUpdate;
use crate::sql::stmt::SqlUpsert;
use crate::sql::stmt::Statement;
use crate::sql::stmt::SubVisitor;
use crate::sql::stmt::Visitor;
use crate::unimplemented_err;

/// Turns a checked statement into the ordered task list of its
/// pipeline. One builder per statement. Every statement kind the
/// engine does not run yet is recognized and rejected here, so
/// planning fails instead of execution.
pub struct JobBuilder {
    conf: RuntimeConfig,
}

impl JobBuilder {
    pub fn new(conf: RuntimeConfig) -> JobBuilder {
        JobBuilder { conf }
    }

    pub fn build(&mut self, stmt: &Statement) -> Result<Tasks> {
        stmt.check()?;
        stmt.accept(self)
    }

    /// Resolves the table and opens a connection, requiring the scan
    /// capability on the source and on the opened connection.
    fn open_scannable(&self, from: &SqlSource) -> Result<Box<dyn SourceConn>> {
        let table = &from.name;
        let source = self
            .conf
            .source(table)
            .ok_or_else(|| plan_err!("no source found for table {}", table))?;
        if !source.features.scan {
            return Err(plan_err!("source {} must implement scan", table));
        }
        let conn = self.conf.conn(table)?;
        if conn.as_scanner().is_none() {
            return Err(plan_err!("source {} must implement scan", table));
        }
        Ok(conn)
    }
}

impl Visitor for JobBuilder {
    type Output = Tasks;

    fn visit_select(&mut self, stmt: &SqlSelect) -> Result<Tasks> {
        let mut tasks: Tasks = Vec::new();
        match stmt.from.len() {
            1 => {
                let from = &stmt.from[0];
                if from.source.is_some() {
                    return from.accept_sub(self);
                }
                let conn = self.open_scannable(from)?;
                tasks.push(Box::new(Source::new(from.clone(), conn)));
            }
            2 => {
                for from in &stmt.from {
                    if from.source.is_some() {
                        return from.accept_sub(self);
                    }
                }
                let left = stmt.from[0].rewrite(true, stmt);
                let right = stmt.from[1].rewrite(false, stmt);
                if left.join_nodes.is_empty() || right.join_nodes.is_empty() {
                    return Err(unimplemented_err!(
                        "join of {} and {} without equality keys not currently implemented",
                        left.alias_or_name(),
                        right.alias_or_name()
                    ));
                }
                let left_conn = self.open_scannable(&left)?;
                let right_conn = self.open_scannable(&right)?;
                tasks.push(Box::new(SourceJoin::new(left, left_conn, right, right_conn)));
            }
            n => {
                return Err(unimplemented_err!("{} FROM sources not currently implemented", n));
            }
        }

        if let Some(where_clause) = &stmt.where_clause {
            if where_clause.source.is_some() {
                warn!("sub-query WHERE not supported, dropping: WHERE {}", where_clause);
            } else if let Some(expr) = &where_clause.expr {
                tasks.push(Box::new(Filter::new(expr.clone())));
            } else {
                warn!("WHERE clause carries no expression, dropping");
            }
        }

        tasks.push(Box::new(Projection::from_select(stmt)));
        Ok(tasks)
    }

    fn visit_insert(&mut self, _stmt: &SqlInsert) -> Result<Tasks> {
        Err(unimplemented_err!("INSERT not currently implemented"))
    }

    fn visit_update(&mut self, _stmt: &SqlUpdate) -> Result<Tasks> {
        Err(unimplemented_err!("UPDATE not currently implemented"))
    }

    fn visit_upsert(&mut self, _stmt: &SqlUpsert) -> Result<Tasks> {
        Err(unimplemented_err!("UPSERT not currently implemented"))
    }

    fn visit_delete(&mut self, _stmt: &SqlDelete) -> Result<Tasks> {
        Err(unimplemented_err!("DELETE not currently implemented"))
    }

    fn visit_show(&mut self, _stmt: &SqlShow) -> Result<Tasks> {
        Err(unimplemented_err!("SHOW not currently implemented"))
    }

    fn visit_describe(&mut self, _stmt: &SqlDescribe) -> Result<Tasks> {
        Err(unimplemented_err!("DESCRIBE not currently implemented"))
    }

    fn visit_prepared(&mut self, _stmt: &PreparedStatement) -> Result<Tasks> {
        Err(unimplemented_err!("prepared statements not currently implemented"))
    }
}

impl SubVisitor for JobBuilder {
    type Output = Tasks;

    fn visit_subselect(&mut self, source: &SqlSource) -> Result<Tasks> {
        Err(unimplemented_err!("sub-select source {} not currently implemented", source))
    }

    fn visit_join(&mut self, source: &SqlSource) -> Result<Tasks> {
        Err(unimplemented_err!("join source {} not currently implemented", source))
    }
}
