use std::ops::Deref;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::row::Row;
use crate::sql::node::Node;
use crate::sql::stmt::SqlSelect;
use crate::sql::stmt::SubVisitor;

pub trait RowIterator: Iterator<Item = Result<Row>> + Send {}

// A blanket implementation so any Send iterator over row results is a
// RowIterator without implementing the trait by hand. Backends return
// plain iterator adapters and the trait object type below still works.
impl<T> RowIterator for T where T: Iterator<Item = Result<Row>> + Send {}

/// The row stream primitive: an owned, type-erased iterator of rows.
/// An `Err` item is a stream fault; consumers treat it as the end of
/// the stream after reporting it.
pub type RowIter = Box<dyn RowIterator>;

/// A backend serving one or more tables. Implementations declare what
/// they can run natively through the closed set of capability
/// accessors; every accessor defaults to `None` so a minimal backend
/// implements nothing but `tables` and `open`.
///
/// The trait is object safe; the engine holds backends as
/// `Arc<dyn DataSource>`.
pub trait DataSource: Send + Sync {
    /// Tables this source serves.
    fn tables(&self) -> Vec<String>;

    /// Opens a connection. `conn_info` is backend-specific connection
    /// info; for table-grained backends it is the table name.
    fn open(&self, conn_info: &str) -> Result<Box<dyn SourceConn>>;

    /// Releases anything the source holds. Process-lifetime sources
    /// rarely need this.
    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn as_scanner(&self) -> Option<&dyn Scanner> {
        None
    }

    fn as_seeker(&self) -> Option<&dyn Seeker> {
        None
    }

    fn as_where_filter(&self) -> Option<&dyn WhereFilter> {
        None
    }

    fn as_group_by(&self) -> Option<&dyn GroupBy> {
        None
    }

    fn as_sort(&self) -> Option<&dyn Sort> {
        None
    }

    fn as_aggregations(&self) -> Option<&dyn Aggregations> {
        None
    }

    fn as_source_planner(&self) -> Option<&dyn SourcePlanner> {
        None
    }
}

/// One open handle against a source, usually bound to a single table.
pub trait SourceConn: Send {
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn as_scanner(&self) -> Option<&dyn Scanner> {
        None
    }

    fn as_seeker(&self) -> Option<&dyn Seeker> {
        None
    }
}

impl std::fmt::Debug for dyn SourceConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SourceConn")
    }
}

/// Row iteration, the minimum capability the planner requires of a
/// table it scans.
pub trait Scanner: Send + Sync {
    /// Creates a fresh iterator over the rows, optionally pre-filtered
    /// by the pushed-down expression. Backends that cannot evaluate
    /// the filter may ignore it; the pipeline re-applies the full
    /// WHERE clause regardless.
    fn create_iterator(&self, filter: Option<&Node>) -> Result<RowIter>;

    /// Adapts the iterator into a bounded row queue driven by its own
    /// task. Cancelling the token closes the queue early. Must be
    /// called from within a tokio runtime.
    fn row_channel(
        &self,
        filter: Option<&Node>,
        token: CancellationToken,
    ) -> Result<mpsc::Receiver<Row>> {
        let iter = self.create_iterator(filter)?;
        Ok(stream::iter_channel(iter, token))
    }
}

/// Keyed lookup for sources that can fetch rows by key without a scan.
pub trait Seeker: Send + Sync {
    /// Whether this statement's shape is servable by seeks alone.
    fn can_seek(&self, stmt: &SqlSelect) -> bool;

    fn get(&self, key: &str) -> Result<Option<Row>>;

    fn multi_get(&self, keys: &[&str]) -> Result<Vec<Row>> {
        let mut rows = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(row) = self.get(key)? {
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

/// A source that plans part of the statement itself. The visitor lets
/// it hand nested FROM elements back to the engine and receive their
/// row streams.
pub trait SourcePlanner: Send + Sync {
    fn accept(&self, visitor: &mut dyn SubVisitor<Output = RowIter>) -> Result<RowIter>;
}

/// WHERE push-down offer. `Ok` means the backend took the filter and
/// its iterator output is pre-filtered.
pub trait WhereFilter: Send + Sync {
    fn filter(&self, stmt: &SqlSelect) -> Result<()>;
}

pub trait GroupBy: Send + Sync {
    fn group_by(&self, stmt: &SqlSelect) -> Result<()>;
}

pub trait Sort: Send + Sync {
    fn sort(&self, stmt: &SqlSelect) -> Result<()>;
}

pub trait Aggregations: Send + Sync {
    fn aggregate(&self, stmt: &SqlSelect) -> Result<()>;
}

/// What a source can run natively, probed once when the source enters
/// a registry and never re-probed per query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Features {
    pub scan: bool,
    pub seek: bool,
    pub where_filter: bool,
    pub group_by: bool,
    pub sort: bool,
    pub aggregations: bool,
}

impl Features {
    pub fn new(source: &dyn DataSource) -> Features {
        Features {
            scan: source.as_scanner().is_some(),
            seek: source.as_seeker().is_some(),
            where_filter: source.as_where_filter().is_some(),
            group_by: source.as_group_by().is_some(),
            sort: source.as_sort().is_some(),
            aggregations: source.as_aggregations().is_some(),
        }
    }
}

/// A registered source paired with its probed capability record.
/// Dereferences to the source so callers use it as one.
#[derive(Clone)]
pub struct FeaturedSource {
    pub features: Features,
    source: Arc<dyn DataSource>,
}

impl FeaturedSource {
    pub fn new(source: Arc<dyn DataSource>) -> FeaturedSource {
        let features = Features::new(source.as_ref());
        FeaturedSource { features, source }
    }
}

impl Deref for FeaturedSource {
    type Target = dyn DataSource;

    fn deref(&self) -> &Self::Target {
        self.source.as_ref()
    }
}

impl std::fmt::Debug for FeaturedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FeaturedSource({:?})", self.features)
    }
}

pub mod mem;
pub mod registry;
pub mod stream;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_err;

    // Implements nothing beyond the required methods, so every
    // capability probe must come back false.
    struct NoopSource {}

    impl DataSource for NoopSource {
        fn tables(&self) -> Vec<String> {
            Vec::new()
        }

        fn open(&self, conn_info: &str) -> Result<Box<dyn SourceConn>> {
            Err(value_err!("unknown table {}", conn_info))
        }
    }

    #[test]
    fn test_default_capabilities_probe_false() {
        let featured = FeaturedSource::new(Arc::new(NoopSource {}));
        assert_eq!(Features::default(), featured.features);
        assert!(!featured.features.scan);
        assert!(featured.tables().is_empty());
    }

    #[test]
    fn test_mem_source_probes_scan() {
        let source = mem::MemSource::sample();
        let featured = FeaturedSource::new(Arc::new(source));
        assert!(featured.features.scan);
        assert!(!featured.features.seek);
        assert_eq!(vec!["users".to_string()], featured.tables());
    }
}
