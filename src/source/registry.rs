//! Backend registry: named sources wrapped with their probed
//! capabilities, plus the lazy table index behind name resolution.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::RwLock;

use log::warn;

use crate::config::Config;
use crate::error::Result;
use crate::plan_err;
use crate::source::DataSource;
use crate::source::FeaturedSource;
use crate::source::SourceConn;
use crate::value_err;

#[derive(Default)]
struct Registered {
    by_name: HashMap<String, FeaturedSource>,
    /// Registration order. The table index is built in this order so
    /// collisions resolve deterministically.
    order: Vec<String>,
}

/// Process-lifetime set of named backends. Registration happens once
/// at startup; resolution happens per query. Names and table lookups
/// are case-insensitive.
#[derive(Default)]
pub struct SourceRegistry {
    sources: RwLock<Registered>,
    /// table name -> source name, built on the first resolve miss and
    /// fixed from then on.
    tables: OnceLock<HashMap<String, String>>,
}

impl SourceRegistry {
    pub fn new() -> SourceRegistry {
        SourceRegistry::default()
    }

    /// Registers a source under a name. The source is probed for its
    /// capabilities here, once.
    ///
    /// # Panics
    ///
    /// Panics if the name is already taken. Registration is init-time
    /// wiring; a duplicate is a programming error, not a runtime
    /// condition.
    pub fn register(&self, name: impl Into<String>, source: Arc<dyn DataSource>) {
        let name = name.into().to_lowercase();
        let duplicate = {
            let mut sources = self.sources.write().expect("source registry poisoned");
            if sources.by_name.contains_key(&name) {
                true
            } else {
                sources.by_name.insert(name.clone(), FeaturedSource::new(source));
                sources.order.push(name.clone());
                false
            }
        };
        if duplicate {
            panic!("register source {} called twice", name);
        }
    }

    /// Resolves a source by name. Misses on the exact name fall back
    /// to the only source when exactly one is registered, then to the
    /// table index. `None` means nothing matched; the caller decides
    /// how fatal that is.
    pub fn resolve(&self, name: &str) -> Option<FeaturedSource> {
        let name = name.to_lowercase();
        {
            let sources = self.sources.read().expect("source registry poisoned");
            if let Some(source) = sources.by_name.get(&name) {
                return Some(source.clone());
            }
            if sources.order.len() == 1 {
                return sources.by_name.get(&sources.order[0]).cloned();
            }
        }
        let source_name = self.table_index().get(&name)?.clone();
        let sources = self.sources.read().expect("source registry poisoned");
        sources.by_name.get(&source_name).cloned()
    }

    /// Opens a connection on an exactly named source. No fallback
    /// here: an absent name is a recoverable error, unlike `resolve`
    /// misses which simply return `None`.
    pub fn open_conn(&self, name: &str, conn_info: &str) -> Result<Box<dyn SourceConn>> {
        let sources = self.sources.read()?;
        let source = sources
            .by_name
            .get(&name.to_lowercase())
            .ok_or_else(|| value_err!("unknown source {}", name))?;
        source.open(conn_info)
    }

    /// Built once, on the first resolve that needs it. Sources
    /// registered after that are not indexed, so register everything
    /// before the first query.
    fn table_index(&self) -> &HashMap<String, String> {
        self.tables.get_or_init(|| {
            let mut index = HashMap::new();
            let sources = self.sources.read().expect("source registry poisoned");
            for source_name in &sources.order {
                let source = &sources.by_name[source_name];
                for table in source.tables() {
                    let table = table.to_lowercase();
                    if let Some(prior) = index.insert(table.clone(), source_name.clone()) {
                        warn!(
                            "table {} is provided by both {} and {}, using {}",
                            table, prior, source_name, source_name
                        );
                    }
                }
            }
            index
        })
    }
}

/// What the planner carries around at build time: the registry plus
/// the connection info handed to backends on open.
pub struct RuntimeConfig {
    pub registry: Arc<SourceRegistry>,
    /// Backend connection info. Empty means "pass the table name",
    /// which suits table-grained backends.
    pub conn_info: String,
}

impl RuntimeConfig {
    pub fn new(registry: Arc<SourceRegistry>) -> RuntimeConfig {
        RuntimeConfig { registry, conn_info: String::new() }
    }

    pub fn from_config(registry: Arc<SourceRegistry>, config: &Config) -> RuntimeConfig {
        RuntimeConfig { registry, conn_info: config.conn_info.clone() }
    }

    pub fn source(&self, table: &str) -> Option<FeaturedSource> {
        self.registry.resolve(table)
    }

    /// Resolves the table's source and opens a connection on it.
    pub fn conn(&self, table: &str) -> Result<Box<dyn SourceConn>> {
        let source = self
            .registry
            .resolve(table)
            .ok_or_else(|| plan_err!("no source found for table {}", table))?;
        let conn_info = if self.conn_info.is_empty() { table } else { self.conn_info.as_str() };
        source.open(conn_info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::mem::MemSource;
    use crate::value::Value;

    fn sample_registry() -> SourceRegistry {
        let registry = SourceRegistry::new();
        registry.register("userdb", Arc::new(MemSource::sample()));
        registry.register("orderdb", Arc::new(MemSource::sample_orders()));
        registry
    }

    #[test]
    #[should_panic(expected = "called twice")]
    fn test_register_duplicate_panics() {
        let registry = SourceRegistry::new();
        registry.register("db", Arc::new(MemSource::sample()));
        registry.register("DB", Arc::new(MemSource::sample()));
    }

    #[test]
    fn test_resolve_exact_name_any_case() {
        let registry = sample_registry();
        let source = registry.resolve("USERDB").expect("registered");
        assert_eq!(vec!["users".to_string()], source.tables());
    }

    #[test]
    fn test_resolve_single_source_fallback() {
        let registry = SourceRegistry::new();
        registry.register("only", Arc::new(MemSource::sample()));
        // With exactly one source registered, any name resolves to it.
        assert!(registry.resolve("whatever").is_some());
    }

    #[test]
    fn test_resolve_by_table_index() {
        let registry = sample_registry();
        let source = registry.resolve("orders").expect("indexed by table");
        assert_eq!(vec!["orders".to_string()], source.tables());
        assert!(registry.resolve("nope").is_none());
    }

    #[test]
    fn test_table_collision_last_registered_wins() -> Result<()> {
        let registry = SourceRegistry::new();
        registry.register("first", Arc::new(MemSource::sample()));
        let shadow = MemSource::new(
            "users",
            vec!["id", "name"],
            vec![vec![9i64.into(), "zo".into()]],
        )?;
        registry.register("second", Arc::new(shadow));

        let source = registry.resolve("users").expect("indexed by table");
        let scanner = source.as_scanner().expect("mem source scans");
        let rows = scanner.create_iterator(None)?.collect::<Result<Vec<_>>>()?;
        assert_eq!(1, rows.len());
        assert_eq!(Some(&Value::from("zo")), rows[0].get("name"));
        Ok(())
    }

    #[test]
    fn test_open_conn_exact_only() -> Result<()> {
        let registry = sample_registry();
        let conn = registry.open_conn("userdb", "users")?;
        assert!(conn.as_scanner().is_some());

        let err = registry.open_conn("users", "users").unwrap_err();
        assert_eq!("unknown source users", err.to_string());
        Ok(())
    }

    #[test]
    fn test_runtime_config_conn() -> Result<()> {
        let cfg = RuntimeConfig::new(Arc::new(sample_registry()));
        let conn = cfg.conn("orders")?;
        let scanner = conn.as_scanner().expect("mem conn scans");
        let rows = scanner.create_iterator(None)?.collect::<Result<Vec<_>>>()?;
        assert_eq!(4, rows.len());
        Ok(())
    }
}
