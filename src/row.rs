use std::ops::Deref;
use std::sync::Arc;

use crate::error::Error;
use crate::error::Result;
use crate::value::Value;

/// Shared column-name layout. Every row produced by one stream holds
/// the same allocation; cloning a layout is a refcount bump.
pub type Columns = Arc<Vec<String>>;

pub fn columns_from<S: Into<String>>(names: Vec<S>) -> Columns {
    Arc::new(names.into_iter().map(|s| s.into()).collect())
}

/// One row of data moving through a pipeline. Rows are owned by
/// whichever stage holds them; only the column layout is shared.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub values: Vec<Value>,
    columns: Columns,
}

impl Row {
    pub fn new(columns: Columns, values: Vec<Value>) -> Result<Row> {
        if values.len() != columns.len() {
            return Err(Error::value(format!(
                "Row has {} values for {} columns",
                values.len(),
                columns.len()
            )));
        }
        Ok(Row { values, columns })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// The shared layout, for producing sibling rows.
    pub fn layout(&self) -> Columns {
        Arc::clone(&self.columns)
    }

    /// Value lookup by exact column name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c == name)?;
        self.values.get(idx)
    }

    pub fn get_value(&self, i: usize) -> Option<&Value> {
        self.values.get(i)
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl Deref for Row {
    type Target = [Value];

    fn deref(&self) -> &[Value] {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_lookup() -> Result<()> {
        let columns = columns_from(vec!["name", "age"]);
        let row = Row::new(columns, vec![Value::from("ann"), Value::from(32i64)])?;
        assert_eq!(Some(&Value::from("ann")), row.get("name"));
        assert_eq!(Some(&Value::from(32i64)), row.get_value(1));
        assert_eq!(None, row.get("missing"));
        Ok(())
    }

    #[test]
    fn test_row_size_mismatch() {
        let columns = columns_from(vec!["a"]);
        assert!(Row::new(columns, vec![]).is_err());
    }
}
