/// A value bound as a statement parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbValue {
    /// BIGINT
    Int64(i64),
    Text(String),
    /// Decimal string of a uint256, stored as NUMERIC
    Numeric(String),
}

/// One `INSERT ... ON CONFLICT` on a single table, executed with auto-commit.
/// With no `update_columns` the conflicting row is left as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbOperation {
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<DbValue>,
    /// Columns that form the unique constraint
    pub conflict_columns: Vec<String>,
    /// Columns overwritten on conflict
    pub update_columns: Vec<String>,
}

impl DbOperation {
    pub fn upsert(table: &str, row: Vec<(&str, DbValue)>, conflict_columns: &[&str]) -> Self {
        let (columns, values) = row
            .into_iter()
            .map(|(column, value)| (column.to_string(), value))
            .unzip();

        Self {
            table: table.to_string(),
            columns,
            values,
            conflict_columns: owned(conflict_columns),
            update_columns: Vec::new(),
        }
    }

    /// Overwrite `columns` when the row already exists.
    pub fn updating(mut self, columns: &[&str]) -> Self {
        self.update_columns = owned(columns);
        self
    }

    pub fn describe(&self) -> String {
        format!("upsert into {}", self.table)
    }
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}
