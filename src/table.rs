//! A thin handle over the embedded analytics engine: every rule is
//! executed against an embedded columnar query engine. The connection is
//! kept private; every generator-produced SQL string is executed through
//! [`TableHandle::run_check`], never through a raw query path reachable
//! from outside this module.

use duckdb::Connection;

use crate::error::{AppResult, engine_error};

pub const DEFAULT_TABLE_NAME: &str = "focus_data";

/// Owns the DuckDB connection and the registered table name a check's
/// generated SQL substitutes for `{table_name}`.
pub struct TableHandle {
    connection: Connection,
    table_name: String
}

/// The result row shape every check query must produce: `violations
/// BIGINT, error_message VARCHAR`.
pub struct CheckQueryResult {
    pub violations:    u64,
    pub error_message: Option<String>
}

impl TableHandle {
    /// Opens an in-memory DuckDB instance and registers `path` (a Parquet
    /// or CSV file, or glob) as a view named `table_name`.
    pub fn open(path: &str, table_name: impl Into<String>) -> AppResult<Self> {
        let table_name = table_name.into();
        let connection = Connection::open_in_memory().map_err(|e| engine_error("<open>", e))?;
        let create = format!(
            "CREATE VIEW {table_name} AS SELECT * FROM read_parquet({path_lit}, union_by_name = true)",
            path_lit = crate::generators::lit(path)
        );
        connection
            .execute(&create, [])
            .or_else(|_| {
                let fallback = format!(
                    "CREATE VIEW {table_name} AS SELECT * FROM read_csv_auto({path_lit}, union_by_name = true)",
                    path_lit = crate::generators::lit(path)
                );
                connection.execute(&fallback, [])
            })
            .map_err(|e| engine_error("<open>", e))?;
        Ok(Self {
            connection,
            table_name
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Substitutes `{table_name}` into `sql_template` and runs it,
    /// expecting exactly one row shaped `(violations BIGINT, error_message
    /// VARCHAR)`.
    pub fn run_check(&self, rule_id: &str, sql_template: &str) -> AppResult<CheckQueryResult> {
        let sql = sql_template.replace("{table_name}", &self.table_name);
        let mut statement = self
            .connection
            .prepare(&sql)
            .map_err(|e| engine_error(rule_id, e))?;
        let mut rows = statement.query([]).map_err(|e| engine_error(rule_id, e))?;
        let row = rows
            .next()
            .map_err(|e| engine_error(rule_id, e))?
            .ok_or_else(|| engine_error(rule_id, "check query produced no rows"))?;
        let violations: i64 = row.get(0).map_err(|e| engine_error(rule_id, e))?;
        let error_message: Option<String> = row.get(1).map_err(|e| engine_error(rule_id, e))?;
        Ok(CheckQueryResult {
            violations: violations.max(0) as u64,
            error_message
        })
    }

    /// Runs a raw, non-templated SQL statement, for schema introspection
    /// (`information_schema.columns`-style generators that do not need the
    /// `{table_name}` placeholder substituted) and diagnostics sampling.
    pub fn run_raw(&self, rule_id: &str, sql: &str) -> AppResult<CheckQueryResult> {
        self.run_check(rule_id, sql)
    }

    /// Samples up to `limit` distinct offending values for a failing
    /// check's column, for `Outcome::Fail::sample_offending_values`.
    /// Best-effort: failures here are swallowed, since a sample is
    /// diagnostic sugar, not a correctness requirement.
    pub fn sample_values(&self, column: &str, where_clause: &str, limit: usize) -> Vec<String> {
        let Ok(col) = crate::generators::validate_identifier(column) else {
            return Vec::new();
        };
        let sql = format!(
            "SELECT DISTINCT {col}::VARCHAR FROM {table} WHERE {where_clause} LIMIT {limit}",
            table = self.table_name
        );
        let Ok(mut statement) = self.connection.prepare(&sql) else {
            return Vec::new();
        };
        let Ok(mut rows) = statement.query([]) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        while let Ok(Some(row)) = rows.next() {
            if let Ok(value) = row.get::<_, Option<String>>(0) {
                out.push(value.unwrap_or_else(|| "NULL".to_string()));
            }
        }
        out
    }
}
