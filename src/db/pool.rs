use bytes::BytesMut;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use std::path::Path;
use tokio_postgres::types::{IsNull, ToSql, Type};
use tokio_postgres::{NoTls, Row};

use super::error::DbError;
use super::types::{DbOperation, DbValue};

pub struct DbPool {
    pool: Pool,
}

impl DbPool {
    pub async fn new(database_url: &str, max_connections: usize) -> Result<Self, DbError> {
        let config = database_url
            .parse::<tokio_postgres::Config>()
            .map_err(|e| DbError::InvalidUrl(e.to_string()))?;

        let manager_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let manager = Manager::from_config(config, NoTls, manager_config);

        let pool = Pool::builder(manager)
            .max_size(max_connections)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(DbError::Build)?;

        let _conn = pool.get().await?;
        tracing::info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    /// Run one statement on a pooled connection and return the number of rows affected.
    pub async fn execute(&self, op: DbOperation) -> Result<u64, DbError> {
        let (sql, params) = build_upsert_sql(&op);
        let params_refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let client = self.pool.get().await?;
        client
            .execute(&sql, &params_refs[..])
            .await
            .map_err(|source| {
                tracing::debug!("Failed statement: {}", sql);
                DbError::Statement {
                    operation: op.describe(),
                    source,
                }
            })
    }

    /// `label` names the query in errors.
    pub async fn select_all(
        &self,
        label: &str,
        query: &str,
        params: &[DbValue],
    ) -> Result<Vec<Row>, DbError> {
        let params = convert_values_to_params(params);
        let params_refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let client = self.pool.get().await?;
        client
            .query(query, &params_refs[..])
            .await
            .map_err(DbError::statement(label))
    }

    pub async fn run_migrations(&self, dir: &Path) -> Result<(), DbError> {
        super::migrations::run(&self.pool, dir).await
    }
}

impl std::fmt::Debug for DbPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.pool.status();
        f.debug_struct("DbPool")
            .field("size", &status.size)
            .field("max_size", &status.max_size)
            .finish()
    }
}

#[derive(Debug, PartialEq)]
enum SqlParam {
    Int64(i64),
    Text(String),
}

impl ToSql for SqlParam {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            SqlParam::Int64(v) => v.to_sql(ty, out),
            SqlParam::Text(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(ty: &Type) -> bool {
        <i64 as ToSql>::accepts(ty) || <String as ToSql>::accepts(ty)
    }

    tokio_postgres::types::to_sql_checked!();
}

fn convert_db_value(value: &DbValue) -> SqlParam {
    match value {
        DbValue::Int64(v) => SqlParam::Int64(*v),
        DbValue::Text(v) => SqlParam::Text(v.clone()),
        DbValue::Numeric(v) => SqlParam::Text(v.clone()),
    }
}

fn convert_values_to_params(values: &[DbValue]) -> Vec<SqlParam> {
    values.iter().map(convert_db_value).collect()
}

/// Generate the SQL placeholder for a value at the given parameter index.
/// Numeric values are sent as text and cast by PostgreSQL.
fn placeholder_for(value: &DbValue, param_idx: usize) -> String {
    match value {
        DbValue::Numeric(_) => format!("${}::text::numeric", param_idx),
        _ => format!("${}", param_idx),
    }
}

/// Wrap a column name in double quotes to handle reserved keywords.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name)
}

fn quote_cols(columns: &[String]) -> String {
    columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
}

fn build_upsert_sql(op: &DbOperation) -> (String, Vec<SqlParam>) {
    let placeholders: Vec<String> = op
        .values
        .iter()
        .enumerate()
        .map(|(i, v)| placeholder_for(v, i + 1))
        .collect();

    let insert = format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({})",
        op.table,
        quote_cols(&op.columns),
        placeholders.join(", "),
        quote_cols(&op.conflict_columns)
    );

    let sql = if op.update_columns.is_empty() {
        format!("{} DO NOTHING", insert)
    } else {
        let updates: Vec<String> = op
            .update_columns
            .iter()
            .map(|c| format!("{} = EXCLUDED.{}", quote_ident(c), quote_ident(c)))
            .collect();
        format!("{} DO UPDATE SET {}", insert, updates.join(", "))
    };

    (sql, convert_values_to_params(&op.values))
}
