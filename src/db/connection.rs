use async_trait::async_trait;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::types::Decimal;
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::{debug, error, info};

use crate::db::executor::{ExecutionError, StatementKind};
use crate::db::schema::{ColumnSchema, SchemaSnapshot, TableSchema};
use crate::db::{ConnectionDescriptor, ConnectionError, DriverKind, QueryOutput, SqlDatabase, SqlValue};

const SQLITE_TABLES: &str = "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name";

const POSTGRES_COLUMNS: &str = "
    SELECT table_name::text, column_name::text, data_type::text, is_nullable::text
    FROM information_schema.columns
    WHERE table_schema = current_schema()
    ORDER BY table_name, ordinal_position
";

const MYSQL_COLUMNS: &str = "
    SELECT CAST(table_name AS CHAR), CAST(column_name AS CHAR), CAST(column_type AS CHAR), CAST(is_nullable AS CHAR)
    FROM information_schema.columns
    WHERE table_schema = DATABASE()
    ORDER BY table_name, ordinal_position
";

enum DriverPool {
    Sqlite(SqlitePool),
    Postgres(PgPool),
    MySql(MySqlPool),
}

/// A live database reached through the sqlx driver for its kind.
///
/// The pool holds a single connection, so statements run one at a time.
pub struct SqlxDatabase {
    pool: DriverPool,
    kind: DriverKind,
    sample_rows: usize,
}

impl SqlxDatabase {
    pub async fn connect(
        descriptor: &ConnectionDescriptor,
        sample_rows: usize,
    ) -> Result<Self, ConnectionError> {
        let url = descriptor.connection_url()?;
        info!("Connecting to {}", descriptor.redacted_url());
        Self::connect_url(&url, descriptor.kind, sample_rows)
            .await
            .map_err(|e| match e {
                ConnectionError::Unreachable { message, .. } => ConnectionError::Unreachable {
                    target: descriptor.redacted_url(),
                    message,
                },
                other => other,
            })
    }

    /// Connects with a ready-made sqlx URL, e.g. `sqlite::memory:`.
    pub async fn connect_url(
        url: &str,
        kind: DriverKind,
        sample_rows: usize,
    ) -> Result<Self, ConnectionError> {
        let pool = match kind {
            DriverKind::Sqlite => SqlitePoolOptions::new()
                .max_connections(1)
                .connect(url)
                .await
                .map(DriverPool::Sqlite),
            DriverKind::Postgres => PgPoolOptions::new()
                .max_connections(1)
                .connect(url)
                .await
                .map(DriverPool::Postgres),
            DriverKind::Mysql => MySqlPoolOptions::new()
                .max_connections(1)
                .connect(url)
                .await
                .map(DriverPool::MySql),
        }
        .map_err(|e| {
            error!("Failed to connect to {} database: {}", kind, e);
            ConnectionError::Unreachable {
                target: kind.to_string(),
                message: e.to_string(),
            }
        })?;

        debug!("Connected to {} database", kind);
        Ok(Self {
            pool,
            kind,
            sample_rows,
        })
    }

    pub async fn close(&self) {
        match &self.pool {
            DriverPool::Sqlite(pool) => pool.close().await,
            DriverPool::Postgres(pool) => pool.close().await,
            DriverPool::MySql(pool) => pool.close().await,
        }
    }

    /// Column names and decoded rows of a row-returning statement.
    async fn fetch(&self, sql: &str) -> Result<(Vec<String>, Vec<Vec<SqlValue>>), sqlx::Error> {
        match &self.pool {
            DriverPool::Sqlite(pool) => {
                let rows = sqlx::query(sql).fetch_all(pool).await?;
                Ok((column_names(&rows), rows.iter().map(|r| decode_row(r, sqlite_cell)).collect()))
            }
            DriverPool::Postgres(pool) => {
                let rows = sqlx::query(sql).fetch_all(pool).await?;
                Ok((column_names(&rows), rows.iter().map(|r| decode_row(r, postgres_cell)).collect()))
            }
            DriverPool::MySql(pool) => {
                let rows = sqlx::query(sql).fetch_all(pool).await?;
                Ok((column_names(&rows), rows.iter().map(|r| decode_row(r, mysql_cell)).collect()))
            }
        }
    }

    async fn execute(&self, sql: &str) -> Result<u64, sqlx::Error> {
        let affected = match &self.pool {
            DriverPool::Sqlite(pool) => sqlx::query(sql).execute(pool).await?.rows_affected(),
            DriverPool::Postgres(pool) => sqlx::query(sql).execute(pool).await?.rows_affected(),
            DriverPool::MySql(pool) => sqlx::query(sql).execute(pool).await?.rows_affected(),
        };
        Ok(affected)
    }

    async fn sqlite_tables(&self) -> Result<Vec<TableSchema>, sqlx::Error> {
        let (_, names) = self.fetch(SQLITE_TABLES).await?;

        let mut tables = Vec::with_capacity(names.len());
        for row in names {
            let name = text_at(&row, 0);
            let pragma = format!("PRAGMA table_info({})", self.kind.quote_ident(&name));
            // cid, name, type, notnull, dflt_value, pk
            let (_, info) = self.fetch(&pragma).await?;
            let columns = info
                .iter()
                .map(|row| ColumnSchema {
                    name: text_at(row, 1),
                    data_type: text_at(row, 2),
                    nullable: matches!(row.get(3), Some(SqlValue::Integer(0))),
                })
                .collect();
            tables.push(TableSchema::new(name, columns));
        }

        Ok(tables)
    }

    async fn information_schema_tables(&self, query: &str) -> Result<Vec<TableSchema>, sqlx::Error> {
        let (_, rows) = self.fetch(query).await?;

        let mut tables: Vec<TableSchema> = Vec::new();
        for row in &rows {
            let table_name = text_at(row, 0);
            let column = ColumnSchema {
                name: text_at(row, 1),
                data_type: text_at(row, 2),
                nullable: text_at(row, 3) == "YES",
            };

            match tables.last_mut() {
                Some(table) if table.name == table_name => table.columns.push(column),
                _ => tables.push(TableSchema::new(table_name, vec![column])),
            }
        }

        Ok(tables)
    }

    async fn attach_samples(&self, tables: &mut [TableSchema]) -> Result<(), sqlx::Error> {
        if self.sample_rows == 0 {
            return Ok(());
        }

        for table in tables.iter_mut() {
            let sql = format!(
                "SELECT * FROM {} LIMIT {}",
                self.kind.quote_ident(&table.name),
                self.sample_rows
            );
            let (_, rows) = self.fetch(&sql).await?;
            table.sample_rows = rows;
        }

        Ok(())
    }
}

fn column_names<R: Row>(rows: &[R]) -> Vec<String> {
    rows.first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default()
}

fn decode_row<R: Row>(row: &R, cell: fn(&R, usize) -> SqlValue) -> Vec<SqlValue> {
    (0..row.len()).map(|i| cell(row, i)).collect()
}

fn text_at(row: &[SqlValue], index: usize) -> String {
    match row.get(index) {
        Some(SqlValue::Text(text)) => text.clone(),
        Some(SqlValue::Blob(bytes)) => String::from_utf8_lossy(bytes).into_owned(),
        Some(SqlValue::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

// `None` for SQL NULL, otherwise the declared type name of the value.
fn value_type<R: Row>(row: &R, index: usize) -> Option<String>
where
    usize: sqlx::ColumnIndex<R>,
{
    let raw = row.try_get_raw(index).ok()?;
    if raw.is_null() {
        return None;
    }
    Some(raw.type_info().name().to_ascii_uppercase())
}

// Values that have no lossless scalar form are shown as their type name.
fn undecodable(type_name: &str) -> SqlValue {
    SqlValue::Text(format!("<{}>", type_name.to_ascii_lowercase()))
}

// SQLite values carry their storage class, so try the four classes in turn.
fn sqlite_cell(row: &SqliteRow, index: usize) -> SqlValue {
    if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
        return value.map(SqlValue::Integer).unwrap_or(SqlValue::Null);
    }
    if let Ok(Some(value)) = row.try_get::<Option<f64>, _>(index) {
        return SqlValue::Real(value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<String>, _>(index) {
        return SqlValue::Text(value);
    }
    if let Ok(Some(value)) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return SqlValue::Blob(value);
    }
    SqlValue::Null
}

fn postgres_cell(row: &PgRow, index: usize) -> SqlValue {
    let Some(type_name) = value_type(row, index) else {
        return SqlValue::Null;
    };

    let value = match type_name.as_str() {
        "BOOL" => row.try_get::<bool, _>(index).map(SqlValue::Boolean),
        "INT2" => row.try_get::<i16, _>(index).map(|v| SqlValue::Integer(v.into())),
        "INT4" => row.try_get::<i32, _>(index).map(|v| SqlValue::Integer(v.into())),
        "INT8" => row.try_get::<i64, _>(index).map(SqlValue::Integer),
        "FLOAT4" => row.try_get::<f32, _>(index).map(|v| SqlValue::Real(v.into())),
        "FLOAT8" => row.try_get::<f64, _>(index).map(SqlValue::Real),
        "NUMERIC" => row.try_get::<Decimal, _>(index).map(|v| SqlValue::Text(v.to_string())),
        "DATE" => row.try_get::<NaiveDate, _>(index).map(|v| SqlValue::Text(v.to_string())),
        "TIME" => row.try_get::<NaiveTime, _>(index).map(|v| SqlValue::Text(v.to_string())),
        "TIMESTAMP" => row
            .try_get::<NaiveDateTime, _>(index)
            .map(|v| SqlValue::Text(v.to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<DateTime<Utc>, _>(index)
            .map(|v| SqlValue::Text(v.to_rfc3339())),
        "UUID" => row
            .try_get::<sqlx::types::Uuid, _>(index)
            .map(|v| SqlValue::Text(v.to_string())),
        "JSON" | "JSONB" => row
            .try_get::<sqlx::types::JsonValue, _>(index)
            .map(|v| SqlValue::Text(v.to_string())),
        "BYTEA" => row.try_get::<Vec<u8>, _>(index).map(SqlValue::Blob),
        _ => row.try_get::<String, _>(index).map(SqlValue::Text),
    };

    value.unwrap_or_else(|_| undecodable(&type_name))
}

fn mysql_cell(row: &MySqlRow, index: usize) -> SqlValue {
    let Some(type_name) = value_type(row, index) else {
        return SqlValue::Null;
    };

    let value = match type_name.as_str() {
        "BOOLEAN" => row.try_get::<bool, _>(index).map(SqlValue::Boolean),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            row.try_get::<i64, _>(index).map(SqlValue::Integer)
        }
        unsigned if unsigned.ends_with(" UNSIGNED") => row.try_get::<u64, _>(index).map(|v| {
            i64::try_from(v)
                .map(SqlValue::Integer)
                .unwrap_or_else(|_| SqlValue::Text(v.to_string()))
        }),
        "FLOAT" => row.try_get::<f32, _>(index).map(|v| SqlValue::Real(v.into())),
        "DOUBLE" => row.try_get::<f64, _>(index).map(SqlValue::Real),
        "DECIMAL" => row.try_get::<Decimal, _>(index).map(|v| SqlValue::Text(v.to_string())),
        "DATE" => row.try_get::<NaiveDate, _>(index).map(|v| SqlValue::Text(v.to_string())),
        "TIME" => row.try_get::<NaiveTime, _>(index).map(|v| SqlValue::Text(v.to_string())),
        "DATETIME" => row
            .try_get::<NaiveDateTime, _>(index)
            .map(|v| SqlValue::Text(v.to_string())),
        "TIMESTAMP" => row
            .try_get::<DateTime<Utc>, _>(index)
            .map(|v| SqlValue::Text(v.to_rfc3339())),
        "JSON" => row
            .try_get::<sqlx::types::JsonValue, _>(index)
            .map(|v| SqlValue::Text(v.to_string())),
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" => {
            row.try_get::<Vec<u8>, _>(index).map(SqlValue::Blob)
        }
        _ => row.try_get::<String, _>(index).map(SqlValue::Text),
    };

    value.unwrap_or_else(|_| undecodable(&type_name))
}

#[async_trait]
impl SqlDatabase for SqlxDatabase {
    fn kind(&self) -> DriverKind {
        self.kind
    }

    async fn describe_schema(&self) -> Result<SchemaSnapshot, ConnectionError> {
        let introspect = async {
            let mut tables = match self.kind {
                DriverKind::Sqlite => self.sqlite_tables().await?,
                DriverKind::Postgres => self.information_schema_tables(POSTGRES_COLUMNS).await?,
                DriverKind::Mysql => self.information_schema_tables(MYSQL_COLUMNS).await?,
            };
            self.attach_samples(&mut tables).await?;
            Ok::<_, sqlx::Error>(tables)
        };

        match introspect.await {
            Ok(tables) => {
                debug!("Introspected {} tables", tables.len());
                Ok(SchemaSnapshot::new(tables))
            }
            Err(sqlx::Error::Io(e)) => Err(ConnectionError::Unreachable {
                target: self.kind.to_string(),
                message: e.to_string(),
            }),
            Err(e) => {
                error!("Schema introspection failed: {}", e);
                Err(ConnectionError::Introspection(e.to_string()))
            }
        }
    }

    async fn run(&self, sql: &str, kind: StatementKind) -> Result<QueryOutput, ExecutionError> {
        if kind.is_read_only() {
            let (columns, rows) = self
                .fetch(sql)
                .await
                .map_err(|e| ExecutionError::Database(driver_message(e)))?;

            Ok(QueryOutput {
                columns,
                rows,
                rows_affected: None,
            })
        } else {
            let affected = self
                .execute(sql)
                .await
                .map_err(|e| ExecutionError::Database(driver_message(e)))?;

            Ok(QueryOutput {
                columns: Vec::new(),
                rows: Vec::new(),
                rows_affected: Some(affected),
            })
        }
    }
}

// Database errors carry the server's own text; everything else keeps sqlx's wording.
fn driver_message(error: sqlx::Error) -> String {
    match error {
        sqlx::Error::Database(db_error) => db_error.message().to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> SqlxDatabase {
        let db = SqlxDatabase::connect_url("sqlite::memory:", DriverKind::Sqlite, 2)
            .await
            .unwrap();
        for sql in [
            "CREATE TABLE student (name VARCHAR(25), class VARCHAR(25), section VARCHAR(25), marks INT NOT NULL)",
            "CREATE TABLE course (title TEXT)",
            "INSERT INTO student VALUES ('Steve', 'Data Science', 'A', 100)",
            "INSERT INTO student VALUES ('Taylor', 'Data Science', 'A', 95)",
            "INSERT INTO student VALUES ('Al', 'Computer Vision', 'C', 92)",
        ] {
            db.run(sql, StatementKind::Other).await.unwrap();
        }
        db
    }

    #[tokio::test]
    async fn sqlite_schema_is_introspected_with_samples() {
        let db = seeded().await;
        let schema = db.describe_schema().await.unwrap();

        assert_eq!(schema.table_names(), vec!["course", "student"]);
        let student = schema.table("student").unwrap();
        let columns: Vec<(&str, &str, bool)> = student
            .columns
            .iter()
            .map(|c| (c.name.as_str(), c.data_type.as_str(), c.nullable))
            .collect();
        assert_eq!(
            columns,
            vec![
                ("name", "VARCHAR(25)", true),
                ("class", "VARCHAR(25)", true),
                ("section", "VARCHAR(25)", true),
                ("marks", "INT", false),
            ]
        );
        assert_eq!(student.sample_rows.len(), 2);
        assert!(schema.table("course").unwrap().sample_rows.is_empty());
    }

    #[tokio::test]
    async fn select_returns_typed_rows() {
        let db = seeded().await;
        let output = db
            .run(
                "SELECT name, marks FROM student WHERE class = 'Data Science' ORDER BY marks DESC",
                StatementKind::Select,
            )
            .await
            .unwrap();

        assert_eq!(output.columns, vec!["name", "marks"]);
        assert_eq!(
            output.rows,
            vec![
                vec![SqlValue::Text("Steve".to_string()), SqlValue::Integer(100)],
                vec![SqlValue::Text("Taylor".to_string()), SqlValue::Integer(95)],
            ]
        );
    }

    #[tokio::test]
    async fn decodes_every_sqlite_storage_class() {
        let db = seeded().await;
        let output = db
            .run("SELECT 1, 2.5, 'x', x'0102', NULL, AVG(marks) FROM student", StatementKind::Select)
            .await
            .unwrap();

        assert_eq!(
            output.rows,
            vec![vec![
                SqlValue::Integer(1),
                SqlValue::Real(2.5),
                SqlValue::Text("x".to_string()),
                SqlValue::Blob(vec![1, 2]),
                SqlValue::Null,
                SqlValue::Real(95.66666666666667),
            ]]
        );
    }

    #[test]
    fn introspection_cells_read_as_text() {
        let row = vec![
            SqlValue::Text("student".to_string()),
            SqlValue::Blob(b"marks".to_vec()),
            SqlValue::Null,
        ];
        assert_eq!(text_at(&row, 0), "student");
        assert_eq!(text_at(&row, 1), "marks");
        assert_eq!(text_at(&row, 2), "");
        assert_eq!(text_at(&row, 9), "");
        assert_eq!(undecodable("INTERVAL"), SqlValue::Text("<interval>".to_string()));
    }

    #[tokio::test]
    async fn mutations_report_affected_rows() {
        let db = seeded().await;
        let output = db
            .run("UPDATE student SET section = 'B' WHERE class = 'Data Science'", StatementKind::Update)
            .await
            .unwrap();
        assert_eq!(output.rows_affected, Some(2));
    }

    #[tokio::test]
    async fn invalid_sql_becomes_execution_error() {
        let db = seeded().await;
        let err = db
            .run("SELEC name FROM student", StatementKind::Other)
            .await
            .unwrap_err();

        match err {
            ExecutionError::Database(message) => assert!(message.contains("syntax error")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn unreachable_database_is_a_connection_error() {
        let result = SqlxDatabase::connect_url(
            "sqlite:///nonexistent-dir/definitely/missing.db",
            DriverKind::Sqlite,
            0,
        )
        .await;
        assert!(matches!(result, Err(ConnectionError::Unreachable { .. })));
    }
}
