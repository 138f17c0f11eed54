//! Runs against real servers when `ASKDB_TEST_POSTGRES_URL` /
//! `ASKDB_TEST_MYSQL_URL` are set; otherwise each test returns early.

use askdb::db::connection::SqlxDatabase;
use askdb::db::executor::StatementKind;
use askdb::db::{DriverKind, SqlDatabase, SqlValue};

async fn connect(var: &str, kind: DriverKind) -> Option<SqlxDatabase> {
    let url = std::env::var(var).ok()?;
    Some(SqlxDatabase::connect_url(&url, kind, 3).await.unwrap())
}

async fn exec(db: &SqlxDatabase, sql: &str) {
    db.run(sql, StatementKind::Other).await.unwrap();
}

#[tokio::test]
async fn postgres_numeric_and_temporal_columns_are_introspected() {
    let Some(db) = connect("ASKDB_TEST_POSTGRES_URL", DriverKind::Postgres).await else {
        return;
    };
    let table = format!("askdb_marks_{}", std::process::id());

    exec(&db, &format!("DROP TABLE IF EXISTS {table}")).await;
    exec(
        &db,
        &format!("CREATE TABLE {table} (name text, marks numeric, score int, joined date, seen timestamp, seen_tz timestamptz)"),
    )
    .await;
    exec(
        &db,
        &format!("INSERT INTO {table} VALUES ('Steve', 99.50, 100, '2024-09-01', '2024-09-01 08:30:00', '2024-09-01 08:30:00+00')"),
    )
    .await;

    let schema = db.describe_schema().await;
    let average = db
        .run(&format!("SELECT AVG(score) FROM {table}"), StatementKind::Select)
        .await;
    exec(&db, &format!("DROP TABLE {table}")).await;

    let schema = schema.unwrap();
    let marks = schema.table(&table).unwrap();
    assert_eq!(marks.columns[1].data_type, "numeric");
    assert_eq!(
        marks.sample_rows[0],
        vec![
            SqlValue::Text("Steve".to_string()),
            SqlValue::Text("99.50".to_string()),
            SqlValue::Integer(100),
            SqlValue::Text("2024-09-01".to_string()),
            SqlValue::Text("2024-09-01 08:30:00".to_string()),
            SqlValue::Text("2024-09-01T08:30:00+00:00".to_string()),
        ]
    );

    let average = average.unwrap();
    assert!(matches!(&average.rows[0][0], SqlValue::Text(v) if v.starts_with("100")));
}

#[tokio::test]
async fn mysql_decimal_and_temporal_columns_are_introspected() {
    let Some(db) = connect("ASKDB_TEST_MYSQL_URL", DriverKind::Mysql).await else {
        return;
    };
    let table = format!("askdb_marks_{}", std::process::id());

    exec(&db, &format!("DROP TABLE IF EXISTS {table}")).await;
    exec(
        &db,
        &format!("CREATE TABLE {table} (name VARCHAR(25), marks DECIMAL(5,2), score INT UNSIGNED, joined DATE, seen DATETIME)"),
    )
    .await;
    exec(
        &db,
        &format!("INSERT INTO {table} VALUES ('Steve', 99.50, 100, '2024-09-01', '2024-09-01 08:30:00')"),
    )
    .await;

    let schema = db.describe_schema().await;
    let total = db
        .run(&format!("SELECT SUM(score) FROM {table}"), StatementKind::Select)
        .await;
    exec(&db, &format!("DROP TABLE {table}")).await;

    let schema = schema.unwrap();
    let marks = schema.table(&table).unwrap();
    assert_eq!(marks.columns[1].data_type, "decimal(5,2)");
    assert_eq!(
        marks.sample_rows[0],
        vec![
            SqlValue::Text("Steve".to_string()),
            SqlValue::Text("99.50".to_string()),
            SqlValue::Integer(100),
            SqlValue::Text("2024-09-01".to_string()),
            SqlValue::Text("2024-09-01 08:30:00".to_string()),
        ]
    );

    let total = total.unwrap();
    assert_eq!(total.rows[0][0], SqlValue::Text("100".to_string()));
}
