use std::path::Path;
use tracing::info;

use crate::db::connection::SqlxDatabase;
use crate::db::executor::StatementKind;
use crate::db::{DriverKind, SqlDatabase, SqlValue};

const STUDENT_DEMO: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS student (name VARCHAR(25), class VARCHAR(25), section VARCHAR(25), marks INT)",
    "DELETE FROM student",
    "INSERT INTO student VALUES ('Steve', 'Data Science', 'A', 100)",
    "INSERT INTO student VALUES ('Taylor', 'Data Science', 'A', 95)",
    "INSERT INTO student VALUES ('Al', 'Computer Vision', 'C', 92)",
    "INSERT INTO student VALUES ('Robert', 'Machine Learning', 'B', 95)",
];

/// Creates (or resets) a SQLite file holding the STUDENT demo table and
/// returns its row count.
pub async fn seed_student_demo(path: &Path) -> Result<i64, Box<dyn std::error::Error + Send + Sync>> {
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let db = SqlxDatabase::connect_url(&url, DriverKind::Sqlite, 0).await?;

    for statement in STUDENT_DEMO {
        db.run(statement, StatementKind::Other).await?;
    }

    let output = db
        .run("SELECT COUNT(*) FROM student", StatementKind::Select)
        .await?;
    db.close().await;

    let count = match output.rows.first().and_then(|row| row.first()) {
        Some(SqlValue::Integer(n)) => *n,
        _ => 0,
    };

    info!("Seeded demo database at {} with {} rows", path.display(), count);
    Ok(count)
}
