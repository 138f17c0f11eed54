use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ExecutorConfig;
use crate::db::schema::SchemaSnapshot;
use crate::db::{QueryOutput, SqlDatabase};

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum ExecutionError {
    /// Refused before reaching the database.
    #[error("statement rejected: {0}")]
    Rejected(String),
    /// The driver's message, verbatim.
    #[error("{0}")]
    Database(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Other,
}

static LITERAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'(?:[^']|'')*'").expect("valid literal regex"));
static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)--[^\n]*|/\*.*?\*/").expect("valid comment regex"));
static DML_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(insert|update|delete)\b").expect("valid dml regex"));
static INTO_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\binto\b").expect("valid into regex"));

const IDENT: &str = r#"(?:"[^"]+"|`[^`]+`|\[[^\]]+\]|[A-Za-z_][A-Za-z0-9_$]*)"#;

static TABLE_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(from|join|into|update)\s+({IDENT}(?:\s*\.\s*{IDENT})*)"
    ))
    .expect("valid table reference regex")
});
// `, other_table` following a FROM item, with an optional alias in between
static FROM_LIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^\s*(?:as\s+)?(?:{IDENT})?\s*,\s*({IDENT}(?:\s*\.\s*{IDENT})*)"
    ))
    .expect("valid from-list regex")
});
static CTE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([A-Za-z_][A-Za-z0-9_]*)\s*(?:\([^)]*\))?\s+as\s*\(")
        .expect("valid cte regex")
});

const SYSTEM_SCHEMAS: &[&str] = &[
    "information_schema",
    "pg_catalog",
    "mysql",
    "sys",
    "performance_schema",
];

// Words that can follow FROM/JOIN/UPDATE without naming a table
const NON_TABLE_WORDS: &[&str] = &["select", "set", "lateral", "only", "values", "dual"];

impl StatementKind {
    pub fn classify(sql: &str) -> Self {
        let cleaned = strip_literals_and_comments(sql);
        let first = cleaned
            .split(|c: char| c.is_whitespace() || c == '(')
            .find(|word| !word.is_empty())
            .unwrap_or("")
            .to_ascii_lowercase();

        match first.as_str() {
            // SELECT ... INTO new_table / INTO OUTFILE writes
            "select" if INTO_WORD_RE.is_match(&top_level(&cleaned)) => StatementKind::Insert,
            "select" => StatementKind::Select,
            "insert" | "replace" => StatementKind::Insert,
            "update" => StatementKind::Update,
            "delete" => StatementKind::Delete,
            "with" => match DML_WORD_RE
                .captures(&cleaned)
                .map(|c| c[1].to_ascii_lowercase())
                .as_deref()
            {
                Some("insert") => StatementKind::Insert,
                Some("update") => StatementKind::Update,
                Some("delete") => StatementKind::Delete,
                _ if INTO_WORD_RE.is_match(&top_level(&cleaned)) => StatementKind::Insert,
                _ => StatementKind::Select,
            },
            _ => StatementKind::Other,
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, StatementKind::Select)
    }
}

fn strip_literals_and_comments(sql: &str) -> String {
    let without_comments = COMMENT_RE.replace_all(sql, " ");
    LITERAL_RE.replace_all(&without_comments, "''").into_owned()
}

// Blanks out everything nested in parentheses.
fn top_level(sql: &str) -> String {
    let mut depth = 0usize;
    sql.chars()
        .map(|c| match c {
            '(' => {
                depth += 1;
                ' '
            }
            ')' => {
                depth = depth.saturating_sub(1);
                ' '
            }
            _ if depth > 0 => ' ',
            _ => c,
        })
        .collect()
}

fn unquote(ident: &str) -> &str {
    ident
        .trim()
        .trim_matches(|c| c == '"' || c == '`' || c == '[' || c == ']')
}

/// Tables a statement reads or writes, as written (possibly schema-qualified).
pub fn referenced_tables(sql: &str) -> Vec<String> {
    let cleaned = strip_literals_and_comments(sql);
    let mut tables = Vec::new();

    for caps in TABLE_REF_RE.captures_iter(&cleaned) {
        let keyword = caps[1].to_ascii_lowercase();
        let name = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        let end = caps.get(0).map(|m| m.end()).unwrap_or_default();
        let rest = &cleaned[end..];

        // FROM generate_series(...) and friends
        if keyword != "into" && rest.trim_start().starts_with('(') {
            continue;
        }
        if NON_TABLE_WORDS.contains(&unquote(name).to_ascii_lowercase().as_str()) {
            continue;
        }
        tables.push(name.to_string());

        if keyword == "from" {
            let mut tail = rest;
            while let Some(list_caps) = FROM_LIST_RE.captures(tail) {
                let Some(next) = list_caps.get(1) else { break };
                tables.push(next.as_str().to_string());
                tail = &tail[next.end()..];
            }
        }
    }

    tables
}

fn cte_names(sql: &str) -> HashSet<String> {
    let cleaned = strip_literals_and_comments(sql);
    CTE_NAME_RE
        .captures_iter(&cleaned)
        .map(|c| c[1].to_ascii_lowercase())
        .collect()
}

/// Runs synthesized statements against a live database, after the mutation gate
/// and the table allow-list.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    config: ExecutorConfig,
}

impl QueryExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    /// Checks a statement against the executor policy without touching the database.
    pub fn check(&self, sql: &str, schema: &SchemaSnapshot) -> Result<StatementKind, ExecutionError> {
        let kind = StatementKind::classify(sql);

        if !kind.is_read_only() && !self.config.allow_mutations {
            return Err(ExecutionError::Rejected(format!(
                "{:?} statements are disabled; only SELECT queries may run",
                kind
            )));
        }

        if self.config.enforce_table_allow_list {
            let ctes = cte_names(sql);
            for reference in referenced_tables(sql) {
                let parts: Vec<&str> = reference.split('.').map(unquote).collect();
                let table = parts.last().copied().unwrap_or_default();

                if parts.len() > 1 {
                    let qualifier = parts[parts.len() - 2].to_ascii_lowercase();
                    if SYSTEM_SCHEMAS.contains(&qualifier.as_str()) {
                        return Err(ExecutionError::Rejected(format!(
                            "system table {} is not accessible",
                            reference
                        )));
                    }
                }

                let known = schema.table(table).is_some()
                    || ctes.contains(&table.to_ascii_lowercase())
                    // EXTRACT(YEAR FROM col) and similar
                    || schema.has_column(table);
                if !known {
                    return Err(ExecutionError::Rejected(format!(
                        "table {} is not part of the database schema",
                        reference
                    )));
                }
            }
        }

        Ok(kind)
    }

    pub async fn execute(
        &self,
        sql: &str,
        schema: &SchemaSnapshot,
        db: &dyn SqlDatabase,
    ) -> Result<QueryOutput, ExecutionError> {
        let kind = match self.check(sql, schema) {
            Ok(kind) => kind,
            Err(e) => {
                warn!("Refusing to run statement: {}", e);
                return Err(e);
            }
        };

        debug!("Executing {:?} statement: {}", kind, sql);
        let start_time = std::time::Instant::now();

        match db.run(sql, kind).await {
            Ok(output) => {
                info!(
                    "Query executed successfully. Row count: {}, Execution time: {}ms",
                    output.rows.len(),
                    start_time.elapsed().as_millis()
                );
                Ok(output)
            }
            Err(e) => {
                warn!("Database rejected statement: {}", e);
                Err(e)
            }
        }
    }
}
