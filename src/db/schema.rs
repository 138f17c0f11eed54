use serde::Serialize;

use crate::db::SqlValue;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

impl ColumnSchema {
    pub fn to_sql_definition(&self) -> String {
        let nullable_str = if self.nullable { "" } else { " NOT NULL" };
        format!("{} {}{}", self.name, self.data_type, nullable_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
    /// A few rows from the table, included in the prompt when sampling is enabled.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sample_rows: Vec<Vec<SqlValue>>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSchema>) -> Self {
        Self {
            name: name.into(),
            columns,
            sample_rows: Vec::new(),
        }
    }

    pub fn to_create_table_sql(&self) -> String {
        let columns_sql: Vec<String> = self
            .columns
            .iter()
            .map(|col| col.to_sql_definition())
            .collect();

        format!(
            "CREATE TABLE {} (\n    {}\n);",
            self.name,
            columns_sql.join(",\n    ")
        )
    }

    // DDL plus the sample block, used as LLM context
    pub fn to_ddl(&self) -> String {
        let mut ddl = self.to_create_table_sql();

        if !self.sample_rows.is_empty() {
            let header: Vec<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
            ddl.push_str(&format!(
                "\n\n/*\n{} rows from {} table:\n{}",
                self.sample_rows.len(),
                self.name,
                header.join("\t")
            ));
            for row in &self.sample_rows {
                let cells: Vec<String> = row
                    .iter()
                    .map(|value| match value {
                        SqlValue::Text(text) => text.clone(),
                        other => other.to_string(),
                    })
                    .collect();
                ddl.push('\n');
                ddl.push_str(&cells.join("\t"));
            }
            ddl.push_str("\n*/");
        }

        ddl
    }
}

/// Tables and columns of the connected database, ordered by table name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaSnapshot {
    pub tables: Vec<TableSchema>,
}

impl SchemaSnapshot {
    pub fn new(mut tables: Vec<TableSchema>) -> Self {
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        Self { tables }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.tables
            .iter()
            .flat_map(|t| t.columns.iter())
            .any(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn to_ddl(&self) -> String {
        if self.tables.is_empty() {
            return "(no tables found)".to_string();
        }

        self.tables
            .iter()
            .map(|t| t.to_ddl())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, data_type: &str, nullable: bool) -> ColumnSchema {
        ColumnSchema {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable,
        }
    }

    fn student() -> TableSchema {
        TableSchema::new(
            "student",
            vec![
                column("name", "VARCHAR(25)", true),
                column("class", "VARCHAR(25)", true),
                column("section", "VARCHAR(25)", true),
                column("marks", "INT", false),
            ],
        )
    }

    #[test]
    fn ddl_lists_columns_in_order() {
        assert_eq!(
            student().to_ddl(),
            "CREATE TABLE student (\n    name VARCHAR(25),\n    class VARCHAR(25),\n    section VARCHAR(25),\n    marks INT NOT NULL\n);"
        );
    }

    #[test]
    fn sample_rows_are_appended_as_comment() {
        let mut table = student();
        table.sample_rows = vec![vec![
            SqlValue::Text("Steve".to_string()),
            SqlValue::Text("Data Science".to_string()),
            SqlValue::Text("A".to_string()),
            SqlValue::Integer(100),
        ]];

        let ddl = table.to_ddl();
        assert!(ddl.ends_with(
            "/*\n1 rows from student table:\nname\tclass\tsection\tmarks\nSteve\tData Science\tA\t100\n*/"
        ));
    }

    #[test]
    fn snapshot_sorts_tables_and_looks_up_case_insensitively() {
        let snapshot = SchemaSnapshot::new(vec![
            TableSchema::new("track", vec![column("id", "INTEGER", false)]),
            student(),
            TableSchema::new("artist", vec![column("id", "INTEGER", false)]),
        ]);

        assert_eq!(snapshot.table_names(), vec!["artist", "student", "track"]);
        assert!(snapshot.table("STUDENT").is_some());
        assert!(snapshot.has_column("Marks"));
        assert!(!snapshot.has_column("salary"));
    }

    #[test]
    fn empty_snapshot_says_so() {
        assert_eq!(SchemaSnapshot::default().to_ddl(), "(no tables found)");
    }
}
