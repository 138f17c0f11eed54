use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::db::executor::StatementKind;
use crate::db::schema::SchemaSnapshot;
use crate::llm::extract::extract_sql;
use crate::llm::prompts::{PromptContext, PromptLibrary};
use crate::llm::{LlmError, LlmManager};
use crate::pipeline::conversation::{Turn, serialize_turns};

const NO_SCHEMA: &str = "(no schema available; infer table and column names from the question)";

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("generation failed: {0}")]
    Generation(#[from] LlmError),
    #[error("no SQL found in model output")]
    NoSqlFound { output: String },
    #[error("could not build prompt: {0}")]
    Prompt(String),
}

/// A statement produced for one question, with what it was derived from.
#[derive(Debug, Clone, Serialize)]
pub struct SynthesizedQuery {
    pub sql: String,
    pub kind: StatementKind,
    pub question: String,
    #[serde(skip)]
    pub schema: Arc<SchemaSnapshot>,
}

pub struct QuerySynthesizer {
    llm: Arc<LlmManager>,
    prompts: Arc<PromptLibrary>,
}

impl QuerySynthesizer {
    pub fn new(llm: Arc<LlmManager>, prompts: Arc<PromptLibrary>) -> Self {
        Self { llm, prompts }
    }

    pub async fn synthesize(
        &self,
        question: &str,
        schema: Arc<SchemaSnapshot>,
        dialect: &str,
        history: &[Turn],
    ) -> Result<SynthesizedQuery, SynthesisError> {
        let ddl = if schema.is_empty() {
            NO_SCHEMA.to_string()
        } else {
            schema.to_ddl()
        };
        let history = serialize_turns(history);

        let prompt = self
            .prompts
            .sql_query(&PromptContext {
                dialect,
                schema: &ddl,
                history: &history,
                question,
            })
            .map_err(|e| SynthesisError::Prompt(e.to_string()))?;

        let raw = self.llm.complete(&prompt).await?;
        debug!("Raw model output: {}", raw);

        let sql = extract_sql(&raw).ok_or_else(|| {
            warn!("Model output contained no SQL statement");
            SynthesisError::NoSqlFound {
                output: excerpt(&raw),
            }
        })?;

        info!("Synthesized SQL: {}", sql);
        Ok(SynthesizedQuery {
            kind: StatementKind::classify(&sql),
            sql,
            question: question.to_string(),
            schema,
        })
    }
}

fn excerpt(raw: &str) -> String {
    const MAX: usize = 200;
    let trimmed = raw.trim();
    match trimmed.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedGenerator, manager, student_schema};

    #[tokio::test]
    async fn extracts_sql_from_chatty_output() {
        let generator = ScriptedGenerator::new([
            "Here is the query:\n```sql\nSELECT COUNT(*) FROM student;\n```\nIt counts students.",
        ]);
        let synthesizer = QuerySynthesizer::new(manager(&generator), Arc::new(PromptLibrary::new()));

        let query = synthesizer
            .synthesize("How many students?", Arc::new(student_schema()), "SQLite", &[])
            .await
            .unwrap();

        assert_eq!(query.sql, "SELECT COUNT(*) FROM student;");
        assert_eq!(query.kind, StatementKind::Select);
        assert_eq!(query.question, "How many students?");
        assert!(query.schema.table("student").is_some());
    }

    #[tokio::test]
    async fn prompt_carries_schema_history_and_question() {
        let generator = ScriptedGenerator::new(["SELECT name FROM student;"]);
        let synthesizer = QuerySynthesizer::new(manager(&generator), Arc::new(PromptLibrary::new()));
        let history = vec![Turn::human("Who scored 100?"), Turn::assistant("Steve did.")];

        synthesizer
            .synthesize("And in section C?", Arc::new(student_schema()), "MySQL", &history)
            .await
            .unwrap();

        let prompt = generator.prompts().pop().unwrap();
        assert!(prompt.contains("company's MySQL database"));
        assert!(prompt.contains("CREATE TABLE student ("));
        assert!(prompt.contains("Human: Who scored 100?\nAssistant: Steve did."));
        assert!(prompt.contains("Question: And in section C?"));
    }

    #[tokio::test]
    async fn prose_only_output_is_a_synthesis_error() {
        let generator = ScriptedGenerator::new(["I'm not sure which table holds that."]);
        let synthesizer = QuerySynthesizer::new(manager(&generator), Arc::new(PromptLibrary::new()));

        let err = synthesizer
            .synthesize("What is the meaning of life?", Arc::new(student_schema()), "SQLite", &[])
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "no SQL found in model output");
        match err {
            SynthesisError::NoSqlFound { output } => {
                assert_eq!(output, "I'm not sure which table holds that.")
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn generation_failure_is_a_synthesis_error() {
        let generator = ScriptedGenerator::failing("connection refused");
        let synthesizer = QuerySynthesizer::new(manager(&generator), Arc::new(PromptLibrary::new()));

        let err = synthesizer
            .synthesize("How many students?", Arc::new(student_schema()), "SQLite", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::Generation(LlmError::ConnectionError(_))));
    }

    #[tokio::test]
    async fn same_inputs_give_same_sql() {
        let generator = ScriptedGenerator::repeating(
            "SELECT COUNT(*) FROM STUDENT WHERE class='Data Science';",
        );
        let synthesizer = QuerySynthesizer::new(manager(&generator), Arc::new(PromptLibrary::new()));
        let schema = Arc::new(student_schema());

        let first = synthesizer
            .synthesize("How many students are in Data Science class?", schema.clone(), "SQLite", &[])
            .await
            .unwrap();
        let second = synthesizer
            .synthesize("How many students are in Data Science class?", schema, "SQLite", &[])
            .await
            .unwrap();

        assert_eq!(first.sql, second.sql);
        let prompts = generator.prompts();
        assert_eq!(prompts[0], prompts[1]);
    }

    #[tokio::test]
    async fn missing_schema_uses_placeholder() {
        let generator = ScriptedGenerator::new(["SELECT * FROM orders;"]);
        let synthesizer = QuerySynthesizer::new(manager(&generator), Arc::new(PromptLibrary::new()));

        synthesizer
            .synthesize("List all orders", Arc::new(SchemaSnapshot::default()), "SQL", &[])
            .await
            .unwrap();

        assert!(generator.prompts()[0].contains(NO_SCHEMA));
    }

    #[test]
    fn excerpt_truncates_long_output() {
        let long = "x".repeat(500);
        assert_eq!(excerpt(&long).len(), 203);
        assert_eq!(excerpt("  short  "), "short");
    }
}
