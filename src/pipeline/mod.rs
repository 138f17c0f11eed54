//! The question → SQL → rows → answer pipeline.
//!
//! A turn runs strictly in order: introspect the schema, synthesize one
//! statement, execute it, compose the answer. A synthesis failure stops the
//! turn before anything is executed. Execution failures are not fatal; they are
//! handed to the composer so the user gets an explanation.

pub mod composer;
pub mod conversation;
pub mod session;
pub mod synthesizer;

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::config::{ComposerConfig, ExecutorConfig};
use crate::db::executor::{ExecutionError, QueryExecutor};
use crate::db::schema::SchemaSnapshot;
use crate::db::{ConnectionError, DriverKind, QueryOutput, SqlDatabase};
use crate::llm::LlmManager;
use crate::llm::prompts::PromptLibrary;
use crate::pipeline::composer::{AnswerComposer, CompositionError};
use crate::pipeline::conversation::Turn;
use crate::pipeline::synthesizer::{QuerySynthesizer, SynthesisError, SynthesizedQuery};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
    #[error(transparent)]
    Composition(#[from] CompositionError),
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Connection(_) => "connection",
            PipelineError::Synthesis(_) => "synthesis",
            PipelineError::Composition(_) => "composition",
        }
    }

    /// What the assistant says when a turn fails.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Connection(e) => format!("I couldn't reach the database: {}", e),
            PipelineError::Synthesis(SynthesisError::NoSqlFound { .. }) => {
                "I couldn't turn that question into a SQL query. Could you rephrase it?".to_string()
            }
            PipelineError::Synthesis(e) => {
                format!("I couldn't write a query for that question: {}", e)
            }
            PipelineError::Composition(e) => {
                format!("The query ran, but I couldn't write up an answer: {}", e)
            }
        }
    }
}

/// Everything produced by a successful turn.
#[derive(Debug)]
pub struct CompletedTurn {
    pub query: SynthesizedQuery,
    pub result: Result<QueryOutput, ExecutionError>,
    pub answer: String,
}

/// What the conversation boundary gets back for one question.
#[derive(Debug, Clone, Serialize)]
pub struct TurnReport {
    pub question: String,
    pub sql: Option<String>,
    pub row_count: Option<usize>,
    pub rows_affected: Option<u64>,
    pub execution_error: Option<ExecutionError>,
    pub answer: String,
    pub failure: Option<&'static str>,
}

impl TurnReport {
    pub fn completed(question: &str, turn: &CompletedTurn) -> Self {
        let (row_count, rows_affected, execution_error) = match &turn.result {
            Ok(output) => (Some(output.rows.len()), output.rows_affected, None),
            Err(e) => (None, None, Some(e.clone())),
        };

        Self {
            question: question.to_string(),
            sql: Some(turn.query.sql.clone()),
            row_count,
            rows_affected,
            execution_error,
            answer: turn.answer.clone(),
            failure: None,
        }
    }

    pub fn failed(question: &str, error: &PipelineError) -> Self {
        Self {
            question: question.to_string(),
            sql: None,
            row_count: None,
            rows_affected: None,
            execution_error: None,
            answer: error.user_message(),
            failure: Some(error.kind()),
        }
    }
}

pub struct Pipeline {
    synthesizer: QuerySynthesizer,
    executor: QueryExecutor,
    composer: AnswerComposer,
}

impl Pipeline {
    pub fn new(
        llm: Arc<LlmManager>,
        executor_config: ExecutorConfig,
        composer_config: ComposerConfig,
    ) -> Self {
        let prompts = Arc::new(PromptLibrary::new());
        Self {
            synthesizer: QuerySynthesizer::new(Arc::clone(&llm), Arc::clone(&prompts)),
            executor: QueryExecutor::new(executor_config),
            composer: AnswerComposer::new(llm, prompts, composer_config),
        }
    }

    /// Runs one full turn against `db`. `history` excludes the current question.
    pub async fn run(
        &self,
        question: &str,
        db: &dyn SqlDatabase,
        history: &[Turn],
    ) -> Result<CompletedTurn, PipelineError> {
        let schema = Arc::new(db.describe_schema().await?);
        let dialect = db.kind().dialect();

        let query = self
            .synthesizer
            .synthesize(question, Arc::clone(&schema), dialect, history)
            .await?;

        let result = self.executor.execute(&query.sql, &schema, db).await;

        let answer = self
            .composer
            .compose(question, &schema, dialect, &query.sql, &result, history)
            .await?;

        info!("Turn completed for question: {}", question);
        Ok(CompletedTurn {
            query,
            result,
            answer,
        })
    }

    /// SQL only, nothing executed. Uses the schema when one is known.
    pub async fn translate(
        &self,
        question: &str,
        schema: Option<(SchemaSnapshot, DriverKind)>,
    ) -> Result<SynthesizedQuery, SynthesisError> {
        let (schema, dialect) = match schema {
            Some((schema, kind)) => (schema, kind.dialect()),
            None => (SchemaSnapshot::default(), "SQL"),
        };
        self.synthesizer
            .synthesize(question, Arc::new(schema), dialect, &[])
            .await
    }
}
