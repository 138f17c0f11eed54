//! Stubs shared by unit tests: a scripted model and an in-memory database.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::db::executor::{ExecutionError, StatementKind};
use crate::db::schema::{ColumnSchema, SchemaSnapshot, TableSchema};
use crate::db::{ConnectionError, DriverKind, QueryOutput, SqlDatabase};
use crate::llm::{GenerationConfig, LlmError, LlmManager, TextGenerator};

#[derive(Default)]
struct Script {
    responses: VecDeque<String>,
    repeat: Option<String>,
    failure: Option<String>,
    prompts: Vec<String>,
}

/// Replies with canned outputs in order and records every prompt it receives.
#[derive(Clone, Default)]
pub struct ScriptedGenerator {
    script: Arc<Mutex<Script>>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let script = Script {
            responses: responses.into_iter().map(Into::into).collect(),
            ..Script::default()
        };
        Self {
            script: Arc::new(Mutex::new(script)),
        }
    }

    pub fn repeating(response: &str) -> Self {
        let script = Script {
            repeat: Some(response.to_string()),
            ..Script::default()
        };
        Self {
            script: Arc::new(Mutex::new(script)),
        }
    }

    pub fn failing(message: &str) -> Self {
        let script = Script {
            failure: Some(message.to_string()),
            ..Script::default()
        };
        Self {
            script: Arc::new(Mutex::new(script)),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.script.lock().unwrap().prompts.clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, prompt: &str, _config: &GenerationConfig) -> Result<String, LlmError> {
        let mut script = self.script.lock().unwrap();
        script.prompts.push(prompt.to_string());

        if let Some(message) = &script.failure {
            return Err(LlmError::ConnectionError(message.clone()));
        }
        if let Some(response) = script.responses.pop_front() {
            return Ok(response);
        }
        script
            .repeat
            .clone()
            .ok_or_else(|| LlmError::ResponseError("script exhausted".to_string()))
    }
}

pub fn manager(generator: &ScriptedGenerator) -> Arc<LlmManager> {
    Arc::new(LlmManager::with_generator(
        Box::new(generator.clone()),
        GenerationConfig::default(),
    ))
}

/// The STUDENT demo table, without sample rows.
pub fn student_schema() -> SchemaSnapshot {
    let column = |name: &str, data_type: &str| ColumnSchema {
        name: name.to_string(),
        data_type: data_type.to_string(),
        nullable: true,
    };
    SchemaSnapshot::new(vec![TableSchema::new(
        "student",
        vec![
            column("name", "VARCHAR(25)"),
            column("class", "VARCHAR(25)"),
            column("section", "VARCHAR(25)"),
            column("marks", "INT"),
        ],
    )])
}

/// Serves a fixed schema and a fixed result, counting statement runs and
/// schema reads.
pub struct FakeDatabase {
    schema: Option<SchemaSnapshot>,
    result: Result<QueryOutput, ExecutionError>,
    runs: AtomicUsize,
    describes: Arc<AtomicUsize>,
}

impl FakeDatabase {
    pub fn student() -> Self {
        Self {
            schema: Some(student_schema()),
            result: Ok(QueryOutput::default()),
            runs: AtomicUsize::new(0),
            describes: Arc::default(),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            schema: None,
            ..Self::student()
        }
    }

    pub fn with_result(mut self, result: Result<QueryOutput, ExecutionError>) -> Self {
        self.result = result;
        self
    }

    pub fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Shared counter of `describe_schema` calls, readable after the database is boxed.
    pub fn describe_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.describes)
    }
}

#[async_trait]
impl SqlDatabase for FakeDatabase {
    fn kind(&self) -> DriverKind {
        DriverKind::Sqlite
    }

    async fn describe_schema(&self) -> Result<SchemaSnapshot, ConnectionError> {
        self.describes.fetch_add(1, Ordering::SeqCst);
        self.schema.clone().ok_or_else(|| ConnectionError::Unreachable {
            target: "sqlite://student.db".to_string(),
            message: "unable to open database file".to_string(),
        })
    }

    async fn run(&self, _sql: &str, _kind: StatementKind) -> Result<QueryOutput, ExecutionError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}
