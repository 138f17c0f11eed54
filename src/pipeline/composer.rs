use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ComposerConfig;
use crate::db::QueryOutput;
use crate::db::executor::ExecutionError;
use crate::db::schema::SchemaSnapshot;
use crate::llm::prompts::{PromptContext, PromptLibrary, ResultShape};
use crate::llm::{LlmError, LlmManager};
use crate::pipeline::conversation::{Turn, serialize_turns};

pub const NO_RECORDS_ANSWER: &str = "No matching records were found for your question.";

#[derive(Debug, Error)]
pub enum CompositionError {
    #[error("generation failed: {0}")]
    Generation(#[from] LlmError),
    #[error("the model returned an empty answer")]
    EmptyAnswer,
    #[error("could not build prompt: {0}")]
    Prompt(String),
}

/// Turns an execution result into a natural-language answer.
pub struct AnswerComposer {
    llm: Arc<LlmManager>,
    prompts: Arc<PromptLibrary>,
    config: ComposerConfig,
}

impl AnswerComposer {
    pub fn new(llm: Arc<LlmManager>, prompts: Arc<PromptLibrary>, config: ComposerConfig) -> Self {
        Self {
            llm,
            prompts,
            config,
        }
    }

    pub async fn compose(
        &self,
        question: &str,
        schema: &SchemaSnapshot,
        dialect: &str,
        sql: &str,
        result: &Result<QueryOutput, ExecutionError>,
        history: &[Turn],
    ) -> Result<String, CompositionError> {
        let (response, shape) = match result {
            Ok(output) if output.is_empty() => ("[]".to_string(), ResultShape::Empty),
            Ok(output) => (output.render(self.config.max_prompt_rows), ResultShape::Rows),
            Err(e) => (e.to_string(), ResultShape::Failed),
        };

        let ddl = schema.to_ddl();
        let history = serialize_turns(history);
        let prompt = self
            .prompts
            .answer(
                &PromptContext {
                    dialect,
                    schema: &ddl,
                    history: &history,
                    question,
                },
                sql,
                &response,
                shape,
            )
            .map_err(|e| CompositionError::Prompt(e.to_string()))?;

        let raw = self.llm.complete(&prompt).await?;
        let answer = raw.trim();
        debug!("Composed answer: {}", answer);

        if answer.is_empty() {
            if shape == ResultShape::Empty {
                return Ok(NO_RECORDS_ANSWER.to_string());
            }
            warn!("Model returned an empty answer for a {:?} result", shape);
            return Err(CompositionError::EmptyAnswer);
        }

        Ok(answer.to_string())
    }
}
