use minijinja::{Environment, context};
use tracing::debug;

const SQL_QUERY_TEMPLATE: &str = r#"You are a data analyst at a company. You are interacting with a user who is asking you questions about the company's {{ dialect }} database.
Based on the table schema below, write a single SQL query that would answer the user's question. Take the conversation history into account.

<SCHEMA>
{{ schema }}
</SCHEMA>

Conversation History:
{{ history }}

Write only the SQL query, terminated by a semicolon, and nothing else.

For example:
Question: which 3 artists have the most tracks?
SQL Query: SELECT ArtistId, COUNT(*) AS track_count FROM Track GROUP BY ArtistId ORDER BY track_count DESC LIMIT 3;
Question: Name 10 artists
SQL Query: SELECT Name FROM Artist LIMIT 10;

Your turn:

Question: {{ question }}
SQL Query:"#;

const ANSWER_TEMPLATE: &str = r#"You are a data analyst at a company. You are interacting with a user who is asking you questions about the company's {{ dialect }} database.
Based on the table schema, conversation history, question, SQL query and SQL response below, write a natural language response.
Only state facts that appear in the SQL response.
{%- if outcome == "failed" %}
The query failed. Explain to the user, in plain words, why it failed. Do not make up any data.
{%- elif outcome == "empty" %}
The query returned no rows. Tell the user that no matching records were found. Do not make up any data.
{%- endif %}

<SCHEMA>
{{ schema }}
</SCHEMA>

Conversation History:
{{ history }}

SQL Query: <SQL>{{ sql }}</SQL>
User question: {{ question }}
SQL Response: {{ response }}"#;

/// How the executed statement ended, as far as the answer prompt cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    Rows,
    Empty,
    Failed,
}

impl ResultShape {
    fn as_str(&self) -> &'static str {
        match self {
            ResultShape::Rows => "rows",
            ResultShape::Empty => "empty",
            ResultShape::Failed => "failed",
        }
    }
}

/// Inputs shared by both prompts.
pub struct PromptContext<'a> {
    pub dialect: &'a str,
    pub schema: &'a str,
    pub history: &'a str,
    pub question: &'a str,
}

pub struct PromptLibrary {
    env: Environment<'static>,
}

impl PromptLibrary {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("sql_query.txt", SQL_QUERY_TEMPLATE)
            .expect("valid sql query template");
        env.add_template("answer.txt", ANSWER_TEMPLATE)
            .expect("valid answer template");
        Self { env }
    }

    pub fn sql_query(&self, ctx: &PromptContext<'_>) -> Result<String, minijinja::Error> {
        let prompt = self.env.get_template("sql_query.txt")?.render(context! {
            dialect => ctx.dialect,
            schema => ctx.schema,
            history => history_or_placeholder(ctx.history),
            question => ctx.question,
        })?;
        debug!("Prepared SQL prompt: {}", prompt);
        Ok(prompt)
    }

    pub fn answer(
        &self,
        ctx: &PromptContext<'_>,
        sql: &str,
        response: &str,
        shape: ResultShape,
    ) -> Result<String, minijinja::Error> {
        let prompt = self.env.get_template("answer.txt")?.render(context! {
            dialect => ctx.dialect,
            schema => ctx.schema,
            history => history_or_placeholder(ctx.history),
            question => ctx.question,
            sql => sql,
            response => response,
            outcome => shape.as_str(),
        })?;
        debug!("Prepared answer prompt: {}", prompt);
        Ok(prompt)
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::new()
    }
}

fn history_or_placeholder(history: &str) -> &str {
    if history.trim().is_empty() {
        "(none)"
    } else {
        history
    }
}
