//! Ask questions of a SQL database in plain language.
//!
//! A hosted model writes one SQL statement per question, the statement runs
//! against the connected database, and the model phrases the result as an
//! answer. Conversation history carries across turns.

pub mod config;
pub mod db;
pub mod llm;
pub mod pipeline;
pub mod util;
pub mod web;

#[cfg(test)]
pub(crate) mod test_support;
