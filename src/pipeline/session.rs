use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::db::connection::SqlxDatabase;
use crate::db::schema::SchemaSnapshot;
use crate::db::{ConnectionDescriptor, ConnectionError, SqlDatabase};
use crate::pipeline::conversation::Conversation;
use crate::pipeline::{Pipeline, TurnReport};

/// One connected database plus the conversation held against it.
pub struct Session {
    descriptor: ConnectionDescriptor,
    db: Box<dyn SqlDatabase>,
    conversation: Conversation,
    connected_at: DateTime<Utc>,
}

impl Session {
    /// Connects and verifies the database by introspecting it once. The
    /// snapshot taken for the check is handed back to the caller.
    pub async fn open(
        descriptor: ConnectionDescriptor,
        sample_rows: usize,
    ) -> Result<(Self, SchemaSnapshot), ConnectionError> {
        let db = SqlxDatabase::connect(&descriptor, sample_rows).await?;
        Self::verify(descriptor, Box::new(db)).await
    }

    /// Introspects an already connected database and starts a session on it.
    pub async fn verify(
        descriptor: ConnectionDescriptor,
        db: Box<dyn SqlDatabase>,
    ) -> Result<(Self, SchemaSnapshot), ConnectionError> {
        let schema = db.describe_schema().await?;
        info!(
            "Connected to {} ({} tables)",
            descriptor.redacted_url(),
            schema.tables.len()
        );
        Ok((Self::with_database(descriptor, db), schema))
    }

    pub fn with_database(descriptor: ConnectionDescriptor, db: Box<dyn SqlDatabase>) -> Self {
        Self {
            descriptor,
            db,
            conversation: Conversation::new(),
            connected_at: Utc::now(),
        }
    }

    /// Runs one question through the pipeline. The exchange is always recorded,
    /// failures included, so the history stays 2N+1 turns long.
    pub async fn ask(&mut self, pipeline: &Pipeline, question: &str) -> TurnReport {
        let report = match pipeline
            .run(question, self.db.as_ref(), self.conversation.turns())
            .await
        {
            Ok(turn) => TurnReport::completed(question, &turn),
            Err(e) => {
                warn!("Turn failed ({}): {}", e.kind(), e);
                TurnReport::failed(question, &e)
            }
        };

        self.conversation.record_exchange(question, &report.answer);
        report
    }

    pub async fn schema(&self) -> Result<SchemaSnapshot, ConnectionError> {
        self.db.describe_schema().await
    }

    pub fn database(&self) -> &dyn SqlDatabase {
        self.db.as_ref()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }
}
