//! In-process store with optional JSON snapshot persistence.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{IterationRecord, SessionPatch, Store, StoreError};
use crate::domain::{
    DraftMessage, Iteration, Project, Question, Session, SessionStatus, ADDITIONAL_QUESTIONS_TITLE,
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Tables {
    #[serde(default)]
    sessions: HashMap<Uuid, Session>,
    #[serde(default)]
    iterations: HashMap<Uuid, Iteration>,
    #[serde(default)]
    questions: HashMap<Uuid, Question>,
    #[serde(default)]
    draft_messages: Vec<DraftMessage>,
    #[serde(default)]
    projects: HashMap<Uuid, Project>,
}

/// Store backed by maps behind a single `RwLock`.
///
/// The write lock is held across each read-compare-write, which makes
/// [`Store::transition`] and [`Store::insert_iterations`] atomic. When a
/// snapshot path is set, every mutation rewrites the snapshot file before the
/// lock is released.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    snapshot_path: Option<PathBuf>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            snapshot_path: None,
        }
    }

    /// Open a store persisted at `path`, restoring any existing snapshot.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let tables = if path.exists() {
            let contents =
                std::fs::read_to_string(&path).context("Failed to read store snapshot")?;
            serde_json::from_str(&contents).context("Failed to parse store snapshot")?
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create store snapshot directory")?;
            }
            Tables::default()
        };

        tracing::debug!(path = %path.display(), "Opened session store");

        Ok(Self {
            tables: RwLock::new(tables),
            snapshot_path: Some(path),
        })
    }

    async fn persist(&self, tables: &Tables) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let contents = serde_json::to_string_pretty(tables)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        tokio::fs::write(path, contents)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

fn not_found(entity: &'static str, id: Uuid) -> StoreError {
    StoreError::NotFound { entity, id }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_session(&self, session: Session) -> Result<Session, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.sessions.contains_key(&session.id) {
            return Err(StoreError::Conflict(format!(
                "session {} already exists",
                session.id
            )));
        }
        tables.sessions.insert(session.id, session.clone());
        self.persist(&tables).await?;
        Ok(session)
    }

    async fn get_session(&self, id: Uuid) -> Result<Session, StoreError> {
        let tables = self.tables.read().await;
        tables
            .sessions
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("session", id))
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: &[SessionStatus],
        patch: SessionPatch,
    ) -> Result<Session, StoreError> {
        let mut tables = self.tables.write().await;
        let session = tables
            .sessions
            .get_mut(&id)
            .ok_or_else(|| not_found("session", id))?;

        if !expected.contains(&session.status) {
            return Err(StoreError::StatusMismatch {
                actual: session.status,
            });
        }

        patch.apply(session);
        session.updated_at = Utc::now();
        let updated = session.clone();
        self.persist(&tables).await?;
        Ok(updated)
    }

    async fn advance_iteration(&self, id: Uuid, from: u32, to: u32) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let session = tables
            .sessions
            .get_mut(&id)
            .ok_or_else(|| not_found("session", id))?;

        if session.current_iteration != from {
            return Ok(false);
        }

        session.current_iteration = to;
        session.updated_at = Utc::now();
        self.persist(&tables).await?;
        Ok(true)
    }

    async fn insert_iterations(
        &self,
        session_id: Uuid,
        expected: &[SessionStatus],
        records: Vec<IterationRecord>,
        patch: SessionPatch,
    ) -> Result<(Session, Vec<IterationRecord>), StoreError> {
        let mut tables = self.tables.write().await;
        let actual = tables
            .sessions
            .get(&session_id)
            .map(|s| s.status)
            .ok_or_else(|| not_found("session", session_id))?;
        if !expected.contains(&actual) {
            return Err(StoreError::StatusMismatch { actual });
        }

        let existing = tables
            .iterations
            .values()
            .filter(|it| it.session_id == session_id);
        let mut max_number = 0;
        let mut has_round = false;
        for it in existing {
            max_number = max_number.max(it.number);
            has_round |= it.title == ADDITIONAL_QUESTIONS_TITLE;
        }
        if has_round
            && records
                .iter()
                .any(|r| r.iteration.title == ADDITIONAL_QUESTIONS_TITLE)
        {
            return Err(StoreError::RoundExists { actual });
        }

        // Everything is checked above; from here on nothing can fail halfway
        let mut saved = Vec::with_capacity(records.len());
        for (offset, mut record) in (1u32..).zip(records) {
            record.iteration.session_id = session_id;
            record.iteration.number = max_number + offset;
            for question in &mut record.questions {
                question.iteration_id = record.iteration.id;
                tables.questions.insert(question.id, question.clone());
            }
            tables
                .iterations
                .insert(record.iteration.id, record.iteration.clone());
            saved.push(record);
        }

        let session = tables
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| not_found("session", session_id))?;
        patch.apply(session);
        session.updated_at = Utc::now();
        let updated = session.clone();
        self.persist(&tables).await?;
        Ok((updated, saved))
    }

    async fn get_iteration(&self, id: Uuid) -> Result<Iteration, StoreError> {
        let tables = self.tables.read().await;
        tables
            .iterations
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("iteration", id))
    }

    async fn list_iterations(&self, session_id: Uuid) -> Result<Vec<Iteration>, StoreError> {
        let tables = self.tables.read().await;
        let mut iterations: Vec<Iteration> = tables
            .iterations
            .values()
            .filter(|it| it.session_id == session_id)
            .cloned()
            .collect();
        iterations.sort_by_key(|it| it.number);
        Ok(iterations)
    }

    async fn get_question(&self, id: Uuid) -> Result<Question, StoreError> {
        let tables = self.tables.read().await;
        tables
            .questions
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("question", id))
    }

    async fn update_question(&self, question: &Question) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .questions
            .get_mut(&question.id)
            .ok_or_else(|| not_found("question", question.id))?;
        *slot = question.clone();
        self.persist(&tables).await
    }

    async fn list_questions(&self, iteration_id: Uuid) -> Result<Vec<Question>, StoreError> {
        let tables = self.tables.read().await;
        let mut questions: Vec<Question> = tables
            .questions
            .values()
            .filter(|q| q.iteration_id == iteration_id)
            .cloned()
            .collect();
        questions.sort_by_key(|q| q.number);
        Ok(questions)
    }

    async fn append_draft_message(
        &self,
        message: DraftMessage,
        max: usize,
    ) -> Result<DraftMessage, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.sessions.contains_key(&message.session_id) {
            return Err(not_found("session", message.session_id));
        }
        let count = tables
            .draft_messages
            .iter()
            .filter(|m| m.session_id == message.session_id)
            .count();
        if count >= max {
            return Err(StoreError::LimitReached { max });
        }
        tables.draft_messages.push(message.clone());
        self.persist(&tables).await?;
        Ok(message)
    }

    async fn list_draft_messages(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<DraftMessage>, StoreError> {
        let tables = self.tables.read().await;
        // Vec is append-only, so insertion order is creation order
        Ok(tables
            .draft_messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn create_project(&self, project: Project) -> Result<Project, StoreError> {
        let mut tables = self.tables.write().await;
        tables.projects.insert(project.id, project.clone());
        self.persist(&tables).await?;
        Ok(project)
    }

    async fn get_project(&self, id: Uuid) -> Result<Project, StoreError> {
        let tables = self.tables.read().await;
        tables
            .projects
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("project", id))
    }

    async fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        let tables = self.tables.read().await;
        let mut projects: Vec<Project> = tables.projects.values().cloned().collect();
        projects.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(projects)
    }
}
