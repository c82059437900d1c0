//! Chat-side navigation over a session.
//!
//! A [`Navigator`] keeps one [`ConversationState`] per user and drives the
//! [`SessionEngine`] from it: linear answering with a single back step and a
//! forward stack, replay of skipped questions, a persisted guard against
//! double-triggered generation, and confirmation of destructive actions.
//! Every step returns an [`Outcome`] for the dispatcher to render.

mod errors;
mod state;
mod store;

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::config::NavigationConfig;
use crate::domain::{IterationView, Project, QuestionView, Session, SessionMode, SessionStatus};
use crate::error::WorkflowError;
use crate::workflow::SessionEngine;

pub use errors::{classify, NavigationError, UserFacingError};
pub use state::{migrate, ConversationState, PendingConfirmation, CURRENT_VERSION};
pub use store::{JsonFileStateStore, MemoryStateStore, StateStore};

pub type NavResult<T> = Result<T, NavigationError>;

/// Position inside a skipped-question replay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayPosition {
    pub number: usize,
    pub total: usize,
}

/// A question ready to be shown
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionPrompt {
    pub iteration_id: Uuid,
    pub iteration_title: String,
    pub question: QuestionView,
    /// Answer given earlier, shown when navigating back
    pub answer: Option<String>,
    pub replay: Option<ReplayPosition>,
    pub can_go_back: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectPage {
    pub projects: Vec<Project>,
    pub page: usize,
    pub has_previous: bool,
    pub has_next: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmChoice {
    Cancel,
    Finish,
    Continue,
}

/// Result of one navigation step
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Advance(QuestionPrompt),
    /// A round of follow-up questions was added
    NeedsMoreInfo(IterationView),
    Done {
        result: String,
        has_skipped: bool,
    },
    Failed(UserFacingError),
    /// A setup step moved the session on
    Updated(Session),
    Projects(ProjectPage),
    DraftAccepted {
        count: usize,
        max: usize,
    },
    Explanation(String),
    ConfirmationRequired(PendingConfirmation),
    Canceled,
    Continued,
    /// Nothing to act on, e.g. a stale confirmation button
    Ignored,
}

pub struct Navigator {
    engine: SessionEngine,
    states: Arc<dyn StateStore>,
    settings: NavigationConfig,
}

impl Navigator {
    pub fn new(
        engine: SessionEngine,
        states: Arc<dyn StateStore>,
        settings: NavigationConfig,
    ) -> Self {
        Self {
            engine,
            states,
            settings,
        }
    }

    pub fn engine(&self) -> &SessionEngine {
        &self.engine
    }

    pub async fn state(&self, user_id: i64) -> NavResult<Option<ConversationState>> {
        self.states.load(user_id).await
    }

    // --- setup ---

    /// Start a fresh session, replacing whatever the user had
    pub async fn start(&self, user_id: i64) -> Outcome {
        let result: NavResult<Outcome> = async {
            let session = self.engine.start_session().await?;
            self.states
                .save(user_id, &ConversationState::for_session(session.id))
                .await?;
            Ok(Outcome::Updated(session))
        }
        .await;
        settle(user_id, "start", result)
    }

    pub async fn submit_goal(&self, user_id: i64, goal: &str) -> Outcome {
        let result: NavResult<Outcome> = async {
            let (_, session_id) = self.active(user_id).await?;
            Ok(Outcome::Updated(
                self.engine.submit_goal(session_id, goal).await?,
            ))
        }
        .await;
        settle(user_id, "submit goal", result)
    }

    pub async fn submit_audio_goal(&self, user_id: i64, audio: &[u8]) -> Outcome {
        let result: NavResult<Outcome> = async {
            let (_, session_id) = self.active(user_id).await?;
            Ok(Outcome::Updated(
                self.engine.submit_audio_goal(session_id, audio).await?,
            ))
        }
        .await;
        settle(user_id, "submit audio goal", result)
    }

    /// One page of known projects to pick from
    pub async fn project_page(&self, user_id: i64, page: usize) -> Outcome {
        let result: NavResult<Outcome> = async {
            let (mut state, _) = self.active(user_id).await?;
            let size = self.settings.project_page_size.max(1);
            let projects = self.engine.list_projects().await?;
            let start = page.saturating_mul(size);

            state.project_list_page = page;
            self.states.save(user_id, &state).await?;
            Ok(Outcome::Projects(ProjectPage {
                has_previous: page > 0,
                has_next: projects.len() > start.saturating_add(size),
                projects: projects.into_iter().skip(start).take(size).collect(),
                page,
            }))
        }
        .await;
        settle(user_id, "project page", result)
    }

    pub async fn select_project(&self, user_id: i64, project_id: Uuid) -> Outcome {
        let result: NavResult<Outcome> = async {
            let (mut state, session_id) = self.active(user_id).await?;
            let session = self
                .engine
                .link_project_context(session_id, project_id)
                .await?;
            state.project_id = Some(project_id);
            self.states.save(user_id, &state).await?;
            Ok(Outcome::Updated(session))
        }
        .await;
        settle(user_id, "select project", result)
    }

    pub async fn start_manual_context(&self, user_id: i64) -> Outcome {
        let result: NavResult<Outcome> = async {
            let (_, session_id) = self.active(user_id).await?;
            Ok(Outcome::Updated(
                self.engine.start_manual_context(session_id).await?,
            ))
        }
        .await;
        settle(user_id, "start manual context", result)
    }

    /// Answers to the default setup questions, in one message
    pub async fn submit_context(&self, user_id: i64, answers: &str) -> Outcome {
        let result: NavResult<Outcome> = async {
            let (_, session_id) = self.active(user_id).await?;
            let questions = self.engine.context_questions_prompt();
            Ok(Outcome::Updated(
                self.engine
                    .submit_context(session_id, &questions, answers)
                    .await?,
            ))
        }
        .await;
        settle(user_id, "submit context", result)
    }

    pub async fn submit_audio_context(&self, user_id: i64, audio: &[u8]) -> Outcome {
        let result: NavResult<Outcome> = async {
            let (_, session_id) = self.active(user_id).await?;
            let questions = self.engine.context_questions_prompt();
            Ok(Outcome::Updated(
                self.engine
                    .submit_audio_context(session_id, &questions, audio)
                    .await?,
            ))
        }
        .await;
        settle(user_id, "submit audio context", result)
    }

    pub async fn start_project_creation(&self, user_id: i64) -> Outcome {
        let result: NavResult<Outcome> = async {
            let (_, session_id) = self.active(user_id).await?;
            Ok(Outcome::Updated(
                self.engine.start_project_creation(session_id).await?,
            ))
        }
        .await;
        settle(user_id, "start project creation", result)
    }

    pub async fn submit_project_name(&self, user_id: i64, name: &str) -> Outcome {
        let result: NavResult<Outcome> = async {
            let (mut state, session_id) = self.active(user_id).await?;
            let session = self.engine.submit_project_name(session_id, name).await?;
            state.project_name = Some(name.trim().to_string());
            self.states.save(user_id, &state).await?;
            Ok(Outcome::Updated(session))
        }
        .await;
        settle(user_id, "submit project name", result)
    }

    pub async fn submit_project_description(&self, user_id: i64, description: &str) -> Outcome {
        let result: NavResult<Outcome> = async {
            let (mut state, session_id) = self.active(user_id).await?;
            let name = state
                .project_name
                .clone()
                .ok_or(WorkflowError::MissingField("project_name"))?;
            let (session, project) = self
                .engine
                .submit_project_description(session_id, &name, description)
                .await?;
            state.project_id = Some(project.id);
            state.project_name = None;
            self.states.save(user_id, &state).await?;
            Ok(Outcome::Updated(session))
        }
        .await;
        settle(user_id, "submit project description", result)
    }

    pub async fn choose_mode(&self, user_id: i64, mode: SessionMode) -> Outcome {
        let result: NavResult<Outcome> = async {
            let (_, session_id) = self.active(user_id).await?;
            Ok(Outcome::Updated(
                self.engine.set_mode(session_id, mode).await?,
            ))
        }
        .await;
        settle(user_id, "choose mode", result)
    }

    // --- interview ---

    /// Generate the questions and show the first one
    pub async fn start_interview(&self, user_id: i64) -> Outcome {
        let result: NavResult<Outcome> = async {
            let (mut state, session_id) = self.active(user_id).await?;
            let views = self.engine.load_questions(session_id).await?;
            let first = views
                .iter()
                .find_map(|view| view.first_open().map(|q| q.id))
                .ok_or_else(|| WorkflowError::Internal("generated questions are empty".into()))?;

            state.reset_history();
            state.reset_replay();
            state.current_question_id = Some(first);
            let outcome = self.show(&mut state, first).await?;
            self.states.save(user_id, &state).await?;
            Ok(outcome)
        }
        .await;
        settle(user_id, "start interview", result)
    }

    pub async fn answer(&self, user_id: i64, text: &str) -> Outcome {
        let result: NavResult<Outcome> = async {
            let (mut state, session_id) = self.active(user_id).await?;
            let question_id = current_question(&state)?;
            let next = self
                .engine
                .submit_answer(session_id, question_id, text)
                .await?;
            let outcome = self.advance(&mut state, session_id, next).await?;
            self.states.save(user_id, &state).await?;
            Ok(outcome)
        }
        .await;
        settle(user_id, "answer", result)
    }

    pub async fn answer_audio(&self, user_id: i64, audio: &[u8]) -> Outcome {
        let result: NavResult<Outcome> = async {
            let (mut state, session_id) = self.active(user_id).await?;
            let question_id = current_question(&state)?;
            let next = self
                .engine
                .submit_audio_answer(session_id, question_id, audio)
                .await?;
            let outcome = self.advance(&mut state, session_id, next).await?;
            self.states.save(user_id, &state).await?;
            Ok(outcome)
        }
        .await;
        settle(user_id, "answer audio", result)
    }

    pub async fn skip(&self, user_id: i64) -> Outcome {
        let result: NavResult<Outcome> = async {
            let (mut state, session_id) = self.active(user_id).await?;
            let question_id = current_question(&state)?;
            let outcome = if state.answering_skipped {
                self.engine
                    .skip_replayed_question(session_id, question_id)
                    .await?;
                state.next_question_ids.clear();
                self.next_skipped(&mut state, session_id).await?
            } else {
                let next = self.engine.skip_answer(session_id, question_id).await?;
                self.advance(&mut state, session_id, next).await?
            };
            self.states.save(user_id, &state).await?;
            Ok(outcome)
        }
        .await;
        settle(user_id, "skip", result)
    }

    /// Return to the previous question, keeping the current one for later
    pub async fn back(&self, user_id: i64) -> Outcome {
        let result: NavResult<Outcome> = async {
            let (mut state, _) = self.active(user_id).await?;
            let previous = state
                .previous_question_id
                .take()
                .ok_or(NavigationError::NothingToGoBackTo)?;
            if let Some(current) = state.current_question_id {
                state.next_question_ids.push(current);
            }
            if state.answering_skipped {
                state.current_skipped_question_index =
                    state.current_skipped_question_index.saturating_sub(1);
                if state.current_skipped_question_number > 1 {
                    state.current_skipped_question_number -= 1;
                }
            }
            state.current_question_id = Some(previous);

            let outcome = self.show(&mut state, previous).await?;
            self.states.save(user_id, &state).await?;
            Ok(outcome)
        }
        .await;
        settle(user_id, "back", result)
    }

    pub async fn explain(&self, user_id: i64) -> Outcome {
        let result: NavResult<Outcome> = async {
            let (state, _) = self.active(user_id).await?;
            let question_id = current_question(&state)?;
            Ok(Outcome::Explanation(
                self.engine.get_question_explanation(question_id).await?,
            ))
        }
        .await;
        settle(user_id, "explain", result)
    }

    /// Replay every open question, reopening a finished session if needed
    pub async fn answer_skipped(&self, user_id: i64) -> Outcome {
        let result: NavResult<Outcome> = async {
            let (mut state, session_id) = self.active(user_id).await?;
            let open = self.engine.unanswered_questions(session_id).await?;
            let session = self.engine.get_session(session_id).await?;

            state.reset_history();
            state.reset_replay();
            let outcome = if open.is_empty() {
                match (session.status, session.result) {
                    (SessionStatus::Done, Some(result)) => Outcome::Done {
                        result,
                        has_skipped: false,
                    },
                    _ => self.validate_and_summarize(&mut state, session_id).await?,
                }
            } else {
                if session.status == SessionStatus::Done {
                    self.engine.reopen_for_answers(session_id).await?;
                }
                state.answering_skipped = true;
                state.skipped_question_ids = open.iter().map(|q| q.id).collect();
                state.total_skipped_questions = open.len();
                state.current_skipped_question_index = 0;
                state.current_skipped_question_number = 1;
                state.current_question_id = Some(open[0].id);
                tracing::info!(user_id, %session_id, total = open.len(), "Replaying skipped questions");
                self.show(&mut state, open[0].id).await?
            };
            self.states.save(user_id, &state).await?;
            Ok(outcome)
        }
        .await;
        settle(user_id, "answer skipped", result)
    }

    /// Produce the requirements now, guarded against double triggers
    pub async fn generate(&self, user_id: i64) -> Outcome {
        let result = self.guarded_generate(user_id).await;
        settle(user_id, "generate", result)
    }

    async fn guarded_generate(&self, user_id: i64) -> NavResult<Outcome> {
        let (mut state, session_id) = self.active(user_id).await?;
        let now = Utc::now();
        if state.is_processing {
            let timeout = Duration::seconds(
                i64::try_from(self.settings.processing_timeout_secs).unwrap_or(i64::MAX),
            );
            match state.processing_started.map(|started| now - started) {
                Some(elapsed) if elapsed < timeout => {
                    return Err(NavigationError::StillProcessing {
                        elapsed_secs: elapsed.num_seconds(),
                    });
                }
                elapsed => tracing::warn!(
                    user_id,
                    %session_id,
                    elapsed_secs = elapsed.map(|e| e.num_seconds()),
                    "Resetting stale processing guard"
                ),
            }
        }

        state.is_processing = true;
        state.processing_started = Some(now);
        self.states.save(user_id, &state).await?;

        let result = self.run_generation(&mut state, session_id).await;

        state.is_processing = false;
        state.processing_started = None;
        match (self.states.save(user_id, &state).await, result) {
            (Ok(()), result) => result,
            (Err(save_err), Ok(_)) => Err(save_err),
            (Err(save_err), Err(err)) => {
                tracing::error!(user_id, error = %save_err, "Failed to clear processing guard");
                Err(err)
            }
        }
    }

    async fn run_generation(
        &self,
        state: &mut ConversationState,
        session_id: Uuid,
    ) -> NavResult<Outcome> {
        let session = self.engine.get_session(session_id).await?;
        match session.status {
            SessionStatus::DraftCollecting | SessionStatus::Validating => {
                self.validate_and_summarize(state, session_id).await
            }
            _ => self.summarize(state, &session).await,
        }
    }

    // --- draft ---

    pub async fn start_draft(&self, user_id: i64) -> Outcome {
        let result: NavResult<Outcome> = async {
            let (mut state, session_id) = self.active(user_id).await?;
            let session = self.engine.start_draft_collecting(session_id).await?;
            state.draft_message_count = 0;
            self.states.save(user_id, &state).await?;
            Ok(Outcome::Updated(session))
        }
        .await;
        settle(user_id, "start draft", result)
    }

    pub async fn add_draft_message(&self, user_id: i64, text: &str) -> Outcome {
        let result: NavResult<Outcome> = async {
            let (mut state, session_id) = self.active(user_id).await?;
            self.check_draft_room(&state)?;
            self.engine.add_draft_message(session_id, text).await?;
            self.count_draft_message(user_id, &mut state).await
        }
        .await;
        settle(user_id, "add draft message", result)
    }

    pub async fn add_audio_draft_message(&self, user_id: i64, audio: &[u8]) -> Outcome {
        let result: NavResult<Outcome> = async {
            let (mut state, session_id) = self.active(user_id).await?;
            self.check_draft_room(&state)?;
            self.engine
                .add_audio_draft_message(session_id, audio)
                .await?;
            self.count_draft_message(user_id, &mut state).await
        }
        .await;
        settle(user_id, "add audio draft message", result)
    }

    fn check_draft_room(&self, state: &ConversationState) -> NavResult<()> {
        let max = self.engine.settings().max_draft_messages;
        if state.draft_message_count >= max {
            return Err(NavigationError::DraftLimitReached { max });
        }
        Ok(())
    }

    async fn count_draft_message(
        &self,
        user_id: i64,
        state: &mut ConversationState,
    ) -> NavResult<Outcome> {
        state.draft_message_count += 1;
        self.states.save(user_id, state).await?;
        Ok(Outcome::DraftAccepted {
            count: state.draft_message_count,
            max: self.engine.settings().max_draft_messages,
        })
    }

    // --- confirmation ---

    pub async fn request_cancel(&self, user_id: i64) -> Outcome {
        let result = self.request(user_id, PendingConfirmation::Cancel).await;
        settle(user_id, "request cancel", result)
    }

    pub async fn request_finish(&self, user_id: i64) -> Outcome {
        let result = self.request(user_id, PendingConfirmation::Finish).await;
        settle(user_id, "request finish", result)
    }

    async fn request(&self, user_id: i64, kind: PendingConfirmation) -> NavResult<Outcome> {
        let (mut state, _) = self.active(user_id).await?;
        state.pending_confirmation = kind;
        self.states.save(user_id, &state).await?;
        Ok(Outcome::ConfirmationRequired(kind))
    }

    pub async fn confirm(&self, user_id: i64, choice: ConfirmChoice) -> Outcome {
        let result: NavResult<Outcome> = async {
            let Some(mut state) = self.states.load(user_id).await? else {
                return Ok(Outcome::Ignored);
            };
            match (choice, state.pending_confirmation) {
                (_, PendingConfirmation::None) => Ok(Outcome::Ignored),
                (ConfirmChoice::Continue, _) => {
                    state.pending_confirmation = PendingConfirmation::None;
                    self.states.save(user_id, &state).await?;
                    Ok(Outcome::Continued)
                }
                (ConfirmChoice::Cancel, PendingConfirmation::Cancel)
                | (ConfirmChoice::Finish, PendingConfirmation::Finish) => {
                    if let Some(session_id) = state.session_id {
                        if let Err(e) = self.engine.cancel_session(session_id).await {
                            e.log("cancel session", session_id);
                        }
                    }
                    self.states.delete(user_id).await?;
                    tracing::info!(user_id, "Conversation closed");
                    Ok(Outcome::Canceled)
                }
                _ => Ok(Outcome::Ignored),
            }
        }
        .await;
        settle(user_id, "confirm", result)
    }

    /// Record the id of the last message sent to the user
    pub async fn remember_message(&self, user_id: i64, message_id: i64) -> NavResult<()> {
        let Some(mut state) = self.states.load(user_id).await? else {
            return Ok(());
        };
        state.last_message_id = Some(message_id);
        self.states.save(user_id, &state).await
    }

    // --- internals ---

    async fn active(&self, user_id: i64) -> NavResult<(ConversationState, Uuid)> {
        let state = self
            .states
            .load(user_id)
            .await?
            .ok_or(NavigationError::NoActiveSession)?;
        let session_id = state.session_id.ok_or(NavigationError::NoActiveSession)?;
        Ok((state, session_id))
    }

    /// Move on after the current question was closed
    async fn advance(
        &self,
        state: &mut ConversationState,
        session_id: Uuid,
        next: Option<IterationView>,
    ) -> NavResult<Outcome> {
        if state.answering_skipped {
            state.next_question_ids.clear();
            return self.next_skipped(state, session_id).await;
        }
        if let Some(question_id) = state.next_question_ids.pop() {
            state.step_to(question_id);
            return self.show(state, question_id).await;
        }
        match next.as_ref().and_then(IterationView::first_open) {
            Some(question) => {
                let question_id = question.id;
                state.step_to(question_id);
                self.show(state, question_id).await
            }
            None => self.validate_and_summarize(state, session_id).await,
        }
    }

    async fn next_skipped(
        &self,
        state: &mut ConversationState,
        session_id: Uuid,
    ) -> NavResult<Outcome> {
        if state.skipped_question_ids.is_empty() {
            let open = self.engine.unanswered_questions(session_id).await?;
            if open.is_empty() {
                state.reset_replay();
                return self.validate_and_summarize(state, session_id).await;
            }
            state.skipped_question_ids = open.iter().map(|q| q.id).collect();
            state.total_skipped_questions = open.len();
            state.current_skipped_question_index = 0;
            state.current_skipped_question_number = 1;
        } else {
            state.current_skipped_question_index += 1;
            state.current_skipped_question_number += 1;
        }

        match state
            .skipped_question_ids
            .get(state.current_skipped_question_index)
            .copied()
        {
            Some(question_id) => {
                state.step_to(question_id);
                self.show(state, question_id).await
            }
            None => {
                tracing::info!(%session_id, "Replay finished");
                state.reset_replay();
                self.validate_and_summarize(state, session_id).await
            }
        }
    }

    async fn validate_and_summarize(
        &self,
        state: &mut ConversationState,
        session_id: Uuid,
    ) -> NavResult<Outcome> {
        let session = self.engine.get_session(session_id).await?;
        let round = match session.mode {
            Some(SessionMode::Draft) => self.engine.validate_draft_messages(session_id).await?,
            _ => self.engine.validate_answers(session_id).await?,
        };

        if let Some(round) = round {
            state.reset_replay();
            state.next_question_ids.clear();
            if let Some(first) = round.first_open() {
                state.step_to(first.id);
                state.current_iteration_id = Some(round.iteration_id);
            }
            return Ok(Outcome::NeedsMoreInfo(round));
        }

        let session = self.engine.get_session(session_id).await?;
        self.summarize(state, &session).await
    }

    async fn summarize(
        &self,
        state: &mut ConversationState,
        session: &Session,
    ) -> NavResult<Outcome> {
        let done = match session.mode {
            Some(SessionMode::Draft) => self.engine.generate_draft_summary(session.id).await?,
            _ => self.engine.generate_summary(session.id).await?,
        };
        let has_skipped = self.engine.has_skipped_questions(session.id).await?;
        state.reset_replay();
        Ok(Outcome::Done {
            result: done.result.unwrap_or_default(),
            has_skipped,
        })
    }

    async fn show(&self, state: &mut ConversationState, question_id: Uuid) -> NavResult<Outcome> {
        let question = self.engine.get_question(question_id).await?;
        let iteration = self.engine.get_iteration(question.iteration_id).await?;
        state.current_iteration_id = Some(iteration.iteration_id);

        let replay = state.answering_skipped.then_some(ReplayPosition {
            number: state.current_skipped_question_number,
            total: state.total_skipped_questions,
        });
        Ok(Outcome::Advance(QuestionPrompt {
            iteration_id: iteration.iteration_id,
            iteration_title: iteration.title,
            question: QuestionView::from(&question),
            answer: question.answer,
            replay,
            can_go_back: state.previous_question_id.is_some(),
        }))
    }
}

fn current_question(state: &ConversationState) -> NavResult<Uuid> {
    state
        .current_question_id
        .ok_or(NavigationError::NoCurrentQuestion)
}

/// Turn a failed step into something the user can read
fn settle(user_id: i64, step: &str, result: NavResult<Outcome>) -> Outcome {
    match result {
        Ok(outcome) => outcome,
        Err(err) => {
            match &err {
                NavigationError::Workflow(WorkflowError::Internal(_))
                | NavigationError::Storage(_)
                | NavigationError::CorruptState(_)
                | NavigationError::UnsupportedVersion(_) => {
                    tracing::error!(user_id, step, error = %err, "Navigation step failed");
                }
                _ => tracing::warn!(user_id, step, error = %err, "Navigation step rejected"),
            }
            Outcome::Failed(classify(&err))
        }
    }
}
