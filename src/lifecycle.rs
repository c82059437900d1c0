//! Question and iteration lifecycle.
//!
//! Builds iterations from generated blocks and answers "what should the user
//! answer next". Reading the current iteration and advancing the pointer are
//! separate steps: [`peek_current_iteration`] never writes, and
//! [`advance_iteration`] is a compare-and-swap on the session's pointer, so a
//! retried answer cannot move the pointer twice.

use chrono::Utc;
use uuid::Uuid;

use crate::domain::{
    Iteration, IterationView, Question, QuestionStatus, Session, SessionStatus,
    ADDITIONAL_QUESTIONS_TITLE,
};
use crate::error::{WorkflowError, WorkflowResult};
use crate::gateways::{AnsweredQuestion, QuestionBlock};
use crate::store::{IterationRecord, SessionPatch, Store};

/// Where the session stands in its iteration sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum IterationCursor {
    /// The pointer's iteration still has its last question unanswered
    Active(IterationView),
    /// The pointer's iteration is finished; `view` is the next one to answer
    Next { from: u32, view: IterationView },
    /// Nothing left to answer in order
    Exhausted,
}

/// Persist generated blocks as new iterations and apply `patch`.
///
/// Iterations, questions and the status change land in one conditional store
/// write, so a caller that lost the status race leaves nothing behind.
/// Numbering continues from the session's highest iteration number, so
/// appending a follow-up round never renumbers existing data. Questions are
/// numbered from 1 and start unanswered.
pub async fn save_generated_blocks(
    store: &dyn Store,
    operation: &'static str,
    session_id: Uuid,
    expected: &[SessionStatus],
    blocks: &[QuestionBlock],
    patch: SessionPatch,
) -> WorkflowResult<(Session, Vec<IterationView>)> {
    if let Some(empty) = blocks.iter().find(|b| b.questions.is_empty()) {
        return Err(WorkflowError::Internal(format!(
            "generated block '{}' has no questions",
            empty.title
        )));
    }

    let now = Utc::now();
    let records = blocks
        .iter()
        .map(|block| {
            let iteration = Iteration {
                id: Uuid::new_v4(),
                session_id,
                number: 0,
                title: block.title.clone(),
                created_at: now,
            };
            let questions = (1u32..)
                .zip(&block.questions)
                .map(|(number, generated)| Question {
                    id: Uuid::new_v4(),
                    iteration_id: iteration.id,
                    number,
                    status: QuestionStatus::Unanswered,
                    question: generated.text.clone(),
                    explanation: generated.explanation.clone(),
                    answer: None,
                    created_at: now,
                    answered_at: None,
                })
                .collect();
            IterationRecord {
                iteration,
                questions,
            }
        })
        .collect();

    let (session, saved) = store
        .insert_iterations(session_id, expected, records, patch)
        .await
        .map_err(|e| WorkflowError::from_store(operation, e))?;

    let views = saved
        .iter()
        .map(|record| {
            tracing::debug!(
                %session_id,
                iteration = record.iteration.number,
                questions = record.questions.len(),
                "Saved iteration"
            );
            IterationView::new(&record.iteration, &record.questions)
        })
        .collect();
    Ok((session, views))
}

/// Iteration plus its questions
pub async fn iteration_view(store: &dyn Store, iteration_id: Uuid) -> WorkflowResult<IterationView> {
    const OP: &str = "get iteration";
    let iteration = store
        .get_iteration(iteration_id)
        .await
        .map_err(|e| WorkflowError::from_store(OP, e))?;
    let questions = store
        .list_questions(iteration.id)
        .await
        .map_err(|e| WorkflowError::from_store(OP, e))?;
    Ok(IterationView::new(&iteration, &questions))
}

/// Read-only: which iteration should be answered now.
///
/// An iteration counts as finished once its last question is no longer
/// unanswered. Finished iterations after the pointer are passed over, so the
/// cursor always lands on one that still needs input.
pub async fn peek_current_iteration(
    store: &dyn Store,
    session_id: Uuid,
) -> WorkflowResult<IterationCursor> {
    const OP: &str = "get current iteration";

    let session = store
        .get_session(session_id)
        .await
        .map_err(|e| WorkflowError::from_store(OP, e))?;
    let iterations = store
        .list_iterations(session_id)
        .await
        .map_err(|e| WorkflowError::from_store(OP, e))?;

    let pointer = session.current_iteration;
    for iteration in iterations.iter().filter(|it| it.number >= pointer) {
        let questions = store
            .list_questions(iteration.id)
            .await
            .map_err(|e| WorkflowError::from_store(OP, e))?;

        let Some(last) = questions.last() else {
            return Err(WorkflowError::Internal(format!(
                "iteration {} has no questions",
                iteration.id
            )));
        };

        if last.status == QuestionStatus::Unanswered {
            let view = IterationView::new(iteration, &questions);
            return Ok(if iteration.number == pointer {
                IterationCursor::Active(view)
            } else {
                IterationCursor::Next {
                    from: pointer,
                    view,
                }
            });
        }
    }

    Ok(IterationCursor::Exhausted)
}

/// Move the pointer from `from` to `to`. Losing the race to a concurrent
/// caller is not an error: the pointer already moved.
pub async fn advance_iteration(
    store: &dyn Store,
    session_id: Uuid,
    from: u32,
    to: u32,
) -> WorkflowResult<()> {
    let moved = store
        .advance_iteration(session_id, from, to)
        .await
        .map_err(|e| WorkflowError::from_store("advance iteration", e))?;
    if moved {
        tracing::debug!(%session_id, from, to, "Advanced iteration pointer");
    }
    Ok(())
}

/// Current iteration, advancing the pointer when the previous one is finished.
pub async fn current_iteration(
    store: &dyn Store,
    session_id: Uuid,
) -> WorkflowResult<Option<IterationView>> {
    match peek_current_iteration(store, session_id).await? {
        IterationCursor::Active(view) => Ok(Some(view)),
        IterationCursor::Next { from, view } => {
            advance_iteration(store, session_id, from, view.iteration_number).await?;
            Ok(Some(view))
        }
        IterationCursor::Exhausted => Ok(None),
    }
}

/// Every question of the session, in iteration then question order
pub async fn all_questions(store: &dyn Store, session_id: Uuid) -> WorkflowResult<Vec<Question>> {
    const OP: &str = "list questions";
    let iterations = store
        .list_iterations(session_id)
        .await
        .map_err(|e| WorkflowError::from_store(OP, e))?;

    let mut all = Vec::new();
    for iteration in &iterations {
        let questions = store
            .list_questions(iteration.id)
            .await
            .map_err(|e| WorkflowError::from_store(OP, e))?;
        all.extend(questions);
    }
    Ok(all)
}

/// Answered questions only
pub async fn collect_all_answers(
    store: &dyn Store,
    session_id: Uuid,
) -> WorkflowResult<Vec<AnsweredQuestion>> {
    Ok(all_questions(store, session_id)
        .await?
        .into_iter()
        .filter(|q| q.status == QuestionStatus::Answered)
        .filter_map(|q| {
            q.answer.map(|answer| AnsweredQuestion {
                question: q.question,
                answer,
            })
        })
        .collect())
}

/// Questions still waiting for input: unanswered or skipped
pub async fn unanswered_questions(
    store: &dyn Store,
    session_id: Uuid,
) -> WorkflowResult<Vec<Question>> {
    Ok(all_questions(store, session_id)
        .await?
        .into_iter()
        .filter(|q| q.status.is_open())
        .collect())
}

pub async fn has_skipped_questions(store: &dyn Store, session_id: Uuid) -> WorkflowResult<bool> {
    Ok(!unanswered_questions(store, session_id).await?.is_empty())
}

/// Whether the one follow-up round already exists
pub async fn has_additional_round(store: &dyn Store, session_id: Uuid) -> WorkflowResult<bool> {
    let iterations = store
        .list_iterations(session_id)
        .await
        .map_err(|e| WorkflowError::from_store("check additional questions", e))?;
    Ok(iterations.iter().any(|it| it.title == ADDITIONAL_QUESTIONS_TITLE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateways::mock::block;
    use crate::store::MemoryStore;

    async fn save(store: &MemoryStore, id: Uuid, blocks: &[QuestionBlock]) -> Vec<IterationView> {
        save_generated_blocks(
            store,
            "save questions",
            id,
            &[SessionStatus::WaitingForAnswers],
            blocks,
            SessionPatch::default(),
        )
        .await
        .unwrap()
        .1
    }

    async fn session(store: &MemoryStore) -> Uuid {
        store
            .create_session(Session::new(SessionStatus::WaitingForAnswers))
            .await
            .unwrap()
            .id
    }

    async fn answer(store: &MemoryStore, id: Uuid) {
        let mut q = store.get_question(id).await.unwrap();
        q.answer("yes", Utc::now()).unwrap();
        store.update_question(&q).await.unwrap();
    }

    async fn skip(store: &MemoryStore, id: Uuid) {
        let mut q = store.get_question(id).await.unwrap();
        q.skip().unwrap();
        store.update_question(&q).await.unwrap();
    }

    #[tokio::test]
    async fn test_numbering_is_additive() {
        let store = MemoryStore::new();
        let id = session(&store).await;

        let first = save(&store, id, &[block("a", 2), block("b", 1)]).await;
        let second = save(&store, id, &[block("c", 3)]).await;

        let numbers: Vec<u32> = first
            .iter()
            .chain(&second)
            .map(|v| v.iteration_number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);

        let question_numbers: Vec<u32> =
            second[0].questions.iter().map(|q| q.question_number).collect();
        assert_eq!(question_numbers, vec![1, 2, 3]);
        assert!(second[0]
            .questions
            .iter()
            .all(|q| q.status == QuestionStatus::Unanswered));
    }

    #[tokio::test]
    async fn test_empty_block_rejected() {
        let store = MemoryStore::new();
        let id = session(&store).await;
        let err = save_generated_blocks(
            &store,
            "save questions",
            id,
            &[SessionStatus::WaitingForAnswers],
            &[block("empty", 0)],
            SessionPatch::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, WorkflowError::Internal(_)));
        assert!(store.list_iterations(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_current_iteration_advances_once() {
        let store = MemoryStore::new();
        let id = session(&store).await;
        let views = save(&store, id, &[block("a", 2), block("b", 2)]).await;

        let current = current_iteration(&store, id).await.unwrap().unwrap();
        assert_eq!(current.iteration_number, 1);

        answer(&store, views[0].questions[0].id).await;
        answer(&store, views[0].questions[1].id).await;

        // Peeking does not move the pointer
        let cursor = peek_current_iteration(&store, id).await.unwrap();
        assert!(matches!(cursor, IterationCursor::Next { from: 1, .. }));
        assert_eq!(store.get_session(id).await.unwrap().current_iteration, 1);

        let next = current_iteration(&store, id).await.unwrap().unwrap();
        assert_eq!(next.iteration_number, 2);
        assert_eq!(store.get_session(id).await.unwrap().current_iteration, 2);

        // Retrying the same step is a no-op
        advance_iteration(&store, id, 1, 2).await.unwrap();
        assert_eq!(store.get_session(id).await.unwrap().current_iteration, 2);
    }

    #[tokio::test]
    async fn test_exhausted_after_last_question() {
        let store = MemoryStore::new();
        let id = session(&store).await;
        let views = save(&store, id, &[block("a", 2)]).await;

        answer(&store, views[0].questions[0].id).await;
        skip(&store, views[0].questions[1].id).await;

        assert!(current_iteration(&store, id).await.unwrap().is_none());
        assert!(has_skipped_questions(&store, id).await.unwrap());
    }

    #[tokio::test]
    async fn test_answers_and_unanswered_projections() {
        let store = MemoryStore::new();
        let id = session(&store).await;
        let views = save(&store, id, &[block("a", 3)]).await;

        answer(&store, views[0].questions[0].id).await;
        skip(&store, views[0].questions[1].id).await;

        let answers = collect_all_answers(&store, id).await.unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].question, views[0].questions[0].question);
        assert_eq!(answers[0].answer, "yes");

        let open: Vec<Uuid> = unanswered_questions(&store, id)
            .await
            .unwrap()
            .iter()
            .map(|q| q.id)
            .collect();
        assert_eq!(open, vec![views[0].questions[1].id, views[0].questions[2].id]);
    }

    #[tokio::test]
    async fn test_finished_follow_up_round_is_passed_over() {
        let store = MemoryStore::new();
        let id = session(&store).await;
        let first = save(&store, id, &[block("a", 1)]).await;
        answer(&store, first[0].questions[0].id).await;
        let extra = save(&store, id, &[block(ADDITIONAL_QUESTIONS_TITLE, 1)]).await;
        answer(&store, extra[0].questions[0].id).await;

        assert!(current_iteration(&store, id).await.unwrap().is_none());
        assert!(has_additional_round(&store, id).await.unwrap());
    }
}
