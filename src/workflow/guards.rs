//! Required-status table for every guarded workflow operation.

use crate::domain::SessionStatus;
use SessionStatus::*;

/// Guarded operations of the session engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    SubmitGoal,
    LinkProjectContext,
    StartProjectCreation,
    SubmitProjectName,
    SubmitProjectDescription,
    StartManualContext,
    SubmitContext,
    SetMode,
    RestartModeSelection,
    RestartProjectSelection,
    StartDraftCollecting,
    LoadQuestions,
    SubmitAnswer,
    SkipAnswer,
    SkipReplayedQuestion,
    ReopenForAnswers,
    ValidateAnswers,
    ValidateDraftMessages,
    GenerateSummary,
    GenerateDraftSummary,
    AddDraftMessage,
    GetResult,
    CancelSession,
    FailSession,
}

const CANCELLABLE: [SessionStatus; 15] = [
    New,
    AskUserGoal,
    SelectOrCreateProject,
    AskProjectName,
    AskProjectDescription,
    AskUserContext,
    ChooseMode,
    InterviewInfo,
    DraftInfo,
    GeneratingQuestions,
    WaitingForAnswers,
    DraftCollecting,
    Validating,
    GeneratingRequirements,
    Error,
];

/// Sessions still in progress; an `Error` session keeps its first failure
const FAILABLE: [SessionStatus; 14] = [
    New,
    AskUserGoal,
    SelectOrCreateProject,
    AskProjectName,
    AskProjectDescription,
    AskUserContext,
    ChooseMode,
    InterviewInfo,
    DraftInfo,
    GeneratingQuestions,
    WaitingForAnswers,
    DraftCollecting,
    Validating,
    GeneratingRequirements,
];

impl Operation {
    pub const ALL: [Operation; 24] = [
        Operation::SubmitGoal,
        Operation::LinkProjectContext,
        Operation::StartProjectCreation,
        Operation::SubmitProjectName,
        Operation::SubmitProjectDescription,
        Operation::StartManualContext,
        Operation::SubmitContext,
        Operation::SetMode,
        Operation::RestartModeSelection,
        Operation::RestartProjectSelection,
        Operation::StartDraftCollecting,
        Operation::LoadQuestions,
        Operation::SubmitAnswer,
        Operation::SkipAnswer,
        Operation::SkipReplayedQuestion,
        Operation::ReopenForAnswers,
        Operation::ValidateAnswers,
        Operation::ValidateDraftMessages,
        Operation::GenerateSummary,
        Operation::GenerateDraftSummary,
        Operation::AddDraftMessage,
        Operation::GetResult,
        Operation::CancelSession,
        Operation::FailSession,
    ];

    /// Statuses in which the operation may run
    pub fn required(&self) -> &'static [SessionStatus] {
        match self {
            Operation::SubmitGoal => &[AskUserGoal],
            Operation::LinkProjectContext => &[SelectOrCreateProject],
            Operation::StartProjectCreation => &[SelectOrCreateProject],
            Operation::SubmitProjectName => &[AskProjectName],
            Operation::SubmitProjectDescription => &[AskProjectDescription],
            Operation::StartManualContext => &[SelectOrCreateProject],
            Operation::SubmitContext => &[AskUserContext],
            Operation::SetMode => &[ChooseMode],
            Operation::RestartModeSelection => &[InterviewInfo, DraftInfo],
            Operation::RestartProjectSelection => &[ChooseMode],
            Operation::StartDraftCollecting => &[DraftInfo],
            Operation::LoadQuestions => &[InterviewInfo],
            Operation::SubmitAnswer | Operation::SkipAnswer | Operation::SkipReplayedQuestion => {
                &[WaitingForAnswers]
            }
            Operation::ReopenForAnswers => &[Done],
            Operation::ValidateAnswers => &[Validating, WaitingForAnswers],
            Operation::ValidateDraftMessages => &[DraftCollecting, WaitingForAnswers, Validating],
            Operation::GenerateSummary | Operation::GenerateDraftSummary => {
                &[GeneratingRequirements, WaitingForAnswers]
            }
            Operation::AddDraftMessage => &[DraftCollecting],
            Operation::GetResult => &[Done],
            Operation::CancelSession => &CANCELLABLE,
            Operation::FailSession => &FAILABLE,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::SubmitGoal => "submit goal",
            Operation::LinkProjectContext => "link project context",
            Operation::StartProjectCreation => "start project creation",
            Operation::SubmitProjectName => "submit project name",
            Operation::SubmitProjectDescription => "submit project description",
            Operation::StartManualContext => "start manual context",
            Operation::SubmitContext => "submit context",
            Operation::SetMode => "set mode",
            Operation::RestartModeSelection => "restart mode selection",
            Operation::RestartProjectSelection => "restart project selection",
            Operation::StartDraftCollecting => "start draft collecting",
            Operation::LoadQuestions => "load questions",
            Operation::SubmitAnswer => "submit answer",
            Operation::SkipAnswer => "skip answer",
            Operation::SkipReplayedQuestion => "skip replayed question",
            Operation::ReopenForAnswers => "reopen for answers",
            Operation::ValidateAnswers => "validate answers",
            Operation::ValidateDraftMessages => "validate draft messages",
            Operation::GenerateSummary => "generate summary",
            Operation::GenerateDraftSummary => "generate draft summary",
            Operation::AddDraftMessage => "add draft message",
            Operation::GetResult => "get result",
            Operation::CancelSession => "cancel session",
            Operation::FailSession => "fail session",
        }
    }

    pub fn allows(&self, status: SessionStatus) -> bool {
        self.required().contains(&status)
    }
}
