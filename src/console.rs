//! Line-based chat front-end over the [`Navigator`].
//!
//! Each input line is either a slash command or free text. Free text is
//! routed by the session's current status, the way a chat bot treats a plain
//! message. `/audio <path>` sends a recorded file through the same routing.

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

use crate::domain::{Session, SessionMode, SessionStatus};
use crate::navigation::{
    ConfirmChoice, Navigator, Outcome, PendingConfirmation, ProjectPage, QuestionPrompt,
};
use crate::ratelimit::{warning_message, Admission, RateLimiter};

const HELP: &str = "\
Commands:
  /start               begin a new session
  /projects [page]     list projects to link
  /project <id>        link a listed project
  /new-project         create a project
  /context             answer the setup questions yourself
  /interview, /draft   choose how requirements are gathered
  /begin               generate questions or open the draft
  /back, /skip         move through the questions
  /explain             why the current question is asked
  /skipped             answer the questions skipped so far
  /generate            produce the requirements now
  /cancel, /finish     end the session (asks for confirmation)
  /yes, /no            answer a confirmation
  /audio <path>        send a recording instead of text
Any other line is an answer to the current step.";

/// One parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Help,
    Start,
    Projects(usize),
    Project(Uuid),
    NewProject,
    Context,
    Mode(SessionMode),
    Begin,
    Back,
    Skip,
    Explain,
    Skipped,
    Generate,
    Cancel,
    Finish,
    Yes,
    No,
    Audio(String),
    Text(String),
    Unknown(String),
}

fn parse(line: &str) -> Command {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Text(line.to_string());
    };
    let (name, arg) = rest
        .split_once(char::is_whitespace)
        .map_or((rest, ""), |(name, arg)| (name, arg.trim()));

    match name {
        "help" => Command::Help,
        "start" => Command::Start,
        "projects" => Command::Projects(arg.parse().unwrap_or(0)),
        "project" => match arg.parse() {
            Ok(id) => Command::Project(id),
            Err(_) => Command::Unknown(line.to_string()),
        },
        "new-project" => Command::NewProject,
        "context" => Command::Context,
        "interview" => Command::Mode(SessionMode::Interview),
        "draft" => Command::Mode(SessionMode::Draft),
        "begin" => Command::Begin,
        "back" => Command::Back,
        "skip" => Command::Skip,
        "explain" => Command::Explain,
        "skipped" => Command::Skipped,
        "generate" => Command::Generate,
        "cancel" => Command::Cancel,
        "finish" => Command::Finish,
        "yes" => Command::Yes,
        "no" => Command::No,
        "audio" if !arg.is_empty() => Command::Audio(arg.to_string()),
        _ => Command::Unknown(line.to_string()),
    }
}

/// Free text or a recording, routed by session status
enum Input {
    Text(String),
    Audio(Vec<u8>),
}

pub struct Console {
    navigator: Navigator,
    limiter: Arc<RateLimiter>,
    user_id: i64,
    message_seq: AtomicI64,
}

impl Console {
    pub fn new(navigator: Navigator, limiter: Arc<RateLimiter>, user_id: i64) -> Self {
        Self {
            navigator,
            limiter,
            user_id,
            message_seq: AtomicI64::new(0),
        }
    }

    /// Read lines until EOF, writing one reply per line
    pub async fn run<R, W>(&self, input: R, mut output: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        output.write_all(b"Send /start to begin, /help for commands.\n").await?;
        output.flush().await?;

        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let Some(reply) = self.handle(&line).await else {
                continue;
            };
            output.write_all(reply.as_bytes()).await?;
            output.write_all(b"\n\n").await?;
            output.flush().await?;

            let message_id = self.message_seq.fetch_add(1, Ordering::Relaxed) + 1;
            if let Err(e) = self.navigator.remember_message(self.user_id, message_id).await {
                tracing::debug!(error = %e, "Could not record last message id");
            }
        }
        Ok(())
    }

    /// Reply to one input line. `None` means stay silent (rate limited
    /// with a warning still standing).
    pub async fn handle(&self, line: &str) -> Option<String> {
        match self.limiter.check(self.user_id).await {
            Admission::Allowed => {}
            Admission::Throttled { warning: Some(level) } => {
                return Some(warning_message(level).to_string())
            }
            Admission::Throttled { warning: None } => return None,
        }
        Some(self.dispatch(parse(line)).await)
    }

    async fn dispatch(&self, command: Command) -> String {
        let nav = &self.navigator;
        let user = self.user_id;
        let outcome = match command {
            Command::Help => return HELP.to_string(),
            Command::Unknown(line) => return format!("Unknown command: {line}\n\n{HELP}"),
            Command::Start => nav.start(user).await,
            Command::Projects(page) => nav.project_page(user, page).await,
            Command::Project(id) => nav.select_project(user, id).await,
            Command::NewProject => nav.start_project_creation(user).await,
            Command::Context => nav.start_manual_context(user).await,
            Command::Mode(mode) => nav.choose_mode(user, mode).await,
            Command::Begin => match self.status().await {
                Some(SessionStatus::DraftInfo) => nav.start_draft(user).await,
                _ => nav.start_interview(user).await,
            },
            Command::Back => nav.back(user).await,
            Command::Skip => nav.skip(user).await,
            Command::Explain => nav.explain(user).await,
            Command::Skipped => nav.answer_skipped(user).await,
            Command::Generate => nav.generate(user).await,
            Command::Cancel => nav.request_cancel(user).await,
            Command::Finish => nav.request_finish(user).await,
            Command::Yes => {
                let choice = match nav.state(user).await {
                    Ok(Some(state)) => match state.pending_confirmation {
                        PendingConfirmation::Finish => ConfirmChoice::Finish,
                        PendingConfirmation::Cancel | PendingConfirmation::None => {
                            ConfirmChoice::Cancel
                        }
                    },
                    _ => ConfirmChoice::Cancel,
                };
                nav.confirm(user, choice).await
            }
            Command::No => nav.confirm(user, ConfirmChoice::Continue).await,
            Command::Audio(path) => match read_audio(Path::new(&path)).await {
                Ok(audio) => return self.route(Input::Audio(audio)).await,
                Err(e) => return format!("Could not read {path}: {e:#}"),
            },
            Command::Text(text) => return self.route(Input::Text(text)).await,
        };
        self.render(outcome).await
    }

    async fn status(&self) -> Option<SessionStatus> {
        let session_id = self.navigator.state(self.user_id).await.ok()??.session_id?;
        self.navigator
            .engine()
            .get_session(session_id)
            .await
            .ok()
            .map(|s| s.status)
    }

    async fn route(&self, input: Input) -> String {
        let nav = &self.navigator;
        let user = self.user_id;
        let Some(status) = self.status().await else {
            return "Send /start to begin.".to_string();
        };

        let outcome = match (status, &input) {
            (SessionStatus::AskUserGoal, Input::Text(t)) => nav.submit_goal(user, t).await,
            (SessionStatus::AskUserGoal, Input::Audio(a)) => nav.submit_audio_goal(user, a).await,
            (SessionStatus::AskProjectName, Input::Text(t)) => {
                nav.submit_project_name(user, t).await
            }
            (SessionStatus::AskProjectDescription, Input::Text(t)) => {
                nav.submit_project_description(user, t).await
            }
            (SessionStatus::AskUserContext, Input::Text(t)) => nav.submit_context(user, t).await,
            (SessionStatus::AskUserContext, Input::Audio(a)) => {
                nav.submit_audio_context(user, a).await
            }
            (SessionStatus::WaitingForAnswers, Input::Text(t)) => nav.answer(user, t).await,
            (SessionStatus::WaitingForAnswers, Input::Audio(a)) => nav.answer_audio(user, a).await,
            (SessionStatus::DraftCollecting, Input::Text(t)) => {
                nav.add_draft_message(user, t).await
            }
            (SessionStatus::DraftCollecting, Input::Audio(a)) => {
                nav.add_audio_draft_message(user, a).await
            }
            (SessionStatus::AskProjectName | SessionStatus::AskProjectDescription, Input::Audio(_)) => {
                return "Please type this one.".to_string()
            }
            (status, _) => return self.hint(status),
        };
        self.render(outcome).await
    }

    async fn render(&self, outcome: Outcome) -> String {
        match outcome {
            Outcome::Advance(prompt) => render_prompt(&prompt),
            Outcome::NeedsMoreInfo(iteration) => format!(
                "Some answers need more detail: {} follow-up question(s) in \"{}\".",
                iteration.questions.len(),
                iteration.title
            ),
            Outcome::Done {
                result,
                has_skipped,
            } => {
                if has_skipped {
                    format!("{result}\n\nSome questions were skipped. /skipped to answer them.")
                } else {
                    result
                }
            }
            Outcome::Failed(error) => error.message(),
            Outcome::Updated(session) => self.after_update(&session),
            Outcome::Projects(page) => render_projects(&page),
            Outcome::DraftAccepted { count, max } => {
                format!("Noted ({count}/{max}). Add more, or /generate when ready.")
            }
            Outcome::Explanation(text) => text,
            Outcome::ConfirmationRequired(PendingConfirmation::Cancel) => {
                "Cancel this session? /yes or /no".to_string()
            }
            Outcome::ConfirmationRequired(PendingConfirmation::Finish) => {
                "Finish this session now? /yes or /no".to_string()
            }
            Outcome::ConfirmationRequired(PendingConfirmation::None) | Outcome::Ignored => {
                "Nothing to confirm.".to_string()
            }
            Outcome::Canceled => "Session closed. /start to begin again.".to_string(),
            Outcome::Continued => "Carry on.".to_string(),
        }
    }

    fn after_update(&self, session: &Session) -> String {
        match session.status {
            SessionStatus::AskUserGoal => "What do you want to build?".to_string(),
            SessionStatus::AskUserContext => format!(
                "Tell me about the context, answering in one message:\n{}",
                self.navigator.engine().context_questions_prompt()
            ),
            SessionStatus::DraftCollecting => {
                "Describe your requirements in as many messages as you like, then /generate."
                    .to_string()
            }
            status => self.hint(status),
        }
    }

    fn hint(&self, status: SessionStatus) -> String {
        match status {
            SessionStatus::New | SessionStatus::AskUserGoal => {
                "What do you want to build?".to_string()
            }
            SessionStatus::SelectOrCreateProject => {
                "Pick a project with /projects, create one with /new-project, or describe the context with /context."
                    .to_string()
            }
            SessionStatus::AskProjectName => "Project name?".to_string(),
            SessionStatus::AskProjectDescription => "Describe the project.".to_string(),
            SessionStatus::AskUserContext => "Answer the setup questions in one message.".to_string(),
            SessionStatus::ChooseMode => "/interview to be asked questions, /draft to write freely."
                .to_string(),
            SessionStatus::InterviewInfo => "/begin to generate your questions.".to_string(),
            SessionStatus::DraftInfo => "/begin to open the draft.".to_string(),
            SessionStatus::WaitingForAnswers => {
                "Answer the question, or /skip, /back, /explain.".to_string()
            }
            SessionStatus::DraftCollecting => "Add to the draft, or /generate.".to_string(),
            SessionStatus::GeneratingQuestions
            | SessionStatus::Validating
            | SessionStatus::GeneratingRequirements => {
                "Working on it. /generate if it seems stuck.".to_string()
            }
            SessionStatus::Done => {
                "Requirements are ready. /skipped to refine, /start for a new session.".to_string()
            }
            SessionStatus::Error | SessionStatus::Canceled => {
                "This session has ended. /start to begin again.".to_string()
            }
        }
    }
}

fn render_prompt(prompt: &QuestionPrompt) -> String {
    let mut out = match prompt.replay {
        Some(pos) => format!(
            "Skipped question {}/{} ({})\n",
            pos.number, pos.total, prompt.iteration_title
        ),
        None => format!("[{}]\n", prompt.iteration_title),
    };
    out.push_str(&prompt.question.question);
    if let Some(answer) = &prompt.answer {
        out.push_str(&format!("\nYour answer: {answer}"));
    }
    out
}

fn render_projects(page: &ProjectPage) -> String {
    if page.projects.is_empty() {
        return "No projects yet. /new-project to create one.".to_string();
    }
    let mut lines: Vec<String> = page
        .projects
        .iter()
        .map(|p| format!("- {} ({})", p.title, p.id))
        .collect();
    if page.has_previous {
        lines.push(format!("/projects {} for the previous page", page.page - 1));
    }
    if page.has_next {
        lines.push(format!("/projects {} for the next page", page.page + 1));
    }
    lines.push("/project <id> to link one.".to_string());
    lines.join("\n")
}

async fn read_audio(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read audio file {}", path.display()))
}
