//! Core chat session management.
//!
//! This module provides the `ChatSession` struct which walks each submitted
//! message through fetching, prompt composition, inference, display and
//! logging. All output goes through a [`Renderer`], so a session can be
//! driven without a terminal.

use std::fmt;

use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chat::config::ChatConfig;
use crate::client::Inference;
use crate::error::{Error, Result};
use crate::fetcher::{Article, Category, Fetcher};
use crate::logger::{ChatTurn, SessionLogger};
use crate::observability::{CHAT_FAILED_TURNS, CHAT_TURNS};
use crate::prompt::PromptComposer;
use crate::render::Renderer;
use crate::utils;

/// Shown once when the session starts.
pub const GREETING: &str =
    "Bonjour! 🍁 Welcome to chatMTL, your digital gateway to all things Montreal.";

/// Shown after every answer.
pub const FOLLOW_UP: &str = "Got more Montreal curiosities? Let me know how I can assist further!";

/// Shown when the model could not be reached or gave an unusable reply.
pub const FAILURE_MESSAGE: &str =
    "Sorry, I couldn't come up with an answer right now. Please try again.";

/// Shown when the user quits.
pub const FAREWELL: &str = "Au revoir! 🍁 Thanks for exploring Montreal with chatMTL.";

/// Shown in place of an empty generation.
pub const EMPTY_RESPONSE: &str = "I don't have anything to say about that one. Could you rephrase?";

/// Where a session is in the handling of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChatState {
    /// Created but not started.
    Idle,
    /// Waiting for the user.
    AwaitingInput,
    /// Loading articles for the selected category.
    Fetching,
    /// Building the prompt.
    Composing,
    /// Waiting on the model.
    Inferring,
    /// Showing the answer.
    Displaying,
    /// Appending the turn to the CSV log.
    Logging,
    /// Inference failed; the user is being told.
    Error,
    /// The user quit. No further input is accepted.
    Closed,
}

impl fmt::Display for ChatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChatState::Idle => "idle",
            ChatState::AwaitingInput => "awaiting input",
            ChatState::Fetching => "fetching",
            ChatState::Composing => "composing",
            ChatState::Inferring => "inferring",
            ChatState::Displaying => "displaying",
            ChatState::Logging => "logging",
            ChatState::Error => "error",
            ChatState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// How a submitted message ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model answered. `logged` is false when the CSV append failed.
    Answered { turn: ChatTurn, logged: bool },
    /// The model could not answer; nothing was logged.
    Failed,
}

impl TurnOutcome {
    /// The answered turn, if any.
    pub fn turn(&self) -> Option<&ChatTurn> {
        match self {
            TurnOutcome::Answered { turn, .. } => Some(turn),
            TurnOutcome::Failed => None,
        }
    }
}

/// Aggregated stats for a chat session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStats {
    /// Random identifier of this session.
    pub session_id: Uuid,
    /// Messages the user submitted, answered or not.
    pub user_messages: usize,
    /// Messages the bot showed, including the greeting and failure notices.
    pub bot_messages: usize,
    /// Answered turns.
    pub turns: usize,
    /// Submissions the model could not answer.
    pub failed_turns: usize,
    /// Appends to the CSV log that failed.
    pub log_failures: usize,
    /// The category currently used for context.
    pub category: Option<Category>,
    /// When the session was created.
    pub started_at: OffsetDateTime,
    /// Time since the session was created, to the second.
    pub duration: time::Duration,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Session:      {}", self.session_id)?;
        let secs = self.duration.whole_seconds();
        writeln!(f, "Duration:     {}m {:02}s", secs / 60, secs % 60)?;
        writeln!(f, "You:          {} messages", self.user_messages)?;
        writeln!(f, "Bot:          {} messages", self.bot_messages)?;
        writeln!(f, "Answered:     {}", self.turns)?;
        writeln!(f, "Failed:       {}", self.failed_turns)?;
        writeln!(f, "Log failures: {}", self.log_failures)?;
        match self.category {
            Some(category) => writeln!(f, "Category:     {category}")?,
            None => writeln!(f, "Category:     none")?,
        }
        write!(f, "Started:      {}", self.started_at)
    }
}

/// A chat session that manages conversation state and model interactions.
///
/// The session owns the answered turns of this run and the collaborators
/// each turn passes through.
pub struct ChatSession<F: Fetcher, I: Inference> {
    config: ChatConfig,
    fetcher: F,
    client: I,
    logger: SessionLogger,
    composer: PromptComposer,
    state: ChatState,
    category: Option<Category>,
    turns: Vec<ChatTurn>,
    transitions: Vec<ChatState>,
    session_id: Uuid,
    user_messages: usize,
    bot_messages: usize,
    failed_turns: usize,
    log_failures: usize,
    started_at: OffsetDateTime,
}

impl<F: Fetcher, I: Inference> ChatSession<F, I> {
    /// Creates a new session in [`ChatState::Idle`].
    pub fn new(config: ChatConfig, fetcher: F, client: I, logger: SessionLogger) -> Self {
        let composer = PromptComposer::new(utils::time::today_at(config.utc_offset))
            .with_response_word_limit(config.response_word_limit)
            .with_context_word_limit(config.context_word_limit);
        Self {
            category: config.category,
            fetcher,
            client,
            logger,
            composer,
            state: ChatState::Idle,
            turns: Vec::new(),
            transitions: Vec::new(),
            session_id: Uuid::new_v4(),
            user_messages: 0,
            bot_messages: 0,
            failed_turns: 0,
            log_failures: 0,
            started_at: utils::time::now_at(config.utc_offset),
            config,
        }
    }

    /// Replaces the prompt composer, e.g. to pin the date.
    pub fn with_composer(mut self, composer: PromptComposer) -> Self {
        self.composer = composer;
        self
    }

    /// Greets the user and starts accepting messages.
    pub fn start(&mut self, renderer: &mut dyn Renderer) -> Result<()> {
        if self.state != ChatState::Idle {
            return Err(Error::invalid_input(
                format!("session cannot start while {}", self.state),
                None,
            ));
        }
        renderer.print_response(GREETING);
        self.bot_messages += 1;
        renderer.print_info(&format!(
            "Ask me anything about Montreal. Pick a category for answers grounded in MTL Blog articles:\n{}\n\
             Use /category NAME or /category NUMBER, or /help for more.",
            Category::menu()
        ));
        if let Some(category) = self.category {
            renderer.print_status(&format!("Answering from: {category}"));
        }
        self.transitions.clear();
        self.transition(ChatState::AwaitingInput);
        info!(session_id = %self.session_id, category = ?self.category, "chat session started");
        Ok(())
    }

    /// Handles one user message from start to finish.
    ///
    /// Fetch and log failures are reported through `renderer` and do not
    /// fail the turn. An inference failure yields [`TurnOutcome::Failed`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `message` is blank or the session
    /// is not awaiting input. The session state is unchanged in both cases.
    /// Any other message is composed and logged exactly as given.
    pub async fn submit(
        &mut self,
        message: &str,
        renderer: &mut dyn Renderer,
    ) -> Result<TurnOutcome> {
        if self.state != ChatState::AwaitingInput {
            return Err(Error::invalid_input(
                format!("cannot accept a message while {}", self.state),
                None,
            ));
        }
        if message.trim().is_empty() {
            return Err(Error::invalid_input("message is empty", None));
        }

        self.user_messages += 1;
        self.transitions.clear();
        self.transitions.push(ChatState::AwaitingInput);

        let articles = match self.category {
            Some(category) => {
                self.transition(ChatState::Fetching);
                self.fetch_context(category, renderer).await
            }
            None => Vec::new(),
        };

        self.transition(ChatState::Composing);
        let prompt = match self.composer.compose(message, &articles) {
            Ok(prompt) => prompt,
            Err(err) => {
                self.transition(ChatState::AwaitingInput);
                return Err(err);
            }
        };
        debug!(
            articles = prompt.article_count(),
            chars = prompt.as_str().len(),
            "composed prompt"
        );

        self.transition(ChatState::Inferring);
        let options = self.config.generation_options();
        let response = match self.client.generate(&prompt, &options).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "inference failed");
                CHAT_FAILED_TURNS.click();
                self.failed_turns += 1;
                self.transition(ChatState::Error);
                renderer.print_error(FAILURE_MESSAGE);
                self.bot_messages += 1;
                self.transition(ChatState::AwaitingInput);
                return Ok(TurnOutcome::Failed);
            }
        };

        self.transition(ChatState::Displaying);
        if response.is_empty() {
            renderer.print_response(EMPTY_RESPONSE);
        } else {
            renderer.print_response(&response);
        }
        renderer.print_info(FOLLOW_UP);
        self.bot_messages += 1;

        self.transition(ChatState::Logging);
        let turn = ChatTurn::new(self.next_timestamp(), message, response);
        let logged = self.log(&turn, renderer);
        CHAT_TURNS.click();
        self.turns.push(turn.clone());

        self.transition(ChatState::AwaitingInput);
        Ok(TurnOutcome::Answered { turn, logged })
    }

    /// The states visited by the most recent [`submit`](Self::submit) or
    /// [`start`](Self::start), in order.
    pub fn last_transitions(&self) -> &[ChatState] {
        &self.transitions
    }

    /// Ends the session, saying goodbye with a summary of the session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] unless the session is awaiting input.
    pub fn quit(&mut self, renderer: &mut dyn Renderer) -> Result<SessionStats> {
        if self.state != ChatState::AwaitingInput {
            return Err(Error::invalid_input(
                format!("cannot quit while {}", self.state),
                None,
            ));
        }
        self.state = ChatState::Closed;
        renderer.print_response(FAREWELL);
        self.bot_messages += 1;
        let stats = self.stats();
        renderer.print_info(&stats.to_string());
        info!(
            session_id = %stats.session_id,
            duration_secs = stats.duration.whole_seconds(),
            user_messages = stats.user_messages,
            bot_messages = stats.bot_messages,
            turns = stats.turns,
            failed = stats.failed_turns,
            category = ?stats.category,
            "chat session closed"
        );
        Ok(stats)
    }

    /// Uses articles from `selection` (a name, slug or menu number) as
    /// context for later messages.
    pub fn select_category(&mut self, selection: &str) -> Result<Category> {
        let category: Category = selection.parse()?;
        self.category = Some(category);
        Ok(category)
    }

    /// Answers later messages without article context.
    pub fn clear_category(&mut self) {
        self.category = None;
    }

    /// The category used for context, if any.
    pub fn category(&self) -> Option<Category> {
        self.category
    }

    /// Attaches `text` to the most recent answer.
    ///
    /// The log is append-only, so the amended turn is written as a new row.
    /// Returns whether that row was written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `text` is empty or nothing has
    /// been answered yet.
    pub fn feedback(&mut self, text: &str, renderer: &mut dyn Renderer) -> Result<bool> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::invalid_input("feedback is empty", None));
        }
        let amended = match self.turns.last() {
            Some(turn) => turn.with_feedback(text),
            None => {
                return Err(Error::invalid_input(
                    "there is no answer to give feedback on yet",
                    None,
                ));
            }
        };
        let logged = self.log(&amended, renderer);
        if let Some(last) = self.turns.last_mut() {
            *last = amended;
        }
        Ok(logged)
    }

    /// Answered turns of this session, oldest first.
    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    /// Every turn recorded in the log file, including earlier sessions.
    pub fn logged_turns(&self) -> Result<Vec<ChatTurn>> {
        self.logger.read_turns()
    }

    /// The current state.
    pub fn state(&self) -> ChatState {
        self.state
    }

    /// The active configuration.
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Returns the current session statistics snapshot.
    pub fn stats(&self) -> SessionStats {
        let elapsed = utils::time::now_at(self.config.utc_offset) - self.started_at;
        SessionStats {
            session_id: self.session_id,
            user_messages: self.user_messages,
            bot_messages: self.bot_messages,
            turns: self.turns.len(),
            failed_turns: self.failed_turns,
            log_failures: self.log_failures,
            category: self.category,
            started_at: self.started_at,
            duration: time::Duration::seconds(elapsed.whole_seconds().max(0)),
        }
    }

    async fn fetch_context(
        &self,
        category: Category,
        renderer: &mut dyn Renderer,
    ) -> Vec<Article> {
        renderer.print_status(&format!("Reading the latest {category} articles..."));
        match self.fetcher.fetch(category).await {
            Ok(articles) => {
                debug!(%category, count = articles.len(), "fetched context");
                articles
            }
            Err(err) => {
                warn!(%category, error = %err, "continuing without article context");
                renderer.print_status("Couldn't reach MTL Blog; answering without articles.");
                Vec::new()
            }
        }
    }

    fn log(&mut self, turn: &ChatTurn, renderer: &mut dyn Renderer) -> bool {
        match self.logger.append(turn) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "chat turn not logged");
                self.log_failures += 1;
                renderer.print_warning(&format!("this conversation was not saved: {err}"));
                false
            }
        }
    }

    fn next_timestamp(&self) -> OffsetDateTime {
        let now = utils::time::now_at(self.config.utc_offset);
        match self.turns.last() {
            Some(previous) if previous.timestamp > now => previous.timestamp,
            _ => now,
        }
    }

    fn transition(&mut self, next: ChatState) {
        debug!(from = %self.state, to = %next, "chat state");
        self.state = next;
        self.transitions.push(next);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use time::macros::date;

    use super::*;
    use crate::client::GenerationOptions;
    use crate::error::InferenceFailure;
    use crate::prompt::Prompt;

    struct FakeFetcher {
        result: std::result::Result<Vec<Article>, String>,
        calls: Mutex<Vec<Category>>,
    }

    impl FakeFetcher {
        fn ok(articles: Vec<Article>) -> Self {
            Self {
                result: Ok(articles),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                result: Err("connection refused".to_string()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl Fetcher for FakeFetcher {
        async fn fetch(&self, category: Category) -> Result<Vec<Article>> {
            self.calls.lock().unwrap().push(category);
            self.result
                .clone()
                .map_err(|msg| Error::fetch(msg, Some("http://blog.test/".to_string()), None))
        }
    }

    struct FakeModel {
        reply: Option<String>,
        prompts: Mutex<Vec<String>>,
    }

    impl FakeModel {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Some(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn timing_out() -> Self {
            Self {
                reply: None,
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl Inference for FakeModel {
        async fn generate(&self, prompt: &Prompt, _: &GenerationOptions) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.as_str().to_string());
            self.reply.clone().ok_or_else(|| {
                Error::inference("request timed out", InferenceFailure::Timeout, None)
            })
        }
    }

    #[derive(Default)]
    struct Recorder {
        responses: Vec<String>,
        statuses: Vec<String>,
        warnings: Vec<String>,
        errors: Vec<String>,
        infos: Vec<String>,
    }

    impl Renderer for Recorder {
        fn print_response(&mut self, text: &str) {
            self.responses.push(text.to_string());
        }

        fn print_status(&mut self, status: &str) {
            self.statuses.push(status.to_string());
        }

        fn print_warning(&mut self, warning: &str) {
            self.warnings.push(warning.to_string());
        }

        fn print_error(&mut self, error: &str) {
            self.errors.push(error.to_string());
        }

        fn print_info(&mut self, info: &str) {
            self.infos.push(info.to_string());
        }
    }

    fn article() -> Article {
        Article {
            category: Category::News,
            title: "New metro station opens".to_string(),
            body: "The REM opened a new station downtown this week".to_string(),
            url: "https://www.mtlblog.com/new-metro-station".to_string(),
        }
    }

    fn session(
        dir: &tempfile::TempDir,
        category: Option<Category>,
        fetcher: FakeFetcher,
        model: FakeModel,
    ) -> ChatSession<FakeFetcher, FakeModel> {
        let config = ChatConfig::new().with_category(category).without_color();
        let logger = SessionLogger::new(dir.path().join("chat_log.csv"));
        ChatSession::new(config, fetcher, model, logger)
            .with_composer(PromptComposer::new(date!(2026 - 10 - 19)))
    }

    fn started(
        dir: &tempfile::TempDir,
        category: Option<Category>,
        fetcher: FakeFetcher,
        model: FakeModel,
    ) -> (ChatSession<FakeFetcher, FakeModel>, Recorder) {
        let mut session = session(dir, category, fetcher, model);
        let mut recorder = Recorder::default();
        session.start(&mut recorder).unwrap();
        (session, recorder)
    }

    #[test]
    fn start_greets_and_awaits_input() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(
            &dir,
            None,
            FakeFetcher::ok(vec![]),
            FakeModel::replying("hi"),
        );
        assert_eq!(session.state(), ChatState::Idle);

        let mut recorder = Recorder::default();
        session.start(&mut recorder).unwrap();
        assert_eq!(session.state(), ChatState::AwaitingInput);
        assert_eq!(recorder.responses, vec![GREETING.to_string()]);
        assert!(recorder.infos[0].contains("1. News"));
        assert!(recorder.infos[0].contains("9. Real Estate"));

        assert!(session.start(&mut recorder).unwrap_err().is_invalid_input());
    }

    #[tokio::test]
    async fn answered_turn_with_context() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, mut recorder) = started(
            &dir,
            Some(Category::News),
            FakeFetcher::ok(vec![article()]),
            FakeModel::replying("A new REM station opened downtown."),
        );

        let outcome = session
            .submit("What's new in Montreal?", &mut recorder)
            .await
            .unwrap();
        let TurnOutcome::Answered { turn, logged } = outcome else {
            panic!("expected an answer");
        };
        assert!(logged);
        assert_eq!(turn.user_message, "What's new in Montreal?");
        assert_eq!(turn.model_response, "A new REM station opened downtown.");
        assert_eq!(turn.feedback, None);

        assert_eq!(
            session.last_transitions(),
            &[
                ChatState::AwaitingInput,
                ChatState::Fetching,
                ChatState::Composing,
                ChatState::Inferring,
                ChatState::Displaying,
                ChatState::Logging,
                ChatState::AwaitingInput,
            ]
        );
        assert_eq!(
            *session.fetcher.calls.lock().unwrap(),
            vec![Category::News]
        );
        let prompts = session.client.prompts.lock().unwrap().clone();
        assert!(prompts[0].contains("The REM opened a new station downtown"));
        assert!(prompts[0].ends_with("User: What's new in Montreal?\nAssistant: "));

        assert_eq!(
            recorder.responses.last().map(String::as_str),
            Some("A new REM station opened downtown.")
        );
        assert_eq!(recorder.infos.last().map(String::as_str), Some(FOLLOW_UP));
        assert_eq!(session.logger.read_turns().unwrap(), vec![turn]);
    }

    #[tokio::test]
    async fn no_category_skips_fetching() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, mut recorder) = started(
            &dir,
            None,
            FakeFetcher::ok(vec![article()]),
            FakeModel::replying("Try the Jean-Talon market."),
        );
        session.submit("Where to shop?", &mut recorder).await.unwrap();
        assert!(!session.last_transitions().contains(&ChatState::Fetching));
        assert!(session.fetcher.calls.lock().unwrap().is_empty());
        let prompts = session.client.prompts.lock().unwrap().clone();
        assert!(!prompts[0].contains("MTL Blog articles"));
    }

    #[tokio::test]
    async fn fetch_failure_proceeds_without_context() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, mut recorder) = started(
            &dir,
            Some(Category::Sports),
            FakeFetcher::failing(),
            FakeModel::replying("The Habs play tonight."),
        );
        let outcome = session
            .submit("Any games tonight?", &mut recorder)
            .await
            .unwrap();
        assert!(matches!(outcome, TurnOutcome::Answered { logged: true, .. }));
        assert!(recorder.errors.is_empty());
        assert!(recorder.statuses.iter().any(|s| s.contains("without articles")));
        let prompts = session.client.prompts.lock().unwrap().clone();
        assert!(!prompts[0].contains("MTL Blog articles"));
        assert!(prompts[0].contains("User: Any games tonight?"));
    }

    #[tokio::test]
    async fn inference_failure_logs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, mut recorder) = started(
            &dir,
            None,
            FakeFetcher::ok(vec![]),
            FakeModel::timing_out(),
        );
        let outcome = session.submit("Hello?", &mut recorder).await.unwrap();
        assert_eq!(outcome, TurnOutcome::Failed);
        assert_eq!(recorder.errors, vec![FAILURE_MESSAGE.to_string()]);
        assert_eq!(
            session.last_transitions(),
            &[
                ChatState::AwaitingInput,
                ChatState::Composing,
                ChatState::Inferring,
                ChatState::Error,
                ChatState::AwaitingInput,
            ]
        );
        assert_eq!(session.state(), ChatState::AwaitingInput);
        assert!(!session.logger.path().exists());
        let stats = session.stats();
        assert_eq!(stats.turns, 0);
        assert_eq!(stats.failed_turns, 1);
    }

    #[tokio::test]
    async fn empty_message_is_rejected_before_anything_runs() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, mut recorder) = started(
            &dir,
            Some(Category::News),
            FakeFetcher::ok(vec![article()]),
            FakeModel::replying("unused"),
        );
        let err = session.submit("   ", &mut recorder).await.unwrap_err();
        assert!(err.is_invalid_input());
        assert_eq!(session.state(), ChatState::AwaitingInput);
        assert!(session.fetcher.calls.lock().unwrap().is_empty());
        assert!(session.client.prompts.lock().unwrap().is_empty());
        assert!(!session.logger.path().exists());
    }

    #[tokio::test]
    async fn log_failure_is_reported_but_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = ChatConfig::new();
        let logger = SessionLogger::new(dir.path().join("missing").join("chat_log.csv"));
        let mut session = ChatSession::new(
            config,
            FakeFetcher::ok(vec![]),
            FakeModel::replying("Bonjour!"),
            logger,
        );
        let mut recorder = Recorder::default();
        session.start(&mut recorder).unwrap();

        let outcome = session.submit("Salut", &mut recorder).await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Answered { logged: false, .. }));
        assert_eq!(recorder.warnings.len(), 1);
        assert_eq!(session.state(), ChatState::AwaitingInput);
        assert!(session.last_transitions().contains(&ChatState::Logging));
        assert_eq!(session.stats().log_failures, 1);
        assert_eq!(session.turns().len(), 1);

        session.submit("Encore", &mut recorder).await.unwrap();
        assert_eq!(recorder.warnings.len(), 2);
    }

    #[tokio::test]
    async fn empty_generation_shows_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, mut recorder) = started(
            &dir,
            None,
            FakeFetcher::ok(vec![]),
            FakeModel::replying(""),
        );
        let outcome = session.submit("???", &mut recorder).await.unwrap();
        assert_eq!(outcome.turn().map(|t| t.model_response.as_str()), Some(""));
        assert_eq!(
            recorder.responses.last().map(String::as_str),
            Some(EMPTY_RESPONSE)
        );
    }

    #[tokio::test]
    async fn submit_before_start_or_after_quit_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(
            &dir,
            None,
            FakeFetcher::ok(vec![]),
            FakeModel::replying("hi"),
        );
        let mut recorder = Recorder::default();
        assert!(
            session
                .submit("hello", &mut recorder)
                .await
                .unwrap_err()
                .is_invalid_input()
        );
        assert!(session.quit(&mut recorder).is_err());

        session.start(&mut recorder).unwrap();
        session.quit(&mut recorder).unwrap();
        assert_eq!(session.state(), ChatState::Closed);
        assert!(session.submit("hello", &mut recorder).await.is_err());
    }

    #[tokio::test]
    async fn feedback_appends_amended_row() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, mut recorder) = started(
            &dir,
            None,
            FakeFetcher::ok(vec![]),
            FakeModel::replying("Schwartz's, obviously."),
        );
        assert!(
            session
                .feedback("great", &mut recorder)
                .unwrap_err()
                .is_invalid_input()
        );

        session
            .submit("Best smoked meat?", &mut recorder)
            .await
            .unwrap();
        assert!(session.feedback("  good, very helpful ", &mut recorder).unwrap());
        assert!(session.feedback("", &mut recorder).is_err());

        let rows = session.logger.read_turns().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].feedback, None);
        assert_eq!(rows[1].feedback.as_deref(), Some("good, very helpful"));
        assert_eq!(rows[1].user_message, rows[0].user_message);
        assert_eq!(rows[1].timestamp, rows[0].timestamp);
        assert_eq!(session.turns().len(), 1);
        assert_eq!(session.turns()[0], rows[1]);
        assert_eq!(session.logged_turns().unwrap(), rows);
    }

    #[tokio::test]
    async fn category_selection() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, mut recorder) = started(
            &dir,
            None,
            FakeFetcher::ok(vec![]),
            FakeModel::replying("ok"),
        );
        assert_eq!(session.select_category("3").unwrap(), Category::ThingsToDo);
        assert_eq!(
            session.select_category("Real Estate").unwrap(),
            Category::RealEstate
        );
        assert!(session.select_category("hockey").unwrap_err().is_invalid_input());
        assert_eq!(session.category(), Some(Category::RealEstate));

        session.submit("Condo prices?", &mut recorder).await.unwrap();
        assert_eq!(
            *session.fetcher.calls.lock().unwrap(),
            vec![Category::RealEstate]
        );

        session.clear_category();
        assert_eq!(session.stats().category, None);
    }

    #[tokio::test]
    async fn timestamps_never_go_backwards() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, mut recorder) = started(
            &dir,
            None,
            FakeFetcher::ok(vec![]),
            FakeModel::replying("ok"),
        );
        session.submit("first", &mut recorder).await.unwrap();
        let future = utils::time::now_at(time::UtcOffset::UTC) + time::Duration::hours(1);
        if let Some(last) = session.turns.last_mut() {
            last.timestamp = future;
        }
        let outcome = session.submit("second", &mut recorder).await.unwrap();
        assert_eq!(outcome.turn().map(|t| t.timestamp), Some(future));
    }

    #[tokio::test]
    async fn messages_are_kept_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, mut recorder) = started(
            &dir,
            None,
            FakeFetcher::ok(vec![]),
            FakeModel::replying("Oui!"),
        );
        let outcome = session
            .submit("  poutine,  ce soir? ", &mut recorder)
            .await
            .unwrap();
        assert_eq!(
            outcome.turn().map(|t| t.user_message.as_str()),
            Some("  poutine,  ce soir? ")
        );
        let prompts = session.client.prompts.lock().unwrap().clone();
        assert!(prompts[0].contains("User:   poutine,  ce soir? \nAssistant: "));
        let rows = session.logged_turns().unwrap();
        assert_eq!(rows[0].user_message, "  poutine,  ce soir? ");
    }

    #[tokio::test]
    async fn turns_are_stamped_in_the_configured_offset() {
        let dir = tempfile::tempdir().unwrap();
        let montreal = time::macros::offset!(-4);
        let config = ChatConfig::new().with_utc_offset(montreal);
        let logger = SessionLogger::new(dir.path().join("chat_log.csv"));
        let mut session = ChatSession::new(
            config,
            FakeFetcher::ok(vec![]),
            FakeModel::replying("ok"),
            logger,
        );
        let mut recorder = Recorder::default();
        session.start(&mut recorder).unwrap();

        // Extra threads make the process multi-threaded, where the local
        // offset can no longer be read.
        let worker = std::thread::spawn(|| std::thread::sleep(std::time::Duration::from_millis(50)));
        session.submit("first", &mut recorder).await.unwrap();
        session.submit("second", &mut recorder).await.unwrap();
        worker.join().unwrap();

        for row in session.logged_turns().unwrap() {
            assert_eq!(row.timestamp.offset(), montreal);
        }
        assert_eq!(session.stats().started_at.offset(), montreal);
    }

    #[tokio::test]
    async fn stats_count_both_sides_and_quit_summarizes() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, mut recorder) = started(
            &dir,
            Some(Category::Deals),
            FakeFetcher::ok(vec![]),
            FakeModel::replying("Half price bagels."),
        );
        session.submit("Any deals?", &mut recorder).await.unwrap();
        session.submit("More?", &mut recorder).await.unwrap();
        assert!(session.submit("", &mut recorder).await.is_err());

        let stats = session.stats();
        assert_eq!(stats.user_messages, 2);
        assert_eq!(stats.bot_messages, 3);
        assert_eq!(stats.turns, 2);
        assert_eq!(stats.category, Some(Category::Deals));
        assert!(stats.duration >= time::Duration::ZERO);
        let text = stats.to_string();
        assert!(text.contains(&stats.session_id.to_string()));
        assert!(text.contains("Duration:"));

        let other = session_with_id_of(&dir);
        assert_ne!(other, stats.session_id);

        let closing = session.quit(&mut recorder).unwrap();
        assert_eq!(closing.session_id, stats.session_id);
        assert_eq!(closing.bot_messages, 4);
        assert_eq!(recorder.responses.last().map(String::as_str), Some(FAREWELL));
        assert!(
            recorder
                .infos
                .last()
                .is_some_and(|info| info.contains(&stats.session_id.to_string()))
        );
    }

    #[tokio::test]
    async fn failure_notice_counts_as_a_bot_message() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, mut recorder) = started(
            &dir,
            None,
            FakeFetcher::ok(vec![]),
            FakeModel::timing_out(),
        );
        session.submit("Hello?", &mut recorder).await.unwrap();
        let stats = session.stats();
        assert_eq!(stats.user_messages, 1);
        assert_eq!(stats.bot_messages, 2);
        assert_eq!(stats.turns, 0);
    }

    fn session_with_id_of(dir: &tempfile::TempDir) -> Uuid {
        session(dir, None, FakeFetcher::ok(vec![]), FakeModel::replying("x"))
            .stats()
            .session_id
    }
}
