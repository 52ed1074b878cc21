//! Configuration types for the chat application.
//!
//! Command-line arguments are parsed with `arrrg`; everything else comes from
//! `CHATMTL_*` environment variables read once at startup. Both resolve into
//! a [`ChatConfig`].

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use arrrg_derive::CommandLine;
use time::UtcOffset;
use url::Url;

use crate::client::{self, DEFAULT_MAX_TOKENS, GenerationOptions};
use crate::error::{Error, Result};
use crate::fetcher::{self, Category, DEFAULT_WORD_LIMIT};
use crate::logger::DEFAULT_LOG_PATH;
use crate::prompt::DEFAULT_RESPONSE_WORD_LIMIT;

const DEFAULT_STOP_SEQUENCE: &str = "User:";

/// Command-line arguments for the chatmtl tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Path of the CSV conversation log.
    #[arrrg(optional, "CSV log file (default: chat_log.csv)", "PATH")]
    pub log_file: Option<String>,

    /// Category whose articles are used as context.
    #[arrrg(optional, "Category to answer from, by name or menu number", "CATEGORY")]
    pub category: Option<String>,

    /// Read lines from the terminal instead of opening the chat window.
    #[arrrg(flag, "Use a plain line prompt instead of the chat window")]
    pub no_window: bool,
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after processing
/// command-line arguments and the environment with appropriate defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    /// Base URL of the llama.cpp server.
    pub endpoint: String,

    /// Bearer token for the model server, if it requires one.
    pub api_key: Option<String>,

    /// Root of the blog that category pages are fetched from.
    pub blog_url: String,

    /// Where answered turns are appended.
    pub log_path: PathBuf,

    /// Category used for article context; `None` answers without context.
    pub category: Option<Category>,

    /// Maximum tokens per response.
    pub max_tokens: u32,

    /// Optional sampling temperature.
    pub temperature: Option<f32>,

    /// Stop sequences supplied on every request.
    pub stop_sequences: Vec<String>,

    /// Timeout for each inference request.
    pub timeout: Duration,

    /// Response length requested in the prompt, in words.
    pub response_word_limit: u32,

    /// Article context cap, in words.
    pub context_word_limit: usize,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    /// Offset used to stamp turns and date prompts.
    pub utc_offset: UtcOffset,

    /// Use the line-mode prompt instead of the chat window.
    pub line_mode: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Endpoint: http://127.0.0.1:8080
    /// - Blog: https://www.mtlblog.com
    /// - Log: chat_log.csv
    /// - Max tokens: 256
    /// - Stop sequences: `User:`
    /// - Timeout: 120 seconds
    pub fn new() -> Self {
        Self {
            endpoint: client::DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            blog_url: fetcher::DEFAULT_BLOG_URL.to_string(),
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            category: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
            stop_sequences: vec![DEFAULT_STOP_SEQUENCE.to_string()],
            timeout: client::DEFAULT_TIMEOUT,
            response_word_limit: DEFAULT_RESPONSE_WORD_LIMIT,
            context_word_limit: DEFAULT_WORD_LIMIT,
            use_color: true,
            utc_offset: UtcOffset::UTC,
            line_mode: false,
        }
    }

    /// Resolve arguments against the process environment.
    pub fn from_env(args: ChatArgs) -> Result<Self> {
        Self::from_args(args, |key| std::env::var(key).ok())
    }

    /// Resolve arguments against an arbitrary environment lookup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a value cannot be parsed or is out of
    /// range.
    pub fn from_args(args: ChatArgs, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = ChatConfig::new();

        if let Some(endpoint) = non_empty(env("CHATMTL_ENDPOINT")) {
            config.endpoint = endpoint;
        }
        config.api_key = non_empty(env("CHATMTL_API_KEY"));
        if let Some(blog_url) = non_empty(env("CHATMTL_BLOG_URL")) {
            config.blog_url = blog_url;
        }
        if let Some(max_tokens) = parse_env(&env, "CHATMTL_MAX_TOKENS")? {
            config.max_tokens = max_tokens;
        }
        config.temperature = parse_env(&env, "CHATMTL_TEMPERATURE")?;
        if let Some(stop) = env("CHATMTL_STOP") {
            config.stop_sequences = stop
                .split('|')
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        let timeout_secs: Option<u64> = parse_env(&env, "CHATMTL_TIMEOUT_SECS")?;
        if let Some(secs) = timeout_secs {
            config.timeout = Duration::from_secs(secs);
        }
        config.use_color = non_empty(env("NO_COLOR")).is_none();

        config.line_mode = args.no_window;
        if let Some(path) = args.log_file {
            config.log_path = PathBuf::from(path);
        }
        if let Some(category) = args.category {
            config.category = Some(category.parse().map_err(|_| {
                Error::config(
                    format!("unknown category {category:?}; expected one of:\n{}", Category::menu()),
                    Some("category".to_string()),
                )
            })?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks that every setting is usable.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("endpoint", &self.endpoint), ("blog_url", &self.blog_url)] {
            Url::parse(value).map_err(|e| {
                Error::config(format!("{value:?} is not a URL: {e}"), Some(name.to_string()))
            })?;
        }
        if self.timeout.is_zero() {
            return Err(Error::config(
                "timeout must be positive",
                Some("timeout".to_string()),
            ));
        }
        if self.log_path.as_os_str().is_empty() {
            return Err(Error::config(
                "log path must not be empty",
                Some("log_file".to_string()),
            ));
        }
        self.generation_options().validate().map_err(|e| match e {
            Error::InvalidInput { message, param } => Error::config(message, param),
            other => other,
        })
    }

    /// Sampling options for inference requests.
    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions::new()
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature)
            .with_stop_sequences(self.stop_sequences.clone())
    }

    /// Sets the model server endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the model server API key.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Sets the blog root.
    pub fn with_blog_url(mut self, blog_url: impl Into<String>) -> Self {
        self.blog_url = blog_url.into();
        self
    }

    /// Sets the CSV log path.
    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = path.into();
        self
    }

    /// Sets the context category.
    pub fn with_category(mut self, category: Option<Category>) -> Self {
        self.category = category;
        self
    }

    /// Sets the maximum tokens per response.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the stop sequences.
    pub fn with_stop_sequences(mut self, stop_sequences: Vec<String>) -> Self {
        self.stop_sequences = stop_sequences;
        self
    }

    /// Sets the inference timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the response length requested in the prompt.
    pub fn with_response_word_limit(mut self, words: u32) -> Self {
        self.response_word_limit = words;
        self
    }

    /// Sets the article context cap.
    pub fn with_context_word_limit(mut self, words: usize) -> Self {
        self.context_word_limit = words;
        self
    }

    /// Sets the offset turns are stamped in.
    pub fn with_utc_offset(mut self, offset: UtcOffset) -> Self {
        self.utc_offset = offset;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(env(key)) {
        Some(raw) => raw.parse::<T>().map(Some).map_err(|e| {
            Error::config(format!("cannot parse {raw:?}: {e}"), Some(key.to_string()))
        }),
        None => Ok(None),
    }
}
