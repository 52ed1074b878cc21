//! Prompt composition.
//!
//! The composer places article context first, then the instruction, then the
//! user's message, in the plain-text chat format the local model was tuned
//! on. Composition is pure: the same inputs always produce the same prompt.

use std::fmt;

use time::Date;
use time::macros::format_description;

use crate::error::{Error, Result};
use crate::fetcher::Article;

/// Default cap on response length requested from the model, in words.
pub const DEFAULT_RESPONSE_WORD_LIMIT: u32 = 100;

/// Default cap on the article context included in a prompt, in words.
pub const DEFAULT_CONTEXT_WORD_LIMIT: usize = 1000;

/// A prompt ready to submit to the model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prompt {
    text: String,
    article_count: usize,
}

impl Prompt {
    /// The prompt text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// How many articles contributed context.
    pub fn article_count(&self) -> usize {
        self.article_count
    }

    /// Whether the prompt carries any article context.
    pub fn has_context(&self) -> bool {
        self.article_count > 0
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Builds prompts from a user message and optional article context.
#[derive(Clone, Debug)]
pub struct PromptComposer {
    today: Date,
    response_word_limit: u32,
    context_word_limit: usize,
}

impl PromptComposer {
    /// Creates a composer that dates its prompts `today`.
    pub fn new(today: Date) -> Self {
        Self {
            today,
            response_word_limit: DEFAULT_RESPONSE_WORD_LIMIT,
            context_word_limit: DEFAULT_CONTEXT_WORD_LIMIT,
        }
    }

    /// Sets the response length requested from the model.
    pub fn with_response_word_limit(mut self, words: u32) -> Self {
        self.response_word_limit = words;
        self
    }

    /// Sets the maximum number of context words.
    pub fn with_context_word_limit(mut self, words: usize) -> Self {
        self.context_word_limit = words;
        self
    }

    /// Compose the prompt for `message` with `articles` as context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `message` is empty or whitespace.
    pub fn compose(&self, message: &str, articles: &[Article]) -> Result<Prompt> {
        if message.trim().is_empty() {
            return Err(Error::invalid_input("message is empty", None));
        }

        let date = self
            .today
            .format(format_description!("[year]-[month]-[day]"))
            .map_err(|e| {
                Error::serialization(format!("cannot format date: {e}"), Some(Box::new(e)))
            })?;
        let limit = self.response_word_limit;

        let (context, included) = self.context_block(articles);
        let context = context.trim_end();
        let text = if context.is_empty() {
            format!(
                "System: As of {date}, formulate a short response (less than {limit} words) to the User query.\n\
                 User: {message}\n\
                 Assistant: "
            )
        } else {
            format!(
                "System: As of {date}, based on the following MTL Blog articles:\n\
                 {context}\n\n\
                 Formulate a short response (less than {limit} words) to the User query pertaining to said content.\n\
                 User: {message}\n\
                 Assistant: "
            )
        };

        Ok(Prompt {
            text,
            article_count: included,
        })
    }

    fn context_block(&self, articles: &[Article]) -> (String, usize) {
        let mut remaining = self.context_word_limit;
        let mut block = String::new();
        let mut included = 0;
        for (i, article) in articles.iter().enumerate() {
            if remaining == 0 {
                break;
            }
            included += 1;
            block.push_str(&format!("[{}] {} ({})\n", i + 1, article.title, article.url));
            let words: Vec<&str> = article.body.split_whitespace().take(remaining).collect();
            remaining -= words.len();
            if !words.is_empty() {
                block.push_str(&words.join(" "));
                block.push('\n');
            }
            block.push('\n');
        }
        (block, included)
    }
}
