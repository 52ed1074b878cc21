//! Output rendering for the chat window.
//!
//! This module provides a trait-based rendering abstraction so the chat
//! session never writes to the terminal directly. The default implementation
//! uses ANSI escape codes to tell the bot's messages apart from notices.

use std::io::{self, Stdout, Write};

/// ANSI escape code for dim text (used for status lines).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for blue text (used for the bot's messages).
const ANSI_BLUE: &str = "\x1b[34m";

/// ANSI escape code for yellow text (used for warnings).
const ANSI_YELLOW: &str = "\x1b[33m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Trait for rendering chat output.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling
/// - Plain text without styling (for piping/redirecting)
/// - Recording output in tests
pub trait Renderer: Send {
    /// Print a message from the bot.
    fn print_response(&mut self, text: &str);

    /// Print a short progress line, e.g. while articles are fetched.
    fn print_status(&mut self, status: &str) {
        _ = status;
    }

    /// Print a warning that does not interrupt the conversation.
    fn print_warning(&mut self, warning: &str);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
        }
    }

    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }

    fn styled(&self, style: &str, text: &str) -> String {
        if self.use_color {
            format!("{style}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn print_response(&mut self, text: &str) {
        println!("{}", self.styled(ANSI_BLUE, &format!("Bot: {text}")));
        self.flush();
    }

    fn print_status(&mut self, status: &str) {
        println!("{}", self.styled(ANSI_DIM, status));
        self.flush();
    }

    fn print_warning(&mut self, warning: &str) {
        eprintln!("{}", self.styled(ANSI_YELLOW, &format!("Warning: {warning}")));
    }

    fn print_error(&mut self, error: &str) {
        eprintln!("{}", self.styled(ANSI_RED, &format!("Error: {error}")));
    }

    fn print_info(&mut self, info: &str) {
        println!("{info}");
        self.flush();
    }
}
