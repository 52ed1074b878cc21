//! The chat window: a scrolling transcript above a message box.
//!
//! [`ChatWindow`] is a [`Renderer`], so the session writes into the
//! transcript the same way it writes to stdout in line mode. The window
//! never touches the terminal itself. The caller draws it into a ratatui
//! [`Frame`] and feeds it key events.

use ratatui::Frame;
use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Paragraph};
use tui_textarea::TextArea;

use crate::render::Renderer;

/// Lines moved by one PageUp or PageDown.
const SCROLL_STEP: u16 = 5;

/// The input box grows with its content up to this many rows.
const MAX_INPUT_ROWS: u16 = 8;

/// Who a transcript entry came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Speaker {
    /// The user's own message.
    You,
    /// An answer or greeting from the bot.
    Bot,
    /// Progress, e.g. while articles are fetched.
    Status,
    /// A problem that does not interrupt the conversation.
    Warning,
    Error,
    /// Menus, help and statistics.
    Info,
}

impl Speaker {
    fn label(self) -> &'static str {
        match self {
            Speaker::You => "You: ",
            Speaker::Bot => "chatMTL: ",
            Speaker::Status | Speaker::Info => "",
            Speaker::Warning => "warning: ",
            Speaker::Error => "error: ",
        }
    }

    fn style(self) -> Style {
        match self {
            Speaker::You => Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            Speaker::Bot => Style::default().fg(Color::Green),
            Speaker::Status => Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
            Speaker::Warning => Style::default().fg(Color::Yellow),
            Speaker::Error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            Speaker::Info => Style::default(),
        }
    }
}

/// One message in the transcript.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub speaker: Speaker,
    pub text: String,
}

/// What the caller should do after a key press.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WindowAction {
    /// Nothing beyond redrawing.
    Idle,
    /// The user sent this text, exactly as typed.
    Submit(String),
    /// The user closed the window.
    Quit,
}

/// A chat window with a transcript pane and an input field.
pub struct ChatWindow {
    title: String,
    entries: Vec<Entry>,
    input: TextArea<'static>,
    /// Rows scrolled up from the bottom of the transcript. Zero follows new
    /// messages.
    scroll_back: u16,
    busy: bool,
}

impl ChatWindow {
    /// Creates an empty window titled `title`.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            entries: Vec::new(),
            input: TextArea::default(),
            scroll_back: 0,
            busy: false,
        }
    }

    /// The transcript, oldest first.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// What is currently typed in the input field.
    pub fn input_text(&self) -> String {
        self.input.lines().join("\n")
    }

    /// Marks the window as waiting on an answer. Input is ignored meanwhile.
    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Handles one key press.
    ///
    /// Enter sends the input unless it is blank. Shift+Enter starts a new
    /// line. Esc and Ctrl+C close the window. PageUp and PageDown scroll the
    /// transcript. Every other key edits the input.
    pub fn handle_key(&mut self, key: KeyEvent) -> WindowAction {
        if key.kind == KeyEventKind::Release {
            return WindowAction::Idle;
        }
        match (key.modifiers, key.code) {
            (KeyModifiers::CONTROL, KeyCode::Char('c')) | (_, KeyCode::Esc) => WindowAction::Quit,
            (_, KeyCode::PageUp) => {
                self.scroll_back = self.scroll_back.saturating_add(SCROLL_STEP);
                WindowAction::Idle
            }
            (_, KeyCode::PageDown) => {
                self.scroll_back = self.scroll_back.saturating_sub(SCROLL_STEP);
                WindowAction::Idle
            }
            _ if self.busy => WindowAction::Idle,
            (KeyModifiers::SHIFT, KeyCode::Enter) => {
                self.input.insert_newline();
                WindowAction::Idle
            }
            (_, KeyCode::Enter) => self.send(),
            _ => {
                self.input.input(key);
                WindowAction::Idle
            }
        }
    }

    /// Inserts pasted text into the input field.
    pub fn paste(&mut self, text: &str) {
        if !self.busy {
            self.input.insert_str(text);
        }
    }

    /// Draws the transcript above the input field, filling the frame.
    pub fn draw(&mut self, frame: &mut Frame) {
        let input_rows = u16::try_from(self.input.lines().len())
            .unwrap_or(MAX_INPUT_ROWS)
            .clamp(1, MAX_INPUT_ROWS);
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(3), Constraint::Length(input_rows + 2)])
            .split(frame.area());

        let pane = chunks[0];
        let width = usize::from(pane.width.saturating_sub(2)).max(1);
        let visible = pane.height.saturating_sub(2);
        let lines = self.transcript_lines(width);
        let total = u16::try_from(lines.len()).unwrap_or(u16::MAX);
        let bottom = total.saturating_sub(visible);
        self.scroll_back = self.scroll_back.min(bottom);

        let title = if self.scroll_back > 0 {
            format!("{} (PgDn to follow)", self.title)
        } else {
            self.title.clone()
        };
        let transcript = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title(title))
            .scroll((bottom - self.scroll_back, 0));
        frame.render_widget(transcript, pane);

        let hint = if self.busy {
            "Thinking..."
        } else {
            "Message (Enter to send, /help for commands, Esc to quit)"
        };
        self.input
            .set_block(Block::default().borders(Borders::ALL).title(hint));
        frame.render_widget(&self.input, chunks[1]);
    }

    fn send(&mut self) -> WindowAction {
        let text = self.input_text();
        if text.trim().is_empty() {
            return WindowAction::Idle;
        }
        self.input = TextArea::default();
        self.scroll_back = 0;
        self.push(Speaker::You, &text);
        WindowAction::Submit(text)
    }

    fn push(&mut self, speaker: Speaker, text: &str) {
        self.entries.push(Entry {
            speaker,
            text: text.to_string(),
        });
    }

    // Wrapped here rather than by the paragraph so the row count, and with
    // it the bottom of the transcript, is known exactly.
    fn transcript_lines(&self, width: usize) -> Vec<Line<'static>> {
        let mut lines = Vec::new();
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 && entry.speaker != Speaker::Status {
                lines.push(Line::default());
            }
            let text = format!("{}{}", entry.speaker.label(), entry.text);
            let style = entry.speaker.style();
            for row in textwrap::wrap(&text, width) {
                lines.push(Line::styled(row.into_owned(), style));
            }
        }
        lines
    }
}

impl Renderer for ChatWindow {
    fn print_response(&mut self, text: &str) {
        self.push(Speaker::Bot, text);
    }

    fn print_status(&mut self, status: &str) {
        self.push(Speaker::Status, status);
    }

    fn print_warning(&mut self, warning: &str) {
        self.push(Speaker::Warning, warning);
    }

    fn print_error(&mut self, error: &str) {
        self.push(Speaker::Error, error);
    }

    fn print_info(&mut self, info: &str) {
        self.push(Speaker::Info, info);
    }
}

#[cfg(test)]
mod tests {
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(window: &mut ChatWindow, text: &str) {
        for ch in text.chars() {
            assert_eq!(window.handle_key(key(KeyCode::Char(ch))), WindowAction::Idle);
        }
    }

    fn screen(window: &mut ChatWindow, width: u16, height: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal.draw(|frame| window.draw(frame)).unwrap();
        let buffer = terminal.backend().buffer();
        let mut text = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                text.push_str(buffer[(x, y)].symbol());
            }
            text.push('\n');
        }
        text
    }

    #[test]
    fn enter_sends_the_typed_message() {
        let mut window = ChatWindow::new("chatMTL");
        type_text(&mut window, "Salut, quoi de neuf?");
        assert_eq!(window.input_text(), "Salut, quoi de neuf?");

        let action = window.handle_key(key(KeyCode::Enter));
        assert_eq!(action, WindowAction::Submit("Salut, quoi de neuf?".to_string()));
        assert_eq!(window.input_text(), "");
        assert_eq!(
            window.entries().last(),
            Some(&Entry {
                speaker: Speaker::You,
                text: "Salut, quoi de neuf?".to_string(),
            })
        );
    }

    #[test]
    fn blank_input_is_not_sent() {
        let mut window = ChatWindow::new("chatMTL");
        assert_eq!(window.handle_key(key(KeyCode::Enter)), WindowAction::Idle);
        type_text(&mut window, "   ");
        assert_eq!(window.handle_key(key(KeyCode::Enter)), WindowAction::Idle);
        assert!(window.entries().is_empty());
    }

    #[test]
    fn esc_and_ctrl_c_close_the_window() {
        let mut window = ChatWindow::new("chatMTL");
        assert_eq!(window.handle_key(key(KeyCode::Esc)), WindowAction::Quit);
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(window.handle_key(ctrl_c), WindowAction::Quit);
    }

    #[test]
    fn input_is_ignored_while_busy() {
        let mut window = ChatWindow::new("chatMTL");
        type_text(&mut window, "hi");
        window.set_busy(true);
        window.handle_key(key(KeyCode::Char('!')));
        assert_eq!(window.handle_key(key(KeyCode::Enter)), WindowAction::Idle);
        window.paste("pasted");
        assert_eq!(window.input_text(), "hi");

        window.set_busy(false);
        assert_eq!(
            window.handle_key(key(KeyCode::Enter)),
            WindowAction::Submit("hi".to_string())
        );
    }

    #[test]
    fn shift_enter_and_paste_build_multiline_messages() {
        let mut window = ChatWindow::new("chatMTL");
        type_text(&mut window, "first");
        window.handle_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::SHIFT));
        window.paste("second");
        assert_eq!(
            window.handle_key(key(KeyCode::Enter)),
            WindowAction::Submit("first\nsecond".to_string())
        );
    }

    #[test]
    fn renderer_output_lands_in_the_transcript() {
        let mut window = ChatWindow::new("chatMTL");
        let renderer: &mut dyn Renderer = &mut window;
        renderer.print_response("Bonjour!");
        renderer.print_status("Reading the latest News articles...");
        renderer.print_warning("this conversation was not saved");
        renderer.print_error("Sorry");
        renderer.print_info("1. News");

        let speakers: Vec<Speaker> = window.entries().iter().map(|e| e.speaker).collect();
        assert_eq!(
            speakers,
            vec![
                Speaker::Bot,
                Speaker::Status,
                Speaker::Warning,
                Speaker::Error,
                Speaker::Info,
            ]
        );

        let text = screen(&mut window, 60, 20);
        assert!(text.contains("chatMTL: Bonjour!"));
        assert!(text.contains("Reading the latest News articles..."));
        assert!(text.contains("warning: this conversation was not saved"));
        assert!(text.contains("error: Sorry"));
        assert!(text.contains("Esc to quit"));
    }

    #[test]
    fn long_answers_wrap_inside_the_pane() {
        let mut window = ChatWindow::new("chatMTL");
        window.print_response("The Old Port winter market opens Friday with forty local vendors");
        let text = screen(&mut window, 30, 20);
        assert!(text.contains("chatMTL: The Old Port"));
        assert!(text.contains("vendors"));
        for row in text.lines() {
            assert_eq!(row.chars().count(), 30);
        }
    }

    #[test]
    fn transcript_follows_the_newest_message_and_scrolls_back() {
        let mut window = ChatWindow::new("chatMTL");
        for i in 0..40 {
            window.print_info(&format!("line {i:02}"));
        }
        let text = screen(&mut window, 40, 12);
        assert!(text.contains("line 39"));
        assert!(!text.contains("line 00"));

        for _ in 0..40 {
            window.handle_key(key(KeyCode::PageUp));
        }
        let text = screen(&mut window, 40, 12);
        assert!(text.contains("line 00"));
        assert!(!text.contains("line 39"));
        assert!(text.contains("PgDn to follow"));

        for _ in 0..40 {
            window.handle_key(key(KeyCode::PageDown));
        }
        let text = screen(&mut window, 40, 12);
        assert!(text.contains("line 39"));
    }

    #[test]
    fn busy_window_says_so() {
        let mut window = ChatWindow::new("chatMTL");
        window.set_busy(true);
        assert!(window.is_busy());
        assert!(screen(&mut window, 60, 10).contains("Thinking..."));
    }
}
