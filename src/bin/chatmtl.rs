//! Chat about Montreal, grounded in MTL Blog articles.
//!
//! This binary opens a chat window that answers questions with a local
//! llama.cpp model and appends every answered turn to a CSV log.
//!
//! # Usage
//!
//! ```bash
//! # Answer without article context, logging to ./chat_log.csv
//! chatmtl
//!
//! # Answer from the Eat Drink section, logging elsewhere
//! chatmtl --category eat-drink --log-file ~/mtl.csv
//!
//! # Point at another model server
//! CHATMTL_ENDPOINT=http://gpu-box:8080 chatmtl
//!
//! # Plain prompt instead of the window, e.g. over a dumb terminal
//! chatmtl --no-window
//! ```
//!
//! In the window, diagnostics go to `chatmtl-debug.log` beside the CSV log.
//! Set `RUST_LOG` to change their level.
//!
//! # Commands
//!
//! While chatting, you can use slash commands:
//! - `/help` - Show available commands
//! - `/category [name]` - Show or change the article category
//! - `/feedback <text>` - Leave feedback on the last answer
//! - `/history [all]` - Show this session, or the whole log
//! - `/stats` - Show session statistics
//! - `/quit` - Exit the application

use std::io;
use std::path::Path;
use std::time::Duration;

use arrrg::CommandLine;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::crossterm::event::{self, DisableBracketedPaste, EnableBracketedPaste, Event};
use ratatui::crossterm::execute;
use ratatui::crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

use chatmtl::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatSession, PlainTextRenderer, Renderer, help_text,
    parse_command,
};
use chatmtl::{
    BlogFetcher, Category, ChatTurn, ChatWindow, Fetcher, Inference, LlamaClient, SessionLogger,
    WindowAction,
};

type BoxError = Box<dyn std::error::Error>;

/// Main entry point for the chatmtl application.
fn main() -> Result<(), BoxError> {
    // Only readable while the process has a single thread.
    let offset = chatmtl::utils::time::local_offset();

    let (args, _) = ChatArgs::from_command_line_relaxed("chatmtl [OPTIONS]");
    let config = match ChatConfig::from_env(args) {
        Ok(config) => config.with_utc_offset(offset),
        Err(err) => {
            eprintln!("chatmtl: {err}");
            std::process::exit(1);
        }
    };
    let _guard = init_tracing(&config);

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(run(config))
}

fn init_tracing(config: &ChatConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if config.line_mode {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
        return None;
    }

    // stderr would draw over the window.
    let dir = match config.log_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix("chatmtl-debug.log")
        .build(dir);
    match appender {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        Err(err) => {
            eprintln!("chatmtl: diagnostics disabled: {err}");
            None
        }
    }
}

async fn run(config: ChatConfig) -> Result<(), BoxError> {
    let fetcher = BlogFetcher::with_options(Some(&config.blog_url), None)?
        .with_word_limit(config.context_word_limit);
    let client = LlamaClient::with_options(
        Some(&config.endpoint),
        config.api_key.clone(),
        Some(config.timeout),
    )?;
    let logger = SessionLogger::new(config.log_path.clone());
    let line_mode = config.line_mode;
    let mut plain = PlainTextRenderer::with_color(config.use_color);
    let mut session = ChatSession::new(config, fetcher, client, logger);

    if line_mode {
        run_line_mode(&mut session, &mut plain).await?;
    } else {
        run_window(&mut session).await?;
    }

    // The window is gone by now, so the goodbye goes to the terminal.
    session.quit(&mut plain)?;
    Ok(())
}

async fn run_window<F: Fetcher, I: Inference>(
    session: &mut ChatSession<F, I>,
) -> Result<(), BoxError> {
    let mut window = ChatWindow::new("chatMTL");
    session.start(&mut window)?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let result = window_loop(&mut terminal, session, &mut window).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableBracketedPaste
    )?;
    terminal.show_cursor()?;
    result
}

async fn window_loop<F: Fetcher, I: Inference>(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    session: &mut ChatSession<F, I>,
    window: &mut ChatWindow,
) -> Result<(), BoxError> {
    loop {
        terminal.draw(|frame| window.draw(frame))?;

        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        let line = match event::read()? {
            Event::Key(key) => match window.handle_key(key) {
                WindowAction::Idle => continue,
                WindowAction::Quit => return Ok(()),
                WindowAction::Submit(line) => line,
            },
            Event::Paste(text) => {
                window.paste(&text);
                continue;
            }
            _ => continue,
        };

        if let Some(cmd) = parse_command(&line) {
            if cmd == ChatCommand::Quit {
                return Ok(());
            }
            run_command(session, cmd, window);
            continue;
        }

        window.set_busy(true);
        terminal.draw(|frame| window.draw(frame))?;
        if let Err(err) = session.submit(&line, window).await {
            window.print_error(&err.to_string());
        }
        window.set_busy(false);
    }
}

async fn run_line_mode<F: Fetcher, I: Inference>(
    session: &mut ChatSession<F, I>,
    renderer: &mut PlainTextRenderer,
) -> Result<(), BoxError> {
    let mut rl = DefaultEditor::new()?;
    session.start(renderer)?;

    loop {
        let readline = rl.readline("You: ");

        match readline {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line.as_str());

                // Check for slash commands
                if let Some(cmd) = parse_command(&line) {
                    if cmd == ChatCommand::Quit {
                        break;
                    }
                    run_command(session, cmd, renderer);
                    continue;
                }

                if let Err(err) = session.submit(&line, renderer).await {
                    renderer.print_error(&err.to_string());
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                renderer.print_error(&format!("Input error: {err}"));
                break;
            }
        }
    }
    Ok(())
}

fn run_command<F: Fetcher, I: Inference>(
    session: &mut ChatSession<F, I>,
    cmd: ChatCommand,
    renderer: &mut dyn Renderer,
) {
    match cmd {
        ChatCommand::Help => renderer.print_info(help_text()),
        ChatCommand::Categories => {
            renderer.print_info(&Category::menu());
        }
        ChatCommand::Category(selection) => match session.select_category(&selection) {
            Ok(category) => renderer.print_info(&format!("Answering from: {category}")),
            Err(err) => renderer.print_error(&format!(
                "{err}\nChoose one of:\n{}",
                Category::menu()
            )),
        },
        ChatCommand::ClearCategory => {
            session.clear_category();
            renderer.print_info("Answering without article context.");
        }
        ChatCommand::ShowCategory => match session.category() {
            Some(category) => renderer.print_info(&format!("Answering from: {category}")),
            None => renderer.print_info("No category selected."),
        },
        ChatCommand::Feedback(text) => match session.feedback(&text, renderer) {
            Ok(_) => renderer.print_response("Thank you for the feedback!"),
            Err(err) => renderer.print_error(&err.to_string()),
        },
        ChatCommand::History => {
            if session.turns().is_empty() {
                renderer.print_info("Nothing answered yet.");
            } else {
                renderer.print_info(&format_turns(session.turns()));
            }
        }
        ChatCommand::LogHistory => match session.logged_turns() {
            Ok(turns) if turns.is_empty() => renderer.print_info("The log is empty."),
            Ok(turns) => renderer.print_info(&format_turns(&turns)),
            Err(err) => renderer.print_error(&format!("Failed to read the log: {err}")),
        },
        ChatCommand::Stats => {
            let stats = session.stats();
            renderer.print_info(&format!(
                "{stats}\nLog file:     {}",
                session.config().log_path.display()
            ));
        }
        ChatCommand::Quit => {}
        ChatCommand::Invalid(message) => {
            renderer.print_error(&message);
        }
    }
}

fn format_turns(turns: &[ChatTurn]) -> String {
    let mut out = String::new();
    for (i, turn) in turns.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format!(
            "{}. [{}] You: {}\n   Bot: {}",
            i + 1,
            turn.timestamp,
            turn.user_message,
            turn.model_response
        ));
        if let Some(feedback) = turn.feedback.as_deref() {
            out.push_str(&format!("\n   Feedback: {feedback}"));
        }
    }
    out
}
