//! Main chat event loop.
//!
//! Drives terminal setup, user input, stream consumption, and rendering.
//! One submission is in flight at a time; the session rejects new submits
//! while streaming, and chunks tagged with a stale stream id are dropped.

use crate::core::chat_stream::{ChatStreamService, StreamMessage, StreamParams};
use crate::core::config::Config;
use crate::core::session::{ChatSession, SessionParams};
use crate::ui::renderer::ui;
use crate::ui::theme::ThemeMode;
use crate::utils::input::sanitize_text_input;
use ratatui::crossterm::{
    event::{
        self, DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste,
        EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers, MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{error::Error, io, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::warn;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub async fn run_chat(
    model: String,
    log: Option<String>,
    theme_override: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;

    let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
        "OPENAI_API_KEY environment variable not set

Please set your API key:
  export OPENAI_API_KEY=\"your-api-key-here\"

Optionally, you can also set a custom base URL:
  export OPENAI_BASE_URL=\"https://api.openai.com/v1\""
    })?;
    let base_url =
        std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

    let theme_mode = ThemeMode::from_name(
        theme_override
            .as_deref()
            .unwrap_or_else(|| config.theme_name()),
    );

    let session = ChatSession::new(SessionParams {
        model,
        api_key,
        base_url,
        theme_mode,
        markdown_enabled: config.markdown_enabled(),
        log_file: log,
    })?;
    let session = Arc::new(Mutex::new(session));

    // Setup terminal only after successful session creation
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(
        stdout,
        EnterAlternateScreen,
        EnableBracketedPaste,
        EnableMouseCapture
    )?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let (stream_service, mut rx) = ChatStreamService::new();

    let result = 'main_loop: loop {
        {
            let session_guard = session.lock().await;
            terminal.draw(|f| ui(f, &session_guard))?;
        }

        let term_size = terminal.size().unwrap_or_default();
        let transcript_height = {
            let session_guard = session.lock().await;
            let input_height = session_guard
                .calculate_input_area_height(term_size.width.saturating_sub(4));
            term_size
                .height
                .saturating_sub(input_height + 2) // input borders
                .saturating_sub(1) // title row
        };

        if event::poll(Duration::from_millis(50))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        break 'main_loop Ok(());
                    }
                    KeyCode::Char('t') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        let mut session_guard = session.lock().await;
                        session_guard.toggle_theme();
                        persist_theme(session_guard.theme_mode);
                    }
                    KeyCode::Char('n') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        let mut session_guard = session.lock().await;
                        session_guard.clear_conversation();
                    }
                    KeyCode::Esc => {
                        let mut session_guard = session.lock().await;
                        if session_guard.is_streaming {
                            session_guard.cancel_current_stream();
                        }
                    }
                    KeyCode::Enter if key.modifiers.contains(KeyModifiers::ALT) => {
                        let mut session_guard = session.lock().await;
                        session_guard.insert_input_char('\n');
                        let h = session_guard
                            .calculate_input_area_height(term_size.width.saturating_sub(4));
                        session_guard.update_input_scroll(h, term_size.width.saturating_sub(4));
                    }
                    KeyCode::Enter => {
                        let mut session_guard = session.lock().await;
                        if let Some(api_messages) = session_guard.submit_input() {
                            let (cancel_token, stream_id) = session_guard.start_new_stream();
                            stream_service.spawn_stream(StreamParams {
                                client: session_guard.client.clone(),
                                base_url: session_guard.base_url.clone(),
                                api_key: session_guard.api_key.clone(),
                                model: session_guard.model.clone(),
                                api_messages,
                                cancel_token,
                                stream_id,
                            });
                            session_guard
                                .update_scroll_position(transcript_height, term_size.width);
                        }
                    }
                    KeyCode::Char(c)
                        if !key.modifiers.contains(KeyModifiers::CONTROL) =>
                    {
                        let mut session_guard = session.lock().await;
                        session_guard.insert_input_char(c);
                        let h = session_guard
                            .calculate_input_area_height(term_size.width.saturating_sub(4));
                        session_guard.update_input_scroll(h, term_size.width.saturating_sub(4));
                    }
                    KeyCode::Backspace => {
                        let mut session_guard = session.lock().await;
                        session_guard.backspace_input();
                        let h = session_guard
                            .calculate_input_area_height(term_size.width.saturating_sub(4));
                        session_guard.update_input_scroll(h, term_size.width.saturating_sub(4));
                    }
                    KeyCode::Left => {
                        let mut session_guard = session.lock().await;
                        session_guard.move_input_cursor_left();
                    }
                    KeyCode::Right => {
                        let mut session_guard = session.lock().await;
                        session_guard.move_input_cursor_right();
                    }
                    KeyCode::Up => {
                        let mut session_guard = session.lock().await;
                        session_guard.scroll_up(1);
                    }
                    KeyCode::Down => {
                        let mut session_guard = session.lock().await;
                        session_guard.scroll_down(1, transcript_height, term_size.width);
                    }
                    _ => {}
                },
                Event::Paste(text) => {
                    let mut session_guard = session.lock().await;
                    let sanitized = sanitize_text_input(&text);
                    session_guard.insert_input_str(&sanitized);
                    let h = session_guard
                        .calculate_input_area_height(term_size.width.saturating_sub(4));
                    session_guard.update_input_scroll(h, term_size.width.saturating_sub(4));
                }
                Event::Mouse(mouse) => match mouse.kind {
                    MouseEventKind::ScrollUp => {
                        let mut session_guard = session.lock().await;
                        session_guard.scroll_up(3);
                    }
                    MouseEventKind::ScrollDown => {
                        let mut session_guard = session.lock().await;
                        session_guard.scroll_down(3, transcript_height, term_size.width);
                    }
                    _ => {}
                },
                _ => {}
            }
        }

        // Drain all pending stream updates before the next draw
        while let Ok((message, stream_id)) = rx.try_recv() {
            let mut session_guard = session.lock().await;
            // Chunks from superseded or cancelled streams are dropped
            if stream_id != session_guard.current_stream_id {
                continue;
            }
            match message {
                StreamMessage::Chunk(content) => {
                    session_guard.append_to_response(
                        &content,
                        transcript_height,
                        term_size.width,
                    );
                }
                StreamMessage::Error(error) => {
                    session_guard.handle_stream_error(
                        error,
                        transcript_height,
                        term_size.width,
                    );
                }
                StreamMessage::End => {
                    session_guard.finalize_response();
                }
            }
        }
    };

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableBracketedPaste,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

fn persist_theme(mode: ThemeMode) {
    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            warn!("failed to load config for theme persistence: {e}");
            return;
        }
    };
    config.theme = Some(mode.name().to_string());
    if let Err(e) = config.save() {
        warn!("failed to persist theme preference: {e}");
    }
}
