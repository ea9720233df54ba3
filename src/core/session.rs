//! Session state: the conversation, the input buffer, and presentation flags.
//!
//! All mutation happens on the event loop; streaming tasks only talk to the
//! session through the chunk channel, so no locking discipline is needed
//! beyond the loop's own mutex.

use crate::api::ChatMessage;
use crate::core::message::Message;
use crate::ui::markdown::render_message;
use crate::ui::theme::{Theme, ThemeMode};
use crate::utils::logging::TranscriptLog;
use ratatui::text::Line;
use reqwest::Client;
use std::{collections::VecDeque, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use unicode_width::UnicodeWidthChar;

const GREETING: &str = "Start a conversation! Ask me anything and I'll be happy to help.";

/// Input box grows with content up to this many rows.
pub const MAX_INPUT_ROWS: u16 = 6;

pub struct ChatSession {
    pub messages: VecDeque<Message>,
    pub input: String,
    pub input_cursor_position: usize,
    pub current_response: String,
    pub client: Client,
    pub model: String,
    pub api_key: String,
    pub base_url: String,
    pub scroll_offset: u16,
    pub auto_scroll: bool,
    pub is_streaming: bool,
    pub pulse_start: Instant,
    pub theme_mode: ThemeMode,
    pub theme: Theme,
    pub markdown_enabled: bool,
    pub logging: TranscriptLog,
    pub stream_cancel_token: Option<CancellationToken>,
    pub current_stream_id: u64,
    pub input_scroll_offset: u16,
}

pub struct SessionParams {
    pub model: String,
    pub api_key: String,
    pub base_url: String,
    pub theme_mode: ThemeMode,
    pub markdown_enabled: bool,
    pub log_file: Option<String>,
}

impl ChatSession {
    pub fn new(params: SessionParams) -> Result<Self, Box<dyn std::error::Error>> {
        let logging = TranscriptLog::new(params.log_file)?;
        Ok(ChatSession {
            messages: VecDeque::new(),
            input: String::new(),
            input_cursor_position: 0,
            current_response: String::new(),
            client: Client::new(),
            model: params.model,
            api_key: params.api_key,
            base_url: params.base_url,
            scroll_offset: 0,
            auto_scroll: true,
            is_streaming: false,
            pulse_start: Instant::now(),
            theme: Theme::for_mode(params.theme_mode),
            theme_mode: params.theme_mode,
            markdown_enabled: params.markdown_enabled,
            logging,
            stream_cancel_token: None,
            current_stream_id: 0,
            input_scroll_offset: 0,
        })
    }

    /// Take the pending input and turn it into an outgoing conversation.
    ///
    /// Returns `None` (and leaves all state untouched) when the input is
    /// blank or a response is already in flight.
    pub fn submit_input(&mut self) -> Option<Vec<ChatMessage>> {
        if self.is_streaming || self.input.trim().is_empty() {
            return None;
        }

        let input_text = std::mem::take(&mut self.input);
        self.input_cursor_position = 0;
        self.input_scroll_offset = 0;
        self.auto_scroll = true;

        Some(self.add_user_message(input_text))
    }

    /// Append a user message plus the empty assistant message that will
    /// receive the streamed reply, and build the API payload (all user and
    /// assistant turns so far, excluding local notices and the placeholder).
    pub fn add_user_message(&mut self, content: String) -> Vec<ChatMessage> {
        if let Err(e) = self.logging.log_user_turn(&content) {
            warn!("failed to log user turn: {e}");
        }

        self.messages.push_back(Message::user(content));
        self.messages.push_back(Message::assistant(String::new()));
        self.current_response.clear();

        let mut api_messages = Vec::new();
        for msg in self.messages.iter().take(self.messages.len() - 1) {
            if let Some(role) = msg.role.to_api_role() {
                api_messages.push(ChatMessage {
                    role: role.to_string(),
                    content: msg.content.clone(),
                });
            }
        }
        api_messages
    }

    /// Append a stream chunk to the in-progress assistant message.
    pub fn append_to_response(&mut self, content: &str, available_height: u16, width: u16) {
        self.current_response.push_str(content);
        if let Some(last_msg) = self.messages.back_mut() {
            if last_msg.is_assistant() {
                last_msg.content = self.current_response.clone();
            }
        }
        self.update_scroll_position(available_height, width);
    }

    /// Record an upstream failure as a visible notice. Whatever partial
    /// content already streamed stays in the transcript.
    pub fn handle_stream_error(&mut self, error: String, available_height: u16, width: u16) {
        // Drop the empty assistant placeholder so a failed reply is one user
        // entry plus the notice, not a blank bubble as well.
        if let Some(last_msg) = self.messages.back() {
            if last_msg.is_assistant() && last_msg.content.is_empty() {
                self.messages.pop_back();
            }
        }
        self.messages.push_back(Message::app(error));
        self.update_scroll_position(available_height, width);
    }

    /// Called when the stream ends, successfully or not.
    pub fn finalize_response(&mut self) {
        if !self.current_response.is_empty() {
            if let Err(e) = self.logging.log_assistant_turn(&self.current_response) {
                warn!("failed to log assistant turn: {e}");
            }
        }
        self.is_streaming = false;
        self.stream_cancel_token = None;
    }

    /// Empty the conversation. Irreversible within the session; any stream
    /// in flight is cancelled first.
    pub fn clear_conversation(&mut self) {
        self.cancel_current_stream();
        self.messages.clear();
        self.current_response.clear();
        self.scroll_offset = 0;
        self.auto_scroll = true;
    }

    /// Flip light/dark. Presentation only.
    pub fn toggle_theme(&mut self) {
        self.theme_mode = self.theme_mode.toggled();
        self.theme = Theme::for_mode(self.theme_mode);
    }

    /// Cancel the in-flight stream, if any. Retires the current stream id so
    /// chunks the cancelled task already queued are dropped by the id filter,
    /// and removes the assistant placeholder when nothing streamed into it.
    /// Partial content that already arrived stays in the transcript.
    pub fn cancel_current_stream(&mut self) {
        if let Some(token) = self.stream_cancel_token.take() {
            token.cancel();
            self.current_stream_id += 1;
            if let Some(last_msg) = self.messages.back() {
                if last_msg.is_assistant() && last_msg.content.is_empty() {
                    self.messages.pop_back();
                }
            }
        }
        self.is_streaming = false;
    }

    /// Begin a new stream, superseding any previous one. The returned id
    /// lets the event loop discard chunks from stale streams.
    pub fn start_new_stream(&mut self) -> (CancellationToken, u64) {
        self.cancel_current_stream();
        self.current_stream_id += 1;

        let token = CancellationToken::new();
        self.stream_cancel_token = Some(token.clone());
        self.is_streaming = true;
        self.pulse_start = Instant::now();

        (token, self.current_stream_id)
    }

    // ---- Transcript display ----

    /// Build the full transcript as pre-wrapped display lines.
    pub fn build_display_lines(&self, width: u16) -> Vec<Line<'static>> {
        let mut lines = Vec::new();
        if self.messages.is_empty() {
            lines.push(Line::from(""));
            lines.extend(render_message(
                &Message::app(GREETING),
                &self.theme,
                Some(width as usize),
                self.markdown_enabled,
            ));
            return lines;
        }

        for msg in &self.messages {
            lines.extend(render_message(
                msg,
                &self.theme,
                Some(width as usize),
                self.markdown_enabled,
            ));
            lines.push(Line::from(""));
        }
        lines
    }

    pub fn calculate_wrapped_line_count(&self, width: u16) -> u16 {
        self.build_display_lines(width).len() as u16
    }

    pub fn calculate_max_scroll_offset(&self, available_height: u16, width: u16) -> u16 {
        let total = self.calculate_wrapped_line_count(width);
        total.saturating_sub(available_height)
    }

    /// Keep the view pinned to the bottom while auto-scroll is engaged.
    pub fn update_scroll_position(&mut self, available_height: u16, width: u16) {
        if self.auto_scroll {
            self.scroll_offset = self.calculate_max_scroll_offset(available_height, width);
        }
    }

    pub fn scroll_up(&mut self, amount: u16) {
        self.auto_scroll = false;
        self.scroll_offset = self.scroll_offset.saturating_sub(amount);
    }

    pub fn scroll_down(&mut self, amount: u16, available_height: u16, width: u16) {
        let max_scroll = self.calculate_max_scroll_offset(available_height, width);
        self.scroll_offset = self.scroll_offset.saturating_add(amount).min(max_scroll);
        // Reaching the bottom re-engages auto-scroll
        if self.scroll_offset >= max_scroll {
            self.auto_scroll = true;
        }
    }

    // ---- Input editing ----

    pub fn insert_input_char(&mut self, c: char) {
        let byte_idx = self.input_byte_index();
        self.input.insert(byte_idx, c);
        self.input_cursor_position += 1;
    }

    pub fn insert_input_str(&mut self, s: &str) {
        let byte_idx = self.input_byte_index();
        self.input.insert_str(byte_idx, s);
        self.input_cursor_position += s.chars().count();
    }

    pub fn backspace_input(&mut self) {
        if self.input_cursor_position == 0 {
            return;
        }
        self.input_cursor_position -= 1;
        let byte_idx = self.input_byte_index();
        self.input.remove(byte_idx);
    }

    pub fn move_input_cursor_left(&mut self) {
        self.input_cursor_position = self.input_cursor_position.saturating_sub(1);
    }

    pub fn move_input_cursor_right(&mut self) {
        let len = self.input.chars().count();
        self.input_cursor_position = (self.input_cursor_position + 1).min(len);
    }

    fn input_byte_index(&self) -> usize {
        self.input
            .char_indices()
            .nth(self.input_cursor_position)
            .map(|(i, _)| i)
            .unwrap_or(self.input.len())
    }

    /// Lay the input buffer out into rows that fit the available display
    /// width and locate the cursor within them. Columns are display columns,
    /// so wide characters advance the cursor by their rendered width.
    pub fn input_layout(&self, available_width: u16) -> (Vec<String>, u16, u16) {
        let max_width = available_width.max(1) as usize;
        let mut rows: Vec<String> = Vec::new();
        let mut cursor_row = 0u16;
        let mut cursor_col = 0u16;
        let mut chars_seen = 0usize;
        let cursor = self.input_cursor_position;

        for logical in self.input.split('\n') {
            let mut row = String::new();
            let mut row_width = 0usize;
            for ch in logical.chars() {
                let ch_width = UnicodeWidthChar::width(ch).unwrap_or(0);
                // A character that no longer fits starts the next row, and a
                // cursor sitting before it belongs there too
                if row_width + ch_width > max_width && !row.is_empty() {
                    rows.push(std::mem::take(&mut row));
                    row_width = 0;
                }
                if chars_seen == cursor {
                    cursor_row = rows.len() as u16;
                    cursor_col = row_width as u16;
                }
                row.push(ch);
                row_width += ch_width;
                chars_seen += 1;
            }
            if chars_seen == cursor {
                cursor_row = rows.len() as u16;
                cursor_col = row_width as u16;
            }
            rows.push(row);
            chars_seen += 1; // the newline
        }

        (rows, cursor_row, cursor_col)
    }

    /// Input area height: one row while the content fits, then grow to a cap.
    pub fn calculate_input_area_height(&self, available_width: u16) -> u16 {
        if self.input.is_empty() {
            return 1;
        }
        let (rows, _, _) = self.input_layout(available_width);
        if rows.len() <= 1 && !self.input.contains('\n') {
            1
        } else {
            (rows.len() as u16).clamp(2, MAX_INPUT_ROWS)
        }
    }

    /// Keep the cursor row visible when the input exceeds its area.
    pub fn update_input_scroll(&mut self, input_area_height: u16, available_width: u16) {
        let (rows, cursor_row, _) = self.input_layout(available_width);
        let total = rows.len() as u16;

        if total <= input_area_height {
            self.input_scroll_offset = 0;
            return;
        }
        if cursor_row < self.input_scroll_offset {
            self.input_scroll_offset = cursor_row;
        } else if cursor_row >= self.input_scroll_offset + input_area_height {
            self.input_scroll_offset = cursor_row.saturating_sub(input_area_height - 1);
        }
        let max_scroll = total.saturating_sub(input_area_height);
        self.input_scroll_offset = self.input_scroll_offset.min(max_scroll);
    }

    pub fn logging_status(&self) -> String {
        self.logging.status_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::Role;

    fn test_session() -> ChatSession {
        ChatSession::new(SessionParams {
            model: "gpt-4o".to_string(),
            api_key: "test-key".to_string(),
            base_url: "https://api.example.com/v1".to_string(),
            theme_mode: ThemeMode::Dark,
            markdown_enabled: true,
            log_file: None,
        })
        .expect("create session")
    }

    #[test]
    fn submit_grows_conversation_by_two() {
        let mut session = test_session();
        session.input = "hello there".to_string();

        let api_messages = session.submit_input().expect("submission accepted");

        assert_eq!(session.messages.len(), 2);
        assert!(session.messages[0].is_user());
        assert_eq!(session.messages[0].content, "hello there");
        assert!(session.messages[1].is_assistant());
        assert!(session.messages[1].content.is_empty());

        // Payload carries the user turn but not the placeholder
        assert_eq!(api_messages.len(), 1);
        assert_eq!(api_messages[0].role, "user");
    }

    #[test]
    fn submit_is_noop_on_blank_input() {
        let mut session = test_session();
        for blank in ["", "   ", " \n\t "] {
            session.input = blank.to_string();
            assert!(session.submit_input().is_none());
            assert!(session.messages.is_empty());
        }
    }

    #[test]
    fn submit_is_noop_while_streaming() {
        let mut session = test_session();
        session.input = "first".to_string();
        session.submit_input().expect("first submission");
        session.start_new_stream();

        session.input = "second".to_string();
        assert!(session.submit_input().is_none());
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.input, "second");
    }

    #[test]
    fn upstream_failure_leaves_user_turn_plus_notice() {
        let mut session = test_session();
        session.input = "hello".to_string();
        session.submit_input().expect("submission accepted");
        session.start_new_stream();

        session.handle_stream_error("API Error: boom".to_string(), 20, 80);
        session.finalize_response();

        assert_eq!(session.messages.len(), 2);
        assert!(session.messages[0].is_user());
        assert_eq!(session.messages[1].role, Role::App);
        assert!(!session.is_streaming);
    }

    #[test]
    fn partial_content_is_retained_on_failure() {
        let mut session = test_session();
        session.input = "hello".to_string();
        session.submit_input().expect("submission accepted");
        session.start_new_stream();

        session.append_to_response("partial answer", 20, 80);
        session.handle_stream_error("API Error: cut off".to_string(), 20, 80);
        session.finalize_response();

        assert_eq!(session.messages.len(), 3);
        assert_eq!(session.messages[1].content, "partial answer");
        assert_eq!(session.messages[2].role, Role::App);
    }

    #[test]
    fn chunks_append_to_last_assistant_message() {
        let mut session = test_session();
        session.input = "hi".to_string();
        session.submit_input().expect("submission accepted");

        session.append_to_response("Hel", 20, 80);
        session.append_to_response("lo!", 20, 80);

        assert_eq!(session.messages[1].content, "Hello!");
    }

    #[test]
    fn clear_always_empties_conversation() {
        let mut session = test_session();
        assert!(session.messages.is_empty());
        session.clear_conversation();
        assert!(session.messages.is_empty());

        session.input = "hello".to_string();
        session.submit_input().expect("submission accepted");
        session.start_new_stream();
        session.clear_conversation();

        assert!(session.messages.is_empty());
        assert!(!session.is_streaming);
    }

    #[test]
    fn theme_toggle_never_mutates_conversation() {
        let mut session = test_session();
        session.input = "hello".to_string();
        session.submit_input().expect("submission accepted");
        session.append_to_response("world", 20, 80);

        let before: Vec<(Role, String)> = session
            .messages
            .iter()
            .map(|m| (m.role, m.content.clone()))
            .collect();

        session.toggle_theme();
        assert_eq!(session.theme_mode, ThemeMode::Light);
        session.toggle_theme();
        assert_eq!(session.theme_mode, ThemeMode::Dark);

        let after: Vec<(Role, String)> = session
            .messages
            .iter()
            .map(|m| (m.role, m.content.clone()))
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn api_payload_excludes_local_notices() {
        let mut session = test_session();
        session.input = "one".to_string();
        session.submit_input().expect("first submission");
        session.append_to_response("reply", 20, 80);
        session.finalize_response();
        session
            .messages
            .push_back(Message::app("API Error: transient"));

        session.input = "two".to_string();
        let api_messages = session.submit_input().expect("second submission");

        let roles: Vec<&str> = api_messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "assistant", "user"]);
    }

    #[test]
    fn cancel_retires_stream_id_and_drops_empty_placeholder() {
        let mut session = test_session();
        session.input = "hello".to_string();
        session.submit_input().expect("submission accepted");
        let (token, cancelled_id) = session.start_new_stream();

        session.cancel_current_stream();

        assert!(token.is_cancelled());
        assert!(!session.is_streaming);
        // Chunks the cancelled task already queued now fail the id filter
        assert_ne!(session.current_stream_id, cancelled_id);
        // Nothing streamed in, so no blank reply remains
        assert_eq!(session.messages.len(), 1);
        assert!(session.messages[0].is_user());

        // The next submission must not carry an empty assistant turn upstream
        session.input = "again".to_string();
        let api_messages = session.submit_input().expect("second submission");
        let roles: Vec<&str> = api_messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "user"]);
    }

    #[test]
    fn cancel_keeps_partial_content() {
        let mut session = test_session();
        session.input = "hello".to_string();
        session.submit_input().expect("submission accepted");
        session.start_new_stream();
        session.append_to_response("partial reply", 20, 80);

        session.cancel_current_stream();

        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[1].content, "partial reply");
    }

    #[test]
    fn new_stream_supersedes_previous() {
        let mut session = test_session();
        let (first_token, first_id) = session.start_new_stream();
        let (_second_token, second_id) = session.start_new_stream();

        assert!(first_token.is_cancelled());
        assert!(second_id > first_id);
        assert!(session.is_streaming);
    }

    #[test]
    fn input_grows_bounded() {
        let mut session = test_session();
        assert_eq!(session.calculate_input_area_height(20), 1);

        session.input = "short".to_string();
        assert_eq!(session.calculate_input_area_height(20), 1);

        session.input = "one\ntwo".to_string();
        assert_eq!(session.calculate_input_area_height(20), 2);

        session.input = "a\n".repeat(20);
        assert_eq!(session.calculate_input_area_height(20), MAX_INPUT_ROWS);
    }

    #[test]
    fn input_layout_tracks_cursor_across_wraps() {
        let mut session = test_session();
        session.input = "abcdefghij".to_string();
        session.input_cursor_position = 7;

        let (rows, cursor_row, cursor_col) = session.input_layout(4);
        assert_eq!(rows, vec!["abcd", "efgh", "ij"]);
        assert_eq!((cursor_row, cursor_col), (1, 3));
    }

    #[test]
    fn input_layout_wraps_wide_chars_by_display_width() {
        let mut session = test_session();
        session.input = "日本語".to_string();
        session.input_cursor_position = 2;

        let (rows, cursor_row, cursor_col) = session.input_layout(4);
        assert_eq!(rows, vec!["日本", "語"]);
        assert_eq!((cursor_row, cursor_col), (1, 0));

        session.input_cursor_position = 1;
        let (_, cursor_row, cursor_col) = session.input_layout(4);
        assert_eq!((cursor_row, cursor_col), (0, 2));
    }

    #[test]
    fn input_editing_handles_multibyte_chars() {
        let mut session = test_session();
        session.insert_input_char('é');
        session.insert_input_char('à');
        session.move_input_cursor_left();
        session.insert_input_char('x');
        assert_eq!(session.input, "éxà");
        session.backspace_input();
        assert_eq!(session.input, "éà");
    }

    #[test]
    fn empty_transcript_shows_greeting() {
        let session = test_session();
        let lines = session.build_display_lines(80);
        let joined: String = lines.iter().map(|l| l.to_string()).collect();
        assert!(joined.contains("Start a conversation!"));
    }

    #[test]
    fn scrolling_away_disables_auto_scroll_and_bottom_restores_it() {
        let mut session = test_session();
        for i in 0..30 {
            session.messages.push_back(Message::assistant(format!("line {i}")));
        }
        session.update_scroll_position(5, 80);
        assert!(session.auto_scroll);

        session.scroll_up(3);
        assert!(!session.auto_scroll);

        let max = session.calculate_max_scroll_offset(5, 80);
        session.scroll_down(max, 5, 80);
        assert!(session.auto_scroll);
    }
}
