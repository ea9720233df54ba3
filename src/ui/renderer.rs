use crate::core::session::ChatSession;
use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};
use unicode_width::UnicodeWidthStr;

/// Columns the streaming indicator reserves at the right edge of the input box.
const INDICATOR_SPACE: u16 = 2;

pub fn ui(f: &mut Frame, session: &ChatSession) {
    let theme = &session.theme;
    let area = f.area();

    f.render_widget(
        Block::default().style(Style::default().bg(theme.background_color)),
        area,
    );

    let input_area_height = session.calculate_input_area_height(input_width(area.width));
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(input_area_height + 2), // +2 for borders
        ])
        .split(area);

    // Transcript. Lines come back pre-wrapped to the pane width, so the
    // scroll offset maps one-to-one onto display rows.
    let transcript_width = chunks[0].width;
    let lines = session.build_display_lines(transcript_width);
    let available_height = chunks[0].height.saturating_sub(1); // title row
    let max_offset = (lines.len() as u16).saturating_sub(available_height);
    let scroll_offset = session.scroll_offset.min(max_offset);

    let title = format!(
        "causerie v{} - {} ({}) • log: {}",
        env!("CARGO_PKG_VERSION"),
        session.model,
        session.theme_mode.name(),
        session.logging_status()
    );

    let transcript = Paragraph::new(lines)
        .block(Block::default().title(Span::styled(title, theme.title_style)))
        .scroll((scroll_offset, 0));
    f.render_widget(transcript, chunks[0]);

    // Input area
    let input_title = if session.is_streaming {
        "Type your message (Esc to interrupt, Ctrl+C to quit)"
    } else {
        "Type your message (Enter to send, Alt+Enter for newline, Ctrl+T theme, Ctrl+N clear)"
    };

    let avail_width = input_width(area.width);
    let (rows, cursor_row, cursor_col) = session.input_layout(avail_width);

    let mut input_lines: Vec<Line> = rows
        .iter()
        .map(|r| Line::from(Span::styled(r.clone(), theme.input_text_style)))
        .collect();

    // Pulsing indicator in the top-right of the input box while streaming
    if session.is_streaming {
        let elapsed = session.pulse_start.elapsed().as_millis() as f32 / 1000.0;
        let pulse_phase = (elapsed * 2.0) % 2.0;
        let pulse_intensity = if pulse_phase < 1.0 {
            pulse_phase
        } else {
            2.0 - pulse_phase
        };
        let symbol = if pulse_intensity < 0.33 {
            "○"
        } else if pulse_intensity < 0.66 {
            "◐"
        } else {
            "●"
        };
        if let Some(first) = input_lines.first_mut() {
            let used: usize = rows
                .first()
                .map(|r| UnicodeWidthStr::width(r.as_str()))
                .unwrap_or(0);
            let pad = (avail_width as usize).saturating_sub(used) + 1;
            first.spans.push(Span::raw(" ".repeat(pad)));
            first
                .spans
                .push(Span::styled(symbol, theme.streaming_indicator_style));
        }
    }

    let input = Paragraph::new(input_lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(theme.input_border_style)
                .title(Span::styled(input_title, theme.input_title_style)),
        )
        .scroll((session.input_scroll_offset, 0));
    f.render_widget(input, chunks[1]);

    // Cursor, when visible inside the scrolled input area
    if !session.is_streaming {
        let visible_row = cursor_row.saturating_sub(session.input_scroll_offset);
        if cursor_row >= session.input_scroll_offset && visible_row < input_area_height {
            f.set_cursor_position((
                chunks[1].x + 1 + cursor_col,
                chunks[1].y + 1 + visible_row,
            ));
        }
    }
}

/// Width available for input text inside borders and the indicator margin.
fn input_width(terminal_width: u16) -> u16 {
    terminal_width.saturating_sub(2 + INDICATOR_SPACE)
}
