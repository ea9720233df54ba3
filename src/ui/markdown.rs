//! Markdown rendering for the chat transcript.
//!
//! Assistant messages go through a restricted pulldown-cmark renderer
//! (paragraphs, headings, lists, emphasis, inline code, fenced code blocks,
//! tables). User messages are rendered as literal preformatted text and never
//! interpreted as markdown. Before parsing, assistant content may be run
//! through a best-effort coercion that turns flattened pipe text into a real
//! markdown table.

use crate::core::message::{Message, Role};
use crate::ui::theme::Theme;
use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use ratatui::style::Style;
use ratatui::text::{Line, Span};
use unicode_width::UnicodeWidthStr;

const USER_PREFIX: &str = "You: ";
const USER_CONTINUATION: &str = "     ";
const MIN_TABLE_COLUMN_WIDTH: usize = 3;

/// Does the content look like flattened pipe text rather than a real table?
///
/// Mirrors the upstream heuristic: any pipe character without a `---`
/// separator sequence triggers coercion. Deliberately best-effort; prose with
/// a stray `|` will be reinterpreted.
pub fn needs_table_coercion(text: &str) -> bool {
    text.contains('|') && !text.contains("---")
}

/// Convert `||`-delimited rows with ` | `-delimited columns into a standard
/// markdown table (header row, separator row, body rows). Content with fewer
/// than two rows is returned unchanged.
pub fn coerce_pipe_table(text: &str) -> String {
    let rows: Vec<Vec<&str>> = text
        .split("||")
        .map(|row| row.trim().split(" | ").collect())
        .collect();
    if rows.len() <= 1 {
        return text.to_string();
    }

    let headers = &rows[0];
    let mut out = String::new();
    out.push('|');
    out.push_str(&headers.join("|"));
    out.push_str("|\n|");
    out.push_str(&vec!["---"; headers.len()].join("|"));
    out.push_str("|\n");
    for row in &rows[1..] {
        out.push('|');
        out.push_str(&row.join("|"));
        out.push_str("|\n");
    }
    out
}

/// Apply the coercion heuristic when it fires, otherwise pass through.
pub fn coerce_if_needed(text: &str) -> std::borrow::Cow<'_, str> {
    if needs_table_coercion(text) {
        std::borrow::Cow::Owned(coerce_pipe_table(text))
    } else {
        std::borrow::Cow::Borrowed(text)
    }
}

fn detab(s: &str) -> String {
    s.replace('\t', "    ")
}

/// Render one message to display lines, wrapped to `width` when given.
pub fn render_message(
    msg: &Message,
    theme: &Theme,
    width: Option<usize>,
    markdown_enabled: bool,
) -> Vec<Line<'static>> {
    match msg.role {
        Role::User => render_user_message(&msg.content, theme, width),
        Role::App => render_app_message(&msg.content, theme),
        Role::Assistant => {
            if markdown_enabled {
                let content = coerce_if_needed(&msg.content);
                render_assistant_markdown(&content, theme, width)
            } else {
                render_plain_lines(&msg.content, theme.assistant_text_style)
            }
        }
    }
}

/// User turns render as preformatted text: literal characters, preserved
/// newlines, a prefix on the first line, continuation indent after that.
fn render_user_message(content: &str, theme: &Theme, width: Option<usize>) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for (i, raw_line) in content.lines().enumerate() {
        let lead = if i == 0 {
            Span::styled(USER_PREFIX.to_string(), theme.user_prefix_style)
        } else {
            Span::raw(USER_CONTINUATION.to_string())
        };
        let spans = vec![
            lead,
            Span::styled(detab(raw_line), theme.user_text_style),
        ];
        match width {
            Some(w) => lines.extend(wrap_spans_to_width(&spans, w)),
            None => lines.push(Line::from(spans)),
        }
    }
    if lines.is_empty() {
        lines.push(Line::from(Span::styled(
            USER_PREFIX.to_string(),
            theme.user_prefix_style,
        )));
    }
    lines
}

fn render_app_message(content: &str, theme: &Theme) -> Vec<Line<'static>> {
    let style = if content.starts_with("API Error") {
        theme.error_text_style
    } else {
        theme.app_text_style
    };
    render_plain_lines(content, style)
}

fn render_plain_lines(content: &str, style: Style) -> Vec<Line<'static>> {
    content
        .lines()
        .map(|l| {
            if l.trim().is_empty() {
                Line::from("")
            } else {
                Line::from(Span::styled(detab(l), style))
            }
        })
        .collect()
}

#[derive(Clone, Debug)]
enum ListKind {
    Unordered,
    Ordered(u64),
}

struct TableState {
    rows: Vec<Vec<Vec<Span<'static>>>>,
    current_row: Vec<Vec<Span<'static>>>,
    current_cell: Vec<Span<'static>>,
}

impl TableState {
    fn new() -> Self {
        Self {
            rows: Vec::new(),
            current_row: Vec::new(),
            current_cell: Vec::new(),
        }
    }

    fn start_row(&mut self) {
        self.current_row.clear();
    }

    fn end_row(&mut self) {
        let row = std::mem::take(&mut self.current_row);
        self.rows.push(row);
    }

    fn start_cell(&mut self) {
        self.current_cell.clear();
    }

    fn end_cell(&mut self) {
        let cell = std::mem::take(&mut self.current_cell);
        self.current_row.push(cell);
    }

    fn add_span(&mut self, span: Span<'static>) {
        self.current_cell.push(span);
    }

    fn column_count(&self) -> usize {
        self.rows.iter().map(|r| r.len()).max().unwrap_or(0)
    }

    /// Ideal width of each column: the widest cell content it holds.
    fn ideal_column_widths(&self) -> Vec<usize> {
        let mut widths = vec![0usize; self.column_count()];
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                let cell_width: usize = cell
                    .iter()
                    .map(|span| UnicodeWidthStr::width(span.content.as_ref()))
                    .sum();
                widths[i] = widths[i].max(cell_width);
            }
        }
        widths
    }

    /// Shrink columns (widest first) until the bordered table fits the
    /// terminal, bottoming out at a small minimum per column.
    fn balance_column_widths(&self, ideal: &[usize], terminal_width: Option<usize>) -> Vec<usize> {
        let mut widths: Vec<usize> = ideal.to_vec();
        let Some(limit) = terminal_width else {
            return widths;
        };
        if widths.is_empty() {
            return widths;
        }

        // Chrome per table line: one border per column boundary plus two
        // padding spaces per column.
        let chrome = widths.len() * 3 + 1;
        loop {
            let total: usize = widths.iter().sum::<usize>() + chrome;
            if total <= limit {
                break;
            }
            let Some((widest_idx, widest)) = widths
                .iter()
                .copied()
                .enumerate()
                .max_by_key(|&(_, w)| w)
            else {
                break;
            };
            if widest <= MIN_TABLE_COLUMN_WIDTH {
                break;
            }
            widths[widest_idx] = widest - 1;
        }
        widths
    }

    fn render(&self, theme: &Theme, terminal_width: Option<usize>) -> Vec<Line<'static>> {
        if self.rows.is_empty() {
            return Vec::new();
        }

        let widths = self.balance_column_widths(&self.ideal_column_widths(), terminal_width);
        let border_style = theme.md_table_border_style();

        // Wrap every cell to its column width up front so row heights are known.
        let wrapped_rows: Vec<Vec<Vec<Line<'static>>>> = self
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(i, cell)| {
                        let w = widths.get(i).copied().unwrap_or(MIN_TABLE_COLUMN_WIDTH);
                        wrap_spans_to_width(cell, w)
                    })
                    .collect()
            })
            .collect();

        let mut lines = Vec::new();
        lines.push(border_line(&widths, "┌", "┬", "┐", border_style));

        for (row_idx, row) in wrapped_rows.iter().enumerate() {
            let height = row.iter().map(|cell| cell.len()).max().unwrap_or(1);
            for line_idx in 0..height {
                lines.push(content_line(row, &widths, line_idx, border_style));
            }
            if row_idx == 0 && wrapped_rows.len() > 1 {
                lines.push(border_line(&widths, "├", "┼", "┤", border_style));
            }
        }

        lines.push(border_line(&widths, "└", "┴", "┘", border_style));
        lines
    }
}

fn border_line(
    widths: &[usize],
    left: &str,
    mid: &str,
    right: &str,
    style: Style,
) -> Line<'static> {
    let mut text = String::new();
    text.push_str(left);
    for (i, &w) in widths.iter().enumerate() {
        text.push_str(&"─".repeat(w + 2));
        if i < widths.len() - 1 {
            text.push_str(mid);
        }
    }
    text.push_str(right);
    Line::from(Span::styled(text, style))
}

fn content_line(
    row: &[Vec<Line<'static>>],
    widths: &[usize],
    line_idx: usize,
    border_style: Style,
) -> Line<'static> {
    let mut spans = Vec::new();
    spans.push(Span::styled("│", border_style));
    for (i, &w) in widths.iter().enumerate() {
        spans.push(Span::raw(" "));
        let cell_spans: Vec<Span<'static>> = row
            .get(i)
            .and_then(|cell| cell.get(line_idx))
            .map(|line| line.spans.clone())
            .unwrap_or_default();
        let used: usize = cell_spans
            .iter()
            .map(|s| UnicodeWidthStr::width(s.content.as_ref()))
            .sum();
        spans.extend(cell_spans);
        spans.push(Span::raw(" ".repeat(w.saturating_sub(used) + 1)));
        spans.push(Span::styled("│", border_style));
    }
    Line::from(spans)
}

fn flush_spans(
    lines: &mut Vec<Line<'static>>,
    spans: &mut Vec<Span<'static>>,
    width: Option<usize>,
) {
    if spans.is_empty() {
        return;
    }
    let taken = std::mem::take(spans);
    match width {
        Some(w) => lines.extend(wrap_spans_to_width(&taken, w)),
        None => lines.push(Line::from(taken)),
    }
}

fn render_assistant_markdown(
    content: &str,
    theme: &Theme,
    width: Option<usize>,
) -> Vec<Line<'static>> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(content, options);

    let base_style = theme.assistant_text_style;
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut current_spans: Vec<Span<'static>> = Vec::new();
    let mut style_stack: Vec<Style> = vec![base_style];

    let mut list_stack: Vec<ListKind> = Vec::new();
    let mut in_code_block = false;
    let mut code_block_lines: Vec<String> = Vec::new();
    let mut table_state: Option<TableState> = None;

    for event in parser {
        match event {
            Event::Start(tag) => match tag {
                Tag::Heading { level, .. } => {
                    flush_spans(&mut lines, &mut current_spans, width);
                    style_stack.push(theme.md_heading_style(level as u8));
                }
                Tag::List(start) => {
                    list_stack.push(match start {
                        Some(n) => ListKind::Ordered(n),
                        None => ListKind::Unordered,
                    });
                }
                Tag::Item => {
                    flush_spans(&mut lines, &mut current_spans, width);
                    let marker = match list_stack.last_mut() {
                        Some(ListKind::Ordered(n)) => {
                            let cur = *n;
                            *n += 1;
                            format!("{}. ", cur)
                        }
                        _ => "- ".to_string(),
                    };
                    current_spans.push(Span::styled(marker, theme.md_list_marker_style()));
                }
                Tag::CodeBlock(_) => {
                    flush_spans(&mut lines, &mut current_spans, width);
                    in_code_block = true;
                    code_block_lines.clear();
                }
                Tag::Emphasis => {
                    let new = style_stack
                        .last()
                        .copied()
                        .unwrap_or_default()
                        .add_modifier(ratatui::style::Modifier::ITALIC);
                    style_stack.push(new);
                }
                Tag::Strong => {
                    let new = style_stack
                        .last()
                        .copied()
                        .unwrap_or_default()
                        .add_modifier(ratatui::style::Modifier::BOLD);
                    style_stack.push(new);
                }
                Tag::Strikethrough => {
                    let new = style_stack
                        .last()
                        .copied()
                        .unwrap_or_default()
                        .add_modifier(ratatui::style::Modifier::DIM);
                    style_stack.push(new);
                }
                Tag::Table(_) => {
                    flush_spans(&mut lines, &mut current_spans, width);
                    table_state = Some(TableState::new());
                }
                Tag::TableHead | Tag::TableRow => {
                    if let Some(ref mut table) = table_state {
                        table.start_row();
                    }
                }
                Tag::TableCell => {
                    if let Some(ref mut table) = table_state {
                        table.start_cell();
                    }
                }
                _ => {}
            },
            Event::End(tag_end) => match tag_end {
                TagEnd::Paragraph => {
                    flush_spans(&mut lines, &mut current_spans, width);
                    lines.push(Line::from(""));
                }
                TagEnd::Heading(_) => {
                    flush_spans(&mut lines, &mut current_spans, width);
                    lines.push(Line::from(""));
                    style_stack.pop();
                }
                TagEnd::List(_) => {
                    flush_spans(&mut lines, &mut current_spans, width);
                    lines.push(Line::from(""));
                    list_stack.pop();
                }
                TagEnd::Item => {
                    flush_spans(&mut lines, &mut current_spans, width);
                }
                TagEnd::CodeBlock => {
                    let style = theme.md_codeblock_text_style();
                    for l in &code_block_lines {
                        lines.push(Line::from(Span::styled(l.clone(), style)));
                    }
                    lines.push(Line::from(""));
                    in_code_block = false;
                }
                TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => {
                    style_stack.pop();
                }
                TagEnd::Table => {
                    if let Some(table) = table_state.take() {
                        lines.extend(table.render(theme, width));
                        lines.push(Line::from(""));
                    }
                }
                TagEnd::TableHead | TagEnd::TableRow => {
                    if let Some(ref mut table) = table_state {
                        table.end_row();
                    }
                }
                TagEnd::TableCell => {
                    if let Some(ref mut table) = table_state {
                        table.end_cell();
                    }
                }
                _ => {}
            },
            Event::Text(text) => {
                if in_code_block {
                    for l in text.lines() {
                        code_block_lines.push(detab(l));
                    }
                } else {
                    let style = *style_stack.last().unwrap_or(&base_style);
                    let span = Span::styled(detab(&text), style);
                    if let Some(ref mut table) = table_state {
                        table.add_span(span);
                    } else {
                        current_spans.push(span);
                    }
                }
            }
            Event::Code(code) => {
                let span = Span::styled(detab(&code), theme.md_inline_code_style());
                if let Some(ref mut table) = table_state {
                    table.add_span(span);
                } else {
                    current_spans.push(span);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                flush_spans(&mut lines, &mut current_spans, width);
            }
            Event::Rule => {
                flush_spans(&mut lines, &mut current_spans, width);
                lines.push(Line::from(""));
            }
            _ => {}
        }
    }

    flush_spans(&mut lines, &mut current_spans, width);
    while lines.last().is_some_and(|l| l.to_string().is_empty()) {
        lines.pop();
    }
    lines
}

/// Word-wrap styled spans to a target display width, preserving styles and
/// hard-breaking tokens wider than the whole line.
pub fn wrap_spans_to_width(spans: &[Span<'static>], width: usize) -> Vec<Line<'static>> {
    if width == 0 {
        return vec![Line::from(spans.to_vec())];
    }

    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut current: Vec<Span<'static>> = Vec::new();
    let mut current_width = 0usize;

    fn push_segment(current: &mut Vec<Span<'static>>, text: &str, style: Style) {
        if text.is_empty() {
            return;
        }
        if let Some(last) = current.last_mut() {
            if last.style == style {
                let mut combined = String::with_capacity(last.content.len() + text.len());
                combined.push_str(&last.content);
                combined.push_str(text);
                *last = Span::styled(combined, style);
                return;
            }
        }
        current.push(Span::styled(text.to_string(), style));
    }

    fn emit(lines: &mut Vec<Line<'static>>, current: &mut Vec<Span<'static>>) {
        // Trim trailing whitespace so padding math stays accurate downstream.
        if let Some(last) = current.last_mut() {
            let trimmed = last.content.trim_end().to_string();
            *last = Span::styled(trimmed, last.style);
        }
        current.retain(|s| !s.content.is_empty());
        lines.push(Line::from(std::mem::take(current)));
    }

    for span in spans {
        let style = span.style;
        for token in span.content.split_inclusive(' ') {
            let visible = token.trim_end_matches(' ');
            let visible_width = UnicodeWidthStr::width(visible);

            if current_width > 0 && current_width + visible_width > width {
                emit(&mut lines, &mut current);
                current_width = 0;
            }

            if visible_width > width {
                // Token wider than the line: break it by display width.
                let mut chunk = String::new();
                let mut chunk_width = 0usize;
                for ch in visible.chars() {
                    let ch_width = UnicodeWidthStr::width(ch.to_string().as_str());
                    if chunk_width + ch_width > width && !chunk.is_empty() {
                        push_segment(&mut current, &chunk, style);
                        emit(&mut lines, &mut current);
                        chunk.clear();
                        chunk_width = 0;
                    }
                    chunk.push(ch);
                    chunk_width += ch_width;
                }
                push_segment(&mut current, &chunk, style);
                current_width = chunk_width;
                if token.ends_with(' ') {
                    push_segment(&mut current, " ", style);
                    current_width += 1;
                }
                continue;
            }

            push_segment(&mut current, token, style);
            current_width += UnicodeWidthStr::width(token);
        }
    }

    if !current.is_empty() {
        emit(&mut lines, &mut current);
    }
    if lines.is_empty() {
        lines.push(Line::from(""));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::theme::{Theme, ThemeMode};

    fn line_text(line: &Line<'_>) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn coercion_matches_upstream_shape() {
        let coerced = coerce_pipe_table("A | B||1 | 2||3 | 4");
        assert_eq!(coerced, "|A|B|\n|---|---|\n|1|2|\n|3|4|\n");
    }

    #[test]
    fn coercion_single_row_passes_through() {
        assert_eq!(coerce_pipe_table("just | one row"), "just | one row");
    }

    #[test]
    fn well_formed_tables_are_not_coerced() {
        let table = "| A | B |\n|---|---|\n| 1 | 2 |\n";
        assert!(!needs_table_coercion(table));
        assert_eq!(coerce_if_needed(table), table);
    }

    #[test]
    fn prose_without_pipes_is_not_coerced() {
        assert!(!needs_table_coercion("plain prose, no tables here"));
    }

    #[test]
    fn coerced_flat_text_renders_a_bordered_table() {
        let theme = Theme::for_mode(ThemeMode::Dark);
        let msg = Message::assistant("A | B||1 | 2||3 | 4");
        let lines = render_message(&msg, &theme, Some(40), true);
        let texts: Vec<String> = lines.iter().map(line_text).collect();

        assert!(texts[0].starts_with('┌'), "expected top border: {:?}", texts);
        let header = texts.iter().find(|t| t.contains('A')).expect("header row");
        assert!(header.contains('B'));
        assert!(
            texts.iter().any(|t| t.starts_with('├')),
            "expected header separator: {:?}",
            texts
        );
        let body: Vec<&String> = texts
            .iter()
            .filter(|t| t.contains('1') || t.contains('3'))
            .collect();
        assert_eq!(body.len(), 2);
        assert!(body[0].contains('2'));
        assert!(body[1].contains('4'));
    }

    #[test]
    fn user_content_is_rendered_literally() {
        let theme = Theme::for_mode(ThemeMode::Dark);
        let msg = Message::user("*stars* # heading | pipe");
        let lines = render_message(&msg, &theme, None, true);
        assert_eq!(lines.len(), 1);
        assert_eq!(line_text(&lines[0]), "You: *stars* # heading | pipe");
    }

    #[test]
    fn user_newlines_are_preserved_with_indent() {
        let theme = Theme::for_mode(ThemeMode::Dark);
        let msg = Message::user("first\nsecond");
        let lines = render_message(&msg, &theme, None, true);
        assert_eq!(line_text(&lines[0]), "You: first");
        assert_eq!(line_text(&lines[1]), "     second");
    }

    #[test]
    fn assistant_inline_code_is_styled() {
        let theme = Theme::for_mode(ThemeMode::Dark);
        let msg = Message::assistant("use `cargo` here --- no coercion");
        let lines = render_message(&msg, &theme, None, true);
        let has_code_span = lines.iter().any(|l| {
            l.spans
                .iter()
                .any(|s| s.content == "cargo" && s.style == theme.md_inline_code_style())
        });
        assert!(has_code_span);
    }

    #[test]
    fn assistant_code_block_keeps_literal_lines() {
        let theme = Theme::for_mode(ThemeMode::Dark);
        let msg = Message::assistant("```\nlet x = 1;\nlet y = 2;\n```\n--- done");
        let lines = render_message(&msg, &theme, None, true);
        let texts: Vec<String> = lines.iter().map(line_text).collect();
        assert!(texts.contains(&"let x = 1;".to_string()));
        assert!(texts.contains(&"let y = 2;".to_string()));
    }

    #[test]
    fn markdown_disabled_renders_assistant_literally() {
        let theme = Theme::for_mode(ThemeMode::Dark);
        let msg = Message::assistant("**bold** text");
        let lines = render_message(&msg, &theme, None, false);
        assert_eq!(line_text(&lines[0]), "**bold** text");
    }

    #[test]
    fn wrap_breaks_at_word_boundaries() {
        let spans = vec![Span::raw("alpha beta gamma delta")];
        let lines = wrap_spans_to_width(&spans, 11);
        let texts: Vec<String> = lines.iter().map(|l| line_text(l)).collect();
        assert_eq!(texts, vec!["alpha beta", "gamma delta"]);
    }

    #[test]
    fn wrap_hard_breaks_oversized_tokens() {
        let spans = vec![Span::raw("abcdefghij")];
        let lines = wrap_spans_to_width(&spans, 4);
        let texts: Vec<String> = lines.iter().map(|l| line_text(l)).collect();
        assert_eq!(texts, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn table_columns_shrink_to_fit_terminal() {
        let theme = Theme::for_mode(ThemeMode::Dark);
        let msg = Message::assistant(
            "first column content | second column content||aaaaaaaaaa | bbbbbbbbbb",
        );
        let lines = render_message(&msg, &theme, Some(30), true);
        for line in &lines {
            let text = line_text(line);
            if !text.is_empty() {
                assert!(
                    UnicodeWidthStr::width(text.as_str()) <= 30,
                    "line exceeds width: {text:?}"
                );
            }
        }
    }
}
