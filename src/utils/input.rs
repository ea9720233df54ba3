//! Keyboard and paste input hygiene for the terminal UI.

/// Sanitize text before it enters the input buffer.
///
/// Tabs become four spaces, carriage returns become newlines, and all other
/// control characters are dropped so pasted content cannot corrupt the TUI.
pub fn sanitize_text_input(text: &str) -> String {
    let mut sanitized = String::with_capacity(text.len());

    for c in text.chars() {
        match c {
            '\t' => sanitized.push_str("    "),
            '\r' => sanitized.push('\n'),
            '\n' => sanitized.push(c),
            _ if !c.is_control() => sanitized.push(c),
            _ => {}
        }
    }

    sanitized
}
