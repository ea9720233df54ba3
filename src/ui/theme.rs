use ratatui::style::{Color, Modifier, Style};

/// Presentation-only light/dark switch. Toggling it never touches the
/// conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeMode {
    Dark,
    Light,
}

impl ThemeMode {
    pub fn toggled(self) -> Self {
        match self {
            ThemeMode::Dark => ThemeMode::Light,
            ThemeMode::Light => ThemeMode::Dark,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ThemeMode::Dark => "dark",
            ThemeMode::Light => "light",
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "light" => ThemeMode::Light,
            _ => ThemeMode::Dark,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Theme {
    pub background_color: Color,
    // Chat message styles
    pub user_prefix_style: Style,
    pub user_text_style: Style,
    pub assistant_text_style: Style,
    pub app_text_style: Style,
    pub error_text_style: Style,

    // Chrome
    pub title_style: Style,
    pub streaming_indicator_style: Style,
    pub input_border_style: Style,
    pub input_title_style: Style,
    pub input_text_style: Style,
}

impl Theme {
    pub fn dark_default() -> Self {
        Theme {
            background_color: Color::Rgb(16, 18, 24),
            user_prefix_style: Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
            user_text_style: Style::default().fg(Color::Cyan),
            assistant_text_style: Style::default().fg(Color::Rgb(224, 224, 224)),
            app_text_style: Style::default().fg(Color::DarkGray),
            error_text_style: Style::default().fg(Color::LightRed),

            title_style: Style::default().fg(Color::Gray),
            streaming_indicator_style: Style::default().fg(Color::White),
            input_border_style: Style::default().fg(Color::Gray),
            input_title_style: Style::default().fg(Color::Gray),
            input_text_style: Style::default().fg(Color::White),
        }
    }

    pub fn light() -> Self {
        Theme {
            background_color: Color::Rgb(250, 250, 248),
            user_prefix_style: Style::default()
                .fg(Color::Blue)
                .add_modifier(Modifier::BOLD),
            user_text_style: Style::default().fg(Color::Blue),
            assistant_text_style: Style::default().fg(Color::Rgb(32, 32, 32)),
            app_text_style: Style::default().fg(Color::Gray),
            error_text_style: Style::default().fg(Color::Red),

            title_style: Style::default().fg(Color::DarkGray),
            streaming_indicator_style: Style::default().fg(Color::Black),
            input_border_style: Style::default().fg(Color::Black),
            input_title_style: Style::default().fg(Color::DarkGray),
            input_text_style: Style::default().fg(Color::Black),
        }
    }

    pub fn for_mode(mode: ThemeMode) -> Self {
        match mode {
            ThemeMode::Dark => Self::dark_default(),
            ThemeMode::Light => Self::light(),
        }
    }

    // Markdown element styles derived from the base palette.

    pub fn md_heading_style(&self, level: u8) -> Style {
        let base = self.assistant_text_style.add_modifier(Modifier::BOLD);
        if level <= 2 {
            base.add_modifier(Modifier::UNDERLINED)
        } else {
            base
        }
    }

    pub fn md_inline_code_style(&self) -> Style {
        self.assistant_text_style.fg(Color::Yellow)
    }

    pub fn md_codeblock_text_style(&self) -> Style {
        self.assistant_text_style.fg(Color::Green)
    }

    pub fn md_list_marker_style(&self) -> Style {
        self.assistant_text_style.add_modifier(Modifier::BOLD)
    }

    pub fn md_table_border_style(&self) -> Style {
        self.app_text_style
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_flips_between_modes() {
        assert_eq!(ThemeMode::Dark.toggled(), ThemeMode::Light);
        assert_eq!(ThemeMode::Light.toggled(), ThemeMode::Dark);
        assert_eq!(ThemeMode::Dark.toggled().toggled(), ThemeMode::Dark);
    }

    #[test]
    fn unknown_names_fall_back_to_dark() {
        assert_eq!(ThemeMode::from_name("light"), ThemeMode::Light);
        assert_eq!(ThemeMode::from_name("LIGHT"), ThemeMode::Light);
        assert_eq!(ThemeMode::from_name("dracula"), ThemeMode::Dark);
    }

    #[test]
    fn modes_produce_distinct_backgrounds() {
        let dark = Theme::for_mode(ThemeMode::Dark);
        let light = Theme::for_mode(ThemeMode::Light);
        assert_ne!(dark.background_color, light.background_color);
    }
}
