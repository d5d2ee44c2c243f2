//! Colour palette and style helpers for the dashboard
//!
//! Widgets never hard-code colours; they ask [`styles`] for a role
//! (selection, key hint, lifecycle state) and the active [`Palette`]
//! decides what that looks like.

use ratatui::style::{Color, Modifier, Style};

use infradeck_core::app::Severity;
use infradeck_core::model::LifecycleState;

/// Environment variable selecting the palette (`dark` or `high-contrast`)
pub const THEME_ENV: &str = "INFRADECK_THEME";

/// Colours by role. Lifecycle states get their own slots so the launcher
/// table can be re-tinted without touching status colours.
#[derive(Clone, Debug)]
pub struct Palette {
    pub frame: Color,
    pub frame_focused: Color,
    pub fg: Color,
    pub fg_dim: Color,
    pub fg_faint: Color,
    pub ok: Color,
    pub attention: Color,
    pub failure: Color,
    pub deployed: Color,
    pub initialized: Color,
    pub ready: Color,
    pub cursor_bg: Color,
    pub cursor_fg: Color,
    pub hint: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self::dark()
    }
}

impl Palette {
    pub fn dark() -> Self {
        let green = Color::Rgb(120, 200, 140);
        let amber = Color::Rgb(229, 192, 123);
        Self {
            frame: Color::Rgb(70, 74, 82),
            frame_focused: Color::Rgb(97, 175, 239),
            fg: Color::Rgb(216, 218, 222),
            fg_dim: Color::Rgb(150, 154, 160),
            fg_faint: Color::Rgb(104, 108, 114),
            ok: green,
            attention: amber,
            failure: Color::Rgb(224, 108, 117),
            deployed: green,
            initialized: Color::Rgb(86, 182, 194),
            ready: amber,
            cursor_bg: Color::Rgb(44, 62, 94),
            cursor_fg: Color::White,
            hint: Color::Rgb(209, 154, 102),
        }
    }

    /// Named ANSI colours only, for terminals without truecolor
    pub fn high_contrast() -> Self {
        Self {
            frame: Color::Gray,
            frame_focused: Color::Cyan,
            fg: Color::White,
            fg_dim: Color::Gray,
            fg_faint: Color::DarkGray,
            ok: Color::Green,
            attention: Color::Yellow,
            failure: Color::Red,
            deployed: Color::LightGreen,
            initialized: Color::LightCyan,
            ready: Color::LightYellow,
            cursor_bg: Color::Blue,
            cursor_fg: Color::White,
            hint: Color::Yellow,
        }
    }

    /// Palette named by `INFRADECK_THEME`; unknown names fall back to dark
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "high-contrast" | "high_contrast" | "contrast" => Self::high_contrast(),
            _ => Self::dark(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Theme {
    pub palette: Palette,
}

impl Theme {
    pub fn from_env() -> Self {
        std::env::var(THEME_ENV)
            .map(|name| Theme {
                palette: Palette::from_name(&name),
            })
            .unwrap_or_default()
    }

    pub fn state_style(&self, state: LifecycleState) -> Style {
        let p = &self.palette;
        fg(match state {
            LifecycleState::Deployed => p.deployed,
            LifecycleState::Initialized => p.initialized,
            LifecycleState::Ready => p.ready,
            LifecycleState::Unknown => p.fg_faint,
        })
    }

    pub fn severity_style(&self, severity: Severity) -> Style {
        let p = &self.palette;
        fg(match severity {
            Severity::Info => p.fg_dim,
            Severity::Success => p.ok,
            Severity::Error => p.failure,
        })
    }

    pub fn cursor_row_style(&self) -> Style {
        fg(self.palette.cursor_fg)
            .bg(self.palette.cursor_bg)
            .add_modifier(Modifier::BOLD)
    }

    pub fn frame_style(&self, focused: bool) -> Style {
        fg(if focused {
            self.palette.frame_focused
        } else {
            self.palette.frame
        })
    }
}

fn fg(color: Color) -> Style {
    Style::default().fg(color)
}

static ACTIVE: std::sync::OnceLock<Theme> = std::sync::OnceLock::new();

/// Process-wide theme, read from the environment on first use
pub fn theme() -> &'static Theme {
    ACTIVE.get_or_init(Theme::from_env)
}

/// Shorthands over the process-wide theme
pub mod styles {
    use super::*;

    pub fn state(state: LifecycleState) -> Style {
        theme().state_style(state)
    }

    pub fn severity(severity: Severity) -> Style {
        theme().severity_style(severity)
    }

    pub fn selection() -> Style {
        theme().cursor_row_style()
    }

    pub fn border(focused: bool) -> Style {
        theme().frame_style(focused)
    }

    pub fn title() -> Style {
        text().add_modifier(Modifier::BOLD)
    }

    pub fn header() -> Style {
        accent().add_modifier(Modifier::BOLD)
    }

    pub fn key_hint() -> Style {
        fg(theme().palette.hint)
    }

    pub fn text() -> Style {
        fg(theme().palette.fg)
    }

    pub fn text_dim() -> Style {
        fg(theme().palette.fg_dim)
    }

    pub fn text_muted() -> Style {
        fg(theme().palette.fg_faint)
    }

    pub fn accent() -> Style {
        fg(theme().palette.frame_focused)
    }

    pub fn success() -> Style {
        fg(theme().palette.ok)
    }

    pub fn warn() -> Style {
        fg(theme().palette.attention)
    }

    pub fn error() -> Style {
        fg(theme().palette.failure)
    }
}
