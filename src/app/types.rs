use std::collections::BTreeSet;

use ratatui::style::{Color, Modifier, Style};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Role {
    User,
    Assistant,
}

impl Role {
    pub(crate) fn parse(raw: &str) -> Option<Self> {
        match raw {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct Message {
    pub(crate) role: Role,
    pub(crate) content: String,
    #[serde(default)]
    pub(crate) reasoning: Option<String>,
    #[serde(default, skip_serializing)]
    pub(crate) pending: bool,
}

impl Message {
    pub(crate) fn user(content: impl Into<String>) -> Self {
        Message {
            role: Role::User,
            content: content.into(),
            reasoning: None,
            pending: false,
        }
    }

    pub(crate) fn assistant(content: impl Into<String>, reasoning: Option<String>) -> Self {
        Message {
            role: Role::Assistant,
            content: content.into(),
            reasoning: reasoning.filter(|r| !r.trim().is_empty()),
            pending: false,
        }
    }

    pub(crate) fn placeholder() -> Self {
        Message {
            role: Role::Assistant,
            content: String::new(),
            reasoning: None,
            pending: true,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Conversation {
    pub(crate) id: String,
    pub(crate) name: Option<String>,
    pub(crate) messages: Vec<Message>,
    pub(crate) attached_documents: BTreeSet<String>,
}

impl Conversation {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Conversation {
            id: id.into(),
            name: None,
            messages: Vec::new(),
            attached_documents: BTreeSet::new(),
        }
    }

    /// Label shown in the chat bar and status line. Unnamed chats fall back
    /// to a suffix of the opaque id.
    pub(crate) fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => {
                let chars: Vec<char> = self.id.chars().collect();
                let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
                format!("chat {tail}")
            }
        }
    }
}

/// Code block collected while rendering a transcript. `/copy <n>` and
/// Ctrl+Y resolve against the cached list in display order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Snippet {
    pub(crate) language: String,
    pub(crate) code: String,
}

/// Events sent from gateway worker threads back to the UI thread.
///
/// `Reply` and `Failed` carry the request sequence number handed out when
/// the exchange started; `poll_worker` drops any seq that is no longer in
/// the open-request table.
#[derive(Debug)]
pub(crate) enum WorkerEvent {
    LoggedIn {
        token: String,
    },
    Loaded {
        conversations: Vec<Conversation>,
    },
    Created {
        id: String,
        name: Option<String>,
    },
    Renamed {
        id: String,
        name: String,
    },
    Deleted {
        id: String,
    },
    Reply {
        seq: u64,
        conversation_id: String,
        content: String,
        reasoning: Option<String>,
    },
    Failed {
        seq: u64,
        conversation_id: String,
        message: String,
    },
    Uploaded {
        conversation_id: String,
        attached: Vec<String>,
    },
    Detached {
        conversation_id: String,
        filename: String,
    },
    Notice(String),
    SessionExpired,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) enum ThemePreset {
    Fjord,
    Graphite,
    Ember,
}

impl ThemePreset {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            ThemePreset::Fjord => "fjord",
            ThemePreset::Graphite => "graphite",
            ThemePreset::Ember => "ember",
        }
    }

    pub(crate) fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "fjord" | "blue" => Some(ThemePreset::Fjord),
            "graphite" | "slate" | "gray" => Some(ThemePreset::Graphite),
            "ember" | "warm" | "dark" => Some(ThemePreset::Ember),
            _ => None,
        }
    }

    pub(crate) fn all() -> [ThemePreset; 3] {
        [ThemePreset::Graphite, ThemePreset::Fjord, ThemePreset::Ember]
    }

    pub(crate) fn palette(self) -> ThemePalette {
        match self {
            ThemePreset::Fjord => ThemePalette {
                prompt: Color::Rgb(100, 150, 200),
                input_text: Color::Rgb(180, 200, 220),
                muted_text: Color::Rgb(80, 100, 120),
                highlight_fg: Color::Rgb(200, 220, 240),
                highlight_bg: Color::Rgb(40, 60, 80),
                status_text: Color::Rgb(90, 110, 130),
                user_fg: Color::Rgb(200, 220, 240),
                user_bg: Color::Rgb(25, 35, 45),
                assistant_text: Color::Rgb(170, 190, 210),
                reasoning_text: Color::Rgb(120, 140, 160),
                reasoning_toggle: Color::Rgb(140, 170, 200),
                pending_text: Color::Rgb(130, 160, 190),
                notice_text: Color::Rgb(120, 140, 160),
                error_text: Color::Rgb(230, 120, 120),
                heading: Color::Rgb(150, 190, 230),
                code_fg: Color::Rgb(180, 200, 220),
                code_bg: Color::Rgb(5, 15, 25),
                inline_code_fg: Color::Rgb(160, 180, 200),
                inline_code_bg: Color::Rgb(20, 30, 40),
                bullet: Color::Rgb(110, 130, 150),
                snippet_frame: Color::Rgb(60, 85, 110),
            },
            ThemePreset::Graphite => ThemePalette {
                prompt: Color::Rgb(192, 192, 192),
                input_text: Color::Rgb(224, 224, 224),
                muted_text: Color::Rgb(128, 128, 128),
                highlight_fg: Color::Rgb(255, 255, 255),
                highlight_bg: Color::Rgb(64, 64, 64),
                status_text: Color::Rgb(140, 140, 140),
                user_fg: Color::Rgb(255, 255, 255),
                user_bg: Color::Rgb(25, 25, 25),
                assistant_text: Color::Rgb(210, 210, 210),
                reasoning_text: Color::Rgb(150, 150, 150),
                reasoning_toggle: Color::Rgb(180, 180, 180),
                pending_text: Color::Rgb(170, 170, 170),
                notice_text: Color::Rgb(160, 160, 160),
                error_text: Color::Rgb(230, 120, 120),
                heading: Color::Rgb(230, 230, 230),
                code_fg: Color::Rgb(220, 220, 220),
                code_bg: Color::Rgb(5, 5, 5),
                inline_code_fg: Color::Rgb(190, 190, 190),
                inline_code_bg: Color::Rgb(20, 20, 20),
                bullet: Color::Rgb(150, 150, 150),
                snippet_frame: Color::Rgb(90, 90, 90),
            },
            ThemePreset::Ember => ThemePalette {
                prompt: Color::Rgb(220, 170, 130),
                input_text: Color::Rgb(238, 226, 214),
                muted_text: Color::Rgb(150, 130, 115),
                highlight_fg: Color::Rgb(255, 245, 235),
                highlight_bg: Color::Rgb(80, 60, 45),
                status_text: Color::Rgb(170, 150, 130),
                user_fg: Color::Rgb(255, 245, 235),
                user_bg: Color::Rgb(38, 28, 22),
                assistant_text: Color::Rgb(225, 210, 195),
                reasoning_text: Color::Rgb(170, 150, 130),
                reasoning_toggle: Color::Rgb(210, 170, 130),
                pending_text: Color::Rgb(200, 170, 140),
                notice_text: Color::Rgb(185, 165, 145),
                error_text: Color::Rgb(235, 125, 110),
                heading: Color::Rgb(240, 200, 160),
                code_fg: Color::Rgb(235, 225, 215),
                code_bg: Color::Rgb(15, 10, 8),
                inline_code_fg: Color::Rgb(215, 195, 175),
                inline_code_bg: Color::Rgb(40, 30, 24),
                bullet: Color::Rgb(190, 160, 130),
                snippet_frame: Color::Rgb(120, 90, 65),
            },
        }
    }
}

pub(crate) fn default_theme() -> ThemePreset {
    ThemePreset::Graphite
}

#[derive(Clone, Copy)]
pub(crate) struct ThemePalette {
    pub(crate) prompt: Color,
    pub(crate) input_text: Color,
    pub(crate) muted_text: Color,
    pub(crate) highlight_fg: Color,
    pub(crate) highlight_bg: Color,
    pub(crate) status_text: Color,
    pub(crate) user_fg: Color,
    pub(crate) user_bg: Color,
    pub(crate) assistant_text: Color,
    pub(crate) reasoning_text: Color,
    pub(crate) reasoning_toggle: Color,
    pub(crate) pending_text: Color,
    pub(crate) notice_text: Color,
    pub(crate) error_text: Color,
    pub(crate) heading: Color,
    pub(crate) code_fg: Color,
    pub(crate) code_bg: Color,
    pub(crate) inline_code_fg: Color,
    pub(crate) inline_code_bg: Color,
    pub(crate) bullet: Color,
    pub(crate) snippet_frame: Color,
}

impl ThemePalette {
    pub(crate) fn prompt_style(self) -> Style {
        Style::default()
            .fg(self.prompt)
            .add_modifier(Modifier::BOLD)
    }

    pub(crate) fn body_style(self) -> Style {
        Style::default().fg(self.assistant_text)
    }

    pub(crate) fn muted_style(self) -> Style {
        Style::default().fg(self.muted_text)
    }

    pub(crate) fn status_style(self) -> Style {
        Style::default().fg(self.status_text)
    }

    pub(crate) fn notice_style(self) -> Style {
        Style::default().fg(self.notice_text)
    }

    pub(crate) fn error_style(self) -> Style {
        Style::default().fg(self.error_text)
    }

    pub(crate) fn user_style(self) -> Style {
        Style::default()
            .fg(self.user_fg)
            .bg(self.user_bg)
            .add_modifier(Modifier::BOLD)
    }

    pub(crate) fn reasoning_style(self) -> Style {
        Style::default()
            .fg(self.reasoning_text)
            .add_modifier(Modifier::ITALIC)
    }

    pub(crate) fn reasoning_toggle_style(self) -> Style {
        Style::default().fg(self.reasoning_toggle)
    }

    pub(crate) fn pending_style(self) -> Style {
        Style::default()
            .fg(self.pending_text)
            .add_modifier(Modifier::DIM)
    }

    pub(crate) fn heading_style(self) -> Style {
        Style::default()
            .fg(self.heading)
            .add_modifier(Modifier::BOLD)
    }

    pub(crate) fn code_style(self) -> Style {
        Style::default().fg(self.code_fg).bg(self.code_bg)
    }

    pub(crate) fn inline_code_style(self) -> Style {
        Style::default()
            .fg(self.inline_code_fg)
            .bg(self.inline_code_bg)
    }

    pub(crate) fn snippet_frame_style(self) -> Style {
        Style::default().fg(self.snippet_frame)
    }

    pub(crate) fn panel_border_style(self) -> Style {
        Style::default().fg(self.highlight_bg)
    }

    pub(crate) fn input_surface_style(self) -> Style {
        Style::default().fg(self.input_text)
    }

    pub(crate) fn active_chat_style(self) -> Style {
        Style::default()
            .fg(self.highlight_fg)
            .bg(self.highlight_bg)
            .add_modifier(Modifier::BOLD)
    }
}
