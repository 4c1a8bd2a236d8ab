use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use ratatui::text::{Line, Text};
use ratatui::widgets::{Paragraph, Wrap};
use serde::{Deserialize, Serialize};
use unicode_width::UnicodeWidthStr;

use crate::config::{Config, CredentialStore};
use crate::gateway::Gateway;
use crate::{input_cursor_position, truncate};

const MAX_NOTICE_LINES: usize = 4;
const MAX_HISTORY_ENTRIES: usize = 100;
const CHAT_NAME_DISPLAY_COLS: usize = 20;
const COPY_FEEDBACK_WINDOW: Duration = Duration::from_secs(2);
const PENDING_FRAMES: [&str; 3] = ["·", "··", "···"];

mod commands;
mod input;
mod render;
mod runtime;
mod session;
#[cfg(test)]
mod tests;
mod text;
mod types;
mod ui;
mod worker;

pub(crate) use runtime::run_app;
#[cfg(test)]
use runtime::flatten_lines_to_plain;
use session::SessionStore;
use text::sanitize_runtime_text;
pub(crate) use types::{
    default_theme, Conversation, Message, Role, Snippet, ThemePalette, ThemePreset, WorkerEvent,
};

#[derive(Clone, Debug)]
enum ConfirmAction {
    DeleteConversation { id: String },
    DetachDocument { conversation_id: String, filename: String },
}

#[derive(Clone, Debug)]
struct PendingConfirm {
    action: ConfirmAction,
    prompt: String,
}

#[derive(Clone, Copy, Debug)]
enum Mode {
    Normal,
    Confirm,
}

/// Client-side bits worth keeping across runs. Conversation state itself
/// lives on the backend and is re-hydrated after login.
#[derive(Debug, Serialize, Deserialize)]
struct UiSnapshot {
    #[serde(default = "default_theme")]
    theme: ThemePreset,
    #[serde(default)]
    history: Vec<String>,
}

/// Cached rendering state to avoid recomputing transcript lines and scroll
/// bounds every frame.
struct RenderCache {
    /// Generation counter at the time of last cache build.
    generation: u64,
    /// Viewport width used for the cached lines.
    width: u16,
    /// Viewport height used for the cached scroll_max.
    height: u16,
    /// The cached rendered lines.
    lines: Vec<Line<'static>>,
    /// Code snippets collected from the cached lines, in display order.
    snippets: Vec<Snippet>,
    /// The cached maximum scroll offset.
    scroll_max: u16,
}

impl RenderCache {
    fn new() -> Self {
        Self {
            generation: u64::MAX, // force first rebuild
            width: 0,
            height: 0,
            lines: Vec::new(),
            snippets: Vec::new(),
            scroll_max: 0,
        }
    }
}

struct App {
    config: Config,
    gateway: Arc<dyn Gateway>,
    credentials: Arc<dyn CredentialStore>,

    sessions: SessionStore,
    logged_in: bool,
    reasoning_mode: bool,
    /// (conversation id, message index) pairs whose reasoning section is
    /// expanded. Collapsed is the default.
    expanded_reasoning: HashSet<(String, usize)>,

    should_quit: bool,
    spinner_idx: usize,
    mode: Mode,
    confirm: Option<PendingConfirm>,
    theme: ThemePreset,

    input: String,
    cursor: usize,
    history: Vec<String>,
    history_pos: Option<usize>,

    scroll: u16,
    autoscroll: bool,
    viewport_width: u16,
    viewport_height: u16,

    tx: Sender<WorkerEvent>,
    rx: Receiver<WorkerEvent>,
    /// Open chat sends: request seq -> conversation id. Replies whose seq
    /// is absent from this table are discarded.
    open_requests: HashMap<u64, String>,
    next_seq: u64,
    /// Conversations with a send in flight; one chat send per conversation.
    busy_conversations: HashSet<String>,

    notices: VecDeque<String>,
    last_status: String,

    clipboard: Option<arboard::Clipboard>,
    copied_snippet: Option<usize>,
    copied_at: Option<Instant>,

    /// Monotonically increasing counter bumped whenever the transcript changes.
    render_generation: u64,
    render_cache: RenderCache,
}

impl App {
    fn new(
        config: Config,
        gateway: Arc<dyn Gateway>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        let (tx, rx) = unbounded::<WorkerEvent>();
        let clipboard = if cfg!(test) {
            None
        } else {
            arboard::Clipboard::new().ok()
        };
        let mut app = Self {
            config,
            gateway,
            credentials,
            sessions: SessionStore::new(),
            logged_in: false,
            reasoning_mode: false,
            expanded_reasoning: HashSet::new(),
            should_quit: false,
            spinner_idx: 0,
            mode: Mode::Normal,
            confirm: None,
            theme: default_theme(),
            input: String::new(),
            cursor: 0,
            history: Vec::new(),
            history_pos: None,
            scroll: 0,
            autoscroll: true,
            viewport_width: 120,
            viewport_height: 36,
            tx,
            rx,
            open_requests: HashMap::new(),
            next_seq: 0,
            busy_conversations: HashSet::new(),
            notices: VecDeque::new(),
            last_status: "ready".to_string(),
            clipboard,
            copied_snippet: None,
            copied_at: None,
            render_generation: 0,
            render_cache: RenderCache::new(),
        };
        app.restore_ui_state();
        app.bootstrap();
        app
    }

    /// If a token survived from a previous run, verify it and hydrate;
    /// otherwise wait for /login.
    fn bootstrap(&mut self) {
        if self.credentials.get().is_some() {
            self.last_status = "checking session...".to_string();
            let gateway = self.gateway.clone();
            let tx = self.tx.clone();
            std::thread::spawn(move || match gateway.check_login() {
                Ok(true) => send_hydration(gateway.as_ref(), &tx),
                Ok(false) => {
                    let _ = tx.send(WorkerEvent::SessionExpired);
                }
                Err(err) => {
                    let _ = tx.send(WorkerEvent::Notice(format!("session check failed: {err}")));
                }
            });
        } else {
            self.last_status = "not logged in — /login <user> <pass>".to_string();
        }
    }

    /// Bump the render generation to invalidate the render cache.
    fn invalidate_render_cache(&mut self) {
        self.render_generation = self.render_generation.wrapping_add(1);
    }

    fn theme_palette(&self) -> ThemePalette {
        self.theme.palette()
    }

    fn is_waiting(&self) -> bool {
        !self.open_requests.is_empty()
    }

    fn next_request_seq(&mut self) -> u64 {
        self.next_seq = self.next_seq.wrapping_add(1);
        self.next_seq
    }

    fn push_notice(&mut self, text: impl Into<String>) {
        let text = text.into();
        if self.notices.back().is_some_and(|last| *last == text) {
            return;
        }
        self.notices.push_back(text);
        while self.notices.len() > MAX_NOTICE_LINES {
            self.notices.pop_front();
        }
        // The notice panel height feeds into scroll_max.
        self.follow_scroll();
    }

    fn clear_notices(&mut self) {
        if !self.notices.is_empty() {
            self.notices.clear();
            self.follow_scroll();
        }
    }

    /// The 401 path and /logout share this reset. Everything request-scoped
    /// dies with the session; in-flight replies get dropped by the empty
    /// open-request table.
    fn forced_logout(&mut self, reason: &str) {
        self.credentials.clear();
        self.logged_in = false;
        self.sessions.clear();
        self.open_requests.clear();
        self.busy_conversations.clear();
        self.reasoning_mode = false;
        self.expanded_reasoning.clear();
        self.copied_snippet = None;
        self.copied_at = None;
        self.last_status = "not logged in — /login <user> <pass>".to_string();
        self.push_notice(reason.to_string());
        self.follow_scroll();
    }

    /// Chat-bar label: explicit name or id fallback, capped at a fixed
    /// column width.
    fn chat_label(conversation: &Conversation) -> String {
        truncate(&conversation.display_name(), CHAT_NAME_DISPLAY_COLS)
    }

    /// Invalidate render cache and update scroll to follow content.
    /// Call after any mutation of the transcript.
    fn follow_scroll(&mut self) {
        self.invalidate_render_cache();
        if self.autoscroll {
            self.scroll = self.scroll_max();
        } else {
            self.scroll = self.scroll.min(self.scroll_max());
        }
    }

    /// Ensure the render cache is up-to-date for the current state.
    /// Returns true if the cache was rebuilt.
    fn ensure_render_cache(&mut self) -> bool {
        let need_rebuild = self.render_cache.generation != self.render_generation
            || self.render_cache.width != self.viewport_width
            || self.render_cache.height != self.viewport_height;
        if !need_rebuild {
            return false;
        }

        let w = self.viewport_width.max(1);
        let h = self.viewport_height;
        let (lines, snippets) = self.render_transcript(w);

        let available_for_log = h.saturating_sub(self.fixed_rows(w));
        let paragraph = Paragraph::new(Text::from(lines.clone())).wrap(Wrap { trim: false });
        let rendered_line_count = paragraph.line_count(w) as u16;
        let scroll_max = rendered_line_count.saturating_sub(available_for_log);

        self.render_cache = RenderCache {
            generation: self.render_generation,
            width: self.viewport_width,
            height: self.viewport_height,
            lines,
            snippets,
            scroll_max,
        };
        true
    }

    /// Rows taken by everything that is not the transcript: chat bar,
    /// optional docs row, optional notice panel, composer, status line.
    fn fixed_rows(&self, width: u16) -> u16 {
        let prompt_width = UnicodeWidthStr::width("> ") as u16;
        let max_input_height = self.viewport_height.saturating_sub(6).max(1);
        let input_height = self
            .input_height(width.saturating_sub(2), prompt_width)
            .saturating_add(2)
            .min(max_input_height);
        let docs_row = u16::from(
            self.sessions
                .active()
                .is_some_and(|c| !c.attached_documents.is_empty()),
        );
        let notice_rows = if self.notices.is_empty() {
            0
        } else {
            self.notices.len() as u16 + 2
        };
        // chat bar + status
        input_height + docs_row + notice_rows + 2
    }

    fn scroll_max(&mut self) -> u16 {
        self.ensure_render_cache();
        self.render_cache.scroll_max
    }

    fn cached_log_lines(&self) -> &[Line<'static>] {
        &self.render_cache.lines
    }

    fn cached_snippets(&self) -> &[Snippet] {
        &self.render_cache.snippets
    }

    fn update_viewport(&mut self, width: u16, height: u16) {
        self.viewport_width = width.max(1);
        self.viewport_height = height.max(1);
        let max_scroll = self.scroll_max();
        if self.autoscroll {
            self.scroll = max_scroll;
        } else {
            self.scroll = self.scroll.min(max_scroll);
        }
    }

    fn scroll_up(&mut self, n: u16) {
        let from = if self.autoscroll {
            self.scroll_max()
        } else {
            self.scroll
        };
        self.autoscroll = false;
        self.scroll = from.saturating_sub(n);
    }

    fn scroll_down(&mut self, n: u16) {
        let max_scroll = self.scroll_max();
        self.scroll = self.scroll.saturating_add(n).min(max_scroll);
        if self.scroll >= max_scroll {
            self.autoscroll = true;
        }
    }

    fn input_height(&self, width: u16, prompt_width: u16) -> u16 {
        if self.input.is_empty() {
            return 1;
        }
        let (_, end_y) = input_cursor_position(&self.input, self.input.len(), width, prompt_width);
        end_y.saturating_add(1).max(1)
    }

    /// Returns the vertical scroll offset needed to keep the cursor visible
    /// within the input area of the given `visible_rows` height.
    fn input_scroll_offset(&self, width: u16, prompt_width: u16, visible_rows: u16) -> u16 {
        if self.input.is_empty() {
            return 0;
        }
        let (_, cursor_y) = input_cursor_position(&self.input, self.cursor, width, prompt_width);
        cursor_y.saturating_sub(visible_rows.saturating_sub(1))
    }

    /// Clears the copy marker once its 2-second window has passed.
    /// Returns true when the transcript needs a redraw.
    fn expire_copy_feedback(&mut self) -> bool {
        match self.copied_at {
            Some(at) if at.elapsed() >= COPY_FEEDBACK_WINDOW => {
                self.copied_at = None;
                self.copied_snippet = None;
                self.invalidate_render_cache();
                true
            }
            _ => false,
        }
    }

    fn restore_ui_state(&mut self) {
        let path = self.config.ui_state_path();
        let Ok(raw) = std::fs::read_to_string(&path) else {
            return;
        };
        match serde_json::from_str::<UiSnapshot>(&raw) {
            Ok(snapshot) => {
                self.theme = snapshot.theme;
                self.history = snapshot.history;
            }
            Err(err) => log::warn!("ignoring unreadable ui state {}: {err}", path.display()),
        }
    }

    fn persist_ui_state(&self) {
        let mut history = self.history.clone();
        if history.len() > MAX_HISTORY_ENTRIES {
            history.drain(..history.len() - MAX_HISTORY_ENTRIES);
        }
        let snapshot = UiSnapshot {
            theme: self.theme,
            history,
        };
        if crate::config::ensure_state_dir(&self.config.state_dir).is_err() {
            return;
        }
        let path = self.config.ui_state_path();
        match serde_json::to_string_pretty(&snapshot) {
            Ok(raw) => {
                if let Err(err) = std::fs::write(&path, raw) {
                    log::warn!("cannot persist ui state to {}: {err}", path.display());
                }
            }
            Err(err) => log::warn!("cannot serialize ui state: {err}"),
        }
    }
}

/// Full hydration: list conversations, then fetch each transcript. Runs on
/// a worker thread; the result lands as a single `Loaded` event.
fn send_hydration(gateway: &dyn Gateway, tx: &Sender<WorkerEvent>) {
    match gateway.list_conversations() {
        Ok(summaries) => {
            let mut conversations = Vec::with_capacity(summaries.len());
            for summary in summaries {
                match gateway.get_conversation(&summary.id) {
                    Ok(mut conversation) => {
                        if conversation.name.is_none() {
                            conversation.name = summary.name;
                        }
                        conversations.push(conversation);
                    }
                    Err(crate::gateway::GatewayError::Unauthorized) => {
                        let _ = tx.send(WorkerEvent::SessionExpired);
                        return;
                    }
                    Err(err) => {
                        let _ = tx.send(WorkerEvent::Notice(format!(
                            "could not load chat {}: {err}",
                            summary.id
                        )));
                    }
                }
            }
            let _ = tx.send(WorkerEvent::Loaded { conversations });
        }
        Err(crate::gateway::GatewayError::Unauthorized) => {
            let _ = tx.send(WorkerEvent::SessionExpired);
        }
        Err(err) => {
            let _ = tx.send(WorkerEvent::Notice(format!("could not load chats: {err}")));
        }
    }
}
