use std::path::PathBuf;

use crate::gateway::{DocumentUpload, Gateway, GatewayError};

use super::*;

/// Splits command arguments on whitespace, honoring double quotes so
/// paths with spaces survive `/attach`.
pub(super) fn split_command_args(rest: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for ch in rest.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        args.push(current);
    }
    args
}

/// Unauthorized means the session is gone; everything else is a notice
/// with enough context to act on.
fn failure_event(err: GatewayError, context: &str) -> WorkerEvent {
    match err {
        GatewayError::Unauthorized => WorkerEvent::SessionExpired,
        err => WorkerEvent::Notice(format!("{context}: {err}")),
    }
}

impl App {
    pub(super) fn submit_current_line(&mut self) {
        let line = self.input.trim().to_string();
        if line.is_empty() {
            return;
        }
        // History is persisted across runs; credentials must never land in it.
        if !line.starts_with("/login") {
            self.push_history(line.clone());
        }
        self.clear_input_buffer();
        if line.starts_with('/') {
            self.execute_command(&line);
        } else {
            self.send_chat_message(&line);
        }
    }

    fn execute_command(&mut self, line: &str) {
        let mut parts = line.splitn(2, char::is_whitespace);
        let command = parts.next().unwrap_or_default();
        let rest = parts.next().unwrap_or("").trim();
        match command {
            "/help" => self.push_notice(
                "commands: /new /open <n|id> /rename <name> /delete /attach <path..> \
                 /detach <name> /copy <n> /reasoning /theme <name> /login /logout /clear /quit",
            ),
            "/login" => self.login(rest),
            "/logout" => self.logout(),
            "/new" => self.create_conversation(),
            "/open" => self.open_conversation(rest),
            "/rename" => self.rename_conversation(rest),
            "/delete" => self.request_delete(),
            "/attach" => self.attach_documents(rest),
            "/detach" => self.request_detach(rest),
            "/copy" => self.copy_command(rest),
            "/reasoning" => self.toggle_reasoning_mode(),
            "/theme" => self.set_theme(rest),
            "/clear" => self.clear_notices(),
            "/exit" | "/quit" => self.should_quit = true,
            other => self.push_notice(format!("unknown command: {other} (try /help)")),
        }
    }

    fn spawn_gateway<F>(&self, job: F)
    where
        F: FnOnce(&dyn Gateway, &Sender<WorkerEvent>) + Send + 'static,
    {
        let gateway = self.gateway.clone();
        let tx = self.tx.clone();
        std::thread::spawn(move || job(gateway.as_ref(), &tx));
    }

    fn require_login(&mut self) -> bool {
        if self.logged_in {
            true
        } else {
            self.push_notice("not logged in — /login <user> <pass>");
            false
        }
    }

    fn login(&mut self, rest: &str) {
        if self.logged_in {
            self.push_notice("already logged in — /logout first");
            return;
        }
        let mut words = rest.split_whitespace();
        let (Some(user), Some(pass)) = (words.next(), words.next()) else {
            self.push_notice("usage: /login <user> <pass>");
            return;
        };
        self.last_status = "logging in...".to_string();
        let user = user.to_string();
        let pass = pass.to_string();
        self.spawn_gateway(move |gateway, tx| {
            let event = match gateway.login(&user, &pass) {
                Ok(token) => WorkerEvent::LoggedIn { token },
                Err(err) => WorkerEvent::Notice(format!("login failed: {err}")),
            };
            let _ = tx.send(event);
        });
    }

    fn logout(&mut self) {
        if !self.logged_in {
            self.push_notice("not logged in");
            return;
        }
        // Server-side invalidation is best effort; the local session dies
        // either way.
        self.spawn_gateway(|gateway, _tx| {
            let _ = gateway.logout();
        });
        self.forced_logout("logged out");
    }

    fn create_conversation(&mut self) {
        if !self.require_login() {
            return;
        }
        self.last_status = "creating chat...".to_string();
        self.spawn_gateway(|gateway, tx| {
            let event = match gateway.create_conversation() {
                Ok(summary) => WorkerEvent::Created {
                    id: summary.id,
                    name: summary.name,
                },
                Err(err) => failure_event(err, "could not create chat"),
            };
            let _ = tx.send(event);
        });
    }

    fn open_conversation(&mut self, rest: &str) {
        if !self.require_login() {
            return;
        }
        if rest.is_empty() {
            self.push_notice("usage: /open <number|id>");
            return;
        }
        let target = match rest.parse::<usize>() {
            Ok(n) if n >= 1 => self
                .sessions
                .conversations()
                .get(n - 1)
                .map(|c| c.id.clone()),
            _ => Some(rest.to_string()),
        };
        match target {
            Some(id) if self.sessions.select(&id) => {
                self.autoscroll = true;
                self.follow_scroll();
                self.last_status = "chat opened".to_string();
            }
            _ => self.push_notice(format!("no such chat: {rest}")),
        }
    }

    fn rename_conversation(&mut self, rest: &str) {
        if !self.require_login() {
            return;
        }
        let Some(id) = self.sessions.active_id().map(str::to_string) else {
            self.push_notice("no active chat to rename");
            return;
        };
        match SessionStore::validate_name(rest) {
            Err(err) => self.push_notice(err.to_string()),
            Ok(name) => {
                let name = name.to_string();
                self.last_status = "renaming chat...".to_string();
                self.spawn_gateway(move |gateway, tx| {
                    let event = match gateway.rename_conversation(&id, &name) {
                        Ok(()) => WorkerEvent::Renamed { id, name },
                        Err(err) => failure_event(err, "rename failed"),
                    };
                    let _ = tx.send(event);
                });
            }
        }
    }

    fn request_delete(&mut self) {
        if !self.require_login() {
            return;
        }
        let Some(conversation) = self.sessions.active() else {
            self.push_notice("no active chat to delete");
            return;
        };
        let prompt = format!("delete chat \"{}\"?", Self::chat_label(conversation));
        self.confirm = Some(PendingConfirm {
            action: ConfirmAction::DeleteConversation {
                id: conversation.id.clone(),
            },
            prompt,
        });
        self.mode = Mode::Confirm;
    }

    fn attach_documents(&mut self, rest: &str) {
        if !self.require_login() {
            return;
        }
        let Some(id) = self.sessions.active_id().map(str::to_string) else {
            self.push_notice("no active chat — /new first");
            return;
        };
        let paths: Vec<PathBuf> = split_command_args(rest)
            .into_iter()
            .map(PathBuf::from)
            .collect();
        if paths.is_empty() {
            self.push_notice("usage: /attach <path> [path..] (quote paths with spaces)");
            return;
        }
        let mut sizes = Vec::with_capacity(paths.len());
        for path in &paths {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                self.push_notice(format!("not a file: {}", path.display()));
                return;
            };
            match std::fs::metadata(path) {
                Ok(meta) if meta.is_file() => sizes.push((name.to_string(), meta.len())),
                _ => {
                    self.push_notice(format!("cannot read {}", path.display()));
                    return;
                }
            }
        }
        // Size check happens before any bytes are read or sent; one
        // oversized file rejects the whole batch.
        if let Err(err) = SessionStore::validate_documents(&sizes) {
            self.push_notice(err.to_string());
            return;
        }
        let mut files = Vec::with_capacity(paths.len());
        for (path, (name, _)) in paths.iter().zip(&sizes) {
            match std::fs::read(path) {
                Ok(bytes) => files.push(DocumentUpload {
                    filename: name.clone(),
                    bytes,
                }),
                Err(err) => {
                    self.push_notice(format!("cannot read {}: {err}", path.display()));
                    return;
                }
            }
        }
        self.last_status = format!("uploading {} file(s)...", files.len());
        self.spawn_gateway(move |gateway, tx| {
            let event = match gateway.upload_documents(&id, files) {
                Ok(attached) => WorkerEvent::Uploaded {
                    conversation_id: id,
                    attached,
                },
                Err(err) => failure_event(err, "upload failed"),
            };
            let _ = tx.send(event);
        });
    }

    fn request_detach(&mut self, rest: &str) {
        if !self.require_login() {
            return;
        }
        let Some(conversation) = self.sessions.active() else {
            self.push_notice("no active chat");
            return;
        };
        if rest.is_empty() {
            self.push_notice("usage: /detach <name>");
            return;
        }
        if !conversation.attached_documents.contains(rest) {
            self.push_notice(format!("no attached document named {rest}"));
            return;
        }
        self.confirm = Some(PendingConfirm {
            action: ConfirmAction::DetachDocument {
                conversation_id: conversation.id.clone(),
                filename: rest.to_string(),
            },
            prompt: format!("detach \"{rest}\"?"),
        });
        self.mode = Mode::Confirm;
    }

    pub(super) fn confirm_pending(&mut self) {
        self.mode = Mode::Normal;
        let Some(pending) = self.confirm.take() else {
            return;
        };
        match pending.action {
            ConfirmAction::DeleteConversation { id } => {
                self.last_status = "deleting chat...".to_string();
                self.spawn_gateway(move |gateway, tx| {
                    let event = match gateway.delete_conversation(&id) {
                        Ok(()) => WorkerEvent::Deleted { id },
                        Err(err) => failure_event(err, "delete failed"),
                    };
                    let _ = tx.send(event);
                });
            }
            ConfirmAction::DetachDocument {
                conversation_id,
                filename,
            } => {
                self.last_status = "detaching document...".to_string();
                self.spawn_gateway(move |gateway, tx| {
                    let event = match gateway.remove_document(&conversation_id, &filename) {
                        Ok(()) => WorkerEvent::Detached {
                            conversation_id,
                            filename,
                        },
                        Err(err) => failure_event(err, "detach failed"),
                    };
                    let _ = tx.send(event);
                });
            }
        }
    }

    pub(super) fn cancel_pending(&mut self) {
        self.confirm = None;
        self.mode = Mode::Normal;
        self.last_status = "cancelled".to_string();
    }

    pub(super) fn send_chat_message(&mut self, text: &str) {
        if !self.require_login() {
            return;
        }
        let Some(id) = self.sessions.active_id().map(str::to_string) else {
            self.push_notice("no active chat — /new first");
            return;
        };
        if self.busy_conversations.contains(&id) {
            self.push_notice("this chat is still waiting for a reply");
            return;
        }
        if let Err(err) = self.sessions.begin_exchange(&id, text) {
            self.push_notice(err.to_string());
            return;
        }
        self.autoscroll = true;
        self.follow_scroll();
        let seq = self.next_request_seq();
        self.open_requests.insert(seq, id.clone());
        self.busy_conversations.insert(id.clone());
        self.last_status = "waiting for reply...".to_string();
        let text = text.to_string();
        let use_reasoning = self.reasoning_mode;
        self.spawn_gateway(move |gateway, tx| {
            let event = match gateway.send_message(&id, &text, use_reasoning) {
                Ok(reply) => WorkerEvent::Reply {
                    seq,
                    conversation_id: id,
                    content: reply.content,
                    reasoning: reply.reasoning,
                },
                Err(GatewayError::Unauthorized) => WorkerEvent::SessionExpired,
                Err(err) => WorkerEvent::Failed {
                    seq,
                    conversation_id: id,
                    message: err.to_string(),
                },
            };
            let _ = tx.send(event);
        });
    }

    fn copy_command(&mut self, rest: &str) {
        match rest.parse::<usize>() {
            Ok(index) if index >= 1 => self.copy_snippet(index),
            _ => self.push_notice("usage: /copy <snippet number>"),
        }
    }

    /// Ctrl+Y: copy the most recent snippet in the transcript.
    pub(super) fn copy_latest_snippet(&mut self) {
        self.ensure_render_cache();
        let count = self.cached_snippets().len();
        if count == 0 {
            self.push_notice("no code snippets to copy");
            return;
        }
        self.copy_snippet(count);
    }

    pub(super) fn copy_snippet(&mut self, index: usize) {
        self.ensure_render_cache();
        let Some(snippet) = self.cached_snippets().get(index.wrapping_sub(1)) else {
            self.push_notice(format!("no snippet [{index}]"));
            return;
        };
        let code = snippet.code.clone();
        let Some(clipboard) = self.clipboard.as_mut() else {
            self.push_notice("clipboard unavailable");
            return;
        };
        match clipboard.set_text(code) {
            Ok(()) => {
                self.copied_snippet = Some(index);
                self.copied_at = Some(Instant::now());
                self.last_status = format!("snippet [{index}] copied");
                self.invalidate_render_cache();
            }
            Err(err) => self.push_notice(format!("copy failed: {err}")),
        }
    }

    fn toggle_reasoning_mode(&mut self) {
        self.reasoning_mode = !self.reasoning_mode;
        self.last_status = if self.reasoning_mode {
            "reasoning requests on".to_string()
        } else {
            "reasoning requests off".to_string()
        };
    }

    /// Ctrl+T: expand or collapse the newest reasoning section in the
    /// active chat.
    pub(super) fn toggle_latest_reasoning(&mut self) {
        let Some(conversation) = self.sessions.active() else {
            return;
        };
        let Some(idx) = conversation
            .messages
            .iter()
            .rposition(|m| !m.pending && m.reasoning.is_some())
        else {
            self.push_notice("no reasoning to show");
            return;
        };
        let key = (conversation.id.clone(), idx);
        if !self.expanded_reasoning.remove(&key) {
            self.expanded_reasoning.insert(key);
        }
        self.follow_scroll();
    }

    fn set_theme(&mut self, rest: &str) {
        match ThemePreset::parse(rest) {
            Some(preset) => {
                self.theme = preset;
                self.invalidate_render_cache();
                self.last_status = format!("theme: {}", preset.as_str());
            }
            None => {
                let names: Vec<&str> = ThemePreset::all().iter().map(|t| t.as_str()).collect();
                self.push_notice(format!("themes: {}", names.join(", ")));
            }
        }
    }
}
