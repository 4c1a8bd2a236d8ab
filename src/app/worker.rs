use super::*;

impl App {
    /// Drain pending worker events into local state. Returns true when
    /// anything was processed so the caller can schedule a redraw.
    pub(super) fn poll_worker(&mut self) -> bool {
        let rx = self.rx.clone();
        let mut processed = false;
        while let Ok(event) = rx.try_recv() {
            processed = true;
            self.apply_worker_event(event);
        }
        processed
    }

    fn apply_worker_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::LoggedIn { token } => {
                self.credentials.set(&token);
                self.logged_in = true;
                self.clear_notices();
                self.last_status = "logged in — loading chats...".to_string();
                self.invalidate_render_cache();
                let gateway = self.gateway.clone();
                let tx = self.tx.clone();
                std::thread::spawn(move || send_hydration(gateway.as_ref(), &tx));
            }
            WorkerEvent::Loaded { conversations } => {
                let count = conversations.len();
                self.logged_in = true;
                self.sessions.replace_all(conversations);
                self.last_status = format!("{count} chat(s) loaded");
                self.autoscroll = true;
                self.follow_scroll();
            }
            WorkerEvent::Created { id, name } => {
                self.sessions.insert_created(id.clone());
                if let Some(name) = name {
                    let _ = self.sessions.apply_rename(&id, &name);
                }
                self.last_status = "new chat".to_string();
                self.autoscroll = true;
                self.follow_scroll();
            }
            WorkerEvent::Renamed { id, name } => {
                // The chat may have been deleted while the rename was in
                // flight; that is not an error worth surfacing.
                if self.sessions.apply_rename(&id, &name).is_ok() {
                    self.last_status = "chat renamed".to_string();
                }
                self.invalidate_render_cache();
            }
            WorkerEvent::Deleted { id } => {
                let _ = self.sessions.remove(&id);
                self.open_requests.retain(|_, cid| *cid != id);
                self.busy_conversations.remove(&id);
                self.expanded_reasoning.retain(|(cid, _)| *cid != id);
                self.last_status = "chat deleted".to_string();
                self.follow_scroll();
            }
            WorkerEvent::Reply {
                seq,
                conversation_id,
                content,
                reasoning,
            } => {
                let Some(open_id) = self.open_requests.remove(&seq) else {
                    log::debug!("discarding stale reply seq={seq} chat={conversation_id}");
                    return;
                };
                self.busy_conversations.remove(&open_id);
                let content = sanitize_runtime_text(&content);
                let reasoning = reasoning.map(|r| sanitize_runtime_text(&r));
                if self
                    .sessions
                    .resolve_reply(&open_id, content, reasoning)
                    .is_err()
                {
                    log::warn!("reply for unknown chat {open_id}");
                    return;
                }
                self.last_status = "reply received".to_string();
                self.follow_scroll();
            }
            WorkerEvent::Failed {
                seq,
                conversation_id,
                message,
            } => {
                let Some(open_id) = self.open_requests.remove(&seq) else {
                    log::debug!("discarding stale failure seq={seq} chat={conversation_id}");
                    return;
                };
                self.busy_conversations.remove(&open_id);
                let _ = self.sessions.resolve_failure(&open_id, &message);
                self.last_status = "reply failed".to_string();
                self.follow_scroll();
            }
            WorkerEvent::Uploaded {
                conversation_id,
                attached,
            } => {
                let count = attached.len();
                if self.sessions.set_attached(&conversation_id, attached).is_ok() {
                    self.push_notice(format!("{count} document(s) attached"));
                    self.last_status = "upload complete".to_string();
                }
                self.follow_scroll();
            }
            WorkerEvent::Detached {
                conversation_id,
                filename,
            } => {
                if self.sessions.detach(&conversation_id, &filename).is_ok() {
                    self.push_notice(format!("detached {filename}"));
                    self.last_status = "document detached".to_string();
                }
                self.follow_scroll();
            }
            WorkerEvent::Notice(text) => {
                self.push_notice(text);
                self.last_status = "ready".to_string();
            }
            WorkerEvent::SessionExpired => {
                self.forced_logout("session expired — /login again");
            }
        }
    }
}
