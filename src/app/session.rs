use thiserror::Error;

use super::types::{Conversation, Message};

/// Per-file ceiling enforced before any upload leaves the client.
pub(crate) const MAX_DOCUMENT_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub(crate) enum SessionError {
    #[error("chat name cannot be empty")]
    EmptyName,
    #[error("no chat with id {0}")]
    UnknownConversation(String),
    #[error("{name} exceeds the 10 MiB limit")]
    DocumentTooLarge { name: String },
}

/// Local conversation state. All mutation goes through reducer methods so
/// transitions can be exercised without a backend; the App layer decides
/// when a backend confirmation is required before a reducer runs.
#[derive(Default)]
pub(crate) struct SessionStore {
    conversations: Vec<Conversation>,
    active: Option<String>,
}

impl SessionStore {
    pub(crate) fn new() -> Self {
        SessionStore::default()
    }

    pub(crate) fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub(crate) fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub(crate) fn active(&self) -> Option<&Conversation> {
        let id = self.active.as_deref()?;
        self.get(id)
    }

    pub(crate) fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Conversation, SessionError> {
        self.conversations
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| SessionError::UnknownConversation(id.to_string()))
    }

    /// Hydration: swap in the backend's conversation list wholesale. The
    /// active pointer survives if its conversation is still present,
    /// otherwise it falls to the first conversation.
    pub(crate) fn replace_all(&mut self, conversations: Vec<Conversation>) {
        self.conversations = conversations;
        let still_there = self
            .active
            .as_deref()
            .is_some_and(|id| self.conversations.iter().any(|c| c.id == id));
        if !still_there {
            self.active = self.conversations.first().map(|c| c.id.clone());
        }
    }

    pub(crate) fn insert_created(&mut self, id: impl Into<String>) {
        let conversation = Conversation::new(id);
        self.active = Some(conversation.id.clone());
        self.conversations.push(conversation);
    }

    /// Unknown ids are a validated no-op, not a silent pointer update.
    pub(crate) fn select(&mut self, id: &str) -> bool {
        if self.conversations.iter().any(|c| c.id == id) {
            self.active = Some(id.to_string());
            true
        } else {
            false
        }
    }

    pub(crate) fn validate_name(name: &str) -> Result<&str, SessionError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(SessionError::EmptyName);
        }
        Ok(trimmed)
    }

    pub(crate) fn apply_rename(&mut self, id: &str, name: &str) -> Result<(), SessionError> {
        let conversation = self.get_mut(id)?;
        conversation.name = Some(name.to_string());
        Ok(())
    }

    pub(crate) fn remove(&mut self, id: &str) -> Result<(), SessionError> {
        let before = self.conversations.len();
        self.conversations.retain(|c| c.id != id);
        if self.conversations.len() == before {
            return Err(SessionError::UnknownConversation(id.to_string()));
        }
        if self.active.as_deref() == Some(id) {
            self.active = self.conversations.first().map(|c| c.id.clone());
        }
        Ok(())
    }

    /// Optimistic user message plus the pending placeholder. A stale
    /// placeholder from an earlier exchange is dropped first so the list
    /// never holds more than one.
    pub(crate) fn begin_exchange(&mut self, id: &str, text: &str) -> Result<(), SessionError> {
        let conversation = self.get_mut(id)?;
        conversation.messages.retain(|m| !m.pending);
        conversation.messages.push(Message::user(text));
        conversation.messages.push(Message::placeholder());
        Ok(())
    }

    pub(crate) fn resolve_reply(
        &mut self,
        id: &str,
        content: String,
        reasoning: Option<String>,
    ) -> Result<(), SessionError> {
        let conversation = self.get_mut(id)?;
        conversation.messages.retain(|m| !m.pending);
        conversation
            .messages
            .push(Message::assistant(content, reasoning));
        Ok(())
    }

    /// Failures land in the transcript as an ordinary assistant message so
    /// the user sees what happened where they asked.
    pub(crate) fn resolve_failure(&mut self, id: &str, message: &str) -> Result<(), SessionError> {
        let conversation = self.get_mut(id)?;
        conversation.messages.retain(|m| !m.pending);
        conversation
            .messages
            .push(Message::assistant(format!("Error: {message}"), None));
        Ok(())
    }

    pub(crate) fn pending_count(&self, id: &str) -> usize {
        self.get(id)
            .map(|c| c.messages.iter().filter(|m| m.pending).count())
            .unwrap_or(0)
    }

    /// Rejects the whole batch on the first file over the limit. Runs
    /// before any bytes are read or sent.
    pub(crate) fn validate_documents(files: &[(String, u64)]) -> Result<(), SessionError> {
        for (name, size) in files {
            if *size > MAX_DOCUMENT_BYTES {
                return Err(SessionError::DocumentTooLarge { name: name.clone() });
            }
        }
        Ok(())
    }

    /// The attached set always mirrors what the backend confirmed, never a
    /// local guess.
    pub(crate) fn set_attached(&mut self, id: &str, names: Vec<String>) -> Result<(), SessionError> {
        let conversation = self.get_mut(id)?;
        conversation.attached_documents = names.into_iter().collect();
        Ok(())
    }

    pub(crate) fn detach(&mut self, id: &str, filename: &str) -> Result<(), SessionError> {
        let conversation = self.get_mut(id)?;
        conversation.attached_documents.remove(filename);
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.conversations.clear();
        self.active = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::types::Role;

    fn store_with(ids: &[&str]) -> SessionStore {
        let mut store = SessionStore::new();
        for id in ids {
            store.insert_created(*id);
        }
        store
    }

    #[test]
    fn created_conversation_becomes_active() {
        let store = store_with(&["a", "b"]);
        assert_eq!(store.active_id(), Some("b"));
    }

    #[test]
    fn select_unknown_id_is_a_no_op() {
        let mut store = store_with(&["a"]);
        assert!(!store.select("missing"));
        assert_eq!(store.active_id(), Some("a"));
    }

    #[test]
    fn exchange_keeps_at_most_one_placeholder() {
        let mut store = store_with(&["a"]);
        store.begin_exchange("a", "first").unwrap();
        store.begin_exchange("a", "second").unwrap();
        assert_eq!(store.pending_count("a"), 1);
        let messages = &store.get("a").unwrap().messages;
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].content, "second");
    }

    #[test]
    fn reply_replaces_placeholder_in_place() {
        let mut store = store_with(&["a"]);
        store.begin_exchange("a", "hello").unwrap();
        store.resolve_reply("a", "hi".into(), None).unwrap();
        let messages = &store.get("a").unwrap().messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "hello");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "hi");
        assert_eq!(store.pending_count("a"), 0);
    }

    #[test]
    fn failure_lands_as_error_message() {
        let mut store = store_with(&["a"]);
        store.begin_exchange("a", "hello").unwrap();
        store.resolve_failure("a", "backend unreachable").unwrap();
        let messages = &store.get("a").unwrap().messages;
        assert_eq!(messages.last().unwrap().content, "Error: backend unreachable");
        assert_eq!(store.pending_count("a"), 0);
    }

    #[test]
    fn removing_active_moves_pointer_to_first_remaining() {
        let mut store = store_with(&["a", "b", "c"]);
        assert!(store.select("b"));
        store.remove("b").unwrap();
        assert_eq!(store.active_id(), Some("a"));
        store.remove("a").unwrap();
        store.remove("c").unwrap();
        assert_eq!(store.active_id(), None);
    }

    #[test]
    fn removing_inactive_keeps_pointer() {
        let mut store = store_with(&["a", "b"]);
        assert!(store.select("a"));
        store.remove("b").unwrap();
        assert_eq!(store.active_id(), Some("a"));
    }

    #[test]
    fn rename_validation_rejects_whitespace() {
        assert_eq!(
            SessionStore::validate_name("   "),
            Err(SessionError::EmptyName)
        );
        assert_eq!(SessionStore::validate_name("  notes "), Ok("notes"));
    }

    #[test]
    fn oversized_document_rejects_whole_batch() {
        let files = vec![
            ("small.pdf".to_string(), 1024),
            ("big.pdf".to_string(), MAX_DOCUMENT_BYTES + 1),
        ];
        assert_eq!(
            SessionStore::validate_documents(&files),
            Err(SessionError::DocumentTooLarge {
                name: "big.pdf".into()
            })
        );
        assert_eq!(
            SessionStore::validate_documents(&files[..1]),
            Ok(())
        );
    }

    #[test]
    fn replace_all_keeps_active_when_still_present() {
        let mut store = store_with(&["a", "b"]);
        assert!(store.select("a"));
        store.replace_all(vec![Conversation::new("a"), Conversation::new("z")]);
        assert_eq!(store.active_id(), Some("a"));
        store.replace_all(vec![Conversation::new("z")]);
        assert_eq!(store.active_id(), Some("z"));
    }

    #[test]
    fn attached_set_mirrors_backend_list() {
        let mut store = store_with(&["a"]);
        store
            .set_attached("a", vec!["b.pdf".into(), "a.pdf".into()])
            .unwrap();
        let attached: Vec<_> = store
            .get("a")
            .unwrap()
            .attached_documents
            .iter()
            .cloned()
            .collect();
        assert_eq!(attached, vec!["a.pdf", "b.pdf"]);
        store.detach("a", "a.pdf").unwrap();
        assert_eq!(store.get("a").unwrap().attached_documents.len(), 1);
    }
}
