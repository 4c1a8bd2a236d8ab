use std::sync::Mutex;

use ratatui::style::Modifier;

use super::commands::split_command_args;
use super::render::normalize_language;
use super::session::MAX_DOCUMENT_BYTES;
use super::*;
use crate::config::MemoryCredentialStore;
use crate::gateway::{
    ConversationSummary, DocumentUpload, Gateway, GatewayError, HttpGateway, Reply,
};

struct MockGateway {
    calls: Mutex<Vec<String>>,
    reply: Mutex<Reply>,
}

impl MockGateway {
    fn new() -> Arc<Self> {
        Arc::new(MockGateway {
            calls: Mutex::new(Vec::new()),
            reply: Mutex::new(Reply {
                content: "hi".to_string(),
                reasoning: None,
            }),
        })
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn set_reply(&self, content: &str, reasoning: Option<&str>) {
        *self.reply.lock().unwrap() = Reply {
            content: content.to_string(),
            reasoning: reasoning.map(str::to_string),
        };
    }
}

impl Gateway for MockGateway {
    fn login(&self, username: &str, _password: &str) -> Result<String, GatewayError> {
        self.record(format!("login {username}"));
        Ok("token-1".to_string())
    }

    fn logout(&self) -> Result<(), GatewayError> {
        self.record("logout".to_string());
        Ok(())
    }

    fn check_login(&self) -> Result<bool, GatewayError> {
        self.record("check-login".to_string());
        Ok(true)
    }

    fn list_conversations(&self) -> Result<Vec<ConversationSummary>, GatewayError> {
        self.record("list".to_string());
        Ok(Vec::new())
    }

    fn get_conversation(&self, id: &str) -> Result<Conversation, GatewayError> {
        self.record(format!("get {id}"));
        Ok(Conversation::new(id))
    }

    fn create_conversation(&self) -> Result<ConversationSummary, GatewayError> {
        self.record("create".to_string());
        Ok(ConversationSummary {
            id: "c1".to_string(),
            name: Some("New Chat c1".to_string()),
        })
    }

    fn rename_conversation(&self, id: &str, name: &str) -> Result<(), GatewayError> {
        self.record(format!("rename {id} {name}"));
        Ok(())
    }

    fn delete_conversation(&self, id: &str) -> Result<(), GatewayError> {
        self.record(format!("delete {id}"));
        Ok(())
    }

    fn send_message(
        &self,
        id: &str,
        text: &str,
        use_reasoning: bool,
    ) -> Result<Reply, GatewayError> {
        self.record(format!("send {id} {text} reasoning={use_reasoning}"));
        Ok(self.reply.lock().unwrap().clone())
    }

    fn upload_documents(
        &self,
        id: &str,
        files: Vec<DocumentUpload>,
    ) -> Result<Vec<String>, GatewayError> {
        self.record(format!("upload {id} {}", files.len()));
        Ok(files.into_iter().map(|f| f.filename).collect())
    }

    fn remove_document(&self, id: &str, filename: &str) -> Result<(), GatewayError> {
        self.record(format!("remove {id} {filename}"));
        Ok(())
    }
}

fn test_config() -> Config {
    Config {
        api_base: "http://unused".to_string(),
        state_dir: std::env::temp_dir().join("termchat-tests-no-state"),
    }
}

fn logged_in_app(gateway: Arc<MockGateway>) -> App {
    let mut app = App::new(
        test_config(),
        gateway,
        Arc::new(MemoryCredentialStore::new(None)),
    );
    app.logged_in = true;
    app
}

fn pump_until(app: &mut App, done: impl Fn(&App) -> bool) {
    for _ in 0..400 {
        app.poll_worker();
        if done(app) {
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("expected worker event did not arrive");
}

fn seed_assistant(app: &mut App, content: &str, reasoning: Option<&str>) {
    let id = app.sessions.active_id().unwrap().to_string();
    app.sessions.begin_exchange(&id, "q").unwrap();
    app.sessions
        .resolve_reply(&id, content.to_string(), reasoning.map(str::to_string))
        .unwrap();
}

#[test]
fn send_hello_round_trip() {
    let gateway = MockGateway::new();
    let mut app = logged_in_app(gateway.clone());
    app.sessions.insert_created("c1");

    app.input = "hello".to_string();
    app.submit_current_line();
    assert_eq!(app.sessions.pending_count("c1"), 1);

    pump_until(&mut app, |a| !a.busy_conversations.contains("c1"));
    let messages = &app.sessions.get("c1").unwrap().messages;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].content, "hello");
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, "hi");
    assert_eq!(app.sessions.pending_count("c1"), 0);
    assert!(gateway
        .calls()
        .contains(&"send c1 hello reasoning=false".to_string()));
}

#[test]
fn second_send_blocked_while_waiting() {
    let gateway = MockGateway::new();
    let mut app = logged_in_app(gateway);
    app.sessions.insert_created("c1");

    app.input = "first".to_string();
    app.submit_current_line();
    app.input = "second".to_string();
    app.submit_current_line();

    // Second submit is refused before it touches the transcript.
    assert_eq!(app.sessions.get("c1").unwrap().messages.len(), 2);
    assert!(app
        .notices
        .iter()
        .any(|n| n.contains("waiting for a reply")));
}

#[test]
fn reasoning_mode_rides_along_with_send() {
    let gateway = MockGateway::new();
    gateway.set_reply("because", Some("thought it through"));
    let mut app = logged_in_app(gateway.clone());
    app.sessions.insert_created("c1");
    app.input = "/reasoning".to_string();
    app.submit_current_line();

    app.input = "why".to_string();
    app.submit_current_line();
    pump_until(&mut app, |a| !a.busy_conversations.contains("c1"));
    assert!(gateway
        .calls()
        .contains(&"send c1 why reasoning=true".to_string()));
    let last = app.sessions.get("c1").unwrap().messages.last().unwrap();
    assert_eq!(last.content, "because");
    assert_eq!(last.reasoning.as_deref(), Some("thought it through"));
}

#[test]
fn reply_lands_in_originating_conversation() {
    let gateway = MockGateway::new();
    let mut app = logged_in_app(gateway);
    app.sessions.insert_created("c1");
    app.sessions.insert_created("c2");
    assert!(app.sessions.select("c1"));

    app.input = "hello".to_string();
    app.submit_current_line();
    assert!(app.sessions.select("c2"));

    pump_until(&mut app, |a| !a.busy_conversations.contains("c1"));
    assert_eq!(app.sessions.get("c1").unwrap().messages.len(), 2);
    assert!(app.sessions.get("c2").unwrap().messages.is_empty());
    assert_eq!(app.sessions.active_id(), Some("c2"));
}

#[test]
fn stale_reply_for_deleted_conversation_is_discarded() {
    let gateway = MockGateway::new();
    let mut app = logged_in_app(gateway);
    app.sessions.insert_created("c1");
    app.sessions.begin_exchange("c1", "hello").unwrap();
    app.open_requests.insert(7, "c1".to_string());
    app.busy_conversations.insert("c1".to_string());

    app.tx
        .send(WorkerEvent::Deleted {
            id: "c1".to_string(),
        })
        .unwrap();
    app.tx
        .send(WorkerEvent::Reply {
            seq: 7,
            conversation_id: "c1".to_string(),
            content: "late".to_string(),
            reasoning: None,
        })
        .unwrap();
    app.poll_worker();

    assert!(app.sessions.is_empty());
    assert!(app.open_requests.is_empty());
    assert!(app.busy_conversations.is_empty());
}

#[test]
fn failed_send_becomes_error_message() {
    let gateway = MockGateway::new();
    let mut app = logged_in_app(gateway);
    app.sessions.insert_created("c1");
    app.sessions.begin_exchange("c1", "hello").unwrap();
    app.open_requests.insert(3, "c1".to_string());
    app.busy_conversations.insert("c1".to_string());

    app.tx
        .send(WorkerEvent::Failed {
            seq: 3,
            conversation_id: "c1".to_string(),
            message: "backend unreachable".to_string(),
        })
        .unwrap();
    app.poll_worker();

    let messages = &app.sessions.get("c1").unwrap().messages;
    assert_eq!(
        messages.last().unwrap().content,
        "Error: backend unreachable"
    );
    assert_eq!(app.sessions.pending_count("c1"), 0);
}

#[test]
fn session_expiry_forces_logout() {
    let gateway = MockGateway::new();
    let store = Arc::new(MemoryCredentialStore::new(None));
    let mut app = App::new(test_config(), gateway, store.clone());
    store.set("stale-token");
    app.logged_in = true;
    app.sessions.insert_created("c1");
    app.reasoning_mode = true;

    app.tx.send(WorkerEvent::SessionExpired).unwrap();
    app.poll_worker();

    assert!(!app.logged_in);
    assert!(app.sessions.is_empty());
    assert!(!app.reasoning_mode);
    assert_eq!(store.get(), None);
    assert!(app.notices.iter().any(|n| n.contains("session expired")));
}

#[test]
fn login_stores_token_and_hydrates() {
    let gateway = MockGateway::new();
    let store = Arc::new(MemoryCredentialStore::new(None));
    let mut app = App::new(test_config(), gateway.clone(), store.clone());

    app.input = "/login alice secret".to_string();
    app.submit_current_line();
    pump_until(&mut app, |a| a.logged_in);
    assert_eq!(store.get().as_deref(), Some("token-1"));

    pump_until(&mut app, |_| gateway.calls().contains(&"list".to_string()));
}

#[test]
fn rename_to_whitespace_is_rejected_locally() {
    let gateway = MockGateway::new();
    let mut app = logged_in_app(gateway.clone());
    app.sessions.insert_created("c1");

    app.input = "/rename    ".to_string();
    app.submit_current_line();

    assert!(gateway.calls().is_empty());
    assert!(app.notices.iter().any(|n| n.contains("cannot be empty")));
}

#[test]
fn delete_needs_confirmation() {
    let gateway = MockGateway::new();
    let mut app = logged_in_app(gateway.clone());
    app.sessions.insert_created("c1");

    app.input = "/delete".to_string();
    app.submit_current_line();
    assert!(matches!(app.mode, Mode::Confirm));
    app.cancel_pending();
    assert!(gateway.calls().is_empty());
    assert!(!app.sessions.is_empty());

    app.input = "/delete".to_string();
    app.submit_current_line();
    app.confirm_pending();
    pump_until(&mut app, |a| a.sessions.is_empty());
    assert!(gateway.calls().contains(&"delete c1".to_string()));
}

#[test]
fn oversized_attachment_never_reaches_the_gateway() {
    let gateway = MockGateway::new();
    let mut app = logged_in_app(gateway.clone());
    app.sessions.insert_created("c1");

    let path = std::env::temp_dir().join(format!("termchat-big-{}.pdf", std::process::id()));
    let file = std::fs::File::create(&path).unwrap();
    file.set_len(MAX_DOCUMENT_BYTES + 1).unwrap();

    app.input = format!("/attach {}", path.display());
    app.submit_current_line();
    std::fs::remove_file(&path).ok();

    assert!(gateway.calls().is_empty());
    assert!(app.notices.iter().any(|n| n.contains("10 MiB")));
    assert!(app
        .sessions
        .get("c1")
        .unwrap()
        .attached_documents
        .is_empty());
}

#[test]
fn attach_updates_documents_from_backend_list() {
    let gateway = MockGateway::new();
    let mut app = logged_in_app(gateway.clone());
    app.sessions.insert_created("c1");

    let path = std::env::temp_dir().join(format!("termchat-small-{}.pdf", std::process::id()));
    std::fs::write(&path, b"%PDF-1.4").unwrap();

    app.input = format!("/attach {}", path.display());
    app.submit_current_line();
    pump_until(&mut app, |a| {
        !a.sessions.get("c1").unwrap().attached_documents.is_empty()
    });
    std::fs::remove_file(&path).ok();

    let name = path.file_name().unwrap().to_str().unwrap().to_string();
    assert!(app
        .sessions
        .get("c1")
        .unwrap()
        .attached_documents
        .contains(&name));
    assert!(gateway.calls().contains(&"upload c1 1".to_string()));
}

#[test]
fn created_event_selects_the_new_chat() {
    let gateway = MockGateway::new();
    let mut app = logged_in_app(gateway);
    app.sessions.insert_created("old");

    app.tx
        .send(WorkerEvent::Created {
            id: "c9".to_string(),
            name: Some("New Chat c9".to_string()),
        })
        .unwrap();
    app.poll_worker();

    assert_eq!(app.sessions.active_id(), Some("c9"));
    assert_eq!(
        app.sessions.get("c9").unwrap().display_name(),
        "New Chat c9"
    );
}

#[test]
fn chat_labels_are_truncated_for_the_bar() {
    let mut conversation = Conversation::new("c1");
    conversation.name = Some("a very long conversation name indeed".to_string());
    let label = App::chat_label(&conversation);
    assert_eq!(label, "a very long conve...");
    assert_eq!(label.chars().count(), 20);

    conversation.name = Some("exactly twenty chars".to_string());
    assert_eq!(App::chat_label(&conversation), "exactly twenty chars");
}

#[test]
fn bold_markdown_renders_emphasized() {
    let gateway = MockGateway::new();
    let mut app = logged_in_app(gateway);
    app.sessions.insert_created("c1");
    seed_assistant(&mut app, "**bold** text", None);

    let (lines, _) = app.render_transcript(80);
    let plain = flatten_lines_to_plain(&lines);
    assert!(plain.iter().any(|l| l.contains("bold text")));
    assert!(!plain.iter().any(|l| l.contains("**")));
    let has_bold_span = lines.iter().flat_map(|l| l.spans.iter()).any(|s| {
        s.content.as_ref() == "bold" && s.style.add_modifier.contains(Modifier::BOLD)
    });
    assert!(has_bold_span);
}

#[test]
fn user_markup_stays_literal() {
    let gateway = MockGateway::new();
    let mut app = logged_in_app(gateway);
    app.sessions.insert_created("c1");
    app.sessions
        .begin_exchange("c1", "<script>x</script> and **not bold**")
        .unwrap();

    let (lines, _) = app.render_transcript(80);
    let plain = flatten_lines_to_plain(&lines);
    assert!(plain
        .iter()
        .any(|l| l.contains("<script>x</script> and **not bold**")));
}

#[test]
fn fence_alias_py_becomes_python() {
    let gateway = MockGateway::new();
    let mut app = logged_in_app(gateway);
    app.sessions.insert_created("c1");
    seed_assistant(&mut app, "```py\nprint(1)\n```", None);

    let (lines, snippets) = app.render_transcript(80);
    assert_eq!(snippets.len(), 1);
    assert_eq!(snippets[0].language, "python");
    assert_eq!(snippets[0].code, "print(1)");
    let plain = flatten_lines_to_plain(&lines);
    assert!(plain.iter().any(|l| l.contains("python") && l.contains("[1]")));
}

#[test]
fn language_aliases_normalize() {
    assert_eq!(normalize_language("py"), "python");
    assert_eq!(normalize_language("js"), "javascript");
    assert_eq!(normalize_language("html"), "markup");
    assert_eq!(normalize_language("markup"), "markup");
    assert_eq!(normalize_language(""), "plaintext");
    assert_eq!(normalize_language("Rust"), "rust");
}

#[test]
fn iframe_reply_bypasses_markdown() {
    let gateway = MockGateway::new();
    let mut app = logged_in_app(gateway);
    app.sessions.insert_created("c1");
    seed_assistant(&mut app, "<iframe src=\"https://example.com\"></iframe>", None);

    let (lines, snippets) = app.render_transcript(80);
    assert!(snippets.is_empty());
    let plain = flatten_lines_to_plain(&lines);
    let joined = plain.join("\n");
    assert!(joined.contains("<iframe src=\"https://example.com\"></iframe>"));
    assert!(joined.contains("embed"));
}

#[test]
fn reasoning_section_is_collapsed_by_default() {
    let gateway = MockGateway::new();
    let mut app = logged_in_app(gateway);
    app.sessions.insert_created("c1");
    seed_assistant(&mut app, "the answer", Some("step one\nstep two"));

    let (lines, _) = app.render_transcript(80);
    let plain = flatten_lines_to_plain(&lines).join("\n");
    assert!(plain.contains("show reasoning"));
    assert!(!plain.contains("step one"));

    app.toggle_latest_reasoning();
    let (lines, _) = app.render_transcript(80);
    let plain = flatten_lines_to_plain(&lines).join("\n");
    assert!(plain.contains("hide reasoning"));
    assert!(plain.contains("step one"));
    assert!(plain.contains("the answer"));
}

#[test]
fn pending_placeholder_animates_then_resolves_in_place() {
    let gateway = MockGateway::new();
    let mut app = logged_in_app(gateway);
    app.sessions.insert_created("c1");
    app.sessions.begin_exchange("c1", "hello").unwrap();

    let (lines, _) = app.render_transcript(80);
    let plain = flatten_lines_to_plain(&lines).join("\n");
    assert!(plain.contains(PENDING_FRAMES[0]));

    app.sessions
        .resolve_reply("c1", "done".to_string(), None)
        .unwrap();
    let (lines, _) = app.render_transcript(80);
    let plain = flatten_lines_to_plain(&lines).join("\n");
    assert!(plain.contains("done"));
    assert_eq!(app.sessions.get("c1").unwrap().messages.len(), 2);
}

#[test]
fn copy_marker_shows_then_expires() {
    let gateway = MockGateway::new();
    let mut app = logged_in_app(gateway);
    app.sessions.insert_created("c1");
    seed_assistant(&mut app, "```py\nprint(1)\n```", None);

    app.copied_snippet = Some(1);
    app.copied_at = Some(Instant::now());
    let (lines, _) = app.render_transcript(80);
    assert!(flatten_lines_to_plain(&lines)
        .iter()
        .any(|l| l.contains("copied!")));
    assert!(!app.expire_copy_feedback());

    app.copied_at = Instant::now().checked_sub(COPY_FEEDBACK_WINDOW);
    assert!(app.expire_copy_feedback());
    let (lines, _) = app.render_transcript(80);
    assert!(!flatten_lines_to_plain(&lines)
        .iter()
        .any(|l| l.contains("copied!")));
}

#[test]
fn detach_requires_known_document_and_confirmation() {
    let gateway = MockGateway::new();
    let mut app = logged_in_app(gateway.clone());
    app.sessions.insert_created("c1");
    app.sessions
        .set_attached("c1", vec!["notes.pdf".to_string()])
        .unwrap();

    app.input = "/detach missing.pdf".to_string();
    app.submit_current_line();
    assert!(matches!(app.mode, Mode::Normal));
    assert!(gateway.calls().is_empty());

    app.input = "/detach notes.pdf".to_string();
    app.submit_current_line();
    assert!(matches!(app.mode, Mode::Confirm));
    app.confirm_pending();
    pump_until(&mut app, |a| {
        a.sessions.get("c1").unwrap().attached_documents.is_empty()
    });
    assert!(gateway.calls().contains(&"remove c1 notes.pdf".to_string()));
}

#[test]
fn login_password_never_reaches_persisted_history() {
    let gateway = MockGateway::new();
    let store = Arc::new(MemoryCredentialStore::new(None));
    let config = Config {
        api_base: "http://unused".to_string(),
        state_dir: std::env::temp_dir().join(format!("termchat-hist-{}", std::process::id())),
    };
    let mut app = App::new(config.clone(), gateway, store);

    app.input = "/login alice hunter2".to_string();
    app.submit_current_line();
    assert!(app.history.is_empty());

    app.input = "/help".to_string();
    app.submit_current_line();
    app.persist_ui_state();

    let raw = std::fs::read_to_string(config.ui_state_path()).unwrap();
    assert!(!raw.contains("hunter2"));
    assert!(!raw.contains("/login"));
    assert!(raw.contains("/help"));
    std::fs::remove_dir_all(&config.state_dir).ok();
}

#[test]
fn command_args_honor_quoted_paths() {
    assert_eq!(
        split_command_args("\"my report.pdf\" plain.pdf"),
        vec!["my report.pdf", "plain.pdf"]
    );
    assert_eq!(split_command_args("  a.pdf   b.pdf "), vec!["a.pdf", "b.pdf"]);
    assert!(split_command_args("   ").is_empty());
}

#[test]
fn attach_accepts_quoted_path_with_spaces() {
    let gateway = MockGateway::new();
    let mut app = logged_in_app(gateway.clone());
    app.sessions.insert_created("c1");

    let path = std::env::temp_dir().join(format!("termchat quarterly {}.pdf", std::process::id()));
    std::fs::write(&path, b"%PDF-1.4").unwrap();

    app.input = format!("/attach \"{}\"", path.display());
    app.submit_current_line();
    pump_until(&mut app, |a| {
        !a.sessions.get("c1").unwrap().attached_documents.is_empty()
    });
    std::fs::remove_file(&path).ok();

    let name = path.file_name().unwrap().to_str().unwrap().to_string();
    assert!(app
        .sessions
        .get("c1")
        .unwrap()
        .attached_documents
        .contains(&name));
}

#[test]
fn blank_answer_keeps_its_reasoning_section() {
    let gateway = MockGateway::new();
    let mut app = logged_in_app(gateway);
    app.sessions.insert_created("c1");
    seed_assistant(&mut app, "", Some("worked through the steps"));

    let (lines, _) = app.render_transcript(80);
    let plain = flatten_lines_to_plain(&lines).join("\n");
    assert!(plain.contains("show reasoning"));

    app.toggle_latest_reasoning();
    let (lines, _) = app.render_transcript(80);
    let plain = flatten_lines_to_plain(&lines).join("\n");
    assert!(plain.contains("hide reasoning"));
    assert!(plain.contains("worked through the steps"));
}

#[test]
fn http_gateway_builds_against_config() {
    let store = Arc::new(MemoryCredentialStore::new(Some("t")));
    let config = test_config();
    assert!(HttpGateway::new(&config, store).is_ok());
}
