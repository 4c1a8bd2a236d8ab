use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::app::{Conversation, Message, Role};
use crate::config::{Config, CredentialStore};

#[derive(Debug, Error)]
pub(crate) enum GatewayError {
    /// The backend rejected the token. The caller must force logout and
    /// never retry the request.
    #[error("session expired")]
    Unauthorized,
    #[error("{0}")]
    Api(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed server payload: {0}")]
    MalformedPayload(String),
}

#[derive(Clone, Debug)]
pub(crate) struct ConversationSummary {
    pub(crate) id: String,
    pub(crate) name: Option<String>,
}

#[derive(Clone, Debug)]
pub(crate) struct Reply {
    pub(crate) content: String,
    pub(crate) reasoning: Option<String>,
}

pub(crate) struct DocumentUpload {
    pub(crate) filename: String,
    pub(crate) bytes: Vec<u8>,
}

/// Seam between the App and the chat backend. Worker threads hold it as
/// `Arc<dyn Gateway>`; tests substitute a mock.
pub(crate) trait Gateway: Send + Sync {
    fn login(&self, username: &str, password: &str) -> Result<String, GatewayError>;
    fn logout(&self) -> Result<(), GatewayError>;
    fn check_login(&self) -> Result<bool, GatewayError>;
    fn list_conversations(&self) -> Result<Vec<ConversationSummary>, GatewayError>;
    fn get_conversation(&self, id: &str) -> Result<Conversation, GatewayError>;
    fn create_conversation(&self) -> Result<ConversationSummary, GatewayError>;
    fn rename_conversation(&self, id: &str, name: &str) -> Result<(), GatewayError>;
    fn delete_conversation(&self, id: &str) -> Result<(), GatewayError>;
    fn send_message(
        &self,
        id: &str,
        text: &str,
        use_reasoning: bool,
    ) -> Result<Reply, GatewayError>;
    fn upload_documents(
        &self,
        id: &str,
        files: Vec<DocumentUpload>,
    ) -> Result<Vec<String>, GatewayError>;
    fn remove_document(&self, id: &str, filename: &str) -> Result<(), GatewayError>;
}

pub(crate) struct HttpGateway {
    base: String,
    http: Client,
    credentials: Arc<dyn CredentialStore>,
}

impl HttpGateway {
    pub(crate) fn new(
        config: &Config,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, GatewayError> {
        // No request timeout: a chat completion can legitimately take
        // minutes, and a hung request only pins its pending placeholder.
        let http = Client::builder()
            .timeout(None::<Duration>)
            .build()?;
        Ok(HttpGateway {
            base: config.api_base.clone(),
            http,
            credentials,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.credentials.get() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Maps 401 to `Unauthorized` and any other non-success status to
    /// `Api` carrying the server's `error` field when it has one.
    fn expect_ok(response: Response) -> Result<Response, GatewayError> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(GatewayError::Unauthorized);
        }
        if !status.is_success() {
            let message = response
                .json::<Value>()
                .ok()
                .and_then(|body| {
                    body.get("error")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(GatewayError::Api(message));
        }
        Ok(response)
    }

    fn get_json(&self, path: &str) -> Result<Value, GatewayError> {
        let response = self.authorize(self.http.get(self.url(path))).send()?;
        Ok(Self::expect_ok(response)?.json()?)
    }
}

impl Gateway for HttpGateway {
    fn login(&self, username: &str, password: &str) -> Result<String, GatewayError> {
        let response = self
            .http
            .post(self.url("/api/login"))
            .json(&serde_json::json!({
                "username": username,
                "password": password,
            }))
            .send()?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            // Bad credentials, not an expired session.
            return Err(GatewayError::Api("invalid username or password".into()));
        }
        let body: Value = Self::expect_ok(response)?.json()?;
        body.get("token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| GatewayError::MalformedPayload("login response missing token".into()))
    }

    fn logout(&self) -> Result<(), GatewayError> {
        let response = self.authorize(self.http.post(self.url("/api/logout"))).send()?;
        Self::expect_ok(response)?;
        Ok(())
    }

    fn check_login(&self) -> Result<bool, GatewayError> {
        let response = self
            .authorize(self.http.get(self.url("/api/check-login")))
            .send()?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(false);
        }
        let body: Value = Self::expect_ok(response)?.json()?;
        Ok(body
            .get("logged_in")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    fn list_conversations(&self) -> Result<Vec<ConversationSummary>, GatewayError> {
        let body = self.get_json("/api/chats")?;
        let entries = body
            .as_array()
            .ok_or_else(|| GatewayError::MalformedPayload("chat list is not an array".into()))?;
        let mut summaries = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(id) = entry.get("id").and_then(Value::as_str) else {
                log::warn!("skipping chat list entry without id: {entry}");
                continue;
            };
            summaries.push(ConversationSummary {
                id: id.to_string(),
                name: entry
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            });
        }
        Ok(summaries)
    }

    fn get_conversation(&self, id: &str) -> Result<Conversation, GatewayError> {
        let body = self.get_json(&format!("/api/chats/{id}"))?;
        let mut conversation = Conversation::new(id);
        conversation.name = body
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string);
        conversation.messages = decode_messages(body.get("messages"))?;
        conversation.attached_documents = decode_string_list(body.get("uploaded_pdfs"))
            .into_iter()
            .collect();
        Ok(conversation)
    }

    fn create_conversation(&self) -> Result<ConversationSummary, GatewayError> {
        let response = self.authorize(self.http.post(self.url("/api/chats"))).send()?;
        let body: Value = Self::expect_ok(response)?.json()?;
        let id = body
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::MalformedPayload("create response missing id".into()))?;
        Ok(ConversationSummary {
            id: id.to_string(),
            name: body
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    fn rename_conversation(&self, id: &str, name: &str) -> Result<(), GatewayError> {
        let response = self
            .authorize(self.http.put(self.url(&format!("/api/chats/{id}"))))
            .json(&serde_json::json!({ "name": name }))
            .send()?;
        Self::expect_ok(response)?;
        Ok(())
    }

    fn delete_conversation(&self, id: &str) -> Result<(), GatewayError> {
        let response = self
            .authorize(self.http.delete(self.url(&format!("/api/chats/{id}"))))
            .send()?;
        Self::expect_ok(response)?;
        Ok(())
    }

    fn send_message(
        &self,
        id: &str,
        text: &str,
        use_reasoning: bool,
    ) -> Result<Reply, GatewayError> {
        let mut form = Form::new().text("message", text.to_string());
        if use_reasoning {
            form = form.text("use_reasoning", "true");
        }
        let response = self
            .authorize(self.http.post(self.url(&format!("/api/chats/{id}/messages"))))
            .multipart(form)
            .send()?;
        let body: Value = Self::expect_ok(response)?.json()?;
        let content = body
            .get("response")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                GatewayError::MalformedPayload("chat response missing response field".into())
            })?
            .to_string();
        let reasoning = body
            .get("reasoning")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Reply { content, reasoning })
    }

    fn upload_documents(
        &self,
        id: &str,
        files: Vec<DocumentUpload>,
    ) -> Result<Vec<String>, GatewayError> {
        let mut form = Form::new();
        for file in files {
            let part = Part::bytes(file.bytes)
                .file_name(file.filename)
                .mime_str("application/pdf")?;
            form = form.part("pdfs", part);
        }
        let response = self
            .authorize(
                self.http
                    .post(self.url(&format!("/api/chats/{id}/upload-pdfs"))),
            )
            .multipart(form)
            .send()?;
        let body: Value = Self::expect_ok(response)?.json()?;
        if body.get("uploaded_pdfs").is_none() {
            return Err(GatewayError::MalformedPayload(
                "upload response missing uploaded_pdfs".into(),
            ));
        }
        Ok(decode_string_list(body.get("uploaded_pdfs")))
    }

    fn remove_document(&self, id: &str, filename: &str) -> Result<(), GatewayError> {
        let response = self
            .authorize(
                self.http
                    .post(self.url(&format!("/api/chats/{id}/remove-pdf"))),
            )
            .json(&serde_json::json!({ "pdf_name": filename }))
            .send()?;
        Self::expect_ok(response)?;
        Ok(())
    }
}

/// Absent list means an empty conversation; present but non-array is a
/// payload error. Entries missing role or content are skipped with a
/// warning rather than failing the whole conversation.
fn decode_messages(value: Option<&Value>) -> Result<Vec<Message>, GatewayError> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    let entries = value
        .as_array()
        .ok_or_else(|| GatewayError::MalformedPayload("messages is not an array".into()))?;
    let mut messages = Vec::with_capacity(entries.len());
    for entry in entries {
        let role = entry
            .get("role")
            .and_then(Value::as_str)
            .and_then(Role::parse);
        let content = entry.get("content").and_then(Value::as_str);
        match (role, content) {
            (Some(Role::User), Some(content)) => messages.push(Message::user(content)),
            (Some(Role::Assistant), Some(content)) => {
                let reasoning = entry
                    .get("reasoning")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                messages.push(Message::assistant(content, reasoning));
            }
            _ => log::warn!("skipping malformed message entry: {entry}"),
        }
    }
    Ok(messages)
}

fn decode_string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
