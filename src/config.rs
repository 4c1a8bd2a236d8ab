use std::fs;
use std::path::{Path, PathBuf};

/// Runtime configuration, built once in main and passed into constructors.
#[derive(Clone, Debug)]
pub(crate) struct Config {
    pub(crate) api_base: String,
    pub(crate) state_dir: PathBuf,
}

const DEFAULT_API_BASE: &str = "http://127.0.0.1:5001";

impl Config {
    pub(crate) fn from_env() -> Self {
        let api_base = std::env::var("TERMCHAT_API_BASE")
            .ok()
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let state_dir = std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".termchat");
        Config {
            api_base,
            state_dir,
        }
    }

    pub(crate) fn token_path(&self) -> PathBuf {
        self.state_dir.join("token")
    }

    pub(crate) fn ui_state_path(&self) -> PathBuf {
        self.state_dir.join("client.json")
    }

    pub(crate) fn log_path(&self) -> PathBuf {
        self.state_dir.join("termchat.log")
    }
}

/// Where the bearer token lives. Injected so tests and alternative storage
/// backends never touch the real filesystem.
pub(crate) trait CredentialStore: Send + Sync {
    fn get(&self) -> Option<String>;
    fn set(&self, token: &str);
    fn clear(&self);
}

pub(crate) struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub(crate) fn new(path: PathBuf) -> Self {
        FileCredentialStore { path }
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> Option<String> {
        let raw = fs::read_to_string(&self.path).ok()?;
        let token = raw.trim().to_string();
        if token.is_empty() {
            None
        } else {
            Some(token)
        }
    }

    fn set(&self, token: &str) {
        if let Some(parent) = self.path.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                log::warn!("cannot create state dir {}: {err}", parent.display());
                return;
            }
        }
        if let Err(err) = fs::write(&self.path, token) {
            log::warn!("cannot persist token to {}: {err}", self.path.display());
        }
    }

    fn clear(&self) {
        if self.path.exists() {
            if let Err(err) = fs::remove_file(&self.path) {
                log::warn!("cannot remove token file {}: {err}", self.path.display());
            }
        }
    }
}

#[cfg(test)]
pub(crate) struct MemoryCredentialStore(std::sync::Mutex<Option<String>>);

#[cfg(test)]
impl MemoryCredentialStore {
    pub(crate) fn new(token: Option<&str>) -> Self {
        MemoryCredentialStore(std::sync::Mutex::new(token.map(str::to_string)))
    }
}

#[cfg(test)]
impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> Option<String> {
        self.0.lock().unwrap().clone()
    }

    fn set(&self, token: &str) {
        *self.0.lock().unwrap() = Some(token.to_string());
    }

    fn clear(&self) {
        *self.0.lock().unwrap() = None;
    }
}

pub(crate) fn ensure_state_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}
