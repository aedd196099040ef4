//! Chat session persistence.
//!
//! Each session is a JSONL file under `${LOCKAI_HOME}/sessions/` where each
//! line is one JSON object. The first line is a meta event carrying the
//! schema version and the (optional) AI-generated title.
//!
//! ```jsonl
//! { "type": "meta", "schema_version": 1, "ts": "2026-08-25T03:21:09Z" }
//! { "type": "message", "id": "...", "role": "user", "content": "...", "ts": "..." }
//! { "type": "message", "id": "...", "role": "assistant", "content": "...", "ts": "..." }
//! ```

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::time::SystemTime;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::{ChatMessage, Role};
use crate::paths::sessions_dir;

/// Current schema version for new session files.
pub const SCHEMA_VERSION: u32 = 1;

/// A persisted session event (polymorphic, tag-based).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Meta event: first line of a session file.
    Meta {
        schema_version: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        ts: DateTime<Utc>,
    },

    /// One chat message, user or assistant.
    Message {
        id: String,
        role: Role,
        content: String,
        ts: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// Creates a new meta event with the current schema version.
    pub fn meta() -> Self {
        Self::Meta {
            schema_version: SCHEMA_VERSION,
            title: None,
            ts: Utc::now(),
        }
    }

    /// Creates a message event from a chat message.
    pub fn message(message: &ChatMessage) -> Self {
        Self::Message {
            id: message.id.clone(),
            role: message.role,
            content: message.content.clone(),
            ts: message.timestamp,
        }
    }
}

fn normalize_title(title: impl Into<String>) -> Option<String> {
    let trimmed = title.into().trim().to_string();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

/// Returns a shortened session ID for display.
pub fn short_session_id(id: &str) -> String {
    if id.len() > 8 {
        format!("{}…", &id[..8])
    } else {
        id.to_string()
    }
}

/// Manages one session file.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    path: PathBuf,
    /// Whether this is a new session (needs the meta event written).
    is_new: bool,
}

impl Session {
    /// Returns the path to the session file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Guard to prevent session creation in tests without proper isolation.
    ///
    /// # Panics
    /// - In unit tests (`#[cfg(test)]`): panics if `LOCKAI_HOME` is not set
    /// - At runtime: panics if `LOCKAI_BLOCK_SESSION_WRITES=1` is set
    fn guard_session_creation() {
        #[cfg(test)]
        if std::env::var("LOCKAI_HOME").is_err() {
            panic!(
                "Tests must set LOCKAI_HOME to a temp directory!\n\
                 Session would be created in the user's home directory."
            );
        }

        #[cfg(not(test))]
        if std::env::var("LOCKAI_BLOCK_SESSION_WRITES").is_ok_and(|v| v == "1") {
            panic!(
                "LOCKAI_BLOCK_SESSION_WRITES=1 but trying to create a session!\n\
                 Set LOCKAI_HOME to a temp directory."
            );
        }
    }

    /// Creates a new session with a generated ID.
    ///
    /// # Errors
    /// Returns an error if the sessions directory cannot be created.
    pub fn new() -> Result<Self> {
        Self::with_id(uuid::Uuid::new_v4().to_string())
    }

    /// Creates or opens a session with a specific ID.
    ///
    /// # Errors
    /// Returns an error if the sessions directory cannot be created.
    pub fn with_id(id: String) -> Result<Self> {
        Self::guard_session_creation();

        let dir = sessions_dir();
        fs::create_dir_all(&dir).context("Failed to create sessions directory")?;

        let path = dir.join(format!("{id}.jsonl"));
        let is_new = !path.exists();

        Ok(Self { id, path, is_new })
    }

    fn ensure_meta(&mut self) -> Result<()> {
        if self.is_new {
            self.append_raw(&SessionEvent::meta())?;
            self.is_new = false;
        }
        Ok(())
    }

    fn append_raw(&self, event: &SessionEvent) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context("Failed to open session file")?;

        let json = serde_json::to_string(event).context("Failed to serialize event")?;
        writeln!(file, "{json}").context("Failed to write to session file")?;

        Ok(())
    }

    /// Appends a chat message to the session file.
    ///
    /// For new sessions, automatically writes the meta event first.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn append_message(&mut self, message: &ChatMessage) -> Result<()> {
        self.ensure_meta()?;
        self.append_raw(&SessionEvent::message(message))
    }

    /// Reads all events from the session file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read.
    pub fn read_events(&self) -> Result<Vec<SessionEvent>> {
        read_session_events(&self.path)
    }

    /// Reads the persisted conversation as chat messages.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read.
    pub fn read_messages(&self) -> Result<Vec<ChatMessage>> {
        let messages = self
            .read_events()?
            .into_iter()
            .filter_map(|event| match event {
                SessionEvent::Message {
                    id,
                    role,
                    content,
                    ts,
                } => Some(ChatMessage {
                    id,
                    role,
                    content,
                    timestamp: ts,
                }),
                SessionEvent::Meta { .. } => None,
            })
            .collect();
        Ok(messages)
    }

    /// Updates the session title stored in the meta event.
    ///
    /// Writes the meta line with the provided title (or clears it if
    /// None/empty), preserving all subsequent events. The update is atomic
    /// via write-to-temp-then-rename.
    ///
    /// # Errors
    /// Returns an error if the rewrite fails.
    pub fn set_title(&mut self, title: Option<String>) -> Result<Option<String>> {
        self.ensure_meta()?;
        let normalized = title.and_then(normalize_title);
        rewrite_meta_with_title(&self.path, normalized.clone())?;
        Ok(normalized)
    }
}

fn read_session_events(path: &PathBuf) -> Result<Vec<SessionEvent>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = fs::File::open(path).context("Failed to open session file")?;
    let reader = BufReader::new(file);
    let mut events = Vec::new();

    for line in reader.lines() {
        let line = line.context("Failed to read line")?;
        if line.trim().is_empty() {
            continue;
        }

        if let Ok(event) = serde_json::from_str::<SessionEvent>(&line) {
            events.push(event);
        }
        // Skip unparseable lines (best-effort)
    }

    Ok(events)
}

/// Rewrites the meta event with an updated title, preserving the rest of the
/// file.
fn rewrite_meta_with_title(path: &PathBuf, title: Option<String>) -> Result<()> {
    let file = fs::File::open(path).context("Failed to open session file")?;
    let reader = BufReader::new(file);

    let temp_path = path.with_extension("jsonl.tmp");
    let mut temp = fs::File::create(&temp_path).context("Failed to create temp session file")?;

    let mut lines = reader.lines();
    let first_line = lines
        .next()
        .transpose()
        .context("Failed to read meta line")?
        .ok_or_else(|| anyhow!("Session file is empty"))?;

    let mut meta_event: SessionEvent =
        serde_json::from_str(&first_line).context("Failed to parse meta event")?;
    match meta_event {
        SessionEvent::Meta {
            title: ref mut meta_title,
            ..
        } => {
            *meta_title = title;
        }
        SessionEvent::Message { .. } => bail!("First session event is not a meta event"),
    }

    let new_meta =
        serde_json::to_string(&meta_event).context("Failed to serialize updated meta event")?;
    writeln!(temp, "{new_meta}").context("Failed to write updated meta")?;

    for line in lines {
        let line = line.context("Failed to read session line")?;
        writeln!(temp, "{line}").context("Failed to write session line")?;
    }

    temp.sync_all()
        .context("Failed to sync temp session file")?;
    fs::rename(&temp_path, path).context("Failed to replace session file")?;
    Ok(())
}

/// Reads only the meta line to extract the title.
fn read_meta_title(path: &PathBuf) -> Option<String> {
    let file = fs::File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let mut first_line = String::new();

    loop {
        first_line.clear();
        let bytes = reader.read_line(&mut first_line).ok()?;
        if bytes == 0 {
            return None;
        }
        if !first_line.trim().is_empty() {
            break;
        }
    }

    match serde_json::from_str::<SessionEvent>(&first_line) {
        Ok(SessionEvent::Meta { title, .. }) => title,
        _ => None,
    }
}

/// Summary information about a saved session.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: String,
    pub title: Option<String>,
    pub modified: Option<SystemTime>,
}

impl SessionSummary {
    /// Returns a display-friendly title (or short ID fallback).
    pub fn display_title(&self) -> String {
        self.title
            .clone()
            .unwrap_or_else(|| short_session_id(&self.id))
    }
}

/// Lists all saved sessions, newest first.
///
/// # Errors
/// Returns an error if the sessions directory cannot be read.
pub fn list_sessions() -> Result<Vec<SessionSummary>> {
    let dir = sessions_dir();

    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut sessions = Vec::new();

    for entry in fs::read_dir(&dir).context("Failed to read sessions directory")? {
        let entry = entry.context("Failed to read directory entry")?;
        let path = entry.path();

        if path.extension().is_some_and(|ext| ext == "jsonl")
            && let Some(stem) = path.file_stem()
        {
            let id = stem.to_string_lossy().to_string();
            let modified = entry.metadata().ok().and_then(|m| m.modified().ok());
            let title = read_meta_title(&path);

            sessions.push(SessionSummary {
                id,
                title,
                modified,
            });
        }
    }

    sessions.sort_by(|a, b| b.modified.cmp(&a.modified));

    Ok(sessions)
}

/// Deletes a session file by ID. Deleting a missing session is a no-op.
///
/// # Errors
/// Returns an error if the file exists but cannot be removed.
pub fn delete_session(id: &str) -> Result<()> {
    let path = sessions_dir().join(format!("{id}.jsonl"));
    if !path.exists() {
        return Ok(());
    }
    fs::remove_file(&path)
        .with_context(|| format!("Failed to delete session file: {}", path.display()))
}
