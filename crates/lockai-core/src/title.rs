//! Session title generation from the first exchange.
//!
//! The server produces a short title from the first user/assistant pair; the
//! raw output is sanitized before it is written to the session meta line.

use anyhow::{Result, anyhow};

use crate::api::ApiClient;

/// Generates and sanitizes a title for a session's first exchange.
///
/// # Errors
/// Returns an error if the request fails or the title is empty after
/// sanitization.
pub async fn generate_title(
    api: &ApiClient,
    session_id: &str,
    user_message: &str,
    assistant_message: &str,
) -> Result<String> {
    let raw = api
        .generate_title(session_id, user_message, assistant_message)
        .await?;
    sanitize_title(&raw)
}

fn sanitize_title(raw: &str) -> Result<String> {
    let mut line = raw
        .lines()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| anyhow!("Empty title generated"))?
        .trim()
        .to_string();

    for prefix in ["title:", "Title:", "标题:", "标题："] {
        if let Some(rest) = line.strip_prefix(prefix) {
            line = rest.trim().to_string();
            break;
        }
    }

    let trimmed = line
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '「' || c == '」')
        .trim()
        .to_string();

    if trimmed.is_empty() {
        Err(anyhow!("Title is empty after sanitization"))
    } else {
        Ok(trimmed)
    }
}
