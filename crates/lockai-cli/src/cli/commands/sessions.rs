//! Session command handlers.

use anyhow::{Context, Result};
use lockai_core::chat::Role;
use lockai_core::store::sessions;

pub fn list() -> Result<()> {
    let sessions = sessions::list_sessions().context("list sessions")?;
    if sessions.is_empty() {
        println!("No sessions found.");
    } else {
        for summary in sessions {
            let modified = summary
                .modified
                .and_then(format_timestamp)
                .unwrap_or_else(|| "unknown".to_string());
            println!("{}  {}  {}", summary.display_title(), summary.id, modified);
        }
    }
    Ok(())
}

pub fn show(id: &str) -> Result<()> {
    let session = sessions::Session::with_id(id.to_string())
        .with_context(|| format!("open session '{id}'"))?;
    let messages = session
        .read_messages()
        .with_context(|| format!("read session '{id}'"))?;

    if messages.is_empty() {
        println!("Session '{id}' is empty or not found.");
        return Ok(());
    }

    for message in messages {
        let speaker = match message.role {
            Role::User => "用户",
            Role::Assistant => "助手",
        };
        println!("[{speaker}] {}", message.content);
        println!();
    }
    Ok(())
}

pub fn delete(id: &str) -> Result<()> {
    sessions::delete_session(id).with_context(|| format!("delete session '{id}'"))?;
    println!("Deleted session {id}");
    Ok(())
}

fn format_timestamp(time: std::time::SystemTime) -> Option<String> {
    let datetime: chrono::DateTime<chrono::Local> = time.into();
    Some(datetime.format("%Y-%m-%d %H:%M").to_string())
}
