//! Paper record persistence.
//!
//! Each record is one JSON document under `${LOCKAI_HOME}/papers/`, keyed by
//! record id. Records hold the last known status so an in-flight generation
//! can be resumed after a restart.

use std::fs;

use anyhow::{Context, Result};

use crate::paper::PaperRecord;
use crate::paths::papers_dir;

fn guard_record_writes() {
    #[cfg(test)]
    if std::env::var("LOCKAI_HOME").is_err() {
        panic!(
            "Tests must set LOCKAI_HOME to a temp directory!\n\
             Paper record would be written to the user's home directory."
        );
    }

    #[cfg(not(test))]
    if std::env::var("LOCKAI_BLOCK_SESSION_WRITES").is_ok_and(|v| v == "1") {
        panic!(
            "LOCKAI_BLOCK_SESSION_WRITES=1 but trying to write a paper record!\n\
             Set LOCKAI_HOME to a temp directory."
        );
    }
}

/// Writes a record, replacing any existing record with the same id.
///
/// # Errors
/// Returns an error if the directory or file cannot be written.
pub fn save_record(record: &PaperRecord) -> Result<()> {
    guard_record_writes();

    let dir = papers_dir();
    fs::create_dir_all(&dir).context("Failed to create papers directory")?;

    let path = dir.join(format!("{}.json", record.id));
    let json = serde_json::to_string_pretty(record).context("Failed to serialize paper record")?;
    fs::write(&path, json)
        .with_context(|| format!("Failed to write paper record: {}", path.display()))
}

/// Loads a record by id, or `None` if it does not exist.
///
/// # Errors
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_record(id: &str) -> Result<Option<PaperRecord>> {
    let path = papers_dir().join(format!("{id}.json"));
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read paper record: {}", path.display()))?;
    let record = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse paper record: {}", path.display()))?;
    Ok(Some(record))
}

/// Lists all records, newest first.
///
/// Unparseable files are skipped with a warning.
///
/// # Errors
/// Returns an error if the papers directory cannot be read.
pub fn list_records() -> Result<Vec<PaperRecord>> {
    let dir = papers_dir();
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for entry in fs::read_dir(&dir).context("Failed to read papers directory")? {
        let entry = entry.context("Failed to read directory entry")?;
        let path = entry.path();
        if path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }

        match fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|contents| Ok(serde_json::from_str::<PaperRecord>(&contents)?))
        {
            Ok(record) => records.push(record),
            Err(err) => {
                tracing::warn!(path = %path.display(), "skipping unreadable paper record: {err:#}");
            }
        }
    }

    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(records)
}

/// Deletes a record by id. Deleting a missing record is a no-op.
///
/// # Errors
/// Returns an error if the file exists but cannot be removed.
pub fn delete_record(id: &str) -> Result<()> {
    let path = papers_dir().join(format!("{id}.json"));
    if !path.exists() {
        return Ok(());
    }
    fs::remove_file(&path)
        .with_context(|| format!("Failed to delete paper record: {}", path.display()))
}
