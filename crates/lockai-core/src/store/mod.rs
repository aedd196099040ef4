//! Local persistence under `${LOCKAI_HOME}`: JSONL chat sessions and JSON
//! paper records.

pub mod records;
pub mod sessions;

pub use sessions::{Session, SessionSummary};
