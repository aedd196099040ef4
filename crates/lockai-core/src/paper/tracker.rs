//! Paper generation tracker.
//!
//! Reduces [`PaperEvent`]s and polled status snapshots into the progress
//! state shown to the user. Revision failures return to `Completed` with an
//! inline error so a previously generated PDF is never discarded.

use super::{PaperEvent, PaperStatus, PaperStatusSnapshot, stage_position};

/// Lifecycle phase of the active paper record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperPhase {
    Idle,
    Generating,
    /// Generation semantics scoped to an existing completed record.
    Revising,
    Completed,
    Errored,
}

/// Result of applying a polled status snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// Non-terminal status applied; keep polling.
    Progressed,
    /// Record completed; stop polling.
    Completed,
    /// Record failed; stop polling.
    Failed,
    /// Snapshot discarded (stale record id or already-terminal phase).
    Ignored,
}

impl SnapshotOutcome {
    /// Returns true if polling should stop after this outcome.
    pub fn stops_polling(self) -> bool {
        !matches!(self, SnapshotOutcome::Progressed)
    }
}

/// State machine tracking one paper generation or revision.
#[derive(Debug, Clone)]
pub struct PaperTracker {
    phase: PaperPhase,
    active_id: Option<String>,
    stage: String,
    stage_index: Option<usize>,
    detail: String,
    pdf_url: Option<String>,
    error: Option<String>,
    revision_error: Option<String>,
}

impl Default for PaperTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PaperTracker {
    pub fn new() -> Self {
        Self {
            phase: PaperPhase::Idle,
            active_id: None,
            stage: String::new(),
            stage_index: None,
            detail: String::new(),
            pdf_url: None,
            error: None,
            revision_error: None,
        }
    }

    pub fn phase(&self) -> PaperPhase {
        self.phase
    }

    /// The record id all incoming updates are matched against.
    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    /// Current stage string, verbatim from the server.
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Position of the last known stage in the pipeline, for progress
    /// display. Unknown stages leave this untouched.
    pub fn stage_index(&self) -> Option<usize> {
        self.stage_index
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn pdf_url(&self) -> Option<&str> {
        self.pdf_url.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Error from a failed revision attempt; the record stays `Completed`.
    pub fn revision_error(&self) -> Option<&str> {
        self.revision_error.as_deref()
    }

    /// Returns true while a generation or revision is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(self.phase, PaperPhase::Generating | PaperPhase::Revising)
    }

    /// Starts tracking a new generation. The record id arrives later via
    /// `session_created`.
    pub fn begin_generation(&mut self) {
        *self = Self::new();
        self.phase = PaperPhase::Generating;
    }

    /// Adopts the server-assigned record id as the active record.
    pub fn adopt_record(&mut self, id: impl Into<String>) {
        self.active_id = Some(id.into());
    }

    /// Re-enters generating semantics scoped to an existing record.
    pub fn begin_revision(&mut self, id: impl Into<String>, pdf_url: Option<String>) {
        self.phase = PaperPhase::Revising;
        self.active_id = Some(id.into());
        self.stage.clear();
        self.stage_index = None;
        self.detail.clear();
        self.error = None;
        self.revision_error = None;
        if pdf_url.is_some() {
            self.pdf_url = pdf_url;
        }
    }

    /// Resumes tracking an in-flight record (reload/sidebar selection).
    ///
    /// The caller is responsible for not resuming terminal records.
    pub fn resume(&mut self, id: impl Into<String>, status: &PaperStatus, detail: Option<&str>) {
        *self = Self::new();
        self.phase = PaperPhase::Generating;
        self.active_id = Some(id.into());
        self.apply_progress(status.as_str().to_string(), detail.unwrap_or("").to_string());
    }

    /// Clears the tracker (active record deselected or deleted).
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Applies one decoded stream event.
    ///
    /// Events carrying a record id for a different record are discarded.
    pub fn apply(&mut self, event: PaperEvent) {
        if matches!(self.phase, PaperPhase::Completed | PaperPhase::Errored)
            && !matches!(event, PaperEvent::SessionCreated { .. })
        {
            tracing::trace!(?event, "ignoring paper event after termination");
            return;
        }

        match event {
            PaperEvent::SessionCreated { session_id } => {
                self.adopt_record(session_id);
            }
            PaperEvent::Progress { stage, detail } => {
                self.apply_progress(stage, detail);
            }
            PaperEvent::Completed {
                pdf_url,
                session_id,
            } => {
                if self.is_stale(session_id.as_deref()) {
                    return;
                }
                self.complete(pdf_url);
            }
            PaperEvent::Error {
                message,
                session_id,
            } => {
                if self.is_stale(session_id.as_deref()) {
                    return;
                }
                self.fail(message);
            }
        }
    }

    /// Applies a polled status snapshot for `record_id`.
    pub fn apply_snapshot(
        &mut self,
        record_id: &str,
        snapshot: &PaperStatusSnapshot,
    ) -> SnapshotOutcome {
        if self.active_id() != Some(record_id) {
            return SnapshotOutcome::Ignored;
        }
        if matches!(self.phase, PaperPhase::Completed | PaperPhase::Errored) {
            // Never regress a terminal record to an earlier status.
            return SnapshotOutcome::Ignored;
        }

        match &snapshot.status {
            PaperStatus::Completed => {
                self.complete(snapshot.pdf_url.clone());
                SnapshotOutcome::Completed
            }
            PaperStatus::Failed => {
                self.fail(
                    snapshot
                        .error
                        .clone()
                        .unwrap_or_else(|| "生成失败".to_string()),
                );
                SnapshotOutcome::Failed
            }
            status => {
                self.apply_progress(
                    status.as_str().to_string(),
                    snapshot.progress_detail.clone().unwrap_or_default(),
                );
                SnapshotOutcome::Progressed
            }
        }
    }

    fn apply_progress(&mut self, stage: String, detail: String) {
        if let Some(index) = stage_position(&stage) {
            self.stage_index = Some(index);
        }
        // Unknown stages display verbatim without moving the progress bar.
        self.stage = stage;
        self.detail = detail;
    }

    fn complete(&mut self, pdf_url: Option<String>) {
        if pdf_url.is_some() {
            self.pdf_url = pdf_url;
        }
        self.phase = PaperPhase::Completed;
        self.error = None;
        self.revision_error = None;
    }

    fn fail(&mut self, message: String) {
        if self.phase == PaperPhase::Revising {
            // A failed revision must not discard the existing document.
            self.phase = PaperPhase::Completed;
            self.revision_error = Some(message);
        } else {
            self.phase = PaperPhase::Errored;
            self.error = Some(message);
        }
    }

    fn is_stale(&self, event_id: Option<&str>) -> bool {
        match (event_id, self.active_id()) {
            (Some(event_id), Some(active)) if event_id != active => {
                tracing::debug!(event_id, active, "discarding event for inactive record");
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(stage: &str, detail: &str) -> PaperEvent {
        PaperEvent::Progress {
            stage: stage.to_string(),
            detail: detail.to_string(),
        }
    }

    #[test]
    fn test_full_generation_scenario() {
        let mut tracker = PaperTracker::new();
        tracker.begin_generation();
        tracker.apply(PaperEvent::SessionCreated {
            session_id: "42".to_string(),
        });
        assert_eq!(tracker.active_id(), Some("42"));

        tracker.apply(progress("researching", "检索文献..."));
        assert_eq!(tracker.stage_index(), Some(0));

        tracker.apply(progress("writing", "撰写第 2 节"));
        assert_eq!(tracker.stage_index(), Some(2));

        tracker.apply(PaperEvent::Completed {
            pdf_url: Some("u".to_string()),
            session_id: Some("42".to_string()),
        });
        assert_eq!(tracker.phase(), PaperPhase::Completed);
        assert_eq!(tracker.pdf_url(), Some("u"));
    }

    #[test]
    fn test_unknown_stage_preserved_without_reordering() {
        let mut tracker = PaperTracker::new();
        tracker.begin_generation();
        tracker.apply(progress("formatting", ""));
        assert_eq!(tracker.stage_index(), Some(3));

        tracker.apply(progress("revising", "正在按要求修改..."));
        assert_eq!(tracker.stage(), "revising");
        assert_eq!(tracker.detail(), "正在按要求修改...");
        // Progress position unchanged by the unknown stage.
        assert_eq!(tracker.stage_index(), Some(3));
    }

    #[test]
    fn test_revision_failure_returns_to_completed() {
        let mut tracker = PaperTracker::new();
        tracker.begin_revision("42", Some("u".to_string()));
        assert_eq!(tracker.phase(), PaperPhase::Revising);

        tracker.apply(PaperEvent::Error {
            message: "未能执行修改".to_string(),
            session_id: Some("42".to_string()),
        });
        assert_eq!(tracker.phase(), PaperPhase::Completed);
        assert_eq!(tracker.revision_error(), Some("未能执行修改"));
        assert_eq!(tracker.pdf_url(), Some("u"));
        assert!(tracker.error().is_none());
    }

    #[test]
    fn test_generation_failure_is_terminal() {
        let mut tracker = PaperTracker::new();
        tracker.begin_generation();
        tracker.apply(PaperEvent::SessionCreated {
            session_id: "42".to_string(),
        });
        tracker.apply(PaperEvent::Error {
            message: "compiling 阶段失败".to_string(),
            session_id: Some("42".to_string()),
        });
        assert_eq!(tracker.phase(), PaperPhase::Errored);

        // Late progress after termination is a no-op.
        tracker.apply(progress("compiling", "late"));
        assert_eq!(tracker.phase(), PaperPhase::Errored);
        assert_ne!(tracker.detail(), "late");
    }

    #[test]
    fn test_events_for_other_records_are_discarded() {
        let mut tracker = PaperTracker::new();
        tracker.begin_generation();
        tracker.adopt_record("42");
        tracker.apply(PaperEvent::Completed {
            pdf_url: Some("other".to_string()),
            session_id: Some("99".to_string()),
        });
        assert_eq!(tracker.phase(), PaperPhase::Generating);
        assert!(tracker.pdf_url().is_none());
    }

    #[test]
    fn test_snapshot_progress_and_completion() {
        let mut tracker = PaperTracker::new();
        tracker.resume("42", &PaperStatus::Writing, Some("撰写中"));
        assert_eq!(tracker.phase(), PaperPhase::Generating);
        assert_eq!(tracker.stage_index(), Some(2));

        let outcome = tracker.apply_snapshot(
            "42",
            &PaperStatusSnapshot {
                status: PaperStatus::Compiling,
                progress_detail: Some("正在编译 PDF...".to_string()),
                pdf_url: None,
                error: None,
            },
        );
        assert_eq!(outcome, SnapshotOutcome::Progressed);
        assert!(!outcome.stops_polling());

        let outcome = tracker.apply_snapshot(
            "42",
            &PaperStatusSnapshot {
                status: PaperStatus::Completed,
                progress_detail: None,
                pdf_url: Some("u".to_string()),
                error: None,
            },
        );
        assert_eq!(outcome, SnapshotOutcome::Completed);
        assert!(outcome.stops_polling());
        assert_eq!(tracker.phase(), PaperPhase::Completed);
        assert_eq!(tracker.pdf_url(), Some("u"));
    }

    #[test]
    fn test_snapshot_never_regresses_terminal_state() {
        let mut tracker = PaperTracker::new();
        tracker.resume("42", &PaperStatus::Writing, None);
        tracker.apply_snapshot(
            "42",
            &PaperStatusSnapshot {
                status: PaperStatus::Completed,
                progress_detail: None,
                pdf_url: Some("u".to_string()),
                error: None,
            },
        );

        let outcome = tracker.apply_snapshot(
            "42",
            &PaperStatusSnapshot {
                status: PaperStatus::Writing,
                progress_detail: Some("stale".to_string()),
                pdf_url: None,
                error: None,
            },
        );
        assert_eq!(outcome, SnapshotOutcome::Ignored);
        assert_eq!(tracker.phase(), PaperPhase::Completed);
        assert_eq!(tracker.pdf_url(), Some("u"));
    }

    #[test]
    fn test_snapshot_for_stale_record_is_ignored() {
        let mut tracker = PaperTracker::new();
        tracker.resume("42", &PaperStatus::Writing, None);

        let outcome = tracker.apply_snapshot(
            "99",
            &PaperStatusSnapshot {
                status: PaperStatus::Completed,
                progress_detail: None,
                pdf_url: Some("wrong".to_string()),
                error: None,
            },
        );
        assert_eq!(outcome, SnapshotOutcome::Ignored);
        assert_eq!(tracker.phase(), PaperPhase::Generating);
        assert!(tracker.pdf_url().is_none());
    }
}
