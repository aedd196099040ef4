//! Chat exchange reducer.
//!
//! Consumes decoded [`ChatEvent`]s in arrival order and produces the evolving
//! transient UI state plus the final composed assistant message. Search and
//! drawing indicators are advisory overlays: a later non-blank content delta
//! always clears them.

use super::events::ChatEvent;

/// Maximum number of keywords kept in the rolling search window.
pub const KEYWORD_WINDOW: usize = 6;

/// Fallback error message when the server sends an empty error event.
pub const DEFAULT_ERROR_MESSAGE: &str = "发送消息失败";

/// Markdown alt text for generated images appended on `done`.
const IMAGE_ALT_TEXT: &str = "生成的图片";

/// Lifecycle phase of one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No exchange in flight.
    Idle,
    /// Request sent, no event received yet.
    Sending,
    /// At least one event received, stream still open.
    Streaming,
    /// Terminated by `done`.
    Done,
    /// Terminated by `error` (explicit, decode, or transport).
    Errored,
}

/// State machine for a single user/assistant exchange.
///
/// Transient state is reset by [`Exchange::begin`] and cleared again when the
/// exchange terminates; only the composed final content (or the error)
/// survives termination.
#[derive(Debug, Clone)]
pub struct Exchange {
    phase: Phase,
    text: String,
    searching: bool,
    search_query: String,
    keywords: Vec<String>,
    drawing: bool,
    drawing_prompt: String,
    images: Vec<String>,
    error: Option<String>,
    final_content: Option<String>,
}

impl Default for Exchange {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            text: String::new(),
            searching: false,
            search_query: String::new(),
            keywords: Vec::new(),
            drawing: false,
            drawing_prompt: String::new(),
            images: Vec::new(),
            error: None,
            final_content: None,
        }
    }
}

impl Exchange {
    /// Starts a fresh exchange in the `Sending` phase.
    pub fn begin() -> Self {
        Self {
            phase: Phase::Sending,
            ..Self::default()
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns true once `done` or `error` has been applied.
    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, Phase::Done | Phase::Errored)
    }

    /// Accumulated streamed text so far.
    pub fn streaming_text(&self) -> &str {
        &self.text
    }

    pub fn is_searching(&self) -> bool {
        self.searching
    }

    pub fn search_query(&self) -> &str {
        &self.search_query
    }

    /// Rolling keyword window: at most [`KEYWORD_WINDOW`] entries, no
    /// duplicates, first-appearance order preserved among retained entries.
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    pub fn drawing_prompt(&self) -> &str {
        &self.drawing_prompt
    }

    /// Generated image URLs in arrival order.
    pub fn images(&self) -> &[String] {
        &self.images
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// The composed final message, present only after `done`.
    pub fn final_content(&self) -> Option<&str> {
        self.final_content.as_deref()
    }

    /// Returns the final content to persist, if any.
    ///
    /// The assistant message is persisted iff `done` was received with
    /// non-empty composed content; never after `error`.
    pub fn content_to_persist(&self) -> Option<&str> {
        self.final_content().filter(|c| !c.is_empty())
    }

    /// Applies one decoded event.
    ///
    /// Events arriving after termination are no-ops.
    pub fn apply(&mut self, event: ChatEvent) {
        if self.is_terminal() {
            tracing::trace!(?event, "ignoring event after exchange termination");
            return;
        }

        match event {
            ChatEvent::Content { content } => {
                self.phase = Phase::Streaming;
                self.text.push_str(&content);
                if !content.trim().is_empty() {
                    // A visible delta supersedes any stale search/draw spinner.
                    self.searching = false;
                    self.keywords.clear();
                    self.drawing = false;
                }
            }
            ChatEvent::Searching { query } => {
                self.phase = Phase::Streaming;
                self.searching = true;
                self.search_query = query;
                self.keywords.clear();
            }
            ChatEvent::SearchProgress { keywords } => {
                self.phase = Phase::Streaming;
                self.merge_keywords(keywords);
            }
            ChatEvent::SearchComplete => {
                tracing::trace!("search_complete received");
            }
            ChatEvent::Drawing { prompt } => {
                self.phase = Phase::Streaming;
                self.drawing = true;
                self.drawing_prompt = prompt;
            }
            ChatEvent::Image { image } => {
                self.phase = Phase::Streaming;
                if let Some(url) = image.filter(|u| !u.is_empty()) {
                    self.images.push(url);
                    self.drawing = false;
                }
            }
            ChatEvent::Error { error } => {
                self.error = Some(
                    error
                        .filter(|e| !e.is_empty())
                        .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string()),
                );
                self.phase = Phase::Errored;
                self.clear_transient();
            }
            ChatEvent::Done => {
                self.final_content = Some(self.compose_final());
                self.phase = Phase::Done;
                self.clear_transient();
            }
        }
    }

    /// Merges new keywords into the rolling window: arrival order preserved,
    /// duplicates skipped, truncated to the most recent [`KEYWORD_WINDOW`].
    fn merge_keywords(&mut self, new: Vec<String>) {
        for kw in new {
            if !self.keywords.contains(&kw) {
                self.keywords.push(kw);
            }
        }
        if self.keywords.len() > KEYWORD_WINDOW {
            let excess = self.keywords.len() - KEYWORD_WINDOW;
            self.keywords.drain(..excess);
        }
    }

    /// Composes the final content: accumulated text plus generated images as
    /// markdown references in arrival order.
    fn compose_final(&self) -> String {
        let mut content = self.text.clone();
        for url in &self.images {
            content.push_str("\n\n![");
            content.push_str(IMAGE_ALT_TEXT);
            content.push_str("](");
            content.push_str(url);
            content.push(')');
        }
        content
    }

    fn clear_transient(&mut self) {
        self.text.clear();
        self.searching = false;
        self.search_query.clear();
        self.keywords.clear();
        self.drawing = false;
        self.drawing_prompt.clear();
        self.images.clear();
    }
}
