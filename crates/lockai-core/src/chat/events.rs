//! Chat event types: the server's wire events and the UI-facing events
//! emitted while an exchange is reduced.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Wire event for one chat exchange, as streamed by the server.
///
/// Events for one exchange arrive in an undefined-length sequence terminated
/// by exactly one `done` or one `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// Incremental markdown delta from the assistant.
    Content {
        #[serde(default)]
        content: String,
    },

    /// The assistant started a web search.
    Searching {
        #[serde(default)]
        query: String,
    },

    /// New search keywords became available mid-search.
    SearchProgress {
        #[serde(default)]
        keywords: Vec<String>,
    },

    /// Search finished (reserved; no state change).
    SearchComplete,

    /// The assistant started generating an image.
    Drawing {
        #[serde(default)]
        prompt: String,
    },

    /// A generated image became available.
    Image {
        #[serde(default)]
        image: Option<String>,
    },

    /// The server reported a failure; terminates the exchange.
    Error {
        #[serde(default)]
        error: Option<String>,
    },

    /// The exchange completed; terminates the exchange.
    Done,
}

impl ChatEvent {
    /// Returns true if this event terminates the exchange.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatEvent::Done | ChatEvent::Error { .. })
    }
}

/// UI-facing events emitted while an exchange streams.
///
/// These carry only what a renderer needs; the full transient state lives on
/// the [`Exchange`](super::exchange::Exchange) reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeEvent {
    /// Incremental assistant text.
    Delta { text: String },

    /// Search started with the given query.
    SearchStarted { query: String },

    /// Updated rolling keyword window (deduplicated, at most 6).
    SearchKeywords { keywords: Vec<String> },

    /// Image generation started with the given prompt.
    DrawingStarted { prompt: String },

    /// A generated image URL arrived.
    ImageReady { url: String },

    /// The exchange finished; `content` is the composed final message.
    Completed { content: String },

    /// The exchange failed before completion.
    Failed { message: String },
}

/// Channel-based event sender (async, bounded).
pub type ExchangeEventTx = mpsc::Sender<Arc<ExchangeEvent>>;

/// Channel-based event receiver (async, bounded).
pub type ExchangeEventRx = mpsc::Receiver<Arc<ExchangeEvent>>;

/// Default channel capacity for event streams.
///
/// Set high enough that best-effort delta sends rarely drop.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 128;

/// Creates a bounded event channel with the default capacity.
pub fn create_event_channel() -> (ExchangeEventTx, ExchangeEventRx) {
    mpsc::channel(DEFAULT_EVENT_CHANNEL_CAPACITY)
}

/// Event sender wrapper providing best-effort and reliable send modes.
///
/// Use `send_delta()` for high-volume events (text deltas) that can be
/// dropped if the consumer is slow. Use `send_important()` for events that
/// must be delivered (search/drawing indicators, terminal events).
#[derive(Clone)]
pub struct EventSender {
    tx: ExchangeEventTx,
}

impl EventSender {
    /// Creates a new `EventSender` wrapping the given channel sender.
    pub fn new(tx: ExchangeEventTx) -> Self {
        Self { tx }
    }

    /// Best-effort send: never awaits, drops if the channel is full.
    pub fn send_delta(&self, ev: ExchangeEvent) {
        let _ = self.tx.try_send(Arc::new(ev));
    }

    /// Reliable send: awaits delivery.
    pub async fn send_important(&self, ev: ExchangeEvent) {
        let _ = self.tx.send(Arc::new(ev)).await;
    }
}
