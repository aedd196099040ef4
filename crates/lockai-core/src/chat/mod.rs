//! Chat domain: message model, wire events, and the exchange reducer.

pub mod events;
pub mod exchange;

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ClientResult;
use events::{ChatEvent, EventSender, ExchangeEvent};
use exchange::Exchange;

/// Role of a chat message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// A single persisted chat message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Creates a new user message with a generated id.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates a new assistant message with a generated id.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Pulls decoded events from `events` and applies them to `exchange` until
/// the exchange terminates, the stream closes, or `cancel` fires.
///
/// Decode and transport failures are folded into the same `Errored` state as
/// an explicit server error event, so callers see one uniform error surface.
/// A stream that closes without a terminal event is an implicit transport
/// error. Cancellation stops consumption without terminating the exchange.
///
/// # Errors
/// Returns an error only if sending on the UI channel fails internally;
/// protocol failures terminate the exchange instead.
pub async fn drive_exchange<S>(
    mut events: S,
    exchange: &mut Exchange,
    sender: &EventSender,
    cancel: &CancellationToken,
) -> Result<()>
where
    S: Stream<Item = ClientResult<ChatEvent>> + Unpin,
{
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!("exchange cancelled mid-stream");
                return Ok(());
            }
            next = events.next() => next,
        };

        match next {
            Some(Ok(event)) => {
                apply_and_emit(exchange, event, sender).await;
                if exchange.is_terminal() {
                    return Ok(());
                }
            }
            Some(Err(err)) => {
                tracing::warn!(kind = %err.kind, "stream failed: {}", err.message);
                apply_and_emit(
                    exchange,
                    ChatEvent::Error {
                        error: Some(err.message),
                    },
                    sender,
                )
                .await;
                return Ok(());
            }
            None => {
                if !exchange.is_terminal() {
                    // Stream closed without `done` or `error`.
                    apply_and_emit(exchange, ChatEvent::Error { error: None }, sender).await;
                }
                return Ok(());
            }
        }
    }
}

async fn apply_and_emit(exchange: &mut Exchange, event: ChatEvent, sender: &EventSender) {
    if exchange.is_terminal() {
        exchange.apply(event);
        return;
    }

    let ui = match &event {
        ChatEvent::Content { content } if !content.is_empty() => Some(ExchangeEvent::Delta {
            text: content.clone(),
        }),
        ChatEvent::Searching { query } => Some(ExchangeEvent::SearchStarted {
            query: query.clone(),
        }),
        ChatEvent::Drawing { prompt } => Some(ExchangeEvent::DrawingStarted {
            prompt: prompt.clone(),
        }),
        ChatEvent::Image { image } => image
            .clone()
            .filter(|u| !u.is_empty())
            .map(|url| ExchangeEvent::ImageReady { url }),
        _ => None,
    };

    let was_search_progress = matches!(&event, ChatEvent::SearchProgress { .. });
    exchange.apply(event);

    match ui {
        Some(ev @ ExchangeEvent::Delta { .. }) => sender.send_delta(ev),
        Some(ev) => sender.send_important(ev).await,
        None => {}
    }

    if was_search_progress {
        sender
            .send_important(ExchangeEvent::SearchKeywords {
                keywords: exchange.keywords().to_vec(),
            })
            .await;
    }

    if exchange.is_terminal() {
        let terminal = match exchange.final_content() {
            Some(content) => ExchangeEvent::Completed {
                content: content.to_string(),
            },
            None => ExchangeEvent::Failed {
                message: exchange
                    .error()
                    .unwrap_or(exchange::DEFAULT_ERROR_MESSAGE)
                    .to_string(),
            },
        };
        sender.send_important(terminal).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::{ClientError, ErrorKind};
    use events::create_event_channel;
    use exchange::Phase;

    fn ok_events(events: Vec<ChatEvent>) -> impl Stream<Item = ClientResult<ChatEvent>> + Unpin {
        futures_util::stream::iter(events.into_iter().map(Ok))
    }

    async fn drain(mut rx: events::ExchangeEventRx) -> Vec<ExchangeEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(Arc::unwrap_or_clone(ev));
        }
        out
    }

    #[tokio::test]
    async fn test_drive_exchange_happy_path() {
        let (tx, rx) = create_event_channel();
        let sender = EventSender::new(tx);
        let cancel = CancellationToken::new();
        let mut ex = Exchange::begin();

        let stream = ok_events(vec![
            ChatEvent::Content {
                content: "Hel".to_string(),
            },
            ChatEvent::Content {
                content: "lo".to_string(),
            },
            ChatEvent::Done,
        ]);
        drive_exchange(stream, &mut ex, &sender, &cancel)
            .await
            .unwrap();

        assert_eq!(ex.phase(), Phase::Done);
        assert_eq!(ex.final_content(), Some("Hello"));

        let events = drain(rx).await;
        assert!(events.contains(&ExchangeEvent::Completed {
            content: "Hello".to_string()
        }));
    }

    #[tokio::test]
    async fn test_decode_error_folds_into_errored() {
        let (tx, rx) = create_event_channel();
        let sender = EventSender::new(tx);
        let cancel = CancellationToken::new();
        let mut ex = Exchange::begin();

        let stream = futures_util::stream::iter(vec![
            Ok(ChatEvent::Content {
                content: "part".to_string(),
            }),
            Err(ClientError::new(ErrorKind::Decode, "bad frame")),
        ]);
        drive_exchange(stream, &mut ex, &sender, &cancel)
            .await
            .unwrap();

        assert_eq!(ex.phase(), Phase::Errored);
        assert_eq!(ex.error(), Some("bad frame"));
        assert!(ex.content_to_persist().is_none());

        let events = drain(rx).await;
        assert!(events.contains(&ExchangeEvent::Failed {
            message: "bad frame".to_string()
        }));
    }

    #[tokio::test]
    async fn test_stream_close_without_terminal_is_transport_error() {
        let (tx, _rx) = create_event_channel();
        let sender = EventSender::new(tx);
        let cancel = CancellationToken::new();
        let mut ex = Exchange::begin();

        let stream = ok_events(vec![ChatEvent::Content {
            content: "half".to_string(),
        }]);
        drive_exchange(stream, &mut ex, &sender, &cancel)
            .await
            .unwrap();

        assert_eq!(ex.phase(), Phase::Errored);
    }

    #[tokio::test]
    async fn test_cancellation_stops_consumption_without_terminating() {
        let (tx, _rx) = create_event_channel();
        let sender = EventSender::new(tx);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut ex = Exchange::begin();

        let stream = ok_events(vec![ChatEvent::Done]);
        drive_exchange(stream, &mut ex, &sender, &cancel)
            .await
            .unwrap();

        // The pending `done` was never applied.
        assert_eq!(ex.phase(), Phase::Sending);
        assert!(ex.content_to_persist().is_none());
    }
}
