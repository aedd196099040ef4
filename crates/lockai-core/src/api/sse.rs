//! SSE decoding: converts a chunked byte stream into typed wire events.

use std::marker::PhantomData;
use std::pin::Pin;

use eventsource_stream::{EventStream, Eventsource};
use futures_util::Stream;
use serde::de::DeserializeOwned;

use crate::error::{ClientError, ClientResult, ErrorKind};

/// Decodes an SSE byte stream into events of type `T`.
///
/// The server frames some streams as named SSE events (`event: content` with
/// a payload-only `data:` line) and others as untyped events whose JSON
/// payload carries its own `type` tag. Both are normalized here: when the
/// payload lacks a `type` field, the SSE event name is injected before
/// deserializing. Framing concerns (chunk boundaries, CRLF, UTF-8 split
/// across chunks) are handled by the underlying event stream. A payload that
/// fails to deserialize yields a `Decode` error without ending the stream.
pub struct EventDecoder<S, T> {
    inner: EventStream<S>,
    _event: PhantomData<T>,
}

impl<S, T> EventDecoder<S, T> {
    pub fn new(stream: S) -> Self
    where
        S: Eventsource,
    {
        Self {
            inner: stream.eventsource(),
            _event: PhantomData,
        }
    }
}

impl<S, T, E> Stream for EventDecoder<S, T>
where
    S: Stream<Item = std::result::Result<bytes::Bytes, E>> + Unpin,
    T: DeserializeOwned + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    type Item = ClientResult<T>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        use std::task::Poll;

        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(event))) => {
                Poll::Ready(Some(decode_event(&event.event, &event.data)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(ClientError::new(
                ErrorKind::Transport,
                format!("SSE stream error: {e}"),
            )))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

fn decode_event<T: DeserializeOwned>(event_name: &str, data: &str) -> ClientResult<T> {
    let decode_err = |err: serde_json::Error| {
        ClientError::with_details(
            ErrorKind::Decode,
            format!("failed to decode event payload: {err}"),
            data,
        )
    };

    let trimmed = data.trim();
    let mut value: serde_json::Value = if trimmed.is_empty() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        serde_json::from_str(trimmed).map_err(decode_err)?
    };

    // "message" is the SSE default for events without an explicit name.
    if event_name != "message"
        && !event_name.is_empty()
        && let Some(obj) = value.as_object_mut()
        && !obj.contains_key("type")
    {
        obj.insert(
            "type".to_string(),
            serde_json::Value::String(event_name.to_string()),
        );
    }

    serde_json::from_value(value).map_err(decode_err)
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;
    use crate::chat::events::ChatEvent;
    use crate::paper::PaperEvent;

    /// SSE fixture simulating a typical chat exchange, framed as named
    /// events with payload-only data lines.
    const SSE_CHAT_RESPONSE: &str = r#"event: searching
data: {"query":"量子计算"}

event: search_progress
data: {"keywords":["量子比特","退相干"]}

event: content
data: {"content":"量子计算是"}

event: content
data: {"content":"一种新型计算范式。"}

event: done
data: {}

"#;

    /// SSE fixture for a paper stream whose payloads carry their own tag.
    const SSE_PAPER_ERROR_RESPONSE: &str = r#"data: {"type":"session_created","session_id":"42"}

data: {"type":"progress","stage":"researching","detail":"检索文献..."}

data: {"type":"error","message":"compiling 阶段失败","session_id":"42"}

"#;

    /// Helper to create a mock byte stream from a string.
    fn mock_byte_stream(
        data: &str,
    ) -> impl Stream<Item = std::result::Result<bytes::Bytes, std::io::Error>> {
        let chunks: Vec<_> = data
            .as_bytes()
            .chunks(50) // Simulate chunked delivery
            .map(|c| Ok(bytes::Bytes::copy_from_slice(c)))
            .collect();
        futures_util::stream::iter(chunks)
    }

    #[tokio::test]
    async fn test_decoder_chat_stream_with_named_events() {
        let mut decoder: EventDecoder<_, ChatEvent> =
            EventDecoder::new(mock_byte_stream(SSE_CHAT_RESPONSE));

        let mut events = Vec::new();
        while let Some(result) = decoder.next().await {
            events.push(result.expect("expected valid event"));
        }

        assert_eq!(events.len(), 5);
        assert_eq!(
            events[0],
            ChatEvent::Searching {
                query: "量子计算".to_string()
            }
        );
        assert_eq!(
            events[1],
            ChatEvent::SearchProgress {
                keywords: vec!["量子比特".to_string(), "退相干".to_string()]
            }
        );
        assert_eq!(
            events[2],
            ChatEvent::Content {
                content: "量子计算是".to_string()
            }
        );
        assert_eq!(events[4], ChatEvent::Done);
    }

    #[tokio::test]
    async fn test_decoder_paper_stream_with_tagged_payloads() {
        let mut decoder: EventDecoder<_, PaperEvent> =
            EventDecoder::new(mock_byte_stream(SSE_PAPER_ERROR_RESPONSE));

        let mut events = Vec::new();
        while let Some(result) = decoder.next().await {
            events.push(result.expect("expected valid event"));
        }

        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0],
            PaperEvent::SessionCreated {
                session_id: "42".to_string()
            }
        );
        assert!(events[2].is_terminal());
    }

    #[tokio::test]
    async fn test_decoder_malformed_payload_is_decode_error() {
        let data = "data: {\"type\":\"content\",\"content\":\"ok\"}\n\ndata: not json\n\n";
        let mut decoder: EventDecoder<_, ChatEvent> = EventDecoder::new(mock_byte_stream(data));

        assert!(decoder.next().await.unwrap().is_ok());

        let err = decoder.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Decode);
        assert_eq!(err.details.as_deref(), Some("not json"));
    }

    #[tokio::test]
    async fn test_decoder_unknown_event_name_is_decode_error() {
        let data = "event: telemetry\ndata: {}\n\n";
        let mut decoder: EventDecoder<_, ChatEvent> = EventDecoder::new(mock_byte_stream(data));

        let err = decoder.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Decode);
    }

    #[tokio::test]
    async fn test_decoder_handles_crlf_line_endings() {
        let data = "event: done\r\ndata: {}\r\n\r\n";
        let mut decoder: EventDecoder<_, ChatEvent> = EventDecoder::new(mock_byte_stream(data));

        assert_eq!(decoder.next().await.unwrap().unwrap(), ChatEvent::Done);
        assert!(decoder.next().await.is_none());
    }

    #[tokio::test]
    async fn test_decoder_handles_utf8_split_across_chunks() {
        // 图 = E5 9B BE (3 bytes); split inside it to verify reassembly.
        let data = "event: drawing\ndata: {\"prompt\":\"画一张图\"}\n\n";
        let bytes = data.as_bytes();
        let han = bytes
            .windows(3)
            .position(|w| w == [0xE5, 0x9B, 0xBE])
            .expect("character not found");
        let split_point = han + 1;

        let chunks: Vec<std::result::Result<bytes::Bytes, std::io::Error>> = vec![
            Ok(bytes::Bytes::copy_from_slice(&bytes[..split_point])),
            Ok(bytes::Bytes::copy_from_slice(&bytes[split_point..])),
        ];
        let mut decoder: EventDecoder<_, ChatEvent> =
            EventDecoder::new(futures_util::stream::iter(chunks));

        let event = decoder.next().await.unwrap().expect("should decode");
        assert_eq!(
            event,
            ChatEvent::Drawing {
                prompt: "画一张图".to_string()
            }
        );
    }
}
