//! Status-polling fallback for paper generation.
//!
//! When the client is not attached to the live event stream (reload, record
//! re-selected from the sidebar), progress is recovered by polling the status
//! endpoint at a fixed interval and applying each snapshot like a `progress`
//! event.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::tracker::PaperTracker;
use crate::api::ApiClient;

/// Fixed polling interval.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Handle to a running status poller.
///
/// Cancelling the lease stops the loop and discards the result of a request
/// already in flight instead of applying it. Dropping the lease cancels it.
pub struct PollLease {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PollLease {
    /// Stops the poller. An in-flight response is discarded, not applied;
    /// updates for a stale or terminal record are ignored by the tracker
    /// either way.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns true once the polling task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Waits for the polling task to exit.
    pub async fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for PollLease {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Spawns a poller that fetches the status of `record_id` every `interval`
/// and applies each snapshot to `tracker`.
///
/// The loop stops when the record reaches a terminal status, the tracker's
/// active record changes, or the lease is cancelled. Transient fetch errors
/// are logged and the loop keeps going.
pub fn spawn_status_poller(
    api: ApiClient,
    record_id: String,
    tracker: Arc<Mutex<PaperTracker>>,
    interval: Duration,
) -> PollLease {
    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();

    let handle = tokio::spawn(async move {
        poll_loop(api, record_id, tracker, interval, task_cancel).await;
    });

    PollLease {
        cancel,
        handle: Some(handle),
    }
}

async fn poll_loop(
    api: ApiClient,
    record_id: String,
    tracker: Arc<Mutex<PaperTracker>>,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(interval) => {}
        }

        let result = tokio::select! {
            biased;
            // An in-flight response is discarded, not applied.
            () = cancel.cancelled() => return,
            result = api.paper_status(&record_id) => result,
        };

        match result {
            Ok(snapshot) => {
                let mut tracker = tracker.lock().await;
                if cancel.is_cancelled() {
                    return;
                }
                let outcome = tracker.apply_snapshot(&record_id, &snapshot);
                tracing::debug!(record_id, status = %snapshot.status, ?outcome, "poll applied");
                if outcome.stops_polling() {
                    return;
                }
            }
            Err(err) => {
                // Transient; the next tick retries.
                tracing::warn!(record_id, "status poll failed: {err:#}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::paper::tracker::PaperPhase;
    use crate::paper::PaperStatus;

    const TICK: Duration = Duration::from_millis(10);

    fn json_response(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(body.to_string(), "application/json")
    }

    fn resumed_tracker(id: &str) -> Arc<Mutex<PaperTracker>> {
        let mut tracker = PaperTracker::new();
        tracker.resume(id, &PaperStatus::Writing, None);
        Arc::new(Mutex::new(tracker))
    }

    #[tokio::test]
    async fn test_poller_recovers_progress_until_completion() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/paper/status/42"))
            .respond_with(json_response(
                r#"{"status":"compiling","progress_detail":"正在编译 PDF..."}"#,
            ))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/paper/status/42"))
            .respond_with(json_response(r#"{"status":"completed","pdf_url":"u"}"#))
            .mount(&server)
            .await;

        let tracker = resumed_tracker("42");
        let lease = spawn_status_poller(
            ApiClient::new(server.uri()),
            "42".to_string(),
            Arc::clone(&tracker),
            TICK,
        );
        lease.join().await;

        let tracker = tracker.lock().await;
        assert_eq!(tracker.phase(), PaperPhase::Completed);
        assert_eq!(tracker.pdf_url(), Some("u"));
    }

    #[tokio::test]
    async fn test_poller_survives_transient_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/paper/status/42"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/paper/status/42"))
            .respond_with(json_response(r#"{"status":"failed","error":"超时"}"#))
            .mount(&server)
            .await;

        let tracker = resumed_tracker("42");
        let lease = spawn_status_poller(
            ApiClient::new(server.uri()),
            "42".to_string(),
            Arc::clone(&tracker),
            TICK,
        );
        lease.join().await;

        let tracker = tracker.lock().await;
        assert_eq!(tracker.phase(), PaperPhase::Errored);
        assert_eq!(tracker.error(), Some("超时"));
    }

    #[tokio::test]
    async fn test_cancelled_lease_discards_in_flight_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/paper/status/42"))
            .respond_with(
                json_response(r#"{"status":"completed","pdf_url":"u"}"#)
                    .set_delay(Duration::from_millis(100)),
            )
            .mount(&server)
            .await;

        let tracker = resumed_tracker("42");
        let lease = spawn_status_poller(
            ApiClient::new(server.uri()),
            "42".to_string(),
            Arc::clone(&tracker),
            TICK,
        );

        // Let the request go out, then cancel while it is in flight.
        tokio::time::sleep(Duration::from_millis(30)).await;
        lease.cancel();
        lease.join().await;

        let tracker = tracker.lock().await;
        assert_eq!(tracker.phase(), PaperPhase::Generating);
        assert!(tracker.pdf_url().is_none());
    }

    #[tokio::test]
    async fn test_poller_stops_when_active_record_changes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/paper/status/42"))
            .respond_with(json_response(r#"{"status":"writing"}"#))
            .mount(&server)
            .await;

        let tracker = resumed_tracker("42");
        let lease = spawn_status_poller(
            ApiClient::new(server.uri()),
            "42".to_string(),
            Arc::clone(&tracker),
            TICK,
        );

        // Another record becomes active; the next snapshot is ignored and
        // the loop exits.
        tracker.lock().await.resume("99", &PaperStatus::Planning, None);
        lease.join().await;

        let tracker = tracker.lock().await;
        assert_eq!(tracker.active_id(), Some("99"));
        assert_eq!(tracker.stage(), "planning");
    }

    #[tokio::test]
    async fn test_dropping_lease_cancels_polling() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/paper/status/42"))
            .respond_with(json_response(r#"{"status":"completed","pdf_url":"u"}"#))
            .mount(&server)
            .await;

        let tracker = resumed_tracker("42");
        let lease = spawn_status_poller(
            ApiClient::new(server.uri()),
            "42".to_string(),
            Arc::clone(&tracker),
            TICK,
        );
        drop(lease);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let tracker = tracker.lock().await;
        assert_eq!(tracker.phase(), PaperPhase::Generating);
        assert!(tracker.pdf_url().is_none());
    }
}
