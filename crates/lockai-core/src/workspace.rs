//! Application state: session/record lists, the active selections, and the
//! orchestration of chat exchanges and paper generations.
//!
//! Persistence rules: the user message is written before the stream opens;
//! the assistant message is written only after a `done` with non-empty
//! content (after a short grace delay), never after an error. Persistence
//! failures past a successful terminal event are logged, not surfaced.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use futures_util::StreamExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::api::{ApiClient, ChatRequest};
use crate::chat::events::{EventSender, ExchangeEvent};
use crate::chat::exchange::Exchange;
use crate::chat::{ChatMessage, drive_exchange};
use crate::config::{Config, ExchangeSettings};
use crate::error::ClientError;
use crate::paper::poller::{POLL_INTERVAL, PollLease, spawn_status_poller};
use crate::paper::tracker::{PaperPhase, PaperTracker};
use crate::paper::{PaperEvent, PaperRecord, PaperStatus};
use crate::store::records;
use crate::store::sessions::{self, Session, SessionSummary};
use crate::title;

/// Delay between a terminal `done` and the assistant persistence write.
const PERSIST_GRACE: Duration = Duration::from_millis(100);

/// Fallback user id when the config carries none.
const ANONYMOUS_USER_ID: &str = "anonymous";

/// Top-level application state. One instance per running client.
pub struct Workspace {
    config: Config,
    api: ApiClient,
    sessions: Vec<SessionSummary>,
    records: Vec<PaperRecord>,
    active_session: Option<Session>,
    /// Messages of the active session, in order.
    messages: Vec<ChatMessage>,
    tracker: Arc<Mutex<PaperTracker>>,
    poll_lease: Option<PollLease>,
    /// True while a chat exchange is in flight.
    busy: bool,
}

impl Workspace {
    /// Creates a workspace from a loaded config.
    pub fn new(config: Config) -> Self {
        let api = ApiClient::new(config.effective_base_url());
        Self {
            config,
            api,
            sessions: Vec::new(),
            records: Vec::new(),
            active_session: None,
            messages: Vec::new(),
            tracker: Arc::new(Mutex::new(PaperTracker::new())),
            poll_lease: None,
            busy: false,
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn sessions(&self) -> &[SessionSummary] {
        &self.sessions
    }

    pub fn records(&self) -> &[PaperRecord] {
        &self.records
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn active_session_id(&self) -> Option<&str> {
        self.active_session.as_ref().map(|s| s.id.as_str())
    }

    pub fn tracker(&self) -> Arc<Mutex<PaperTracker>> {
        Arc::clone(&self.tracker)
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    fn user_id(&self) -> &str {
        self.config.user_id.as_deref().unwrap_or(ANONYMOUS_USER_ID)
    }

    /// Refreshes the session list from disk.
    ///
    /// # Errors
    /// Returns an error if the sessions directory cannot be read.
    pub fn load_sessions(&mut self) -> Result<()> {
        self.sessions = sessions::list_sessions()?;
        Ok(())
    }

    /// Refreshes the paper record list from disk.
    ///
    /// # Errors
    /// Returns an error if the papers directory cannot be read.
    pub fn load_paper_records(&mut self) -> Result<()> {
        self.records = records::list_records()?;
        Ok(())
    }

    /// Makes `id` the active session and loads its messages.
    ///
    /// # Errors
    /// Returns an error if the session file cannot be read.
    pub fn select_session(&mut self, id: &str) -> Result<()> {
        let session = Session::with_id(id.to_string())?;
        self.messages = session.read_messages()?;
        self.active_session = Some(session);
        Ok(())
    }

    /// Clears the active session; the next send creates a fresh one.
    pub fn new_chat(&mut self) {
        self.active_session = None;
        self.messages.clear();
    }

    /// Deletes a session. Deleting the active session clears the selection.
    ///
    /// # Errors
    /// Returns an error if the file cannot be removed.
    pub fn delete_session(&mut self, id: &str) -> Result<()> {
        sessions::delete_session(id)?;
        self.sessions.retain(|s| s.id != id);
        if self.active_session_id() == Some(id) {
            self.new_chat();
        }
        Ok(())
    }

    /// Sends a user message on the active session (creating one lazily) and
    /// drives the exchange to completion, emitting UI events on `sender`.
    ///
    /// # Errors
    /// Returns an error if an exchange is already in flight or the session
    /// cannot be created. Stream failures are folded into a `Failed` event,
    /// not returned.
    pub async fn send_message(
        &mut self,
        text: &str,
        sender: &EventSender,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.busy {
            bail!("An exchange is already in flight");
        }
        if text.trim().is_empty() {
            bail!("Message must not be empty");
        }

        // Lazy session creation on first send.
        if self.active_session.is_none() {
            self.active_session = Some(Session::new()?);
        }

        self.busy = true;
        let result = self.run_exchange(text, sender, cancel).await;
        self.busy = false;
        result
    }

    async fn run_exchange(
        &mut self,
        text: &str,
        sender: &EventSender,
        cancel: &CancellationToken,
    ) -> Result<()> {
        // History excludes the message being sent.
        let history = self.messages.clone();
        let was_first_exchange = history.is_empty();
        let settings = ExchangeSettings::capture(&self.config);

        let user_message = ChatMessage::user(text);
        if let Some(session) = self.active_session.as_mut()
            && let Err(err) = persist_with_retry(session, &user_message)
        {
            tracing::warn!("failed to persist user message: {err:#}");
        }
        self.messages.push(user_message);

        let request = ChatRequest {
            message: text.to_string(),
            history,
            user_id: self.user_id().to_string(),
            session_id: self.active_session_id().map(str::to_string),
            settings,
        };

        let stream = match self.api.chat_stream(&request).await {
            Ok(stream) => stream,
            Err(err) => {
                let message = err
                    .downcast_ref::<ClientError>()
                    .map_or_else(|| err.to_string(), |e| e.message.clone());
                tracing::warn!("failed to open chat stream: {err:#}");
                sender.send_important(ExchangeEvent::Failed { message }).await;
                return Ok(());
            }
        };

        let mut exchange = Exchange::begin();
        drive_exchange(stream, &mut exchange, sender, cancel).await?;

        let Some(content) = exchange.content_to_persist().map(str::to_string) else {
            return Ok(());
        };

        tokio::time::sleep(PERSIST_GRACE).await;

        let assistant_message = ChatMessage::assistant(content);
        if let Some(session) = self.active_session.as_mut()
            && let Err(err) = persist_with_retry(session, &assistant_message)
        {
            tracing::warn!("failed to persist assistant message: {err:#}");
        }
        self.messages.push(assistant_message);

        if was_first_exchange {
            self.generate_session_title().await;
        }

        Ok(())
    }

    /// Generates and stores a title from the first exchange. Best-effort.
    async fn generate_session_title(&mut self) {
        let Some(session_id) = self.active_session_id().map(str::to_string) else {
            return;
        };
        let user = self.messages.first().map(|m| m.content.clone());
        let assistant = self.messages.get(1).map(|m| m.content.clone());
        let (Some(user), Some(assistant)) = (user, assistant) else {
            return;
        };

        match title::generate_title(&self.api, &session_id, &user, &assistant).await {
            Ok(generated) => {
                if let Some(session) = self.active_session.as_mut() {
                    match session.set_title(Some(generated)) {
                        Ok(_) => {
                            if let Err(err) = self.load_sessions() {
                                tracing::warn!("failed to refresh session list: {err:#}");
                            }
                        }
                        Err(err) => tracing::warn!("failed to store session title: {err:#}"),
                    }
                }
            }
            Err(err) => tracing::warn!("title generation failed: {err:#}"),
        }
    }

    /// Starts a new paper generation and drives its stream to completion.
    ///
    /// # Errors
    /// Returns an error if a generation is already in flight or the stream
    /// cannot be opened. Stream failures terminate the tracker instead.
    pub async fn generate_paper(&mut self, topic: &str) -> Result<()> {
        if self.tracker.lock().await.is_busy() {
            bail!("A paper generation is already in flight");
        }
        if topic.trim().is_empty() {
            bail!("Topic must not be empty");
        }

        self.stop_polling();
        self.tracker.lock().await.begin_generation();

        let stream = self
            .api
            .paper_generate(topic, &self.user_id().to_string())
            .await
            .context("Failed to start paper generation")?;

        self.consume_paper_stream(stream, Some(topic.to_string()))
            .await
    }

    /// Starts a revision of an existing completed paper.
    ///
    /// # Errors
    /// Returns an error if the record does not exist, is not completed, or
    /// the stream cannot be opened. A revision failure returns the tracker to
    /// `Completed` with an inline error; the stored record keeps its PDF.
    pub async fn revise_paper(&mut self, id: &str, instruction: &str) -> Result<()> {
        if self.tracker.lock().await.is_busy() {
            bail!("A paper generation is already in flight");
        }

        let record = records::load_record(id)?
            .with_context(|| format!("Paper record '{id}' not found"))?;
        if record.status != PaperStatus::Completed {
            // Revision semantics fall back to `Completed` on failure, which
            // must never overwrite a failed or in-flight terminal status.
            bail!(
                "Paper '{id}' is not completed (status: {}); only completed papers can be revised",
                record.status
            );
        }

        self.stop_polling();
        self.tracker
            .lock()
            .await
            .begin_revision(id, record.pdf_url.clone());

        let stream = self
            .api
            .paper_revise(id, instruction)
            .await
            .context("Failed to start paper revision")?;

        self.consume_paper_stream(stream, None).await
    }

    async fn consume_paper_stream<S>(&mut self, mut stream: S, new_topic: Option<String>) -> Result<()>
    where
        S: futures_util::Stream<Item = crate::error::ClientResult<PaperEvent>> + Unpin,
    {
        let mut terminated = false;

        while let Some(next) = stream.next().await {
            match next {
                Ok(event) => {
                    terminated = event.is_terminal();
                    if let (PaperEvent::SessionCreated { session_id }, Some(topic)) =
                        (&event, &new_topic)
                    {
                        let record = PaperRecord::new(session_id.clone(), topic.clone());
                        if let Err(err) = records::save_record(&record) {
                            tracing::warn!("failed to save new paper record: {err:#}");
                        }
                    }
                    self.tracker.lock().await.apply(event);
                    self.sync_active_record().await;
                    if terminated {
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!(kind = %err.kind, "paper stream failed: {}", err.message);
                    self.tracker.lock().await.apply(PaperEvent::Error {
                        message: err.message,
                        session_id: None,
                    });
                    self.sync_active_record().await;
                    terminated = true;
                    break;
                }
            }
        }

        if !terminated {
            // Stream closed without a terminal event.
            self.tracker.lock().await.apply(PaperEvent::Error {
                message: "生成中断".to_string(),
                session_id: None,
            });
            self.sync_active_record().await;
        }

        self.load_paper_records()?;
        Ok(())
    }

    /// Writes the tracker's current state through to the stored record.
    pub async fn sync_active_record(&self) {
        let tracker = self.tracker.lock().await;
        let Some(id) = tracker.active_id() else {
            return;
        };

        let mut record = match records::load_record(id) {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(err) => {
                tracing::warn!("failed to load paper record for sync: {err:#}");
                return;
            }
        };

        match tracker.phase() {
            PaperPhase::Completed => {
                record.status = PaperStatus::Completed;
                if let Some(url) = tracker.pdf_url() {
                    record.pdf_url = Some(url.to_string());
                }
                record.error = None;
                record.completed_at.get_or_insert_with(Utc::now);
            }
            PaperPhase::Errored => {
                record.status = PaperStatus::Failed;
                record.error = tracker.error().map(str::to_string);
            }
            PaperPhase::Generating | PaperPhase::Revising => {
                if tracker.stage().is_empty() {
                    // No progress event yet; keep the freshly created record.
                    return;
                }
                record.status = PaperStatus::from(tracker.stage());
                record.progress_detail =
                    (!tracker.detail().is_empty()).then(|| tracker.detail().to_string());
            }
            PaperPhase::Idle => return,
        }

        if let Err(err) = records::save_record(&record) {
            tracing::warn!("failed to sync paper record: {err:#}");
        }
    }

    /// Resumes progress tracking for a stored record.
    ///
    /// Terminal records are adopted without transitions and without a poll
    /// lease; in-flight records start the status-polling fallback.
    ///
    /// # Errors
    /// Returns an error if the record does not exist.
    pub async fn resume_paper_tracking(&mut self, id: &str) -> Result<()> {
        let record = records::load_record(id)?
            .with_context(|| format!("Paper record '{id}' not found"))?;

        self.stop_polling();

        let mut tracker = self.tracker.lock().await;
        match record.status {
            PaperStatus::Completed => {
                tracker.begin_revision(&record.id, record.pdf_url.clone());
                // Adopt the terminal state directly; no transitions, no poll.
                tracker.apply(PaperEvent::Completed {
                    pdf_url: record.pdf_url.clone(),
                    session_id: Some(record.id.clone()),
                });
            }
            PaperStatus::Failed => {
                tracker.resume(&record.id, &record.status, None);
                tracker.apply(PaperEvent::Error {
                    message: record.error.clone().unwrap_or_default(),
                    session_id: Some(record.id.clone()),
                });
            }
            ref status => {
                tracker.resume(&record.id, status, record.progress_detail.as_deref());
                drop(tracker);
                self.poll_lease = Some(spawn_status_poller(
                    self.api.clone(),
                    record.id.clone(),
                    Arc::clone(&self.tracker),
                    POLL_INTERVAL,
                ));
            }
        }

        Ok(())
    }

    /// Makes `id` the tracked paper record.
    ///
    /// # Errors
    /// Returns an error if the record does not exist.
    pub async fn select_paper(&mut self, id: &str) -> Result<()> {
        self.resume_paper_tracking(id).await
    }

    /// Cancels any running status poller.
    pub fn stop_polling(&mut self) {
        if let Some(lease) = self.poll_lease.take() {
            lease.cancel();
        }
    }

    /// Returns the active poll lease, if any.
    pub fn poll_lease(&self) -> Option<&PollLease> {
        self.poll_lease.as_ref()
    }

    /// Takes ownership of the active poll lease, if any.
    pub fn take_poll_lease(&mut self) -> Option<PollLease> {
        self.poll_lease.take()
    }

    /// Deletes a paper record. Deleting the tracked record clears the
    /// tracker and stops polling.
    ///
    /// # Errors
    /// Returns an error if the file cannot be removed.
    pub async fn delete_paper(&mut self, id: &str) -> Result<()> {
        if self.tracker.lock().await.active_id() == Some(id) {
            self.stop_polling();
            self.tracker.lock().await.reset();
        }
        records::delete_record(id)?;
        self.records.retain(|r| r.id != id);
        Ok(())
    }
}

fn persist_with_retry(session: &mut Session, message: &ChatMessage) -> Result<()> {
    if let Err(err) = session.append_message(message) {
        tracing::warn!("message persistence failed, retrying once: {err:#}");
        session.append_message(message)?;
    }
    Ok(())
}
