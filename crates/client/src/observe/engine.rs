//! The background task behind an [`Observation`](super::Observation).
//!
//! One task per observation. It owns the open response, decodes frames,
//! filters redeliveries through its own [`CursorTracker`] and pushes events
//! into a bounded channel. A full channel suspends reading, which in turn
//! leaves the socket unread and lets TCP flow control throttle the server.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, mpsc, watch};
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use genesisdb_core::{ClientError, ClientResult, Subject};
use genesisdb_events::{Admission, CursorTracker, Event};

use super::{ObserverState, ReconnectPolicy};
use crate::client::GenesisClient;
use crate::ndjson::{Frame, NdjsonDecoder, parse_frame};
use crate::status::{Operation, error_from_response, transport_error};
use crate::wire::ReadRequest;

/// Why a connection stopped delivering.
enum Interruption {
    /// The `Observation` went away; nothing left to deliver to.
    ReceiverGone,
    Failed(ClientError),
}

pub(crate) struct ObserverEngine {
    pub client: GenesisClient,
    pub subject: Subject,
    pub tracker: CursorTracker,
    pub policy: ReconnectPolicy,
    /// Longest silence tolerated on an open body, heartbeats included.
    pub idle_timeout: Duration,
    pub tx: mpsc::Sender<ClientResult<Event>>,
    pub state: watch::Sender<ObserverState>,
}

impl ObserverEngine {
    pub async fn run(mut self, shutdown: Arc<Notify>) {
        let mut attempt: u32 = 0;

        loop {
            let outcome = tokio::select! {
                _ = shutdown.notified() => {
                    info!(subject = %self.subject, "observation cancelled");
                    break;
                }
                outcome = self.connect_and_deliver(&mut attempt) => outcome,
            };

            let err = match outcome {
                Interruption::ReceiverGone => {
                    debug!(subject = %self.subject, "observer dropped; stopping");
                    break;
                }
                Interruption::Failed(err) => err,
            };

            if !err.is_retryable() {
                error!(
                    subject = %self.subject,
                    category = err.category(),
                    error = %err,
                    "observation failed"
                );
                self.fail(err, &shutdown).await;
                break;
            }

            attempt = attempt.saturating_add(1);
            if !self.policy.should_retry(attempt) {
                error!(
                    subject = %self.subject,
                    attempts = attempt - 1,
                    error = %err,
                    "reconnect attempts exhausted"
                );
                self.fail(err, &shutdown).await;
                break;
            }

            let delay = self.policy.delay_for_attempt(attempt);
            self.set_state(ObserverState::Reconnecting);
            warn!(
                subject = %self.subject,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "observe stream interrupted; reconnecting"
            );

            tokio::select! {
                _ = shutdown.notified() => {
                    info!(subject = %self.subject, "observation cancelled while backing off");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(ObserverState::Closed);
    }

    async fn connect_and_deliver(&mut self, attempt: &mut u32) -> Interruption {
        let cursor = self.tracker.resume_cursor();
        let connect_timeout = self.client.config().request_timeout();
        let send = self
            .client
            .post("observe")
            .header(reqwest::header::ACCEPT, crate::client::NDJSON)
            .json(&ReadRequest::new(&self.subject, &cursor))
            .send();

        let response = match tokio::time::timeout(connect_timeout, send).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Interruption::Failed(transport_error(e)),
            Err(_) => {
                return Interruption::Failed(ClientError::transport(format!(
                    "observe connection not answered within {connect_timeout:?}"
                )));
            }
        };
        if !response.status().is_success() {
            return Interruption::Failed(error_from_response(response, Operation::Read).await);
        }

        *attempt = 0;
        self.set_state(ObserverState::Streaming);
        info!(subject = %self.subject, cursor = ?cursor, "observe stream established");

        let mut body = std::pin::pin!(response.bytes_stream());
        let mut decoder = NdjsonDecoder::new();

        loop {
            let chunk = match tokio::time::timeout(self.idle_timeout, body.next()).await {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(e))) => return Interruption::Failed(transport_error(e)),
                Ok(None) => break,
                Err(_) => {
                    return Interruption::Failed(ClientError::transport(format!(
                        "observe stream idle for {:?}",
                        self.idle_timeout
                    )));
                }
            };
            let lines = match decoder.push(&chunk) {
                Ok(lines) => lines,
                Err(e) => return Interruption::Failed(e),
            };
            for line in lines {
                if let Some(outcome) = self.deliver_line(&line).await {
                    return outcome;
                }
            }
        }

        Interruption::Failed(ClientError::transport("observe stream closed by server"))
    }

    /// Returns `Some` when delivery has to stop.
    async fn deliver_line(&mut self, line: &str) -> Option<Interruption> {
        let event = match parse_frame(line) {
            Ok(Frame::Event(event)) => *event,
            Ok(Frame::Heartbeat) => return None,
            Err(e) => return Some(Interruption::Failed(e)),
        };

        let verdict = self.tracker.admit(event.subject(), event.id());
        if verdict != Admission::Deliver {
            debug!(id = %event.id(), ?verdict, "skipping redelivered event");
            return None;
        }

        let (subject, id) = (event.subject().clone(), event.id());
        if self.tx.send(Ok(event)).await.is_err() {
            return Some(Interruption::ReceiverGone);
        }
        self.tracker.record(&subject, id);
        None
    }

    async fn fail(&self, err: ClientError, shutdown: &Notify) {
        tokio::select! {
            _ = shutdown.notified() => {}
            _ = self.tx.send(Err(err)) => {}
        }
    }

    fn set_state(&self, state: ObserverState) {
        self.state.send_replace(state);
    }
}
