//! Live tailing of a subject with automatic resumption.
//!
//! [`GenesisClient::observe`] spawns a background task that holds the
//! `/observe` response open and hands events to an [`Observation`] through a
//! bounded channel. When the connection drops, the task backs off and
//! reconnects from the last event it handed over, so the caller sees each
//! event exactly once, in order.
//!
//! ```no_run
//! # async fn demo(client: genesisdb_client::GenesisClient) -> genesisdb_client::ClientResult<()> {
//! use genesisdb_client::{ObserveOptions, Subject};
//!
//! let subject = Subject::new("/customer")?;
//! let mut observation = client.observe(&subject, ObserveOptions::default())?;
//! while let Some(event) = observation.next_event().await {
//!     let event = event?;
//!     println!("{} {}", event.id(), event.event_type());
//! }
//! # Ok(())
//! # }
//! ```

mod engine;
mod policy;

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::Stream;
use tracing::info;

use genesisdb_core::{ClientError, ClientResult, EventId, Subject};
use genesisdb_events::{Cursor, CursorTracker, Event};

use crate::client::GenesisClient;
use engine::ObserverEngine;

pub use policy::ReconnectPolicy;

pub const DEFAULT_PREFETCH: usize = 16;

/// Silence on an open observe body after which the connection is presumed dead.
/// Servers send heartbeats well inside this window.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Settings for one observation.
#[derive(Debug, Clone)]
pub struct ObserveOptions {
    pub cursor: Cursor,
    /// Events decoded ahead of the consumer before reading pauses.
    pub prefetch: usize,
    pub reconnect: ReconnectPolicy,
    /// Reconnect when nothing, not even a heartbeat, arrives for this long.
    pub idle_timeout: Duration,
}

impl Default for ObserveOptions {
    fn default() -> Self {
        Self {
            cursor: Cursor::Start,
            prefetch: DEFAULT_PREFETCH,
            reconnect: ReconnectPolicy::default(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

impl ObserveOptions {
    pub fn new(cursor: Cursor) -> Self {
        Self {
            cursor,
            ..Default::default()
        }
    }

    pub fn with_prefetch(mut self, prefetch: usize) -> Self {
        self.prefetch = prefetch.max(1);
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}

/// Lifecycle of an observation's connection.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ObserverState {
    Connecting,
    Streaming,
    Reconnecting,
    Closed,
}

impl ObserverState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObserverState::Connecting => "connecting",
            ObserverState::Streaming => "streaming",
            ObserverState::Reconnecting => "reconnecting",
            ObserverState::Closed => "closed",
        }
    }
}

impl fmt::Display for ObserverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live, unbounded sequence of events.
///
/// Yields `Ok(event)` in log order. A terminal failure is yielded once as
/// `Err(_)`, after which the stream ends. Dropping the observation, or calling
/// [`cancel`](Self::cancel), closes the connection.
///
/// An event counts as processed once the caller asks for the next one (or
/// calls [`acknowledge`](Self::acknowledge)). [`resume_cursor`](Self::resume_cursor)
/// only moves past processed events, so restarting from it after a crash
/// mid-handling replays the event that was being handled.
pub struct Observation {
    rx: mpsc::Receiver<ClientResult<Event>>,
    state: watch::Receiver<ObserverState>,
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
    tracker: CursorTracker,
    in_flight: Option<(Subject, EventId)>,
    finished: bool,
}

impl Observation {
    /// Next event, or `None` once the observation has ended.
    pub async fn next_event(&mut self) -> Option<ClientResult<Event>> {
        std::future::poll_fn(|cx| Pin::new(&mut *self).poll_next(cx)).await
    }

    pub fn state(&self) -> ObserverState {
        if self.finished {
            ObserverState::Closed
        } else {
            *self.state.borrow()
        }
    }

    /// A receiver that sees every state transition.
    pub fn state_changes(&self) -> watch::Receiver<ObserverState> {
        self.state.clone()
    }

    /// Mark the most recently yielded event as processed.
    pub fn acknowledge(&mut self) {
        if let Some((subject, id)) = self.in_flight.take() {
            self.tracker.record(&subject, id);
        }
    }

    /// Id of the last processed event (range observations only).
    pub fn watermark(&self) -> Option<EventId> {
        self.tracker.watermark()
    }

    /// Where a new observation should start to continue after the last
    /// processed event.
    pub fn resume_cursor(&self) -> Cursor {
        self.tracker.resume_cursor()
    }

    /// Stop the observation. Takes effect before any further event is yielded.
    pub fn cancel(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.shutdown.notify_one();
        self.rx.close();
        info!(resume = ?self.resume_cursor(), "observation cancelled by caller");
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Stream for Observation {
    type Item = ClientResult<Event>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        this.acknowledge();

        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(Ok(event))) => {
                this.in_flight = Some((event.subject().clone(), event.id()));
                Poll::Ready(Some(Ok(event)))
            }
            Poll::Ready(Some(Err(err))) => {
                this.finished = true;
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for Observation {
    fn drop(&mut self) {
        self.shutdown.notify_one();
        self.task.abort();
    }
}

impl fmt::Debug for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observation")
            .field("state", &self.state())
            .field("watermark", &self.watermark())
            .field("finished", &self.finished)
            .finish()
    }
}

impl GenesisClient {
    /// Start tailing `subject` (and its descendants) from `options.cursor`.
    ///
    /// Must be called from within a Tokio runtime. Transport drops and
    /// transient server errors are retried per `options.reconnect`; anything
    /// else ends the observation with an error. A connect that gets no answer
    /// within the configured request timeout, or a body silent for longer than
    /// `options.idle_timeout`, counts as a transport drop.
    pub fn observe(&self, subject: &Subject, options: ObserveOptions) -> ClientResult<Observation> {
        options.cursor.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ClientError::validation(format!("observe requires a Tokio runtime: {e}")))?;

        let (tx, rx) = mpsc::channel(options.prefetch.max(1));
        let (state_tx, state_rx) = watch::channel(ObserverState::Connecting);
        let shutdown = Arc::new(Notify::new());

        info!(
            subject = %subject,
            cursor = ?options.cursor,
            prefetch = options.prefetch,
            idle_timeout_ms = options.idle_timeout.as_millis() as u64,
            "starting observation"
        );

        let engine = ObserverEngine {
            client: self.clone(),
            subject: subject.clone(),
            tracker: CursorTracker::new(options.cursor.clone()),
            policy: options.reconnect,
            idle_timeout: options.idle_timeout,
            tx,
            state: state_tx,
        };
        let task = runtime.spawn(engine.run(Arc::clone(&shutdown)));

        Ok(Observation {
            rx,
            state: state_rx,
            shutdown,
            task,
            tracker: CursorTracker::new(options.cursor),
            in_flight: None,
            finished: false,
        })
    }
}
