//! In-process GenesisDB stand-in for black-box tests.
//!
//! Speaks the real wire protocol over HTTP on an ephemeral port, keeps the log
//! in memory, and exposes knobs to inject connection drops and outages.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

use genesisdb_client::{
    ClientConfig, ClientResult, Event, GenesisClient, NewEvent, Observation, ReconnectPolicy,
    Subject,
};

pub const TOKEN: &str = "test-token";
const HEARTBEAT: &str = r#"{"payload":""}"#;
/// An envelope without `time`.
const MALFORMED: &str = r#"data: {"id":"00000000-0000-0000-0000-0000000000ff","source":"io.genesisdb.app","subject":"/orders","type":"broken"}"#;

/// Fault injection switches.
#[derive(Default)]
pub struct Knobs {
    /// Answer this many observe connects with 503 before accepting one.
    pub fail_observe_connects: AtomicUsize,
    /// One entry per accepted observe connection, in order: end the body after
    /// that many events. Connections without an entry stay open.
    pub observe_drops: Mutex<VecDeque<usize>>,
    /// Replay observe from the start regardless of `lowerBound`.
    pub ignore_lower_bound: AtomicBool,
    /// Next accepted observe connection writes a malformed envelope after
    /// this many events, then ends.
    pub corrupt_observe_after: Mutex<Option<usize>>,
    /// Apply commits but abort the response body after the status line.
    pub break_commit_body: AtomicBool,
}

pub struct MockDb {
    log: Mutex<Vec<Value>>,
    live: broadcast::Sender<Value>,
    pub knobs: Knobs,
    pub commit_requests: AtomicUsize,
    pub observe_requests: Mutex<Vec<Value>>,
    pub user_agents: Mutex<Vec<String>>,
}

impl MockDb {
    fn new() -> Self {
        let (live, _) = broadcast::channel(1024);
        Self {
            log: Mutex::new(Vec::new()),
            live,
            knobs: Knobs::default(),
            commit_requests: AtomicUsize::new(0),
            observe_requests: Mutex::new(Vec::new()),
            user_agents: Mutex::new(Vec::new()),
        }
    }

    pub fn log_len(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    pub fn drop_observe_after(&self, counts: &[usize]) {
        self.knobs.observe_drops.lock().unwrap().extend(counts);
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<(), Response> {
        if let Some(ua) = headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok()) {
            self.user_agents.lock().unwrap().push(ua.to_string());
        }
        let expected = format!("Bearer {TOKEN}");
        match headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
            Some(value) if value == expected => Ok(()),
            _ => Err(error(StatusCode::UNAUTHORIZED, "invalid or missing token")),
        }
    }

    fn apply_commit(&self, body: &Value) -> Response {
        let events = match body["events"].as_array() {
            Some(events) if !events.is_empty() => events,
            _ => return error(StatusCode::BAD_REQUEST, "events must be a non-empty array"),
        };
        for event in events {
            for field in ["source", "subject", "type"] {
                if event[field].as_str().is_none_or(str::is_empty) {
                    return error(StatusCode::BAD_REQUEST, &format!("event is missing '{field}'"));
                }
            }
        }

        let mut log = self.log.lock().unwrap();

        let mut failed = Vec::new();
        for precondition in body["preconditions"].as_array().into_iter().flatten() {
            let kind = precondition["type"].as_str().unwrap_or_default();
            let payload = &precondition["payload"];
            let holds = match kind {
                "isSubjectNew" => !log.iter().any(|e| e["subject"] == payload["subject"]),
                "isSubjectExisting" => log.iter().any(|e| e["subject"] == payload["subject"]),
                "isQueryResultTrue" => match payload["query"].as_str() {
                    Some("true") => true,
                    Some("false") => false,
                    _ => return error(StatusCode::BAD_REQUEST, "invalid precondition query"),
                },
                other => {
                    return error(StatusCode::BAD_REQUEST, &format!("unknown precondition '{other}'"));
                }
            };
            if !holds {
                failed.push(json!({ "type": kind }));
            }
        }
        if !failed.is_empty() {
            return (
                StatusCode::PRECONDITION_FAILED,
                Json(json!({ "error": "precondition failed", "failedPreconditions": failed })),
            )
                .into_response();
        }

        let mut committed = Vec::with_capacity(events.len());
        for event in events {
            let stored = json!({
                "id": Uuid::from_u128(log.len() as u128 + 1).to_string(),
                "source": event["source"],
                "subject": event["subject"],
                "type": event["type"],
                "time": Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
                "datacontenttype": "application/json",
                "specversion": "1.0",
                "data": event["data"],
            });
            log.push(stored.clone());
            let _ = self.live.send(stored.clone());
            committed.push(stored);
        }

        (StatusCode::OK, Json(Value::Array(committed))).into_response()
    }

    fn select(&self, request: &Value, ignore_lower_bound: bool) -> Vec<Value> {
        let log = self.log.lock().unwrap();
        let subject = request["subject"].as_str().unwrap_or("/");
        let options = &request["options"];
        let scoped = log
            .iter()
            .filter(|e| covers(subject, e["subject"].as_str().unwrap_or_default()));

        if let Some(event_type) = options["latestByEventType"].as_str() {
            let mut latest: HashMap<String, Value> = HashMap::new();
            for event in scoped.filter(|e| e["type"] == event_type) {
                let key = event["subject"].as_str().unwrap_or_default().to_string();
                latest.insert(key, event.clone());
            }
            let mut events: Vec<Value> = latest.into_values().collect();
            events.sort_by_key(event_id);
            return events;
        }

        let lower_bound = options["lowerBound"]
            .as_str()
            .and_then(|s| s.parse::<Uuid>().ok())
            .filter(|_| !ignore_lower_bound);
        let inclusive = options["includeLowerBoundEvent"].as_bool().unwrap_or(false);

        scoped
            .filter(|e| match lower_bound {
                None => true,
                Some(bound) => event_id(e) > bound || (inclusive && event_id(e) == bound),
            })
            .cloned()
            .collect()
    }

    fn erase(&self, subject: &str) {
        let mut log = self.log.lock().unwrap();
        for event in log
            .iter_mut()
            .filter(|e| covers(subject, e["subject"].as_str().unwrap_or_default()))
        {
            event["data"] = Value::Null;
        }
    }
}

fn covers(parent: &str, subject: &str) -> bool {
    parent == "/" || subject == parent || subject.starts_with(&format!("{parent}/"))
}

fn event_id(event: &Value) -> Uuid {
    event["id"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default()
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn ndjson(lines: impl IntoIterator<Item = String>) -> Response {
    let body: String = lines.into_iter().map(|l| format!("{l}\n")).collect();
    ([(header::CONTENT_TYPE, "application/x-ndjson")], body).into_response()
}

type Db = State<Arc<MockDb>>;

async fn commit(State(db): Db, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    db.commit_requests.fetch_add(1, Ordering::SeqCst);
    if let Err(rejection) = db.authorize(&headers) {
        return rejection;
    }
    let response = db.apply_commit(&body);
    if response.status().is_success() && db.knobs.break_commit_body.load(Ordering::SeqCst) {
        let broken = tokio_stream::iter([
            Ok(r#"[{"id":"#.to_string()),
            Err(std::io::Error::other("connection reset mid-body")),
        ]);
        return (StatusCode::OK, Body::from_stream(broken)).into_response();
    }
    response
}

async fn stream(State(db): Db, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Err(rejection) = db.authorize(&headers) {
        return rejection;
    }
    let events = db.select(&body, false);
    ndjson(
        events
            .iter()
            .map(Value::to_string)
            .chain(std::iter::once(HEARTBEAT.to_string())),
    )
}

async fn observe(State(db): Db, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Err(rejection) = db.authorize(&headers) {
        return rejection;
    }
    db.observe_requests.lock().unwrap().push(body.clone());

    let warming_up = db
        .knobs
        .fail_observe_connects
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if warming_up {
        return error(StatusCode::SERVICE_UNAVAILABLE, "warming up");
    }

    // Subscribe before taking the backlog so nothing committed in between is lost.
    let live = BroadcastStream::new(db.live.subscribe());
    let backlog = db.select(&body, db.knobs.ignore_lower_bound.load(Ordering::SeqCst));
    let drop_after = db.knobs.observe_drops.lock().unwrap().pop_front();

    let last_backlog = backlog.last().map(event_id);
    let subject = body["subject"].as_str().unwrap_or("/").to_string();
    let latest_type = body["options"]["latestByEventType"]
        .as_str()
        .map(str::to_string);
    let live = live.filter_map(Result::ok).filter(move |e| {
        covers(&subject, e["subject"].as_str().unwrap_or_default())
            && latest_type.as_deref().is_none_or(|t| e["type"] == t)
            && last_backlog.is_none_or(|last| event_id(e) > last)
    });

    let corrupt_after = db.knobs.corrupt_observe_after.lock().unwrap().take();

    let events = tokio_stream::iter(backlog)
        .chain(live)
        .map(|e| format!("data: {e}"));
    let mut events: Pin<Box<dyn Stream<Item = String> + Send>> = match drop_after {
        Some(n) => Box::pin(events.take(n)),
        None => Box::pin(events),
    };
    if let Some(n) = corrupt_after {
        events = Box::pin(events.take(n).chain(tokio_stream::once(MALFORMED.to_string())));
    }
    let lines = tokio_stream::once(HEARTBEAT.to_string())
        .chain(events)
        .map(|line| Ok::<_, Infallible>(format!("{line}\n")));

    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(lines),
    )
        .into_response()
}

/// Query "language" understood by the mock:
/// `events`, `count`, `true`/`false`; `boom` fails at run time, anything else
/// is a syntax error.
async fn query(State(db): Db, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Err(rejection) = db.authorize(&headers) {
        return rejection;
    }
    let rows = match body["query"].as_str().unwrap_or_default().trim() {
        "events" => db.select(&json!({ "subject": "/" }), false),
        "count" => vec![json!({ "count": db.log_len() })],
        "true" => vec![json!({ "result": true })],
        "false" => vec![json!({ "result": false })],
        "boom" => {
            return error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "type mismatch during aggregation",
            );
        }
        other => {
            return error(
                StatusCode::BAD_REQUEST,
                &format!("syntax error near '{other}'"),
            );
        }
    };
    ndjson(rows.iter().map(Value::to_string))
}

async fn erase(State(db): Db, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Err(rejection) = db.authorize(&headers) {
        return rejection;
    }
    match body["subject"].as_str() {
        Some(subject) => {
            db.erase(subject);
            StatusCode::OK.into_response()
        }
        None => error(StatusCode::BAD_REQUEST, "subject is required"),
    }
}

async fn ping(State(db): Db, headers: HeaderMap) -> Response {
    if let Err(rejection) = db.authorize(&headers) {
        return rejection;
    }
    "pong".into_response()
}

async fn audit(State(db): Db, headers: HeaderMap) -> Response {
    if let Err(rejection) = db.authorize(&headers) {
        return rejection;
    }
    Json(json!({ "status": "ok", "events": db.log_len() })).into_response()
}

fn router(db: Arc<MockDb>) -> Router {
    Router::new()
        .route("/api/v1/commit", post(commit))
        .route("/api/v1/stream", post(stream))
        .route("/api/v1/observe", post(observe))
        .route("/api/v1/q", post(query))
        .route("/api/v1/erase", post(erase))
        .route("/api/v1/status/ping", get(ping))
        .route("/api/v1/status/audit", get(audit))
        .with_state(db)
}

pub struct TestServer {
    pub base_url: String,
    pub db: Arc<MockDb>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        let db = Arc::new(MockDb::new());
        let app = router(Arc::clone(&db));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{addr}");

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            db,
            handle,
        }
    }

    pub fn client(&self) -> GenesisClient {
        self.client_with_token(TOKEN)
    }

    pub fn client_with_token(&self, token: &str) -> GenesisClient {
        let config = ClientConfig::new(&self.base_url, "v1", token)
            .unwrap()
            .with_request_timeout(Duration::from_secs(5));
        GenesisClient::new(config).unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Accepts TCP connections and never writes a byte back.
pub struct SilentServer {
    pub base_url: String,
    pub connections: Arc<AtomicUsize>,
    handle: tokio::task::JoinHandle<()>,
}

impl SilentServer {
    pub async fn spawn() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let connections = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&connections);
        let handle = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                held.push(socket);
            }
        });

        Self {
            base_url,
            connections,
            handle,
        }
    }

    pub fn client(&self, request_timeout: Duration) -> GenesisClient {
        let config = ClientConfig::new(&self.base_url, "v1", TOKEN)
            .unwrap()
            .with_request_timeout(request_timeout);
        GenesisClient::new(config).unwrap()
    }
}

impl Drop for SilentServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn subject(path: &str) -> Subject {
    Subject::new(path).unwrap()
}

pub fn new_event(path: &str, event_type: &str, data: Value) -> NewEvent {
    NewEvent::new("io.genesisdb.app", subject(path), event_type, &data).unwrap()
}

/// Reconnect quickly so tests do not sit in backoff.
pub fn fast_reconnect() -> ReconnectPolicy {
    ReconnectPolicy::fixed(Some(20), Duration::from_millis(10))
}

/// Next item from an observation, failing the test if nothing arrives in time.
pub async fn next_within(observation: &mut Observation) -> Option<ClientResult<Event>> {
    tokio::time::timeout(Duration::from_secs(5), observation.next_event())
        .await
        .expect("observation produced nothing within 5s")
}

/// Assert that no event arrives for a short while.
pub async fn assert_quiet(observation: &mut Observation) {
    let next = tokio::time::timeout(Duration::from_millis(200), observation.next_event()).await;
    assert!(next.is_err(), "unexpected delivery: {next:?}");
}
