//! Mock AudioTales web app for integration tests
//!
//! Serves the story, speech, voice and generation endpoints with canned
//! content. Speech "audio" is the page text itself, base64-encoded, so tests
//! can tell which page a payload belongs to.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

const VOICES: [&str; 9] = ["alloy", "echo", "fable", "onyx", "nova", "shimmer", "coral", "sage", "ash"];

/// How the generation endpoint answers
#[derive(Debug, Clone)]
pub enum Script {
    /// Stream these chunks verbatim as `text/event-stream`
    Chunks(Vec<Bytes>),
    /// Reject the prompt with a JSON content filter document
    ContentFilter(String),
    /// Fail before streaming with a 500
    Crash,
}

impl Script {
    /// One `event: {json}` frame per event, each in its own chunk
    pub fn events(events: &[serde_json::Value]) -> Self {
        Self::Chunks(
            events
                .iter()
                .map(|event| Bytes::from(format!("event: {event}\n\n")))
                .collect(),
        )
    }

    /// Raw text cut into chunks of at most `size` bytes
    pub fn split(text: &str, size: usize) -> Self {
        Self::Chunks(text.as_bytes().chunks(size).map(Bytes::copy_from_slice).collect())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockPage {
    pub txt: String,
    pub png: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockStory {
    pub story: String,
    pub pages: Vec<MockPage>,
}

impl MockStory {
    pub fn new(title: &str, texts: &[&str]) -> Self {
        let slug = title.to_lowercase().replace(' ', "-");
        Self {
            story: title.to_owned(),
            pages: texts
                .iter()
                .enumerate()
                .map(|(i, txt)| MockPage {
                    txt: (*txt).to_owned(),
                    png: format!("/stories/{slug}/page{}.png", i + 1),
                })
                .collect(),
        }
    }
}

/// Builder for a [`MockTales`] server
#[derive(Default)]
pub struct MockTalesBuilder {
    stories: Vec<MockStory>,
    script: Option<Script>,
    failing_story_fetches: u32,
    speech_unconfigured: bool,
}

impl MockTalesBuilder {
    pub fn with_story(mut self, story: MockStory) -> Self {
        self.stories.push(story);
        self
    }

    pub fn with_script(mut self, script: Script) -> Self {
        self.script = Some(script);
        self
    }

    /// Fail the first `n` story fetches with a 500
    pub fn failing_story_fetches(mut self, n: u32) -> Self {
        self.failing_story_fetches = n;
        self
    }

    /// Answer speech requests as if no API key were configured
    pub fn speech_unconfigured(mut self) -> Self {
        self.speech_unconfigured = true;
        self
    }

    /// Start the mock server, returning immediately
    pub async fn start(self) -> anyhow::Result<MockTales> {
        let state = Arc::new(MockState {
            stories: self.stories,
            script: self
                .script
                .unwrap_or_else(|| Script::events(&[serde_json::json!({"type": "runFinish"})])),
            speech_unconfigured: self.speech_unconfigured,
            failing_story_fetches: AtomicU32::new(self.failing_story_fetches),
            story_fetches: AtomicU32::new(0),
            speak_count: AtomicU32::new(0),
            last_generation: Mutex::new(None),
            spoken: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/api/run-script", routing::post(handle_run_script))
            .route("/api/speak", routing::post(handle_speak))
            .route("/api/voices", routing::get(handle_voices))
            .route("/api/stories", routing::get(handle_stories))
            .route("/api/stories/{title}", routing::get(handle_story))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(MockTales { addr, shutdown, state })
    }
}

/// Mock AudioTales web app bound to a random local port
pub struct MockTales {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

struct MockState {
    stories: Vec<MockStory>,
    script: Script,
    speech_unconfigured: bool,
    failing_story_fetches: AtomicU32,
    story_fetches: AtomicU32,
    speak_count: AtomicU32,
    last_generation: Mutex<Option<serde_json::Value>>,
    spoken: Mutex<Vec<SpeakBody>>,
}

impl MockTales {
    pub fn builder() -> MockTalesBuilder {
        MockTalesBuilder::default()
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Story list and story fetches received, failed ones included
    pub fn story_fetches(&self) -> u32 {
        self.state.story_fetches.load(Ordering::Relaxed)
    }

    pub fn speak_count(&self) -> u32 {
        self.state.speak_count.load(Ordering::Relaxed)
    }

    /// Body of the most recent generation request
    pub fn last_generation(&self) -> Option<serde_json::Value> {
        self.state.last_generation.lock().unwrap().clone()
    }

    /// Voices used by successful speech requests, in order
    pub fn spoken_voices(&self) -> Vec<String> {
        self.state
            .spoken
            .lock()
            .unwrap()
            .iter()
            .map(|body| body.voice.clone().unwrap_or_default())
            .collect()
    }
}

impl Drop for MockTales {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Base64 narration the mock returns for `text`
pub fn narration_for(text: &str) -> String {
    STANDARD.encode(text)
}

// -- Handlers --

async fn handle_run_script(State(state): State<Arc<MockState>>, Json(body): Json<serde_json::Value>) -> Response {
    *state.last_generation.lock().unwrap() = Some(body);

    match &state.script {
        Script::Chunks(chunks) => {
            let chunks: Vec<Result<Bytes, Infallible>> = chunks.iter().cloned().map(Ok).collect();
            Response::builder()
                .header(header::CONTENT_TYPE, "text/event-stream")
                .header(header::CACHE_CONTROL, "no-cache")
                .body(Body::from_stream(futures::stream::iter(chunks)))
                .unwrap()
        }
        Script::ContentFilter(message) => Json(serde_json::json!({
            "error": "contentFilterError",
            "message": message,
        }))
        .into_response(),
        Script::Crash => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": "script runner crashed"})),
        )
            .into_response(),
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SpeakBody {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    voice: Option<String>,
    #[serde(default)]
    speed: Option<f64>,
}

async fn handle_speak(State(state): State<Arc<MockState>>, Json(body): Json<SpeakBody>) -> Response {
    state.speak_count.fetch_add(1, Ordering::Relaxed);

    if state.speech_unconfigured {
        return error(
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "error": "Text-to-speech service is not configured",
                "details": "Missing API key. Please set TEXT_TO_SPEECH_API_KEY environment variable.",
            }),
        );
    }

    let Some(text) = body.text.clone().filter(|text| !text.is_empty()) else {
        return error(StatusCode::BAD_REQUEST, serde_json::json!({"error": "Text is required"}));
    };

    match body.voice.as_deref() {
        None => return error(StatusCode::BAD_REQUEST, serde_json::json!({"error": "Voice is required"})),
        Some(voice) if !VOICES.contains(&voice) => {
            return error(
                StatusCode::BAD_REQUEST,
                serde_json::json!({
                    "error": format!("Invalid voice. Available voices are: {}", VOICES.join(", "))
                }),
            );
        }
        Some(_) => {}
    }

    if body.speed.is_some_and(|speed| !(0.25..=4.0).contains(&speed)) {
        return error(
            StatusCode::BAD_REQUEST,
            serde_json::json!({"error": "Speed must be between 0.25 and 4.0"}),
        );
    }

    state.spoken.lock().unwrap().push(body);

    Json(serde_json::json!({
        "success": true,
        "audioData": narration_for(&text),
    }))
    .into_response()
}

async fn handle_voices() -> Json<Vec<&'static str>> {
    Json(VOICES.to_vec())
}

async fn handle_stories(State(state): State<Arc<MockState>>) -> Response {
    if let Some(failure) = story_fetch_failure(&state) {
        return failure;
    }

    Json(state.stories.clone()).into_response()
}

async fn handle_story(State(state): State<Arc<MockState>>, Path(title): Path<String>) -> Response {
    if let Some(failure) = story_fetch_failure(&state) {
        return failure;
    }

    match state.stories.iter().find(|story| story.story == title) {
        Some(story) => Json(story.clone()).into_response(),
        None => error(StatusCode::NOT_FOUND, serde_json::json!({"error": "Story not found"})),
    }
}

/// Count a story fetch and fail it while failures remain
fn story_fetch_failure(state: &MockState) -> Option<Response> {
    state.story_fetches.fetch_add(1, Ordering::Relaxed);

    let failing = state
        .failing_story_fetches
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |remaining| remaining.checked_sub(1))
        .is_ok();

    failing.then(|| {
        error(
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({"error": "Failed to load stories"}),
        )
    })
}

fn error(status: StatusCode, body: serde_json::Value) -> Response {
    (status, Json(body)).into_response()
}
