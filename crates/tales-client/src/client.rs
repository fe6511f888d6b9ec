use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::Stream;
use reqwest::StatusCode;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE};
use tales_stream::{EventSink, EventStreamReader, Framing, StreamSummary};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{Result, TalesClientError};
use crate::types::{SpeakRequest, SpeakResponse, Story, StoryRequest};

/// Raw bytes of a generation run as they arrive
pub type ByteStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send>>;

/// Default number of extra attempts for story fetches
pub const DEFAULT_RETRIES: u32 = 3;

/// Default pause between story fetch attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Typed client for the AudioTales web app
#[derive(Debug, Clone)]
pub struct TalesClient {
    base_url: Url,
    http: reqwest::Client,
    retries: u32,
    retry_delay: Duration,
    request_timeout: Option<Duration>,
}

impl TalesClient {
    /// Create a new client pointing at the given base URL
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| TalesClientError::Config(format!("invalid base URL: {e}")))?;

        Self::from_url(base_url)
    }

    /// Create a new client from an already parsed URL
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not an http(s) URL
    pub fn from_url(base_url: Url) -> Result<Self> {
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(TalesClientError::Config(format!(
                "base URL must use http or https, got '{}'",
                base_url.scheme()
            )));
        }

        Ok(Self {
            base_url,
            http: reqwest::Client::new(),
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            request_timeout: None,
        })
    }

    /// Set how often story fetches are retried and how long to wait between attempts
    #[must_use]
    pub const fn with_retries(mut self, retries: u32, retry_delay: Duration) -> Self {
        self.retries = retries;
        self.retry_delay = retry_delay;
        self
    }

    /// Bound every request except generation streams
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    // -- Generation --

    /// Start a story generation run and return its event byte stream
    ///
    /// The stream is not subject to the request timeout; a run takes as
    /// long as the writer and illustrator need.
    pub async fn generate(&self, request: &StoryRequest) -> Result<ByteStream> {
        let url = make_url(&self.base_url, "/api/run-script");

        tracing::info!(pages = request.pages, path = %request.path, "starting story generation");

        let response = self
            .http
            .post(url.as_str())
            .header(CACHE_CONTROL, "no-store")
            .json(request)
            .send()
            .await?;
        let response = handle_error(response).await?;

        // a rejected prompt comes back as a plain JSON document instead of a stream
        if is_json(&response) {
            let body = response.text().await?;
            return Err(parse_generation_reply(&body));
        }

        Ok(Box::pin(response.bytes_stream()))
    }

    /// Run a generation and feed every event to `sink` until the run ends
    ///
    /// Returns the reader's summary; a run that failed server-side is
    /// reported through [`StreamSummary::outcome`], not as an error.
    pub async fn run_generation<K>(
        &self,
        request: &StoryRequest,
        framing: Framing,
        sink: &mut K,
        cancel: &CancellationToken,
    ) -> Result<StreamSummary>
    where
        K: EventSink + ?Sized,
    {
        let stream = self.generate(request).await?;
        let summary = EventStreamReader::new(framing)
            .consume_until(stream, sink, cancel)
            .await?;

        Ok(summary)
    }

    // -- Speech --

    /// Synthesize narration for `request` and return it base64-encoded
    pub async fn speak(&self, request: &SpeakRequest) -> Result<String> {
        request.validate().map_err(TalesClientError::InvalidRequest)?;

        let url = make_url(&self.base_url, "/api/speak");
        let response = self
            .timed(self.http.post(url.as_str()))
            .json(request)
            .send()
            .await?;

        let reply: SpeakResponse = handle_error(response).await?.json().await?;

        if !reply.success {
            let message = reply.error.unwrap_or_else(|| "speech synthesis failed".to_owned());
            return Err(TalesClientError::Api {
                status: StatusCode::OK.as_u16(),
                message,
                details: reply.details,
            });
        }

        let audio = reply
            .audio_data
            .filter(|audio| !audio.is_empty())
            .ok_or_else(|| TalesClientError::Parse("speech reply carried no audio".to_owned()))?;

        tracing::debug!(voice = %request.voice, bytes = audio.len(), "synthesized narration");

        Ok(audio)
    }

    /// Voices the speech service offers
    pub async fn voices(&self) -> Result<Vec<String>> {
        let url = make_url(&self.base_url, "/api/voices");
        let response = self.timed(self.http.get(url.as_str())).send().await?;

        Ok(handle_error(response).await?.json().await?)
    }

    // -- Stories --

    /// Every story with at least one complete page
    pub async fn list_stories(&self) -> Result<Vec<Story>> {
        let url = &make_url(&self.base_url, "/api/stories");

        self.with_retry("list stories", || async move {
            let response = self.fetch(url).await?;
            Ok(handle_error(response).await?.json().await?)
        })
        .await
    }

    /// A single story by title, or `None` if the web app does not know it
    pub async fn get_story(&self, title: &str) -> Result<Option<Story>> {
        if title.trim().is_empty() {
            return Err(TalesClientError::InvalidRequest("story title is required".to_owned()));
        }

        let url = &story_url(&self.base_url, title)?;

        self.with_retry("get story", || async move {
            let response = self.fetch(url).await?;
            if response.status() == StatusCode::NOT_FOUND {
                tracing::debug!(title, "story not found");
                return Ok(None);
            }
            Ok(Some(handle_error(response).await?.json().await?))
        })
        .await
    }

    async fn fetch(&self, url: &Url) -> Result<reqwest::Response> {
        Ok(self
            .timed(self.http.get(url.as_str()))
            .header(CACHE_CONTROL, "no-store")
            .send()
            .await?)
    }

    fn timed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.request_timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        }
    }

    /// Run `attempt`, retrying transient failures up to `retries` more times
    async fn with_retry<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut remaining = self.retries;

        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(e) if remaining > 0 && e.is_retryable() => {
                    tracing::warn!(operation, remaining, "request failed, retrying: {e}");
                    remaining -= 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Build a URL for a fixed API path
fn make_url(base_url: &Url, path: &str) -> Url {
    let mut url = base_url.clone();
    url.set_path(path);
    url
}

/// Build `/api/stories/{title}` with the title encoded as one path segment
fn story_url(base_url: &Url, title: &str) -> Result<Url> {
    let mut url = base_url.clone();
    url.path_segments_mut()
        .map_err(|()| TalesClientError::Config(format!("base URL {base_url} cannot carry a path")))?
        .clear()
        .extend(["api", "stories", title]);
    Ok(url)
}

fn is_json(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"))
}

/// Check an HTTP response for errors
async fn handle_error(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let (message, details) = parse_error_body(&body);
    let message = if message.is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_owned()
    } else {
        message
    };

    Err(TalesClientError::Api {
        status: status.as_u16(),
        message,
        details,
    })
}

/// Parse an error response body into (message, details)
///
/// Accepts `{error, details}` as the web app sends it and the nested
/// `{error: {message}}` shape upstream providers use.
fn parse_error_body(body: &str) -> (String, Option<String>) {
    let Ok(json) = serde_json::from_str::<serde_json::Value>(body) else {
        return (body.trim().to_owned(), None);
    };

    let error = &json["error"];
    let message = error
        .as_str()
        .or_else(|| error["message"].as_str())
        .or_else(|| json["message"].as_str())
        .map_or_else(|| body.trim().to_owned(), str::to_owned);
    let details = json["details"].as_str().map(str::to_owned);

    (message, details)
}

/// Interpret a JSON document returned where a generation stream was expected
fn parse_generation_reply(body: &str) -> TalesClientError {
    let json: serde_json::Value = match serde_json::from_str(body) {
        Ok(json) => json,
        Err(e) => return TalesClientError::Parse(format!("unexpected generation reply: {e}")),
    };

    if json["error"].as_str() == Some("contentFilterError") {
        let message = json["message"]
            .as_str()
            .unwrap_or("the story prompt was rejected")
            .to_owned();
        tracing::warn!("story prompt rejected by the content filter: {message}");
        return TalesClientError::ContentFilter(message);
    }

    let (message, details) = parse_error_body(body);
    TalesClientError::Api {
        status: StatusCode::OK.as_u16(),
        message,
        details,
    }
}
