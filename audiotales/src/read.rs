use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use async_trait::async_trait;
use tales_client::{Page, SpeakRequest, TalesClient};
use tales_config::PlaybackConfig;
use tales_narration::{
    AudioSession, HeadlessBackend, NarrationError, NarrationSource, SessionOptions, StoryNarrator,
};
use tokio_util::sync::CancellationToken;

/// What to read and how
#[derive(Debug)]
pub struct ReadOptions {
    pub title: String,
    /// 1-based page to start from
    pub page: u32,
    pub voice: Option<String>,
    pub speed: Option<f64>,
}

/// Synthesizes each page's text through the speech endpoint
struct SpeechSource {
    client: TalesClient,
    title: String,
    pages: Vec<Page>,
    voice: String,
    speed: f64,
}

#[async_trait]
impl NarrationSource for SpeechSource {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_id(&self, page_index: usize) -> String {
        format!("{}#{}", self.title, page_index + 1)
    }

    async fn narration(&self, page_index: usize) -> tales_narration::Result<String> {
        let page = self.pages.get(page_index).ok_or_else(|| NarrationError::Source {
            page: page_index,
            message: "no such page".to_owned(),
        })?;

        let request = SpeakRequest {
            text: page.txt.clone(),
            voice: self.voice.clone(),
            speed: Some(self.speed),
        };

        self.client
            .speak(&request)
            .await
            .map_err(|e| NarrationError::Source {
                page: page_index,
                message: e.to_string(),
            })
    }
}

/// Fetch a story and read it aloud until the last page or until `cancel` fires
pub async fn run(
    client: TalesClient,
    playback: &PlaybackConfig,
    options: ReadOptions,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let voice = options.voice.unwrap_or_else(|| playback.default_voice.clone());
    if !tales_narration::is_supported_voice(&voice) {
        bail!(
            "unknown voice '{voice}'; available voices are: {}",
            tales_narration::AVAILABLE_VOICES.join(", ")
        );
    }

    let speed = options.speed.unwrap_or(playback.speed);
    if !tales_narration::is_supported_speed(speed) {
        bail!("speed must be between 0.25 and 4.0, got {speed}");
    }

    let story = client
        .get_story(&options.title)
        .await?
        .ok_or_else(|| anyhow!("story '{}' not found", options.title))?;

    let start_page = usize::try_from(options.page.saturating_sub(1))?;
    if start_page >= story.pages.len() {
        bail!(
            "'{}' has {} page(s); cannot start at page {}",
            story.story,
            story.pages.len(),
            options.page
        );
    }

    let session = AudioSession::new(
        Arc::new(HeadlessBackend::new()),
        SessionOptions {
            ready_timeout: playback.ready_timeout()?,
            preload_depth: playback.preload_depth,
            voice: voice.clone(),
        },
    );

    tracing::info!(title = %story.story, pages = story.pages.len(), %voice, speed, "reading story");

    let source = SpeechSource {
        client,
        title: story.story,
        pages: story.pages,
        voice,
        speed,
    };
    let narrator = StoryNarrator::new(session.clone(), source).with_preload_next(playback.preload_next);

    let result = narrator.run(start_page, cancel).await;
    session.shutdown().await;

    let report = result.context("narration failed")?;
    if report.stopped_early {
        tracing::info!(pages_played = report.pages_played, "stopped reading");
    } else {
        println!("The end. ({} page(s) read)", report.pages_played);
    }

    Ok(())
}
