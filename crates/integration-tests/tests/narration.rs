//! Reading a story aloud end to end: story fetch, speech synthesis, playback

mod harness;

use std::sync::Arc;

use async_trait::async_trait;
use harness::config::{ConfigBuilder, client};
use harness::mock_tales::{MockStory, MockTales};
use tales_client::{Page, SpeakRequest, TalesClient};
use tales_narration::testing::MockBackend;
use tales_narration::{AudioSession, NarrationError, NarrationSource, SessionOptions, StoryNarrator};
use tokio_util::sync::CancellationToken;

const PAGES: [&str; 3] = [
    "Once there was a fox who wanted to sail.",
    "She built a boat from an old shoe.",
    "And she sailed to the moon. The end.",
];

struct SpeechSource {
    client: TalesClient,
    pages: Vec<Page>,
    voice: String,
}

#[async_trait]
impl NarrationSource for SpeechSource {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    async fn narration(&self, page_index: usize) -> tales_narration::Result<String> {
        let request = SpeakRequest {
            text: self.pages[page_index].txt.clone(),
            voice: self.voice.clone(),
            speed: None,
        };
        self.client.speak(&request).await.map_err(|e| NarrationError::Source {
            page: page_index,
            message: e.to_string(),
        })
    }
}

async fn setup(mock: &MockTales, voice: &str) -> (MockBackend, Arc<StoryNarrator<SpeechSource>>) {
    let config = ConfigBuilder::new(&mock.base_url()).with_voice(voice).build();
    let client = client(&config);
    let story = client.get_story("The Sailing Fox").await.unwrap().unwrap();

    let backend = MockBackend::new();
    let session = AudioSession::new(
        Arc::new(backend.clone()),
        SessionOptions {
            ready_timeout: config.playback.ready_timeout().unwrap(),
            preload_depth: config.playback.preload_depth,
            voice: config.playback.default_voice.clone(),
        },
    );
    let source = SpeechSource {
        client,
        pages: story.pages,
        voice: config.playback.default_voice.clone(),
    };

    (backend, Arc::new(StoryNarrator::new(session, source)))
}

async fn finish_when_playing(backend: &MockBackend, text: &str) {
    while !backend.finish(text.as_bytes()) {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn reads_whole_story_aloud() {
    let mock = MockTales::builder()
        .with_story(MockStory::new("The Sailing Fox", &PAGES))
        .start()
        .await
        .unwrap();
    let (backend, narrator) = setup(&mock, "fable").await;

    let run = {
        let narrator = Arc::clone(&narrator);
        tokio::spawn(async move { narrator.run(0, CancellationToken::new()).await })
    };

    for text in PAGES {
        finish_when_playing(&backend, text).await;
    }

    let report = run.await.unwrap().unwrap();
    assert_eq!(report.pages_played, 3);
    assert!(!report.stopped_early);
    assert_eq!(mock.speak_count(), 3);
    assert_eq!(mock.spoken_voices(), ["fable", "fable", "fable"]);
    assert_eq!(backend.live(), 0);
    assert_eq!(narrator.session().current_voice(), "fable");
}

#[tokio::test]
async fn stopping_mid_story_releases_everything() {
    let mock = MockTales::builder()
        .with_story(MockStory::new("The Sailing Fox", &PAGES))
        .start()
        .await
        .unwrap();
    let (backend, narrator) = setup(&mock, "nova").await;
    let cancel = CancellationToken::new();

    let run = {
        let narrator = Arc::clone(&narrator);
        let cancel = cancel.clone();
        tokio::spawn(async move { narrator.run(0, cancel).await })
    };

    finish_when_playing(&backend, PAGES[0]).await;
    while backend.playing() == 0 {
        tokio::task::yield_now().await;
    }
    cancel.cancel();

    let report = run.await.unwrap().unwrap();
    assert_eq!(report.pages_played, 1);
    assert!(report.stopped_early);
    assert!(!narrator.session().is_playing());

    narrator.session().shutdown().await;
    assert_eq!(backend.live(), 0);
}

#[tokio::test]
async fn speech_outage_ends_the_run() {
    let mock = MockTales::builder()
        .with_story(MockStory::new("The Sailing Fox", &PAGES))
        .speech_unconfigured()
        .start()
        .await
        .unwrap();
    let (backend, narrator) = setup(&mock, "nova").await;

    let err = narrator.run(0, CancellationToken::new()).await.unwrap_err();

    let NarrationError::Source { page, message } = err else {
        panic!("expected a source error, got {err:?}");
    };
    assert_eq!(page, 0);
    assert!(message.contains("not configured"));
    assert_eq!(backend.loads(), 0);
}
