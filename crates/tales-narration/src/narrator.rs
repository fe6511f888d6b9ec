use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::session::AudioSession;

/// Supplies narration audio for the pages of one story
#[async_trait]
pub trait NarrationSource: Send + Sync {
    /// Number of pages in the story
    fn page_count(&self) -> usize;

    /// Identifier the session uses for the page at `page_index`
    fn page_id(&self, page_index: usize) -> String {
        format!("page-{}", page_index + 1)
    }

    /// Base64 narration audio for the page at `page_index`
    async fn narration(&self, page_index: usize) -> Result<String>;
}

/// Outcome of reading a story aloud
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NarrationReport {
    /// Pages whose narration played to the end
    pub pages_played: usize,
    /// Whether reading stopped before the last page
    pub stopped_early: bool,
}

/// Reads a story aloud page by page, advancing when each page's narration ends
pub struct StoryNarrator<S> {
    session: AudioSession,
    source: S,
    preload_next: bool,
    completion_grace: Duration,
}

impl<S: NarrationSource> StoryNarrator<S> {
    pub fn new(session: AudioSession, source: S) -> Self {
        Self {
            session,
            source,
            preload_next: true,
            completion_grace: Duration::from_millis(250),
        }
    }

    /// Whether to warm the next page while the current one plays
    #[must_use]
    pub const fn with_preload_next(mut self, preload_next: bool) -> Self {
        self.preload_next = preload_next;
        self
    }

    pub const fn session(&self) -> &AudioSession {
        &self.session
    }

    /// Play pages from `start_page` to the end of the story
    ///
    /// Replaces the session's completion handler for the duration of the
    /// run. Cancelling `cancel` stops playback and returns early. Pausing the
    /// session holds the run on the current page. Playback that halts
    /// without completing (a media error) ends the run.
    ///
    /// # Errors
    ///
    /// Returns an error if narration for the page about to play cannot be
    /// fetched or fails to start; the session is left stopped
    pub async fn run(&self, start_page: usize, cancel: CancellationToken) -> Result<NarrationReport> {
        let page_count = self.source.page_count();
        let (advance, mut completed) = mpsc::unbounded_channel();
        self.session.on_complete(move || {
            let _ = advance.send(());
        });
        let mut playing = self.session.subscribe();

        let mut report = NarrationReport {
            pages_played: 0,
            stopped_early: false,
        };
        let mut upcoming: Option<(usize, String)> = None;
        let mut page = start_page;

        tracing::info!(start_page, page_count, "reading story aloud");

        while page < page_count {
            let audio = match upcoming.take() {
                Some((index, audio)) if index == page => audio,
                _ => {
                    let fetched = tokio::select! {
                        biased;
                        () = cancel.cancelled() => None,
                        audio = self.source.narration(page) => Some(audio),
                    };
                    let Some(fetched) = fetched else {
                        report.stopped_early = true;
                        break;
                    };
                    match fetched {
                        Ok(audio) => audio,
                        Err(e) => {
                            self.session.stop().await?;
                            return Err(e);
                        }
                    }
                }
            };

            let page_id = self.source.page_id(page);
            if let Err(e) = self.session.play(audio, &page_id).await {
                tracing::error!(page_id, "failed to play narration: {e}");
                self.session.stop().await?;
                return Err(e);
            }

            if self.preload_next && page + 1 < page_count {
                upcoming = self.warm_next(page + 1, &cancel).await;
            }

            let finished = self.wait_for_page(&page_id, &mut completed, &mut playing, &cancel).await;

            if !finished {
                if !cancel.is_cancelled() {
                    tracing::warn!(page_id, "narration stopped before the page finished");
                }
                self.session.stop().await?;
                report.stopped_early = true;
                break;
            }

            tracing::debug!(page_id, "page narration finished");
            report.pages_played += 1;
            page += 1;
        }

        tracing::info!(
            pages_played = report.pages_played,
            stopped_early = report.stopped_early,
            "finished reading"
        );

        Ok(report)
    }

    /// Wait until the playing page completes, is cancelled, or halts
    ///
    /// A page that is paused stays loaded as the session's current page and
    /// keeps the run waiting until it is resumed. Anything else that stops
    /// playback without completing, such as a media error or an outside
    /// `stop`, clears the current page and counts as a halt.
    async fn wait_for_page(
        &self,
        page_id: &str,
        completed: &mut mpsc::UnboundedReceiver<()>,
        playing: &mut watch::Receiver<bool>,
        cancel: &CancellationToken,
    ) -> bool {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return false,
                Some(()) = completed.recv() => return true,
                () = playback_halted(playing) => {}
            }

            // completion is signalled right after the playing flag drops
            if let Ok(Some(())) = tokio::time::timeout(self.completion_grace, completed.recv()).await {
                return true;
            }

            if self.session.current_page().as_deref() != Some(page_id) {
                return false;
            }

            tracing::debug!(page_id, "narration paused");
            tokio::select! {
                biased;
                () = cancel.cancelled() => return false,
                Some(()) = completed.recv() => return true,
                () = playback_resumed(playing) => tracing::debug!(page_id, "narration resumed"),
                () = tokio::time::sleep(self.completion_grace) => {}
            }
        }
    }

    /// Fetch and preload the page after the current one
    async fn warm_next(&self, page: usize, cancel: &CancellationToken) -> Option<(usize, String)> {
        let fetched = tokio::select! {
            biased;
            () = cancel.cancelled() => return None,
            audio = self.source.narration(page) => audio,
        };

        let audio = match fetched {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!(page, "failed to fetch narration for preloading: {e}");
                return None;
            }
        };

        if let Err(e) = self.session.preload(audio.as_str()).await {
            tracing::warn!(page, "failed to preload narration: {e}");
        }

        Some((page, audio))
    }
}

async fn playback_halted(playing: &mut watch::Receiver<bool>) {
    if playing.wait_for(|playing| !*playing).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn playback_resumed(playing: &mut watch::Receiver<bool>) {
    if playing.wait_for(|playing| *playing).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;

    use super::*;
    use crate::error::NarrationError;
    use crate::session::SessionOptions;
    use crate::testing::{MockBackend, MockPhase};

    const PAGES: [&[u8]; 3] = [b"once upon a time", b"there was a fox", b"the end"];

    struct Pages {
        fail_on: Option<usize>,
    }

    #[async_trait]
    impl NarrationSource for Pages {
        fn page_count(&self) -> usize {
            PAGES.len()
        }

        async fn narration(&self, page_index: usize) -> Result<String> {
            if self.fail_on == Some(page_index) {
                return Err(NarrationError::Source {
                    page: page_index,
                    message: "speech service unavailable".to_owned(),
                });
            }
            Ok(STANDARD.encode(PAGES[page_index]))
        }
    }

    fn narrator(backend: &MockBackend, fail_on: Option<usize>) -> Arc<StoryNarrator<Pages>> {
        let session = AudioSession::new(Arc::new(backend.clone()), SessionOptions::default());
        Arc::new(StoryNarrator::new(session, Pages { fail_on }))
    }

    async fn finish_when_playing(backend: &MockBackend, audio: &[u8]) {
        while !backend.finish(audio) {
            tokio::task::yield_now().await;
        }
    }

    async fn wait_until_playing(backend: &MockBackend) {
        while backend.playing() == 0 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn reads_every_page_in_order() {
        let backend = MockBackend::new();
        let narrator = narrator(&backend, None);

        let run = {
            let narrator = Arc::clone(&narrator);
            tokio::spawn(async move { narrator.run(0, CancellationToken::new()).await })
        };

        for audio in PAGES {
            finish_when_playing(&backend, audio).await;
        }

        let report = run.await.unwrap().unwrap();
        assert_eq!(report.pages_played, 3);
        assert!(!report.stopped_early);
        // pages after the first were promoted from the preload queue
        assert_eq!(backend.loads(), 3);
        assert_eq!(backend.live(), 0);
        assert!(!narrator.session().is_playing());
    }

    #[tokio::test]
    async fn starts_from_requested_page() {
        let backend = MockBackend::new();
        let narrator = narrator(&backend, None);

        let run = {
            let narrator = Arc::clone(&narrator);
            tokio::spawn(async move { narrator.run(2, CancellationToken::new()).await })
        };

        finish_when_playing(&backend, PAGES[2]).await;

        let report = run.await.unwrap().unwrap();
        assert_eq!(report.pages_played, 1);
        assert_eq!(backend.phase_of(PAGES[0]), None);
    }

    #[tokio::test]
    async fn without_preloading_each_page_loads_once() {
        let backend = MockBackend::new();
        let session = AudioSession::new(Arc::new(backend.clone()), SessionOptions::default());
        let narrator = Arc::new(StoryNarrator::new(session, Pages { fail_on: None }).with_preload_next(false));

        let run = {
            let narrator = Arc::clone(&narrator);
            tokio::spawn(async move { narrator.run(0, CancellationToken::new()).await })
        };

        for audio in PAGES {
            finish_when_playing(&backend, audio).await;
            assert_eq!(narrator.session().preloaded_count(), 0);
        }

        assert_eq!(run.await.unwrap().unwrap().pages_played, 3);
        assert_eq!(backend.loads(), 3);
    }

    #[tokio::test]
    async fn cancel_stops_reading() {
        let backend = MockBackend::new();
        let narrator = narrator(&backend, None);
        let cancel = CancellationToken::new();

        let run = {
            let narrator = Arc::clone(&narrator);
            let cancel = cancel.clone();
            tokio::spawn(async move { narrator.run(0, cancel).await })
        };

        finish_when_playing(&backend, PAGES[0]).await;
        wait_until_playing(&backend).await;
        cancel.cancel();

        let report = run.await.unwrap().unwrap();
        assert_eq!(report.pages_played, 1);
        assert!(report.stopped_early);
        assert!(!narrator.session().is_playing());
    }

    #[tokio::test]
    async fn source_failure_ends_run() {
        let backend = MockBackend::new();
        let narrator = narrator(&backend, Some(1));

        let run = {
            let narrator = Arc::clone(&narrator);
            tokio::spawn(async move { narrator.run(0, CancellationToken::new()).await })
        };

        finish_when_playing(&backend, PAGES[0]).await;

        let err = run.await.unwrap().unwrap_err();
        assert!(matches!(err, NarrationError::Source { page: 1, .. }));
        assert!(!narrator.session().is_playing());
        assert_eq!(backend.live(), 0);
    }

    #[tokio::test]
    async fn media_error_stops_early() {
        let backend = MockBackend::new();
        let narrator = narrator(&backend, None);

        let run = {
            let narrator = Arc::clone(&narrator);
            tokio::spawn(async move { narrator.run(0, CancellationToken::new()).await })
        };

        finish_when_playing(&backend, PAGES[0]).await;
        while !backend.fail(PAGES[1], "decoder stalled") {
            tokio::task::yield_now().await;
        }

        let report = run.await.unwrap().unwrap();
        assert_eq!(report.pages_played, 1);
        assert!(report.stopped_early);
        assert_eq!(backend.live(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn pausing_keeps_the_run_waiting() {
        let backend = MockBackend::new();
        let narrator = narrator(&backend, None);

        let run = {
            let narrator = Arc::clone(&narrator);
            tokio::spawn(async move { narrator.run(0, CancellationToken::new()).await })
        };

        wait_until_playing(&backend).await;
        narrator.session().pause().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(!run.is_finished());
        assert_eq!(backend.phase_of(PAGES[0]), Some(MockPhase::Paused));
        assert_eq!(narrator.session().current_page().as_deref(), Some("page-1"));

        narrator.session().resume().await.unwrap();
        for audio in PAGES {
            finish_when_playing(&backend, audio).await;
        }

        let report = run.await.unwrap().unwrap();
        assert_eq!(report.pages_played, 3);
        assert!(!report.stopped_early);
    }

    #[tokio::test]
    async fn start_past_the_end_plays_nothing() {
        let backend = MockBackend::new();
        let narrator = narrator(&backend, None);

        let report = narrator.run(5, CancellationToken::new()).await.unwrap();

        assert_eq!(
            report,
            NarrationReport {
                pages_played: 0,
                stopped_early: false
            }
        );
        assert_eq!(backend.loads(), 0);
    }
}
