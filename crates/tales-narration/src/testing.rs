//! In-memory media backend for exercising the session without audio hardware

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::watch;

use crate::backend::{MediaBackend, MediaHandle, PlaybackEnd};
use crate::error::{NarrationError, Result};

/// Observable phase of a mock resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockPhase {
    Loading,
    Ready,
    Playing,
    Paused,
    Ended,
    Failed(String),
    Released,
}

#[derive(Debug, Clone, Copy)]
enum Readiness {
    Immediate,
    After(Duration),
    Never,
}

struct MockState {
    loads: AtomicUsize,
    releases: AtomicUsize,
    readiness: Mutex<Readiness>,
    fail_ready: Mutex<HashSet<Bytes>>,
    fail_play: Mutex<HashSet<Bytes>>,
    handles: Mutex<Vec<Arc<MockHandle>>>,
}

/// Media backend that records every load and release
#[derive(Clone)]
pub struct MockBackend {
    state: Arc<MockState>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(MockState {
                loads: AtomicUsize::new(0),
                releases: AtomicUsize::new(0),
                readiness: Mutex::new(Readiness::Immediate),
                fail_ready: Mutex::new(HashSet::new()),
                fail_play: Mutex::new(HashSet::new()),
                handles: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Delay readiness of every subsequently loaded resource
    #[must_use]
    pub fn with_ready_delay(self, delay: Duration) -> Self {
        *lock(&self.state.readiness) = Readiness::After(delay);
        self
    }

    /// Never confirm readiness, forcing the bounded wait to elapse
    #[must_use]
    pub fn never_ready(self) -> Self {
        *lock(&self.state.readiness) = Readiness::Never;
        self
    }

    /// Make readiness fail for this payload
    pub fn fail_ready_for(&self, audio: &[u8]) {
        lock(&self.state.fail_ready).insert(Bytes::copy_from_slice(audio));
    }

    /// Make playback start fail for this payload
    pub fn fail_play_for(&self, audio: &[u8]) {
        lock(&self.state.fail_play).insert(Bytes::copy_from_slice(audio));
    }

    /// Number of resources created
    pub fn loads(&self) -> usize {
        self.state.loads.load(Ordering::SeqCst)
    }

    /// Number of resources released
    pub fn releases(&self) -> usize {
        self.state.releases.load(Ordering::SeqCst)
    }

    /// Resources created but not yet released
    pub fn live(&self) -> usize {
        self.loads() - self.releases()
    }

    /// Number of resources currently producing sound
    pub fn playing(&self) -> usize {
        lock(&self.state.handles)
            .iter()
            .filter(|handle| handle.phase() == MockPhase::Playing)
            .count()
    }

    /// Phase of the most recent resource created for `audio`
    pub fn phase_of(&self, audio: &[u8]) -> Option<MockPhase> {
        lock(&self.state.handles)
            .iter()
            .rev()
            .find(|handle| handle.audio == audio)
            .map(|handle| handle.phase())
    }

    /// Simulate the natural end of the playing resource for `audio`
    ///
    /// Returns false if no such resource is playing.
    pub fn finish(&self, audio: &[u8]) -> bool {
        self.signal(audio, MockPhase::Ended)
    }

    /// Simulate a media error on the playing resource for `audio`
    pub fn fail(&self, audio: &[u8], reason: &str) -> bool {
        self.signal(audio, MockPhase::Failed(reason.to_owned()))
    }

    fn signal(&self, audio: &[u8], phase: MockPhase) -> bool {
        let handles = lock(&self.state.handles);
        let Some(handle) = handles
            .iter()
            .find(|handle| handle.audio == audio && handle.phase() == MockPhase::Playing)
        else {
            return false;
        };

        handle.phase.send_replace(phase);
        true
    }
}

#[async_trait]
impl MediaBackend for MockBackend {
    async fn load(&self, audio: Bytes) -> Result<Arc<dyn MediaHandle>> {
        self.state.loads.fetch_add(1, Ordering::SeqCst);

        let handle = Arc::new(MockHandle {
            fail_ready: lock(&self.state.fail_ready).contains(&audio),
            fail_play: lock(&self.state.fail_play).contains(&audio),
            readiness: *lock(&self.state.readiness),
            audio,
            phase: watch::Sender::new(MockPhase::Loading),
            released: AtomicBool::new(false),
            backend: Arc::clone(&self.state),
        });

        lock(&self.state.handles).push(Arc::clone(&handle));
        Ok(handle)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

struct MockHandle {
    audio: Bytes,
    readiness: Readiness,
    fail_ready: bool,
    fail_play: bool,
    phase: watch::Sender<MockPhase>,
    released: AtomicBool,
    backend: Arc<MockState>,
}

impl MockHandle {
    fn phase(&self) -> MockPhase {
        self.phase.borrow().clone()
    }

    fn ensure_live(&self) -> Result<()> {
        if self.released.load(Ordering::SeqCst) {
            return Err(NarrationError::media("resource already released"));
        }
        Ok(())
    }
}

#[async_trait]
impl MediaHandle for MockHandle {
    async fn wait_ready(&self) -> Result<()> {
        match self.readiness {
            Readiness::Immediate => {}
            Readiness::After(delay) => tokio::time::sleep(delay).await,
            Readiness::Never => std::future::pending::<()>().await,
        }

        self.ensure_live()?;
        if self.fail_ready {
            return Err(NarrationError::media("failed to load audio"));
        }

        self.phase.send_if_modified(|phase| {
            let loading = *phase == MockPhase::Loading;
            if loading {
                *phase = MockPhase::Ready;
            }
            loading
        });
        Ok(())
    }

    async fn play(&self) -> Result<()> {
        self.ensure_live()?;
        if self.fail_play {
            return Err(NarrationError::media("playback was not allowed"));
        }

        self.phase.send_replace(MockPhase::Playing);
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.ensure_live()?;
        self.phase.send_if_modified(|phase| {
            let playing = *phase == MockPhase::Playing;
            if playing {
                *phase = MockPhase::Paused;
            }
            playing
        });
        Ok(())
    }

    async fn finished(&self) -> PlaybackEnd {
        let mut phase = self.phase.subscribe();
        loop {
            match &*phase.borrow_and_update() {
                MockPhase::Ended => return PlaybackEnd::Finished,
                MockPhase::Failed(reason) => return PlaybackEnd::Failed(reason.clone()),
                _ => {}
            }

            if phase.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    async fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }

        self.phase.send_replace(MockPhase::Released);
        self.backend.releases.fetch_add(1, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
