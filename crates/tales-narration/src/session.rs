use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::backend::{MediaBackend, MediaHandle, PlaybackEnd};
use crate::error::{NarrationError, Result};
use crate::payload::{AudioPayload, ContentKey};
use crate::preload::PreloadQueue;
use crate::resource::{AudioResource, ResourceState};
use crate::voice::DEFAULT_VOICE;

/// Default bound on waiting for the media pipeline to confirm readiness
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(1);

/// Default number of resources kept warm ahead of playback
pub const DEFAULT_PRELOAD_DEPTH: usize = 2;

/// Handler invoked after a resource finishes playing on its own
pub type CompletionCallback = Arc<dyn Fn() + Send + Sync>;

/// Tunables for an [`AudioSession`]
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// How long to wait for readiness and for playback start before proceeding anyway
    pub ready_timeout: Duration,
    /// Maximum number of preloaded resources
    pub preload_depth: usize,
    /// Initial narrator voice
    pub voice: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            ready_timeout: DEFAULT_READY_TIMEOUT,
            preload_depth: DEFAULT_PRELOAD_DEPTH,
            voice: DEFAULT_VOICE.to_owned(),
        }
    }
}

/// Owner of the single "now playing" narration resource and its preload queue
///
/// Cloning yields another handle to the same session. Every transition of a
/// resource goes through the session; callers only observe `is_playing`,
/// the current voice and the current page.
///
/// Requests follow a last-request-wins discipline: each `play` or `stop`
/// bumps a generation counter and cancels whatever request was in flight, and
/// results belonging to an older generation are discarded and released.
#[derive(Clone)]
pub struct AudioSession {
    inner: Arc<Inner>,
}

struct Inner {
    backend: Arc<dyn MediaBackend>,
    ready_timeout: Duration,
    state: Mutex<SessionState>,
    /// Serializes play, pause, resume and stop so only one mutates playback at a time
    op_lock: tokio::sync::Mutex<()>,
    playing: watch::Sender<bool>,
    on_complete: Mutex<Option<CompletionCallback>>,
}

struct SessionState {
    generation: u64,
    request: CancellationToken,
    current: Option<AudioResource>,
    queue: PreloadQueue,
    loading: HashMap<ContentKey, watch::Receiver<bool>>,
    /// Payload a `play` of this generation is preparing
    pending_play: Option<(u64, ContentKey)>,
    voice: String,
    /// Bumped on every voice change; warms begun under an older epoch are discarded
    voice_epoch: u64,
    closed: bool,
}

impl Drop for Inner {
    fn drop(&mut self) {
        lock(&self.state).request.cancel();
    }
}

impl AudioSession {
    pub fn new(backend: Arc<dyn MediaBackend>, options: SessionOptions) -> Self {
        tracing::debug!(
            backend = backend.name(),
            ready_timeout = ?options.ready_timeout,
            preload_depth = options.preload_depth,
            "creating audio session"
        );

        Self {
            inner: Arc::new(Inner {
                backend,
                ready_timeout: options.ready_timeout,
                state: Mutex::new(SessionState {
                    generation: 0,
                    request: CancellationToken::new(),
                    current: None,
                    queue: PreloadQueue::new(options.preload_depth),
                    loading: HashMap::new(),
                    pending_play: None,
                    voice: options.voice,
                    voice_epoch: 0,
                    closed: false,
                }),
                op_lock: tokio::sync::Mutex::new(()),
                playing: watch::Sender::new(false),
                on_complete: Mutex::new(None),
            }),
        }
    }

    /// Whether the current resource is producing sound
    pub fn is_playing(&self) -> bool {
        *self.inner.playing.borrow()
    }

    /// Watch `is_playing` changes
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.playing.subscribe()
    }

    pub fn current_voice(&self) -> String {
        self.state().voice.clone()
    }

    /// Page whose narration is currently loaded, playing or paused
    pub fn current_page(&self) -> Option<String> {
        self.state().current.as_ref().and_then(|resource| resource.page_id.clone())
    }

    /// Number of warmed resources waiting in the preload queue
    pub fn preloaded_count(&self) -> usize {
        self.state().queue.len()
    }

    /// Register the completion handler, replacing any previous one
    pub fn on_complete(&self, callback: impl Fn() + Send + Sync + 'static) {
        *lock(&self.inner.on_complete) = Some(Arc::new(callback));
    }

    /// Play narration for `page_id`
    ///
    /// Any resource belonging to another page (or another payload) is stopped
    /// and released first. A payload already warm in the preload queue is
    /// promoted instead of being loaded again. Readiness and playback start
    /// are each waited on for at most the configured timeout; if the pipeline
    /// stays silent the session proceeds anyway.
    ///
    /// A call superseded by a later `play` or `stop` returns `Ok(())` after
    /// releasing whatever it had prepared.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not valid base64, if the media
    /// pipeline fails to load or start the resource, or if the session has
    /// been shut down
    pub async fn play(&self, payload: impl Into<AudioPayload>, page_id: &str) -> Result<()> {
        let (audio, key) = payload.into().into_bytes()?;
        let (generation, token) = self.begin_request()?;

        let _op = self.inner.op_lock.lock().await;
        if token.is_cancelled() {
            tracing::debug!(page_id, generation, "play superseded before it started");
            return Ok(());
        }

        tracing::debug!(page_id, key = key.short(), generation, "play requested");

        if self.replay_current(&key, page_id, generation, &token).await? {
            return Ok(());
        }

        self.state().pending_play = Some((generation, key.clone()));
        let _pending = PendingPlay {
            session: self,
            generation,
        };

        let previous = self.state().current.take();
        if let Some(previous) = previous {
            self.set_playing(false);
            previous.release(ResourceState::Stopped).await;
        }

        let Some(resource) = self.acquire(audio, key, page_id, &token).await? else {
            return Ok(());
        };

        self.start(resource, page_id, generation, token).await
    }

    /// Pause the current resource without releasing it
    ///
    /// Waits for an in-flight `play` to settle first. No-op if nothing is
    /// playing.
    ///
    /// # Errors
    ///
    /// Returns an error if the media pipeline fails to pause
    pub async fn pause(&self) -> Result<()> {
        let _op = self.inner.op_lock.lock().await;

        let handle = {
            let state = self.state();
            match &state.current {
                Some(resource) if resource.state() == ResourceState::Playing => Arc::clone(&resource.handle),
                _ => return Ok(()),
            }
        };

        handle.pause().await?;

        if let Some(resource) = self.state().current.as_mut() {
            resource.transition(ResourceState::Paused);
        }
        self.set_playing(false);

        Ok(())
    }

    /// Resume a paused resource
    ///
    /// No-op if nothing is paused.
    ///
    /// # Errors
    ///
    /// Returns an error if the media pipeline refuses to restart playback
    pub async fn resume(&self) -> Result<()> {
        let _op = self.inner.op_lock.lock().await;

        let handle = {
            let state = self.state();
            match &state.current {
                Some(resource) if resource.state() == ResourceState::Paused => Arc::clone(&resource.handle),
                _ => return Ok(()),
            }
        };

        self.confirm_play(handle.as_ref()).await?;

        if let Some(resource) = self.state().current.as_mut() {
            resource.transition(ResourceState::Playing);
        }
        self.set_playing(true);

        Ok(())
    }

    /// Halt and release the current resource
    ///
    /// Interrupts an in-flight `play`, then waits for it to unwind so no
    /// half-prepared resource outlives the call. Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` mirrors the other playback operations
    pub async fn stop(&self) -> Result<()> {
        {
            let mut state = self.state();
            supersede(&mut state);
        }

        let _op = self.inner.op_lock.lock().await;

        let current = self.state().current.take();
        self.set_playing(false);

        if let Some(resource) = current {
            tracing::debug!(page_id = ?resource.page_id, "stopping playback");
            resource.release(ResourceState::Stopped).await;
        }

        Ok(())
    }

    /// Warm a resource so a later `play` of the same payload starts quickly
    ///
    /// Ignored if the payload is already queued, being loaded, or playing,
    /// including a `play` of it that has not started yet. When the queue is
    /// full the oldest entry is evicted and released. Dropping the returned
    /// future before it completes releases whatever it had loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not valid base64, if the media
    /// pipeline fails to load it, or if the session has been shut down
    pub async fn preload(&self, payload: impl Into<AudioPayload>) -> Result<()> {
        let (audio, key) = payload.into().into_bytes()?;

        let (mut slot, epoch) = {
            let mut state = self.state();
            if state.closed {
                return Err(NarrationError::Closed);
            }

            let playing = state.current.as_ref().is_some_and(|current| current.key == key);
            let starting = state.pending_play.as_ref().is_some_and(|(_, pending)| *pending == key);
            if playing || starting || state.queue.contains(&key) || state.loading.contains_key(&key) {
                tracing::debug!(key = key.short(), "payload already warm; skipping preload");
                return Ok(());
            }

            let (done, pending) = watch::channel(false);
            state.loading.insert(key.clone(), pending);
            (LoadingSlot::new(self, key.clone(), done), state.voice_epoch)
        };

        let warmed = self.warm(audio, &mut slot).await;

        let (evicted, rejected) = {
            let mut state = self.state();
            slot.clear(&mut state);

            match warmed {
                Ok(resource) => {
                    let playing = state.current.as_ref().is_some_and(|current| current.key == key);
                    if state.closed || playing || state.voice_epoch != epoch {
                        (Vec::new(), Some(resource))
                    } else {
                        // a play still preparing this payload promotes it from here
                        (state.queue.push(resource), None)
                    }
                }
                Err(e) => {
                    drop(state);
                    drop(slot);
                    tracing::warn!(key = key.short(), "failed to preload audio: {e}");
                    return Err(e);
                }
            }
        };

        drop(slot);

        for resource in evicted {
            tracing::debug!(key = resource.key.short(), "evicting oldest preloaded audio");
            resource.release(ResourceState::Stopped).await;
        }
        if let Some(resource) = rejected {
            tracing::debug!(key = resource.key.short(), "discarding preload that is no longer wanted");
            resource.release(ResourceState::Stopped).await;
        }

        Ok(())
    }

    /// Change the narrator voice
    ///
    /// Audio already prepared was synthesized with the old voice, so the
    /// current resource is stopped and the preload queue emptied. The caller
    /// re-requests playback to hear the new voice.
    pub async fn set_voice(&self, voice: impl Into<String>) {
        let voice = voice.into();

        let stale = {
            let mut state = self.state();
            if state.voice == voice {
                return;
            }

            tracing::debug!(from = %state.voice, to = %voice, "changing narrator voice");
            state.voice = voice;
            state.voice_epoch += 1;
            state.queue.drain()
        };

        for resource in stale {
            resource.release(ResourceState::Stopped).await;
        }

        // stop is infallible
        let _ = self.stop().await;
    }

    /// Tear the session down, releasing every resource it owns
    ///
    /// Later `play` and `preload` calls fail with [`NarrationError::Closed`].
    pub async fn shutdown(&self) {
        {
            let mut state = self.state();
            if state.closed {
                return;
            }
            state.closed = true;
        }

        let _ = self.stop().await;

        let queued = self.state().queue.drain();
        for resource in queued {
            resource.release(ResourceState::Stopped).await;
        }

        tracing::debug!("audio session shut down");
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        lock(&self.inner.state)
    }

    fn set_playing(&self, playing: bool) {
        self.inner.playing.send_if_modified(|current| {
            let changed = *current != playing;
            *current = playing;
            changed
        });
    }

    /// Start a new request generation, cancelling the previous one
    fn begin_request(&self) -> Result<(u64, CancellationToken)> {
        let mut state = self.state();
        if state.closed {
            return Err(NarrationError::Closed);
        }

        supersede(&mut state);
        Ok((state.generation, state.request.clone()))
    }

    /// Handle `play` for the resource that is already current
    ///
    /// Returns true if the request was satisfied without loading anything.
    async fn replay_current(
        &self,
        key: &ContentKey,
        page_id: &str,
        generation: u64,
        token: &CancellationToken,
    ) -> Result<bool> {
        let (handle, paused) = {
            let state = self.state();
            match &state.current {
                Some(resource) if &resource.key == key && resource.page_id.as_deref() == Some(page_id) => {
                    (Arc::clone(&resource.handle), resource.state() == ResourceState::Paused)
                }
                _ => return Ok(false),
            }
        };

        if paused {
            tracing::debug!(page_id, "resuming paused narration");
            if let Err(e) = self.confirm_play(handle.as_ref()).await {
                self.discard_current(ResourceState::Errored).await;
                return Err(e);
            }

            if let Some(resource) = self.state().current.as_mut() {
                resource.transition(ResourceState::Playing);
            }
            self.set_playing(true);
        }

        // the generation bump cancelled the previous completion watcher
        self.watch_completion(generation, token.clone(), handle);
        Ok(true)
    }

    /// Obtain a playable resource, promoting a preloaded one when possible
    ///
    /// Returns `None` if the request was superseded meanwhile.
    async fn acquire(
        &self,
        audio: bytes::Bytes,
        key: ContentKey,
        page_id: &str,
        token: &CancellationToken,
    ) -> Result<Option<AudioResource>> {
        let pending = self.state().loading.get(&key).cloned();
        if let Some(mut pending) = pending {
            tracing::debug!(page_id, "waiting for in-flight preload");
            let wait = tokio::time::timeout(self.inner.ready_timeout, pending.wait_for(|done| *done));
            tokio::select! {
                biased;
                () = token.cancelled() => return Ok(None),
                _ = wait => {}
            }
        }

        let promoted = self.state().queue.take(&key);
        if let Some(mut resource) = promoted {
            tracing::debug!(page_id, key = key.short(), "promoting preloaded audio");
            resource.page_id = Some(page_id.to_owned());
            return Ok(Some(resource));
        }

        let handle = tokio::select! {
            biased;
            () = token.cancelled() => return Ok(None),
            handle = self.inner.backend.load(audio) => handle?,
        };

        let mut resource = AudioResource::loading(key, Arc::clone(&handle));
        resource.page_id = Some(page_id.to_owned());

        let ready = tokio::select! {
            biased;
            () = token.cancelled() => None,
            ready = tokio::time::timeout(self.inner.ready_timeout, handle.wait_ready()) => Some(ready),
        };

        match ready {
            None => {
                tracing::debug!(page_id, "play superseded while loading");
                resource.release(ResourceState::Stopped).await;
                Ok(None)
            }
            Some(Ok(Ok(()))) => {
                resource.mark_ready();
                Ok(Some(resource))
            }
            Some(Ok(Err(e))) => {
                tracing::error!(page_id, "failed to load audio: {e}");
                resource.release(ResourceState::Errored).await;
                Err(e)
            }
            Some(Err(_)) => {
                tracing::debug!(page_id, timeout = ?self.inner.ready_timeout, "readiness not confirmed; attempting playback anyway");
                Ok(Some(resource))
            }
        }
    }

    /// Begin playback of a prepared resource and install it as current
    async fn start(
        &self,
        mut resource: AudioResource,
        page_id: &str,
        generation: u64,
        token: CancellationToken,
    ) -> Result<()> {
        let handle = Arc::clone(&resource.handle);

        let started = tokio::select! {
            biased;
            () = token.cancelled() => None,
            started = self.confirm_play(handle.as_ref()) => Some(started),
        };

        match started {
            None => {
                tracing::debug!(page_id, "play superseded before playback began");
                resource.release(ResourceState::Stopped).await;
                return Ok(());
            }
            Some(Err(e)) => {
                tracing::error!(page_id, "failed to start playback: {e}");
                resource.release(ResourceState::Errored).await;
                self.set_playing(false);
                return Err(e);
            }
            Some(Ok(())) => {}
        }

        resource.transition(ResourceState::Playing);
        let confirmed_ready = resource.is_ready();

        let (stale, duplicate) = {
            let mut state = self.state();
            if state.generation == generation {
                let duplicate = state.queue.take(&resource.key);
                state.current = Some(resource);
                (None, duplicate)
            } else {
                (Some(resource), None)
            }
        };

        if let Some(duplicate) = duplicate {
            tracing::debug!(page_id, "dropping preloaded copy of the playing audio");
            duplicate.release(ResourceState::Stopped).await;
        }

        if let Some(resource) = stale {
            tracing::debug!(page_id, generation, "discarding stale playback");
            resource.release(ResourceState::Stopped).await;
            return Ok(());
        }

        self.set_playing(true);
        self.watch_completion(generation, token, handle);
        tracing::info!(page_id, confirmed_ready, "narration playing");

        Ok(())
    }

    /// Ask the pipeline to play, waiting at most the readiness timeout for confirmation
    async fn confirm_play(&self, handle: &dyn MediaHandle) -> Result<()> {
        match tokio::time::timeout(self.inner.ready_timeout, handle.play()).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!("playback start not confirmed in time; assuming it is playing");
                Ok(())
            }
        }
    }

    /// Release the current resource after a failure
    async fn discard_current(&self, terminal: ResourceState) {
        let current = self.state().current.take();
        self.set_playing(false);
        if let Some(resource) = current {
            resource.release(terminal).await;
        }
    }

    /// Load a resource for the preload queue
    async fn warm(&self, audio: bytes::Bytes, slot: &mut LoadingSlot<'_>) -> Result<AudioResource> {
        let handle = self.inner.backend.load(audio).await?;
        slot.handle = Some(Arc::clone(&handle));
        let mut resource = AudioResource::loading(slot.key.clone(), Arc::clone(&handle));

        match tokio::time::timeout(self.inner.ready_timeout, handle.wait_ready()).await {
            Ok(Ok(())) => resource.mark_ready(),
            Ok(Err(e)) => {
                resource.release(ResourceState::Errored).await;
                return Err(e);
            }
            Err(_) => tracing::debug!(key = resource.key.short(), "preload readiness not confirmed in time"),
        }

        Ok(resource)
    }

    fn watch_completion(&self, generation: u64, token: CancellationToken, handle: Arc<dyn MediaHandle>) {
        let session = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            let end = tokio::select! {
                biased;
                () = token.cancelled() => return,
                end = handle.finished() => end,
            };

            if let Some(inner) = Weak::upgrade(&session) {
                Self { inner }.complete(generation, end).await;
            }
        });
    }

    /// Handle the natural end of the resource started by `generation`
    async fn complete(&self, generation: u64, end: PlaybackEnd) {
        let resource = {
            let mut state = self.state();
            if state.generation != generation {
                tracing::debug!(generation, "ignoring completion of superseded playback");
                return;
            }
            state.current.take()
        };

        let Some(resource) = resource else {
            return;
        };

        self.set_playing(false);
        let page_id = resource.page_id.clone();

        match end {
            PlaybackEnd::Finished => {
                resource.release(ResourceState::Ended).await;
                tracing::debug!(page_id = ?page_id, "narration finished");

                let callback = lock(&self.inner.on_complete).clone();
                if let Some(callback) = callback {
                    callback();
                }
            }
            PlaybackEnd::Failed(reason) => {
                tracing::error!(page_id = ?page_id, "audio playback error: {reason}");
                resource.release(ResourceState::Errored).await;
            }
        }
    }
}

/// Marks the payload a `play` is preparing until that `play` returns
struct PendingPlay<'a> {
    session: &'a AudioSession,
    generation: u64,
}

impl Drop for PendingPlay<'_> {
    fn drop(&mut self) {
        let mut state = self.session.state();
        if state
            .pending_play
            .as_ref()
            .is_some_and(|(generation, _)| *generation == self.generation)
        {
            state.pending_play = None;
        }
    }
}

/// Registration of an in-flight preload in `SessionState::loading`
///
/// Dropping the slot wakes any `play` waiting on the preload. If the preload
/// never reached [`LoadingSlot::clear`] the entry is removed and a
/// half-loaded handle is released in the background.
struct LoadingSlot<'a> {
    session: &'a AudioSession,
    key: ContentKey,
    done: watch::Sender<bool>,
    handle: Option<Arc<dyn MediaHandle>>,
    registered: bool,
}

impl<'a> LoadingSlot<'a> {
    const fn new(session: &'a AudioSession, key: ContentKey, done: watch::Sender<bool>) -> Self {
        Self {
            session,
            key,
            done,
            handle: None,
            registered: true,
        }
    }

    /// Unregister the preload once its outcome has been handled
    fn clear(&mut self, state: &mut SessionState) {
        state.loading.remove(&self.key);
        self.registered = false;
        self.handle = None;
    }
}

impl Drop for LoadingSlot<'_> {
    fn drop(&mut self) {
        if self.registered {
            tracing::debug!(key = self.key.short(), "preload abandoned before it finished");
            self.session.state().loading.remove(&self.key);
        }

        if let (Some(handle), Ok(runtime)) = (self.handle.take(), tokio::runtime::Handle::try_current()) {
            runtime.spawn(async move { handle.release().await });
        }

        self.done.send_replace(true);
    }
}

/// Bump the generation and cancel the outstanding request
fn supersede(state: &mut SessionState) {
    state.generation += 1;
    state.request.cancel();
    state.request = CancellationToken::new();
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
