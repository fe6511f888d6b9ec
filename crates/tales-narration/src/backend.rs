use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

/// How a started resource stopped producing sound on its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEnd {
    /// Reached the end of the audio
    Finished,
    /// The media pipeline reported an error mid-playback
    Failed(String),
}

/// Media pipeline that turns narration bytes into playable resources
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Create a resource and begin decoding/buffering it
    ///
    /// The returned handle is in the loading state; [`MediaHandle::wait_ready`]
    /// resolves once it can play through.
    async fn load(&self, audio: Bytes) -> crate::error::Result<Arc<dyn MediaHandle>>;

    /// Backend name for logs
    fn name(&self) -> &str;
}

/// One playable narration resource owned by the session
///
/// Only the session calls these. Implementations must tolerate
/// [`MediaHandle::release`] being called more than once and at any point,
/// including while [`MediaHandle::wait_ready`] or [`MediaHandle::finished`]
/// are pending.
#[async_trait]
pub trait MediaHandle: Send + Sync {
    /// Wait until the resource can play through without stalling
    async fn wait_ready(&self) -> crate::error::Result<()>;

    /// Start or resume playback
    async fn play(&self) -> crate::error::Result<()>;

    /// Pause playback, keeping the position
    async fn pause(&self) -> crate::error::Result<()>;

    /// Resolve when playback ends on its own
    ///
    /// Never resolves for a resource that is released or paused forever.
    async fn finished(&self) -> PlaybackEnd;

    /// Halt playback and free the decoded buffer and any temporary reference
    async fn release(&self);
}
