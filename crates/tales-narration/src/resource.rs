use std::fmt;
use std::sync::Arc;

use crate::backend::MediaHandle;
use crate::payload::ContentKey;

/// Lifecycle of one narration resource
///
/// `Ended`, `Stopped` and `Errored` are terminal; reaching one of them means
/// the resource is released and must not be used again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Ended,
    Stopped,
    Errored,
}

impl ResourceState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Stopped | Self::Errored)
    }

    /// Whether the lifecycle allows moving from `self` to `next`
    pub const fn can_become(self, next: Self) -> bool {
        use ResourceState::{Ended, Errored, Idle, Loading, Paused, Playing, Ready, Stopped};

        match (self, next) {
            // Loading -> Playing happens when the bounded readiness wait falls through
            (Idle, Loading) | (Loading, Ready | Playing) | (Ready | Paused, Playing) | (Playing, Paused | Ended) => true,
            (from, Stopped | Errored) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Ended => "ended",
            Self::Stopped => "stopped",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// A narration payload bound to a media handle
pub(crate) struct AudioResource {
    pub(crate) key: ContentKey,
    pub(crate) page_id: Option<String>,
    pub(crate) handle: Arc<dyn MediaHandle>,
    state: ResourceState,
    ready: bool,
}

impl AudioResource {
    pub(crate) fn loading(key: ContentKey, handle: Arc<dyn MediaHandle>) -> Self {
        let mut resource = Self {
            key,
            page_id: None,
            handle,
            state: ResourceState::Idle,
            ready: false,
        };
        resource.transition(ResourceState::Loading);
        resource
    }

    pub(crate) const fn state(&self) -> ResourceState {
        self.state
    }

    pub(crate) const fn is_ready(&self) -> bool {
        self.ready
    }

    /// Record that the media pipeline confirmed it can play through
    pub(crate) fn mark_ready(&mut self) {
        self.ready = true;
        if self.state == ResourceState::Loading {
            self.transition(ResourceState::Ready);
        }
    }

    pub(crate) fn transition(&mut self, next: ResourceState) {
        if self.state == next {
            return;
        }

        if !self.state.can_become(next) {
            tracing::warn!(key = self.key.short(), from = %self.state, to = %next, "unexpected resource transition");
        }

        tracing::trace!(key = self.key.short(), from = %self.state, to = %next, "resource transition");
        self.state = next;
    }

    /// Move to a terminal state and release the media handle
    pub(crate) async fn release(mut self, terminal: ResourceState) {
        debug_assert!(terminal.is_terminal());
        self.transition(terminal);
        self.handle.release().await;
        tracing::debug!(key = self.key.short(), page_id = ?self.page_id, state = %terminal, "released audio resource");
    }
}

impl fmt::Debug for AudioResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioResource")
            .field("key", &self.key.short())
            .field("page_id", &self.page_id)
            .field("state", &self.state)
            .field("ready", &self.ready)
            .finish_non_exhaustive()
    }
}
