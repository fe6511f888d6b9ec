#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

//! Narration playback for paginated AudioTales stories
//!
//! An [`AudioSession`] owns at most one playing narration resource, keeps a
//! small queue of preloaded resources for upcoming pages, and resolves
//! overlapping requests so the most recent one wins. [`StoryNarrator`] builds
//! on it to read a whole story aloud.

pub mod backend;
pub mod error;
pub mod headless;
mod narrator;
pub mod payload;
mod preload;
mod resource;
mod session;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod voice;

pub use backend::{MediaBackend, MediaHandle, PlaybackEnd};
pub use error::{NarrationError, Result};
pub use headless::HeadlessBackend;
pub use narrator::{NarrationReport, NarrationSource, StoryNarrator};
pub use payload::{AudioPayload, ContentKey};
pub use resource::ResourceState;
pub use session::{
    AudioSession, CompletionCallback, DEFAULT_PRELOAD_DEPTH, DEFAULT_READY_TIMEOUT, SessionOptions,
};
pub use voice::{AVAILABLE_VOICES, DEFAULT_VOICE, is_supported_speed, is_supported_voice};
