#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

//! Typed Rust HTTP client for the AudioTales web app
//!
//! Covers story generation (streamed progress events), speech synthesis for
//! page narration, and the story and voice listings.

mod client;
pub mod error;
pub mod types;

pub use client::{ByteStream, DEFAULT_RETRIES, DEFAULT_RETRY_DELAY, TalesClient};
pub use error::{Result, TalesClientError};
pub use types::*;
