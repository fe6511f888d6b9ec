#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

//! Incremental reader for AudioTales story-generation progress streams
//!
//! The generation endpoint answers with a long-lived response body carrying
//! one JSON event per frame, framed either as `event: {json}` or as
//! server-sent `data: {json}` lines. [`EventStreamReader`] reassembles frames
//! from arbitrarily chunked bytes and hands typed [`StreamEvent`]s to a sink.

pub mod error;
pub mod event;
pub mod framing;
mod reader;

pub use error::{BoxError, FrameError, Result, StreamError};
pub use event::{CallOutput, ErrorEvent, ErrorKind, StreamEvent, SubCall};
pub use framing::{Frame, FrameDecoder, Framing};
pub use reader::{EventSink, EventStreamReader, StreamOutcome, StreamSummary};
