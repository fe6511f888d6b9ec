use std::pin::pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::{BoxError, Result, StreamError};
use crate::event::{ErrorEvent, StreamEvent};
use crate::framing::{Frame, FrameDecoder, Framing};

/// Receives parsed events in arrival order
pub trait EventSink {
    fn on_event(&mut self, event: StreamEvent);
}

impl<F> EventSink for F
where
    F: FnMut(StreamEvent),
{
    fn on_event(&mut self, event: StreamEvent) {
        self(event);
    }
}

/// How a consumed stream ended
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    /// `runFinish` or `data: [DONE]` arrived
    Completed,
    /// An `error`/`contentFilterError` event ended the run
    Failed(ErrorEvent),
    /// The producer closed the stream without a terminal event
    Ended,
    /// The caller abandoned the stream
    Cancelled,
}

/// What a call to [`EventStreamReader::consume`] saw
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSummary {
    pub outcome: StreamOutcome,
    /// Events handed to the sink
    pub events: usize,
    /// Frames dropped because their payload did not parse
    pub skipped: usize,
    /// Unterminated trailing bytes thrown away at the end
    pub discarded_bytes: usize,
}

/// Turns a chunked byte stream into parsed [`StreamEvent`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct EventStreamReader {
    framing: Framing,
}

impl EventStreamReader {
    pub const fn new(framing: Framing) -> Self {
        Self { framing }
    }

    pub const fn framing(&self) -> Framing {
        self.framing
    }

    /// Read `stream` to its end, dispatching every parsed event to `sink`
    ///
    /// Malformed frames are logged and skipped. Reading stops after a
    /// terminal event (`runFinish`, `error`, `contentFilterError`) has been
    /// dispatched, or at `data: [DONE]`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Transport`] if the byte stream itself fails
    pub async fn consume<S, E, K>(&self, stream: S, sink: &mut K) -> Result<StreamSummary>
    where
        S: Stream<Item = std::result::Result<Bytes, E>>,
        E: Into<BoxError>,
        K: EventSink + ?Sized,
    {
        self.consume_until(stream, sink, &CancellationToken::new()).await
    }

    /// Like [`consume`](Self::consume), but stops cleanly once `cancel` fires
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Transport`] if the byte stream itself fails
    pub async fn consume_until<S, E, K>(
        &self,
        stream: S,
        sink: &mut K,
        cancel: &CancellationToken,
    ) -> Result<StreamSummary>
    where
        S: Stream<Item = std::result::Result<Bytes, E>>,
        E: Into<BoxError>,
        K: EventSink + ?Sized,
    {
        let mut stream = pin!(stream);
        let mut decoder = FrameDecoder::new(self.framing);
        let mut events = 0;
        let mut skipped = 0;

        let outcome = 'read: loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => break 'read StreamOutcome::Cancelled,
                next = stream.next() => next,
            };

            let chunk = match next {
                None => break 'read StreamOutcome::Ended,
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    let e: BoxError = e.into();
                    tracing::error!(events, "generation stream failed: {e}");
                    return Err(StreamError::Transport(e));
                }
            };

            for frame in decoder.push(&chunk) {
                let payload = match frame {
                    Frame::Done => break 'read StreamOutcome::Completed,
                    Frame::Payload(payload) => payload,
                };

                let event = match StreamEvent::parse(&payload) {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!(framing = %decoder.framing(), "skipping event frame: {e}");
                        skipped += 1;
                        continue;
                    }
                };

                let terminal = match &event {
                    StreamEvent::RunFinish { .. } => Some(StreamOutcome::Completed),
                    StreamEvent::Error(error) => Some(StreamOutcome::Failed(error.clone())),
                    _ => None,
                };

                tracing::trace!(kind = event.kind(), "dispatching stream event");
                events += 1;
                sink.on_event(event);

                if let Some(outcome) = terminal {
                    break 'read outcome;
                }
            }
        };

        let discarded_bytes = decoder.buffered();
        if discarded_bytes > 0 {
            tracing::debug!(discarded_bytes, "discarding unterminated trailing frame");
        }

        tracing::debug!(?outcome, events, skipped, "generation stream consumed");

        Ok(StreamSummary {
            outcome,
            events,
            skipped,
            discarded_bytes,
        })
    }
}
