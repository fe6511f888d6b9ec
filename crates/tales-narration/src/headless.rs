//! Media backend that decodes narration with symphonia and plays it against the tokio clock
//!
//! There is no audio device behind it: a resource is ready once the whole
//! payload has decoded, and it "plays" for exactly the decoded duration. This
//! is what the CLI uses to drive page turns, and what makes the session
//! observable in environments without sound hardware.

use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::backend::{MediaBackend, MediaHandle, PlaybackEnd};
use crate::error::{NarrationError, Result};

/// Decode `audio` as MP3 and return its playing time
///
/// Packets that fail to decode are skipped, matching how players treat
/// corrupt frames; a stream with no decodable audio at all is an error.
///
/// # Errors
///
/// Returns an error if the container cannot be probed or has no audio track
pub fn decode_duration(audio: Bytes) -> Result<Duration> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(audio)), MediaSourceStreamOptions::default());

    let mut hint = Hint::new();
    hint.with_extension("mp3");

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| NarrationError::media(format!("unrecognized audio format: {e}")))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| NarrationError::media("no audio track found"))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| NarrationError::media(format!("unsupported codec: {e}")))?;

    let mut frames: usize = 0;
    let mut sample_rate = codec_params.sample_rate;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(NarrationError::media(format!("failed to read audio: {e}"))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                frames += decoded.frames();
                sample_rate = sample_rate.or(Some(decoded.spec().rate));
            }
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::trace!("skipping undecodable audio packet: {e}");
            }
            Err(e) => return Err(NarrationError::media(format!("failed to decode audio: {e}"))),
        }
    }

    let rate = sample_rate.filter(|rate| *rate > 0).unwrap_or(44_100);
    if frames == 0 {
        return Err(NarrationError::media("audio contained no decodable frames"));
    }

    #[allow(clippy::cast_precision_loss)]
    Ok(Duration::from_secs_f64(frames as f64 / f64::from(rate)))
}

/// Backend that decodes with symphonia and simulates playback in real time
#[derive(Debug, Default, Clone)]
pub struct HeadlessBackend;

impl HeadlessBackend {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaBackend for HeadlessBackend {
    async fn load(&self, audio: Bytes) -> Result<Arc<dyn MediaHandle>> {
        let handle = Arc::new(HeadlessHandle::new(audio.clone()));
        let target = Arc::clone(&handle);

        tokio::task::spawn_blocking(move || {
            let outcome = match decode_duration(audio) {
                Ok(duration) => {
                    tracing::debug!(?duration, "decoded narration audio");
                    Decode::Done(duration)
                }
                Err(e) => Decode::Failed(e.to_string()),
            };
            target.decoded.send_replace(outcome);
        });

        Ok(handle)
    }

    fn name(&self) -> &str {
        "headless"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Decode {
    Pending,
    Done(Duration),
    Failed(String),
}

#[derive(Debug, Clone, Copy, Default)]
struct Clock {
    played: Duration,
    since: Option<Instant>,
    released: bool,
}

impl Clock {
    fn position(&self) -> Duration {
        self.played + self.since.map_or(Duration::ZERO, |since| since.elapsed())
    }
}

/// One decoded narration resource
pub struct HeadlessHandle {
    audio: Mutex<Option<Bytes>>,
    decoded: watch::Sender<Decode>,
    clock: watch::Sender<Clock>,
}

impl HeadlessHandle {
    fn new(audio: Bytes) -> Self {
        Self {
            audio: Mutex::new(Some(audio)),
            decoded: watch::Sender::new(Decode::Pending),
            clock: watch::Sender::new(Clock::default()),
        }
    }

    /// Playback position
    pub fn position(&self) -> Duration {
        self.clock.borrow().position()
    }

    /// Decoded duration, once known
    pub fn duration(&self) -> Option<Duration> {
        match *self.decoded.borrow() {
            Decode::Done(duration) => Some(duration),
            _ => None,
        }
    }

    fn is_released(&self) -> bool {
        self.clock.borrow().released
    }

    /// Wait for the decode task, yielding the duration or the failure reason
    async fn decode_outcome(&self) -> std::result::Result<Duration, String> {
        let mut decoded = self.decoded.subscribe();
        let outcome = decoded
            .wait_for(|outcome| *outcome != Decode::Pending)
            .await
            .map(|outcome| outcome.clone());

        match outcome {
            Ok(Decode::Done(duration)) => Ok(duration),
            Ok(Decode::Failed(reason)) => Err(reason),
            Ok(Decode::Pending) | Err(_) => Err("decoder went away".to_owned()),
        }
    }
}

#[async_trait]
impl MediaHandle for HeadlessHandle {
    async fn wait_ready(&self) -> Result<()> {
        let outcome = self.decode_outcome().await;
        if self.is_released() {
            return Err(NarrationError::media("resource already released"));
        }
        outcome.map(|_| ()).map_err(NarrationError::Media)
    }

    async fn play(&self) -> Result<()> {
        if let Decode::Failed(reason) = &*self.decoded.borrow() {
            return Err(NarrationError::Media(reason.clone()));
        }

        let mut result = Ok(());
        self.clock.send_if_modified(|clock| {
            if clock.released {
                result = Err(NarrationError::media("resource already released"));
                return false;
            }
            if clock.since.is_some() {
                return false;
            }
            clock.since = Some(Instant::now());
            true
        });
        result
    }

    async fn pause(&self) -> Result<()> {
        let mut result = Ok(());
        self.clock.send_if_modified(|clock| {
            if clock.released {
                result = Err(NarrationError::media("resource already released"));
                return false;
            }
            let Some(since) = clock.since.take() else {
                return false;
            };
            clock.played += since.elapsed();
            true
        });
        result
    }

    async fn finished(&self) -> PlaybackEnd {
        let duration = match self.decode_outcome().await {
            Ok(duration) => duration,
            Err(reason) => return PlaybackEnd::Failed(reason),
        };

        let mut clock = self.clock.subscribe();
        loop {
            let snapshot = *clock.borrow_and_update();

            if snapshot.released {
                std::future::pending::<()>().await;
            }

            if snapshot.since.is_none() {
                if clock.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
                continue;
            }

            let remaining = duration.saturating_sub(snapshot.position());
            tokio::select! {
                () = tokio::time::sleep(remaining) => return PlaybackEnd::Finished,
                changed = clock.changed() => {
                    if changed.is_err() {
                        std::future::pending::<()>().await;
                    }
                }
            }
        }
    }

    async fn release(&self) {
        self.clock.send_if_modified(|clock| {
            if clock.released {
                return false;
            }
            if let Some(since) = clock.since.take() {
                clock.played += since.elapsed();
            }
            clock.released = true;
            true
        });
        lock(&self.audio).take();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
