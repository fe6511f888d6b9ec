use std::fmt;

use serde::Deserialize;

/// How event payloads are marked inside a frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// Lock onto whichever marker appears first
    #[default]
    Auto,
    /// `event: {json}` followed by a blank line
    Event,
    /// `data: {json}` followed by a blank line (server-sent events)
    Data,
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Event => "event",
            Self::Data => "data",
        })
    }
}

/// A complete frame extracted from the byte stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// JSON payload text, not yet parsed
    Payload(String),
    /// `data: [DONE]` end-of-stream sentinel
    Done,
}

/// Incrementally splits a chunked byte stream into frames
///
/// Bytes are buffered raw and decoded only once a whole frame has arrived,
/// so a multi-byte character split across chunks survives intact. A frame
/// ends at a blank line (`\n\n` or `\r\n\r\n`); anything after the last
/// terminator stays buffered until more bytes arrive.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    framing: Framing,
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub const fn new(framing: Framing) -> Self {
        Self {
            framing,
            buffer: Vec::new(),
        }
    }

    /// Active framing; `Auto` until the first marker has been seen
    pub const fn framing(&self) -> Framing {
        self.framing
    }

    /// Bytes held back waiting for a frame terminator
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Append a chunk and return every frame it completed, in arrival order
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some((end, terminator)) = find_terminator(&self.buffer) {
            let raw: Vec<u8> = self.buffer.drain(..end + terminator).collect();
            let text = String::from_utf8_lossy(&raw[..end]);

            if let Some(frame) = self.extract(&text) {
                frames.push(frame);
            }
        }

        frames
    }

    fn extract(&mut self, text: &str) -> Option<Frame> {
        let mut event = None;
        let mut data: Vec<&str> = Vec::new();

        for line in text.lines() {
            if line.starts_with(':') {
                continue;
            }

            if let Some(value) = field(line, "event") {
                // `event: name` is a plain SSE event name; only inline JSON counts as a payload
                if event.is_none() && value.starts_with('{') {
                    event = Some(value);
                }
            } else if let Some(value) = field(line, "data") {
                data.push(value);
            }
        }

        if self.framing == Framing::Auto {
            let detected = match (event, data.is_empty()) {
                (Some(_), _) => Framing::Event,
                (None, false) => Framing::Data,
                (None, true) => return None,
            };
            tracing::debug!(framing = %detected, "detected stream framing");
            self.framing = detected;
        }

        match self.framing {
            Framing::Event => event.map(|payload| Frame::Payload(payload.to_owned())),
            Framing::Data if data.is_empty() => None,
            Framing::Data => {
                let payload = data.join("\n");
                if payload.trim() == "[DONE]" {
                    Some(Frame::Done)
                } else {
                    Some(Frame::Payload(payload))
                }
            }
            Framing::Auto => None,
        }
    }
}

/// Value of `name: value` (or `name:value`) on `line`
fn field<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let value = line.strip_prefix(name)?.strip_prefix(':')?;
    Some(value.strip_prefix(' ').unwrap_or(value))
}

/// Position and length of the first blank-line terminator in `buffer`
fn find_terminator(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = find(buffer, b"\n\n").map(|pos| (pos, 2));
    let crlf = find(buffer, b"\r\n\r\n").map(|pos| (pos, 4));

    match (lf, crlf) {
        (Some(lf), Some(crlf)) => Some(if crlf.0 < lf.0 { crlf } else { lf }),
        (found, None) | (None, found) => found,
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}
