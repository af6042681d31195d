// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message framing for the persistent duplex stream.
//!
//! Each codec turns a JSON payload into bytes on the way out, and an
//! arbitrarily chunked byte stream back into payloads on the way in. Decoding
//! never depends on where the stream was split.

use quarry_core::types::Runtime;
use strum::{Display, EnumString};
use thiserror::Error;

use crate::buffer::DelimitedBuffer;

/// Delimiter used by stream-style executables.
pub const DEFAULT_DELIMITER: &[u8] = b"..**";

/// Largest frame a codec accepts.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";
const CONTENT_LENGTH: &str = "content-length";

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("frame delimiter must not be empty")]
    EmptyDelimiter,

    #[error("malformed frame header: {0}")]
    MalformedHeader(String),

    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },
}

/// Encodes outgoing payloads and incrementally decodes incoming bytes.
pub trait FrameCodec: Send {
    fn encode(&self, payload: &[u8]) -> Vec<u8>;

    /// Feeds one chunk and returns every payload it completes.
    fn decode(&mut self, chunk: &[u8]) -> Result<Vec<Vec<u8>>, FramingError>;
}

/// The framing strategies a plugin kind may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Framing {
    /// 4-byte big-endian length, then the payload.
    LengthPrefixed,
    /// `Content-Length: N` header block, blank line, then the payload.
    HeaderDelimited,
    /// One payload per line.
    Newline,
    /// Payload followed by a fixed delimiter sequence.
    Delimiter,
}

impl Framing {
    /// Fixed framing for each persistent runtime. Call-per-query runtimes have none.
    pub fn for_runtime(runtime: Runtime) -> Option<Self> {
        match runtime {
            Runtime::PythonV2 => Some(Framing::Newline),
            Runtime::JavaScriptV2 | Runtime::TypeScriptV2 => Some(Framing::HeaderDelimited),
            Runtime::ExecutableV2 => Some(Framing::LengthPrefixed),
            Runtime::ExecutableStream => Some(Framing::Delimiter),
            _ => None,
        }
    }

    pub fn codec(self, delimiter: &[u8]) -> Result<Box<dyn FrameCodec>, FramingError> {
        Ok(match self {
            Framing::LengthPrefixed => Box::new(LengthPrefixedCodec::default()),
            Framing::HeaderDelimited => Box::new(HeaderDelimitedCodec::default()),
            Framing::Newline => Box::new(NewlineCodec::default()),
            Framing::Delimiter => Box::new(DelimiterCodec::new(delimiter)?),
        })
    }
}

#[derive(Debug, Default)]
pub struct LengthPrefixedCodec {
    buffer: Vec<u8>,
}

impl FrameCodec for LengthPrefixedCodec {
    fn encode(&self, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + payload.len());
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn decode(&mut self, chunk: &[u8]) -> Result<Vec<Vec<u8>>, FramingError> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        let mut start = 0;
        while self.buffer.len() - start >= 4 {
            let header = [
                self.buffer[start],
                self.buffer[start + 1],
                self.buffer[start + 2],
                self.buffer[start + 3],
            ];
            let len = u32::from_be_bytes(header) as usize;
            if len > MAX_FRAME_LEN {
                return Err(FramingError::TooLarge {
                    len,
                    max: MAX_FRAME_LEN,
                });
            }
            let body = start + 4;
            if self.buffer.len() - body < len {
                break;
            }
            frames.push(self.buffer[body..body + len].to_vec());
            start = body + len;
        }
        self.buffer.drain(..start);
        Ok(frames)
    }
}

#[derive(Debug, Default)]
pub struct HeaderDelimitedCodec {
    buffer: Vec<u8>,
    /// Body length once a header block has been parsed.
    body_len: Option<usize>,
}

impl HeaderDelimitedCodec {
    fn parse_header(block: &[u8]) -> Result<usize, FramingError> {
        let text = std::str::from_utf8(block)
            .map_err(|_| FramingError::MalformedHeader("header is not UTF-8".to_string()))?;
        for line in text.split("\r\n") {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
                let len: usize = value.trim().parse().map_err(|_| {
                    FramingError::MalformedHeader(format!("invalid Content-Length '{}'", value.trim()))
                })?;
                if len > MAX_FRAME_LEN {
                    return Err(FramingError::TooLarge {
                        len,
                        max: MAX_FRAME_LEN,
                    });
                }
                return Ok(len);
            }
        }
        Err(FramingError::MalformedHeader(
            "missing Content-Length".to_string(),
        ))
    }
}

impl FrameCodec for HeaderDelimitedCodec {
    fn encode(&self, payload: &[u8]) -> Vec<u8> {
        let mut out = format!("Content-Length: {}\r\n\r\n", payload.len()).into_bytes();
        out.extend_from_slice(payload);
        out
    }

    fn decode(&mut self, chunk: &[u8]) -> Result<Vec<Vec<u8>>, FramingError> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        loop {
            match self.body_len {
                None => {
                    let Some(end) = self
                        .buffer
                        .windows(HEADER_TERMINATOR.len())
                        .position(|w| w == HEADER_TERMINATOR)
                    else {
                        break;
                    };
                    self.body_len = Some(Self::parse_header(&self.buffer[..end])?);
                    self.buffer.drain(..end + HEADER_TERMINATOR.len());
                }
                Some(len) => {
                    if self.buffer.len() < len {
                        break;
                    }
                    frames.push(self.buffer.drain(..len).collect());
                    self.body_len = None;
                }
            }
        }
        Ok(frames)
    }
}

#[derive(Debug, Default)]
pub struct NewlineCodec {
    buffer: Vec<u8>,
}

impl FrameCodec for NewlineCodec {
    fn encode(&self, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(payload.len() + 1);
        out.extend_from_slice(payload);
        out.push(b'\n');
        out
    }

    fn decode(&mut self, chunk: &[u8]) -> Result<Vec<Vec<u8>>, FramingError> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let mut line = &self.buffer[start..start + offset];
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }
            frames.push(line.to_vec());
            start += offset + 1;
        }
        self.buffer.drain(..start);
        if self.buffer.len() > MAX_FRAME_LEN {
            return Err(FramingError::TooLarge {
                len: self.buffer.len(),
                max: MAX_FRAME_LEN,
            });
        }
        Ok(frames)
    }
}

#[derive(Debug)]
pub struct DelimiterCodec {
    buffer: DelimitedBuffer,
}

impl DelimiterCodec {
    pub fn new(delimiter: &[u8]) -> Result<Self, FramingError> {
        Ok(Self {
            buffer: DelimitedBuffer::new(delimiter)?,
        })
    }
}

impl FrameCodec for DelimiterCodec {
    fn encode(&self, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(payload.len() + self.buffer.delimiter().len());
        out.extend_from_slice(payload);
        out.extend_from_slice(self.buffer.delimiter());
        out
    }

    fn decode(&mut self, chunk: &[u8]) -> Result<Vec<Vec<u8>>, FramingError> {
        let frames = self.buffer.append_and_scan(chunk);
        if self.buffer.pending().len() > MAX_FRAME_LEN {
            let len = self.buffer.pending().len();
            self.buffer.clear();
            return Err(FramingError::TooLarge {
                len,
                max: MAX_FRAME_LEN,
            });
        }
        Ok(frames)
    }
}
