//! Consumer-facing read adapters: the windowed chunk stream and the
//! pull-byte reader.

use async_trait::async_trait;
use bytes::{Buf, Bytes};

use crate::error::BufferError;
use crate::source::ChunkSource;

/// Chunk stream over a window of a stream: skips to the requested offset,
/// splits chunks down to the requested size, and filters empty chunks.
///
/// Offset violations are reported from the first `read`, not at construction,
/// and stay sticky; the wrapped source is closed either way.
pub(crate) struct WindowedSource {
    inner: Box<dyn ChunkSource>,
    chunk_size: usize,
    pending: Bytes,
    state: WindowState,
}

enum WindowState {
    /// The requested offset is invalid; fail on first read.
    Rejected(BufferError),
    /// Discarding the first `n` bytes of the stream.
    Skipping(u64),
    /// Serving windowed chunks.
    Emitting,
    /// Clean end of stream.
    Eof,
    /// Terminal error, replayed on every read.
    Failed(BufferError),
}

impl WindowedSource {
    pub(crate) fn new(
        inner: Box<dyn ChunkSource>,
        declared_size: u64,
        offset: i64,
        chunk_size: usize,
    ) -> WindowedSource {
        let state = if offset < 0 {
            WindowState::Rejected(BufferError::NegativeOffset(offset))
        } else if offset as u64 > declared_size {
            WindowState::Rejected(BufferError::ReadBeyondEnd {
                size: declared_size,
                offset,
            })
        } else {
            WindowState::Skipping(offset as u64)
        };
        WindowedSource {
            inner,
            chunk_size: chunk_size.max(1),
            pending: Bytes::new(),
            state,
        }
    }

    fn fail(&mut self, error: BufferError) -> BufferError {
        self.inner.close();
        self.state = WindowState::Failed(error.clone());
        error
    }
}

#[async_trait]
impl ChunkSource for WindowedSource {
    async fn read(&mut self) -> Result<Option<Bytes>, BufferError> {
        loop {
            match &mut self.state {
                WindowState::Rejected(error) => {
                    let error = error.clone();
                    return Err(self.fail(error));
                }
                WindowState::Failed(error) => return Err(error.clone()),
                WindowState::Eof => return Ok(None),
                WindowState::Skipping(remaining) => {
                    let remaining = *remaining;
                    match self.inner.read().await {
                        Err(error) => return Err(self.fail(error)),
                        Ok(None) => self.state = WindowState::Eof,
                        Ok(Some(chunk)) => {
                            let skip = remaining.min(chunk.len() as u64);
                            if remaining == skip {
                                self.pending = chunk.slice(skip as usize..);
                                self.state = WindowState::Emitting;
                            } else {
                                self.state = WindowState::Skipping(remaining - skip);
                            }
                        }
                    }
                }
                WindowState::Emitting => {
                    if !self.pending.is_empty() {
                        let n = self.chunk_size.min(self.pending.len());
                        return Ok(Some(self.pending.split_to(n)));
                    }
                    match self.inner.read().await {
                        Err(error) => return Err(self.fail(error)),
                        Ok(None) => self.state = WindowState::Eof,
                        Ok(Some(chunk)) => self.pending = chunk,
                    }
                }
            }
        }
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

/// Stream condition reported alongside the bytes of a [`BlobReader::read`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadState {
    /// More data may follow.
    More,
    /// End of stream; all preceding bytes are valid.
    Eof,
    /// The stream failed; no further data will be produced.
    Failed(BufferError),
}

/// Pull-byte reader over a buffer's contents.
///
/// Dropping the reader releases the underlying source.
pub struct BlobReader {
    source: Box<dyn ChunkSource>,
    pending: Bytes,
    terminal: Option<ReadState>,
}

impl BlobReader {
    pub(crate) fn new(source: Box<dyn ChunkSource>) -> BlobReader {
        BlobReader {
            source,
            pending: Bytes::new(),
            terminal: None,
        }
    }

    /// Fill `dst` from the stream.
    ///
    /// Returns the number of bytes written together with the stream state
    /// after those bytes: a partial read and the terminal condition that
    /// follows it are reported in the same call, so a checksum failure at the
    /// end of the stream arrives with the trailing valid bytes rather than
    /// after them. Terminal states are sticky.
    pub async fn read(&mut self, dst: &mut [u8]) -> (usize, ReadState) {
        let mut filled = 0;
        loop {
            if !self.pending.is_empty() && filled < dst.len() {
                let n = (dst.len() - filled).min(self.pending.len());
                dst[filled..filled + n].copy_from_slice(&self.pending[..n]);
                self.pending.advance(n);
                filled += n;
            }
            if filled == dst.len() {
                return (filled, ReadState::More);
            }
            if let Some(terminal) = &self.terminal {
                return (filled, terminal.clone());
            }
            match self.source.read().await {
                Ok(Some(chunk)) => self.pending = chunk,
                Ok(None) => {
                    self.terminal = Some(ReadState::Eof);
                    return (filled, ReadState::Eof);
                }
                Err(error) => {
                    let state = ReadState::Failed(error);
                    self.terminal = Some(state.clone());
                    return (filled, state);
                }
            }
        }
    }
}
