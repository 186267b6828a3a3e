//! Lazy chunk producers and the adapters that turn payloads into them.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::BufferError;

/// Read size used when adapting a contiguous reader into chunks.
const READER_CHUNK_BYTES: usize = 64 * 1024;

/// A lazy producer of byte chunks from a backend.
///
/// `read` returns `Ok(Some(chunk))` — where the chunk may be empty and
/// carries no meaning about semantic boundaries — `Ok(None)` at end of
/// stream, or an error. After end of stream or an error, further calls must
/// keep returning the same terminal result so wrapping streams can drain
/// idempotently.
///
/// `close` releases the underlying resource. The buffer layer guarantees it
/// is invoked once, at the terminal operation of the last owner;
/// implementations are expected to also release on drop so that abandoned
/// sources do not leak.
#[async_trait]
pub trait ChunkSource: Send {
    /// Produce the next chunk.
    async fn read(&mut self) -> Result<Option<Bytes>, BufferError>;

    /// Release the underlying resource.
    fn close(&mut self);
}

/// Chunk source over a single in-memory payload.
pub struct ByteSliceSource {
    data: Option<Bytes>,
}

impl ByteSliceSource {
    /// Create a source yielding `data` as one chunk, then end of stream.
    pub fn new(data: Bytes) -> ByteSliceSource {
        ByteSliceSource { data: Some(data) }
    }
}

#[async_trait]
impl ChunkSource for ByteSliceSource {
    async fn read(&mut self) -> Result<Option<Bytes>, BufferError> {
        Ok(self.data.take().filter(|d| !d.is_empty()))
    }

    fn close(&mut self) {
        self.data = None;
    }
}

/// Adapts an [`AsyncRead`] into a chunk source.
///
/// Pulls at most one byte past `limit`, so a stream longer than its declared
/// size is detected without draining arbitrary amounts of data.
pub struct ReaderSource {
    reader: Option<Box<dyn AsyncRead + Send + Unpin>>,
    remaining: u64,
    failed: Option<BufferError>,
}

impl ReaderSource {
    /// Create a source reading at most `limit + 1` bytes from `reader`.
    pub fn new(reader: Box<dyn AsyncRead + Send + Unpin>, limit: u64) -> ReaderSource {
        ReaderSource {
            reader: Some(reader),
            remaining: limit.saturating_add(1),
            failed: None,
        }
    }
}

#[async_trait]
impl ChunkSource for ReaderSource {
    async fn read(&mut self) -> Result<Option<Bytes>, BufferError> {
        if let Some(error) = &self.failed {
            return Err(error.clone());
        }
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        if self.remaining == 0 {
            self.reader = None;
            return Ok(None);
        }
        let want = READER_CHUNK_BYTES.min(self.remaining.min(usize::MAX as u64) as usize);
        let mut chunk = vec![0u8; want];
        match reader.read(&mut chunk).await {
            Ok(0) => {
                self.reader = None;
                Ok(None)
            }
            Ok(n) => {
                self.remaining -= n as u64;
                chunk.truncate(n);
                Ok(Some(Bytes::from(chunk)))
            }
            Err(error) => {
                self.reader = None;
                let error = BufferError::from(error);
                self.failed = Some(error.clone());
                Err(error)
            }
        }
    }

    fn close(&mut self) {
        self.reader = None;
    }
}

/// Chunk source that is permanently failed.
pub(crate) struct ErrorSource {
    error: BufferError,
}

impl ErrorSource {
    pub(crate) fn new(error: BufferError) -> ErrorSource {
        ErrorSource { error }
    }
}

#[async_trait]
impl ChunkSource for ErrorSource {
    async fn read(&mut self) -> Result<Option<Bytes>, BufferError> {
        Err(self.error.clone())
    }

    fn close(&mut self) {}
}
