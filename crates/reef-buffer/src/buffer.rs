//! The polymorphic blob handle.
//!
//! A [`Buffer`] is a lazily-materialized, single-use handle to a blob of
//! bytes. Content-addressed buffers validate the stream they deliver against
//! their digest; action-cache buffers carry trusted payloads with size-only
//! checks; error buffers replay a permanent failure to every consumer.
//!
//! Consuming operations take the buffer by value, so each buffer is consumed
//! at most once by construction. `get_size_bytes` borrows and is always
//! cheap. `clone_copy` and `clone_stream` split a buffer into two independent
//! consumers that jointly read the underlying source exactly once.

use std::sync::Arc;

use bytes::{Buf, Bytes};
use prost::Message;
use reef_digest::Digest;
use reef_proto::ActionResult;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::clone::{tee, CellSource, CopyCell};
use crate::error::{BufferError, Code};
use crate::reader::{BlobReader, WindowedSource};
use crate::repair::RepairStrategy;
use crate::source::{ByteSliceSource, ChunkSource, ErrorSource, ReaderSource};
use crate::validating::ValidatingSource;
use crate::validator::validate_byte_slice;

/// A single-use handle to a blob of bytes.
pub struct Buffer {
    kind: Kind,
}

enum Kind {
    /// Permanent failure, replayed by every operation.
    Error(BufferError),
    /// Bytes that already passed (or never needed) content validation:
    /// action cache entries and realized clone images.
    Validated { data: Bytes },
    /// Content-addressed payload held in memory, validated on consumption.
    CasBytes {
        digest: Digest,
        data: Bytes,
        repair: RepairStrategy,
    },
    /// Content-addressed stream, validated as it is drained.
    CasSource {
        digest: Digest,
        source: Box<dyn ChunkSource>,
        repair: RepairStrategy,
    },
    /// An action result that has not been serialized yet.
    AcMessage { message: ActionResult },
    /// One half of a `clone_copy` pair, lazily realized.
    CloneCopy { cell: Arc<CopyCell> },
}

impl Buffer {
    /// A buffer that reports `error` from every operation.
    pub fn from_error(error: BufferError) -> Buffer {
        Buffer {
            kind: Kind::Error(error),
        }
    }

    /// A buffer over bytes that need no further validation.
    pub fn from_validated_byte_slice(data: Bytes) -> Buffer {
        Buffer {
            kind: Kind::Validated { data },
        }
    }

    /// A content-addressed buffer over an in-memory payload.
    ///
    /// The payload is validated against `digest` when the buffer is consumed,
    /// not up front.
    pub fn cas_from_byte_slice(digest: Digest, data: Bytes, repair: RepairStrategy) -> Buffer {
        Buffer {
            kind: Kind::CasBytes {
                digest,
                data,
                repair,
            },
        }
    }

    /// A content-addressed buffer over a chunk source.
    pub fn cas_from_chunk_source(
        digest: Digest,
        source: Box<dyn ChunkSource>,
        repair: RepairStrategy,
    ) -> Buffer {
        Buffer {
            kind: Kind::CasSource {
                digest,
                source,
                repair,
            },
        }
    }

    /// A content-addressed buffer over a contiguous reader.
    ///
    /// At most one byte past the declared size is pulled from the reader, so
    /// oversized streams are detected without draining them.
    pub fn cas_from_reader_at_most(
        digest: Digest,
        reader: Box<dyn AsyncRead + Send + Unpin>,
        repair: RepairStrategy,
    ) -> Buffer {
        let source = ReaderSource::new(reader, digest.size_bytes());
        Buffer::cas_from_chunk_source(digest, Box::new(source), repair)
    }

    /// An action cache buffer over a not-yet-serialized message.
    pub fn ac_from_action_result(message: ActionResult) -> Buffer {
        Buffer {
            kind: Kind::AcMessage { message },
        }
    }

    /// The size of the blob in bytes: the declared size for
    /// content-addressed buffers, the payload length otherwise.
    ///
    /// Cheap and non-consuming.
    pub fn get_size_bytes(&self) -> Result<u64, BufferError> {
        match &self.kind {
            Kind::Error(error) => Err(error.clone()),
            Kind::Validated { data } => Ok(data.len() as u64),
            Kind::CasBytes { digest, .. } | Kind::CasSource { digest, .. } => {
                Ok(digest.size_bytes())
            }
            Kind::AcMessage { message } => Ok(message.encoded_len() as u64),
            Kind::CloneCopy { cell } => cell.size(),
        }
    }

    /// Drain the buffer into a contiguous payload of at most `maximum_size`
    /// bytes, running full validation.
    ///
    /// The returned payload is sized tightly: allocation happens once, at the
    /// declared size, and byte-backed buffers are returned without copying.
    pub async fn to_byte_slice(self, maximum_size: usize) -> Result<Bytes, BufferError> {
        match self.kind {
            Kind::Error(error) => Err(error),
            Kind::Validated { data } => {
                check_maximum_size(data.len() as u64, maximum_size)?;
                Ok(data)
            }
            Kind::CasBytes {
                digest,
                data,
                repair,
            } => {
                check_maximum_size(digest.size_bytes(), maximum_size)?;
                match validate_byte_slice(&digest, &data) {
                    Ok(()) => Ok(data),
                    Err(error) => Err(repair.on_corruption(error).await),
                }
            }
            Kind::CasSource {
                digest,
                mut source,
                repair,
            } => {
                let size = digest.size_bytes();
                if let Err(error) = check_maximum_size(size, maximum_size) {
                    source.close();
                    return Err(error);
                }
                let mut source = ValidatingSource::new(&digest, source, repair);
                read_all(&mut source, size as usize).await
            }
            Kind::AcMessage { message } => {
                let data = Bytes::from(message.encode_to_vec());
                check_maximum_size(data.len() as u64, maximum_size)?;
                Ok(data)
            }
            Kind::CloneCopy { cell } => {
                let data = cell.bytes().await?;
                check_maximum_size(data.len() as u64, maximum_size)?;
                Ok(data)
            }
        }
    }

    /// A chunk stream over `[offset, end)` of the blob, emitting non-empty
    /// chunks of at most `chunk_size` bytes, under full validation.
    ///
    /// Offset violations and stream failures are reported from `read` and are
    /// sticky. Dropping or closing the returned source releases the
    /// underlying resource.
    pub fn to_chunk_reader(self, offset: i64, chunk_size: usize) -> Box<dyn ChunkSource> {
        match self.into_stream() {
            Err(error) => Box::new(ErrorSource::new(error)),
            Ok((declared_size, source)) => Box::new(WindowedSource::new(
                source,
                declared_size,
                offset,
                chunk_size,
            )),
        }
    }

    /// A pull-byte reader over the blob, under full validation.
    pub fn to_reader(self) -> BlobReader {
        match self.into_stream() {
            Err(error) => BlobReader::new(Box::new(ErrorSource::new(error))),
            Ok((_, source)) => BlobReader::new(source),
        }
    }

    /// Random-access read: fill `dst` with the bytes at `offset`.
    ///
    /// Returns the number of bytes written, which is less than `dst.len()`
    /// when the window extends past the end of the blob, and zero when
    /// `offset` is at or past the end. The stream is always drained to
    /// end-of-stream, because content addressing requires whole-blob
    /// verification even for a small window; validation failures surface as
    /// errors with no bytes reported.
    pub async fn read_at(self, dst: &mut [u8], offset: i64) -> Result<usize, BufferError> {
        let (_, mut source) = self.into_stream()?;
        if offset < 0 {
            source.close();
            return Err(BufferError::NegativeOffset(offset));
        }
        let mut skip = offset as u64;
        let mut filled = 0;
        while let Some(mut chunk) = source.read().await? {
            if skip > 0 {
                let n = skip.min(chunk.len() as u64);
                chunk.advance(n as usize);
                skip -= n;
            }
            if !chunk.is_empty() && filled < dst.len() {
                let n = chunk.len().min(dst.len() - filled);
                dst[filled..filled + n].copy_from_slice(&chunk[..n]);
                filled += n;
            }
        }
        Ok(filled)
    }

    /// Deserialize the blob as an [`ActionResult`], reading at most
    /// `maximum_size` bytes.
    ///
    /// For content-addressed buffers an undecodable payload is backend
    /// corruption: the repair strategy runs and the error is internal. For
    /// action cache payloads it is the caller's problem: `InvalidArgument`,
    /// no repair.
    pub async fn to_action_result(self, maximum_size: usize) -> Result<ActionResult, BufferError> {
        match self.kind {
            Kind::Error(error) => Err(error),
            Kind::AcMessage { message } => {
                check_maximum_size(message.encoded_len() as u64, maximum_size)?;
                Ok(message)
            }
            Kind::Validated { data } => {
                check_maximum_size(data.len() as u64, maximum_size)?;
                decode_trusted(data)
            }
            Kind::CloneCopy { cell } => {
                let data = cell.bytes().await?;
                check_maximum_size(data.len() as u64, maximum_size)?;
                decode_trusted(data)
            }
            Kind::CasBytes {
                digest,
                data,
                repair,
            } => {
                check_maximum_size(digest.size_bytes(), maximum_size)?;
                if let Err(error) = validate_byte_slice(&digest, &data) {
                    return Err(repair.on_corruption(error).await);
                }
                decode_cas(data, &repair).await
            }
            Kind::CasSource {
                digest,
                mut source,
                repair,
            } => {
                let size = digest.size_bytes();
                if let Err(error) = check_maximum_size(size, maximum_size) {
                    source.close();
                    return Err(error);
                }
                let decode_repair = repair.clone();
                let mut source = ValidatingSource::new(&digest, source, repair);
                let data = read_all(&mut source, size as usize).await?;
                decode_cas(data, &decode_repair).await
            }
        }
    }

    /// Stream the blob into `writer`, under full validation.
    ///
    /// Writer errors propagate verbatim. A validation failure surfaces after
    /// the writer has received whatever valid bytes preceded it; the
    /// trailing corrupt piece is withheld.
    pub async fn into_writer<W>(self, writer: &mut W) -> Result<(), BufferError>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let (_, mut source) = self.into_stream()?;
        while let Some(chunk) = source.read().await? {
            writer.write_all(&chunk).await?;
        }
        Ok(())
    }

    /// Release the buffer without consuming it. Never blocks, never errors.
    pub fn discard(self) {
        if let Kind::CasSource { mut source, .. } = self.kind {
            source.close();
        }
        // Remaining variants hold no live resource; clone cells release
        // through their shared handle when the last owner goes away.
    }

    /// Split the buffer into two consumers sharing one lazily-realized byte
    /// image of at most `maximum_size` bytes.
    ///
    /// The first consumer to demand data realizes the image, running the
    /// single validation (and, on corruption, the single repair); the other
    /// blocks until the result is published. Both observe the identical
    /// payload or the identical error.
    pub fn clone_copy(self, maximum_size: usize) -> (Buffer, Buffer) {
        match self.kind {
            Kind::Error(error) => (
                Buffer::from_error(error.clone()),
                Buffer::from_error(error),
            ),
            Kind::Validated { data } => (
                Buffer::from_validated_byte_slice(data.clone()),
                Buffer::from_validated_byte_slice(data),
            ),
            Kind::AcMessage { message } => (
                Buffer::ac_from_action_result(message.clone()),
                Buffer::ac_from_action_result(message),
            ),
            kind => {
                let original = Buffer { kind };
                let size = original.get_size_bytes();
                let cell = Arc::new(CopyCell::new(original, maximum_size, size));
                (
                    Buffer {
                        kind: Kind::CloneCopy { cell: cell.clone() },
                    },
                    Buffer {
                        kind: Kind::CloneCopy { cell },
                    },
                )
            }
        }
    }

    /// Split the buffer into two consumers that each stream the full blob
    /// once, while the underlying source is read exactly once.
    ///
    /// Chunks are teed through bounded queues, so the faster consumer runs at
    /// most a fixed amount ahead of the slower one. Each half validates its
    /// stream independently and both reach the identical verdict; the repair
    /// strategy stays shared, so corruption triggers at most one repair
    /// across the pair. Abandoning one half leaves the other working;
    /// abandoning both stops the producer promptly.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn clone_stream(self) -> (Buffer, Buffer) {
        match self.kind {
            Kind::Error(error) => (
                Buffer::from_error(error.clone()),
                Buffer::from_error(error),
            ),
            Kind::Validated { data } => (
                Buffer::from_validated_byte_slice(data.clone()),
                Buffer::from_validated_byte_slice(data),
            ),
            Kind::AcMessage { message } => (
                Buffer::ac_from_action_result(message.clone()),
                Buffer::ac_from_action_result(message),
            ),
            Kind::CasBytes {
                digest,
                data,
                repair,
            } => (
                Buffer::cas_from_byte_slice(digest.clone(), data.clone(), repair.clone()),
                Buffer::cas_from_byte_slice(digest, data, repair),
            ),
            Kind::CasSource {
                digest,
                source,
                repair,
            } => {
                let (half_a, half_b) = tee(source);
                (
                    Buffer::cas_from_chunk_source(digest.clone(), Box::new(half_a), repair.clone()),
                    Buffer::cas_from_chunk_source(digest, Box::new(half_b), repair),
                )
            }
            Kind::CloneCopy { cell } => (
                Buffer {
                    kind: Kind::CloneCopy { cell: cell.clone() },
                },
                Buffer {
                    kind: Kind::CloneCopy { cell },
                },
            ),
        }
    }

    /// Declared size plus a fully-validating chunk source over the blob.
    fn into_stream(self) -> Result<(u64, Box<dyn ChunkSource>), BufferError> {
        match self.kind {
            Kind::Error(error) => Err(error),
            Kind::Validated { data } => Ok((
                data.len() as u64,
                Box::new(ByteSliceSource::new(data)),
            )),
            Kind::CasBytes {
                digest,
                data,
                repair,
            } => {
                let size = digest.size_bytes();
                let source =
                    ValidatingSource::new(&digest, Box::new(ByteSliceSource::new(data)), repair);
                Ok((size, Box::new(source)))
            }
            Kind::CasSource {
                digest,
                source,
                repair,
            } => {
                let size = digest.size_bytes();
                Ok((size, Box::new(ValidatingSource::new(&digest, source, repair))))
            }
            Kind::AcMessage { message } => {
                let data = Bytes::from(message.encode_to_vec());
                Ok((data.len() as u64, Box::new(ByteSliceSource::new(data))))
            }
            Kind::CloneCopy { cell } => {
                let size = cell.size()?;
                Ok((size, Box::new(CellSource::new(cell))))
            }
        }
    }
}

/// Enforce a consumer's size ceiling against the declared size.
fn check_maximum_size(size: u64, maximum_size: usize) -> Result<(), BufferError> {
    if size > maximum_size as u64 {
        return Err(BufferError::MaximumSizeExceeded {
            size,
            maximum: maximum_size as u64,
        });
    }
    Ok(())
}

/// Drain a source into a payload allocated once at the expected size.
async fn read_all(source: &mut ValidatingSource, capacity: usize) -> Result<Bytes, BufferError> {
    let mut data = Vec::with_capacity(capacity);
    while let Some(chunk) = source.read().await? {
        data.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(data))
}

/// Decode an already-validated payload: failures are the caller's problem.
fn decode_trusted(data: Bytes) -> Result<ActionResult, BufferError> {
    ActionResult::decode(data).map_err(|error| BufferError::MalformedMessage {
        reason: error.to_string(),
        code: Code::InvalidArgument,
    })
}

/// Decode a content-addressed payload: failures are backend corruption.
async fn decode_cas(data: Bytes, repair: &RepairStrategy) -> Result<ActionResult, BufferError> {
    match ActionResult::decode(data) {
        Ok(message) => Ok(message),
        Err(error) => {
            let error = BufferError::MalformedMessage {
                reason: error.to_string(),
                code: Code::Internal,
            };
            Err(repair.on_corruption(error).await)
        }
    }
}
