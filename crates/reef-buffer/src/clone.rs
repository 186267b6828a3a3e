//! Fan-out machinery behind `clone_copy` and `clone_stream`.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::buffer::Buffer;
use crate::error::BufferError;
use crate::source::ChunkSource;

/// Chunks buffered per clone-stream consumer before the producer blocks.
const TEE_QUEUE_CHUNKS: usize = 16;

/// One-shot cell realizing a buffer into a shared byte image.
///
/// The first consumer to demand data performs the realization (and with it
/// the single validation run); the other consumer blocks on the cell until
/// the image or the error is published. Both observe the identical result.
pub(crate) struct CopyCell {
    size: Result<u64, BufferError>,
    state: tokio::sync::Mutex<CellState>,
}

enum CellState {
    Pending {
        buffer: Option<Buffer>,
        maximum_size: usize,
    },
    Ready(Result<Bytes, BufferError>),
}

impl CopyCell {
    pub(crate) fn new(
        buffer: Buffer,
        maximum_size: usize,
        size: Result<u64, BufferError>,
    ) -> CopyCell {
        CopyCell {
            size,
            state: tokio::sync::Mutex::new(CellState::Pending {
                buffer: Some(buffer),
                maximum_size,
            }),
        }
    }

    /// The declared size of the underlying buffer, available without
    /// realizing the image.
    pub(crate) fn size(&self) -> Result<u64, BufferError> {
        self.size.clone()
    }

    /// The shared byte image, realizing it on first demand.
    pub(crate) async fn bytes(&self) -> Result<Bytes, BufferError> {
        let mut state = self.state.lock().await;
        if let CellState::Pending {
            buffer,
            maximum_size,
        } = &mut *state
        {
            let buffer = buffer.take().expect("pending cell holds a buffer");
            let maximum_size = *maximum_size;
            // Boxed to break the async cycle between cell realization and
            // buffer consumption (a clone can itself be cloned).
            let result = Box::pin(buffer.to_byte_slice(maximum_size)).await;
            *state = CellState::Ready(result);
        }
        match &*state {
            CellState::Ready(result) => result.clone(),
            CellState::Pending { .. } => unreachable!("cell realized above"),
        }
    }
}

impl Drop for CopyCell {
    fn drop(&mut self) {
        // Release the source of a never-realized original.
        if let CellState::Pending { buffer, .. } = self.state.get_mut() {
            if let Some(buffer) = buffer.take() {
                buffer.discard();
            }
        }
    }
}

/// Chunk source view over a [`CopyCell`], yielding the whole image as one
/// chunk. Realization errors replay on every read.
pub(crate) struct CellSource {
    cell: Arc<CopyCell>,
    served: bool,
}

impl CellSource {
    pub(crate) fn new(cell: Arc<CopyCell>) -> CellSource {
        CellSource {
            cell,
            served: false,
        }
    }
}

#[async_trait]
impl ChunkSource for CellSource {
    async fn read(&mut self) -> Result<Option<Bytes>, BufferError> {
        if self.served {
            return Ok(None);
        }
        let data = self.cell.bytes().await?;
        self.served = true;
        Ok(Some(data))
    }

    fn close(&mut self) {
        self.served = true;
    }
}

/// Split one chunk source into two independent consumers.
///
/// A producer task drains the source exactly once, fanning every chunk out to
/// two bounded queues. The slower consumer bounds how far ahead the faster
/// one can run. A consumer that drops its half stops receiving; once both
/// halves are gone the producer stops promptly and closes the source.
///
/// Must be called from within a Tokio runtime.
pub(crate) fn tee(source: Box<dyn ChunkSource>) -> (TeeSource, TeeSource) {
    let (tx_a, rx_a) = mpsc::channel(TEE_QUEUE_CHUNKS);
    let (tx_b, rx_b) = mpsc::channel(TEE_QUEUE_CHUNKS);
    tokio::spawn(run_tee(source, tx_a, tx_b));
    (TeeSource::new(rx_a), TeeSource::new(rx_b))
}

async fn run_tee(
    mut source: Box<dyn ChunkSource>,
    tx_a: mpsc::Sender<Result<Bytes, BufferError>>,
    tx_b: mpsc::Sender<Result<Bytes, BufferError>>,
) {
    loop {
        match source.read().await {
            Ok(Some(chunk)) => {
                let a = tx_a.send(Ok(chunk.clone())).await;
                let b = tx_b.send(Ok(chunk)).await;
                if a.is_err() && b.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(error) => {
                let _ = tx_a.send(Err(error.clone())).await;
                let _ = tx_b.send(Err(error)).await;
                break;
            }
        }
    }
    source.close();
}

/// One consumer's half of a teed stream.
pub(crate) struct TeeSource {
    rx: mpsc::Receiver<Result<Bytes, BufferError>>,
    failed: Option<BufferError>,
}

impl TeeSource {
    fn new(rx: mpsc::Receiver<Result<Bytes, BufferError>>) -> TeeSource {
        TeeSource { rx, failed: None }
    }
}

#[async_trait]
impl ChunkSource for TeeSource {
    async fn read(&mut self) -> Result<Option<Bytes>, BufferError> {
        if let Some(error) = &self.failed {
            return Err(error.clone());
        }
        match self.rx.recv().await {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(error)) => {
                self.failed = Some(error.clone());
                Err(error)
            }
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        self.rx.close();
    }
}
