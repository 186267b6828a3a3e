//! Stream validation between a chunk source and its consumer.

use async_trait::async_trait;
use bytes::Bytes;
use reef_digest::Digest;

use crate::error::BufferError;
use crate::repair::RepairStrategy;
use crate::source::ChunkSource;
use crate::validator::Validator;

/// Wraps a [`ChunkSource`] with content-address validation.
///
/// Bytes are counted and hashed as chunks pass through, and empty chunks are
/// absorbed. A stream longer than the declared size fails the moment the
/// excess byte is observed. When the stream reaches exactly the declared
/// size, the underlying source is drained to end-of-stream and the checksum
/// verdict is computed *before* the final chunk is released, so a corrupt
/// stream never yields its last piece of data.
///
/// Corruption verdicts run the repair strategy; transport errors pass through
/// untouched. All terminal states are sticky, and the underlying source is
/// closed once, at the terminal transition (or on drop if the consumer
/// abandons the stream early).
pub(crate) struct ValidatingSource {
    inner: Box<dyn ChunkSource>,
    validator: Option<Validator>,
    repair: RepairStrategy,
    state: State,
    closed: bool,
}

enum State {
    Streaming,
    Finished,
    Failed(BufferError),
}

impl ValidatingSource {
    pub(crate) fn new(
        digest: &Digest,
        inner: Box<dyn ChunkSource>,
        repair: RepairStrategy,
    ) -> ValidatingSource {
        ValidatingSource {
            inner,
            validator: Some(Validator::new(digest)),
            repair,
            state: State::Streaming,
            closed: false,
        }
    }

    fn close_inner(&mut self) {
        if !self.closed {
            self.closed = true;
            self.inner.close();
        }
    }

    fn finish(&mut self) {
        self.state = State::Finished;
        self.close_inner();
    }

    fn fail_transport(&mut self, error: BufferError) -> BufferError {
        self.close_inner();
        self.state = State::Failed(error.clone());
        error
    }

    async fn fail_corruption(&mut self, error: BufferError) -> BufferError {
        self.close_inner();
        let error = self.repair.on_corruption(error).await;
        self.state = State::Failed(error.clone());
        error
    }

    /// Drain the source to end-of-stream once the declared size is reached,
    /// then compute the verdict for the final chunk held by the caller.
    async fn drain_and_verify(&mut self) -> Result<(), BufferError> {
        loop {
            match self.inner.read().await {
                Err(error) => return Err(self.fail_transport(error)),
                Ok(None) => break,
                Ok(Some(extra)) => {
                    if extra.is_empty() {
                        continue;
                    }
                    if let Err(error) = self
                        .validator
                        .as_mut()
                        .expect("validator live while streaming")
                        .update(&extra)
                    {
                        return Err(self.fail_corruption(error).await);
                    }
                }
            }
        }
        self.end_of_stream_verdict().await
    }

    async fn end_of_stream_verdict(&mut self) -> Result<(), BufferError> {
        let verdict = self
            .validator
            .take()
            .expect("validator live while streaming")
            .finish();
        match verdict {
            Ok(()) => {
                self.finish();
                Ok(())
            }
            Err(error) => Err(self.fail_corruption(error).await),
        }
    }
}

#[async_trait]
impl ChunkSource for ValidatingSource {
    async fn read(&mut self) -> Result<Option<Bytes>, BufferError> {
        match &self.state {
            State::Finished => return Ok(None),
            State::Failed(error) => return Err(error.clone()),
            State::Streaming => {}
        }
        loop {
            match self.inner.read().await {
                Err(error) => return Err(self.fail_transport(error)),
                Ok(None) => {
                    // End of stream; for a valid blob this is only reachable
                    // when the declared size is zero, otherwise the stream is
                    // short.
                    return self.end_of_stream_verdict().await.map(|()| None);
                }
                Ok(Some(chunk)) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    let validator = self.validator.as_mut().expect("validator live");
                    if let Err(error) = validator.update(&chunk) {
                        return Err(self.fail_corruption(error).await);
                    }
                    if !validator.at_declared_size() {
                        return Ok(Some(chunk));
                    }
                    return self.drain_and_verify().await.map(|()| Some(chunk));
                }
            }
        }
    }

    fn close(&mut self) {
        self.close_inner();
    }
}

impl Drop for ValidatingSource {
    fn drop(&mut self) {
        self.close_inner();
    }
}
