//! Shared fixtures for buffer behavior tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reef_digest::Digest;

use crate::{Buffer, BufferError, ChunkSource, RepairStrategy};

pub(crate) const HELLO_MD5: &str = "8b1a9953c4611296a827abf8c47804d7";
pub(crate) const HELLO_WORLD_MD5: &str = "3e25960a79dbc69b674cd4ec67a72c62";
pub(crate) const XYZZY_MD5: &str = "56f2d4d0b97e43f94505299dc45942a1";
pub(crate) const HELLO_WORLF_MD5: &str = "d46893336c594d884bb1b9b4f5299f4a";
pub(crate) const EMPTY_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";

pub(crate) fn hello_digest() -> Digest {
    Digest::must_new("foo", HELLO_MD5, 5)
}

pub(crate) fn hello_world_digest() -> Digest {
    Digest::must_new("foo", HELLO_WORLD_MD5, 11)
}

pub(crate) fn empty_digest() -> Digest {
    Digest::must_new("empty", EMPTY_MD5, 0)
}

pub(crate) fn backend_on_fire() -> BufferError {
    BufferError::internal("Storage backend on fire")
}

/// Scripted chunk source: plays back a fixed sequence of chunks, then ends
/// the stream or yields a terminal error. Counts `close` invocations so tests
/// can assert the close-once contract.
pub(crate) struct ScriptedSource {
    chunks: VecDeque<Bytes>,
    terminal_error: Option<BufferError>,
    failed: Option<BufferError>,
    closes: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub(crate) fn new(chunks: &[&[u8]]) -> ScriptedSource {
        ScriptedSource {
            chunks: chunks
                .iter()
                .map(|c| Bytes::copy_from_slice(c))
                .collect(),
            terminal_error: None,
            failed: None,
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A source yielding `chunks`, then failing with `error` instead of
    /// ending the stream.
    pub(crate) fn with_error(chunks: &[&[u8]], error: BufferError) -> ScriptedSource {
        let mut source = ScriptedSource::new(chunks);
        source.terminal_error = Some(error);
        source
    }

    /// Shared close counter, usable after the source has been moved into a
    /// buffer.
    pub(crate) fn closes(&self) -> Arc<AtomicUsize> {
        self.closes.clone()
    }
}

#[async_trait]
impl ChunkSource for ScriptedSource {
    async fn read(&mut self) -> Result<Option<Bytes>, BufferError> {
        if let Some(error) = &self.failed {
            return Err(error.clone());
        }
        if let Some(chunk) = self.chunks.pop_front() {
            return Ok(Some(chunk));
        }
        match self.terminal_error.take() {
            Some(error) => {
                self.failed = Some(error.clone());
                Err(error)
            }
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Counting repair callback factory.
pub(crate) struct RepairCounter {
    calls: Arc<AtomicUsize>,
}

impl RepairCounter {
    pub(crate) fn new() -> RepairCounter {
        RepairCounter {
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn strategy(&self, digest: &Digest) -> RepairStrategy {
        let calls = self.calls.clone();
        RepairStrategy::reparable(digest.clone(), move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        })
    }

    pub(crate) fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// A reparable CAS buffer over scripted chunks, along with its close counter.
pub(crate) fn cas_buffer(
    digest: &Digest,
    chunks: &[&[u8]],
    repair: RepairStrategy,
) -> (Buffer, Arc<AtomicUsize>) {
    let source = ScriptedSource::new(chunks);
    let closes = source.closes();
    (
        Buffer::cas_from_chunk_source(digest.clone(), Box::new(source), repair),
        closes,
    )
}

/// Wait until `closes` reaches `expected`, within a bounded window. Used for
/// asserting on work done by the clone-stream producer task.
pub(crate) async fn await_closes(closes: &Arc<AtomicUsize>, expected: usize) {
    for _ in 0..200 {
        if closes.load(Ordering::SeqCst) == expected {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert_eq!(closes.load(Ordering::SeqCst), expected);
}
