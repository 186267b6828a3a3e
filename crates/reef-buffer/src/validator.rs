//! Checksum and size accounting for content-addressed streams.

use digest::DynDigest;
use reef_digest::Digest;

use crate::error::BufferError;

/// Accumulates the hash and length of a stream and judges it against the
/// digest it is supposed to match.
///
/// Overlong streams fail from [`Validator::update`] the moment the excess
/// byte is seen; short streams and checksum mismatches are verdicts of
/// [`Validator::finish`] at end of stream.
pub(crate) struct Validator {
    digest: Digest,
    hasher: Box<dyn DynDigest + Send>,
    bytes_seen: u64,
}

impl Validator {
    pub(crate) fn new(digest: &Digest) -> Validator {
        Validator {
            hasher: digest.new_hasher(),
            digest: digest.clone(),
            bytes_seen: 0,
        }
    }

    /// Account for a chunk of the stream.
    pub(crate) fn update(&mut self, chunk: &[u8]) -> Result<(), BufferError> {
        self.bytes_seen += chunk.len() as u64;
        if self.bytes_seen > self.digest.size_bytes() {
            return Err(BufferError::SizeTooLarge {
                actual: self.bytes_seen,
                expected: self.digest.size_bytes(),
            });
        }
        self.hasher.update(chunk);
        Ok(())
    }

    /// Whether exactly the declared number of bytes has been seen.
    pub(crate) fn at_declared_size(&self) -> bool {
        self.bytes_seen == self.digest.size_bytes()
    }

    /// Final verdict at end of stream.
    pub(crate) fn finish(self) -> Result<(), BufferError> {
        if self.bytes_seen < self.digest.size_bytes() {
            return Err(BufferError::SizeTooSmall {
                actual: self.bytes_seen,
                expected: self.digest.size_bytes(),
            });
        }
        let actual = self.hasher.finalize();
        if actual.as_ref() != self.digest.hash_bytes() {
            return Err(BufferError::ChecksumMismatch {
                actual: hex::encode(&actual),
                expected: self.digest.hash_hex(),
            });
        }
        Ok(())
    }
}

/// Validate an in-memory payload against a digest in one shot.
pub(crate) fn validate_byte_slice(digest: &Digest, data: &[u8]) -> Result<(), BufferError> {
    let mut validator = Validator::new(digest);
    validator.update(data)?;
    validator.finish()
}
