//! Blob digests for the Reef storage layer.
//!
//! A [`Digest`] is the triple of instance name, hash, and size that uniquely
//! identifies a blob. The hash algorithm is never transmitted explicitly: the
//! length of the hexadecimal hash decides it (32 characters → MD5, 40 →
//! SHA-1, 64 → SHA-256, 128 → SHA-512). The instance name is opaque routing
//! metadata and never enters the hash.

use std::fmt;

use digest::DynDigest;
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha256, Sha512};

/// Errors produced when parsing a digest from its wire form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DigestError {
    /// The declared blob size was negative.
    #[error("negative blob size: {0}")]
    NegativeSize(i64),

    /// The hash length matches no supported algorithm.
    #[error("hash length of {0} characters matches no supported algorithm")]
    UnknownHashLength(usize),

    /// The hash contains characters outside lowercase hexadecimal.
    #[error("hash is not lowercase hexadecimal: {0:?}")]
    InvalidHexCharacters(String),
}

/// Hash algorithm, derived from the hexadecimal hash length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// Select the algorithm matching a hexadecimal hash length.
    pub fn from_hex_len(len: usize) -> Option<HashAlgorithm> {
        match len {
            32 => Some(HashAlgorithm::Md5),
            40 => Some(HashAlgorithm::Sha1),
            64 => Some(HashAlgorithm::Sha256),
            128 => Some(HashAlgorithm::Sha512),
            _ => None,
        }
    }

    /// Length of this algorithm's raw digest in bytes.
    pub fn raw_len(self) -> usize {
        match self {
            HashAlgorithm::Md5 => 16,
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha512 => 64,
        }
    }

    /// Create a fresh hasher state for this algorithm.
    pub fn new_hasher(self) -> Box<dyn DynDigest + Send> {
        match self {
            HashAlgorithm::Md5 => Box::new(Md5::default()),
            HashAlgorithm::Sha1 => Box::new(Sha1::default()),
            HashAlgorithm::Sha256 => Box::new(Sha256::default()),
            HashAlgorithm::Sha512 => Box::new(Sha512::default()),
        }
    }
}

/// Unique identifier of a blob: instance name, content hash, and size.
///
/// Two digests are equal iff all three components match byte-exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest {
    instance: String,
    hash: Vec<u8>,
    size_bytes: u64,
}

impl Digest {
    /// Parse a digest from its wire form.
    ///
    /// Rejects hashes whose length matches no supported algorithm, hashes
    /// containing anything but lowercase hexadecimal, and negative sizes.
    pub fn new(
        instance: impl Into<String>,
        hash_hex: &str,
        size_bytes: i64,
    ) -> Result<Digest, DigestError> {
        if size_bytes < 0 {
            return Err(DigestError::NegativeSize(size_bytes));
        }
        if HashAlgorithm::from_hex_len(hash_hex.len()).is_none() {
            return Err(DigestError::UnknownHashLength(hash_hex.len()));
        }
        if !hash_hex
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        {
            return Err(DigestError::InvalidHexCharacters(hash_hex.to_string()));
        }
        let hash = hex::decode(hash_hex).expect("validated hex");
        Ok(Digest {
            instance: instance.into(),
            hash,
            size_bytes: size_bytes as u64,
        })
    }

    /// Parse a digest, panicking on malformed input. Intended for tests.
    pub fn must_new(instance: &str, hash_hex: &str, size_bytes: i64) -> Digest {
        Digest::new(instance, hash_hex, size_bytes).expect("malformed digest")
    }

    /// The instance name this digest routes to.
    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// The raw hash bytes.
    pub fn hash_bytes(&self) -> &[u8] {
        &self.hash
    }

    /// The hash as lowercase hexadecimal.
    pub fn hash_hex(&self) -> String {
        hex::encode(&self.hash)
    }

    /// The declared size of the blob in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// The hash algorithm, as implied by the hash length.
    pub fn algorithm(&self) -> HashAlgorithm {
        match self.hash.len() {
            16 => HashAlgorithm::Md5,
            20 => HashAlgorithm::Sha1,
            32 => HashAlgorithm::Sha256,
            _ => HashAlgorithm::Sha512,
        }
    }

    /// Create a fresh hasher producing this digest's algorithm.
    pub fn new_hasher(&self) -> Box<dyn DynDigest + Send> {
        self.algorithm().new_hasher()
    }

    /// Canonical map key: `{hash}-{size}-{instance}`.
    pub fn key(&self) -> String {
        format!("{}-{}-{}", self.hash_hex(), self.size_bytes, self.instance)
    }

    /// ByteStream resource path: `{instance}/blobs/{hash}/{size}`.
    pub fn byte_stream_path(&self) -> String {
        format!(
            "{}/blobs/{}/{}",
            self.instance,
            self.hash_hex(),
            self.size_bytes
        )
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}
