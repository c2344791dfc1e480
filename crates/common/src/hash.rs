//! Content digests.
//!
//! Digests are only ever compared and reported back to clients, never
//! stored. Everything here streams, so memory use does not depend on file
//! size.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Read buffer used when digesting readers and files
const DIGEST_BUFFER_SIZE: usize = 64 * 1024;

pub const DIGEST_SIZE: usize = 32;

/// A SHA-256 digest of some file content.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileDigest([u8; DIGEST_SIZE]);

impl FileDigest {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Digest an in-memory buffer.
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = ContentHasher::new();
        hasher.update(data);
        hasher.finalize()
    }
}

impl fmt::Display for FileDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for FileDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileDigest({})", self.to_hex())
    }
}

impl FromStr for FileDigest {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; DIGEST_SIZE];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for FileDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for FileDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Incremental digest over content that arrives in pieces.
#[derive(Clone, Default)]
pub struct ContentHasher {
    inner: Sha256,
    len: u64,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
        self.len += chunk.len() as u64;
    }

    /// Number of bytes fed in so far
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn finalize(self) -> FileDigest {
        let mut bytes = [0u8; DIGEST_SIZE];
        bytes.copy_from_slice(&self.inner.finalize());
        FileDigest(bytes)
    }
}

/// Digest everything a reader yields. Fails if the reader fails part way.
pub async fn digest_reader<R>(reader: R) -> std::io::Result<FileDigest>
where
    R: AsyncRead,
{
    tokio::pin!(reader);
    let mut hasher = ContentHasher::new();
    let mut buf = vec![0u8; DIGEST_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}

pub async fn digest_file(path: impl AsRef<Path>) -> std::io::Result<FileDigest> {
    let file = tokio::fs::File::open(path.as_ref()).await?;
    digest_reader(file).await
}
