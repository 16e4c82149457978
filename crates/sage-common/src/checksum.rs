//! Content digests for upload integrity
//!
//! Object stores verify a transfer against the base64 encoded MD5 of the body
//! (`Content-MD5`). [`ContentDigest`] computes that digest once and renders it
//! in both the base64 form sent on the wire and the hex form used in logs.

use crate::error::Result;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::Path;
use tokio::io::AsyncReadExt;

const BUFFER_SIZE: usize = 8192;

/// MD5 digest of a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentDigest([u8; 16]);

impl ContentDigest {
    /// Digest of an in-memory buffer
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(md5::compute(data).0)
    }

    /// Digest of a file, streamed on the tokio runtime
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut context = md5::Context::new();
        let mut buffer = vec![0u8; BUFFER_SIZE];

        loop {
            let bytes_read = file.read(&mut buffer).await?;
            if bytes_read == 0 {
                break;
            }
            context.consume(&buffer[..bytes_read]);
        }

        Ok(Self(context.compute().0))
    }

    /// Base64 form, as expected in a `Content-MD5` header
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Lowercase hex form
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
