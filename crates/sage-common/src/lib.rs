//! SAGE Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the SAGE uploader workspace.
//!
//! # Overview
//!
//! - **Error Handling**: Common error type and result alias
//! - **Checksums**: Content digests used for transfer integrity checks
//! - **Logging**: Centralized `tracing` subscriber configuration
//!
//! # Example
//!
//! ```no_run
//! use sage_common::checksum::ContentDigest;
//!
//! async fn digest_payload(path: &str) -> sage_common::Result<()> {
//!     let digest = ContentDigest::from_file(path).await?;
//!     println!("Content-MD5: {}", digest.to_base64());
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{CommonError, Result};
