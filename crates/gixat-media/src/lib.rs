//! Gixat Media
//!
//! Everything between an uploaded file and a stored object:
//! - S3-compatible object storage with SigV4 presigned URLs
//! - In-memory object storage for tests and local runs
//! - File name, type and size validation
//! - ClamAV virus scanning
//! - Image downscaling and re-encoding
//! - Object key layout and the upload pipeline that ties it together

pub mod compression;
pub mod error;
pub mod keys;
pub mod memory;
pub mod pipeline;
pub mod s3;
pub mod scanner;
pub mod sigv4;
pub mod validation;

pub use error::{MediaError, MediaResult};
pub use memory::MemoryObjectStore;
pub use pipeline::{IncomingFile, PresignedUpload, StoredUpload, UploadPipeline};
pub use s3::{S3Config, S3ObjectStore};
pub use scanner::{ClamAvScanner, DisabledScanner, ScanResult, VirusScanner};
pub use sigv4::Credentials;
