// Object store access
//
// The rest of the crate only sees the `ObjectStore` trait:
// - S3: aws-sdk-s3 implementation, works against AWS and MinIO
//
// Tests use the in-memory store from `crate::testing`.

pub mod s3;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::path::Path;

pub use s3::{S3ObjectStore, create_s3_client};

use crate::error::Result;

/// One entry of a bucket listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    /// Content fingerprint, without the quotes S3 wraps it in
    pub etag: String,
    pub content_type: Option<String>,
}

/// Lazy listing of a bucket, fetched one page at a time
pub type ObjectStream<'a> = BoxStream<'a, Result<ObjectInfo>>;

/// Narrow object store surface consumed by the thumbnailer
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List every object in the bucket, recursively
    fn list_objects<'a>(&'a self, bucket: &'a str) -> ObjectStream<'a>;

    /// Whether `key` exists. A missing object is `Ok(false)`, not an error.
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool>;

    /// Download an object to a local file, replacing it if present
    async fn download_to_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()>;

    /// Upload a local file as an object with the given content type
    async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<()>;
}

/// S3 returns etags as quoted strings.
pub fn normalize_etag(etag: &str) -> String {
    etag.trim().trim_matches('"').to_string()
}
