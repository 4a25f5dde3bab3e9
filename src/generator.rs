use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::store::ObjectStore;
use crate::transcoder::{Orientation, Transcoder};

/// Suffix appended to a media key to form its thumbnail key
pub const THUMBNAIL_SUFFIX: &str = ".jpg";

/// Content type of every uploaded thumbnail
pub const THUMBNAIL_CONTENT_TYPE: &str = "image/jpeg";

/// Thumbnail key derived from a media key
pub fn thumbnail_key(source_key: &str) -> String {
    format!("{}{}", source_key, THUMBNAIL_SUFFIX)
}

/// Media key a thumbnail key was derived from, if it carries the suffix
pub fn source_key(thumbnail_key: &str) -> Option<&str> {
    thumbnail_key.strip_suffix(THUMBNAIL_SUFFIX)
}

/// A local file removed when the guard goes out of scope.
///
/// A file that was never created is fine; any other removal failure is
/// logged and otherwise ignored.
#[derive(Debug)]
pub struct ScopedFile {
    path: PathBuf,
}

impl ScopedFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed temporary file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove temporary file {}: {}", self.path.display(), e),
        }
    }
}

/// Produces the thumbnail object for one media object
pub struct ThumbnailGenerator {
    store: Arc<dyn ObjectStore>,
    transcoder: Arc<dyn Transcoder>,
    media_bucket: String,
    thumbnail_bucket: String,
    size: u32,
    work_dir: PathBuf,
}

impl ThumbnailGenerator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        transcoder: Arc<dyn Transcoder>,
        media_bucket: impl Into<String>,
        thumbnail_bucket: impl Into<String>,
        size: u32,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            transcoder,
            media_bucket: media_bucket.into(),
            thumbnail_bucket: thumbnail_bucket.into(),
            size,
            work_dir: work_dir.into(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn media_bucket(&self) -> &str {
        &self.media_bucket
    }

    pub fn thumbnail_bucket(&self) -> &str {
        &self.thumbnail_bucket
    }

    /// Local paths for the downloaded source and the converted output
    pub fn temp_paths(&self, source_key: &str, fingerprint: &str) -> (PathBuf, PathBuf) {
        let extension = Path::new(source_key)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let input_name = format!("{}{}", sanitize_fingerprint(fingerprint), extension);
        let output_name = format!("{}{}", input_name, THUMBNAIL_SUFFIX);
        (self.work_dir.join(input_name), self.work_dir.join(output_name))
    }

    /// Download `source_key`, convert it and upload `<source_key>.jpg`.
    ///
    /// Safe to repeat: a second run overwrites the thumbnail with the same
    /// result. Nothing is uploaded unless extraction succeeded, and both
    /// temporary files are gone when this returns.
    pub async fn generate(&self, source_key: &str, fingerprint: &str) -> Result<()> {
        info!(key = source_key, etag = fingerprint, "Making thumbnail");

        let (input_path, output_path) = self.temp_paths(source_key, fingerprint);

        let input = ScopedFile::new(input_path);
        self.store
            .download_to_file(&self.media_bucket, source_key, input.path())
            .await?;

        let orientation = self.read_orientation(input.path()).await;

        let output = ScopedFile::new(output_path);
        self.transcoder
            .extract_thumbnail(input.path(), output.path(), self.size)
            .await?;

        if let Some(orientation) = orientation {
            self.restore_orientation(output.path(), orientation).await;
        }

        let key = thumbnail_key(source_key);
        self.store
            .upload_file(&self.thumbnail_bucket, &key, output.path(), THUMBNAIL_CONTENT_TYPE)
            .await?;

        info!(key = %key, bucket = %self.thumbnail_bucket, "Uploaded thumbnail");
        Ok(())
    }

    /// Cosmetic only: a missing or unreadable tag just means no orientation.
    async fn read_orientation(&self, path: &Path) -> Option<Orientation> {
        self.transcoder
            .read_orientation(path)
            .await
            .map_err(|e| debug!("No orientation for {}: {}", path.display(), e))
            .ok()
    }

    async fn restore_orientation(&self, path: &Path, orientation: Orientation) {
        if let Err(e) = self.transcoder.write_orientation(path, orientation).await {
            warn!("Could not set orientation {} on {}: {}", orientation, path.display(), e);
        }
    }
}

/// Keep fingerprints usable as file names inside the work directory
fn sanitize_fingerprint(fingerprint: &str) -> String {
    let cleaned: String = fingerprint
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if cleaned.is_empty() {
        "unversioned".to_string()
    } else {
        cleaned
    }
}
