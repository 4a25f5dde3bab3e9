use futures::TryStreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::error::Result;
use crate::generator::{ThumbnailGenerator, source_key, thumbnail_key};
use crate::store::{ObjectInfo, ObjectStore};

/// Outcome of one backfill pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub missing: usize,
    pub generated: usize,
    pub failed: Vec<String>,
}

/// Source keys in `sources` without a `<key>.jpg` entry in `thumbnails`.
pub fn missing_keys<'a, S, T>(sources: S, thumbnails: T) -> HashSet<String>
where
    S: IntoIterator<Item = &'a str>,
    T: IntoIterator<Item = &'a str>,
{
    let covered: HashSet<&str> = thumbnails.into_iter().filter_map(source_key).collect();
    sources
        .into_iter()
        .filter(|key| !covered.contains(key))
        .map(str::to_string)
        .collect()
}

/// Diffs the media bucket against the thumbnail bucket
pub struct Reconciler {
    store: Arc<dyn ObjectStore>,
    media_bucket: String,
    thumbnail_bucket: String,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        media_bucket: impl Into<String>,
        thumbnail_bucket: impl Into<String>,
    ) -> Self {
        Self {
            store,
            media_bucket: media_bucket.into(),
            thumbnail_bucket: thumbnail_bucket.into(),
        }
    }

    /// Keys of media objects that have no thumbnail yet
    pub async fn find_missing_thumbnails(&self) -> Result<HashSet<String>> {
        Ok(self
            .find_missing_objects()
            .await?
            .into_iter()
            .map(|object| object.key)
            .collect())
    }

    /// Media objects lacking a thumbnail, ordered by key.
    ///
    /// Any listing error aborts the whole diff.
    pub async fn find_missing_objects(&self) -> Result<Vec<ObjectInfo>> {
        let started = Instant::now();

        let thumbnails: Vec<String> = self
            .store
            .list_objects(&self.thumbnail_bucket)
            .map_ok(|object| object.key)
            .try_collect()
            .await?;
        let media: Vec<ObjectInfo> = self
            .store
            .list_objects(&self.media_bucket)
            .try_collect()
            .await?;

        let missing_set = missing_keys(
            media.iter().map(|object| object.key.as_str()),
            thumbnails.iter().map(String::as_str),
        );
        let mut missing: Vec<ObjectInfo> = media
            .into_iter()
            .filter(|object| missing_set.contains(&object.key))
            .collect();
        missing.sort_by(|a, b| a.key.cmp(&b.key));

        info!(
            "{} of the objects in {} lack a thumbnail in {} (diff took {:?})",
            missing.len(),
            self.media_bucket,
            self.thumbnail_bucket,
            started.elapsed()
        );
        Ok(missing)
    }

    /// Generate every missing thumbnail, one at a time.
    ///
    /// Failures of single items are logged and reported; only a listing
    /// failure aborts the pass.
    pub async fn backfill(&self, generator: &ThumbnailGenerator) -> Result<BackfillReport> {
        let missing = self.find_missing_objects().await?;
        let mut report = BackfillReport {
            missing: missing.len(),
            ..Default::default()
        };

        for (index, object) in missing.iter().enumerate() {
            info!("Backfilling {}/{}: {}", index + 1, report.missing, object.key);
            match generator.generate(&object.key, &object.etag).await {
                Ok(()) => report.generated += 1,
                Err(e) => {
                    warn!("Failed to create {}: {}", thumbnail_key(&object.key), e);
                    report.failed.push(object.key.clone());
                }
            }
        }

        info!(
            "Backfill finished: {} generated, {} failed",
            report.generated,
            report.failed.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeTranscoder, MemoryStore};

    fn set(keys: &[&str]) -> HashSet<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_missing_keys_scenario() {
        let missing = missing_keys(
            ["alice/trip/1.jpg", "alice/trip/2.jpg"],
            ["alice/trip/1.jpg.jpg"],
        );
        assert_eq!(missing, set(&["alice/trip/2.jpg"]));
    }

    #[test]
    fn test_missing_keys_ignores_orphans_and_foreign_keys() {
        let missing = missing_keys(
            ["a.png", "b.mp4", "c.jpg"],
            ["a.png.jpg", "deleted.mov.jpg", "notes.txt", "c.jpg"],
        );
        // "c.jpg" in the thumbnail bucket is the thumbnail of "c", not of "c.jpg"
        assert_eq!(missing, set(&["b.mp4", "c.jpg"]));
    }

    #[test]
    fn test_missing_keys_empty_buckets() {
        assert!(missing_keys([], ["x.jpg"]).is_empty());
        assert_eq!(missing_keys(["x"], []), set(&["x"]));
    }

    #[tokio::test]
    async fn test_find_missing_thumbnails() {
        let store = Arc::new(MemoryStore::new());
        store.insert("media", "alice/trip/1.jpg", "e1", b"1");
        store.insert("media", "alice/trip/2.jpg", "e2", b"2");
        store.insert("thumbnails", "alice/trip/1.jpg.jpg", "t1", b"t");

        let reconciler = Reconciler::new(store, "media", "thumbnails");
        let missing = reconciler.find_missing_thumbnails().await.unwrap();
        assert_eq!(missing, set(&["alice/trip/2.jpg"]));
    }

    #[tokio::test]
    async fn test_find_missing_ignores_orphans_and_foreign_keys() {
        let store = Arc::new(MemoryStore::new());
        for key in ["a.png", "b.mp4", "c.jpg"] {
            store.insert("media", key, "e", b"m");
        }
        for key in ["a.png.jpg", "deleted.mov.jpg", "notes.txt", "c.jpg"] {
            store.insert("thumbnails", key, "t", b"t");
        }

        let reconciler = Reconciler::new(store, "media", "thumbnails");
        let missing: Vec<String> = reconciler
            .find_missing_objects()
            .await
            .unwrap()
            .into_iter()
            .map(|object| object.key)
            .collect();
        assert_eq!(missing, vec!["b.mp4".to_string(), "c.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_listing_failure_aborts_diff() {
        let store = Arc::new(MemoryStore::new());
        store.insert("media", "a.jpg", "e1", b"1");
        store.insert("media", "b.jpg", "e2", b"2");
        store.fail_listing("media");

        let reconciler = Reconciler::new(store, "media", "thumbnails");
        assert!(reconciler.find_missing_thumbnails().await.is_err());
    }

    #[tokio::test]
    async fn test_backfill_continues_past_failures() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        store.insert("media", "a.jpg", "ea", b"a");
        store.insert("media", "b.mov", "eb", b"b");
        store.insert("media", "c.png", "ec", b"c");
        store.insert("thumbnails", "c.png.jpg", "tc", b"t");

        let transcoder = Arc::new(FakeTranscoder::new().failing_on("ea"));
        let generator = ThumbnailGenerator::new(
            store.clone(),
            transcoder.clone(),
            "media",
            "thumbnails",
            300,
            dir.path(),
        );
        let reconciler = Reconciler::new(store.clone(), "media", "thumbnails");

        let report = reconciler.backfill(&generator).await.unwrap();
        assert_eq!(
            report,
            BackfillReport {
                missing: 2,
                generated: 1,
                failed: vec!["a.jpg".to_string()],
            }
        );
        assert_eq!(transcoder.extractions(), 2);
        assert_eq!(
            store.keys("thumbnails"),
            vec!["b.mov.jpg".to_string(), "c.png.jpg".to_string()]
        );

        // The next pass only retries what is still missing
        let missing = reconciler.find_missing_thumbnails().await.unwrap();
        assert_eq!(missing, set(&["a.jpg"]));
    }
}
