//! In-memory stand-ins for the object store, the external tools and the
//! notification queue, shared by the unit tests.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, ThumbnailerError};
use crate::notify::{NotificationSource, RawMessage};
use crate::store::{ObjectInfo, ObjectStore, ObjectStream};
use crate::transcoder::{Orientation, Transcoder};

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub etag: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

#[derive(Default)]
struct StoreState {
    buckets: BTreeMap<String, BTreeMap<String, StoredObject>>,
    failing_listings: HashSet<String>,
    failing_uploads: bool,
    uploads: usize,
}

/// `ObjectStore` keeping every bucket in a sorted map
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bucket: &str, key: &str, etag: &str, data: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(
                key.to_string(),
                StoredObject {
                    etag: etag.to_string(),
                    content_type: None,
                    data: data.to_vec(),
                },
            );
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        let state = self.state.lock().unwrap();
        state.buckets.get(bucket)?.get(key).cloned()
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn fail_listing(&self, bucket: &str) {
        self.state.lock().unwrap().failing_listings.insert(bucket.to_string());
    }

    pub fn fail_uploads(&self) {
        self.state.lock().unwrap().failing_uploads = true;
    }

    pub fn uploads(&self) -> usize {
        self.state.lock().unwrap().uploads
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn list_objects<'a>(&'a self, bucket: &'a str) -> ObjectStream<'a> {
        let state = self.state.lock().unwrap();
        let mut entries: Vec<Result<ObjectInfo>> = state
            .buckets
            .get(bucket)
            .map(|objects| {
                objects
                    .iter()
                    .map(|(key, object)| {
                        Ok(ObjectInfo {
                            key: key.clone(),
                            etag: object.etag.clone(),
                            content_type: object.content_type.clone(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        // A transport failure part way through the listing
        if state.failing_listings.contains(bucket) {
            entries.truncate(1);
            entries.push(Err(ThumbnailerError::store(bucket, "", "connection reset")));
        }

        stream::iter(entries).boxed()
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        Ok(self.object(bucket, key).is_some())
    }

    async fn download_to_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()> {
        let object = self
            .object(bucket, key)
            .ok_or_else(|| ThumbnailerError::store(bucket, key, "NoSuchKey"))?;
        tokio::fs::write(path, &object.data).await?;
        Ok(())
    }

    async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<()> {
        if self.state.lock().unwrap().failing_uploads {
            return Err(ThumbnailerError::store(bucket, key, "AccessDenied"));
        }

        let data = tokio::fs::read(path).await?;
        let mut state = self.state.lock().unwrap();
        state.uploads += 1;
        state.buckets.entry(bucket.to_string()).or_default().insert(
            key.to_string(),
            StoredObject {
                etag: format!("{:x}", data.len()),
                content_type: Some(content_type.to_string()),
                data,
            },
        );
        Ok(())
    }
}

#[derive(Default)]
struct TranscoderState {
    extractions: usize,
    orientation_writes: Vec<u8>,
}

/// `Transcoder` writing a tiny JPEG-looking file instead of running tools
#[derive(Default)]
pub struct FakeTranscoder {
    orientation: Option<u8>,
    failing_fingerprints: Vec<String>,
    state: Mutex<TranscoderState>,
}

impl FakeTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_orientation(mut self, value: u8) -> Self {
        self.orientation = Some(value);
        self
    }

    /// Fail extraction for inputs whose temp name starts with `fingerprint`
    pub fn failing_on(mut self, fingerprint: &str) -> Self {
        self.failing_fingerprints.push(fingerprint.to_string());
        self
    }

    pub fn extractions(&self) -> usize {
        self.state.lock().unwrap().extractions
    }

    pub fn orientation_writes(&self) -> Vec<u8> {
        self.state.lock().unwrap().orientation_writes.clone()
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn extract_thumbnail(&self, input: &Path, output: &Path, _size: u32) -> Result<()> {
        self.state.lock().unwrap().extractions += 1;

        let name = input.file_name().unwrap_or_default().to_string_lossy().to_string();
        if self.failing_fingerprints.iter().any(|f| name.starts_with(f.as_str())) {
            return Err(ThumbnailerError::Tool {
                tool: "Thumbnail extraction".to_string(),
                detail: "Error: could not decode input (exit status: 1)".to_string(),
            });
        }

        let source = tokio::fs::read(input).await?;
        let mut jpeg = vec![0xFF, 0xD8];
        jpeg.extend_from_slice(&source);
        jpeg.extend_from_slice(&[0xFF, 0xD9]);
        tokio::fs::write(output, jpeg).await?;
        Ok(())
    }

    async fn read_orientation(&self, _path: &Path) -> Result<Orientation> {
        self.orientation
            .and_then(Orientation::new)
            .ok_or_else(|| ThumbnailerError::Orientation(String::new()))
    }

    async fn write_orientation(&self, _path: &Path, orientation: Orientation) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .orientation_writes
            .push(orientation.value());
        Ok(())
    }

    async fn check_availability(&self) -> Result<()> {
        Ok(())
    }
}

/// `NotificationSource` replaying a fixed script of poll results.
///
/// Once the script is exhausted `receive` never returns, like an idle queue.
pub struct ScriptedSource {
    script: Mutex<VecDeque<std::result::Result<Vec<RawMessage>, String>>>,
    acknowledged: Arc<Mutex<Vec<String>>>,
    drained: Option<CancellationToken>,
}

impl ScriptedSource {
    pub fn new(script: Vec<std::result::Result<Vec<RawMessage>, String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            acknowledged: Arc::new(Mutex::new(Vec::new())),
            drained: None,
        }
    }

    /// Cancel `token` when a poll finds the script exhausted
    pub fn cancel_when_drained(mut self, token: CancellationToken) -> Self {
        self.drained = Some(token);
        self
    }

    pub fn acknowledged(&self) -> Arc<Mutex<Vec<String>>> {
        self.acknowledged.clone()
    }
}

#[async_trait]
impl NotificationSource for ScriptedSource {
    async fn receive(&self) -> Result<Vec<RawMessage>> {
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(messages)) => Ok(messages),
            Some(Err(e)) => Err(ThumbnailerError::Notification(e)),
            None => {
                if let Some(token) = &self.drained {
                    token.cancel();
                }
                std::future::pending().await
            }
        }
    }

    async fn acknowledge(&self, receipt: &str) -> Result<()> {
        self.acknowledged.lock().unwrap().push(receipt.to_string());
        Ok(())
    }
}

/// S3 event message with one `ObjectCreated:Put` record per `(key, etag)`
pub fn created_message(receipt: &str, bucket: &str, objects: &[(&str, &str)]) -> RawMessage {
    let records: Vec<serde_json::Value> = objects
        .iter()
        .map(|(key, etag)| {
            serde_json::json!({
                "eventName": "ObjectCreated:Put",
                "eventTime": "2024-05-01T12:00:00.000Z",
                "s3": {
                    "bucket": {"name": bucket},
                    "object": {"key": key, "eTag": format!("\"{}\"", etag)}
                }
            })
        })
        .collect();

    RawMessage {
        receipt: receipt.to_string(),
        body: serde_json::json!({ "Records": records }).to_string(),
    }
}
