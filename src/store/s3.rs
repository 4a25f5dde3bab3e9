use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use futures::StreamExt;
use futures::stream;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};

use super::{ObjectInfo, ObjectStore, ObjectStream, normalize_etag};
use crate::config::StoreConfig;
use crate::error::{Result, ThumbnailerError};

/// Build an S3 client for the configured endpoint with static credentials.
pub async fn create_s3_client(config: &StoreConfig) -> Client {
    let credentials = Credentials::new(
        &config.access_key,
        &config.secret_key,
        None,
        None,
        "s3g-thumbnailer",
    );

    let shared_config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.region.clone()))
        .endpoint_url(config.endpoint_url())
        .credentials_provider(credentials)
        .load()
        .await;

    // MinIO and most self-hosted stores only serve path-style requests
    let s3_config = aws_sdk_s3::config::Builder::from(&shared_config)
        .force_path_style(true)
        .build();

    Client::from_conf(s3_config)
}

/// `ObjectStore` backed by the AWS SDK
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn from_config(config: &StoreConfig) -> Self {
        Self::new(create_s3_client(config).await)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn list_objects<'a>(&'a self, bucket: &'a str) -> ObjectStream<'a> {
        debug!(bucket, "Listing bucket");

        let pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .into_paginator()
            .send();

        stream::unfold(Some(pages), move |state| async move {
            let mut pages = state?;
            match pages.next().await {
                Some(Ok(page)) => {
                    let entries: Vec<Result<ObjectInfo>> = page
                        .contents()
                        .iter()
                        .filter_map(|object| {
                            let key = object.key()?;
                            if key.ends_with('/') {
                                return None;
                            }
                            Some(Ok(ObjectInfo {
                                key: key.to_string(),
                                etag: object.e_tag().map(normalize_etag).unwrap_or_default(),
                                content_type: None,
                            }))
                        })
                        .collect();
                    trace!(bucket, count = entries.len(), "Fetched listing page");
                    Some((stream::iter(entries), Some(pages)))
                }
                Some(Err(e)) => {
                    let err = ThumbnailerError::store(bucket, "", format!("listing failed: {}", e));
                    Some((stream::iter(vec![Err(err)]), None))
                }
                None => None,
            }
        })
        .flatten()
        .boxed()
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error().is_some_and(|se| se.is_not_found()) {
                    Ok(false)
                } else {
                    Err(ThumbnailerError::store(bucket, key, format!("stat failed: {}", e)))
                }
            }
        }
    }

    async fn download_to_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()> {
        debug!(bucket, key, path = %path.display(), "Downloading object");

        let object = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| ThumbnailerError::store(bucket, key, format!("download failed: {}", e)))?;

        let mut body = object.body.into_async_read();
        let mut file = File::create(path).await?;
        let written = tokio::io::copy(&mut body, &mut file)
            .await
            .map_err(|e| ThumbnailerError::store(bucket, key, format!("reading body failed: {}", e)))?;
        file.flush().await?;

        trace!(bucket, key, bytes = written, "Download complete");
        Ok(())
    }

    async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<()> {
        debug!(bucket, key, path = %path.display(), "Uploading object");

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| ThumbnailerError::store(bucket, key, format!("reading {} failed: {}", path.display(), e)))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| ThumbnailerError::store(bucket, key, format!("upload failed: {}", e)))?;

        Ok(())
    }
}
