use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::error::{Result, ThumbnailerError};
use crate::store::normalize_etag;

/// A single object-created record for the watched bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectCreated {
    pub bucket: String,
    pub key: String,
    pub etag: String,
    pub content_type: Option<String>,
    pub event_name: String,
    pub event_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct EventMessage {
    #[serde(rename = "Records", default)]
    records: Vec<EventRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventRecord {
    event_name: String,
    #[serde(default)]
    event_time: Option<DateTime<Utc>>,
    s3: S3Entity,
}

#[derive(Debug, Deserialize)]
struct S3Entity {
    bucket: BucketEntity,
    object: ObjectEntity,
}

#[derive(Debug, Deserialize)]
struct BucketEntity {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectEntity {
    key: String,
    #[serde(default)]
    e_tag: Option<String>,
    #[serde(default)]
    content_type: Option<String>,
}

/// Decode an S3 event notification body.
///
/// Only records for `bucket` whose event name starts with `event_prefix` are
/// returned; MinIO's `s3:` name prefix is accepted as well. Test events and
/// bodies without records decode to an empty list. A record whose key does
/// not decode is dropped so the rest of the message is still delivered.
pub fn parse_event_message(body: &str, bucket: &str, event_prefix: &str) -> Result<Vec<ObjectCreated>> {
    let message: EventMessage = serde_json::from_str(body)
        .map_err(|e| ThumbnailerError::Notification(format!("Malformed event message: {}", e)))?;

    let events = message
        .records
        .into_iter()
        .filter(|record| record.s3.bucket.name == bucket)
        .filter(|record| {
            let name = record.event_name.strip_prefix("s3:").unwrap_or(&record.event_name);
            name.starts_with(event_prefix)
        })
        .filter_map(|record| {
            let key = match decode_key(&record.s3.object.key) {
                Ok(key) => key,
                Err(e) => {
                    warn!("Skipping event record: {}", e);
                    return None;
                }
            };
            Some(ObjectCreated {
                key,
                etag: record.s3.object.e_tag.as_deref().map(normalize_etag).unwrap_or_default(),
                content_type: record.s3.object.content_type,
                bucket: record.s3.bucket.name,
                event_name: record.event_name,
                event_time: record.event_time,
            })
        })
        .collect();
    Ok(events)
}

/// Keys in event payloads are form-encoded: `+` stands for a space.
fn decode_key(raw: &str) -> Result<String> {
    let plus_decoded = raw.replace('+', " ");
    urlencoding::decode(&plus_decoded)
        .map(|key| key.into_owned())
        .map_err(|e| ThumbnailerError::Notification(format!("Undecodable object key {:?}: {}", raw, e)))
}
