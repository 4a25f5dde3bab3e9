//! S3G Thumbnailer - keeps a thumbnail bucket in sync with a media bucket
//!
//! Every photo or video uploaded to the media bucket gets a JPEG thumbnail
//! stored under `<key>.jpg` in the thumbnail bucket. Missing thumbnails are
//! backfilled at startup, new uploads are picked up from bucket
//! notifications, and the conversion itself is done by ffmpegthumbnailer
//! and exiftool.

pub mod cli;
pub mod config;
pub mod error;
pub mod generator;
pub mod notify;
pub mod reconciler;
pub mod service;
pub mod store;
pub mod transcoder;

#[cfg(test)]
pub(crate) mod testing;
