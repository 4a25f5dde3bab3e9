// External transcoder invocation
//
// Thumbnails are produced by shelling out to two tools:
// - ffmpegthumbnailer: decodes stills and videos, scales, writes JPEG
// - exiftool: reads and restores the orientation tag
//
// Commands are built from fixed templates (see `commands`) and every call is
// a single run of the tool; retries belong to the caller.

pub mod commands;
pub mod external;
pub mod orientation;

use async_trait::async_trait;
use std::path::Path;

pub use commands::{ToolCommand, ToolCommandBuilder, ToolOutput};
pub use external::ExternalTranscoder;
pub use orientation::Orientation;

use crate::config::ToolsConfig;
use crate::error::Result;

/// Operations the thumbnail generator needs from the external tools
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Write a JPEG of `input` scaled to `size` pixels to `output`
    async fn extract_thumbnail(&self, input: &Path, output: &Path, size: u32) -> Result<()>;

    /// Orientation tag of `path`
    async fn read_orientation(&self, path: &Path) -> Result<Orientation>;

    /// Set the orientation tag of `path` in place
    async fn write_orientation(&self, path: &Path, orientation: Orientation) -> Result<()>;

    /// Check both tools can be executed
    async fn check_availability(&self) -> Result<()>;
}

/// Factory for creating transcoder instances
pub struct TranscoderFactory;

impl TranscoderFactory {
    /// Create the default transcoder (ffmpegthumbnailer + exiftool)
    pub fn create_default(config: ToolsConfig) -> Box<dyn Transcoder> {
        Box::new(ExternalTranscoder::new(config))
    }
}
