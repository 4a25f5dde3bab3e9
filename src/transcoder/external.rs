use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info};

use super::{Orientation, ToolCommandBuilder, Transcoder};
use crate::config::ToolsConfig;
use crate::error::Result;

/// Transcoder backed by ffmpegthumbnailer and exiftool
pub struct ExternalTranscoder {
    command_builder: ToolCommandBuilder,
}

impl ExternalTranscoder {
    pub fn new(config: ToolsConfig) -> Self {
        Self {
            command_builder: ToolCommandBuilder::new(
                config.ffmpegthumbnailer_path,
                config.exiftool_path,
            ),
        }
    }
}

#[async_trait]
impl Transcoder for ExternalTranscoder {
    async fn extract_thumbnail(&self, input: &Path, output: &Path, size: u32) -> Result<()> {
        debug!("Extracting {}px thumbnail from {} to {}", size, input.display(), output.display());

        self.command_builder
            .extract_thumbnail(input, output, size)
            .execute()
            .await?;
        Ok(())
    }

    async fn read_orientation(&self, path: &Path) -> Result<Orientation> {
        let output = self.command_builder.read_orientation(path).execute().await?;
        output.stdout.parse()
    }

    async fn write_orientation(&self, path: &Path, orientation: Orientation) -> Result<()> {
        debug!("Setting orientation {} on {}", orientation, path.display());

        self.command_builder
            .write_orientation(path, orientation.value())
            .execute()
            .await?;
        Ok(())
    }

    async fn check_availability(&self) -> Result<()> {
        let thumbnailer = self.command_builder.thumbnailer_version().execute().await?;
        let exiftool = self.command_builder.exiftool_version().execute().await?;

        info!(
            "ffmpegthumbnailer {} and exiftool {} are available",
            thumbnailer.stdout.lines().next().unwrap_or("").trim(),
            exiftool.stdout.trim()
        );
        Ok(())
    }
}
