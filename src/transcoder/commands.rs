use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, ThumbnailerError};

/// Captured result of a successful tool run
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// External tool invocation: binary, argument list and a label for errors
#[derive(Debug, Clone)]
pub struct ToolCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
}

impl ToolCommand {
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    pub fn path<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// `flag` followed by a path value
    pub fn path_option<S: Into<String>, P: AsRef<Path>>(self, flag: S, path: P) -> Self {
        self.arg(flag).path(path)
    }

    /// Run to completion, capturing both streams.
    ///
    /// A non-zero exit becomes a `Tool` error carrying the tool's stderr, or
    /// its stdout when stderr is empty.
    pub async fn execute(&self) -> Result<ToolOutput> {
        debug!("Executing {}: {} {:?}", self.description, self.binary_path, self.args);

        let output = Command::new(&self.binary_path)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ThumbnailerError::Tool {
                tool: self.description.clone(),
                detail: format!("failed to execute {}: {}", self.binary_path, e),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            let detail = if stderr.trim().is_empty() { stdout.trim() } else { stderr.trim() };
            return Err(ThumbnailerError::Tool {
                tool: self.description.clone(),
                detail: format!("{} ({})", detail, output.status),
            });
        }

        Ok(ToolOutput { stdout, stderr })
    }
}

/// Builds the fixed argument templates for ffmpegthumbnailer and exiftool
#[derive(Debug, Clone)]
pub struct ToolCommandBuilder {
    thumbnailer_path: String,
    exiftool_path: String,
}

impl ToolCommandBuilder {
    pub fn new<S1: Into<String>, S2: Into<String>>(thumbnailer_path: S1, exiftool_path: S2) -> Self {
        Self {
            thumbnailer_path: thumbnailer_path.into(),
            exiftool_path: exiftool_path.into(),
        }
    }

    /// Still images and videos alike: one JPEG, longest edge `size` pixels
    pub fn extract_thumbnail<P: AsRef<Path>>(&self, input: P, output: P, size: u32) -> ToolCommand {
        ToolCommand::new(&self.thumbnailer_path, "Thumbnail extraction")
            .path_option("-i", input)
            .path_option("-o", output)
            .arg("-s")
            .arg(size.to_string())
            .args(["-c", "jpeg"])
    }

    /// Prints the numeric orientation tag value, nothing if absent
    pub fn read_orientation<P: AsRef<Path>>(&self, path: P) -> ToolCommand {
        ToolCommand::new(&self.exiftool_path, "Orientation read")
            .args(["-s3", "-n", "-Orientation"])
            .path(path)
    }

    pub fn write_orientation<P: AsRef<Path>>(&self, path: P, orientation: u8) -> ToolCommand {
        ToolCommand::new(&self.exiftool_path, "Orientation write")
            .args(["-overwrite_original", "-n"])
            .arg(format!("-Orientation={}", orientation))
            .path(path)
    }

    pub fn thumbnailer_version(&self) -> ToolCommand {
        ToolCommand::new(&self.thumbnailer_path, "ffmpegthumbnailer version check").arg("-v")
    }

    pub fn exiftool_version(&self) -> ToolCommand {
        ToolCommand::new(&self.exiftool_path, "exiftool version check").arg("-ver")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_thumbnail_arguments() {
        let builder = ToolCommandBuilder::new("/usr/bin/ffmpegthumbnailer", "/usr/bin/exiftool");
        let cmd = builder.extract_thumbnail("work/abc.mp4", "work/abc.mp4.jpg", 300);

        assert_eq!(cmd.binary_path, "/usr/bin/ffmpegthumbnailer");
        assert_eq!(
            cmd.args,
            vec!["-i", "work/abc.mp4", "-o", "work/abc.mp4.jpg", "-s", "300", "-c", "jpeg"]
        );
    }

    #[test]
    fn test_orientation_arguments() {
        let builder = ToolCommandBuilder::new("ffmpegthumbnailer", "exiftool");

        let read = builder.read_orientation("a.jpg");
        assert_eq!(read.args, vec!["-s3", "-n", "-Orientation", "a.jpg"]);

        let write = builder.write_orientation("a.jpg.jpg", 6);
        assert_eq!(
            write.args,
            vec!["-overwrite_original", "-n", "-Orientation=6", "a.jpg.jpg"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_captures_stdout() {
        let output = ToolCommand::new("sh", "echo")
            .args(["-c", "echo 6"])
            .execute()
            .await
            .unwrap();
        assert_eq!(output.stdout.trim(), "6");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_surfaces_stderr_on_failure() {
        let err = ToolCommand::new("sh", "Thumbnail extraction")
            .args(["-c", "echo 'Error: unsupported codec' >&2; exit 3"])
            .execute()
            .await
            .unwrap_err();

        match err {
            ThumbnailerError::Tool { tool, detail } => {
                assert_eq!(tool, "Thumbnail extraction");
                assert!(detail.contains("unsupported codec"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_execute_missing_binary() {
        let result = ToolCommand::new("/nonexistent/ffmpegthumbnailer", "Thumbnail extraction")
            .execute()
            .await;
        assert!(matches!(result, Err(ThumbnailerError::Tool { .. })));
    }
}
