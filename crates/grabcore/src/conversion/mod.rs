//! Media conversion through external tools
//!
//! Supported conversions:
//! - Video: audio extraction (MP3), short GIF preview
//! - Document: collected photos to PDF (ImageMagick), plain text to PDF (LibreOffice)

pub mod document;
pub mod video;

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

use crate::core::config;
use crate::core::AppError;

/// Errors that can occur during conversion
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    #[error("ImageMagick error: {0}")]
    ImageMagickError(String),

    #[error("LibreOffice error: {0}")]
    LibreOfficeError(String),

    #[error("Input file not found: {0}")]
    InputNotFound(String),

    #[error("Output creation failed: {0}")]
    OutputFailed(String),

    #[error("{tool} did not finish within {secs}s")]
    TimedOut { tool: String, secs: u64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type ConversionResult<T> = Result<T, ConversionError>;

impl From<ConversionError> for AppError {
    fn from(err: ConversionError) -> Self {
        match err {
            ConversionError::InvalidInput(msg) => AppError::Validation(msg),
            other => AppError::Tool(other.to_string()),
        }
    }
}

/// Unique path inside TEMP_FILES_DIR
pub fn temp_output_path(prefix: &str, extension: &str) -> PathBuf {
    let dir = shellexpand::tilde(config::TEMP_FILES_DIR.as_str()).to_string();
    PathBuf::from(dir).join(format!("grab_{}_{}.{}", prefix, uuid::Uuid::new_v4().simple(), extension))
}

pub(crate) fn ensure_input(path: &Path) -> ConversionResult<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(ConversionError::InputNotFound(path.display().to_string()))
    }
}

/// Run a prepared command with a timeout, returning stderr on failure
pub(crate) async fn run_tool(mut cmd: Command, tool: &str, timeout: Duration) -> ConversionResult<Result<(), String>> {
    cmd.kill_on_drop(true);
    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(output) => output?,
        Err(_) => {
            log::error!("{} timed out after {:?}", tool, timeout);
            return Err(ConversionError::TimedOut {
                tool: tool.to_string(),
                secs: timeout.as_secs(),
            });
        }
    };

    if output.status.success() {
        Ok(Ok(()))
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        log::error!("{} failed ({}): {}", tool, output.status, stderr);
        Ok(Err(stderr))
    }
}

/// Check if ffmpeg is available
pub async fn check_ffmpeg() -> bool {
    Command::new(config::FFMPEG_BIN.as_str())
        .arg("-version")
        .output()
        .await
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Check if libreoffice is available
pub async fn check_libreoffice() -> bool {
    Command::new(config::LIBREOFFICE_BIN.as_str())
        .arg("--version")
        .output()
        .await
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_output_paths_are_unique() {
        let a = temp_output_path("gif", "gif");
        let b = temp_output_path("gif", "gif");
        assert_ne!(a, b);
        assert_eq!(a.extension().unwrap(), "gif");
    }

    #[test]
    fn test_conversion_error_maps_to_tool() {
        let err: AppError = ConversionError::FfmpegError("boom".into()).into();
        assert!(matches!(err, AppError::Tool(_)));
        let err: AppError = ConversionError::InvalidInput("no photos".into()).into();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_run_tool_reports_failure() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo oops >&2; exit 3"]);
        let result = run_tool(cmd, "sh", Duration::from_secs(5)).await.unwrap();
        assert_eq!(result, Err("oops".to_string()));
    }

    #[tokio::test]
    async fn test_run_tool_missing_binary_is_io_error() {
        let cmd = Command::new("/definitely/not/a/binary");
        let result = run_tool(cmd, "missing", Duration::from_secs(5)).await;
        assert!(matches!(result, Err(ConversionError::IoError(_))));
    }
}
