//! Video conversions via ffmpeg

use std::path::{Path, PathBuf};
use tokio::process::Command;

use super::{ensure_input, run_tool, temp_output_path, ConversionError, ConversionResult};
use crate::core::config;

/// Extract audio from video as MP3
///
/// # Arguments
/// * `input_path` - Path to input video file
/// * `bitrate` - Audio bitrate (e.g., "192k")
///
/// # Returns
/// Path to the extracted MP3 file
pub async fn extract_audio<P: AsRef<Path>>(input_path: P, bitrate: &str) -> ConversionResult<PathBuf> {
    let input = input_path.as_ref();
    ensure_input(input)?;

    let output_path = temp_output_path("audio", "mp3");

    let mut cmd = Command::new(config::FFMPEG_BIN.as_str());
    cmd.args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
        .arg(input)
        .args(["-vn", "-acodec", "libmp3lame", "-b:a", bitrate])
        .arg(&output_path);

    run_tool(cmd, "ffmpeg", config::download::conversion_timeout())
        .await?
        .map_err(ConversionError::FfmpegError)?;

    Ok(output_path)
}

/// Options for GIF conversion
#[derive(Debug, Clone, PartialEq)]
pub struct GifOptions {
    /// Seconds taken from the start of the video
    pub duration: u64,
    /// Output width (height keeps the aspect ratio)
    pub width: u32,
    pub fps: u8,
}

impl Default for GifOptions {
    fn default() -> Self {
        Self {
            duration: 10,
            width: 320,
            fps: 10,
        }
    }
}

impl GifOptions {
    fn filter(&self) -> String {
        format!("fps={},scale={}:-1:flags=lanczos", self.fps, self.width)
    }
}

/// Convert the first seconds of a video to a GIF
pub async fn to_gif<P: AsRef<Path>>(input_path: P, options: GifOptions) -> ConversionResult<PathBuf> {
    let input = input_path.as_ref();
    ensure_input(input)?;

    let output_path = temp_output_path("gif", "gif");

    let mut cmd = Command::new(config::FFMPEG_BIN.as_str());
    cmd.args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
        .arg(input)
        .arg("-t")
        .arg(options.duration.to_string())
        .arg("-vf")
        .arg(options.filter())
        .arg(&output_path);

    run_tool(cmd, "ffmpeg", config::download::conversion_timeout())
        .await?
        .map_err(ConversionError::FfmpegError)?;

    Ok(output_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gif_options_default() {
        let opts = GifOptions::default();
        assert_eq!(opts.duration, 10);
        assert_eq!(opts.filter(), "fps=10,scale=320:-1:flags=lanczos");
    }

    #[tokio::test]
    async fn test_missing_input_is_reported() {
        let err = extract_audio("/nonexistent/video.mp4", "192k").await.unwrap_err();
        assert!(matches!(err, ConversionError::InputNotFound(_)));
        let err = to_gif("/nonexistent/video.mp4", GifOptions::default()).await.unwrap_err();
        assert!(matches!(err, ConversionError::InputNotFound(_)));
    }
}
