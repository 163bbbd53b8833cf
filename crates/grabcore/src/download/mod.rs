//! Video download through yt-dlp
//!
//! Only URL handling and the yt-dlp invocation live here; quota checks are
//! the caller's job (see [`crate::quota::EntitlementService::run_gated`]).

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use url::Url;

use crate::conversion::{run_tool, temp_output_path, ConversionError, ConversionResult};
use crate::core::config;
use crate::core::{AppError, AppResult};

/// Cached regex for matching URLs
/// Compiled once at startup and reused for all requests
#[allow(clippy::expect_used)]
static URL_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://[^\s]+").expect("Failed to compile URL regex"));

/// First http(s) URL in a message, if it parses
pub fn extract_url(text: &str) -> Option<Url> {
    URL_REGEX
        .find(text)
        .and_then(|m| Url::parse(m.as_str().trim_end_matches(['.', ',', ')', '!'])).ok())
}

/// Returns true if the URL points at YouTube
pub fn is_youtube_url(url: &Url) -> bool {
    url.host_str()
        .map(|host| {
            let host = host.trim_start_matches("www.").trim_start_matches("m.");
            host == "youtube.com" || host.ends_with(".youtube.com") || host == "youtu.be"
        })
        .unwrap_or(false)
}

/// Accept a link for download or explain why not
pub fn validate_download_url(text: &str) -> AppResult<Url> {
    let url = extract_url(text).ok_or_else(|| AppError::Validation("Invalid URL or unsupported platform.".to_string()))?;
    if is_youtube_url(&url) {
        return Err(AppError::Validation("YouTube is not supported.".to_string()));
    }
    Ok(url)
}

fn ytdlp_args(url: &Url, output: &Path, max_bytes: u64) -> Vec<String> {
    vec![
        "--no-playlist".to_string(),
        "--quiet".to_string(),
        "--no-warnings".to_string(),
        "-f".to_string(),
        "bestvideo+bestaudio/best".to_string(),
        "--merge-output-format".to_string(),
        "mp4".to_string(),
        "--max-filesize".to_string(),
        max_bytes.to_string(),
        "-o".to_string(),
        output.display().to_string(),
        url.to_string(),
    ]
}

/// Download a video into TEMP_FILES_DIR and return its path
pub async fn download_video(url: &Url) -> AppResult<PathBuf> {
    let output_path = temp_output_path("video", "mp4");
    let mut cmd = Command::new(config::YTDL_BIN.as_str());
    cmd.args(ytdlp_args(url, &output_path, config::download::MAX_FILE_SIZE_BYTES));

    log::info!("Downloading {} to {}", url, output_path.display());
    let outcome = run_tool(cmd, "yt-dlp", config::download::ytdlp_timeout()).await;
    finish_download(outcome, output_path).await
}

/// Turn a yt-dlp run into the downloaded path, removing leftovers on failure
async fn finish_download(outcome: ConversionResult<Result<(), String>>, output_path: PathBuf) -> AppResult<PathBuf> {
    let result = match outcome {
        Err(err) => Err(AppError::from(err)),
        Ok(Err(stderr)) => Err(ConversionError::OutputFailed(format!("yt-dlp: {}", stderr)).into()),
        // yt-dlp exits 0 when --max-filesize skips the file
        Ok(Ok(())) if !output_path.exists() => Err(AppError::Tool("download failed or file too large".to_string())),
        Ok(Ok(())) => return Ok(output_path),
    };

    let mut partial = output_path.clone().into_os_string();
    partial.push(".part");
    for leftover in [output_path, PathBuf::from(partial)] {
        if tokio::fs::remove_file(&leftover).await.is_ok() {
            log::debug!("Removed partial download {}", leftover.display());
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_url() {
        let url = extract_url("look at this https://www.tiktok.com/@a/video/1, nice").unwrap();
        assert_eq!(url.as_str(), "https://www.tiktok.com/@a/video/1");
        assert!(extract_url("no links here").is_none());
    }

    #[test]
    fn test_youtube_is_rejected() {
        for link in [
            "https://www.youtube.com/watch?v=abc",
            "https://youtu.be/abc",
            "https://m.youtube.com/watch?v=abc",
            "https://music.youtube.com/watch?v=abc",
        ] {
            assert!(matches!(validate_download_url(link), Err(AppError::Validation(_))), "{}", link);
        }
        assert!(validate_download_url("https://x.com/user/status/1").is_ok());
    }

    #[tokio::test]
    async fn test_timed_out_download_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("video.mp4");
        let partial = dir.path().join("video.mp4.part");
        tokio::fs::write(&output, b"half").await.unwrap();
        tokio::fs::write(&partial, b"half").await.unwrap();

        let timed_out = Err(ConversionError::TimedOut {
            tool: "yt-dlp".to_string(),
            secs: 240,
        });
        let err = finish_download(timed_out, output.clone()).await.unwrap_err();
        assert!(matches!(err, AppError::Tool(_)), "{:?}", err);
        assert!(!output.exists());
        assert!(!partial.exists());
    }

    #[tokio::test]
    async fn test_skipped_download_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("video.mp4");
        let err = finish_download(Ok(Ok(())), output).await.unwrap_err();
        assert!(matches!(err, AppError::Tool(_)));
    }

    #[tokio::test]
    async fn test_finished_download_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("video.mp4");
        tokio::fs::write(&output, b"mp4").await.unwrap();
        let path = finish_download(Ok(Ok(())), output.clone()).await.unwrap();
        assert_eq!(path, output);
        assert!(output.exists());
    }

    #[test]
    fn test_ytdlp_args() {
        let url = Url::parse("https://www.instagram.com/reel/xyz/").unwrap();
        let args = ytdlp_args(&url, Path::new("/tmp/out.mp4"), 70 * 1024 * 1024);
        assert!(args.contains(&"bestvideo+bestaudio/best".to_string()));
        assert!(args.contains(&"73400320".to_string()));
        assert_eq!(args.last().unwrap(), "https://www.instagram.com/reel/xyz/");
    }
}
