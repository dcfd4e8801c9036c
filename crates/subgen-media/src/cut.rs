//! Chunk cutting: slices a `[start, start+duration)` time range of a video
//! into its own re-encoded file.

use std::path::Path;
use std::process::Stdio;

use tokio::fs;
use tokio::process::Command;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Cut `[start_sec, start_sec + duration_sec)` of `input` into `out_path`.
///
/// Re-encodes for frame-accurate boundaries (`-avoid_negative_ts
/// make_zero` re-origins timestamps at zero), matching the original
/// chunker's ffmpeg invocation. On any failure `out_path` is removed
/// before the error is returned, so callers never observe a partial file.
pub async fn cut(
    input: impl AsRef<Path>,
    start_sec: f64,
    duration_sec: f64,
    out_path: impl AsRef<Path>,
) -> MediaResult<()> {
    let input = input.as_ref();
    let out_path = out_path.as_ref();

    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

    let args = [
        "-y".to_string(),
        "-v".to_string(),
        "error".to_string(),
        "-ss".to_string(),
        format!("{:.3}", start_sec),
        "-i".to_string(),
        input.to_string_lossy().to_string(),
        "-t".to_string(),
        format!("{:.3}", duration_sec),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "fast".to_string(),
        "-b:v".to_string(),
        "1000k".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "128k".to_string(),
        "-avoid_negative_ts".to_string(),
        "make_zero".to_string(),
        "-movflags".to_string(),
        "faststart".to_string(),
        out_path.to_string_lossy().to_string(),
    ];

    debug!(?input, start_sec, duration_sec, "cutting chunk");

    let output = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        let _ = fs::remove_file(out_path).await;
        return Err(MediaError::ffmpeg_failed(
            "ffmpeg cut failed",
            Some(String::from_utf8_lossy(&output.stderr).to_string()),
            output.status.code(),
        ));
    }

    match fs::metadata(out_path).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        _ => {
            let _ = fs::remove_file(out_path).await;
            Err(MediaError::ffmpeg_failed(
                "ffmpeg reported success but produced no output",
                None,
                output.status.code(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_ffmpeg_or_input_does_not_panic() {
        let result = cut("/nonexistent/input.mp4", 0.0, 10.0, "/tmp/subgen-test-chunk.mp4").await;
        assert!(result.is_err());
    }
}
