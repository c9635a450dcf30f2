//! Thumbnail generation.

use std::path::Path;

use cstudio_models::render::THUMBNAIL_QUALITY;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Single-frame extraction command: `-ss <t> -i <source> -vframes 1 -q:v 2`.
pub fn thumbnail_command(source: &Path, output: &Path, at_seconds: f64) -> FfmpegCommand {
    FfmpegCommand::new(output)
        .input_with_args(["-ss".to_string(), format!("{:.3}", at_seconds)], source)
        .single_frame()
        .output_arg("-q:v")
        .output_arg(THUMBNAIL_QUALITY.to_string())
        .without_progress()
}

/// Extract one frame of `source` at `at_seconds` into `output`.
pub async fn generate_thumbnail(
    runner: &FfmpegRunner,
    source: &Path,
    output: &Path,
    at_seconds: f64,
) -> MediaResult<()> {
    if !at_seconds.is_finite() || at_seconds < 0.0 {
        return Err(MediaError::invalid_options(format!(
            "thumbnail offset must be a non-negative number of seconds, got {}",
            at_seconds
        )));
    }
    if !source.exists() {
        return Err(MediaError::FileNotFound(source.to_path_buf()));
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    runner.run(&thumbnail_command(source, output, at_seconds)).await
}
