//! Render plan compilation.
//!
//! A timeline becomes one FFmpeg invocation: every clip placement gets a
//! video and an audio trim whose timestamps restart at zero, all trimmed
//! streams are concatenated, and user filters run as a final video stage.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use cstudio_models::render::{
    DEFAULT_AUDIO_BITRATE_KBPS, DEFAULT_AUDIO_CODEC, DEFAULT_OUTPUT_FORMAT, DEFAULT_PRESET,
    DEFAULT_VIDEO_CODEC,
};
use cstudio_models::{Clip, ClipId, RenderOptions, Timeline, TimelineEvent};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};

/// Container name and the muxer it maps to.
const FORMATS: &[(&str, &str)] = &[
    ("mp4", "mp4"),
    ("mov", "mov"),
    ("mkv", "matroska"),
    ("avi", "avi"),
];

/// A fully resolved encoding instruction set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderPlan {
    /// Source files in `-i` order
    pub inputs: Vec<PathBuf>,
    /// `-filter_complex` expression
    pub filter_graph: String,
    /// Labels mapped into the output, video first
    pub maps: Vec<String>,
    /// Codec, rate-control, geometry and audio flags
    pub encoder_args: Vec<String>,
    /// Muxer name passed to `-f`
    pub muxer: String,
    /// File extension of the output
    pub extension: String,
    /// Sum of placed clip durations (seconds)
    pub total_duration: f64,
}

impl RenderPlan {
    /// Build the encoder command writing to `output`.
    pub fn to_command(&self, output: impl AsRef<Path>) -> FfmpegCommand {
        let mut cmd = FfmpegCommand::new(output);
        for input in &self.inputs {
            cmd = cmd.input(input);
        }
        cmd = cmd.filter_complex(&self.filter_graph);
        for label in &self.maps {
            cmd = cmd.map(label);
        }
        cmd.output_args(self.encoder_args.iter().cloned())
            .output_arg("-f")
            .output_arg(&self.muxer)
    }

    /// `<stem>.<extension>`
    pub fn output_file_name(&self, stem: &str) -> String {
        format!("{}.{}", stem, self.extension)
    }
}

/// Compiles timelines into render plans.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanCompiler;

impl PlanCompiler {
    pub fn new() -> Self {
        Self
    }

    /// Compile a timeline against the clips it references.
    pub fn compile(
        &self,
        timeline: &Timeline,
        clips: &[Clip],
        options: &RenderOptions,
    ) -> MediaResult<RenderPlan> {
        options
            .validate()
            .map_err(|e| MediaError::invalid_options(e.to_string()))?;
        let (muxer, extension) = resolve_format(options.output_format.as_deref())?;

        let sources: HashMap<ClipId, &Clip> = clips.iter().map(|c| (c.id, c)).collect();
        let placements = clip_placements(timeline)?;
        if placements.is_empty() {
            return Err(MediaError::EmptyTimeline);
        }

        // One input per distinct clip, in first-use order
        let mut inputs: Vec<PathBuf> = Vec::new();
        let mut input_index: HashMap<ClipId, usize> = HashMap::new();
        for placement in &placements {
            if input_index.contains_key(&placement.clip_id) {
                continue;
            }
            let clip = sources
                .get(&placement.clip_id)
                .ok_or(MediaError::MissingSource(placement.clip_id))?;
            input_index.insert(placement.clip_id, inputs.len());
            inputs.push(clip.file_path.clone());
        }

        let mut chains: Vec<String> = Vec::with_capacity(placements.len() * 2 + 2);
        for (i, placement) in placements.iter().enumerate() {
            let input = input_index[&placement.clip_id];
            chains.push(format!(
                "[{input}:v]trim=start={start:.3}:duration={dur:.3},setpts=PTS-STARTPTS[v{i}]",
                start = placement.source_start,
                dur = placement.duration,
            ));
            chains.push(format!(
                "[{input}:a]atrim=start={start:.3}:duration={dur:.3},asetpts=PTS-STARTPTS[a{i}]",
                start = placement.source_start,
                dur = placement.duration,
            ));
        }

        let (mut video_label, audio_label) = if placements.len() > 1 {
            let pads: String = (0..placements.len())
                .map(|i| format!("[v{i}][a{i}]"))
                .collect();
            chains.push(format!(
                "{pads}concat=n={}:v=1:a=1[outv][outa]",
                placements.len()
            ));
            ("outv".to_string(), "outa".to_string())
        } else {
            ("v0".to_string(), "a0".to_string())
        };

        if !options.filters.is_empty() {
            let stage: Vec<String> = options.filters.iter().map(|f| f.to_filter_string()).collect();
            chains.push(format!("[{video_label}]{}[vout]", stage.join(",")));
            video_label = "vout".to_string();
        }

        Ok(RenderPlan {
            inputs,
            filter_graph: chains.join(";"),
            maps: vec![format!("[{video_label}]"), format!("[{audio_label}]")],
            encoder_args: encoder_args(options),
            muxer: muxer.to_string(),
            extension: extension.to_string(),
            total_duration: placements.iter().map(|p| p.duration).sum(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Placement {
    clip_id: ClipId,
    source_start: f64,
    duration: f64,
}

/// Trim durations are written with millisecond precision; anything shorter
/// than half a millisecond would become `duration=0.000`.
const MIN_TRIM_SECS: f64 = 0.0005;

fn clip_placements(timeline: &Timeline) -> MediaResult<Vec<Placement>> {
    let mut placements = Vec::new();
    for event in &timeline.events {
        if let TimelineEvent::Clip {
            clip_id,
            duration,
            source_start,
            ..
        } = event
        {
            if !duration.is_finite() || *duration < MIN_TRIM_SECS {
                return Err(MediaError::invalid_segment(format!(
                    "clip {} has degenerate duration {}",
                    clip_id, duration
                )));
            }
            if !source_start.is_finite() || *source_start < 0.0 {
                return Err(MediaError::invalid_segment(format!(
                    "clip {} has invalid start offset {}",
                    clip_id, source_start
                )));
            }
            placements.push(Placement {
                clip_id: *clip_id,
                source_start: *source_start,
                duration: *duration,
            });
        }
    }
    Ok(placements)
}

fn resolve_format(requested: Option<&str>) -> MediaResult<(&'static str, &'static str)> {
    let name = requested
        .map(|f| f.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| DEFAULT_OUTPUT_FORMAT.to_string());

    FORMATS
        .iter()
        .find(|(ext, _)| *ext == name)
        .map(|(ext, muxer)| (*muxer, *ext))
        .ok_or(MediaError::UnsupportedFormat(name))
}

/// Encoder flags in fixed order: codec, preset, CRF, size, rate, video
/// bitrate, audio codec, audio bitrate.
fn encoder_args(options: &RenderOptions) -> Vec<String> {
    let mut args = vec![
        "-c:v".to_string(),
        DEFAULT_VIDEO_CODEC.to_string(),
        "-preset".to_string(),
        options
            .preset
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_PRESET)
            .to_string(),
        "-crf".to_string(),
        options.resolved_crf().to_string(),
    ];

    if let (Some(w), Some(h)) = (options.width, options.height) {
        if w > 0 && h > 0 {
            args.push("-s".to_string());
            args.push(format!("{}x{}", w, h));
        }
    }

    if let Some(rate) = options.frame_rate.filter(|r| *r > 0.0) {
        args.push("-r".to_string());
        args.push(format!("{:.2}", rate));
    }

    if let Some(bitrate) = options.video_bitrate.filter(|b| *b > 0) {
        args.push("-b:v".to_string());
        args.push(format!("{}k", bitrate));
    }

    args.push("-c:a".to_string());
    args.push(DEFAULT_AUDIO_CODEC.to_string());
    args.push("-b:a".to_string());
    args.push(format!(
        "{}k",
        options
            .audio_bitrate
            .filter(|b| *b > 0)
            .unwrap_or(DEFAULT_AUDIO_BITRATE_KBPS)
    ));

    args
}
