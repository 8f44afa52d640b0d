//! Pipeline configuration.
//!
//! Every tunable the stages consult lives here, including the inter-utterance
//! and inter-turn silence gaps that the audio assembler inserts and the
//! heuristic constants the subtitle aligner uses.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which strategy produces the subtitle file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SubtitleProvider {
    /// Derive captions directly from the script: provider word timings for
    /// narration, estimated timings for dialogue.
    Script,
    /// Transcribe the assembled master audio track.
    Transcription,
}

impl Default for SubtitleProvider {
    fn default() -> Self {
        Self::Script
    }
}

/// Library configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root directory for per-task working directories.
    pub task_root: PathBuf,
    /// Path to the ffmpeg binary.
    pub ffmpeg_path: String,
    /// Path to the ffprobe binary.
    pub ffprobe_path: String,
    /// Silence inserted between the two utterances of one dialogue turn, in
    /// milliseconds.
    pub utterance_gap_ms: u64,
    /// Silence inserted between consecutive dialogue turns, in milliseconds.
    pub turn_gap_ms: u64,
    /// Estimated speaking time per character, in seconds, used when no
    /// provider timing metadata is available.
    pub seconds_per_char: f64,
    /// Minimum duration of an estimated caption, in seconds.
    pub min_caption_seconds: f64,
    /// Pause appended after each estimated caption, in seconds.
    pub caption_pause_seconds: f64,
    /// Minimum word-overlap ratio for the speaker labeling heuristic.
    pub speaker_overlap_threshold: f64,
    /// Subtitle derivation strategy.
    pub subtitle_provider: SubtitleProvider,
    /// Bounded retry count for collaborator calls on transient failure.
    pub max_retries: u32,
    /// Default voice rate multiplier.
    pub voice_rate: f32,
    /// Default voice volume multiplier.
    pub voice_volume: f32,
    /// Remove intermediate assembly files once superseded.
    pub cleanup_temp_files: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            task_root: std::env::temp_dir().join("clipcast"),
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            utterance_gap_ms: 500,
            turn_gap_ms: 1000,
            seconds_per_char: 0.1,
            min_caption_seconds: 2.0,
            caption_pause_seconds: 1.0,
            speaker_overlap_threshold: 0.3,
            subtitle_provider: SubtitleProvider::default(),
            max_retries: 5,
            voice_rate: 1.0,
            voice_volume: 1.0,
            cleanup_temp_files: true,
        }
    }
}

impl PipelineConfig {
    /// Short silence between the two speakers of a turn, in seconds.
    pub fn utterance_gap_secs(&self) -> f64 {
        self.utterance_gap_ms as f64 / 1000.0
    }

    /// Long silence between turns, in seconds.
    pub fn turn_gap_secs(&self) -> f64 {
        self.turn_gap_ms as f64 / 1000.0
    }
}
