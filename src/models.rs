//! Schema types shared across the pipeline.

use crate::config::PipelineConfig;
use crate::error::{ClipcastError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Aspect ratio of the output video.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VideoAspect {
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "1:1")]
    Square,
}

impl Default for VideoAspect {
    fn default() -> Self {
        Self::Portrait
    }
}

impl VideoAspect {
    /// Pixel resolution (width, height) for this aspect ratio.
    pub fn to_resolution(self) -> (u32, u32) {
        match self {
            Self::Landscape => (1920, 1080),
            Self::Portrait => (1080, 1920),
            Self::Square => (1080, 1080),
        }
    }
}

/// How stock clips are ordered when combined.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VideoConcatMode {
    Random,
    Sequential,
}

impl Default for VideoConcatMode {
    fn default() -> Self {
        Self::Random
    }
}

/// Visual transition between combined clips. Interpreted by the render
/// backend; opaque to the pipeline core.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VideoTransitionMode {
    None,
    Shuffle,
    FadeIn,
    FadeOut,
    SlideIn,
    SlideOut,
}

impl Default for VideoTransitionMode {
    fn default() -> Self {
        Self::None
    }
}

/// Where stock material comes from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VideoSource {
    /// Caller-supplied local files; keyword extraction is skipped.
    Local,
    Pexels,
    Pixabay,
}

impl Default for VideoSource {
    fn default() -> Self {
        Self::Pexels
    }
}

impl VideoSource {
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local)
    }
}

/// A single local or downloaded video clip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialInfo {
    pub provider: String,
    pub url: String,
    pub duration: f64,
}

/// One exchange of two speaker utterances in dialogue mode. Immutable once
/// produced by script generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DialogueTurn {
    pub speaker_1: String,
    pub speaker_2: String,
    pub speaker_1_voice: String,
    pub speaker_2_voice: String,
}

/// The active script representation for a task. Exactly one variant per task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Script {
    Narration(String),
    Dialogue(Vec<DialogueTurn>),
}

impl Script {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Narration(text) => text.trim().is_empty(),
            Self::Dialogue(turns) => turns.is_empty(),
        }
    }

    pub fn is_dialogue(&self) -> bool {
        matches!(self, Self::Dialogue(_))
    }

    /// Flatten the script into plain text, one utterance per line. Used as
    /// corroborating context for transcription and subtitle correction.
    pub fn flattened_text(&self) -> String {
        match self {
            Self::Narration(text) => text.clone(),
            Self::Dialogue(turns) => {
                let mut out = String::new();
                for turn in turns {
                    out.push_str(&turn.speaker_1);
                    out.push('\n');
                    out.push_str(&turn.speaker_2);
                    out.push('\n');
                }
                out
            }
        }
    }
}

/// Mode-specific task inputs. The discriminant replaces the scattered
/// presence checks of a loosely-typed parameter record: each variant carries
/// only the fields its mode needs, validated at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ScriptMode {
    /// Single-speaker narration generated from a subject (or supplied
    /// verbatim).
    Traditional {
        subject: String,
        #[serde(default)]
        script: Option<String>,
        #[serde(default = "default_paragraph_number")]
        paragraph_number: u32,
        voice_name: String,
    },
    /// Two-speaker dialogue generated from an article (or supplied as
    /// pre-written turns).
    Dialogue {
        #[serde(default)]
        article_text: String,
        #[serde(default)]
        script: Option<Vec<DialogueTurn>>,
        speaker_1_voice: String,
        speaker_2_voice: String,
    },
}

fn default_paragraph_number() -> u32 {
    1
}

impl ScriptMode {
    pub fn is_dialogue(&self) -> bool {
        matches!(self, Self::Dialogue { .. })
    }

    pub fn mode_name(&self) -> &'static str {
        match self {
            Self::Traditional { .. } => "traditional",
            Self::Dialogue { .. } => "dialogue",
        }
    }
}

/// Parameters for one video generation task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskParams {
    #[serde(flatten)]
    pub mode: ScriptMode,
    #[serde(default)]
    pub language: String,
    /// Optional caller-supplied search terms; skips keyword extraction.
    #[serde(default)]
    pub terms: Option<Vec<String>>,
    #[serde(default)]
    pub video_source: VideoSource,
    /// Local materials, required when `video_source` is local.
    #[serde(default)]
    pub materials: Vec<MaterialInfo>,
    #[serde(default)]
    pub aspect: VideoAspect,
    #[serde(default)]
    pub concat_mode: VideoConcatMode,
    #[serde(default)]
    pub transition_mode: VideoTransitionMode,
    /// Maximum duration of one clip in the combined video, in seconds.
    #[serde(default = "default_clip_duration")]
    pub clip_duration: u32,
    #[serde(default = "default_video_count")]
    pub video_count: u32,
    #[serde(default = "default_rate")]
    pub voice_rate: f32,
    #[serde(default = "default_rate")]
    pub voice_volume: f32,
    #[serde(default = "default_true")]
    pub subtitle_enabled: bool,
    #[serde(default = "default_threads")]
    pub n_threads: u32,
}

fn default_clip_duration() -> u32 {
    5
}

fn default_video_count() -> u32 {
    1
}

fn default_rate() -> f32 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_threads() -> u32 {
    2
}

impl TaskParams {
    /// Create parameters for the given mode, validating mode-specific
    /// required fields up front.
    pub fn new(mode: ScriptMode) -> Result<Self> {
        let params = Self {
            mode,
            language: String::new(),
            terms: None,
            video_source: VideoSource::default(),
            materials: Vec::new(),
            aspect: VideoAspect::default(),
            concat_mode: VideoConcatMode::default(),
            transition_mode: VideoTransitionMode::default(),
            clip_duration: default_clip_duration(),
            video_count: default_video_count(),
            voice_rate: default_rate(),
            voice_volume: default_rate(),
            subtitle_enabled: true,
            n_threads: default_threads(),
        };
        params.validate()?;
        Ok(params)
    }

    /// Like [`TaskParams::new`], but seeding the voice rate/volume defaults
    /// from the pipeline configuration.
    pub fn from_config(mode: ScriptMode, config: &PipelineConfig) -> Result<Self> {
        let mut params = Self::new(mode)?;
        params.voice_rate = config.voice_rate;
        params.voice_volume = config.voice_volume;
        Ok(params)
    }

    /// Check that the mode variant carries enough input to produce a script
    /// and that material settings are coherent.
    pub fn validate(&self) -> Result<()> {
        match &self.mode {
            ScriptMode::Traditional {
                subject,
                script,
                voice_name,
                ..
            } => {
                let has_script = script.as_deref().is_some_and(|s| !s.trim().is_empty());
                if subject.trim().is_empty() && !has_script {
                    return Err(ClipcastError::InvalidParams(
                        "traditional mode requires a subject or a pre-written script".to_string(),
                    ));
                }
                if voice_name.trim().is_empty() {
                    return Err(ClipcastError::InvalidParams(
                        "traditional mode requires a voice name".to_string(),
                    ));
                }
            }
            ScriptMode::Dialogue {
                article_text,
                script,
                speaker_1_voice,
                speaker_2_voice,
            } => {
                let has_script = script.as_ref().is_some_and(|turns| !turns.is_empty());
                if article_text.trim().is_empty() && !has_script {
                    return Err(ClipcastError::InvalidParams(
                        "dialogue mode requires article text or pre-written turns".to_string(),
                    ));
                }
                if speaker_1_voice.trim().is_empty() || speaker_2_voice.trim().is_empty() {
                    return Err(ClipcastError::InvalidParams(
                        "dialogue mode requires a voice per speaker".to_string(),
                    ));
                }
            }
        }
        if self.video_count == 0 {
            return Err(ClipcastError::InvalidParams(
                "video_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Named pipeline checkpoints, in execution order. Also the stage names
/// accepted by the orchestrator's early-stop control.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Script,
    Terms,
    Audio,
    Subtitle,
    Materials,
    Video,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Script => "script",
            Self::Terms => "terms",
            Self::Audio => "audio",
            Self::Subtitle => "subtitle",
            Self::Materials => "materials",
            Self::Video => "video",
        }
    }
}

impl FromStr for PipelineStage {
    type Err = ClipcastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "script" => Ok(Self::Script),
            "terms" => Ok(Self::Terms),
            "audio" => Ok(Self::Audio),
            "subtitle" => Ok(Self::Subtitle),
            "materials" => Ok(Self::Materials),
            "video" => Ok(Self::Video),
            other => Err(ClipcastError::InvalidParams(format!(
                "unknown pipeline stage: {}",
                other
            ))),
        }
    }
}

/// Task lifecycle states. `Complete` and `Failed` are terminal and persist
/// until an external API layer deletes the task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Queued,
    Processing,
    Complete,
    Failed,
}

/// Artifact values a task can accumulate while stages run.
///
/// Untagged so snapshots serialize to plain JSON values. Snapshots are
/// serialize-only: a narration script and a text artifact share the same
/// representation, and the authoritative state is always the store, never a
/// re-parsed snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ArtifactValue {
    Text(String),
    Number(f64),
    List(Vec<String>),
    Script(Script),
}

/// One tracked task. Serialized as a read-only snapshot for callers.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: String,
    pub stage: PipelineStage,
    pub state: TaskState,
    /// Numeric progress, 0-100.
    pub progress: u8,
    /// Named artifacts: script, terms, audio file, subtitle file, material
    /// list, final video paths.
    pub artifacts: HashMap<String, ArtifactValue>,
    /// Last logged error context, set when the task fails.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            stage: PipelineStage::Script,
            state: TaskState::Queued,
            progress: 0,
            artifacts: HashMap::new(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Recommended voice pairings for dialogue mode, (speaker 1, speaker 2).
pub fn recommended_voice_pairs() -> Vec<(&'static str, &'static str)> {
    vec![
        ("zh-CN-XiaoxiaoNeural-Female", "zh-CN-YunxiNeural-Male"),
        ("zh-CN-XiaoyiNeural-Female", "zh-CN-YunyangNeural-Male"),
        ("en-US-AvaMultilingualNeural-Female", "en-US-BrianMultilingualNeural-Male"),
        ("en-US-EmmaMultilingualNeural-Female", "en-US-AndrewMultilingualNeural-Male"),
        ("en-US-JennyNeural-Female", "en-US-GuyNeural-Male"),
        ("en-US-AriaNeural-Female", "en-US-ChristopherNeural-Male"),
    ]
}
