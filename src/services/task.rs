//! Task pipeline orchestrator.
//!
//! Drives the ordered stage sequence script → terms → audio → subtitle →
//! materials → video, persists intermediate artifacts, updates task
//! state/progress after each stage, supports early termination at any named
//! stage, and maps any stage failure to a terminal failed state. Stage
//! functions report failure through their return values; only this module
//! mutates terminal task state.

use crate::config::{PipelineConfig, SubtitleProvider};
use crate::error::{ClipcastError, Result};
use crate::models::{
    ArtifactValue, PipelineStage, Script, ScriptMode, Task, TaskParams, TaskState, VideoConcatMode,
};
use crate::services::audio::AudioAssembler;
use crate::services::llm::ScriptGenerator;
use crate::services::material::{self, MaterialProvider, MaterialRequest};
use crate::services::state::{StateStore, TaskUpdate};
use crate::services::subtitle::{self, SubtitleSynthesizer};
use crate::services::transcription::{self, TranscriptionService};
use crate::services::video::{CombineRequest, RenderBackend, RenderRequest};
use crate::services::voice::{SpeechService, SpeechTiming};
use crate::utils::task_dir;
use std::path::PathBuf;
use std::sync::Arc;

/// The collaborators one pipeline instance drives.
pub struct Collaborators {
    pub script: Box<dyn ScriptGenerator>,
    pub speech: Box<dyn SpeechService>,
    pub transcription: Box<dyn TranscriptionService>,
    pub materials: Box<dyn MaterialProvider>,
    pub render: Box<dyn RenderBackend>,
}

/// Runs one task's stage sequence as a single logical thread of control.
/// Multiple tasks may run concurrently on clones of the shared state store.
pub struct Pipeline {
    config: PipelineConfig,
    state: Arc<StateStore>,
    assembler: AudioAssembler,
    subtitles: SubtitleSynthesizer,
    collaborators: Collaborators,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        state: Arc<StateStore>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            assembler: AudioAssembler::new(config.clone()),
            subtitles: SubtitleSynthesizer::new(config.clone()),
            config,
            state,
            collaborators,
        }
    }

    pub fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    /// Run the pipeline for one task, halting successfully after `stop_at`
    /// (default: run to completion). Re-invoking with the same task id
    /// overwrites previous artifacts.
    pub async fn start(
        &self,
        task_id: &str,
        params: &TaskParams,
        stop_at: Option<PipelineStage>,
    ) -> Result<Task> {
        let stop_at = stop_at.unwrap_or(PipelineStage::Video);
        log::info!("start task {}, stop_at: {}", task_id, stop_at.as_str());
        params.validate().map_err(|e| self.fail(task_id, e))?;

        self.state.create_task(task_id);
        self.state.update(
            task_id,
            TaskUpdate::state(TaskState::Processing)
                .stage(PipelineStage::Script)
                .progress(5),
        );

        // 1. Script
        let script = self
            .generate_script(params)
            .await
            .map_err(|e| self.fail(task_id, e))?;
        self.state.update(
            task_id,
            TaskUpdate::default()
                .progress(10)
                .artifact("script", ArtifactValue::Script(script.clone())),
        );
        if stop_at == PipelineStage::Script {
            return Ok(self.complete(task_id));
        }

        // 2. Terms. Skipped entirely for local material sources: no search
        // keywords are needed.
        self.state
            .update(task_id, TaskUpdate::default().stage(PipelineStage::Terms));
        let terms = if params.video_source.is_local() {
            Vec::new()
        } else {
            self.generate_terms(params, &script)
                .await
                .map_err(|e| self.fail(task_id, e))?
        };
        self.save_script_data(task_id, &script, &terms, params)
            .map_err(|e| self.fail(task_id, e))?;
        self.state.update(
            task_id,
            TaskUpdate::default()
                .progress(20)
                .artifact("terms", ArtifactValue::List(terms.clone())),
        );
        if stop_at == PipelineStage::Terms {
            return Ok(self.complete(task_id));
        }

        // 3. Audio
        self.state
            .update(task_id, TaskUpdate::default().stage(PipelineStage::Audio));
        let (audio_file, audio_duration, timing) = self
            .generate_audio(task_id, params, &script)
            .await
            .map_err(|e| self.fail(task_id, e))?;
        self.state.update(
            task_id,
            TaskUpdate::default()
                .progress(30)
                .artifact(
                    "audio_file",
                    ArtifactValue::Text(audio_file.to_string_lossy().to_string()),
                )
                .artifact("audio_duration", ArtifactValue::Number(audio_duration)),
        );
        if stop_at == PipelineStage::Audio {
            return Ok(self.complete(task_id));
        }

        // 4. Subtitle. Never fails the task: an invalid subtitle file is
        // discarded and rendering proceeds without captions.
        self.state
            .update(task_id, TaskUpdate::default().stage(PipelineStage::Subtitle));
        let subtitle_path = self
            .generate_subtitle(task_id, params, &script, timing.as_ref(), &audio_file)
            .await;
        let mut update = TaskUpdate::default().progress(40);
        if let Some(path) = &subtitle_path {
            update = update.artifact(
                "subtitle_path",
                ArtifactValue::Text(path.to_string_lossy().to_string()),
            );
        }
        self.state.update(task_id, update);
        if stop_at == PipelineStage::Subtitle {
            return Ok(self.complete(task_id));
        }

        // 5. Materials
        self.state
            .update(task_id, TaskUpdate::default().stage(PipelineStage::Materials));
        let materials = self
            .get_video_materials(task_id, params, &terms, audio_duration)
            .await
            .map_err(|e| self.fail(task_id, e))?;
        self.state.update(
            task_id,
            TaskUpdate::default().progress(50).artifact(
                "materials",
                ArtifactValue::List(
                    materials
                        .iter()
                        .map(|p| p.to_string_lossy().to_string())
                        .collect(),
                ),
            ),
        );
        if stop_at == PipelineStage::Materials {
            return Ok(self.complete(task_id));
        }

        // 6. Final videos
        self.state
            .update(task_id, TaskUpdate::default().stage(PipelineStage::Video));
        let (videos, combined) = self
            .generate_final_videos(task_id, params, &materials, &audio_file, &subtitle_path)
            .await
            .map_err(|e| self.fail(task_id, e))?;
        self.state.update(
            task_id,
            TaskUpdate::default()
                .artifact(
                    "videos",
                    ArtifactValue::List(
                        videos.iter().map(|p| p.to_string_lossy().to_string()).collect(),
                    ),
                )
                .artifact(
                    "combined_videos",
                    ArtifactValue::List(
                        combined
                            .iter()
                            .map(|p| p.to_string_lossy().to_string())
                            .collect(),
                    ),
                ),
        );

        log::info!("task {} finished, generated {} video(s)", task_id, videos.len());
        Ok(self.complete(task_id))
    }

    /// Mark the task terminally failed, recording the error context.
    fn fail(&self, task_id: &str, error: ClipcastError) -> ClipcastError {
        log::error!("task {} failed: {}", task_id, error);
        self.state.update(
            task_id,
            TaskUpdate::state(TaskState::Failed).error(error.to_string()),
        );
        error
    }

    fn complete(&self, task_id: &str) -> Task {
        self.state
            .update(task_id, TaskUpdate::state(TaskState::Complete).progress(100));
        // The record must exist: complete() is only reached after updates.
        self.state.get(task_id).unwrap_or_else(|| Task::new(task_id))
    }

    async fn generate_script(&self, params: &TaskParams) -> Result<Script> {
        log::info!("## generating script ({} mode)", params.mode.mode_name());
        let script = match &params.mode {
            ScriptMode::Traditional {
                subject,
                script,
                paragraph_number,
                ..
            } => match script.as_deref().filter(|s| !s.trim().is_empty()) {
                Some(text) => Script::Narration(text.to_string()),
                None => Script::Narration(
                    self.collaborators
                        .script
                        .generate_script(subject, &params.language, *paragraph_number)
                        .await?,
                ),
            },
            ScriptMode::Dialogue {
                article_text,
                script,
                speaker_1_voice,
                speaker_2_voice,
            } => match script.as_ref().filter(|turns| !turns.is_empty()) {
                Some(turns) => Script::Dialogue(turns.clone()),
                None => Script::Dialogue(
                    self.collaborators
                        .script
                        .generate_dialogue_script(
                            article_text,
                            &params.language,
                            speaker_1_voice,
                            speaker_2_voice,
                        )
                        .await?,
                ),
            },
        };
        if script.is_empty() {
            return Err(ClipcastError::EmptyInput("generated script is empty".to_string()));
        }
        Ok(script)
    }

    async fn generate_terms(&self, params: &TaskParams, script: &Script) -> Result<Vec<String>> {
        log::info!("## generating search terms");
        if let Some(terms) = params.terms.as_ref().filter(|t| !t.is_empty()) {
            return Ok(terms.clone());
        }
        let terms = match (script, &params.mode) {
            (Script::Dialogue(turns), _) => {
                self.collaborators
                    .script
                    .generate_terms_from_dialogue(turns, 5)
                    .await?
            }
            (Script::Narration(text), ScriptMode::Traditional { subject, .. }) => {
                self.collaborators.script.generate_terms(subject, text, 5).await?
            }
            (Script::Narration(text), _) => {
                self.collaborators.script.generate_terms("", text, 5).await?
            }
        };
        if terms.is_empty() {
            return Err(ClipcastError::EmptyInput("no search terms generated".to_string()));
        }
        Ok(terms)
    }

    /// Persist `script.json` with script/terms/params/mode, overwriting any
    /// previous run for this task id.
    fn save_script_data(
        &self,
        task_id: &str,
        script: &Script,
        terms: &[String],
        params: &TaskParams,
    ) -> Result<()> {
        let dir = task_dir(&self.config.task_root, task_id)?;
        let data = serde_json::json!({
            "script": script,
            "search_terms": terms,
            "params": params,
            "mode": params.mode.mode_name(),
        });
        std::fs::write(dir.join("script.json"), serde_json::to_string_pretty(&data)?)?;
        Ok(())
    }

    async fn generate_audio(
        &self,
        task_id: &str,
        params: &TaskParams,
        script: &Script,
    ) -> Result<(PathBuf, f64, Option<SpeechTiming>)> {
        log::info!("## generating audio");
        let audio_file = task_dir(&self.config.task_root, task_id)?.join("audio.mp3");
        match (script, &params.mode) {
            (Script::Dialogue(turns), _) => {
                let (path, duration) = self
                    .assembler
                    .generate_dialogue_audio(
                        self.collaborators.speech.as_ref(),
                        turns,
                        &audio_file,
                        params.voice_rate,
                        params.voice_volume,
                    )
                    .await?;
                Ok((path, duration, None))
            }
            (Script::Narration(text), ScriptMode::Traditional { voice_name, .. }) => {
                let (path, duration, timing) = self
                    .assembler
                    .generate_narration_audio(
                        self.collaborators.speech.as_ref(),
                        text,
                        voice_name,
                        &audio_file,
                        params.voice_rate,
                        params.voice_volume,
                    )
                    .await?;
                Ok((path, duration, timing))
            }
            (Script::Narration(_), ScriptMode::Dialogue { .. }) => Err(
                ClipcastError::InvalidParams("narration script in dialogue mode".to_string()),
            ),
        }
    }

    /// Derive the subtitle file through the configured strategy and its
    /// fallback chain. Returns `None` when subtitles are disabled or every
    /// strategy produced an invalid file.
    async fn generate_subtitle(
        &self,
        task_id: &str,
        params: &TaskParams,
        script: &Script,
        timing: Option<&SpeechTiming>,
        audio_file: &PathBuf,
    ) -> Option<PathBuf> {
        if !params.subtitle_enabled {
            return None;
        }
        let dir = match task_dir(&self.config.task_root, task_id) {
            Ok(dir) => dir,
            Err(e) => {
                log::error!("cannot create subtitle directory: {}", e);
                return None;
            }
        };
        let subtitle_path = dir.join("subtitle.srt");
        log::info!(
            "## generating subtitle, provider: {:?}",
            self.config.subtitle_provider
        );

        let mut fallback = self.config.subtitle_provider == SubtitleProvider::Transcription;
        if !fallback {
            let captions = match script {
                Script::Dialogue(turns) => self.subtitles.dialogue_captions(turns),
                Script::Narration(text) => timing
                    .map(|t| self.subtitles.captions_from_timing(text, t))
                    .unwrap_or_default(),
            };
            if captions.is_empty() {
                log::warn!("direct subtitle derivation produced no captions, falling back");
                fallback = true;
            } else if let Err(e) = subtitle::write_captions(&subtitle_path, &captions) {
                log::warn!("failed to write subtitle file: {}, falling back", e);
                fallback = true;
            } else if subtitle::file_to_captions(&subtitle_path).is_err() {
                log::warn!("subtitle file failed validation, falling back");
                fallback = true;
            }
        }

        if !fallback {
            return Some(subtitle_path);
        }

        // Transcription-based derivation from the master track, corrected
        // against the source text, then speaker-labeled in dialogue mode.
        let expected = script.flattened_text();
        let mut captions = match transcription::transcribe_to_captions(
            self.collaborators.transcription.as_ref(),
            audio_file,
            &expected,
            &subtitle_path,
        )
        .await
        {
            Ok(captions) => captions,
            Err(e) => {
                log::warn!("transcription-based subtitles failed: {}", e);
                return None;
            }
        };

        if let Script::Dialogue(turns) = script {
            self.subtitles.label_speakers(&mut captions, turns);
            let enhanced_path = dir.join("subtitle_enhanced.srt");
            if subtitle::write_captions(&enhanced_path, &captions).is_ok()
                && subtitle::file_to_captions(&enhanced_path).is_ok()
            {
                return Some(enhanced_path);
            }
            log::warn!("enhanced subtitle invalid, keeping plain transcription");
        }
        Some(subtitle_path)
    }

    async fn get_video_materials(
        &self,
        task_id: &str,
        params: &TaskParams,
        terms: &[String],
        audio_duration: f64,
    ) -> Result<Vec<PathBuf>> {
        if params.video_source.is_local() {
            log::info!("## preprocessing local materials");
            return material::preprocess_local_materials(&params.materials);
        }
        log::info!("## downloading videos from {:?}", params.video_source);
        let request = MaterialRequest {
            terms: terms.to_vec(),
            aspect: params.aspect,
            concat_mode: params.concat_mode,
            required_duration: audio_duration * params.video_count as f64,
            max_clip_duration: params.clip_duration,
            dialogue_mode: params.mode.is_dialogue(),
        };
        let materials = self.collaborators.materials.fetch(task_id, &request).await?;
        if materials.is_empty() {
            return Err(ClipcastError::EmptyInput("no video materials acquired".to_string()));
        }
        Ok(materials)
    }

    async fn generate_final_videos(
        &self,
        task_id: &str,
        params: &TaskParams,
        materials: &[PathBuf],
        audio_file: &PathBuf,
        subtitle_path: &Option<PathBuf>,
    ) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
        let dir = task_dir(&self.config.task_root, task_id)?;
        // Multiple outputs from one clip pool only differ when the cut
        // order is randomized.
        let concat_mode = if params.video_count == 1 {
            params.concat_mode
        } else {
            VideoConcatMode::Random
        };

        let mut videos = Vec::new();
        let mut combined_videos = Vec::new();
        let mut progress = 50.0f64;
        let step = 50.0 / params.video_count as f64 / 2.0;

        for i in 1..=params.video_count {
            let combined_path = dir.join(format!("combined-{}.mp4", i));
            log::info!("## combining video {} => {}", i, combined_path.display());
            self.collaborators
                .render
                .combine(
                    &CombineRequest {
                        video_paths: materials.to_vec(),
                        audio_file: audio_file.clone(),
                        aspect: params.aspect,
                        concat_mode,
                        transition_mode: params.transition_mode,
                        max_clip_duration: params.clip_duration,
                        threads: params.n_threads,
                    },
                    &combined_path,
                )
                .await?;
            progress += step;
            self.state
                .update(task_id, TaskUpdate::default().progress(progress as u8));

            let final_path = dir.join(format!("final-{}.mp4", i));
            log::info!("## rendering video {} => {}", i, final_path.display());
            self.collaborators
                .render
                .render(
                    &RenderRequest {
                        combined_video: combined_path.clone(),
                        audio_file: audio_file.clone(),
                        subtitle_file: subtitle_path.clone(),
                        threads: params.n_threads,
                    },
                    &final_path,
                )
                .await?;
            progress += step;
            self.state
                .update(task_id, TaskUpdate::default().progress(progress as u8));

            combined_videos.push(combined_path);
            videos.push(final_path);
        }
        Ok((videos, combined_videos))
    }
}
