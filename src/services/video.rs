//! Render backend boundary: combining stock clips and producing the final
//! rendered video. Treated as opaque by the pipeline core; the default
//! implementation shells out to ffmpeg.

use crate::config::PipelineConfig;
use crate::error::{ClipcastError, Result};
use crate::models::{VideoAspect, VideoConcatMode, VideoTransitionMode};
use crate::utils::TempSession;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Inputs for one combine pass.
#[derive(Debug, Clone)]
pub struct CombineRequest {
    pub video_paths: Vec<PathBuf>,
    pub audio_file: PathBuf,
    pub aspect: VideoAspect,
    pub concat_mode: VideoConcatMode,
    pub transition_mode: VideoTransitionMode,
    /// Maximum duration of one clip, in seconds.
    pub max_clip_duration: u32,
    pub threads: u32,
}

/// Inputs for the final render pass.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub combined_video: PathBuf,
    pub audio_file: PathBuf,
    pub subtitle_file: Option<PathBuf>,
    pub threads: u32,
}

/// Video compositing collaborator: one combined video, then one final
/// rendered video per requested output.
#[async_trait]
pub trait RenderBackend: Send + Sync {
    async fn combine(&self, request: &CombineRequest, output: &Path) -> Result<()>;
    async fn render(&self, request: &RenderRequest, output: &Path) -> Result<()>;
}

/// Default ffmpeg-based backend. Cuts and transitions are intentionally
/// plain: clips are trimmed to the maximum clip duration, scaled to the
/// target resolution and concatenated in request order.
pub struct FfmpegRenderBackend {
    config: PipelineConfig,
}

impl FfmpegRenderBackend {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    async fn run_ffmpeg(&self, args: Vec<String>) -> Result<()> {
        let status = Command::new(&self.config.ffmpeg_path)
            .arg("-y")
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| {
                ClipcastError::ToolUnavailable(format!("{}: {}", self.config.ffmpeg_path, e))
            })?;
        if !status.success() {
            return Err(ClipcastError::Render(format!(
                "ffmpeg exited with status: {}",
                status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RenderBackend for FfmpegRenderBackend {
    async fn combine(&self, request: &CombineRequest, output: &Path) -> Result<()> {
        if request.video_paths.is_empty() {
            return Err(ClipcastError::EmptyInput("no video clips to combine".to_string()));
        }

        let work_dir = output
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(format!("render_{}", uuid::Uuid::new_v4()));
        let mut session = TempSession::new(work_dir, self.config.cleanup_temp_files)?;

        let (width, height) = request.aspect.to_resolution();
        let scale = format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2",
            w = width,
            h = height
        );

        // Normalize each clip before the stream concat.
        let mut normalized = Vec::new();
        for (i, clip) in request.video_paths.iter().enumerate() {
            let out = session.temp_path(&format!("clip_{}", i), "mp4");
            self.run_ffmpeg(vec![
                "-i".to_string(),
                clip.to_string_lossy().to_string(),
                "-t".to_string(),
                request.max_clip_duration.to_string(),
                "-vf".to_string(),
                scale.clone(),
                "-an".to_string(),
                "-threads".to_string(),
                request.threads.to_string(),
                out.to_string_lossy().to_string(),
            ])
            .await?;
            normalized.push(out);
        }

        let list_path = session.temp_path("combine_concat", "txt");
        let list = normalized
            .iter()
            .map(|p| format!("file '{}'\n", p.display()))
            .collect::<String>();
        std::fs::write(&list_path, list)?;

        self.run_ffmpeg(vec![
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            list_path.to_string_lossy().to_string(),
            "-c".to_string(),
            "copy".to_string(),
            output.to_string_lossy().to_string(),
        ])
        .await?;
        log::info!("combined {} clips into {}", normalized.len(), output.display());
        Ok(())
    }

    async fn render(&self, request: &RenderRequest, output: &Path) -> Result<()> {
        let mut args = vec![
            "-i".to_string(),
            request.combined_video.to_string_lossy().to_string(),
            "-i".to_string(),
            request.audio_file.to_string_lossy().to_string(),
        ];
        if let Some(subtitle) = &request.subtitle_file {
            args.push("-vf".to_string());
            args.push(format!("subtitles='{}'", subtitle.display()));
        }
        args.extend([
            "-map".to_string(),
            "0:v:0".to_string(),
            "-map".to_string(),
            "1:a:0".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-shortest".to_string(),
            "-threads".to_string(),
            request.threads.to_string(),
            output.to_string_lossy().to_string(),
        ]);
        self.run_ffmpeg(args).await?;
        log::info!("rendered final video {}", output.display());
        Ok(())
    }
}
