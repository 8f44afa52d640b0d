//! End-to-end pipeline tests with mocked collaborators.

use async_trait::async_trait;
use clipcast::services::llm::ScriptGenerator;
use clipcast::services::material::{MaterialProvider, MaterialRequest};
use clipcast::services::state::StateStore;
use clipcast::services::subtitle;
use clipcast::services::transcription::TranscriptionService;
use clipcast::services::video::{CombineRequest, RenderBackend, RenderRequest};
use clipcast::services::voice::{SpeechService, SpeechTiming, WordBoundary};
use clipcast::{
    ClipcastError, Collaborators, DialogueTurn, Pipeline, PipelineConfig, PipelineStage, Result,
    ScriptMode, TaskParams, TaskState,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct MockScript {
    dialogue_calls: AtomicUsize,
    term_calls: AtomicUsize,
    fail_dialogue: bool,
}

#[async_trait]
impl ScriptGenerator for MockScript {
    async fn generate_script(
        &self,
        _subject: &str,
        _language: &str,
        _paragraph_number: u32,
    ) -> Result<String> {
        Ok("A generated narration script.".to_string())
    }

    async fn generate_dialogue_script(
        &self,
        _article_text: &str,
        _language: &str,
        speaker_1_voice: &str,
        speaker_2_voice: &str,
    ) -> Result<Vec<DialogueTurn>> {
        self.dialogue_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_dialogue {
            return Err(ClipcastError::Provider("model unavailable".to_string()));
        }
        Ok(vec![DialogueTurn {
            speaker_1: "Welcome to the discussion".to_string(),
            speaker_2: String::new(),
            speaker_1_voice: speaker_1_voice.to_string(),
            speaker_2_voice: speaker_2_voice.to_string(),
        }])
    }

    async fn generate_terms(
        &self,
        _subject: &str,
        _script: &str,
        _amount: usize,
    ) -> Result<Vec<String>> {
        self.term_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec!["discussion".to_string()])
    }

    async fn generate_terms_from_dialogue(
        &self,
        _turns: &[DialogueTurn],
        _amount: usize,
    ) -> Result<Vec<String>> {
        self.term_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec!["discussion".to_string()])
    }
}

struct FakeSpeech;

#[async_trait]
impl SpeechService for FakeSpeech {
    async fn synthesize(
        &self,
        text: &str,
        _voice: &str,
        _rate: f32,
        _volume: f32,
        output: &Path,
    ) -> Result<Option<SpeechTiming>> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        fs::write(output, b"audio")?;
        Ok(Some(SpeechTiming {
            words: vec![WordBoundary {
                offset: 0.0,
                duration: 1.0,
                text: text.to_string(),
            }],
        }))
    }
}

#[derive(Default)]
struct MockTranscription {
    calls: AtomicUsize,
}

#[async_trait]
impl TranscriptionService for MockTranscription {
    async fn transcribe(&self, _audio: &Path, _expected: &str, output: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        fs::write(
            output,
            "1\n00:00:00,000 --> 00:00:02,000\nWelcome to the discussion\n\n",
        )?;
        Ok(())
    }
}

#[derive(Default)]
struct MockMaterials {
    calls: AtomicUsize,
}

#[async_trait]
impl MaterialProvider for MockMaterials {
    async fn fetch(&self, _task_id: &str, _request: &MaterialRequest) -> Result<Vec<PathBuf>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![PathBuf::from("clip.mp4")])
    }
}

struct MockRender;

#[async_trait]
impl RenderBackend for MockRender {
    async fn combine(&self, _request: &CombineRequest, output: &Path) -> Result<()> {
        fs::write(output, b"combined")?;
        Ok(())
    }

    async fn render(&self, request: &RenderRequest, output: &Path) -> Result<()> {
        assert!(request.combined_video.exists());
        fs::write(output, b"final")?;
        Ok(())
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn test_config(root: &Path) -> PipelineConfig {
    PipelineConfig {
        task_root: root.to_path_buf(),
        ffmpeg_path: "ffmpeg-definitely-missing".to_string(),
        ffprobe_path: "ffprobe-definitely-missing".to_string(),
        ..PipelineConfig::default()
    }
}

fn dialogue_params(materials_dir: Option<&Path>) -> TaskParams {
    let mut params = TaskParams::new(ScriptMode::Dialogue {
        article_text: "An article about something interesting.".to_string(),
        script: None,
        speaker_1_voice: "voice-a".to_string(),
        speaker_2_voice: "voice-b".to_string(),
    })
    .unwrap();
    if let Some(dir) = materials_dir {
        let clip = dir.join("stock.mp4");
        fs::write(&clip, b"clip").unwrap();
        params.video_source = clipcast::models::VideoSource::Local;
        params.materials = vec![clipcast::models::MaterialInfo {
            provider: "local".to_string(),
            url: clip.to_string_lossy().to_string(),
            duration: 10.0,
        }];
    }
    params
}

fn pipeline(
    root: &Path,
    script: Arc<MockScript>,
    materials: Arc<MockMaterials>,
) -> (Pipeline, Arc<StateStore>) {
    let state = Arc::new(StateStore::new());
    let pipeline = Pipeline::new(
        test_config(root),
        state.clone(),
        Collaborators {
            script: Box::new(SharedScript(script)),
            speech: Box::new(FakeSpeech),
            transcription: Box::new(MockTranscription::default()),
            materials: Box::new(SharedMaterials(materials)),
            render: Box::new(MockRender),
        },
    );
    (pipeline, state)
}

// Wrappers so tests can keep counting handles to boxed collaborators.
struct SharedScript(Arc<MockScript>);

#[async_trait]
impl ScriptGenerator for SharedScript {
    async fn generate_script(&self, s: &str, l: &str, p: u32) -> Result<String> {
        self.0.generate_script(s, l, p).await
    }
    async fn generate_dialogue_script(
        &self,
        a: &str,
        l: &str,
        v1: &str,
        v2: &str,
    ) -> Result<Vec<DialogueTurn>> {
        self.0.generate_dialogue_script(a, l, v1, v2).await
    }
    async fn generate_terms(&self, s: &str, t: &str, n: usize) -> Result<Vec<String>> {
        self.0.generate_terms(s, t, n).await
    }
    async fn generate_terms_from_dialogue(
        &self,
        t: &[DialogueTurn],
        n: usize,
    ) -> Result<Vec<String>> {
        self.0.generate_terms_from_dialogue(t, n).await
    }
}

struct SharedMaterials(Arc<MockMaterials>);

#[async_trait]
impl MaterialProvider for SharedMaterials {
    async fn fetch(&self, task_id: &str, request: &MaterialRequest) -> Result<Vec<PathBuf>> {
        self.0.fetch(task_id, request).await
    }
}

#[tokio::test]
async fn test_stop_at_terms_with_local_source_skips_keyword_extraction() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let script = Arc::new(MockScript::default());
    let materials = Arc::new(MockMaterials::default());
    let (pipeline, state) = pipeline(dir.path(), script.clone(), materials.clone());

    let params = dialogue_params(Some(dir.path()));
    let task = pipeline
        .start("t-terms", &params, Some(PipelineStage::Terms))
        .await
        .unwrap();

    assert_eq!(task.state, TaskState::Complete);
    assert_eq!(task.progress, 100);
    assert_eq!(script.term_calls.load(Ordering::SeqCst), 0);
    assert_eq!(materials.calls.load(Ordering::SeqCst), 0);
    assert!(task.artifacts.contains_key("script"));
    assert!(task.artifacts.contains_key("terms"));
    assert!(!task.artifacts.contains_key("audio_file"));

    // Script data is persisted even when stopping early.
    assert!(dir.path().join("t-terms/script.json").exists());
    assert_eq!(state.get("t-terms").unwrap().state, TaskState::Complete);
}

#[tokio::test]
async fn test_full_pipeline_dialogue_with_local_materials() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let script = Arc::new(MockScript::default());
    let materials = Arc::new(MockMaterials::default());
    let (pipeline, _state) = pipeline(dir.path(), script.clone(), materials.clone());

    let params = dialogue_params(Some(dir.path()));
    let task = pipeline.start("t-full", &params, None).await.unwrap();

    assert_eq!(task.state, TaskState::Complete);
    assert_eq!(task.progress, 100);
    assert_eq!(script.dialogue_calls.load(Ordering::SeqCst), 1);
    // Local materials bypass the stock provider.
    assert_eq!(materials.calls.load(Ordering::SeqCst), 0);

    let task_dir = dir.path().join("t-full");
    assert!(task_dir.join("script.json").exists());
    assert!(task_dir.join("audio.mp3").exists());
    assert!(task_dir.join("combined-1.mp4").exists());
    assert!(task_dir.join("final-1.mp4").exists());

    let captions = subtitle::file_to_captions(&task_dir.join("subtitle.srt")).unwrap();
    assert!(!captions.is_empty());
    assert!(captions[0].text.contains("Welcome to the discussion"));

    assert!(task.artifacts.contains_key("videos"));
    assert!(task.artifacts.contains_key("subtitle_path"));
}

#[tokio::test]
async fn test_remote_source_invokes_term_extraction_and_provider() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let script = Arc::new(MockScript::default());
    let materials = Arc::new(MockMaterials::default());
    let (pipeline, _state) = pipeline(dir.path(), script.clone(), materials.clone());

    let params = dialogue_params(None);
    let task = pipeline
        .start("t-remote", &params, Some(PipelineStage::Materials))
        .await
        .unwrap();

    assert_eq!(task.state, TaskState::Complete);
    assert_eq!(script.term_calls.load(Ordering::SeqCst), 1);
    assert_eq!(materials.calls.load(Ordering::SeqCst), 1);
    assert!(task.artifacts.contains_key("materials"));
    assert!(!task.artifacts.contains_key("videos"));
}

#[tokio::test]
async fn test_script_stage_failure_marks_task_failed() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let script = Arc::new(MockScript {
        fail_dialogue: true,
        ..MockScript::default()
    });
    let materials = Arc::new(MockMaterials::default());
    let (pipeline, state) = pipeline(dir.path(), script, materials);

    let params = dialogue_params(None);
    let result = pipeline.start("t-fail", &params, None).await;
    assert!(result.is_err());

    let task = state.get("t-fail").unwrap();
    assert_eq!(task.state, TaskState::Failed);
    assert!(task.error.as_deref().unwrap_or("").contains("model unavailable"));
}

#[tokio::test]
async fn test_stop_at_audio_returns_partial_artifacts() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let script = Arc::new(MockScript::default());
    let materials = Arc::new(MockMaterials::default());
    let (pipeline, _state) = pipeline(dir.path(), script, materials.clone());

    let params = dialogue_params(Some(dir.path()));
    let task = pipeline
        .start("t-audio", &params, Some(PipelineStage::Audio))
        .await
        .unwrap();

    assert_eq!(task.state, TaskState::Complete);
    assert!(task.artifacts.contains_key("audio_file"));
    assert!(task.artifacts.contains_key("audio_duration"));
    assert!(!task.artifacts.contains_key("subtitle_path"));
    assert!(!task.artifacts.contains_key("materials"));
    assert_eq!(materials.calls.load(Ordering::SeqCst), 0);
    assert!(dir.path().join("t-audio/audio.mp3").exists());
}
