//! Audio assembly: merging per-speaker segments into turn clips and
//! concatenating all turns into one master narration track.
//!
//! Concatenation goes through the ffmpeg concat demuxer with generated
//! silence clips between inputs. It never fails outright: if ffmpeg is
//! missing or errors, the first valid input is passed through unmodified.
//! The only hard failure is a completely empty input list.

use crate::config::PipelineConfig;
use crate::error::{ClipcastError, Result};
use crate::models::DialogueTurn;
use crate::services::voice::{synthesize_segment, AudioSegment, SpeechService, SpeechTiming};
use crate::utils::TempSession;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tokio::process::Command;

/// A concatenation of audio segments plus inserted silence, representing one
/// dialogue turn or the whole narration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedTrack {
    pub path: PathBuf,
}

impl MergedTrack {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Stitches independently synthesized speech segments into one timed track.
pub struct AudioAssembler {
    config: PipelineConfig,
}

impl AudioAssembler {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Merge the two speaker segments of one turn, with the short utterance
    /// gap between them. One-sided turns collapse to the surviving side;
    /// both sides missing yields `None`.
    pub async fn merge_turn(
        &self,
        session: &mut TempSession,
        speaker_1: Option<AudioSegment>,
        speaker_2: Option<AudioSegment>,
    ) -> Result<Option<MergedTrack>> {
        let inputs: Vec<PathBuf> = [speaker_1, speaker_2]
            .into_iter()
            .flatten()
            .map(|segment| segment.path)
            .filter(|path| path.exists())
            .collect();

        let Some(first) = inputs.first().cloned() else {
            return Ok(None);
        };
        if inputs.len() == 1 {
            return Ok(Some(MergedTrack::new(first)));
        }

        let gap = self.config.utterance_gap_secs();
        match self.concat_with_gap(session, &inputs, gap, "turn").await {
            Ok(path) => Ok(Some(MergedTrack::new(path))),
            Err(e) => {
                log::warn!("turn merge failed ({}), keeping first segment", e);
                Ok(Some(MergedTrack::new(first)))
            }
        }
    }

    /// Concatenate all turn tracks into the master track with the long
    /// inter-turn gap between them, preserving order.
    ///
    /// A single-element input is returned unchanged (no re-encoding). An
    /// empty input list is the only hard failure.
    pub async fn concatenate_all(
        &self,
        session: &mut TempSession,
        tracks: &[MergedTrack],
    ) -> Result<MergedTrack> {
        let valid: Vec<PathBuf> = tracks
            .iter()
            .map(|track| track.path.clone())
            .filter(|path| path.exists())
            .collect();

        let Some(first) = valid.first().cloned() else {
            return Err(ClipcastError::EmptyInput(
                "no valid audio tracks to concatenate".to_string(),
            ));
        };
        if valid.len() == 1 {
            return Ok(MergedTrack::new(first));
        }

        let gap = self.config.turn_gap_secs();
        match self.concat_with_gap(session, &valid, gap, "master").await {
            Ok(path) => {
                log::info!("concatenated {} tracks into {}", valid.len(), path.display());
                Ok(MergedTrack::new(path))
            }
            Err(e) => {
                log::warn!("track concatenation failed ({}), keeping first track", e);
                Ok(MergedTrack::new(first))
            }
        }
    }

    /// Authoritative duration measurement in seconds: ffprobe first, a
    /// symphonia decode second, and 0.0 with a logged warning as the last
    /// resort. Never a fabricated nonzero value.
    pub async fn measure_duration(&self, path: &Path) -> f64 {
        if !path.exists() {
            log::warn!("cannot measure duration, file missing: {}", path.display());
            return 0.0;
        }

        match self.ffprobe_duration(path).await {
            Ok(duration) => return duration,
            Err(e) => log::debug!("ffprobe measurement failed for {}: {}", path.display(), e),
        }

        match decode_duration(path) {
            Ok(duration) => duration,
            Err(e) => {
                log::warn!("unable to measure audio duration of {}: {}", path.display(), e);
                0.0
            }
        }
    }

    /// Synthesize and assemble a full dialogue: per-speaker segments, turn
    /// clips, then the master narration track copied to `output`.
    ///
    /// Every intermediate file lives in a scoped session that removes it on
    /// all exit paths, including failure.
    pub async fn generate_dialogue_audio(
        &self,
        speech: &dyn SpeechService,
        turns: &[DialogueTurn],
        output: &Path,
        voice_rate: f32,
        voice_volume: f32,
    ) -> Result<(PathBuf, f64)> {
        if turns.is_empty() {
            return Err(ClipcastError::EmptyInput("dialogue script is empty".to_string()));
        }
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }

        log::info!("generating dialogue audio, {} turns", turns.len());
        let work_dir = output
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(format!("assembly_{}", uuid::Uuid::new_v4()));
        let mut session = TempSession::new(work_dir, self.config.cleanup_temp_files)?;

        let mut turn_tracks = Vec::new();
        for (i, turn) in turns.iter().enumerate() {
            log::info!("synthesizing dialogue turn {}/{}", i + 1, turns.len());
            let path_1 = session.temp_path(&format!("speaker1_{}", i), "mp3");
            let path_2 = session.temp_path(&format!("speaker2_{}", i), "mp3");

            let (segment_1, segment_2) = futures::future::join(
                synthesize_segment(
                    speech,
                    &turn.speaker_1,
                    &turn.speaker_1_voice,
                    voice_rate,
                    voice_volume,
                    path_1,
                ),
                synthesize_segment(
                    speech,
                    &turn.speaker_2,
                    &turn.speaker_2_voice,
                    voice_rate,
                    voice_volume,
                    path_2,
                ),
            )
            .await;

            if let Some(track) = self.merge_turn(&mut session, segment_1, segment_2).await? {
                turn_tracks.push(track);
            } else {
                log::warn!("turn {} produced no audio, skipping", i + 1);
            }
        }

        let master = self.concatenate_all(&mut session, &turn_tracks).await?;
        fs::copy(&master.path, output)?;

        let duration = self.measure_duration(output).await;
        log::info!(
            "dialogue audio complete: {} ({:.2}s)",
            output.display(),
            duration
        );
        Ok((output.to_path_buf(), duration))
    }

    /// Synthesize a single-speaker narration directly to `output`, returning
    /// the provider timing metadata for direct subtitle derivation.
    pub async fn generate_narration_audio(
        &self,
        speech: &dyn SpeechService,
        text: &str,
        voice: &str,
        output: &Path,
        voice_rate: f32,
        voice_volume: f32,
    ) -> Result<(PathBuf, f64, Option<SpeechTiming>)> {
        if text.trim().is_empty() {
            return Err(ClipcastError::EmptyInput("narration script is empty".to_string()));
        }
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }

        let timing = speech
            .synthesize(text, voice, voice_rate, voice_volume, output)
            .await?
            .ok_or_else(|| {
                ClipcastError::SpeechSynthesis("provider produced no narration artifact".to_string())
            })?;
        if !output.exists() {
            return Err(ClipcastError::SpeechSynthesis(format!(
                "narration file was not written: {}",
                output.display()
            )));
        }

        let duration = match timing.total_duration() {
            d if d > 0.0 => d,
            _ => self.measure_duration(output).await,
        };
        let timing = if timing.is_empty() { None } else { Some(timing) };
        Ok((output.to_path_buf(), duration, timing))
    }

    /// Concatenate `inputs` in order, inserting a generated silence clip of
    /// `gap` seconds between consecutive entries.
    async fn concat_with_gap(
        &self,
        session: &mut TempSession,
        inputs: &[PathBuf],
        gap: f64,
        prefix: &str,
    ) -> Result<PathBuf> {
        let silence = self.create_silence(session, gap).await?;

        let list_path = session.temp_path(&format!("{}_concat", prefix), "txt");
        let mut list = String::new();
        for (i, input) in inputs.iter().enumerate() {
            if i > 0 {
                list.push_str(&format!("file '{}'\n", silence.display()));
            }
            list.push_str(&format!("file '{}'\n", input.display()));
        }
        fs::write(&list_path, list)?;

        let output = session.temp_path(prefix, "mp3");
        let status = Command::new(&self.config.ffmpeg_path)
            .arg("-y")
            .args(["-f", "concat", "-safe", "0", "-i"])
            .arg(&list_path)
            .args(["-c", "copy"])
            .arg(&output)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| {
                ClipcastError::ToolUnavailable(format!(
                    "{}: {}",
                    self.config.ffmpeg_path, e
                ))
            })?;

        if !status.success() {
            return Err(ClipcastError::AudioProcessing(format!(
                "ffmpeg concat failed with status: {}",
                status
            )));
        }
        Ok(output)
    }

    /// Generate a silence clip of the given length, encoded to match the
    /// concatenated mp3 segments.
    async fn create_silence(&self, session: &mut TempSession, seconds: f64) -> Result<PathBuf> {
        let output = session.temp_path("silence", "mp3");
        let duration = format!("{:.3}", seconds);
        let status = Command::new(&self.config.ffmpeg_path)
            .arg("-y")
            .args(["-f", "lavfi", "-i", "anullsrc=r=44100:cl=mono", "-t"])
            .arg(&duration)
            .args(["-acodec", "libmp3lame", "-q:a", "9"])
            .arg(&output)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| {
                ClipcastError::ToolUnavailable(format!(
                    "{}: {}",
                    self.config.ffmpeg_path, e
                ))
            })?;

        if !status.success() {
            return Err(ClipcastError::AudioProcessing(format!(
                "silence generation failed with status: {}",
                status
            )));
        }
        Ok(output)
    }

    async fn ffprobe_duration(&self, path: &Path) -> Result<f64> {
        let output = Command::new(&self.config.ffprobe_path)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|e| {
                ClipcastError::ToolUnavailable(format!(
                    "{}: {}",
                    self.config.ffprobe_path, e
                ))
            })?;

        if !output.status.success() {
            return Err(ClipcastError::AudioProcessing(format!(
                "ffprobe failed with status: {}",
                output.status
            )));
        }

        let duration_str = String::from_utf8_lossy(&output.stdout);
        duration_str.trim().parse::<f64>().map_err(|_| {
            ClipcastError::AudioProcessing(format!(
                "failed to parse ffprobe duration: {}",
                duration_str
            ))
        })
    }
}

/// Decode-based duration measurement via symphonia, used when ffprobe is
/// unavailable.
fn decode_duration(path: &Path) -> Result<f64> {
    let file = std::fs::File::open(path)?;
    let stream = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| ClipcastError::AudioProcessing(format!("unrecognized audio format: {}", e)))?;

    let mut format = probed.format;
    let (track_id, n_frames, sample_rate, time_base) = {
        let track = format.default_track().ok_or_else(|| {
            ClipcastError::AudioProcessing("no default audio track".to_string())
        })?;
        (
            track.id,
            track.codec_params.n_frames,
            track.codec_params.sample_rate,
            track.codec_params.time_base,
        )
    };

    if let (Some(frames), Some(rate)) = (n_frames, sample_rate) {
        return Ok(frames as f64 / rate as f64);
    }

    // Containers without a frame count: walk the packets.
    let time_base = time_base.ok_or_else(|| {
        ClipcastError::AudioProcessing("track carries no time base".to_string())
    })?;
    let mut end_ts = 0u64;
    while let Ok(packet) = format.next_packet() {
        if packet.track_id() == track_id {
            end_ts = end_ts.max(packet.ts() + packet.dur());
        }
    }
    let time = time_base.calc_time(end_ts);
    Ok(time.seconds as f64 + time.frac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::voice::WordBoundary;
    use async_trait::async_trait;

    fn unavailable_tools_config(root: &Path) -> PipelineConfig {
        PipelineConfig {
            task_root: root.to_path_buf(),
            ffmpeg_path: "ffmpeg-definitely-missing".to_string(),
            ffprobe_path: "ffprobe-definitely-missing".to_string(),
            ..PipelineConfig::default()
        }
    }

    fn fake_audio(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"fake mp3 payload").unwrap();
        path
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

    #[tokio::test]
    async fn test_concatenate_all_empty_signals_empty_input() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = AudioAssembler::new(unavailable_tools_config(dir.path()));
        let mut session = TempSession::new(dir.path().join("work"), true).unwrap();

        let result = assembler.concatenate_all(&mut session, &[]).await;
        assert!(matches!(result, Err(ClipcastError::EmptyInput(_))));
    }

    #[tokio::test]
    async fn test_concatenate_all_single_element_identity() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = AudioAssembler::new(unavailable_tools_config(dir.path()));
        let mut session = TempSession::new(dir.path().join("work"), true).unwrap();

        let input = fake_audio(dir.path(), "only.mp3");
        let track = MergedTrack::new(&input);
        let result = assembler
            .concatenate_all(&mut session, std::slice::from_ref(&track))
            .await
            .unwrap();
        assert_eq!(result, track);
    }

    #[tokio::test]
    async fn test_concatenate_all_falls_back_to_first_input_without_ffmpeg() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = AudioAssembler::new(unavailable_tools_config(dir.path()));
        let mut session = TempSession::new(dir.path().join("work"), true).unwrap();

        let tracks: Vec<MergedTrack> = (0..3)
            .map(|i| MergedTrack::new(fake_audio(dir.path(), &format!("t{}.mp3", i))))
            .collect();
        let payload = fs::read(&tracks[0].path).unwrap();

        let result = assembler.concatenate_all(&mut session, &tracks).await.unwrap();
        assert_eq!(result.path, tracks[0].path);
        assert_eq!(fs::read(&result.path).unwrap(), payload);
    }

    #[tokio::test]
    async fn test_merge_turn_one_sided() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = AudioAssembler::new(unavailable_tools_config(dir.path()));
        let mut session = TempSession::new(dir.path().join("work"), true).unwrap();

        let path = fake_audio(dir.path(), "speaker2.mp3");
        let segment = AudioSegment {
            path: path.clone(),
            text: "hello".to_string(),
            voice: "v".to_string(),
            timing: None,
        };

        let merged = assembler
            .merge_turn(&mut session, None, Some(segment))
            .await
            .unwrap();
        assert_eq!(merged.unwrap().path, path);

        let merged = assembler.merge_turn(&mut session, None, None).await.unwrap();
        assert!(merged.is_none());
    }

    #[tokio::test]
    async fn test_measure_duration_missing_file_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = AudioAssembler::new(unavailable_tools_config(dir.path()));
        let duration = assembler.measure_duration(&dir.path().join("nope.mp3")).await;
        assert_eq!(duration, 0.0);
    }

    #[tokio::test]
    async fn test_measure_duration_unreadable_payload_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = AudioAssembler::new(unavailable_tools_config(dir.path()));
        let path = dir.path().join("garbage.bin");
        fs::write(&path, b"this is not audio data at all").unwrap();
        assert_eq!(assembler.measure_duration(&path).await, 0.0);
    }

    #[tokio::test]
    async fn test_measure_duration_decodes_wav_without_ffprobe() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = AudioAssembler::new(unavailable_tools_config(dir.path()));

        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..8000 {
            let sample = ((i as f32 * 0.05).sin() * 8000.0) as i16;
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();

        let duration = assembler.measure_duration(&path).await;
        assert!((duration - 1.0).abs() < 0.05, "got {}", duration);
    }

    #[tokio::test]
    async fn test_dialogue_audio_single_segment_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = AudioAssembler::new(unavailable_tools_config(dir.path()));
        let output = dir.path().join("audio.mp3");

        // One turn with one empty side stays on the ffmpeg-free path: the
        // surviving segment passes through merge and concat unchanged.
        let turns = vec![DialogueTurn {
            speaker_1: "Welcome to the show".to_string(),
            speaker_2: String::new(),
            speaker_1_voice: "a".to_string(),
            speaker_2_voice: "b".to_string(),
        }];

        let (path, _duration) = assembler
            .generate_dialogue_audio(&FakeSpeech, &turns, &output, 1.0, 1.0)
            .await
            .unwrap();
        assert!(path.exists());

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "audio.mp3")
            .collect();
        for entry in &leftovers {
            // Session directories may remain only if empty.
            assert!(entry.path().is_dir());
            assert_eq!(fs::read_dir(entry.path()).unwrap().count(), 0);
        }
    }

    #[tokio::test]
    async fn test_dialogue_audio_empty_script_fails() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = AudioAssembler::new(unavailable_tools_config(dir.path()));
        let result = assembler
            .generate_dialogue_audio(&FakeSpeech, &[], &dir.path().join("a.mp3"), 1.0, 1.0)
            .await;
        assert!(matches!(result, Err(ClipcastError::EmptyInput(_))));
    }
}
