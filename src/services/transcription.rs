//! Transcription boundary: derives a caption file from the assembled master
//! audio track when direct derivation is unavailable or produced nothing.

use crate::error::{ClipcastError, Result};
use crate::services::subtitle::{self, CaptionEntry, SubtitleSynthesizer};
use async_trait::async_trait;
use std::path::Path;

/// Transcription collaborator. Produces an SRT file for an audio track,
/// using the expected script text as corroborating context.
#[async_trait]
pub trait TranscriptionService: Send + Sync {
    async fn transcribe(&self, audio: &Path, expected_text: &str, output: &Path) -> Result<()>;
}

/// Default client for OpenAI-compatible transcription endpoints.
pub struct OpenAiTranscriptionClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiTranscriptionClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl TranscriptionService for OpenAiTranscriptionClient {
    async fn transcribe(&self, audio: &Path, expected_text: &str, output: &Path) -> Result<()> {
        let url = format!("{}/audio/transcriptions", self.base_url.trim_end_matches('/'));
        let bytes = tokio::fs::read(audio).await?;
        let file_name = audio
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio.mp3".to_string());

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let mut form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .text("response_format", "srt")
            .part("file", part);
        // The expected script steers the decoder toward the right wording.
        if !expected_text.trim().is_empty() {
            let prompt: String = expected_text.chars().take(800).collect();
            form = form.text("prompt", prompt);
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ClipcastError::Transcription(format!(
                "transcription endpoint returned status {}",
                response.status()
            )));
        }

        let srt = response.text().await?;
        if srt.trim().is_empty() {
            return Err(ClipcastError::Transcription(
                "transcription produced an empty result".to_string(),
            ));
        }
        tokio::fs::write(output, srt).await?;
        log::info!("transcription written to {}", output.display());
        Ok(())
    }
}

/// Correction pass reconciling transcribed captions against the source
/// script: a caption whose words mostly match one script line is replaced by
/// that line verbatim. Best effort; captions without a close match keep the
/// transcribed text.
pub fn correct_captions(captions: &mut [CaptionEntry], expected_text: &str) {
    let lines: Vec<&str> = expected_text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if lines.is_empty() {
        return;
    }

    let mut corrected = 0usize;
    for caption in captions.iter_mut() {
        let (best_line, best_ratio) = lines
            .iter()
            .map(|line| (*line, SubtitleSynthesizer::overlap_ratio(&caption.text, line)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap_or(("", 0.0));
        if best_ratio >= 0.5 && caption.text != best_line {
            caption.text = best_line.to_string();
            corrected += 1;
        }
    }
    if corrected > 0 {
        log::info!("corrected {} caption(s) against the source script", corrected);
    }
}

/// Run the transcription fallback and load the result, applying the
/// correction pass. The produced file must parse into at least one caption
/// or it is treated as invalid.
pub async fn transcribe_to_captions(
    service: &dyn TranscriptionService,
    audio: &Path,
    expected_text: &str,
    output: &Path,
) -> Result<Vec<CaptionEntry>> {
    service.transcribe(audio, expected_text, output).await?;
    let mut captions = subtitle::file_to_captions(output)?;
    correct_captions(&mut captions, expected_text);
    Ok(captions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caption(text: &str) -> CaptionEntry {
        CaptionEntry {
            index: 1,
            start: 0.0,
            end: 2.0,
            text: text.to_string(),
            speaker: None,
        }
    }

    #[test]
    fn test_correction_replaces_close_match() {
        let script = "the quick brown fox jumps over\nan unrelated second line";
        let mut captions = vec![caption("the quick brown fox jumps clover")];
        correct_captions(&mut captions, script);
        assert_eq!(captions[0].text, "the quick brown fox jumps over");
    }

    #[test]
    fn test_correction_keeps_distant_text() {
        let script = "completely different content";
        let mut captions = vec![caption("the quick brown fox")];
        correct_captions(&mut captions, script);
        assert_eq!(captions[0].text, "the quick brown fox");
    }
}
