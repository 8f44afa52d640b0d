//! Segment synthesis boundary to the TTS collaborator.
//!
//! One call produces one playable audio file for one utterance, plus
//! word-level timing metadata when the provider supports it. Empty input
//! text is a skippable no-op, not an error.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One word boundary reported by the speech provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WordBoundary {
    /// Offset from the start of the utterance, in seconds.
    pub offset: f64,
    /// Spoken duration of the word, in seconds.
    pub duration: f64,
    pub text: String,
}

/// Fine-grained speech timing metadata for one synthesized utterance.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SpeechTiming {
    pub words: Vec<WordBoundary>,
}

impl SpeechTiming {
    /// Total spoken duration implied by the word boundaries.
    pub fn total_duration(&self) -> f64 {
        self.words
            .last()
            .map(|w| w.offset + w.duration)
            .unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// One synthesized utterance. Owned by the audio assembler until consumed
/// into a merged track, then deleted.
#[derive(Debug, Clone)]
pub struct AudioSegment {
    pub path: PathBuf,
    pub text: String,
    pub voice: String,
    pub timing: Option<SpeechTiming>,
}

/// Speech synthesis collaborator.
#[async_trait]
pub trait SpeechService: Send + Sync {
    /// Synthesize `text` with the given voice into `output`.
    ///
    /// Returns `Ok(None)` without touching disk when the text is empty or
    /// whitespace ("no artifact produced"); `Ok(Some(..))` carries timing
    /// metadata when the provider reports it, or an empty timing when it
    /// does not. Provider failures surface as `Err` and are mapped to a
    /// missing segment by the assembler.
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        rate: f32,
        volume: f32,
        output: &Path,
    ) -> Result<Option<SpeechTiming>>;
}

/// Synthesize one utterance into an [`AudioSegment`], mapping skipped input
/// and provider failures to `None` so a single bad utterance never aborts
/// the assembly of a whole dialogue.
pub async fn synthesize_segment(
    service: &dyn SpeechService,
    text: &str,
    voice: &str,
    rate: f32,
    volume: f32,
    output: PathBuf,
) -> Option<AudioSegment> {
    if text.trim().is_empty() {
        log::warn!("empty utterance text, skipping {}", output.display());
        return None;
    }

    match service.synthesize(text, voice, rate, volume, &output).await {
        Ok(Some(timing)) if output.exists() => {
            log::debug!("synthesized segment {}", output.display());
            Some(AudioSegment {
                path: output,
                text: text.to_string(),
                voice: voice.to_string(),
                timing: if timing.is_empty() { None } else { Some(timing) },
            })
        }
        Ok(Some(_)) => {
            log::error!("provider reported success but wrote no file: {}", output.display());
            None
        }
        Ok(None) => None,
        Err(e) => {
            log::error!("speech synthesis failed for {}: {}", output.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_total_duration() {
        let timing = SpeechTiming {
            words: vec![
                WordBoundary {
                    offset: 0.0,
                    duration: 0.4,
                    text: "hello".to_string(),
                },
                WordBoundary {
                    offset: 0.5,
                    duration: 0.6,
                    text: "world".to_string(),
                },
            ],
        };
        assert!((timing.total_duration() - 1.1).abs() < 1e-9);
        assert_eq!(SpeechTiming::default().total_duration(), 0.0);
    }
}
