//! Subtitle synthesis and alignment.
//!
//! Captions are derived either directly from the script (provider word
//! timings for narration, estimated character-count timings for dialogue) or
//! from a transcription of the assembled audio. Speaker attribution for
//! transcribed captions is a word-overlap heuristic: approximate by design,
//! mislabeling is expected and acceptable.

use crate::config::PipelineConfig;
use crate::error::{ClipcastError, Result};
use crate::models::DialogueTurn;
use crate::services::voice::SpeechTiming;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// One caption entry of an SRT file.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionEntry {
    pub index: usize,
    /// Start time in seconds.
    pub start: f64,
    /// End time in seconds.
    pub end: f64,
    pub text: String,
    /// Speaker label, embedded as a `[label]` prefix when written.
    pub speaker: Option<String>,
}

/// Format seconds as an SRT timestamp, `HH:MM:SS,mmm`.
pub fn format_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

/// Parse an SRT timestamp (`HH:MM:SS,mmm`; a `.` separator is tolerated).
pub fn parse_timestamp(value: &str) -> Option<f64> {
    let value = value.trim().replace(',', ".");
    let parts: Vec<&str> = value.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let hours = parts[0].parse::<u64>().ok()?;
    let minutes = parts[1].parse::<u64>().ok()?;
    let seconds = parts[2].parse::<f64>().ok()?;
    Some(hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds)
}

/// Parse an SRT file into caption entries.
///
/// A file that yields no entries is invalid: callers discard it and fall
/// back to the next derivation strategy.
pub fn file_to_captions(path: &Path) -> Result<Vec<CaptionEntry>> {
    let content = fs::read_to_string(path)
        .map_err(|e| ClipcastError::FileNotFound(format!("{}: {}", path.display(), e)))?;

    let mut captions = Vec::new();
    for block in content.replace("\r\n", "\n").split("\n\n") {
        let lines: Vec<&str> = block.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.len() < 2 {
            continue;
        }
        // Optional numeric index line, then the timing line.
        let timing_pos = match lines.iter().position(|l| l.contains("-->")) {
            Some(pos) => pos,
            None => continue,
        };
        let timing: Vec<&str> = lines[timing_pos].split("-->").collect();
        if timing.len() != 2 {
            continue;
        }
        let (start, end) = match (parse_timestamp(timing[0]), parse_timestamp(timing[1])) {
            (Some(start), Some(end)) => (start, end),
            _ => continue,
        };
        let text = lines[timing_pos + 1..].join(" ");
        if text.trim().is_empty() {
            continue;
        }
        captions.push(CaptionEntry {
            index: captions.len() + 1,
            start,
            end,
            text,
            speaker: None,
        });
    }

    if captions.is_empty() {
        return Err(ClipcastError::Validation(format!(
            "subtitle file has no parsable entries: {}",
            path.display()
        )));
    }
    Ok(captions)
}

/// Write caption entries as an SRT file, renumbering sequentially and
/// embedding speaker labels as a literal `[label]` prefix.
pub fn write_captions(path: &Path, captions: &[CaptionEntry]) -> Result<()> {
    let mut out = String::new();
    for (i, caption) in captions.iter().enumerate() {
        let text = match &caption.speaker {
            Some(speaker) => format!("[{}] {}", speaker, caption.text),
            None => caption.text.clone(),
        };
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_timestamp(caption.start),
            format_timestamp(caption.end),
            text
        ));
    }
    fs::write(path, out)?;
    Ok(())
}

/// Derives captions and assigns speaker labels.
pub struct SubtitleSynthesizer {
    config: PipelineConfig,
}

impl SubtitleSynthesizer {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Estimated-duration captions for a dialogue script, used when no
    /// provider timing metadata exists.
    ///
    /// Each utterance lasts `max(chars * seconds_per_char,
    /// min_caption_seconds)`; entries sit back to back with a fixed pause
    /// after each one. Speaker tags are embedded at write time.
    pub fn dialogue_captions(&self, turns: &[DialogueTurn]) -> Vec<CaptionEntry> {
        let mut captions = Vec::new();
        let mut current_time = 0.0;

        for turn in turns {
            for (speaker, text) in [("speaker_1", &turn.speaker_1), ("speaker_2", &turn.speaker_2)] {
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                let duration = self.estimate_duration(text);
                captions.push(CaptionEntry {
                    index: captions.len() + 1,
                    start: current_time,
                    end: current_time + duration,
                    text: text.to_string(),
                    speaker: Some(speaker.to_string()),
                });
                current_time += duration + self.config.caption_pause_seconds;
            }
        }
        captions
    }

    /// Estimated speaking time for one utterance.
    pub fn estimate_duration(&self, text: &str) -> f64 {
        (text.chars().count() as f64 * self.config.seconds_per_char)
            .max(self.config.min_caption_seconds)
    }

    /// Captions from provider word timings, for single-speaker narration.
    /// Words accumulate into one entry per sentence of the source text.
    pub fn captions_from_timing(&self, text: &str, timing: &SpeechTiming) -> Vec<CaptionEntry> {
        let mut captions = Vec::new();
        let mut words = timing.words.iter().peekable();

        for sentence in split_sentences(text) {
            let target: usize = sentence.split_whitespace().count();
            if target == 0 {
                continue;
            }
            let mut taken = 0;
            let mut start = None;
            let mut end = 0.0;
            while taken < target {
                match words.next() {
                    Some(word) => {
                        if start.is_none() {
                            start = Some(word.offset);
                        }
                        end = word.offset + word.duration;
                        taken += 1;
                    }
                    None => break,
                }
            }
            if let Some(start) = start {
                captions.push(CaptionEntry {
                    index: captions.len() + 1,
                    start,
                    end,
                    text: sentence,
                    speaker: None,
                });
            }
        }
        captions
    }

    /// Word-overlap ratio of a caption against one utterance, relative to
    /// the caption's own word count.
    pub fn overlap_ratio(caption_text: &str, utterance: &str) -> f64 {
        let caption_words: HashSet<String> = caption_text
            .to_lowercase()
            .split_whitespace()
            .map(|w| w.to_string())
            .collect();
        let utterance_words: HashSet<String> = utterance
            .to_lowercase()
            .split_whitespace()
            .map(|w| w.to_string())
            .collect();
        let shared = caption_words.intersection(&utterance_words).count();
        shared as f64 / caption_words.len().max(1) as f64
    }

    /// Assign speaker labels to transcription-derived captions.
    ///
    /// For each caption the overlap ratio against both utterances of the
    /// current turn is computed; a label is assigned only when one ratio is
    /// strictly higher than the other and exceeds the configured threshold.
    /// Ties and sub-threshold cases stay unlabeled.
    pub fn label_speakers(&self, captions: &mut [CaptionEntry], turns: &[DialogueTurn]) {
        let mut position = 0usize;
        for caption in captions.iter_mut() {
            let Some(turn) = turns.get(position) else {
                break;
            };
            let ratio_1 = Self::overlap_ratio(&caption.text, &turn.speaker_1);
            let ratio_2 = Self::overlap_ratio(&caption.text, &turn.speaker_2);
            let threshold = self.config.speaker_overlap_threshold;

            if ratio_1 > ratio_2 && ratio_1 > threshold {
                caption.speaker = Some("speaker_1".to_string());
            } else if ratio_2 > ratio_1 && ratio_2 > threshold {
                caption.speaker = Some("speaker_2".to_string());
                // The second utterance closes a turn; move to the next one.
                position += 1;
            }
        }
    }
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?' | '\n' | '。' | '！' | '？') {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    sentences
}
