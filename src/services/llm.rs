//! Script and keyword generation boundary to the language-model
//! collaborator.
//!
//! Failures surface as structured errors, never as sentinel strings embedded
//! in otherwise-successful return values. The terms parser tolerates
//! malformed structured output by extracting the first bracketed list-like
//! substring.

use crate::config::PipelineConfig;
use crate::error::{ClipcastError, Result};
use crate::models::DialogueTurn;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;

lazy_static! {
    static ref BRACKETED_LIST: Regex = Regex::new(r"(?s)\[.*\]").unwrap();
    static ref MARKDOWN_NOISE: Regex = Regex::new(r"[*#]").unwrap();
}

/// Script generation collaborator.
#[async_trait]
pub trait ScriptGenerator: Send + Sync {
    /// Generate a single-speaker narration script for a subject.
    async fn generate_script(
        &self,
        subject: &str,
        language: &str,
        paragraph_number: u32,
    ) -> Result<String>;

    /// Convert an article into ordered two-speaker dialogue turns, with the
    /// given voices attached.
    async fn generate_dialogue_script(
        &self,
        article_text: &str,
        language: &str,
        speaker_1_voice: &str,
        speaker_2_voice: &str,
    ) -> Result<Vec<DialogueTurn>>;

    /// Derive stock-footage search terms from a narration script.
    async fn generate_terms(&self, subject: &str, script: &str, amount: usize)
        -> Result<Vec<String>>;

    /// Derive stock-footage search terms from dialogue turns.
    async fn generate_terms_from_dialogue(
        &self,
        turns: &[DialogueTurn],
        amount: usize,
    ) -> Result<Vec<String>>;
}

/// Default client for OpenAI-compatible chat completion endpoints.
pub struct OpenAiScriptClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_retries: u32,
}

impl OpenAiScriptClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_retries: u32,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            // Every request gets at least one attempt.
            max_retries: max_retries.max(1),
        }
    }

    /// Build a client honoring the pipeline's configured retry bound.
    pub fn from_config(
        config: &PipelineConfig,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self::new(base_url, api_key, model, config.max_retries)
    }

    /// One chat completion round trip, retried on transient failure up to
    /// the bounded attempt count.
    async fn chat(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });

        let mut last_error = String::new();
        for attempt in 1..=self.max_retries {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match response {
                Ok(response) if response.status().is_success() => {
                    let value: serde_json::Value = response.json().await?;
                    let content = value["choices"][0]["message"]["content"]
                        .as_str()
                        .unwrap_or_default()
                        .trim()
                        .to_string();
                    if !content.is_empty() {
                        return Ok(content);
                    }
                    last_error = "provider returned an empty completion".to_string();
                }
                Ok(response) => {
                    last_error = format!("provider returned status {}", response.status());
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }
            log::warn!(
                "chat completion attempt {}/{} failed: {}",
                attempt,
                self.max_retries,
                last_error
            );
        }
        Err(ClipcastError::Provider(last_error))
    }
}

#[async_trait]
impl ScriptGenerator for OpenAiScriptClient {
    async fn generate_script(
        &self,
        subject: &str,
        language: &str,
        paragraph_number: u32,
    ) -> Result<String> {
        if subject.trim().is_empty() {
            return Err(ClipcastError::EmptyInput("video subject is empty".to_string()));
        }
        let mut prompt = format!(
            "Generate a narration script for a video about the subject below.\n\
             Return only the raw script text with {} paragraph(s): no markdown, \
             no titles, no speaker indicators, and never mention this prompt.\n\
             Respond in the same language as the subject.\n\n\
             Subject: {}",
            paragraph_number, subject
        );
        if !language.is_empty() {
            prompt.push_str(&format!("\nLanguage: {}", language));
        }

        let response = self.chat(&prompt).await?;
        let script = clean_script_response(&response);
        if script.is_empty() {
            return Err(ClipcastError::Provider(
                "script generation produced no usable text".to_string(),
            ));
        }
        log::info!("generated narration script, {} chars", script.len());
        Ok(script)
    }

    async fn generate_dialogue_script(
        &self,
        article_text: &str,
        language: &str,
        speaker_1_voice: &str,
        speaker_2_voice: &str,
    ) -> Result<Vec<DialogueTurn>> {
        if article_text.trim().is_empty() {
            return Err(ClipcastError::EmptyInput("article text is empty".to_string()));
        }
        let mut prompt = format!(
            "Convert the article below into a natural two-host podcast dialogue.\n\
             Host A asks and guides, host B explains and goes deeper; 2-4 sentences \
             per utterance, covering the article's key points.\n\
             Output strictly a JSON array, one object per turn:\n\
             [{{\"speaker_1\": \"...\", \"speaker_2\": \"...\"}}]\n\
             No text outside the JSON.\n\nArticle:\n{}",
            article_text
        );
        if !language.is_empty() {
            prompt.push_str(&format!("\nRespond in: {}", language));
        }

        let response = self.chat(&prompt).await?;
        let turns = parse_dialogue_response(&response, speaker_1_voice, speaker_2_voice)?;
        log::info!("generated dialogue script, {} turns", turns.len());
        Ok(turns)
    }

    async fn generate_terms(
        &self,
        subject: &str,
        script: &str,
        amount: usize,
    ) -> Result<Vec<String>> {
        let prompt = format!(
            "Generate {} English search terms for stock videos matching the video \
             below. Each term is 1-3 words. Return only a JSON array of strings.\n\n\
             Subject: {}\n\nScript:\n{}",
            amount, subject, script
        );
        let response = self.chat(&prompt).await?;
        parse_terms_response(&response, amount)
    }

    async fn generate_terms_from_dialogue(
        &self,
        turns: &[DialogueTurn],
        amount: usize,
    ) -> Result<Vec<String>> {
        let all_text = turns
            .iter()
            .map(|turn| format!("{} {}", turn.speaker_1, turn.speaker_2))
            .collect::<Vec<_>>()
            .join(" ");
        let prompt = format!(
            "Extract {} keywords from the podcast dialogue below, for matching \
             stock video footage. Return only a JSON array of strings.\n\n{}",
            amount, all_text
        );
        let response = self.chat(&prompt).await?;
        parse_terms_response(&response, amount)
    }
}

/// Strip markdown noise from a narration script response.
fn clean_script_response(response: &str) -> String {
    let cleaned = MARKDOWN_NOISE.replace_all(response, "");
    cleaned.trim().to_string()
}

/// Strip a Markdown code fence from a structured response.
fn strip_code_fence(response: &str) -> &str {
    let response = response.trim();
    let response = response
        .strip_prefix("```json")
        .or_else(|| response.strip_prefix("```"))
        .unwrap_or(response);
    response.strip_suffix("```").unwrap_or(response).trim()
}

/// Parse a JSON array of dialogue turns, attaching the configured voices.
pub fn parse_dialogue_response(
    response: &str,
    speaker_1_voice: &str,
    speaker_2_voice: &str,
) -> Result<Vec<DialogueTurn>> {
    #[derive(serde::Deserialize)]
    struct RawTurn {
        speaker_1: String,
        speaker_2: String,
    }

    let body = strip_code_fence(response);
    let raw: Vec<RawTurn> = serde_json::from_str(body).or_else(|e| {
        // Recover a bracketed array embedded in surrounding prose.
        BRACKETED_LIST
            .find(body)
            .and_then(|m| serde_json::from_str(m.as_str()).ok())
            .ok_or(e)
    })?;

    if raw.is_empty() {
        return Err(ClipcastError::Provider(
            "dialogue response contained no turns".to_string(),
        ));
    }
    Ok(raw
        .into_iter()
        .map(|turn| DialogueTurn {
            speaker_1: turn.speaker_1,
            speaker_2: turn.speaker_2,
            speaker_1_voice: speaker_1_voice.to_string(),
            speaker_2_voice: speaker_2_voice.to_string(),
        })
        .collect())
}

/// Parse a JSON array of search terms, recovering from malformed output by
/// extracting the first bracketed list-like substring.
pub fn parse_terms_response(response: &str, amount: usize) -> Result<Vec<String>> {
    let body = strip_code_fence(response);
    let parsed: Option<Vec<String>> = serde_json::from_str(body)
        .ok()
        .or_else(|| {
            BRACKETED_LIST
                .find(body)
                .and_then(|m| serde_json::from_str(m.as_str()).ok())
        });

    let terms: Vec<String> = parsed
        .unwrap_or_default()
        .into_iter()
        .map(|term| term.trim().to_string())
        .filter(|term| !term.is_empty())
        .take(amount)
        .collect();

    if terms.is_empty() {
        return Err(ClipcastError::Provider(format!(
            "no search terms could be parsed from: {}",
            response
        )));
    }
    Ok(terms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_terms_plain_array() {
        let terms = parse_terms_response(r#"["city", "money", "growth"]"#, 5).unwrap();
        assert_eq!(terms, vec!["city", "money", "growth"]);
    }

    #[test]
    fn test_parse_terms_recovers_from_surrounding_prose() {
        let raw = "Sure! Here are the terms:\n[\"a\", \"b\"]\nHope that helps.";
        let terms = parse_terms_response(raw, 5).unwrap();
        assert_eq!(terms, vec!["a", "b"]);
    }

    #[test]
    fn test_parse_terms_respects_amount_and_rejects_garbage() {
        let terms = parse_terms_response(r#"["a","b","c","d"]"#, 2).unwrap();
        assert_eq!(terms.len(), 2);
        assert!(parse_terms_response("no list here", 5).is_err());
    }

    #[test]
    fn test_parse_dialogue_with_code_fence() {
        let raw = "```json\n[{\"speaker_1\": \"Hi\", \"speaker_2\": \"Hello\"}]\n```";
        let turns = parse_dialogue_response(raw, "va", "vb").unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].speaker_1, "Hi");
        assert_eq!(turns[0].speaker_1_voice, "va");
        assert_eq!(turns[0].speaker_2_voice, "vb");
    }

    #[test]
    fn test_parse_dialogue_empty_is_error() {
        assert!(parse_dialogue_response("[]", "a", "b").is_err());
    }

    #[test]
    fn test_clean_script_response() {
        assert_eq!(clean_script_response(" ## Title **bold** "), "Title bold");
    }

    #[test]
    fn test_retry_bound_is_at_least_one_attempt() {
        let client = OpenAiScriptClient::new("http://localhost", "key", "model", 0);
        assert_eq!(client.max_retries, 1);
    }

    #[test]
    fn test_from_config_carries_retry_bound() {
        let config = PipelineConfig {
            max_retries: 3,
            ..PipelineConfig::default()
        };
        let client = OpenAiScriptClient::from_config(&config, "http://localhost", "key", "model");
        assert_eq!(client.max_retries, 3);
    }
}
