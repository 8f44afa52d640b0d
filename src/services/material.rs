//! Stock-footage acquisition boundary and local-material preprocessing.

use crate::error::{ClipcastError, Result};
use crate::models::{MaterialInfo, VideoAspect, VideoConcatMode};
use async_trait::async_trait;
use std::path::PathBuf;

/// What the footage provider needs to know to assemble a clip list.
#[derive(Debug, Clone)]
pub struct MaterialRequest {
    pub terms: Vec<String>,
    pub aspect: VideoAspect,
    pub concat_mode: VideoConcatMode,
    /// Total footage duration required, in seconds.
    pub required_duration: f64,
    /// Maximum duration of one clip, in seconds.
    pub max_clip_duration: u32,
    pub dialogue_mode: bool,
}

/// Stock-footage collaborator: searches and downloads clips matching the
/// request, returning local file paths.
#[async_trait]
pub trait MaterialProvider: Send + Sync {
    async fn fetch(&self, task_id: &str, request: &MaterialRequest) -> Result<Vec<PathBuf>>;
}

/// Validate caller-supplied local materials: existing files with a positive
/// duration, in the order given. Used instead of the provider when the video
/// source is local; keyword extraction is skipped entirely in that case.
pub fn preprocess_local_materials(materials: &[MaterialInfo]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for material in materials {
        let path = PathBuf::from(&material.url);
        if !path.exists() {
            log::warn!("local material missing, skipping: {}", material.url);
        } else if material.duration <= 0.0 {
            log::warn!("local material has no duration, skipping: {}", material.url);
        } else {
            paths.push(path);
        }
    }
    if paths.is_empty() {
        return Err(ClipcastError::EmptyInput(
            "no valid local materials found".to_string(),
        ));
    }
    Ok(paths)
}
