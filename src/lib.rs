//! clipcast turns a topic, an article or pre-written dialogue into a
//! narrated video with subtitles.
//!
//! The pipeline runs six ordered stages for each task: script generation,
//! search-term extraction, audio assembly, subtitle derivation, material
//! acquisition and final video rendering. Progress and artifacts are tracked
//! per task in a shared state store, and each stage collaborator (LLM,
//! speech synthesis, transcription, stock footage, rendering) sits behind a
//! trait so providers can be swapped or mocked.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use config::{PipelineConfig, SubtitleProvider};
pub use error::{ClipcastError, Result};
pub use models::{
    DialogueTurn, PipelineStage, Script, ScriptMode, Task, TaskParams, TaskState,
};
pub use services::state::{StateStore, GLOBAL_STATE};
pub use services::task::{Collaborators, Pipeline};
