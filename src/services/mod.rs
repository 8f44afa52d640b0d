//! Pipeline service layer: stage implementations and collaborator traits.

pub mod audio;
pub mod llm;
pub mod material;
pub mod state;
pub mod subtitle;
pub mod task;
pub mod transcription;
pub mod video;
pub mod voice;
