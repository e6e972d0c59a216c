//! AI provider clients for the reel pipeline.
//!
//! - Gemini for image and frame description, speech detection, scripting
//!   and scene extraction
//! - ElevenLabs for narration synthesis
//! - Deepgram for transcription
//! - Tolerant extraction of JSON objects from model output

pub mod error;
pub mod gemini;
pub mod json;
pub mod metrics;
pub mod speech;
pub mod transcription;

pub use error::{AiError, AiResult};
pub use gemini::{ExtractedScene, ExtractedScenes, GeminiClient, GeminiConfig, TitleAndScript};
pub use json::extract_json;
pub use speech::{SpeechClient, SpeechConfig};
pub use transcription::{long_enough_for_speech, TranscriptionClient, TranscriptionConfig};
