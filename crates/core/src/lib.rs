//! Core types for the streaming speech engine
//!
//! This crate provides foundational types used across all other crates:
//! - Audio chunk type and linear resampling
//! - Speech request options and validation
//! - Speaker / emotion / style vocabulary
//! - Error types

pub mod audio;
pub mod error;
pub mod speech;

pub use audio::{resample_linear, AudioChunk};
pub use error::{Error, Result, ValidationError};
pub use speech::{
    GenerateOptions, GenerateRequest, SpeechEmotion, SpeechStyle, TextUnit, VoiceId, SPEAKER_IDS,
};
