//! Speech request options, validation, and voice vocabulary

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Emotion conveyed by the synthesized speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpeechEmotion {
    #[default]
    Neutral,
    Joy,
    Sadness,
    Anger,
    Fear,
    Surprise,
    Dismissive,
    Confusion,
}

impl SpeechEmotion {
    /// Parse a caller-supplied emotion name; unknown names fall back to neutral.
    pub fn parse_or_default(name: &str) -> Self {
        match name {
            "neutral" => Self::Neutral,
            "joy" => Self::Joy,
            "sadness" => Self::Sadness,
            "anger" => Self::Anger,
            "fear" => Self::Fear,
            "surprise" => Self::Surprise,
            "dismissive" => Self::Dismissive,
            "confusion" => Self::Confusion,
            _ => Self::Neutral,
        }
    }
}

/// Delivery style of the synthesized speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpeechStyle {
    #[default]
    Default,
    Sarcastic,
    Playful,
    Calm,
    Dramatic,
    Serious,
}

impl SpeechStyle {
    /// Parse a caller-supplied style name; unknown names fall back to default.
    pub fn parse_or_default(name: &str) -> Self {
        match name {
            "default" => Self::Default,
            "sarcastic" => Self::Sarcastic,
            "playful" => Self::Playful,
            "calm" => Self::Calm,
            "dramatic" => Self::Dramatic,
            "serious" => Self::Serious,
            _ => Self::Default,
        }
    }
}

/// Named speaker voices and their engine speaker ids.
pub const SPEAKER_IDS: &[(&str, u32)] = &[
    ("skilled_hero_man", 0),
    ("skilled_hero_woman", 1),
    ("fun_hero_man", 2),
    ("fun_hero_woman", 3),
    ("strong_hero_man", 4),
    ("strong_hero_woman", 5),
    ("mad_scientist_man", 6),
    ("mad_scientist_woman", 7),
    ("clever_villain_man", 8),
    ("clever_villain_woman", 9),
    ("narrator_man", 10),
    ("narrator_woman", 11),
    ("wise_elder_man", 12),
    ("wise_elder_woman", 13),
    ("outgoing_anime_man", 14),
    ("outgoing_anime_woman", 15),
    ("scary_villain_man", 16),
    ("scary_villain_woman", 17),
    ("news_reporter_man", 18),
    ("news_reporter_woman", 19),
];

/// Caller-facing voice selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VoiceId {
    /// Engine speaker id.
    Numeric(i64),
    /// Named voice from [`SPEAKER_IDS`].
    Named(String),
}

/// Options for one speech generation request, as supplied by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// Voice to speak with; defaults to speaker 0.
    #[serde(default)]
    pub voice_id: Option<VoiceId>,
    /// Text to synthesize.
    pub text: String,
    /// Emotion name; unknown values fall back to neutral.
    #[serde(default)]
    pub emotion: Option<String>,
    /// Style name; unknown values fall back to default.
    #[serde(default)]
    pub style: Option<String>,
    /// Emotion intensity in [0, 1]; out-of-range values fall back to 0.5.
    #[serde(default)]
    pub intensity: Option<f32>,
    /// Speaking rate multiplier; non-finite values fall back to 1.0.
    #[serde(default)]
    pub speed: Option<f32>,
}

/// A validated, normalized generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub text: String,
    pub speaker_id: u32,
    pub emotion: SpeechEmotion,
    pub style: SpeechStyle,
    pub intensity: f32,
    pub speed: f32,
    pub pace: f32,
}

impl GenerateOptions {
    /// Validate and normalize into a [`GenerateRequest`].
    ///
    /// Empty text and unrecognized voice ids are hard errors; everything else
    /// normalizes to defaults.
    pub fn validate(&self) -> Result<GenerateRequest, ValidationError> {
        if self.text.trim().is_empty() {
            return Err(ValidationError::EmptyText);
        }

        let speaker_id = match &self.voice_id {
            None => 0,
            Some(VoiceId::Numeric(id)) => {
                if *id < 0 || !SPEAKER_IDS.iter().any(|&(_, sid)| sid as i64 == *id) {
                    return Err(ValidationError::InvalidVoiceId(*id));
                }
                *id as u32
            }
            Some(VoiceId::Named(name)) => {
                let name = name.trim();
                if name.is_empty() {
                    0
                } else {
                    SPEAKER_IDS
                        .iter()
                        .find(|&&(n, _)| n == name)
                        .map(|&(_, sid)| sid)
                        .ok_or_else(|| ValidationError::InvalidVoiceName(name.to_string()))?
                }
            }
        };

        let emotion = self
            .emotion
            .as_deref()
            .map(SpeechEmotion::parse_or_default)
            .unwrap_or_default();

        let style = self
            .style
            .as_deref()
            .map(SpeechStyle::parse_or_default)
            .unwrap_or_default();

        let intensity = match self.intensity {
            Some(v) if v.is_finite() && (0.0..=1.0).contains(&v) => v,
            _ => 0.5,
        };

        let speed = match self.speed {
            Some(v) if v.is_finite() => v,
            _ => 1.0,
        };

        Ok(GenerateRequest {
            text: self.text.clone(),
            speaker_id,
            emotion,
            style,
            intensity,
            speed,
            pace: 0.5,
        })
    }
}

/// One prepared unit of text, as produced by the text-preparation collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextUnit {
    /// Text as displayed to the user.
    pub display: String,
    /// Cleaned text handed to the synthesis engine.
    pub clean: String,
    /// Phoneme string; its length drives the cost model.
    pub phonemes: String,
}

impl TextUnit {
    /// Number of phonemes in this unit.
    pub fn phoneme_count(&self) -> usize {
        self.phonemes.chars().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_rejected() {
        let options = GenerateOptions {
            text: "   ".to_string(),
            ..Default::default()
        };
        assert_eq!(options.validate(), Err(ValidationError::EmptyText));
    }

    #[test]
    fn test_named_voice_resolves() {
        let options = GenerateOptions {
            text: "hello".to_string(),
            voice_id: Some(VoiceId::Named("narrator_woman".to_string())),
            ..Default::default()
        };
        let request = options.validate().unwrap();
        assert_eq!(request.speaker_id, 11);
    }

    #[test]
    fn test_unknown_voice_rejected() {
        let options = GenerateOptions {
            text: "hello".to_string(),
            voice_id: Some(VoiceId::Named("mystery_voice".to_string())),
            ..Default::default()
        };
        assert!(matches!(
            options.validate(),
            Err(ValidationError::InvalidVoiceName(_))
        ));

        let options = GenerateOptions {
            text: "hello".to_string(),
            voice_id: Some(VoiceId::Numeric(42)),
            ..Default::default()
        };
        assert_eq!(options.validate(), Err(ValidationError::InvalidVoiceId(42)));
    }

    #[test]
    fn test_out_of_range_values_normalize() {
        let options = GenerateOptions {
            text: "hello".to_string(),
            intensity: Some(3.0),
            speed: Some(f32::NAN),
            emotion: Some("grumpy".to_string()),
            ..Default::default()
        };
        let request = options.validate().unwrap();
        assert_eq!(request.intensity, 0.5);
        assert_eq!(request.speed, 1.0);
        assert_eq!(request.emotion, SpeechEmotion::Neutral);
    }
}
