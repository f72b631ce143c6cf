use std::fmt;

use serde::{Deserialize, Serialize};

use super::voice::VoiceSelection;
use crate::error::{Error, Result};

/// Speech rate as a multiple of the engine's normal speed.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct Rate(f32);

impl Rate {
    pub const NORMAL: Rate = Rate(1.0);

    pub fn new(value: f32) -> Result<Self> {
        if value.is_finite() && value > 0.0 {
            Ok(Self(value))
        } else {
            Err(Error::InvalidRate(value))
        }
    }

    pub fn get(self) -> f32 {
        self.0
    }
}

impl Default for Rate {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl TryFrom<f32> for Rate {
    type Error = Error;

    fn try_from(value: f32) -> Result<Self> {
        Rate::new(value)
    }
}

impl From<Rate> for f32 {
    fn from(rate: Rate) -> Self {
        rate.0
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x", self.0)
    }
}

/// Text, voice and rate captured when playback starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    text: String,
    voice: VoiceSelection,
    rate: Rate,
}

impl Utterance {
    pub fn new(text: impl Into<String>, voice: VoiceSelection, rate: Rate) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(Error::NoText);
        }
        Ok(Self { text, voice, rate })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn voice(&self) -> &VoiceSelection {
        &self.voice
    }

    pub fn rate(&self) -> Rate {
        self.rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_must_be_positive_and_finite() {
        assert_eq!(Rate::new(1.5).map(Rate::get).ok(), Some(1.5));
        assert!(matches!(Rate::new(0.0), Err(Error::InvalidRate(_))));
        assert!(matches!(Rate::new(-1.0), Err(Error::InvalidRate(_))));
        assert!(Rate::new(f32::NAN).is_err());
        assert!(Rate::new(f32::INFINITY).is_err());
        assert_eq!(Rate::default().get(), 1.0);
    }

    #[test]
    fn test_rate_deserialization_is_validated() {
        let rate: Rate = serde_json::from_str("0.75").unwrap();
        assert_eq!(rate.get(), 0.75);
        assert!(serde_json::from_str::<Rate>("0").is_err());
    }

    #[test]
    fn test_blank_utterance_is_rejected() {
        let err = Utterance::new(" \n\t", VoiceSelection::EngineDefault, Rate::NORMAL);
        assert!(matches!(err, Err(Error::NoText)));
    }
}
