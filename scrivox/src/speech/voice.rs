use std::fmt;

use serde::{Deserialize, Serialize};

/// A voice offered by a speech engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    /// Human readable name, the key users configure.
    pub name: String,
    /// What the engine needs to be told to use this voice.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Voice {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            language: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum VoiceSelection {
    Voice(Voice),
    #[default]
    EngineDefault,
}

impl VoiceSelection {
    pub fn voice(&self) -> Option<&Voice> {
        match self {
            VoiceSelection::Voice(voice) => Some(voice),
            VoiceSelection::EngineDefault => None,
        }
    }
}

impl fmt::Display for VoiceSelection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VoiceSelection::Voice(voice) => f.write_str(&voice.name),
            VoiceSelection::EngineDefault => f.write_str("engine default"),
        }
    }
}

/// Pick the voice whose name is exactly `requested`.
///
/// No request, an empty request, or a name the engine does not offer all
/// resolve to the engine's default voice.
pub fn resolve_voice(requested: Option<&str>, available: &[Voice]) -> VoiceSelection {
    let Some(name) = requested.filter(|name| !name.is_empty()) else {
        return VoiceSelection::EngineDefault;
    };

    match available.iter().find(|voice| voice.name == name) {
        Some(voice) => VoiceSelection::Voice(voice.clone()),
        None => {
            tracing::warn!(
                requested = name,
                available = available.len(),
                "voice not offered by the engine, using its default voice"
            );
            VoiceSelection::EngineDefault
        }
    }
}
