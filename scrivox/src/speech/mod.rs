pub mod controller;
pub mod engine;
pub mod utterance;
pub mod voice;

pub use controller::{PlaybackController, PlaybackState};
pub use engine::{
    event_channel, EngineEvent, EngineEventKind, EventReceiver, EventSender, SessionHandle,
    SpeechEngine,
};
pub use utterance::{Rate, Utterance};
pub use voice::{resolve_voice, Voice, VoiceSelection};
