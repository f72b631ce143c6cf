use std::fmt;

use tokio::sync::mpsc;

use super::utterance::Rate;
use super::voice::{Voice, VoiceSelection};
use crate::error::Result;

/// Identifies one utterance's audio inside a speech engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionHandle(u64);

impl SessionHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEventKind {
    Started,
    Ended,
}

/// Notification emitted by an engine on its own schedule.
///
/// For a given handle an engine sends at most one `Started`, followed by
/// exactly one `Ended`. `Ended` without `Started` means the engine gave up
/// before producing audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineEvent {
    pub handle: SessionHandle,
    pub kind: EngineEventKind,
}

impl EngineEvent {
    pub fn started(handle: SessionHandle) -> Self {
        Self {
            handle,
            kind: EngineEventKind::Started,
        }
    }

    pub fn ended(handle: SessionHandle) -> Self {
        Self {
            handle,
            kind: EngineEventKind::Ended,
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<EngineEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

/// Channel an engine reports `Started`/`Ended` through. The engine keeps the
/// sender; whoever drives the controller keeps the receiver.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Command surface of a speech synthesis backend.
///
/// All calls return immediately. Progress is reported through the engine's
/// [`EventSender`].
pub trait SpeechEngine: Send {
    fn voices(&self) -> Vec<Voice>;

    fn speak(&mut self, text: &str, voice: &VoiceSelection, rate: Rate) -> Result<SessionHandle>;

    fn pause(&mut self, handle: SessionHandle) -> Result<()>;

    fn resume(&mut self, handle: SessionHandle) -> Result<()>;

    /// Silence a session for good. The engine still sends its `Ended` event.
    fn cancel(&mut self, handle: SessionHandle) -> Result<()>;
}

impl<E: SpeechEngine + ?Sized> SpeechEngine for Box<E> {
    fn voices(&self) -> Vec<Voice> {
        (**self).voices()
    }

    fn speak(&mut self, text: &str, voice: &VoiceSelection, rate: Rate) -> Result<SessionHandle> {
        (**self).speak(text, voice, rate)
    }

    fn pause(&mut self, handle: SessionHandle) -> Result<()> {
        (**self).pause(handle)
    }

    fn resume(&mut self, handle: SessionHandle) -> Result<()> {
        (**self).resume(handle)
    }

    fn cancel(&mut self, handle: SessionHandle) -> Result<()> {
        (**self).cancel(handle)
    }
}
