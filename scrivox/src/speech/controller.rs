use std::fmt;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::engine::{EngineEvent, EngineEventKind, EventReceiver, SessionHandle, SpeechEngine};
use super::utterance::{Rate, Utterance};
use super::voice::{resolve_voice, Voice};
use crate::error::{Error, Operation, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    #[default]
    Idle,
    Speaking,
    Paused,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PlaybackState::Idle => f.write_str("idle"),
            PlaybackState::Speaking => f.write_str("speaking"),
            PlaybackState::Paused => f.write_str("paused"),
        }
    }
}

struct Session {
    handle: SessionHandle,
    utterance: Utterance,
    started: bool,
}

/// Owns one speech engine and at most one live utterance on it.
///
/// The state only becomes `Speaking` once the engine confirms with a
/// `Started` event, so between [`start`](Self::start) and that event the
/// controller is `Idle` with a pending utterance. `Speaking` and `Paused`
/// always have a started utterance behind them.
pub struct PlaybackController<E> {
    engine: E,
    state: PlaybackState,
    session: Option<Session>,
    state_tx: watch::Sender<PlaybackState>,
}

impl<E: SpeechEngine> PlaybackController<E> {
    pub fn new(engine: E) -> Self {
        let (state_tx, _) = watch::channel(PlaybackState::Idle);
        Self {
            engine,
            state: PlaybackState::Idle,
            session: None,
            state_tx,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn utterance(&self) -> Option<&Utterance> {
        self.session.as_ref().map(|session| &session.utterance)
    }

    pub fn handle(&self) -> Option<SessionHandle> {
        self.session.as_ref().map(|session| session.handle)
    }

    /// An utterance was handed to the engine but has not started yet.
    pub fn is_pending(&self) -> bool {
        self.session.as_ref().is_some_and(|session| !session.started)
    }

    /// Receives every state change.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.state_tx.subscribe()
    }

    pub fn voices(&self) -> Vec<Voice> {
        self.engine.voices()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Begin reading `text`, superseding whatever is currently loaded.
    ///
    /// Blank text fails with [`Error::NoText`] and changes nothing. If the
    /// engine refuses the new utterance the previous one keeps playing.
    pub fn start(&mut self, text: &str, voice: Option<&str>, rate: Rate) -> Result<&Utterance> {
        if text.trim().is_empty() {
            return Err(Error::NoText);
        }

        let selection = resolve_voice(voice, &self.engine.voices());
        let utterance = Utterance::new(text, selection, rate)?;
        let handle = self
            .engine
            .speak(utterance.text(), utterance.voice(), utterance.rate())?;

        if let Some(previous) = self.session.take() {
            debug!(previous = %previous.handle, next = %handle, "superseding utterance");
            if let Err(err) = self.engine.cancel(previous.handle) {
                warn!(handle = %previous.handle, "failed to cancel superseded utterance: {err}");
            }
        }

        info!(
            %handle,
            voice = %utterance.voice(),
            rate = utterance.rate().get(),
            chars = utterance.text().chars().count(),
            "utterance queued"
        );

        self.set_state(PlaybackState::Idle);
        let session = self.session.insert(Session {
            handle,
            utterance,
            started: false,
        });
        Ok(&session.utterance)
    }

    pub fn pause(&mut self) -> Result<()> {
        let handle = self.require(Operation::Pause, PlaybackState::Speaking)?;
        self.engine.pause(handle)?;
        self.set_state(PlaybackState::Paused);
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        let handle = self.require(Operation::Resume, PlaybackState::Paused)?;
        self.engine.resume(handle)?;
        self.set_state(PlaybackState::Speaking);
        Ok(())
    }

    /// Apply one engine event. Events for anything but the current utterance
    /// are dropped.
    pub fn handle_event(&mut self, event: EngineEvent) -> PlaybackState {
        let Some(session) = self.session.as_mut() else {
            debug!(handle = %event.handle, kind = ?event.kind, "ignoring event, nothing loaded");
            return self.state;
        };
        if session.handle != event.handle {
            debug!(
                handle = %event.handle,
                current = %session.handle,
                kind = ?event.kind,
                "ignoring event for superseded utterance"
            );
            return self.state;
        }

        match event.kind {
            EngineEventKind::Started => {
                if session.started {
                    debug!(handle = %event.handle, "duplicate start event");
                } else {
                    session.started = true;
                    self.set_state(PlaybackState::Speaking);
                }
            }
            EngineEventKind::Ended => {
                if !session.started {
                    warn!(handle = %event.handle, "utterance ended before it started");
                }
                self.session = None;
                self.set_state(PlaybackState::Idle);
                info!(handle = %event.handle, "playback finished");
            }
        }
        self.state
    }

    /// Wait for the next engine event and apply it. `None` once the engine
    /// has dropped its sender.
    pub async fn next_event(&mut self, events: &mut EventReceiver) -> Option<PlaybackState> {
        let event = events.recv().await?;
        Some(self.handle_event(event))
    }

    /// Apply engine events until nothing is loaded any more.
    pub async fn wait_until_idle(&mut self, events: &mut EventReceiver) -> PlaybackState {
        while self.session.is_some() {
            if self.next_event(events).await.is_none() {
                warn!("engine event channel closed while an utterance was loaded");
                break;
            }
        }
        self.state
    }

    fn require(&self, operation: Operation, expected: PlaybackState) -> Result<SessionHandle> {
        match &self.session {
            Some(session) if self.state == expected => Ok(session.handle),
            _ => Err(Error::InvalidState {
                operation,
                state: self.state,
            }),
        }
    }

    fn set_state(&mut self, next: PlaybackState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "playback state changed");
            self.state = next;
            self.state_tx.send_replace(next);
        }
    }
}
