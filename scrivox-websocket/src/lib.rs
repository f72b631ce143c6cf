use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{Sink, SinkExt, StreamExt};
use scrivox::speech::{event_channel, EventSender, Rate, SpeechEngine};
use scrivox::{normalize, Error, PlaybackController, PlaybackState};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Builds the speech engine for one connection. Every connection gets its
/// own engine and controller. `create` runs on the blocking pool, so it may
/// spawn processes or open devices.
pub trait EngineFactory: Send + Sync + 'static {
    type Engine: SpeechEngine + 'static;

    fn create(&self, events: EventSender) -> scrivox::Result<Self::Engine>;
}

impl<F, E> EngineFactory for F
where
    F: Fn(EventSender) -> scrivox::Result<E> + Send + Sync + 'static,
    E: SpeechEngine + 'static,
{
    type Engine = E;

    fn create(&self, events: EventSender) -> scrivox::Result<E> {
        self(events)
    }
}

#[derive(Deserialize)]
struct ClientCommand {
    command: String,
    text: Option<String>,
    voice: Option<String>,
    rate: Option<f32>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    Voices {
        voice: Option<String>,
        voices: Vec<String>,
    },
    VoiceChanged {
        voice: String,
    },
    RateChanged {
        rate: f32,
    },
    Utterance {
        voice: String,
        rate: f32,
        paragraphs: usize,
    },
    State {
        state: PlaybackState,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

/// Per-connection playback settings plus the controller they feed.
struct PlaybackSession<E> {
    controller: PlaybackController<E>,
    voice: Option<String>,
    rate: Rate,
}

impl<E: SpeechEngine> PlaybackSession<E> {
    fn new(engine: E) -> Self {
        Self {
            controller: PlaybackController::new(engine),
            voice: None,
            rate: Rate::default(),
        }
    }

    fn handle_command(&mut self, raw: &str) -> Vec<ServerMessage> {
        let cmd = match serde_json::from_str::<ClientCommand>(raw) {
            Ok(cmd) => cmd,
            Err(err) => return vec![ServerMessage::error(format!("invalid command: {err}"))],
        };

        let before = self.controller.state();
        let mut replies = match cmd.command.as_str() {
            "list_voices" => {
                let voices = self
                    .controller
                    .voices()
                    .into_iter()
                    .map(|voice| voice.name)
                    .collect();
                vec![ServerMessage::Voices {
                    voice: self.voice.clone(),
                    voices,
                }]
            }
            "set_voice" => match cmd.voice {
                Some(name) if self.controller.voices().iter().any(|v| v.name == name) => {
                    self.voice = Some(name.clone());
                    vec![ServerMessage::VoiceChanged { voice: name }]
                }
                Some(name) => vec![ServerMessage::error(format!("unknown voice '{name}'"))],
                None => vec![ServerMessage::error("set_voice requires a voice")],
            },
            "set_rate" => match cmd.rate.map(Rate::new) {
                Some(Ok(rate)) => {
                    self.rate = rate;
                    vec![ServerMessage::RateChanged { rate: rate.get() }]
                }
                Some(Err(err)) => vec![ServerMessage::error(err.to_string())],
                None => vec![ServerMessage::error("set_rate requires a rate")],
            },
            "read" => {
                let text = normalize(cmd.text.as_deref().unwrap_or_default());
                let paragraphs = text.paragraphs().len();
                match self
                    .controller
                    .start(text.as_str(), self.voice.as_deref(), self.rate)
                {
                    Ok(utterance) => vec![ServerMessage::Utterance {
                        voice: utterance.voice().to_string(),
                        rate: utterance.rate().get(),
                        paragraphs,
                    }],
                    Err(err) => vec![ServerMessage::error(err.to_string())],
                }
            }
            "pause" => self.outcome(|controller| controller.pause()),
            "resume" => self.outcome(|controller| controller.resume()),
            other => vec![ServerMessage::error(format!("unknown command '{other}'"))],
        };

        let after = self.controller.state();
        if before != after {
            replies.push(ServerMessage::State { state: after });
        }
        replies
    }

    fn outcome(
        &mut self,
        op: impl FnOnce(&mut PlaybackController<E>) -> scrivox::Result<()>,
    ) -> Vec<ServerMessage> {
        match op(&mut self.controller) {
            Ok(()) => Vec::new(),
            Err(err @ Error::InvalidState { .. }) => {
                debug!("rejected playback command: {err}");
                vec![ServerMessage::error(err.to_string())]
            }
            Err(err) => {
                warn!("playback command failed: {err}");
                vec![ServerMessage::error(err.to_string())]
            }
        }
    }
}

async fn send<S>(write: &mut S, message: &ServerMessage) -> bool
where
    S: Sink<Message> + Unpin,
{
    match serde_json::to_string(message) {
        Ok(json) => write.send(Message::Text(json)).await.is_ok(),
        Err(err) => {
            warn!("failed to encode {message:?}: {err}");
            true
        }
    }
}

async fn handle_connection<F: EngineFactory>(stream: TcpStream, factory: Arc<F>) {
    let peer = stream.peer_addr().ok();
    let ws_stream = match accept_async(stream).await {
        Ok(ws_stream) => ws_stream,
        Err(err) => {
            warn!(?peer, "websocket handshake failed: {err}");
            return;
        }
    };
    let (mut write, mut read) = ws_stream.split();

    let (events_tx, mut events_rx) = event_channel();
    let created = tokio::task::spawn_blocking(move || factory.create(events_tx))
        .await
        .unwrap_or_else(|err| Err(Error::Engine(format!("engine setup panicked: {err}"))));
    let engine = match created {
        Ok(engine) => engine,
        Err(err) => {
            warn!(?peer, "could not create speech engine: {err}");
            send(&mut write, &ServerMessage::error(err.to_string())).await;
            let _ = write.close().await;
            return;
        }
    };
    let mut session = PlaybackSession::new(engine);
    info!(?peer, "playback client connected");

    loop {
        tokio::select! {
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    for reply in session.handle_command(&text) {
                        if !send(&mut write, &reply).await {
                            return;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(?peer, "websocket read failed: {err}");
                    break;
                }
            },
            Some(event) = events_rx.recv() => {
                let before = session.controller.state();
                let after = session.controller.handle_event(event);
                if before != after
                    && !send(&mut write, &ServerMessage::State { state: after }).await
                {
                    return;
                }
            }
        }
    }
    info!(?peer, "playback client disconnected");
}

/// Accept playback clients on an already bound listener.
pub async fn serve<F: EngineFactory>(listener: TcpListener, factory: F) -> tokio::io::Result<()> {
    let factory = Arc::new(factory);
    loop {
        let (stream, _) = listener.accept().await?;
        let factory = factory.clone();
        tokio::spawn(async move {
            handle_connection(stream, factory).await;
        });
    }
}

/// Start the WebSocket server
pub async fn start_server<F: EngineFactory>(factory: F, addr: SocketAddr) -> tokio::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("WebSocket playback server listening on {}", addr);
    serve(listener, factory).await
}
