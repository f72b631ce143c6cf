use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rodio::{Decoder, OutputStreamHandle, Sink};
use scrivox::speech::{
    EngineEvent, EventSender, Rate, SessionHandle, SpeechEngine, Voice, VoiceSelection,
};
use scrivox::{Error, Result};

/// espeak-ng's own default speed.
const BASE_WPM: f32 = 175.0;
const MIN_WPM: u32 = 80;
const MAX_WPM: u32 = 450;

const DRAIN_POLL: Duration = Duration::from_millis(50);

pub fn words_per_minute(rate: Rate) -> u32 {
    ((BASE_WPM * rate.get()).round() as u32).clamp(MIN_WPM, MAX_WPM)
}

/// Ask espeak-ng which voices it has installed.
pub fn list_voices(program: &str) -> Result<Vec<Voice>> {
    let output = Command::new(program)
        .arg("--voices")
        .output()
        .map_err(|err| Error::Engine(format!("could not run {program}: {err}")))?;
    if !output.status.success() {
        return Err(Error::Engine(format!(
            "{program} --voices failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(parse_voices(&String::from_utf8_lossy(&output.stdout)))
}

/// Parse the `--voices` table: priority, language, age/gender, name, file.
fn parse_voices(listing: &str) -> Vec<Voice> {
    listing
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("Pty"))
        .skip(1)
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            let language = columns.nth(1)?;
            let name = columns.nth(1)?;
            Some(Voice::new(name, language).with_language(language))
        })
        .collect()
}

struct Playback {
    sink: Arc<Sink>,
    cancelled: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

struct Synthesis {
    program: String,
    text: String,
    voice: Option<String>,
    wpm: u32,
    handle: SessionHandle,
    sink: Arc<Sink>,
    cancelled: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    events: EventSender,
}

impl Synthesis {
    fn run(self) {
        match self.render() {
            Ok(wav) if !self.cancelled.load(Ordering::SeqCst) => match Decoder::new(Cursor::new(wav)) {
                Ok(source) => {
                    self.sink.append(source);
                    let _ = self.events.send(EngineEvent::started(self.handle));
                    // `Sink::empty` stays false while paused.
                    while !self.sink.empty() && !self.cancelled.load(Ordering::SeqCst) {
                        thread::sleep(DRAIN_POLL);
                    }
                }
                Err(err) => tracing::error!(handle = %self.handle, "could not decode speech: {err}"),
            },
            Ok(_) => tracing::debug!(handle = %self.handle, "cancelled before playback"),
            Err(err) => tracing::error!(handle = %self.handle, "{err}"),
        }
        self.finished.store(true, Ordering::SeqCst);
        let _ = self.events.send(EngineEvent::ended(self.handle));
    }

    /// Run espeak-ng and collect the WAV it writes to stdout.
    fn render(&self) -> Result<Vec<u8>> {
        let mut command = Command::new(&self.program);
        command
            .arg("--stdout")
            .arg("-s")
            .arg(self.wpm.to_string());
        if let Some(voice) = &self.voice {
            command.arg("-v").arg(voice);
        }
        let mut child = command
            .arg("--stdin")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| Error::Engine(format!("could not run {}: {err}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(self.text.as_bytes())
                .map_err(|err| Error::Engine(format!("could not feed {}: {err}", self.program)))?;
        }
        let output = child
            .wait_with_output()
            .map_err(|err| Error::Engine(format!("{} did not finish: {err}", self.program)))?;
        if !output.status.success() {
            return Err(Error::Engine(format!(
                "{} failed: {}",
                self.program,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output.stdout)
    }
}

/// Speaks through espeak-ng, one rodio sink per utterance.
pub struct EspeakEngine {
    program: String,
    output: OutputStreamHandle,
    events: EventSender,
    voices: Vec<Voice>,
    sessions: HashMap<SessionHandle, Playback>,
    next_id: u64,
}

impl EspeakEngine {
    pub fn new(program: impl Into<String>, output: OutputStreamHandle, events: EventSender) -> Result<Self> {
        let program = program.into();
        let voices = list_voices(&program)?;
        tracing::debug!(program = %program, voices = voices.len(), "espeak engine ready");
        Ok(Self {
            program,
            output,
            events,
            voices,
            sessions: HashMap::new(),
            next_id: 0,
        })
    }

    fn session(&self, handle: SessionHandle) -> Result<&Playback> {
        self.sessions
            .get(&handle)
            .ok_or_else(|| Error::Engine(format!("no playback for session {handle}")))
    }

    fn prune(&mut self) {
        self.sessions
            .retain(|_, playback| !playback.finished.load(Ordering::SeqCst));
    }
}

impl SpeechEngine for EspeakEngine {
    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    fn speak(&mut self, text: &str, voice: &VoiceSelection, rate: Rate) -> Result<SessionHandle> {
        self.prune();
        let sink = Sink::try_new(&self.output)
            .map_err(|err| Error::Engine(format!("audio output unavailable: {err}")))?;

        self.next_id += 1;
        let handle = SessionHandle::new(self.next_id);
        let playback = Playback {
            sink: Arc::new(sink),
            cancelled: Arc::new(AtomicBool::new(false)),
            finished: Arc::new(AtomicBool::new(false)),
        };
        let job = Synthesis {
            program: self.program.clone(),
            text: text.to_string(),
            voice: voice.voice().map(|voice| voice.id.clone()),
            wpm: words_per_minute(rate),
            handle,
            sink: playback.sink.clone(),
            cancelled: playback.cancelled.clone(),
            finished: playback.finished.clone(),
            events: self.events.clone(),
        };

        thread::Builder::new()
            .name(format!("espeak-{}", handle.id()))
            .spawn(move || job.run())
            .map_err(|err| Error::Engine(format!("could not start synthesis: {err}")))?;

        tracing::debug!(%handle, wpm = words_per_minute(rate), voice = %voice, "synthesis started");
        self.sessions.insert(handle, playback);
        Ok(handle)
    }

    fn pause(&mut self, handle: SessionHandle) -> Result<()> {
        self.session(handle)?.sink.pause();
        Ok(())
    }

    fn resume(&mut self, handle: SessionHandle) -> Result<()> {
        self.session(handle)?.sink.play();
        Ok(())
    }

    fn cancel(&mut self, handle: SessionHandle) -> Result<()> {
        if let Some(playback) = self.sessions.remove(&handle) {
            playback.cancelled.store(true, Ordering::SeqCst);
            playback.sink.stop();
        }
        Ok(())
    }
}

impl Drop for EspeakEngine {
    fn drop(&mut self) {
        for playback in self.sessions.values() {
            playback.cancelled.store(true, Ordering::SeqCst);
            playback.sink.stop();
        }
    }
}
