mod config;
mod engine;

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use config::AppConfig;
use engine::EspeakEngine;
use rodio::OutputStream;
use scrivox::export::export_text;
use scrivox::speech::{event_channel, EventSender, Rate};
use scrivox::{
    extract_text, normalize, DisplayText, Error, GoogleVisionRecognizer, Language,
    PlaybackController, PlaybackState,
};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Subcommand, Debug, Clone)]
enum Mode {
    /// Extract the text of a scanned page
    Ocr {
        /// Image file to recognize
        image: PathBuf,

        /// Also write the text to this file (or into this directory)
        #[arg(short = 'o', long = "output", value_name = "OUTPUT_PATH")]
        output: Option<PathBuf>,
    },

    /// Clean up text into paragraphs, reading a file or stdin
    #[command(alias = "seg")]
    Segment {
        /// File to read, stdin when absent
        input: Option<PathBuf>,
    },

    /// Read a text file aloud
    ///
    /// While playing, type p to pause, r to resume, s to start over, q to quit.
    Read {
        /// Text file to read
        input: PathBuf,
    },

    /// List the voices espeak-ng offers
    Voices,

    /// Start the HTTP service for uploads and exports
    Serve {
        /// IP address to bind to (typically 127.0.0.1 or 0.0.0.0)
        #[arg(long)]
        ip: Option<IpAddr>,

        /// Port to expose the HTTP server on
        #[arg(long)]
        port: Option<u16>,
    },

    /// Start the WebSocket playback server
    #[command(name = "ws", alias = "websocket")]
    WebSocket {
        /// IP address to bind to (typically 127.0.0.1 or 0.0.0.0)
        #[arg(long)]
        ip: Option<IpAddr>,

        /// Port to expose the WebSocket server on
        #[arg(long)]
        port: Option<u16>,
    },

    /// Show configuration paths and current settings
    #[command(name = "config", alias = "cfg")]
    Config {
        /// Show all configuration paths
        #[arg(long)]
        paths: bool,

        /// Initialize config file in global config directory
        #[arg(long)]
        init: bool,
    },
}

#[derive(Parser, Debug)]
#[command(name = "scriv")]
#[command(version)]
#[command(about = "Turn scanned pages into paragraphs and read them aloud")]
#[command(after_help = "Configuration files are loaded from (highest to lowest priority):
  1. --config <file>
  2. ./scriv.toml (local)
  3. <config dir>/scriv/config.toml (global)
Environment variables (SCRIV_LANGUAGE, SCRIV_VOICE, SCRIV_RATE,
GOOGLE_VISION_API_KEY) override the file, flags override both.

Run 'scriv config --paths' to see configuration paths.
Run 'scriv config --init' to create a default config file.")]
struct Cli {
    /// Path to a custom config file (highest priority)
    #[arg(short = 'c', long = "config", value_name = "CONFIG_FILE", global = true)]
    config_file: Option<String>,

    /// OCR language hint: en, es, fr, de or it
    #[arg(short = 'l', long = "lan", value_name = "LANGUAGE", global = true)]
    lan: Option<String>,

    /// Voice name as listed by `scriv voices`
    #[arg(short = 's', long = "voice", value_name = "VOICE", global = true)]
    voice: Option<String>,

    /// Rate of speech, as a coefficient of the default
    /// (below 1.0 is slower, above is faster)
    #[arg(short = 'p', long = "rate", value_name = "RATE", global = true)]
    rate: Option<f32>,

    /// Enable debug logs
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    mode: Mode,
}

/// Config file values with the command line applied on top.
struct ResolvedConfig {
    language: Language,
    voice: Option<String>,
    rate: Rate,
    export_filename: String,
    espeak_program: String,
    ocr_endpoint: String,
    ocr_api_key: Option<String>,
    server_ip: String,
    server_http_port: u16,
    server_websocket_port: u16,
}

// Logged at debug level, so the API key must never appear.
impl fmt::Debug for ResolvedConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ResolvedConfig")
            .field("language", &self.language)
            .field("voice", &self.voice)
            .field("rate", &self.rate)
            .field("export_filename", &self.export_filename)
            .field("espeak_program", &self.espeak_program)
            .field("ocr_endpoint", &self.ocr_endpoint)
            .field("ocr_api_key", &self.ocr_api_key.as_ref().map(|_| "<redacted>"))
            .field("server_ip", &self.server_ip)
            .field("server_http_port", &self.server_http_port)
            .field("server_websocket_port", &self.server_websocket_port)
            .finish()
    }
}

impl ResolvedConfig {
    fn from_cli_and_config(cli: &Cli, config: AppConfig) -> scrivox::Result<Self> {
        let language = match &cli.lan {
            Some(code) => code.parse()?,
            None => config.language,
        };
        let rate = match cli.rate {
            Some(value) => Rate::new(value)?,
            None => config.rate,
        };
        Ok(Self {
            language,
            voice: cli.voice.clone().or(config.voice),
            rate,
            export_filename: config.export_filename,
            espeak_program: config.espeak_program,
            ocr_endpoint: config.ocr.endpoint,
            ocr_api_key: config.ocr.api_key,
            server_ip: config.server.ip,
            server_http_port: config.server.http_port,
            server_websocket_port: config.server.websocket_port,
        })
    }

    fn get_server_ip(&self, cli_ip: Option<IpAddr>) -> IpAddr {
        cli_ip.unwrap_or_else(|| {
            self.server_ip.parse().unwrap_or_else(|_| {
                tracing::warn!(ip = %self.server_ip, "invalid server.ip, binding 0.0.0.0");
                [0, 0, 0, 0].into()
            })
        })
    }

    fn recognizer(&self) -> anyhow::Result<GoogleVisionRecognizer> {
        let Some(key) = self.ocr_api_key.as_deref() else {
            bail!(
                "no Google Vision API key configured; set {} or ocr.api_key",
                scrivox::ocr::google_vision::API_KEY_ENV
            );
        };
        Ok(GoogleVisionRecognizer::new(key).with_endpoint(self.ocr_endpoint.as_str()))
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn read_input(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("could not read {}", path.display())),
        None => {
            let mut raw = String::new();
            tokio::io::stdin()
                .read_to_string(&mut raw)
                .await
                .context("could not read stdin")?;
            Ok(raw)
        }
    }
}

async fn run_ocr(resolved: &ResolvedConfig, image: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(image)
        .await
        .with_context(|| format!("could not read {}", image.display()))?;
    let recognizer = resolved.recognizer()?;

    let text = match extract_text(&recognizer, bytes, resolved.language).await {
        Ok(text) => text,
        Err(err) if err.is_retryable() => {
            tracing::error!("{err}");
            bail!(err.user_message());
        }
        Err(err) => return Err(err.into()),
    };

    if text.is_empty() {
        eprintln!("No text found");
        return Ok(());
    }
    println!("{text}");

    if let Some(requested) = output {
        let export = export_text(&text, Some(resolved.export_filename.as_str()))?;
        let path = output_path(requested, &export.filename);
        tokio::fs::write(&path, &export.bytes)
            .await
            .with_context(|| format!("could not write {}", path.display()))?;
        eprintln!("Saved to {}", path.display());
    }
    Ok(())
}

/// `-o` naming a directory saves under the export filename.
fn output_path(requested: &Path, filename: &str) -> PathBuf {
    if requested.is_dir() {
        requested.join(filename)
    } else {
        requested.to_path_buf()
    }
}

/// Interactive playback of one text until it ends or the user quits.
async fn run_read(resolved: &ResolvedConfig, text: DisplayText) -> anyhow::Result<()> {
    let (_stream, output) = OutputStream::try_default().context("no audio output device")?;
    let (events_tx, mut events_rx) = event_channel();
    let engine = EspeakEngine::new(resolved.espeak_program.as_str(), output, events_tx)?;
    let mut controller = PlaybackController::new(engine);

    let utterance = controller.start(text.as_str(), resolved.voice.as_deref(), resolved.rate)?;
    eprintln!(
        "Reading {} paragraph(s) with {} at {}. [p]ause, [r]esume, [s]tart over, [q]uit",
        text.paragraphs().len(),
        utterance.voice(),
        utterance.rate()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut shown = controller.state();
    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                let command = match line.context("could not read stdin")? {
                    Some(line) => line,
                    None => {
                        stdin_open = false;
                        continue;
                    }
                };
                let outcome = match command.trim() {
                    "p" | "pause" => controller.pause(),
                    "r" | "resume" => controller.resume(),
                    "s" | "restart" => controller
                        .start(text.as_str(), resolved.voice.as_deref(), resolved.rate)
                        .map(|_| ()),
                    "q" | "quit" => break,
                    "" => Ok(()),
                    other => {
                        eprintln!("unknown command '{other}'");
                        Ok(())
                    }
                };
                match outcome {
                    Ok(()) => {}
                    Err(err @ Error::InvalidState { .. }) => eprintln!("{err}"),
                    Err(err) => return Err(err.into()),
                }
            }
            state = controller.next_event(&mut events_rx) => match state {
                Some(PlaybackState::Idle) if controller.utterance().is_none() => {
                    eprintln!("[{}]", PlaybackState::Idle);
                    break;
                }
                Some(_) => {}
                None => bail!("speech engine stopped unexpectedly"),
            },
        }

        let state = controller.state();
        if state != shown {
            eprintln!("[{state}]");
            shown = state;
        }
    }
    Ok(())
}

fn list_voices(program: &str) -> anyhow::Result<()> {
    let voices = engine::list_voices(program)?;
    if voices.is_empty() {
        println!("{program} reported no voices");
        return Ok(());
    }
    println!("{:<32} LANGUAGE", "VOICE");
    for voice in voices {
        println!(
            "{:<32} {}",
            voice.name,
            voice.language.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn show_config(config_file: Option<&str>, paths: bool, init: bool) -> anyhow::Result<()> {
    if paths {
        AppConfig::print_paths();
    }
    if init {
        AppConfig::ensure_config_exists()?;
    }
    if paths || init {
        return Ok(());
    }

    AppConfig::print_paths();
    println!();
    let config = AppConfig::load(config_file)?;
    println!("Current configuration:");
    println!("  language: {}", config.language);
    println!("  voice: {}", config.voice.as_deref().unwrap_or("(engine default)"));
    println!("  rate: {}", config.rate.get());
    println!("  export_filename: {}", config.export_filename);
    println!("  espeak_program: {}", config.espeak_program);
    println!("  ocr.endpoint: {}", config.ocr.endpoint);
    println!(
        "  ocr.api_key: {}",
        if config.ocr.api_key.is_some() { "(set)" } else { "(not set)" }
    );
    println!("  server.ip: {}", config.server.ip);
    println!("  server.http_port: {}", config.server.http_port);
    println!("  server.websocket_port: {}", config.server.websocket_port);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    ctrlc::set_handler(move || {
        eprintln!("Received termination signal, exiting.");
        std::process::exit(0);
    })
    .context("could not install Ctrl-C handler")?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        if let Mode::Config { paths, init } = &cli.mode {
            return show_config(cli.config_file.as_deref(), *paths, *init);
        }

        let config = AppConfig::load(cli.config_file.as_deref())?;
        let resolved = ResolvedConfig::from_cli_and_config(&cli, config)?;
        tracing::debug!(?resolved, "configuration resolved");

        match &cli.mode {
            Mode::Config { .. } => unreachable!(),

            Mode::Ocr { image, output } => run_ocr(&resolved, image, output.as_deref()).await?,

            Mode::Segment { input } => {
                let raw = read_input(input.as_deref()).await?;
                let text = normalize(&raw);
                if !text.is_empty() {
                    println!("{text}");
                }
            }

            Mode::Read { input } => {
                let text = normalize(&read_input(Some(input)).await?);
                run_read(&resolved, text).await?;
            }

            Mode::Voices => list_voices(&resolved.espeak_program)?,

            Mode::Serve { ip, port } => {
                let addr = SocketAddr::from((
                    resolved.get_server_ip(*ip),
                    port.unwrap_or(resolved.server_http_port),
                ));
                let app = scrivox_http::create_server(Arc::new(resolved.recognizer()?));
                let listener = tokio::net::TcpListener::bind(&addr)
                    .await
                    .with_context(|| format!("could not bind {addr}"))?;
                tracing::info!("HTTP server listening on {addr}");
                scrivox_http::serve(listener, app).await?;
            }

            Mode::WebSocket { ip, port } => {
                let addr = SocketAddr::from((
                    resolved.get_server_ip(*ip),
                    port.unwrap_or(resolved.server_websocket_port),
                ));
                let (_stream, output) =
                    OutputStream::try_default().context("no audio output device")?;
                let program = resolved.espeak_program.clone();
                // Fail before accepting clients if espeak-ng is missing.
                engine::list_voices(&program)?;
                scrivox_websocket::start_server(
                    move |events: EventSender| EspeakEngine::new(program.as_str(), output.clone(), events),
                    addr,
                )
                .await?;
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("scriv").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_overrides_config() {
        let config = AppConfig {
            language: Language::Fr,
            voice: Some("French_(France)".to_string()),
            ..AppConfig::default()
        };
        let resolved = ResolvedConfig::from_cli_and_config(
            &cli(&["read", "page.txt", "-l", "it", "--rate", "1.5"]),
            config,
        )
        .unwrap();
        assert_eq!(resolved.language, Language::It);
        assert_eq!(resolved.rate.get(), 1.5);
        assert_eq!(resolved.voice.as_deref(), Some("French_(France)"));
    }

    #[test]
    fn test_config_used_without_flags() {
        let config = AppConfig {
            language: Language::De,
            ..AppConfig::default()
        };
        let resolved =
            ResolvedConfig::from_cli_and_config(&cli(&["segment"]), config).unwrap();
        assert_eq!(resolved.language, Language::De);
        assert_eq!(resolved.rate, Rate::NORMAL);
        assert_eq!(resolved.voice, None);
        assert_eq!(resolved.server_http_port, 5000);
        assert_eq!(resolved.server_websocket_port, 5001);
    }

    #[test]
    fn test_invalid_flags_are_rejected() {
        assert!(matches!(
            ResolvedConfig::from_cli_and_config(&cli(&["segment", "-l", "pt"]), AppConfig::default()),
            Err(Error::UnsupportedLanguage(_))
        ));
        assert!(matches!(
            ResolvedConfig::from_cli_and_config(&cli(&["segment", "--rate", "0"]), AppConfig::default()),
            Err(Error::InvalidRate(_))
        ));
    }

    #[test]
    fn test_server_ip_fallback() {
        let mut resolved =
            ResolvedConfig::from_cli_and_config(&cli(&["serve"]), AppConfig::default()).unwrap();
        assert_eq!(resolved.get_server_ip(None), IpAddr::from([0, 0, 0, 0]));
        assert_eq!(
            resolved.get_server_ip(Some([127, 0, 0, 1].into())),
            IpAddr::from([127, 0, 0, 1])
        );
        resolved.server_ip = "not an ip".to_string();
        assert_eq!(resolved.get_server_ip(None), IpAddr::from([0, 0, 0, 0]));
    }

    #[test]
    fn test_debug_output_hides_api_key() {
        let mut config = AppConfig::default();
        config.ocr.api_key = Some("AIzaSyD-live-key".to_string());
        let resolved = ResolvedConfig::from_cli_and_config(&cli(&["serve"]), config).unwrap();

        let printed = format!("{resolved:?}");
        assert!(!printed.contains("AIzaSyD-live-key"));
        assert!(printed.contains("<redacted>"));
        assert_eq!(resolved.ocr_api_key.as_deref(), Some("AIzaSyD-live-key"));
    }

    #[test]
    fn test_missing_api_key_is_reported() {
        let resolved =
            ResolvedConfig::from_cli_and_config(&cli(&["serve"]), AppConfig::default()).unwrap();
        let err = resolved.recognizer().err().unwrap();
        assert!(err.to_string().contains("GOOGLE_VISION_API_KEY"));
    }

    #[test]
    fn test_output_path_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            output_path(dir.path(), "extracted-text.txt"),
            dir.path().join("extracted-text.txt")
        );
        let file = dir.path().join("page.txt");
        assert_eq!(output_path(&file, "extracted-text.txt"), file);
    }
}
