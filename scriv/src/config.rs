use std::fs;
use std::path::{Path, PathBuf};

use scrivox::ocr::google_vision::{API_KEY_ENV, VISION_ENDPOINT};
use scrivox::speech::Rate;
use scrivox::{Error, Language, Result};
use serde::{Deserialize, Serialize};

pub const LOCAL_CONFIG: &str = "scriv.toml";
const APP_DIR: &str = "scriv";
const GLOBAL_CONFIG: &str = "config.toml";

const DEFAULT_CONFIG: &str = r#"# scriv configuration
#
# Files are looked up in this order, the first one found wins:
#   1. --config <file>
#   2. ./scriv.toml
#   3. <config dir>/scriv/config.toml
# SCRIV_LANGUAGE, SCRIV_VOICE, SCRIV_RATE and GOOGLE_VISION_API_KEY override
# the file, command line flags override everything.

# OCR language hint: en, es, fr, de or it
language = "en"

# Voice name as listed by `scriv voices`. Unknown names fall back to the
# engine's default voice.
# voice = "English_(Great_Britain)"

# Speech rate, 1.0 is the engine's normal speed
rate = 1.0

export_filename = "extracted-text.txt"
espeak_program = "espeak-ng"

[ocr]
endpoint = "https://vision.googleapis.com/v1/images:annotate"
# api_key = "..."

[server]
ip = "0.0.0.0"
http_port = 5000
websocket_port = 5001
"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub language: Language,
    pub voice: Option<String>,
    pub rate: Rate,
    pub export_filename: String,
    pub espeak_program: String,
    pub ocr: OcrConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub ip: String,
    pub http_port: u16,
    pub websocket_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            language: Language::default(),
            voice: None,
            rate: Rate::default(),
            export_filename: scrivox::export::DEFAULT_EXPORT_FILENAME.to_string(),
            espeak_program: "espeak-ng".to_string(),
            ocr: OcrConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            endpoint: VISION_ENDPOINT.to_string(),
            api_key: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: "0.0.0.0".to_string(),
            http_port: 5000,
            websocket_port: 5001,
        }
    }
}

impl AppConfig {
    /// Load the first config file found, then apply environment overrides.
    pub fn load(explicit: Option<&str>) -> Result<Self> {
        let mut config = match Self::locate(explicit)? {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config file");
                Self::from_file(&path)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| Error::Config(format!("{}: {err}", path.display())))?;
        toml::from_str(&raw).map_err(|err| Error::Config(format!("{}: {err}", path.display())))
    }

    fn locate(explicit: Option<&str>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            let path = PathBuf::from(expand_path(path));
            if !path.is_file() {
                return Err(Error::Config(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            return Ok(Some(path));
        }

        Ok([Some(PathBuf::from(LOCAL_CONFIG)), global_config_path()]
            .into_iter()
            .flatten()
            .find(|path| path.is_file()))
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(language) = lookup("SCRIV_LANGUAGE") {
            self.language = language.parse()?;
        }
        if let Some(voice) = lookup("SCRIV_VOICE") {
            self.voice = Some(voice);
        }
        if let Some(rate) = lookup("SCRIV_RATE") {
            let value = rate
                .trim()
                .parse::<f32>()
                .map_err(|_| Error::Config(format!("SCRIV_RATE is not a number: {rate}")))?;
            self.rate = Rate::new(value)?;
        }
        if let Some(key) = lookup(API_KEY_ENV) {
            self.ocr.api_key = Some(key);
        }
        Ok(())
    }

    /// Write the default config to the global location unless one is there.
    pub fn ensure_config_exists() -> Result<PathBuf> {
        let path = global_config_path()
            .ok_or_else(|| Error::Config("no config directory on this platform".to_string()))?;
        write_default_config(&path)?;
        Ok(path)
    }

    pub fn print_paths() {
        println!("Configuration paths (highest priority first):");
        println!("  local:  {}", LOCAL_CONFIG);
        match global_config_path() {
            Some(path) => println!("  global: {}", path.display()),
            None => println!("  global: unavailable"),
        }
    }
}

fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(GLOBAL_CONFIG))
}

fn write_default_config(path: &Path) -> Result<bool> {
    if path.exists() {
        println!("Config file already exists at {}", path.display());
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| Error::Config(format!("{}: {err}", parent.display())))?;
    }
    fs::write(path, DEFAULT_CONFIG)
        .map_err(|err| Error::Config(format!("{}: {err}", path.display())))?;
    println!("Created config file at {}", path.display());
    Ok(true)
}

/// Expand a leading `~` to the home directory.
pub fn expand_path(path: &str) -> String {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home.display().to_string();
        }
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).display().to_string();
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_template_matches_defaults() {
        let parsed: AppConfig = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(parsed, AppConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scriv.toml");
        fs::write(
            &path,
            "language = \"fr\"\nrate = 1.25\n\n[server]\nhttp_port = 8080\n",
        )
        .unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.language, Language::Fr);
        assert_eq!(config.rate.get(), 1.25);
        assert_eq!(config.server.http_port, 8080);
        assert_eq!(config.server.websocket_port, 5001);
        assert_eq!(config.espeak_program, "espeak-ng");
        assert_eq!(config.ocr.endpoint, VISION_ENDPOINT);
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");

        fs::write(&path, "rate = 0.0\n").unwrap();
        assert!(matches!(AppConfig::from_file(&path), Err(Error::Config(_))));

        fs::write(&path, "language = \"pt\"\n").unwrap();
        assert!(matches!(AppConfig::from_file(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = AppConfig::load(missing.to_str()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_explicit_config_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "espeak_program = \"/opt/espeak/bin/espeak-ng\"\n").unwrap();
        assert_eq!(
            AppConfig::locate(path.to_str()).unwrap(),
            Some(path.clone())
        );
        assert_eq!(
            AppConfig::from_file(&path).unwrap().espeak_program,
            "/opt/espeak/bin/espeak-ng"
        );
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = AppConfig {
            voice: Some("Alex".to_string()),
            ..AppConfig::default()
        };
        config
            .apply_env(env(&[
                ("SCRIV_LANGUAGE", "DE"),
                ("SCRIV_VOICE", "Amélie"),
                ("SCRIV_RATE", " 0.75 "),
                ("GOOGLE_VISION_API_KEY", "secret"),
            ]))
            .unwrap();

        assert_eq!(config.language, Language::De);
        assert_eq!(config.voice.as_deref(), Some("Amélie"));
        assert_eq!(config.rate.get(), 0.75);
        assert_eq!(config.ocr.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[("SCRIV_VOICE", "  "), ("SCRIV_RATE", "")]))
            .unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_bad_env_rate_is_rejected() {
        let mut config = AppConfig::default();
        assert!(matches!(
            config.apply_env(env(&[("SCRIV_RATE", "fast")])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            config.apply_env(env(&[("SCRIV_RATE", "-1")])),
            Err(Error::InvalidRate(_))
        ));
    }

    #[test]
    fn test_default_config_is_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        assert!(write_default_config(&path).unwrap());
        assert!(!write_default_config(&path).unwrap());
        assert_eq!(AppConfig::from_file(&path).unwrap(), AppConfig::default());
    }

    #[test]
    fn test_expand_path() {
        assert_eq!(expand_path("/etc/scriv.toml"), "/etc/scriv.toml");
        assert_eq!(expand_path("relative.toml"), "relative.toml");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(
                expand_path("~/scriv.toml"),
                home.join("scriv.toml").display().to_string()
            );
        }
    }
}
