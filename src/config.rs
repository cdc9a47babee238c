use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::providers::{BigModelSettings, GeminiSettings};

pub const CONFIG_PATH_ENV: &str = "BINGO_CONFIG";
pub const DEFAULT_BIND: &str = "127.0.0.1:8787";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 120;

const GEMINI_API_KEY: &str = "GEMINI_API_KEY";
const GEMINI_BASE_URL: &str = "GEMINI_BASE_URL";
const GEMINI_MODEL: &str = "GEMINI_MODEL";
const BIGMODEL_API_KEY: &str = "BIGMODEL_API_KEY";
const BIGMODEL_BASE_URL: &str = "BIGMODEL_BASE_URL";
const BIGMODEL_VISION_MODEL: &str = "BIGMODEL_VISION_MODEL";
const BIGMODEL_IMAGE_MODEL: &str = "BIGMODEL_IMAGE_MODEL";
const HTTP_TIMEOUT_SECS: &str = "BINGO_HTTP_TIMEOUT_SECS";
const BIND: &str = "BINGO_BIND";

const KNOWN_KEYS: [&str; 9] = [
    GEMINI_API_KEY,
    GEMINI_BASE_URL,
    GEMINI_MODEL,
    BIGMODEL_API_KEY,
    BIGMODEL_BASE_URL,
    BIGMODEL_VISION_MODEL,
    BIGMODEL_IMAGE_MODEL,
    HTTP_TIMEOUT_SECS,
    BIND,
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {message}")]
    ReadFile { path: String, message: String },
    #[error("failed to parse config TOML '{path}': {message}")]
    ParseToml { path: String, message: String },
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
}

/// Runtime settings for the proxy server and the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub http_timeout: Duration,
    pub gemini: GeminiSettings,
    pub bigmodel: BigModelSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8787)),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            gemini: GeminiSettings::default(),
            bigmodel: BigModelSettings::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    bind: Option<String>,
    http_timeout_secs: Option<u64>,
    #[serde(default)]
    gemini: FileGemini,
    #[serde(default)]
    bigmodel: FileBigModel,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileGemini {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileBigModel {
    api_key: Option<String>,
    base_url: Option<String>,
    vision_model: Option<String>,
    image_model: Option<String>,
}

impl AppConfig {
    /// Layers, lowest first: defaults, TOML file, `.env` in the working directory,
    /// process environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);
        let config_path = config_path.map(Path::to_path_buf).or(env_path);
        let working_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::load_layers(config_path.as_deref(), &working_dir, |key| {
            std::env::var(key).ok()
        })
    }

    pub fn load_layers(
        config_path: Option<&Path>,
        dotenv_dir: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        if let Some(path) = config_path {
            values.extend(load_toml_layer(path)?);
        }
        let dotenv = load_dotenv_map(dotenv_dir)?;
        for key in KNOWN_KEYS {
            if let Some(value) = dotenv.get(key) {
                values.insert(key.to_string(), value.clone());
            }
        }
        for key in KNOWN_KEYS {
            if let Some(value) = env(key) {
                values.insert(key.to_string(), value);
            }
        }
        debug!(
            config_file = ?config_path,
            keys = values.len(),
            "resolved configuration layers"
        );
        Self::from_values(&values)
    }

    pub fn from_values(values: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let get = |key: &str| {
            values
                .get(key)
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
        };

        if let Some(raw) = get(BIND) {
            config.bind = raw.parse().map_err(|e| ConfigError::InvalidValue {
                key: BIND,
                message: format!("{e}"),
            })?;
        }
        if let Some(raw) = get(HTTP_TIMEOUT_SECS) {
            let secs = raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: HTTP_TIMEOUT_SECS,
                    message: format!("expected a positive number of seconds, got '{raw}'"),
                })?;
            config.http_timeout = Duration::from_secs(secs);
        }

        config.gemini.api_key = get(GEMINI_API_KEY).map(str::to_string);
        if let Some(raw) = get(GEMINI_BASE_URL) {
            config.gemini.base_url = validate_base_url(GEMINI_BASE_URL, raw)?;
        }
        if let Some(model) = get(GEMINI_MODEL) {
            config.gemini.model = model.to_string();
        }

        config.bigmodel.api_key = get(BIGMODEL_API_KEY).map(str::to_string);
        if let Some(raw) = get(BIGMODEL_BASE_URL) {
            config.bigmodel.base_url = validate_base_url(BIGMODEL_BASE_URL, raw)?;
        }
        if let Some(model) = get(BIGMODEL_VISION_MODEL) {
            config.bigmodel.vision_model = model.to_string();
        }
        if let Some(model) = get(BIGMODEL_IMAGE_MODEL) {
            config.bigmodel.image_model = model.to_string();
        }
        Ok(config)
    }
}

fn validate_base_url(key: &'static str, raw: &str) -> Result<String, ConfigError> {
    let parsed = Url::parse(raw).map_err(|e| ConfigError::InvalidValue {
        key,
        message: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidValue {
            key,
            message: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    Ok(raw.trim_end_matches('/').to_string())
}

fn load_toml_layer(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|error| ConfigError::ReadFile {
        path: path.display().to_string(),
        message: error.to_string(),
    })?;
    let file = toml::from_str::<FileConfig>(raw.as_str()).map_err(|error| {
        ConfigError::ParseToml {
            path: path.display().to_string(),
            message: error.to_string(),
        }
    })?;

    let entries = [
        (BIND, file.bind),
        (HTTP_TIMEOUT_SECS, file.http_timeout_secs.map(|secs| secs.to_string())),
        (GEMINI_API_KEY, file.gemini.api_key),
        (GEMINI_BASE_URL, file.gemini.base_url),
        (GEMINI_MODEL, file.gemini.model),
        (BIGMODEL_API_KEY, file.bigmodel.api_key),
        (BIGMODEL_BASE_URL, file.bigmodel.base_url),
        (BIGMODEL_VISION_MODEL, file.bigmodel.vision_model),
        (BIGMODEL_IMAGE_MODEL, file.bigmodel.image_model),
    ];
    Ok(entries
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key.to_string(), value)))
        .collect())
}

fn load_dotenv_map(dir: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let path = dir.join(".env");
    if !path.is_file() {
        return Ok(HashMap::new());
    }
    let raw = fs::read_to_string(&path).map_err(|error| ConfigError::ReadFile {
        path: path.display().to_string(),
        message: error.to_string(),
    })?;
    Ok(parse_dotenv_content(raw.as_str()))
}

pub(crate) fn parse_dotenv_content(raw: &str) -> HashMap<String, String> {
    raw.lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let line = line.strip_prefix("export ").map_or(line, str::trim_start);
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), unquote(value.trim())))
        })
        .collect()
}

fn unquote(value: &str) -> String {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner.to_string();
        }
    }
    match value.split_once(" #") {
        Some((before_comment, _)) => before_comment.trim_end().to_string(),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use pretty_assertions::assert_eq;

    use super::*;

    fn scratch_dir(label: &str) -> PathBuf {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("bingo_config_{label}_{stamp}"));
        fs::create_dir_all(&dir).expect("scratch dir");
        dir
    }

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_without_any_layer() {
        let config = AppConfig::from_values(&HashMap::new()).expect("defaults");
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.bind.to_string(), DEFAULT_BIND);
        assert_eq!(config.http_timeout, Duration::from_secs(120));
        assert_eq!(config.gemini.model, "gemini-2.5-flash-image");
        assert_eq!(config.bigmodel.vision_model, "glm-4v-flash");
        assert!(config.gemini.api_key.is_none());
    }

    #[test]
    fn blank_credentials_count_as_unset() {
        let config = AppConfig::from_values(&values(&[(GEMINI_API_KEY, "   ")])).expect("config");
        assert!(config.gemini.api_key.is_none());
    }

    #[test]
    fn rejects_bad_timeout_and_base_url() {
        let err = AppConfig::from_values(&values(&[(HTTP_TIMEOUT_SECS, "0")]))
            .expect_err("zero timeout");
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: HTTP_TIMEOUT_SECS,
                ..
            }
        ));

        let err = AppConfig::from_values(&values(&[(BIGMODEL_BASE_URL, "ftp://example.com")]))
            .expect_err("bad scheme");
        assert!(err.to_string().contains("unsupported scheme 'ftp'"));
    }

    #[test]
    fn base_urls_lose_trailing_slash() {
        let config = AppConfig::from_values(&values(&[(
            GEMINI_BASE_URL,
            "http://127.0.0.1:9000/v1beta/",
        )]))
        .expect("config");
        assert_eq!(config.gemini.base_url, "http://127.0.0.1:9000/v1beta");
    }

    #[test]
    fn parses_dotenv_quotes_exports_and_comments() {
        let parsed = parse_dotenv_content(
            "# comment\nexport GEMINI_API_KEY=\"g-key\"\nBIGMODEL_API_KEY='b # key'\nBINGO_BIND=0.0.0.0:9000 # local\n=skip\nnot a pair\n",
        );
        assert_eq!(parsed.get(GEMINI_API_KEY).map(String::as_str), Some("g-key"));
        assert_eq!(parsed.get(BIGMODEL_API_KEY).map(String::as_str), Some("b # key"));
        assert_eq!(parsed.get(BIND).map(String::as_str), Some("0.0.0.0:9000"));
        assert_eq!(parsed.len(), 3);
    }

    #[test]
    fn layers_apply_in_precedence_order() {
        let dir = scratch_dir("layers");
        let toml_path = dir.join("bingo.toml");
        fs::write(
            &toml_path,
            r#"bind = "127.0.0.1:7000"
http_timeout_secs = 30

[gemini]
api_key = "from-file"
model = "file-model"

[bigmodel]
image_model = "file-image"
"#,
        )
        .expect("toml write");
        fs::write(dir.join(".env"), "GEMINI_API_KEY=from-dotenv\nBINGO_BIND=127.0.0.1:7100\n")
            .expect("dotenv write");

        let config = AppConfig::load_layers(Some(&toml_path), &dir, |key| {
            (key == BIND).then(|| String::from("127.0.0.1:7200"))
        })
        .expect("layered config");

        assert_eq!(config.bind.to_string(), "127.0.0.1:7200");
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert_eq!(config.gemini.api_key.as_deref(), Some("from-dotenv"));
        assert_eq!(config.gemini.model, "file-model");
        assert_eq!(config.bigmodel.image_model, "file-image");
        assert_eq!(config.bigmodel.vision_model, "glm-4v-flash");

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn unknown_toml_keys_are_rejected() {
        let dir = scratch_dir("unknown");
        let toml_path = dir.join("bingo.toml");
        fs::write(&toml_path, "[openai]\napi_key = \"x\"\n").expect("toml write");

        let err = AppConfig::load_layers(Some(&toml_path), &dir, |_| None)
            .expect_err("unknown section");
        assert!(matches!(err, ConfigError::ParseToml { .. }));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let dir = scratch_dir("missing");
        let err = AppConfig::load_layers(Some(&dir.join("nope.toml")), &dir, |_| None)
            .expect_err("missing file");
        assert!(matches!(err, ConfigError::ReadFile { .. }));
        let _ = fs::remove_dir_all(dir);
    }
}
