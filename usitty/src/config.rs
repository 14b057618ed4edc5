//! Runtime configuration for the usitty CLI.
//!
//! Engine and research settings are JSON files; runtime tunables have a
//! compile-time default and can be overridden through environment variables.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use usi_engine::EngineConfig;
use usi_research::ResearchSettings;

/// Default time allowed for `usiok` and `readyok` (in seconds).
const DEFAULT_ENGINE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Get the engine handshake timeout in seconds.
///
/// Priority:
/// 1. `USITTY_ENGINE_TIMEOUT_SECS` env variable if set (falls back to the
///    default if the value cannot be parsed as a `u64`)
/// 2. `10` seconds as fallback
pub fn get_engine_timeout_secs() -> u64 {
    if let Ok(timeout) = std::env::var("USITTY_ENGINE_TIMEOUT_SECS") {
        return timeout.parse().unwrap_or(DEFAULT_ENGINE_TIMEOUT_SECS);
    }

    DEFAULT_ENGINE_TIMEOUT_SECS
}

/// Get the file tracing output should go to, if any.
///
/// `USITTY_LOG_FILE` when set; logs go to stderr otherwise.
pub fn get_log_file() -> Option<PathBuf> {
    std::env::var_os("USITTY_LOG_FILE").map(PathBuf::from)
}

pub fn load_engine_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    load_json(path)
}

/// Loads research settings. A timeout missing from the file is taken from
/// the environment.
pub fn load_research_settings(path: &Path) -> Result<ResearchSettings, ConfigError> {
    let text = read(path)?;
    let value: serde_json::Value = parse(path, &text)?;
    let has_timeout = value.get("engine_timeout_seconds").is_some();
    let mut settings: ResearchSettings = serde_json::from_value(value).map_err(|source| {
        ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        }
    })?;
    if !has_timeout {
        settings.engine_timeout_seconds = get_engine_timeout_secs();
    }
    Ok(settings)
}

/// Config for an engine given only by its executable path.
pub fn engine_from_path(path: &Path) -> EngineConfig {
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    EngineConfig::new(name, path.display().to_string())
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = read(path)?;
    parse(path, &text)
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn parse<T: DeserializeOwned>(path: &Path, text: &str) -> Result<T, ConfigError> {
    serde_json::from_str(text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_engine_timeout_secs_default() {
        match std::env::var("USITTY_ENGINE_TIMEOUT_SECS") {
            Ok(_) => {}
            Err(_) => assert_eq!(get_engine_timeout_secs(), DEFAULT_ENGINE_TIMEOUT_SECS),
        }
    }

    #[test]
    fn test_load_engine_config() {
        let tempdir = tempfile::tempdir().expect("failed to create temp dir");
        let path = tempdir.path().join("engine.json");
        std::fs::write(
            &path,
            r#"{
                "name": "Lesserkai",
                "target": "/opt/engines/lesserkai",
                "options": {
                    "USI_Hash": { "type": "spin", "value": 256, "min": 1, "max": 4096 },
                    "USI_Ponder": { "type": "check", "value": true }
                }
            }"#,
        )
        .unwrap();

        let config = load_engine_config(&path).unwrap();
        assert_eq!(config.name, "Lesserkai");
        assert!(config.ponder_enabled());
        assert_eq!(config.options.len(), 2);
    }

    #[test]
    fn test_load_research_settings() {
        let tempdir = tempfile::tempdir().expect("failed to create temp dir");
        let path = tempdir.path().join("research.json");
        std::fs::write(
            &path,
            r#"{
                "usi": { "name": "a", "target": "/opt/a" },
                "secondaries": [{ "usi": { "name": "b", "target": "/opt/b" } }],
                "enable_max_seconds": true,
                "max_seconds": 30,
                "engine_timeout_seconds": 3
            }"#,
        )
        .unwrap();

        let settings = load_research_settings(&path).unwrap();
        assert_eq!(settings.secondaries.len(), 1);
        assert_eq!(settings.max_seconds, 30);
        assert_eq!(settings.engine_timeout_seconds, 3);
        assert_eq!(settings.engine_configs().unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_json_reports_path() {
        let tempdir = tempfile::tempdir().expect("failed to create temp dir");
        let path = tempdir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = load_engine_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn test_missing_file() {
        let err = load_engine_config(Path::new("/nonexistent/usitty.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_engine_from_path() {
        let config = engine_from_path(Path::new("/opt/engines/YaneuraOu.exe"));
        assert_eq!(config.name, "YaneuraOu");
        assert_eq!(config.target, "/opt/engines/YaneuraOu.exe");
    }
}
