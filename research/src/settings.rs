use std::time::Duration;

use serde::{Deserialize, Serialize};
use usi_engine::EngineConfig;

use crate::manager::ResearchError;

fn default_max_seconds() -> u64 {
    10
}

fn default_multi_pv() -> u32 {
    4
}

fn default_engine_timeout() -> u64 {
    10
}

/// One additional analysis engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecondaryEngine {
    pub usi: Option<EngineConfig>,
}

/// What the research manager launches and how it drives the engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchSettings {
    /// Primary engine
    pub usi: Option<EngineConfig>,
    #[serde(default)]
    pub secondaries: Vec<SecondaryEngine>,
    /// Stop each engine this long after it starts on a position
    #[serde(default)]
    pub enable_max_seconds: bool,
    #[serde(default = "default_max_seconds")]
    pub max_seconds: u64,
    /// Replace each engine's multi-PV option with `multi_pv` before launch
    #[serde(default)]
    pub override_multi_pv: bool,
    #[serde(default = "default_multi_pv")]
    pub multi_pv: u32,
    #[serde(default = "default_engine_timeout")]
    pub engine_timeout_seconds: u64,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            usi: None,
            secondaries: Vec::new(),
            enable_max_seconds: false,
            max_seconds: default_max_seconds(),
            override_multi_pv: false,
            multi_pv: default_multi_pv(),
            engine_timeout_seconds: default_engine_timeout(),
        }
    }
}

impl ResearchSettings {
    pub fn new(primary: EngineConfig) -> Self {
        Self {
            usi: Some(primary),
            ..Self::default()
        }
    }

    pub fn with_secondary(mut self, engine: EngineConfig) -> Self {
        self.secondaries.push(SecondaryEngine { usi: Some(engine) });
        self
    }

    /// Engine configurations in launch order, primary first, with the
    /// multi-PV override applied.
    pub fn engine_configs(&self) -> Result<Vec<EngineConfig>, ResearchError> {
        let primary = self
            .usi
            .clone()
            .ok_or_else(|| ResearchError::Configuration("primary engine is not set".to_string()))?;

        let mut configs = vec![primary];
        for (index, secondary) in self.secondaries.iter().enumerate() {
            let config = secondary.usi.clone().ok_or_else(|| {
                ResearchError::Configuration(format!("secondary engine {} is not set", index + 1))
            })?;
            configs.push(config);
        }

        if self.override_multi_pv {
            for config in &mut configs {
                if !config.set_multi_pv(self.multi_pv) {
                    tracing::debug!("{} has no multi-PV option to override", config.name);
                }
            }
        }
        Ok(configs)
    }

    /// Per-position search limit. A zero limit disables it.
    pub fn watchdog(&self) -> Option<Duration> {
        (self.enable_max_seconds && self.max_seconds > 0)
            .then(|| Duration::from_secs(self.max_seconds))
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usi_engine::EngineOption;

    fn engine(name: &str) -> EngineConfig {
        EngineConfig::new(name, name).with_option(
            "USI_MultiPV",
            EngineOption::Spin {
                value: 1,
                min: Some(1),
                max: Some(10),
            },
        )
    }

    #[test]
    fn test_missing_primary_is_rejected() {
        let err = ResearchSettings::default().engine_configs().unwrap_err();
        assert!(matches!(err, ResearchError::Configuration(_)));
    }

    #[test]
    fn test_missing_secondary_is_rejected() {
        let mut settings = ResearchSettings::new(engine("a"));
        settings.secondaries.push(SecondaryEngine::default());
        let err = settings.engine_configs().unwrap_err();
        assert_eq!(
            err,
            ResearchError::Configuration("secondary engine 1 is not set".to_string())
        );
    }

    #[test]
    fn test_override_multi_pv() {
        let mut settings = ResearchSettings::new(engine("a")).with_secondary(engine("b"));
        settings.override_multi_pv = true;
        settings.multi_pv = 3;
        let configs = settings.engine_configs().unwrap();
        assert_eq!(configs.len(), 2);
        assert!(configs.iter().all(|c| c.multi_pv() == Some(3)));

        settings.override_multi_pv = false;
        let configs = settings.engine_configs().unwrap();
        assert!(configs.iter().all(|c| c.multi_pv() == Some(1)));
    }

    #[test]
    fn test_watchdog() {
        let mut settings = ResearchSettings::default();
        assert_eq!(settings.watchdog(), None);
        settings.enable_max_seconds = true;
        settings.max_seconds = 3;
        assert_eq!(settings.watchdog(), Some(Duration::from_secs(3)));
        settings.max_seconds = 0;
        assert_eq!(settings.watchdog(), None);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let json = r#"{ "usi": { "name": "a", "target": "/bin/a" } }"#;
        let settings: ResearchSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.max_seconds, 10);
        assert_eq!(settings.multi_pv, 4);
        assert_eq!(settings.engine_timeout_seconds, 10);
        assert!(settings.secondaries.is_empty());
        assert_eq!(settings.usi.unwrap().target, "/bin/a");
    }
}
