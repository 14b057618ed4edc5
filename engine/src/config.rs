//! Engine launch configuration.
//!
//! Deserialized from the settings file by the CLI; the core only reads it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const PONDER_OPTION: &str = "USI_Ponder";
pub const MULTI_PV_OPTIONS: [&str; 2] = ["USI_MultiPV", "MultiPV"];

/// Typed value of one engine option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EngineOption {
    Check {
        value: bool,
    },
    Spin {
        value: i64,
        #[serde(default)]
        min: Option<i64>,
        #[serde(default)]
        max: Option<i64>,
    },
    Combo {
        value: String,
        #[serde(default)]
        vars: Vec<String>,
    },
    String {
        value: String,
    },
    Filename {
        value: String,
    },
}

impl EngineOption {
    /// Value as written after `setoption ... value`. Spin values are clamped
    /// to the declared range, empty strings become `<empty>`.
    pub fn wire_value(&self) -> String {
        match self {
            EngineOption::Check { value } => value.to_string(),
            EngineOption::Spin { value, min, max } => {
                let mut v = *value;
                if let Some(min) = min {
                    v = v.max(*min);
                }
                if let Some(max) = max {
                    v = v.min(*max);
                }
                v.to_string()
            }
            EngineOption::Combo { value, .. }
            | EngineOption::String { value }
            | EngineOption::Filename { value } => {
                if value.is_empty() {
                    "<empty>".to_string()
                } else {
                    value.clone()
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub name: String,
    /// Executable path or connection descriptor, interpreted by the connector
    pub target: String,
    #[serde(default)]
    pub options: BTreeMap<String, EngineOption>,
}

impl EngineConfig {
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            options: BTreeMap::new(),
        }
    }

    pub fn with_option(mut self, name: impl Into<String>, option: EngineOption) -> Self {
        self.options.insert(name.into(), option);
        self
    }

    pub fn ponder_enabled(&self) -> bool {
        matches!(
            self.options.get(PONDER_OPTION),
            Some(EngineOption::Check { value: true })
        )
    }

    /// Name of the spin option controlling the number of reported lines.
    pub fn multi_pv_option(&self) -> Option<&str> {
        MULTI_PV_OPTIONS.into_iter().find(|name| {
            matches!(self.options.get(*name), Some(EngineOption::Spin { .. }))
        })
    }

    pub fn multi_pv(&self) -> Option<u32> {
        let name = self.multi_pv_option()?;
        match self.options.get(name) {
            Some(EngineOption::Spin { value, .. }) => u32::try_from(*value).ok(),
            _ => None,
        }
    }

    /// Returns false when the engine declares no multi-PV option.
    pub fn set_multi_pv(&mut self, lines: u32) -> bool {
        let Some(name) = self.multi_pv_option().map(str::to_string) else {
            return false;
        };
        if let Some(EngineOption::Spin { value, .. }) = self.options.get_mut(&name) {
            *value = i64::from(lines);
        }
        true
    }
}
