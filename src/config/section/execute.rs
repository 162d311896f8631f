//! `[execute]` section configuration.
//!
//! ```toml
//! [execute]
//! freeze = "auto"     # false | true | "auto"
//! daemon = 0
//! command = ["python3", "run.py", "{input}"]
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Reuse policy for frozen execution results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FreezeMode {
    /// Only reuse when rendering with the freezer explicitly enabled.
    #[default]
    Off,
    /// Always reuse a frozen result, even when the source changed.
    On,
    /// Reuse when the source is unchanged.
    Auto,
}

impl<'de> Deserialize<'de> for FreezeMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bool(bool),
            Str(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Bool(true) => Ok(Self::On),
            Raw::Bool(false) => Ok(Self::Off),
            Raw::Str(s) if s == "auto" => Ok(Self::Auto),
            Raw::Str(s) => Err(serde::de::Error::custom(format!(
                "invalid freeze value `{s}`, expected true, false or \"auto\""
            ))),
        }
    }
}

impl Serialize for FreezeMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Off => serializer.serialize_bool(false),
            Self::On => serializer.serialize_bool(true),
            Self::Auto => serializer.serialize_str("auto"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecuteConfig {
    pub freeze: FreezeMode,

    /// Keep-alive seconds for execution daemons; unset leaves the engine default.
    pub daemon: Option<u32>,

    /// Code execution command. Its stdout becomes the executed markdown.
    pub command: Vec<String>,
}
