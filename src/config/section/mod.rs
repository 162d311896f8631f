//! Configuration section definitions.
//!
//! Each submodule owns one `[section]` of `_quire.toml`.

mod engine;
mod execute;
mod format;
mod profile;
mod project;
mod serve;

pub use engine::EngineConfig;
pub use execute::{ExecuteConfig, FreezeMode};
pub use format::{FormatConfig, FormatsConfig};
pub use profile::ProfileConfig;
pub use project::{ExecuteDir, ProjectSectionConfig};
pub use serve::ServeConfig;

use serde::{Deserialize, Deserializer};

/// Accept either a single string or a list of strings.
pub(crate) fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}
