//! `[profile]` section configuration.
//!
//! ```toml
//! [profile]
//! default = "dev"
//! group = [["basic", "advanced"]]
//! ```

use serde::{Deserialize, Deserializer, Serialize};

use super::one_or_many;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Profiles active when none are given on the command line.
    #[serde(deserialize_with = "one_or_many")]
    pub default: Vec<String>,

    /// Mutually exclusive groups; the first member is the fallback.
    #[serde(deserialize_with = "groups")]
    pub group: Vec<Vec<String>>,
}

/// A single group may be written as a flat list.
fn groups<'de, D>(deserializer: D) -> Result<Vec<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Groups {
        Single(Vec<String>),
        Many(Vec<Vec<String>>),
    }

    Ok(match Groups::deserialize(deserializer)? {
        Groups::Single(g) if g.is_empty() => Vec::new(),
        Groups::Single(g) => vec![g],
        Groups::Many(g) => g,
    })
}
