//! `[format.<name>]` sections.
//!
//! ```toml
//! [format.html]
//! keep-md = true
//!
//! [format.pdf]
//! output-dir = "pdf"
//! ```
//!
//! Formats keep their document order; the first one is the project's
//! primary format.

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FormatConfig {
    /// Output extension; derived from the format name when unset.
    pub ext: Option<String>,
    pub keep_md: bool,
    pub keep_tex: bool,
    pub keep_typ: bool,
    /// Format-specific subdirectory of the project output directory.
    pub output_dir: Option<String>,
}

/// Ordered `format` table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatsConfig(pub Vec<(String, FormatConfig)>);

impl FormatsConfig {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&FormatConfig> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FormatConfig)> {
        self.0.iter().map(|(n, f)| (n.as_str(), f))
    }
}

impl<'de> Deserialize<'de> for FormatsConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FormatsVisitor;

        impl<'de> Visitor<'de> for FormatsVisitor {
            type Value = FormatsConfig;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a table of format sections")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut formats = Vec::new();
                while let Some((name, format)) = map.next_entry::<String, FormatConfig>()? {
                    formats.push((name, format));
                }
                Ok(FormatsConfig(formats))
            }
        }

        deserializer.deserialize_map(FormatsVisitor)
    }
}

impl Serialize for FormatsConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(n, f)| (n, f)))
    }
}
