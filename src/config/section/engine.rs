//! `[engine]` section configuration.
//!
//! ```toml
//! [engine]
//! command = ["pandoc", "{input}", "-o", "{output}", "--to", "{to}"]
//! ```
//!
//! Placeholders: `{input}` (intermediate markdown), `{output}` (output file
//! name), `{to}` (format name), `{files_dir}` (supporting files directory).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Render command template. Empty means the built-in HTML writer.
    pub command: Vec<String>,
}

#[cfg(test)]
mod tests {
    use crate::config::test_parse_config;

    #[test]
    fn test_engine_command() {
        let config = test_parse_config("[engine]\ncommand = [\"pandoc\", \"{input}\"]");
        assert_eq!(config.engine.command, vec!["pandoc", "{input}"]);
        assert!(test_parse_config("").engine.command.is_empty());
    }
}
