//! Profile overlays: `_quire-<profile>.toml` and `_quire.toml.local`.
//!
//! Overlays are deep-merged over the base table. With several active
//! profiles the first one wins, so they are applied in reverse order.

use std::fs;
use std::path::{Path, PathBuf};

use super::{CONFIG_FILE, ConfigError, LOCAL_CONFIG_FILE};

/// Path of the overlay file for `profile`.
pub fn profile_file(root: &Path, profile: &str) -> PathBuf {
    let stem = CONFIG_FILE.trim_end_matches(".toml");
    root.join(format!("{stem}-{profile}.toml"))
}

/// Merge the overlays for `profiles` (and the local override) into `base`.
///
/// Returns the overlay files that were read.
pub fn apply_overlays(
    root: &Path,
    base: &mut toml::Table,
    profiles: &[String],
) -> Result<Vec<PathBuf>, ConfigError> {
    let mut read = Vec::new();
    let overlays = profiles
        .iter()
        .rev()
        .map(|p| profile_file(root, p))
        .chain(std::iter::once(root.join(LOCAL_CONFIG_FILE)));

    for path in overlays {
        if !path.is_file() {
            continue;
        }
        let overlay = read_table(&path)?;
        merge_tables(base, overlay);
        read.push(path);
    }
    Ok(read)
}

pub(super) fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let content =
        fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
    toml::from_str(&content).map_err(|err| ConfigError::Toml(path.to_path_buf(), err))
}

/// Deep merge: tables merge key by key, anything else is replaced.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn table(s: &str) -> toml::Table {
        toml::from_str(s).unwrap()
    }

    #[test]
    fn test_merge_tables_deep() {
        let mut base = table("[project]\noutput-dir = \"_site\"\nlib-dir = \"libs\"");
        merge_tables(&mut base, table("[project]\noutput-dir = \"_prod\""));
        let project = base["project"].as_table().unwrap();
        assert_eq!(project["output-dir"].as_str(), Some("_prod"));
        assert_eq!(project["lib-dir"].as_str(), Some("libs"));
    }

    #[test]
    fn test_first_profile_wins() {
        let dir = TempDir::new().unwrap();
        fs::write(profile_file(dir.path(), "a"), "[serve]\nport = 1").unwrap();
        fs::write(profile_file(dir.path(), "b"), "[serve]\nport = 2").unwrap();
        fs::write(dir.path().join(LOCAL_CONFIG_FILE), "[serve]\nbrowse = false").unwrap();

        let mut base = toml::Table::new();
        let read = apply_overlays(dir.path(), &mut base, &["a".into(), "b".into()]).unwrap();
        assert_eq!(read.len(), 3);
        let serve = base["serve"].as_table().unwrap();
        assert_eq!(serve["port"].as_integer(), Some(1));
        assert_eq!(serve["browse"].as_bool(), Some(false));
    }

    #[test]
    fn test_missing_overlays_are_skipped() {
        let dir = TempDir::new().unwrap();
        let mut base = toml::Table::new();
        let read = apply_overlays(dir.path(), &mut base, &["nope".into()]).unwrap();
        assert!(read.is_empty());
    }
}
