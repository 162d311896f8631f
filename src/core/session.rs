//! Build session: active profiles and the hook environment overlay.
//!
//! Holds what would otherwise be process-global state (the active profile
//! list, variables exported to hooks) and is passed explicitly into the
//! orchestrator and the watcher.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Environment variable selecting active profiles (comma separated).
pub const PROFILE_ENV: &str = "QUIRE_PROFILE";

/// Called with the new profile list whenever it changes.
pub type ProfileObserver = Box<dyn Fn(&[String]) + Send + Sync>;

#[derive(Default)]
pub struct BuildSession {
    profiles: RwLock<Vec<String>>,
    env: RwLock<FxHashMap<String, String>>,
    observers: RwLock<Vec<ProfileObserver>>,
}

impl BuildSession {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Session whose profiles come from `--profile`, falling back to
    /// `QUIRE_PROFILE`. Config defaults are applied later by
    /// [`BuildSession::resolve_profiles`].
    pub fn from_env(cli_profile: Option<&str>) -> Arc<Self> {
        let session = Self::new();
        let raw = cli_profile
            .map(str::to_owned)
            .or_else(|| std::env::var(PROFILE_ENV).ok());
        if let Some(raw) = raw {
            *session.profiles.write() = split_profiles(&raw);
        }
        session
    }

    pub fn profiles(&self) -> Vec<String> {
        self.profiles.read().clone()
    }

    /// Replace the active profile list. Observers run only on change.
    pub fn set_profiles(&self, profiles: Vec<String>) {
        {
            let mut current = self.profiles.write();
            if *current == profiles {
                return;
            }
            current.clone_from(&profiles);
        }
        for observer in self.observers.read().iter() {
            observer(&profiles);
        }
    }

    /// Apply config defaults and group rules to the active profile list.
    ///
    /// An empty list takes `defaults`; then for each group without an
    /// active member the group's first member is activated.
    pub fn resolve_profiles(&self, defaults: &[String], groups: &[Vec<String>]) {
        let mut profiles = self.profiles();
        if profiles.is_empty() {
            profiles = defaults.to_vec();
        }
        for group in groups {
            if let Some(first) = group.first()
                && !group.iter().any(|p| profiles.contains(p))
            {
                profiles.push(first.clone());
            }
        }
        self.set_profiles(profiles);
    }

    pub fn on_profiles_changed(&self, observer: ProfileObserver) {
        self.observers.write().push(observer);
    }

    pub fn set_env(&self, key: &str, value: impl Into<String>) {
        self.env.write().insert(key.to_owned(), value.into());
    }

    pub fn remove_env(&self, key: &str) {
        self.env.write().remove(key);
    }

    /// Snapshot of the overlay, with the active profiles exported as
    /// `QUIRE_PROFILE`.
    pub fn env(&self) -> Vec<(String, String)> {
        let mut vars: Vec<_> = self
            .env
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let profiles = self.profiles();
        if !profiles.is_empty() {
            vars.push((PROFILE_ENV.to_owned(), profiles.join(",")));
        }
        vars.sort();
        vars
    }
}

fn split_profiles(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_split_profiles() {
        assert_eq!(split_profiles(" dev, ,prod "), vec!["dev", "prod"]);
        assert!(split_profiles("").is_empty());
    }

    #[test]
    fn test_observers_fire_only_on_change() {
        let session = BuildSession::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        session.on_profiles_changed(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        session.set_profiles(vec!["dev".into()]);
        session.set_profiles(vec!["dev".into()]);
        session.set_profiles(vec!["prod".into()]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_resolve_profiles_defaults_and_groups() {
        let session = BuildSession::new();
        session.resolve_profiles(
            &["dev".into()],
            &[vec!["basic".into(), "advanced".into()]],
        );
        assert_eq!(session.profiles(), vec!["dev", "basic"]);

        let session = BuildSession::from_env(Some("advanced"));
        session.resolve_profiles(&["dev".into()], &[vec!["basic".into(), "advanced".into()]]);
        assert_eq!(session.profiles(), vec!["advanced"]);
    }

    #[test]
    fn test_env_overlay_includes_profiles() {
        let session = BuildSession::from_env(Some("dev"));
        session.set_env("QUIRE_PROJECT_RENDER_ALL", "1");
        let env = session.env();
        assert!(env.contains(&("QUIRE_PROJECT_RENDER_ALL".into(), "1".into())));
        assert!(env.contains(&(PROFILE_ENV.into(), "dev".into())));

        session.remove_env("QUIRE_PROJECT_RENDER_ALL");
        assert_eq!(session.env().len(), 1);
    }
}
