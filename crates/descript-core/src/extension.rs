//! Extension lifecycle
//!
//! `startup` turns scripts off globally, claims the domain policy and loads
//! the whitelist from preferences. From then on every change to the
//! whitelist preference reloads the store. `shutdown` undoes all of it.

use parking_lot::Mutex;
use std::sync::Arc;
use url::Url;

use descript_policy::{parse_url, ContentKind, Decision, Origin, PolicyDecider, WhitelistStore};
use descript_storage::{Database, ObserverId, Preferences};

use crate::config::Config;
use crate::domain_policy::{DomainPolicy, DomainPolicyRegistry};
use crate::Result;

/// State held between `startup` and `shutdown`
struct Running {
    policy: DomainPolicy,
    observer: ObserverId,
    scripts_initially_enabled: bool,
}

pub struct Extension {
    config: Config,
    prefs: Preferences,
    registry: DomainPolicyRegistry,
    store: Arc<WhitelistStore>,
    decider: PolicyDecider,
    running: Mutex<Option<Running>>,
}

impl Extension {
    pub fn new(config: Config, prefs: Preferences, registry: DomainPolicyRegistry) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(WhitelistStore::new());
        let decider = PolicyDecider::new(Arc::clone(&store));

        Ok(Self {
            config,
            prefs,
            registry,
            store,
            decider,
            running: Mutex::new(None),
        })
    }

    /// Open the preference database named by `config`
    pub fn open(config: Config, registry: DomainPolicyRegistry) -> Result<Self> {
        if let Some(parent) = config.database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&config.database_path)?;
        Self::new(config, Preferences::new(db), registry)
    }

    pub fn startup(&self) -> Result<()> {
        let mut running = self.running.lock();
        if running.is_some() {
            tracing::debug!("Extension already started");
            return Ok(());
        }

        let whitelist_pref = self.config.whitelist_preference();
        self.prefs.set_default(&whitelist_pref, "")?;

        if self.registry.is_active() {
            tracing::error!("Domain policy already active");
            return Ok(());
        }

        let scripts_key = &self.config.scripts_enabled_key;
        let scripts_initially_enabled = self.prefs.get_bool(scripts_key)?.unwrap_or(true);
        self.prefs.set_bool(scripts_key, false)?;

        let policy = match self.registry.activate(Arc::clone(&self.store)) {
            Ok(policy) => policy,
            Err(e) => {
                self.prefs.set_bool(scripts_key, scripts_initially_enabled)?;
                return Err(e);
            }
        };

        if let Err(e) = reload(&self.prefs, &self.store, &whitelist_pref) {
            policy.deactivate();
            self.prefs.set_bool(scripts_key, scripts_initially_enabled)?;
            return Err(e);
        }

        let observer = {
            let prefs = self.prefs.clone();
            let store = Arc::clone(&self.store);
            self.prefs.add_observer(&whitelist_pref, move |name| {
                if let Err(e) = reload(&prefs, &store, name) {
                    tracing::error!(error = %e, "Failed to reload whitelist");
                }
            })
        };

        *running = Some(Running {
            policy,
            observer,
            scripts_initially_enabled,
        });

        tracing::info!(origins = self.store.len(), "Extension started");

        Ok(())
    }

    pub fn shutdown(&self) -> Result<()> {
        let Some(state) = self.running.lock().take() else {
            return Ok(());
        };

        self.prefs
            .remove_observer(&self.config.whitelist_preference(), state.observer);
        state.policy.deactivate();
        self.prefs.set_bool(
            &self.config.scripts_enabled_key,
            state.scripts_initially_enabled,
        )?;

        tracing::info!("Extension shut down");

        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Rebuild the store from the whitelist preference
    pub fn reload_whitelist(&self) -> Result<()> {
        reload(&self.prefs, &self.store, &self.config.whitelist_preference())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn preferences(&self) -> &Preferences {
        &self.prefs
    }

    pub fn store(&self) -> &Arc<WhitelistStore> {
        &self.store
    }

    /// Decider over this extension's store, usable whether or not the
    /// domain policy is active. The host's content-load hook takes the
    /// decider of the active [`DomainPolicy`] instead.
    pub fn decider(&self) -> &PolicyDecider {
        &self.decider
    }

    pub fn decide(&self, kind: ContentKind, url: &Url) -> Decision {
        self.decider.decide(kind, url)
    }

    // === Toolbar operations ===

    pub fn is_allowed(&self, raw: &str) -> Result<bool> {
        let url = parse_url(raw)?;
        Ok(self.store.allows(&url))
    }

    /// Whitelist the origin of `raw` and persist the whitelist
    pub fn allow(&self, raw: &str) -> Result<bool> {
        self.update(|store| store.add_str(raw))
    }

    /// Remove the origin of `raw` and persist the whitelist
    pub fn revoke(&self, raw: &str) -> Result<bool> {
        self.update(|store| store.remove_str(raw))
    }

    /// Flip the origin of `raw`; returns whether it is allowed afterwards.
    ///
    /// Unrestricted URLs are always allowed and cannot be toggled.
    pub fn toggle(&self, raw: &str) -> Result<bool> {
        let url = parse_url(raw)?;

        if !self.store.matchable(&url) {
            return Ok(true);
        }

        let mut allowed = true;
        self.update(|store| {
            if store.remove(&url)? {
                allowed = false;
                return Ok(true);
            }
            store.add(&url)
        })?;

        Ok(allowed)
    }

    pub fn origins(&self) -> Vec<Origin> {
        self.store.origins()
    }

    /// Apply `change` to the store and persist it if anything changed.
    ///
    /// When the preference write fails the store is put back as it was, so
    /// the in-memory whitelist never disagrees with the saved one.
    fn update<F>(&self, change: F) -> Result<bool>
    where
        F: FnOnce(&WhitelistStore) -> descript_policy::Result<bool>,
    {
        let previous = self.store.get_preference();
        let changed = change(&self.store)?;

        if changed {
            if let Err(e) = self.persist() {
                tracing::warn!(error = %e, "Failed to persist whitelist, reverting");
                self.store.load_preference(&previous);
                return Err(e);
            }
        }

        Ok(changed)
    }

    fn persist(&self) -> Result<()> {
        self.prefs.set(
            &self.config.whitelist_preference(),
            &self.store.get_preference(),
        )?;
        Ok(())
    }
}

impl Drop for Extension {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(error = %e, "Shutdown on drop failed");
        }
    }
}

fn reload(prefs: &Preferences, store: &WhitelistStore, name: &str) -> Result<()> {
    let text = prefs.get(name)?.unwrap_or_default();
    store.load_preference(&text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use descript_policy::Scheme;
    use std::path::PathBuf;

    const WHITELIST: &str = "extensions.descript.whitelist";

    fn extension() -> Extension {
        extension_with(DomainPolicyRegistry::new())
    }

    fn extension_with(registry: DomainPolicyRegistry) -> Extension {
        let config = Config::new(PathBuf::from("/unused"));
        let prefs = Preferences::open_in_memory().unwrap();
        Extension::new(config, prefs, registry).unwrap()
    }

    fn extension_with_database(registry: DomainPolicyRegistry) -> (Extension, Database) {
        let config = Config::new(PathBuf::from("/unused"));
        let db = Database::open_in_memory().unwrap();
        let ext = Extension::new(config, Preferences::new(db.clone()), registry).unwrap();
        (ext, db)
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_startup_loads_whitelist() {
        let ext = extension();
        ext.preferences()
            .set(WHITELIST, "https://a.com/ http://b.com/x garbage")
            .unwrap();

        ext.startup().unwrap();

        assert!(ext.is_running());
        assert!(ext.store().contains(Scheme::Https, "a.com"));
        assert!(ext.store().contains(Scheme::Http, "b.com"));
        assert_eq!(
            ext.decide(ContentKind::Script, &url("https://a.com/app.js")),
            Decision::Allow
        );
        assert_eq!(
            ext.decide(ContentKind::Script, &url("https://evil.com/app.js")),
            Decision::Reject
        );
    }

    #[test]
    fn test_startup_sets_default_and_disables_scripts() {
        let ext = extension();
        ext.startup().unwrap();

        assert_eq!(ext.preferences().get(WHITELIST).unwrap(), Some(String::new()));
        assert!(ext.store().is_empty());
        assert_eq!(
            ext.preferences().get_bool("javascript.enabled").unwrap(),
            Some(false)
        );
    }

    #[test]
    fn test_shutdown_restores_scripts_setting() {
        let ext = extension();
        ext.preferences().set_bool("javascript.enabled", true).unwrap();

        ext.startup().unwrap();
        ext.shutdown().unwrap();

        assert!(!ext.is_running());
        assert_eq!(
            ext.preferences().get_bool("javascript.enabled").unwrap(),
            Some(true)
        );

        // Shutting down twice is a no-op
        ext.shutdown().unwrap();
    }

    #[test]
    fn test_preference_change_reloads_store() {
        let ext = extension();
        ext.startup().unwrap();

        ext.preferences().set(WHITELIST, "https://late.com/").unwrap();
        assert!(ext.store().contains(Scheme::Https, "late.com"));

        ext.shutdown().unwrap();
        ext.preferences().set(WHITELIST, "https://after.com/").unwrap();
        assert!(!ext.store().contains(Scheme::Https, "after.com"));
    }

    #[test]
    fn test_second_extension_backs_off() {
        let registry = DomainPolicyRegistry::new();
        let first = extension_with(registry.clone());
        let second = extension_with(registry.clone());

        first.startup().unwrap();
        second.startup().unwrap();

        assert!(first.is_running());
        assert!(!second.is_running());
        assert_eq!(
            second.preferences().get_bool("javascript.enabled").unwrap(),
            None
        );

        first.shutdown().unwrap();
        assert!(!registry.is_active());
    }

    #[test]
    fn test_drop_releases_domain_policy() {
        let registry = DomainPolicyRegistry::new();
        {
            let ext = extension_with(registry.clone());
            ext.startup().unwrap();
            assert!(registry.is_active());
        }
        assert!(!registry.is_active());
    }

    #[test]
    fn test_toggle_persists() {
        let ext = extension();
        ext.startup().unwrap();

        assert!(ext.toggle("https://example.com/page").unwrap());
        assert_eq!(
            ext.preferences().get(WHITELIST).unwrap().as_deref(),
            Some("https://example.com/")
        );
        assert!(ext.is_allowed("https://example.com:8443/other").unwrap());

        assert!(!ext.toggle("https://example.com/").unwrap());
        assert_eq!(ext.preferences().get(WHITELIST).unwrap().as_deref(), Some(""));

        assert!(ext.toggle("about:blank").unwrap());
        assert!(ext.origins().is_empty());
    }

    #[test]
    fn test_allow_and_revoke() {
        let ext = extension();
        ext.startup().unwrap();

        assert!(ext.allow("http://b.com/").unwrap());
        assert!(!ext.allow("http://b.com/x").unwrap());
        assert!(ext.allow("https://a.com/").unwrap());
        assert_eq!(
            ext.preferences().get(WHITELIST).unwrap().as_deref(),
            Some("https://a.com/ http://b.com/")
        );

        assert!(ext.revoke("http://b.com/").unwrap());
        assert!(!ext.revoke("http://b.com/").unwrap());
        assert_eq!(
            ext.origins(),
            vec![Origin::new(Scheme::Https, "a.com")]
        );
    }

    #[test]
    fn test_invalid_url_is_reported() {
        let ext = extension();
        ext.startup().unwrap();
        ext.allow("https://a.com/").unwrap();

        assert!(matches!(ext.allow("not a url"), Err(CoreError::Policy(_))));
        assert!(matches!(ext.toggle(""), Err(CoreError::Policy(_))));
        assert_eq!(
            ext.preferences().get(WHITELIST).unwrap().as_deref(),
            Some("https://a.com/")
        );
    }

    #[test]
    fn test_whitelist_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path().join("profile"));

        {
            let ext = Extension::open(config.clone(), DomainPolicyRegistry::new()).unwrap();
            ext.startup().unwrap();
            ext.allow("https://kept.com/").unwrap();
            ext.shutdown().unwrap();
        }

        let ext = Extension::open(config, DomainPolicyRegistry::new()).unwrap();
        ext.startup().unwrap();
        assert!(ext.is_allowed("https://kept.com/script.js").unwrap());
        assert_eq!(
            ext.preferences().get_bool("javascript.enabled").unwrap(),
            Some(false)
        );
        ext.shutdown().unwrap();
        assert_eq!(
            ext.preferences().get_bool("javascript.enabled").unwrap(),
            Some(true)
        );
    }

    #[test]
    fn test_failed_startup_restores_scripts_setting() {
        let registry = DomainPolicyRegistry::new();
        let (ext, db) = extension_with_database(registry.clone());
        ext.preferences().set_bool("javascript.enabled", true).unwrap();

        // A non-text whitelist value makes the initial load fail
        db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO preferences (name, user_value, updated_at) VALUES (?1, X'00FF', 'now')",
                [WHITELIST],
            )?;
            Ok(())
        })
        .unwrap();

        assert!(matches!(ext.startup(), Err(CoreError::Storage(_))));
        assert!(!ext.is_running());
        assert!(!registry.is_active());
        assert_eq!(
            ext.preferences().get_bool("javascript.enabled").unwrap(),
            Some(true)
        );

        // Once the value is readable again, startup still sees scripts as
        // initially enabled
        ext.preferences().set(WHITELIST, "https://a.com/").unwrap();
        ext.startup().unwrap();
        assert!(ext.store().contains(Scheme::Https, "a.com"));
        ext.shutdown().unwrap();
        assert_eq!(
            ext.preferences().get_bool("javascript.enabled").unwrap(),
            Some(true)
        );
    }

    #[test]
    fn test_failed_write_reverts_store() {
        let (ext, db) = extension_with_database(DomainPolicyRegistry::new());
        ext.startup().unwrap();
        ext.allow("https://a.com/").unwrap();
        ext.allow("http://b.com/").unwrap();

        db.with_connection(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER whitelist_read_only BEFORE UPDATE ON preferences
                 WHEN NEW.name = 'extensions.descript.whitelist'
                 BEGIN SELECT RAISE(ABORT, 'read-only'); END;",
            )?;
            Ok(())
        })
        .unwrap();

        assert!(matches!(ext.allow("https://c.com/"), Err(CoreError::Storage(_))));
        assert!(matches!(ext.revoke("https://a.com/"), Err(CoreError::Storage(_))));
        assert!(matches!(ext.toggle("http://b.com/"), Err(CoreError::Storage(_))));

        assert_eq!(ext.store().get_preference(), "https://a.com/ http://b.com/");
        assert_eq!(
            ext.preferences().get(WHITELIST).unwrap().as_deref(),
            Some("https://a.com/ http://b.com/")
        );

        // Changes that touch nothing never reach the preference store
        assert!(!ext.allow("https://a.com/other").unwrap());
        assert!(!ext.revoke("https://c.com/").unwrap());
        assert!(ext.toggle("about:blank").unwrap());
    }

    #[test]
    fn test_writes_only_on_change() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let ext = extension();
        ext.startup().unwrap();

        let writes = Arc::new(AtomicUsize::new(0));
        {
            let writes = Arc::clone(&writes);
            ext.preferences().add_observer(WHITELIST, move |_| {
                writes.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert!(ext.toggle("https://a.com/").unwrap());
        assert!(!ext.toggle("https://a.com:8443/x").unwrap());
        assert_eq!(writes.load(Ordering::SeqCst), 2);

        ext.allow("https://a.com/").unwrap();
        assert!(!ext.allow("https://a.com/").unwrap());
        assert!(!ext.revoke("http://a.com/").unwrap());
        assert!(ext.toggle("data:text/plain,x").unwrap());
        assert_eq!(writes.load(Ordering::SeqCst), 3);
    }
}
