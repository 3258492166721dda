//! Whitelist store
//!
//! Allowed origins grouped by scheme. Hosts keep their insertion order so
//! the serialized preference string is stable across runs.
//!
//! Reads (`allows`) and writes (`add`/`remove`/`load_preference`) go through
//! one `RwLock`. `load_preference` builds the replacement state before
//! taking the write lock, so a reader sees either the old whitelist or the
//! new one, never a half-loaded one.

use parking_lot::RwLock;
use std::collections::HashSet;
use url::Url;

use crate::origin::{host_key, is_matchable, parse_url, Origin, Scheme};
use crate::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct HostSet {
    order: Vec<String>,
    hosts: HashSet<String>,
}

impl HostSet {
    fn insert(&mut self, host: &str) -> bool {
        if !self.hosts.insert(host.to_string()) {
            return false;
        }
        self.order.push(host.to_string());
        true
    }

    fn remove(&mut self, host: &str) -> bool {
        if !self.hosts.remove(host) {
            return false;
        }
        self.order.retain(|h| h != host);
        true
    }

    fn contains(&self, host: &str) -> bool {
        self.hosts.contains(host)
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Whitelist {
    sets: [HostSet; 3],
}

impl Whitelist {
    /// Build a whitelist from preference text, skipping unusable tokens
    fn parse(text: &str) -> Self {
        let mut whitelist = Whitelist::default();

        for token in text.split_whitespace() {
            let url = match parse_url(token) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(token = %token, error = %e, "Skipping whitelist entry");
                    continue;
                }
            };

            if !is_matchable(&url) {
                tracing::debug!(token = %token, "Ignoring whitelist entry with unrestricted scheme");
                continue;
            }

            match host_key(&url) {
                Ok(origin) => {
                    whitelist.insert(&origin);
                }
                Err(e) => {
                    tracing::warn!(token = %token, error = %e, "Skipping whitelist entry");
                }
            }
        }

        whitelist
    }

    fn set(&self, scheme: Scheme) -> &HostSet {
        &self.sets[scheme.index()]
    }

    fn set_mut(&mut self, scheme: Scheme) -> &mut HostSet {
        &mut self.sets[scheme.index()]
    }

    fn insert(&mut self, origin: &Origin) -> bool {
        self.set_mut(origin.scheme).insert(&origin.host)
    }

    fn remove(&mut self, origin: &Origin) -> bool {
        self.set_mut(origin.scheme).remove(&origin.host)
    }

    fn contains(&self, scheme: Scheme, host: &str) -> bool {
        self.set(scheme).contains(host)
    }

    fn origins(&self) -> impl Iterator<Item = Origin> + '_ {
        Scheme::ALL.into_iter().flat_map(move |scheme| {
            self.set(scheme)
                .order
                .iter()
                .map(move |host| Origin::new(scheme, host.as_str()))
        })
    }

    fn len(&self) -> usize {
        self.sets.iter().map(HostSet::len).sum()
    }
}

/// Thread-safe store of whitelisted origins
#[derive(Debug, Default)]
pub struct WhitelistStore {
    inner: RwLock<Whitelist>,
}

impl WhitelistStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store directly from preference text
    pub fn from_preference(text: &str) -> Self {
        Self {
            inner: RwLock::new(Whitelist::parse(text)),
        }
    }

    /// Exact lookup of a host in a scheme's set
    pub fn contains(&self, scheme: Scheme, host: &str) -> bool {
        self.inner.read().contains(scheme, host)
    }

    /// Whether this URL's scheme is one the whitelist restricts
    pub fn matchable(&self, url: &Url) -> bool {
        is_matchable(url)
    }

    /// Whether scripts from this URL may run.
    ///
    /// Unrestricted schemes always pass. For restricted schemes the origin
    /// must be whitelisted; a URL whose key cannot be computed is denied.
    pub fn allows(&self, url: &Url) -> bool {
        if !self.matchable(url) {
            return true;
        }

        match host_key(url) {
            Ok(origin) => self.contains(origin.scheme, &origin.host),
            Err(_) => false,
        }
    }

    /// Whitelist the origin of `url`. Returns whether the store changed.
    ///
    /// URLs with unrestricted schemes are ignored.
    pub fn add(&self, url: &Url) -> Result<bool> {
        if !self.matchable(url) {
            tracing::debug!(url = %url, "Not adding unrestricted URL to whitelist");
            return Ok(false);
        }

        let origin = host_key(url)?;
        let added = self.inner.write().insert(&origin);

        if added {
            tracing::info!(origin = %origin, "Whitelisted origin");
        }

        Ok(added)
    }

    /// Remove the origin of `url`. Returns whether the store changed.
    pub fn remove(&self, url: &Url) -> Result<bool> {
        if !self.matchable(url) {
            return Ok(false);
        }

        let origin = host_key(url)?;
        let removed = self.inner.write().remove(&origin);

        if removed {
            tracing::info!(origin = %origin, "Removed origin from whitelist");
        }

        Ok(removed)
    }

    /// Parse `raw` and [`add`](Self::add) it
    pub fn add_str(&self, raw: &str) -> Result<bool> {
        let url = parse_url(raw)?;
        self.add(&url)
    }

    /// Parse `raw` and [`remove`](Self::remove) it
    pub fn remove_str(&self, raw: &str) -> Result<bool> {
        let url = parse_url(raw)?;
        self.remove(&url)
    }

    /// Replace the whole whitelist with the origins listed in `text`.
    ///
    /// Tokens are separated by whitespace. Tokens that are not URLs are
    /// skipped; empty text yields an empty whitelist.
    pub fn load_preference(&self, text: &str) {
        let next = Whitelist::parse(text);
        let count = next.len();

        *self.inner.write() = next;

        tracing::info!(origins = count, "Loaded whitelist");
    }

    /// Serialize as space-separated `scheme://host/` entries, https first,
    /// then http, then file, each in insertion order.
    pub fn get_preference(&self) -> String {
        self.inner
            .read()
            .origins()
            .map(|origin| origin.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// All whitelisted origins in serialization order
    pub fn origins(&self) -> Vec<Origin> {
        self.inner.read().origins().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        *self.inner.write() = Whitelist::default();
    }
}
