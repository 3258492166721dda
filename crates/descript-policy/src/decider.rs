//! Content policy decisions
//!
//! Invoked by the host for every resource load. Only script loads are ever
//! restricted; everything else is allowed without consulting the whitelist.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

use crate::origin::parse_url;
use crate::whitelist::WhitelistStore;

/// Kind of resource being loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Other,
    Script,
    Image,
    Stylesheet,
    Object,
    Document,
    Subdocument,
    Font,
    Media,
    XmlHttpRequest,
    WebSocket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Let the load proceed
    Allow,
    /// Block the load
    Reject,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

impl From<bool> for Decision {
    fn from(allowed: bool) -> Self {
        if allowed {
            Decision::Allow
        } else {
            Decision::Reject
        }
    }
}

/// Stateless decision function over a shared whitelist
#[derive(Debug, Clone)]
pub struct PolicyDecider {
    store: Arc<WhitelistStore>,
}

impl PolicyDecider {
    pub fn new(store: Arc<WhitelistStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<WhitelistStore> {
        &self.store
    }

    /// Decide whether a load of `kind` from `url` may proceed
    pub fn decide(&self, kind: ContentKind, url: &Url) -> Decision {
        if kind != ContentKind::Script {
            return Decision::Allow;
        }

        let decision = Decision::from(self.store.allows(url));

        if !decision.is_allowed() {
            tracing::debug!(url = %url, "Rejected script load");
        }

        decision
    }

    /// Like [`decide`](Self::decide), for URLs the host has not parsed.
    ///
    /// A script whose URL cannot be parsed is rejected.
    pub fn decide_str(&self, kind: ContentKind, raw: &str) -> Decision {
        if kind != ContentKind::Script {
            return Decision::Allow;
        }

        match parse_url(raw) {
            Ok(url) => self.decide(kind, &url),
            Err(e) => {
                tracing::debug!(error = %e, "Rejected script load with unparseable URL");
                Decision::Reject
            }
        }
    }
}
