//! The `<replay-web-page>` element and the internal paths the embed page
//! pries into.

use serde_json::{Map as JsonMap, Value};

use crate::dom::{frame_document_of, shadow_of, DomError, DomNode};

pub const PLAYER_TAG: &str = "replay-web-page";
pub const DEFAULT_REPLAY_BASE: &str = "/replay-web-page/";

pub const ATTR_SOURCE: &str = "source";
pub const ATTR_REPLAY_BASE: &str = "replayBase";
pub const ATTR_URL: &str = "url";
pub const ATTR_TS: &str = "ts";
pub const ATTR_EMBED: &str = "embed";
pub const ATTR_DEEP_LINK: &str = "deepLink";
pub const ATTR_REQUIRE_SUBDOMAIN_IFRAME: &str = "requireSubDomainIframe";
pub const ATTR_SANDBOX: &str = "sandbox";

const PROP_INITED: &str = "__inited";
const PROP_COLL_INFO: &str = "__collInfo";

const APP_MAIN: &str = "replay-app-main";
const COLLECTION: &str = "wr-coll";
const COLLECTION_REPLAY: &str = "wr-coll-replay";

/// Wraps the player element. All reads of its internals go through here so
/// the relay never hardcodes the player's DOM layout.
#[derive(Debug, Clone)]
pub struct ReplayPlayer<N> {
    element: N,
    fallback_replay_base: String,
}

impl<N: DomNode> ReplayPlayer<N> {
    pub fn new(element: N) -> Self {
        Self {
            element,
            fallback_replay_base: DEFAULT_REPLAY_BASE.to_string(),
        }
    }

    pub fn with_fallback_replay_base(mut self, replay_base: impl Into<String>) -> Self {
        self.fallback_replay_base = replay_base.into();
        self
    }

    pub fn element(&self) -> &N {
        &self.element
    }

    pub fn set_attribute(&self, name: &str, value: &str) {
        self.element.set_attribute(name, value);
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.element.attribute(name)
    }

    /// Path of the frame the player uses to talk to its service worker.
    pub fn replay_base(&self) -> String {
        self.element
            .attribute(ATTR_REPLAY_BASE)
            .unwrap_or_else(|| self.fallback_replay_base.clone())
    }

    /// Whether the player's service worker is up. Reads as `false` until the
    /// player sets the flag.
    pub fn is_inited(&self) -> bool {
        self.element
            .property(PROP_INITED)
            .and_then(|value| value.as_bool())
            .unwrap_or(false)
    }

    /// The collection metadata object held by `wr-coll`, or `None` while the
    /// player is still building its internals.
    pub fn collection_info(&self) -> Result<Option<Value>, DomError> {
        let Some(app_root) = self.app_root()? else {
            return Ok(None);
        };
        let Some(collection) = app_root.query_selector(COLLECTION)? else {
            return Ok(None);
        };
        Ok(collection.property(PROP_COLL_INFO))
    }

    /// Same as [`Self::collection_info`] but never fails; unreachable
    /// internals read as an empty object.
    pub fn collection_info_or_empty(&self) -> Value {
        match self.collection_info() {
            Ok(Some(info)) => info,
            Ok(None) => Value::Object(JsonMap::new()),
            Err(err) => {
                tracing::debug!(target = "relay", error = %err, "collection info unavailable");
                Value::Object(JsonMap::new())
            }
        }
    }

    /// Document of the iframe that renders the archived page itself.
    pub fn replay_document(&self) -> Result<Option<N>, DomError> {
        let Some(app_root) = self.app_root()? else {
            return Ok(None);
        };
        let Some(collection_root) = shadow_of(&app_root, COLLECTION)? else {
            return Ok(None);
        };
        let Some(replay_root) = shadow_of(&collection_root, COLLECTION_REPLAY)? else {
            return Ok(None);
        };
        frame_document_of(&replay_root, "iframe")
    }

    /// Element matching `selector` inside the archived page, if it exists yet.
    pub fn find_in_replay(&self, selector: &str) -> Result<Option<N>, DomError> {
        match self.replay_document()? {
            Some(document) => document.query_selector(selector),
            None => Ok(None),
        }
    }

    /// Shadow root of `replay-app-main`, reached through the player's own
    /// shadow root and its app iframe.
    fn app_root(&self) -> Result<Option<N>, DomError> {
        let Some(player_root) = self.element.shadow_root() else {
            return Ok(None);
        };
        let Some(app_document) = frame_document_of(&player_root, "iframe")? else {
            return Ok(None);
        };
        shadow_of(&app_document, APP_MAIN)
    }
}
