//! Turns the embed page's query string into a configured player element.

use thiserror::Error;
use url::form_urlencoded;

use crate::dom::{DomError, DomNode, Element};
use crate::player::{
    ReplayPlayer, ATTR_DEEP_LINK, ATTR_EMBED, ATTR_REPLAY_BASE, ATTR_REQUIRE_SUBDOMAIN_IFRAME,
    ATTR_SANDBOX, ATTR_SOURCE, ATTR_TS, ATTR_URL, PLAYER_TAG,
};
use crate::timestamp;

pub const EMBED_MODES: &[&str] = &["default", "full", "replayonly", "replay-with-info"];
pub const DEFAULT_EMBED_MODE: &str = "default";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BootstrapError {
    #[error("`source` search param must be provided")]
    MissingSource,
    #[error("failed to mount player: {0}")]
    Dom(#[from] DomError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedParams {
    pub source: String,
    pub url: Option<String>,
    /// Normalized to `YYYYMMDDHHMMSS` where applicable.
    pub ts: Option<String>,
    pub embed: String,
    pub deep_link: bool,
}

impl EmbedParams {
    /// Parse a query string such as `?source=archive.wacz&url=...`. Only the
    /// first occurrence of each parameter counts.
    pub fn from_query(query: &str) -> Result<Self, BootstrapError> {
        let pairs: Vec<(String, String)> =
            form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
                .into_owned()
                .collect();
        let get = |name: &str| {
            pairs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        };
        let non_empty = |name: &str| get(name).filter(|value| !value.is_empty());

        let source = get("source").ok_or(BootstrapError::MissingSource)?;
        let embed = get("embed")
            .filter(|mode| EMBED_MODES.contains(mode))
            .unwrap_or(DEFAULT_EMBED_MODE);

        Ok(Self {
            source: source.to_string(),
            url: non_empty("url").map(str::to_string),
            ts: non_empty("ts").map(timestamp::normalize),
            embed: embed.to_string(),
            deep_link: non_empty("deepLink").is_some(),
        })
    }

    /// Write the player configuration these params describe.
    pub fn apply<N: DomNode>(&self, player: &ReplayPlayer<N>, replay_base: &str) {
        player.set_attribute(ATTR_SOURCE, &format!("/{}", self.source));
        player.set_attribute(ATTR_REPLAY_BASE, replay_base);
        player.set_attribute(ATTR_EMBED, &self.embed);
        player.set_attribute(ATTR_REQUIRE_SUBDOMAIN_IFRAME, "");
        player.set_attribute(ATTR_SANDBOX, "");

        if let Some(url) = &self.url {
            player.set_attribute(ATTR_URL, url);
        }
        if let Some(ts) = &self.ts {
            player.set_attribute(ATTR_TS, ts);
        }
        if self.deep_link {
            player.set_attribute(ATTR_DEEP_LINK, "");
        }
    }
}

/// Create the player under the document's `<body>` and configure it.
pub fn mount(
    document: &Element,
    params: &EmbedParams,
    replay_base: &str,
) -> Result<ReplayPlayer<Element>, BootstrapError> {
    let body = document
        .query_selector("body")?
        .unwrap_or_else(|| document.clone());
    let player = ReplayPlayer::new(body.append_element(PLAYER_TAG)?)
        .with_fallback_replay_base(replay_base);
    params.apply(&player, replay_base);
    tracing::info!(
        target = "bootstrap",
        source = %params.source,
        embed = %params.embed,
        "mounted player"
    );
    Ok(player)
}
