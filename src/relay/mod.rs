//! Two-way messaging between the embedding parent, the player and the
//! player's service-worker frame.

mod message;
mod override_attr;
mod window;

use std::rc::Rc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::dom::DomNode;
use crate::player::{ReplayPlayer, ATTR_TS, ATTR_URL};
use crate::resolver::{BoundedResolver, ResolverSettings};

pub use message::{
    attribute_text, coll_info_reply, forward_envelope, inited_reply, is_truthy,
    override_timeout_reply, parse_commands, Command, MessageEvent, OverrideRequest,
    IDENTITY_KEY, STATUS_TIMED_OUT,
};
pub use override_attr::{AttributeOverride, OverrideError, OverrideOutcome};
pub use window::{ChannelWindow, PostedMessage, SecurityError, TargetOrigin, Window, WindowId};

pub type OverrideHandle = JoinHandle<Result<OverrideOutcome, OverrideError>>;

/// What a single call to [`MessageRelay::handle_message`] did.
#[derive(Debug, Default)]
pub struct Dispatch {
    pub forwarded: bool,
    pub replies: usize,
    pub overrides: Vec<OverrideHandle>,
}

impl Dispatch {
    pub fn is_empty(&self) -> bool {
        !self.forwarded && self.replies == 0 && self.overrides.is_empty()
    }
}

/// Routes `message` events for one embed page.
///
/// Must be driven from inside a [`tokio::task::LocalSet`]: override commands
/// are spawned as local tasks.
pub struct MessageRelay<N> {
    player: ReplayPlayer<N>,
    parent: Rc<dyn Window>,
    identity: Rc<str>,
    resolver: BoundedResolver,
    shutdown: CancellationToken,
}

impl<N: DomNode> MessageRelay<N> {
    pub fn new(player: ReplayPlayer<N>, parent: Rc<dyn Window>, identity: impl Into<String>) -> Self {
        let identity: String = identity.into();
        Self {
            player,
            parent,
            identity: Rc::from(identity),
            resolver: BoundedResolver::default(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_resolver_settings(mut self, settings: &ResolverSettings) -> Self {
        self.resolver = BoundedResolver::from_settings(settings);
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn player(&self) -> &ReplayPlayer<N> {
        &self.player
    }

    /// Cancel every override still waiting for its target. Cancelled
    /// overrides do not reply.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn handle_message(&self, event: &MessageEvent) -> Dispatch {
        let mut dispatch = Dispatch::default();
        let Some(source) = event.source.as_deref() else {
            trace!(target = "relay", "message without source ignored");
            return dispatch;
        };

        if self.from_replay_frame(source) {
            self.parent.post_message(
                forward_envelope(&event.data, &self.identity),
                TargetOrigin::Any,
            );
            dispatch.forwarded = true;
        }

        if source.id() == self.parent.id() && is_truthy(&event.data) {
            for command in parse_commands(&event.data) {
                self.handle_command(&event.origin, command, &mut dispatch);
            }
        }

        dispatch
    }

    fn from_replay_frame(&self, source: &dyn Window) -> bool {
        match source.location_path() {
            Ok(path) => path == self.player.replay_base(),
            Err(err) => {
                trace!(target = "relay", window = ?source.id(), error = %err, "source location unreadable");
                false
            }
        }
    }

    fn reply(&self, origin: &str, message: serde_json::Value, dispatch: &mut Dispatch) {
        self.parent
            .post_message(message, TargetOrigin::Exact(origin.to_string()));
        dispatch.replies += 1;
    }

    fn handle_command(&self, origin: &str, command: Command, dispatch: &mut Dispatch) {
        match command {
            Command::UpdateUrl(url) => {
                debug!(target = "relay", url = %url, "updating player url");
                self.player.set_attribute(ATTR_URL, &url);
            }
            Command::UpdateTs(ts) => {
                debug!(target = "relay", ts = %ts, "updating player timestamp");
                self.player.set_attribute(ATTR_TS, &ts);
            }
            Command::GetInited => {
                let reply = inited_reply(self.player.is_inited(), &self.identity);
                self.reply(origin, reply, dispatch);
            }
            Command::GetCollInfo => {
                let reply = coll_info_reply(self.player.collection_info_or_empty(), &self.identity);
                self.reply(origin, reply, dispatch);
            }
            Command::OverrideElementAttribute { request, raw } => {
                let task = AttributeOverride {
                    reply_origin: origin.to_string(),
                    player: self.player.clone(),
                    parent: Rc::clone(&self.parent),
                    identity: Rc::clone(&self.identity),
                    resolver: self.resolver,
                    cancel: self.shutdown.child_token(),
                    request,
                    raw_request: raw,
                };
                dispatch.overrides.push(tokio::task::spawn_local(async move {
                    let result = task.run().await;
                    if let Err(err) = &result {
                        tracing::error!(target = "relay", error = %err, "attribute override failed");
                    }
                    result
                }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Element, Realm};
    use crate::player::{ATTR_REPLAY_BASE, PLAYER_TAG};
    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;

    const HREF: &str = "https://embed.example/?source=archive.wacz";
    const PARENT_ORIGIN: &str = "https://host.example";

    struct Fixture {
        _realm: Realm,
        player: Element,
        parent: Rc<dyn Window>,
        parent_inbox: UnboundedReceiver<PostedMessage>,
        relay: MessageRelay<Element>,
    }

    fn fixture() -> Fixture {
        let realm = Realm::new();
        let document = realm.parse_document("<body></body>");
        let player = document
            .query_selector("body")
            .unwrap()
            .unwrap()
            .append_element(PLAYER_TAG)
            .unwrap();
        player.set_attribute(ATTR_REPLAY_BASE, "/replay-web-page/");
        let (parent, parent_inbox) = ChannelWindow::cross_origin();
        let parent: Rc<dyn Window> = Rc::new(parent);
        let relay = MessageRelay::new(ReplayPlayer::new(player.clone()), Rc::clone(&parent), HREF);
        Fixture {
            _realm: realm,
            player,
            parent,
            parent_inbox,
            relay,
        }
    }

    #[test]
    fn forwards_replay_frame_messages_to_any_origin() {
        let mut fx = fixture();
        let (frame, _frame_inbox) = ChannelWindow::same_origin("/replay-web-page/");
        let event = MessageEvent::new(Rc::new(frame), "https://embed.example", json!({"msg_type": "ready"}));

        let dispatch = fx.relay.handle_message(&event);
        assert!(dispatch.forwarded);
        assert_eq!(dispatch.replies, 0);

        let posted = fx.parent_inbox.try_recv().unwrap();
        assert_eq!(posted.target_origin, TargetOrigin::Any);
        assert_eq!(posted.message, json!({"msg_type": "ready", "warcEmbedHref": HREF}));
    }

    #[test]
    fn same_origin_frame_on_other_path_is_ignored() {
        let mut fx = fixture();
        let (frame, _frame_inbox) = ChannelWindow::same_origin("/elsewhere/");
        let event = MessageEvent::new(Rc::new(frame), "https://embed.example", json!({"a": 1}));
        assert!(fx.relay.handle_message(&event).is_empty());
        assert!(fx.parent_inbox.try_recv().is_err());
    }

    #[test]
    fn cross_origin_and_sourceless_messages_produce_nothing() {
        let mut fx = fixture();
        let (foreign, _inbox) = ChannelWindow::cross_origin();
        let event = MessageEvent::new(Rc::new(foreign), "https://evil.example", json!({"getInited": true}));
        assert!(fx.relay.handle_message(&event).is_empty());

        let sourceless = MessageEvent {
            source: None,
            origin: PARENT_ORIGIN.into(),
            data: json!({"getInited": true}),
        };
        assert!(fx.relay.handle_message(&sourceless).is_empty());
        assert!(fx.parent_inbox.try_recv().is_err());
    }

    #[test]
    fn get_inited_replies_once_to_exact_origin() {
        let mut fx = fixture();
        let event = MessageEvent::new(Rc::clone(&fx.parent), PARENT_ORIGIN, json!({"getInited": true}));

        let dispatch = fx.relay.handle_message(&event);
        assert_eq!(dispatch.replies, 1);
        let posted = fx.parent_inbox.try_recv().unwrap();
        assert_eq!(posted.target_origin, TargetOrigin::Exact(PARENT_ORIGIN.into()));
        assert_eq!(posted.message, json!({"inited": false, "warcEmbedHref": HREF}));
        assert!(fx.parent_inbox.try_recv().is_err());

        fx.player.set_property("__inited", json!(true));
        fx.relay.handle_message(&event);
        assert_eq!(
            fx.parent_inbox.try_recv().unwrap().message,
            json!({"inited": true, "warcEmbedHref": HREF})
        );
    }

    #[test]
    fn get_coll_info_defaults_to_empty_object() {
        let mut fx = fixture();
        let event = MessageEvent::new(Rc::clone(&fx.parent), PARENT_ORIGIN, json!({"getCollInfo": 1}));
        fx.relay.handle_message(&event);
        assert_eq!(
            fx.parent_inbox.try_recv().unwrap().message,
            json!({"collInfo": {}, "warcEmbedHref": HREF})
        );
    }

    #[test]
    fn update_commands_write_player_attributes() {
        let mut fx = fixture();
        let event = MessageEvent::new(
            Rc::clone(&fx.parent),
            PARENT_ORIGIN,
            json!({"updateUrl": "https://example.com/page", "updateTs": "1700000000000"}),
        );
        let dispatch = fx.relay.handle_message(&event);
        assert!(dispatch.is_empty());
        assert_eq!(fx.player.attribute("url").as_deref(), Some("https://example.com/page"));
        assert_eq!(fx.player.attribute("ts").as_deref(), Some("20231114221320"));
        assert!(fx.parent_inbox.try_recv().is_err());
    }

    #[test]
    fn falsy_parent_payload_is_ignored() {
        let mut fx = fixture();
        let event = MessageEvent::new(Rc::clone(&fx.parent), PARENT_ORIGIN, json!(null));
        assert!(fx.relay.handle_message(&event).is_empty());
        let event = MessageEvent::new(Rc::clone(&fx.parent), PARENT_ORIGIN, json!({"updateUrl": ""}));
        fx.relay.handle_message(&event);
        assert_eq!(fx.player.attribute("url"), None);
        assert!(fx.parent_inbox.try_recv().is_err());
    }
}
